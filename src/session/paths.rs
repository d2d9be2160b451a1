//! Path handling for files that live on the gateway host.
//!
//! The gateway may run on Windows (`c:\Results`) or Linux
//! (`/mnt/ixload-share`). Paths are built as plain strings with the host's
//! separator, never with `std::path`, since they are not local paths.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Windows,
    Linux,
}

impl Platform {
    pub fn separator(self) -> char {
        match self {
            Platform::Windows => '\\',
            Platform::Linux => '/',
        }
    }

    /// Join `name` under `dir` with exactly one separator between them.
    pub fn join(self, dir: &str, name: &str) -> String {
        let sep = self.separator();
        format!("{}{}{}", dir.trim_end_matches(sep), sep, name)
    }
}

/// Per-run folder name, e.g. `13-08-28-041835`.
pub fn timestamp_folder(now: DateTime<Local>) -> String {
    now.format("%H-%M-%S-%6f").to_string()
}

/// Where an imported `.crf` archive is placed on the gateway and which
/// `.rxf` it expands to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrfImport {
    /// Timestamp folder the archive is placed in; delete it after the run.
    pub folder: String,
    pub src_file: String,
    pub dest_rxf: String,
}

/// Insert `folder` between the directory and the file name of `crf`.
///
/// `c:\VoIP\config.crf` becomes `c:\VoIP\<folder>\config.crf`; Linux paths
/// are normalized to a single leading `/`.
pub fn crf_import_paths(platform: Platform, crf: &str, folder: &str) -> CrfImport {
    let sep = platform.separator();
    let mut parts: Vec<&str> = crf.split(sep).collect();
    let file_name = parts.pop().unwrap_or_default();
    if platform == Platform::Linux {
        parts.retain(|p| !p.is_empty());
    }
    parts.push(folder);

    let mut folder_path = parts.join(sep.to_string().as_str());
    if platform == Platform::Linux {
        folder_path.insert(0, '/');
    }
    let src_file = format!("{}{}{}", folder_path, sep, file_name);

    let rxf_name = match file_name.rsplit_once('.') {
        Some((stem, _)) => format!("{}.rxf", stem),
        None => format!("{}.rxf", file_name),
    };
    let dest_rxf = format!("{}{}{}", folder_path, sep, rxf_name);

    CrfImport {
        folder: folder_path,
        src_file,
        dest_rxf,
    }
}
