use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use ixload_rest::config::{ClientConfig, RunProfile};
use ixload_rest::session::{self, RestSession};
use ixload_rest::stats::{CsvSink, ExitStatus, StatSink};
use ixload_rest::HttpGateway;

#[derive(Parser)]
#[command(
    name = "ixload-rest",
    about = "Run load tests on an IxLoad gateway through its REST API",
    version,
    long_about = None
)]
struct Cli {
    /// Client config file (default: $IXLOAD_REST_CONFIG, then ./ixload-rest.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Gateway host, overrides the config file
    #[arg(long, global = true)]
    host: Option<String>,

    /// Gateway port, overrides the config file (8443 implies https)
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a saved configuration, run it and collect stats
    Run {
        /// Run profile (TOML)
        #[arg(long)]
        profile: PathBuf,

        /// IxLoad version for the new session, overrides the config file
        #[arg(long, env = "IXLOAD_VERSION")]
        ixload_version: Option<String>,
    },

    /// List sessions open on the gateway
    Sessions,

    /// Abort the active test of an existing session
    Abort {
        /// Session ID
        #[arg(long)]
        session: String,

        /// Delete the session afterwards
        #[arg(long)]
        delete: bool,
    },

    /// List the stat groups an existing session exposes
    StatNames {
        /// Session ID
        #[arg(long)]
        session: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = tracing::subscriber::with_default(ixload_rest::logging::bootstrap(), || {
        ClientConfig::resolve(cli.config.as_deref())
    })?;
    if let Some(host) = cli.host {
        config.gateway.host = host;
    }
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    ixload_rest::logging::init(&config.logging)?;

    let gateway = HttpGateway::new(&config.gateway).context("failed to build gateway client")?;
    let platform = config.gateway.platform;

    match cli.command {
        Commands::Run {
            profile,
            ixload_version,
        } => {
            let profile = RunProfile::load(&profile)?;
            let version = ixload_version
                .or_else(|| config.session.ixload_version.clone())
                .context("no IxLoad version: set session.ixload_version or pass --ixload-version")?;
            run(gateway, &config, &profile, &version).await?;
        }
        Commands::Sessions => {
            let sessions = session::list_sessions(&gateway).await?;
            if sessions.is_empty() {
                println!("No sessions found.");
            } else {
                println!("{:<8} | {:<6} | {:<12} | URL", "Session", "Active", "Active time");
                println!("{:-<8}-|-{:-<6}-|-{:-<12}-|-{:-<40}", "", "", "", "");
                for s in sessions {
                    println!(
                        "{:<8} | {:<6} | {:<12} | {}",
                        s.session_id,
                        s.is_active,
                        s.active_time.as_deref().unwrap_or("-"),
                        s.url.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        Commands::Abort { session, delete } => {
            let session = RestSession::attach(gateway, session, platform);
            session.abort_active_test().await?;
            println!("Aborted active test of session {}", session.session_id());
            if delete {
                session.delete_session().await?;
                println!("Deleted session {}", session.session_id());
            }
        }
        Commands::StatNames { session } => {
            let session = RestSession::attach(gateway, session, platform);
            for name in session.stat_names().await? {
                println!("{}", name);
            }
        }
    }

    Ok(())
}

/// Create a session, drive the profile to completion, and release the
/// session. On failure or Ctrl-C, including while the session is still
/// starting, the active test is aborted first.
async fn run(gateway: HttpGateway, config: &ClientConfig, profile: &RunProfile, version: &str) -> Result<()> {
    let session = RestSession::create(gateway, version, config.gateway.platform)
        .await
        .context("failed to create session")?;

    let outcome = tokio::select! {
        result = start_and_execute(&session, profile) => result,
        _ = tokio::signal::ctrl_c() => Err(anyhow::anyhow!("interrupted by Ctrl-C")),
    };

    if let Err(e) = &outcome {
        error!("run failed: {:#}", e);
        if config.session.delete_session {
            if let Err(abort) = session.abort_active_test().await {
                warn!(error = %abort, "failed to abort active test");
            }
        }
    }

    if config.session.delete_session {
        session.delete_session().await.context("failed to delete session")?;
    } else {
        info!(session_id = %session.session_id(), "leaving session open");
    }
    outcome
}

async fn start_and_execute(session: &RestSession<HttpGateway>, profile: &RunProfile) -> Result<()> {
    session.start().await.context("failed to start session")?;
    info!(session_id = %session.session_id(), "session ready");
    execute(session, profile).await
}

async fn execute(session: &RestSession<HttpGateway>, profile: &RunProfile) -> Result<()> {
    if let Some(license) = &profile.license {
        session.configure_license(&license.server, license.model).await?;
    }
    if let Some(dir) = &profile.results_dir {
        session.set_result_dir(dir, profile.timestamp_results_dir).await?;
    }
    if let Some(local) = &profile.upload_from {
        session.upload_file(local, &profile.config_file, true).await?;
    }
    session
        .load_config_file(&profile.config_file)
        .await
        .with_context(|| format!("failed to load {}", profile.config_file))?;

    if let Some(plan) = &profile.ports {
        session.assign_chassis_and_ports(plan).await?;
    }
    if profile.force_ownership {
        session.enable_force_ownership().await?;
    }
    if let Some(timeline) = &profile.timeline {
        session.configure_timeline(timeline).await?;
    }
    let groups = session.stat_names().await?;
    info!(groups = ?groups, "stat groups available");

    let operation_id = session.run_traffic().await?;
    info!(%operation_id, "traffic running");

    let mut csv = match &profile.stats.csv {
        Some(options) => Some(CsvSink::create(&profile.stats.groups, options)?),
        None => None,
    };
    let exit = session
        .poll_stats(
            &profile.stats.groups,
            Duration::from_secs(profile.stats.interval_secs),
            csv.as_mut().map(|sink| sink as &mut dyn StatSink),
        )
        .await?;
    match &exit {
        ExitStatus::Completed { cycles } => info!(cycles, "test completed"),
        ExitStatus::Stalled { last_state, cycles } => {
            warn!(%last_state, cycles, "test stalled before returning to unconfigured")
        }
    }
    if let Some(csv) = &csv {
        for path in csv.paths() {
            println!("Stats written to {}", path.display());
        }
    }

    session.wait_for_active_test_unconfigured().await?;
    let result_path = session.result_path().await?;
    println!("Results: {}", result_path);

    if profile.delete_result_dir {
        session.delete_result_dir().await?;
    }
    Ok(())
}
