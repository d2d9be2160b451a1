//! Stat collection while a test is running.
//!
//! [`collector::StatCollector`] watches the active test's lifecycle state and,
//! while it is `Running`, reads the newest snapshot bucket of every requested
//! stat group, optionally recording rows into a [`sink::StatSink`].

pub mod collector;
pub mod sink;
pub mod snapshot;

use serde::{Deserialize, Serialize};

pub use collector::{StatCollector, DEFAULT_POLL_INTERVAL, STALL_GRACE};
pub use sink::{CsvOptions, CsvSink, SinkError, StatSink};
pub use snapshot::{GroupReading, StatSnapshot};

/// Lifecycle of the gateway's active test, as reported in `currentState`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestRunState {
    Configuring,
    StartingRun,
    Running,
    StoppingRun,
    Cleaning,
    Unconfigured,
    /// A token outside the documented set; treated as transient.
    Other(String),
}

impl TestRunState {
    pub fn parse(token: &str) -> Self {
        match token {
            "Configuring" => TestRunState::Configuring,
            "Starting Run" => TestRunState::StartingRun,
            "Running" => TestRunState::Running,
            "Stopping Run" => TestRunState::StoppingRun,
            "Cleaning" => TestRunState::Cleaning,
            "Unconfigured" => TestRunState::Unconfigured,
            other => TestRunState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TestRunState::Configuring => "Configuring",
            TestRunState::StartingRun => "Starting Run",
            TestRunState::Running => "Running",
            TestRunState::StoppingRun => "Stopping Run",
            TestRunState::Cleaning => "Cleaning",
            TestRunState::Unconfigured => "Unconfigured",
            TestRunState::Other(s) => s,
        }
    }
}

impl std::fmt::Display for TestRunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named family of metrics (e.g. `HTTPClient`) and the metric names to
/// read from it, in output order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatGroup {
    pub name: String,
    pub metrics: Vec<String>,
}

impl StatGroup {
    pub fn new<I, S>(name: impl Into<String>, metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            metrics: metrics.into_iter().map(Into::into).collect(),
        }
    }
}

/// How a stat polling loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    /// The test returned to `Unconfigured`.
    Completed { cycles: u32 },
    /// The test sat outside `Running`/`Unconfigured` past the grace period.
    Stalled { last_state: String, cycles: u32 },
}

impl ExitStatus {
    /// Number of stat-fetch cycles performed while `Running`.
    pub fn cycles(&self) -> u32 {
        match self {
            ExitStatus::Completed { cycles } | ExitStatus::Stalled { cycles, .. } => *cycles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_state_round_trip_tokens() {
        for token in [
            "Configuring",
            "Starting Run",
            "Running",
            "Stopping Run",
            "Cleaning",
            "Unconfigured",
        ] {
            let state = TestRunState::parse(token);
            assert!(!matches!(state, TestRunState::Other(_)), "{}", token);
            assert_eq!(state.as_str(), token);
        }
    }

    #[test]
    fn test_unknown_state_is_preserved() {
        let state = TestRunState::parse("Aborting");
        assert_eq!(state, TestRunState::Other("Aborting".to_string()));
        assert_eq!(state.to_string(), "Aborting");
        assert_eq!(TestRunState::parse("running"), TestRunState::Other("running".to_string()));
    }
}
