//! Draining of asynchronous gateway operations.
//!
//! Every mutating call on the gateway answers with an operation handle
//! (`Location` header). [`Poller`] fetches that handle once per second until
//! it reports `Successful` or `Error`, or until the attempt budget runs out.
//! Budgets are attempt counts at a fixed one-second cadence, so a timeout of
//! `N` means at most `N` fetches.

pub mod poller;
pub mod status;

pub use poller::{flag, is_locked_resource, never_locked, Poller, POLL_CADENCE};
pub use status::{OperationPhase, OperationStatus, StatusField};

/// Default attempt budget for a drained operation.
pub const DEFAULT_TIMEOUT: u32 = 120;

/// Terminal outcome of one drained operation handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    Successful,
    Error(Option<String>),
    /// Synthesized locally when the attempt budget ran out.
    TimedOut,
}

impl OperationResult {
    /// Fold into the error taxonomy: `Error` becomes `OperationFailed`,
    /// `TimedOut` becomes `OperationTimeout`.
    pub fn into_result(self, url: &str, attempts: u32) -> Result<(), crate::ApiError> {
        match self {
            OperationResult::Successful => Ok(()),
            OperationResult::Error(message) => Err(crate::ApiError::OperationFailed {
                url: url.to_string(),
                message,
            }),
            OperationResult::TimedOut => Err(crate::ApiError::OperationTimeout {
                url: url.to_string(),
                attempts,
            }),
        }
    }
}
