//! ixload-rest -- client for the IxLoad gateway REST API.
//!
//! The gateway runs every state change as an asynchronous operation. This
//! crate drains those operations ([`operation`]), watches a running test and
//! collects its stats ([`stats`]), and wraps the whole session lifecycle in
//! [`session::RestSession`].

pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod operation;
pub mod session;
pub mod stats;

pub use error::{ApiError, TransportError};
pub use gateway::{ApiResponse, Gateway, HttpGateway};
pub use session::RestSession;
