//! Crate-wide error taxonomy.
//!
//! Mirrors the error *kinds* described by the watchdog design rather than
//! any particular library's error type: config problems, unknown targets,
//! transient runtime failures and cancellation are all distinguished so
//! callers can react appropriately (e.g. translate [`WatchdogError::NotManaged`]
//! to an HTTP 404 at the control-plane boundary).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchdogError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("target `{0}` is not managed")]
    NotManaged(String),

    #[error("runtime call failed: {0}")]
    RuntimeTransient(String),

    #[error("operation cancelled")]
    Cancelled,
}

pub type WatchdogResult<T> = Result<T, WatchdogError>;
