//! Error types shared by every engine and the device scope.

use thiserror::Error;

/// Errors raised while configuring a [`DeviceScope`](crate::DeviceScope), constructing an
/// engine, or dispatching a batch.
///
/// Every variant is raised before any result is produced: a failing call never returns a
/// partially filled result sequence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Mutually exclusive execution options were supplied together.
    #[error("conflicting execution options: {0}")]
    ConfigurationConflict(String),

    /// An option received a value of the wrong kind, e.g. a string core count.
    #[error("option type mismatch: {0}")]
    TypeMismatch(String),

    /// The requested backend is not compiled in, not present, or not declared by the engine.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Paired batches differ in length.
    #[error("batch length mismatch: {left} strings on the left, {right} on the right")]
    LengthMismatch { left: usize, right: usize },

    /// The accelerator failed while staging, running, or returning a batch.
    #[error("device execution failed: {0}")]
    DeviceExecutionFailure(String),

    /// An engine parameter is outside of its valid domain.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for similarity engine operations.
pub type Result<T> = core::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        match error.classify() {
            serde_json::error::Category::Data => Error::TypeMismatch(error.to_string()),
            _ => Error::InvalidParameter(error.to_string()),
        }
    }
}
