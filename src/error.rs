//! Error types for callguard

use thiserror::Error;

/// Result type alias for setup and transport operations
pub type Result<T> = std::result::Result<T, CallguardError>;

/// Errors that flow through the call path.
///
/// The two sentinels (`BreakerOpen`, `Timeout`) are produced by the
/// primitives themselves; everything else originates inside the wrapped
/// operation. Predicates classify these values for retry, breaker
/// accounting, and fallback selection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// Rejected by an open circuit breaker; the operation was not invoked
    #[error("circuit breaker is open")]
    BreakerOpen,

    /// The wait for the operation exceeded the timer duration. The
    /// operation itself may still be running.
    #[error("timeout exceeded")]
    Timeout,

    /// Error returned by the wrapped operation
    #[error("{0}")]
    Operation(String),

    /// Panic captured inside the wrapped operation. The message is the
    /// panic payload's string form.
    #[error("{0}")]
    Panic(String),
}

impl CallError {
    /// Wrap an application error message
    pub fn app(message: impl Into<String>) -> Self {
        CallError::Operation(message.into())
    }

    /// True for the sentinels reserved by this library
    pub fn is_sentinel(&self) -> bool {
        matches!(self, CallError::BreakerOpen | CallError::Timeout)
    }
}

/// Errors raised outside the call path: registration, configuration, and
/// collector transport failures.
#[derive(Error, Debug)]
pub enum CallguardError {
    /// A breaker is already registered under this name
    #[error("breaker already registered with the name {name:?}")]
    DuplicateBreaker { name: String },

    /// A caller is already registered under this dependency:name key
    #[error("caller already registered with the key {key:?}")]
    DuplicateCaller { key: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// gRPC transport error
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// gRPC status error
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),
}
