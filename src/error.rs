//! Error types shared by every backend, adapter and decorator.

use std::fmt;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by cache backends and decorators.
///
/// Construction-time failures (`ExtensionUnavailable`, `ConfigurationError`)
/// are never deferred to first use. Per-call failures (`ConnectionFailure`,
/// `ProtocolError`) are propagated unchanged by decorators.
///
/// The expected non-exceptional outcomes of `add` on an existing key,
/// `replace` on a missing key and `set_if_same` on a stale token are silent
/// no-ops and never surface here.
#[derive(Debug)]
pub enum Error {
    /// The driver for a backend was not compiled into this build.
    ExtensionUnavailable(String),

    /// Backend configuration is invalid.
    ConfigurationError(String),

    /// The backend could not be reached or the connection dropped.
    ConnectionFailure {
        message: String,
        code: Option<String>,
    },

    /// The backend answered with a status outside the non-error allow-list.
    ProtocolError { code: String, message: String },

    /// The caller passed an argument the operation cannot accept.
    ArgumentError(String),

    /// The operation is not valid for the data or capability at hand.
    DataError(String),

    /// A value could not be encoded for, or decoded from, a backend.
    SerializationError(String),

    /// An optimistic update lost every race it attempted.
    Conflict { key: String, attempts: u32 },
}

impl Error {
    /// Raised when the optimistic-update pair is used against a backend that
    /// does not expose it.
    pub(crate) fn optimistic_unsupported(backend: &str) -> Self {
        Error::DataError(format!(
            "{} does not support optimistic updates (get_for_update/set_if_same)",
            backend
        ))
    }

    /// Raw backend code carried by protocol and connection errors.
    pub fn code(&self) -> Option<&str> {
        match self {
            Error::ProtocolError { code, .. } => Some(code),
            Error::ConnectionFailure { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Whether this error is a construction-time failure.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            Error::ExtensionUnavailable(_) | Error::ConfigurationError(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ExtensionUnavailable(msg) => write!(f, "Extension unavailable: {}", msg),
            Error::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            Error::ConnectionFailure { message, code } => match code {
                Some(code) => write!(f, "Connection failure [{}]: {}", code, message),
                None => write!(f, "Connection failure: {}", message),
            },
            Error::ProtocolError { code, message } => {
                write!(f, "Protocol error [{}]: {}", code, message)
            }
            Error::ArgumentError(msg) => write!(f, "Argument error: {}", msg),
            Error::DataError(msg) => write!(f, "Data error: {}", msg),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::Conflict { key, attempts } => write!(
                f,
                "Optimistic update of {} failed after {} attempt(s)",
                key, attempts
            ),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::SerializationError(e.to_string())
    }
}
