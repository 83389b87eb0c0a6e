//! Unified error type for adminfs
//!
//! Every failure a caller can observe falls into one of a handful of
//! categories: authorization was refused, the control channel itself broke,
//! the privileged job ran and failed, or the job was cancelled. Parameter
//! problems and broken internal invariants get their own variants so they are
//! never mistaken for a filesystem failure.

use crate::error_code::ErrorCode;
use serde::{Deserialize, Serialize};

/// Unified error type for all adminfs operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum AdminError {
    /// The policy authority refused (or could not answer) the check
    #[error("Access denied: {message}")]
    AccessDenied {
        /// Error message describing the refusal
        message: String,
    },

    /// The control-channel call could not be completed
    #[error("Transport error: {message}")]
    Transport {
        /// Error message describing the transport failure
        message: String,
    },

    /// The privileged job ran and failed
    #[error("{code}: {message}")]
    Operation {
        /// Native error code reported by the job
        code: ErrorCode,
        /// Human-readable message reported by the job
        message: String,
    },

    /// The command was killed before it finished
    #[error("Cancelled: {message}")]
    Cancelled {
        /// Error message describing the cancellation
        message: String,
    },

    /// Invalid locator or parameters, rejected before any job ran
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// Internal invariant violated
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl AdminError {
    /// Create an access denied error
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create an operation failure carrying the job's error code
    pub fn operation(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Operation {
            code,
            message: message.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create an operation failure from an I/O error
    pub fn from_io(err: &std::io::Error, fallback: ErrorCode) -> Self {
        match ErrorCode::from_io(err, fallback) {
            ErrorCode::AccessDenied => Self::access_denied(err.to_string()),
            code => Self::operation(code, err.to_string()),
        }
    }

    /// Error code reported in a terminal `result` event for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AccessDenied { .. } => ErrorCode::AccessDenied,
            Self::Transport { .. } | Self::Internal { .. } => ErrorCode::Internal,
            Self::Operation { code, .. } => *code,
            Self::Cancelled { .. } => ErrorCode::Cancelled,
            Self::Invalid { .. } => ErrorCode::Unsupported,
        }
    }

    /// Human-readable message without the category prefix
    pub fn message(&self) -> &str {
        match self {
            Self::AccessDenied { message }
            | Self::Transport { message }
            | Self::Operation { message, .. }
            | Self::Cancelled { message }
            | Self::Invalid { message }
            | Self::Internal { message } => message,
        }
    }

    /// Whether this error is an authorization refusal
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }

    /// Whether this error is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Standard Result type for adminfs operations
pub type Result<T> = std::result::Result<T, AdminError>;

impl From<std::io::Error> for AdminError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(&err, ErrorCode::Internal)
    }
}

impl From<toml::de::Error> for AdminError {
    fn from(err: toml::de::Error) -> Self {
        Self::invalid(format!("Invalid configuration: {err}"))
    }
}
