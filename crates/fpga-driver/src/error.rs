//! Error types for FPGA access operations

use thiserror::Error;

/// Result type alias for FPGA operations
pub type Result<T> = std::result::Result<T, FpgaError>;

/// Result category reported to callers (CLI exit codes, test harnesses).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Null, malformed or out-of-range input
    InvalidArgument,
    /// Operation on a closed, destroyed or uninitialized object
    InvalidState,
    /// Conflicting exclusive-access request
    ResourceBusy,
    /// Mediated access did not complete in time
    Timeout,
    /// Hardware or persisted-state access failed
    Io,
}

/// Errors that can occur during FPGA operations
#[derive(Debug, Error)]
pub enum FpgaError {
    /// Null, malformed or out-of-range input
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong with the input
        reason: String,
    },

    /// Object is not in a state that permits the operation
    #[error("Invalid state: {state}")]
    InvalidState {
        /// Current state description
        state: String,
    },

    /// Resource is already held by a conflicting handle
    #[error("Resource busy: {resource}")]
    ResourceBusy {
        /// Resource identifier
        resource: String,
    },

    /// Mediated access poll exceeded its bound
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        duration_ms: u64,
    },

    /// I/O error on a register window or sysfs attribute
    #[error("I/O error ({context}): {source}")]
    Io {
        /// What was being accessed
        context: String,
        /// Underlying I/O error
        source: std::io::Error,
    },
}

impl FpgaError {
    /// Create an invalid argument error
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(state: impl Into<String>) -> Self {
        Self::InvalidState {
            state: state.into(),
        }
    }

    /// Create a resource busy error
    pub fn resource_busy(resource: impl Into<String>) -> Self {
        Self::ResourceBusy {
            resource: resource.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(duration: std::time::Duration) -> Self {
        Self::Timeout {
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Create an I/O error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Result category of this error
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::ResourceBusy { .. } => ErrorKind::ResourceBusy,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Io { .. } => ErrorKind::Io,
        }
    }
}

impl From<std::io::Error> for FpgaError {
    fn from(source: std::io::Error) -> Self {
        Self::io("I/O", source)
    }
}
