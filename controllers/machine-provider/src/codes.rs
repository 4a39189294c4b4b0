//! Status codes of the callback surface
//!
//! The fleet manager reads the code of a failed callback as a retry
//! directive, which makes this mapping part of the provider contract:
//! `InvalidArgument` is permanent, `Internal` retries with back-off,
//! `Unavailable` retries on a short delay, `Uninitialized` triggers
//! `InitializeMachine`, `NotFound` triggers `CreateMachine` and
//! `DeadlineExceeded` retries shortly.

use std::fmt;

use thiserror::Error;

/// Retry directive attached to a failed callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    /// Malformed request; the fleet manager will not retry.
    InvalidArgument,
    /// No machine; the fleet manager runs the create flow.
    NotFound,
    /// Transient failure; retried with back-off.
    Internal,
    /// A pre-condition is not met yet; retried on a short delay.
    Unavailable,
    /// The machine exists but is not initialized; the fleet manager runs
    /// the initialize flow.
    Uninitialized,
    /// A bounded wait ran out; retried on a short delay.
    DeadlineExceeded,
    /// The callback is not offered by this provider.
    Unimplemented,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Code::InvalidArgument => "InvalidArgument",
            Code::NotFound => "NotFound",
            Code::Internal => "Internal",
            Code::Unavailable => "Unavailable",
            Code::Uninitialized => "Uninitialized",
            Code::DeadlineExceeded => "DeadlineExceeded",
            Code::Unimplemented => "Unimplemented",
        };
        f.write_str(name)
    }
}

/// Error returned by a callback: a retry-directive code plus a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    pub fn uninitialized(message: impl Into<String>) -> Self {
        Self::new(Code::Uninitialized, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(Code::Unimplemented, message)
    }
}
