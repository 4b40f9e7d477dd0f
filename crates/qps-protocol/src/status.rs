//! Call status codes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status codes a call can finish with.
///
/// These codes are stable and used by drivers for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    /// The driver closed its stream and the session ended cleanly.
    Ok,
    /// Protocol violation, or a setup the worker could not build.
    InvalidArgument,
    /// Another session is already active on this worker.
    ResourceExhausted,
    /// Writing to the driver failed.
    Unknown,
    /// The call named a method this worker does not serve.
    Unimplemented,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            Self::ResourceExhausted => write!(f, "RESOURCE_EXHAUSTED"),
            Self::Unknown => write!(f, "UNKNOWN"),
            Self::Unimplemented => write!(f, "UNIMPLEMENTED"),
        }
    }
}

/// Final status of a call, sent as the trailer frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStatus {
    pub code: StatusCode,
    /// Human-readable, single-line detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CallStatus {
    /// Create a status with a detail message.
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    /// Create an OK status.
    pub fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            message: None,
        }
    }

    /// Create an INVALID_ARGUMENT status.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StatusCode::InvalidArgument, message)
    }

    /// Create a RESOURCE_EXHAUSTED status.
    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(StatusCode::ResourceExhausted, message)
    }

    /// Create an UNKNOWN status.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unknown, message)
    }

    /// Create an UNIMPLEMENTED status.
    pub fn unimplemented(method: &str) -> Self {
        Self::new(StatusCode::Unimplemented, format!("unknown method: {}", method))
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.code, message),
            None => write!(f, "{}", self.code),
        }
    }
}
