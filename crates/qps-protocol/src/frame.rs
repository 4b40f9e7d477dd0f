//! Call framing.
//!
//! One connection carries one call. Every frame is a single line of JSON:
//! the driver opens with a [`CallHeader`], then streams request messages and
//! half-closes its side. The worker answers with zero or more
//! [`ResponseFrame::Message`] lines and exactly one [`ResponseFrame::Status`]
//! trailer before closing.

use serde::{Deserialize, Serialize};

use crate::status::CallStatus;

/// Methods a worker serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Build a load-generating client and report its stats.
    RunTest,
    /// Start a server-under-test and report its stats.
    RunServer,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RunTest => "run_test",
            Self::RunServer => "run_server",
        }
    }
}

/// First frame of every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallHeader {
    /// Method name as sent; kept raw so unknown methods can be reported.
    pub method: String,
}

impl CallHeader {
    pub fn new(method: Method) -> Self {
        Self {
            method: method.as_str().to_string(),
        }
    }

    /// Resolve the method, if this worker knows it.
    pub fn method(&self) -> Option<Method> {
        match self.method.as_str() {
            "run_test" => Some(Method::RunTest),
            "run_server" => Some(Method::RunServer),
            _ => None,
        }
    }
}

/// Frame sent from the worker to the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFrame<T> {
    Message(T),
    Status(CallStatus),
}
