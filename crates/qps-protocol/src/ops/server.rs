//! RunServer message types.

use serde::{Deserialize, Serialize};

use super::{one, Mark};
use crate::kind::ServerType;
use crate::stats::ServerStats;

/// Inbound message on a RunServer call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerArgs {
    Setup(ServerConfig),
    Mark(Mark),
}

/// Configuration of the server-under-test to start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub server_type: ServerType,
    /// Worker threads for asynchronous servers.
    #[serde(default = "one")]
    pub threads: u32,
}

impl ServerConfig {
    pub fn new(server_type: ServerType) -> Self {
        Self {
            server_type,
            threads: 1,
        }
    }
}

/// Outbound message on a RunServer call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerStatus {
    /// Port the server-under-test listens on.
    pub bound_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<ServerStats>,
}
