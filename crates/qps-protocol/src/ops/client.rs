//! RunTest message types.

use serde::{Deserialize, Serialize};

use super::{one, Mark};
use crate::kind::{ClientType, RpcType};
use crate::stats::ClientStats;

/// Inbound message on a RunTest call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientArgs {
    Setup(ClientConfig),
    Mark(Mark),
}

/// Configuration of the load-generating client to build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub client_type: ClientType,
    pub rpc_type: RpcType,
    /// Addresses (`host:port`) of the servers-under-test to load.
    #[serde(default)]
    pub server_targets: Vec<String>,
    #[serde(default = "one")]
    pub client_channels: u32,
    #[serde(default = "one")]
    pub outstanding_rpcs_per_channel: u32,
    /// Driver threads for asynchronous clients.
    #[serde(default = "one")]
    pub async_client_threads: u32,
    /// Request payload size in bytes.
    #[serde(default)]
    pub payload_size: u32,
}

impl ClientConfig {
    /// Create a config with single-channel defaults.
    pub fn new(client_type: ClientType, rpc_type: RpcType, server_targets: Vec<String>) -> Self {
        Self {
            client_type,
            rpc_type,
            server_targets,
            client_channels: 1,
            outstanding_rpcs_per_channel: 1,
            async_client_threads: 1,
            payload_size: 0,
        }
    }
}

/// Outbound message on a RunTest call.
///
/// The first status of a session carries no stats.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<ClientStats>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_setup_uses_defaults() {
        let args: ClientArgs = serde_json::from_value(json!({
            "setup": {
                "client_type": "SYNCHRONOUS_CLIENT",
                "rpc_type": "STREAMING",
                "server_targets": ["127.0.0.1:10010"]
            }
        }))
        .unwrap();

        let ClientArgs::Setup(config) = args else {
            panic!("expected setup");
        };
        assert_eq!(config.client_type, ClientType::Synchronous);
        assert_eq!(config.rpc_type, RpcType::Streaming);
        assert_eq!(config.client_channels, 1);
        assert_eq!(config.outstanding_rpcs_per_channel, 1);
        assert_eq!(config.payload_size, 0);
    }

    #[test]
    fn test_mark_wire_shape() {
        let json = serde_json::to_value(ClientArgs::Mark(Mark {})).unwrap();
        assert_eq!(json, json!({ "mark": {} }));

        let args: ClientArgs = serde_json::from_value(json!({ "mark": {} })).unwrap();
        assert_eq!(args, ClientArgs::Mark(Mark {}));
    }

    #[test]
    fn test_empty_status_has_no_stats_field() {
        let json = serde_json::to_value(ClientStatus::default()).unwrap();
        assert_eq!(json, json!({}));
    }

    #[test]
    fn test_args_without_variant_is_malformed() {
        assert!(serde_json::from_value::<ClientArgs>(json!({})).is_err());
        assert!(serde_json::from_value::<ClientArgs>(json!({ "teardown": {} })).is_err());
    }
}
