//! Capability dispatcher.
//!
//! Maps a setup message onto one of the known client or server variants and
//! asks the capability factory to build it. Selection is an exhaustive match,
//! so a kind outside the known set surfaces as [`DispatchError::UnsupportedKind`]
//! and never reaches the factory.

use qps_protocol::{ClientConfig, ClientType, RpcType, ServerConfig, ServerType};
use thiserror::Error;

use crate::capability::{BuildError, CapabilityFactory, Client, Server};

/// Errors from selecting or building a capability.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The driver sent a kind this build does not know (version mismatch).
    #[error("unsupported {field}: {value}")]
    UnsupportedKind { field: &'static str, value: String },

    /// The kind is known but the capability could not be built.
    #[error("failed to build {variant}: {source}")]
    Build {
        variant: &'static str,
        #[source]
        source: BuildError,
    },
}

/// Load-generating client variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientVariant {
    SyncUnary,
    SyncStreaming,
    AsyncUnary,
    AsyncStreaming,
}

impl ClientVariant {
    /// Select the variant named by a client setup.
    pub fn select(config: &ClientConfig) -> Result<Self, DispatchError> {
        match (&config.client_type, &config.rpc_type) {
            (ClientType::Synchronous, RpcType::Unary) => Ok(Self::SyncUnary),
            (ClientType::Synchronous, RpcType::Streaming) => Ok(Self::SyncStreaming),
            (ClientType::Async, RpcType::Unary) => Ok(Self::AsyncUnary),
            (ClientType::Async, RpcType::Streaming) => Ok(Self::AsyncStreaming),
            (ClientType::Unrecognized(value), _) => Err(DispatchError::UnsupportedKind {
                field: "client_type",
                value: value.clone(),
            }),
            (_, RpcType::Unrecognized(value)) => Err(DispatchError::UnsupportedKind {
                field: "rpc_type",
                value: value.clone(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SyncUnary => "synchronous unary client",
            Self::SyncStreaming => "synchronous streaming client",
            Self::AsyncUnary => "asynchronous unary client",
            Self::AsyncStreaming => "asynchronous streaming client",
        }
    }
}

/// Server-under-test variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerVariant {
    Sync,
    Async,
}

impl ServerVariant {
    /// Select the variant named by a server setup.
    pub fn select(config: &ServerConfig) -> Result<Self, DispatchError> {
        match &config.server_type {
            ServerType::Synchronous => Ok(Self::Sync),
            ServerType::Async => Ok(Self::Async),
            ServerType::Unrecognized(value) => Err(DispatchError::UnsupportedKind {
                field: "server_type",
                value: value.clone(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sync => "synchronous server",
            Self::Async => "asynchronous server",
        }
    }
}

/// Build the client a setup asks for.
pub fn create_client(
    factory: &dyn CapabilityFactory,
    config: &ClientConfig,
) -> Result<Box<dyn Client>, DispatchError> {
    let variant = ClientVariant::select(config)?;
    factory
        .build_client(variant, config)
        .map_err(|source| DispatchError::Build {
            variant: variant.name(),
            source,
        })
}

/// Build the server a setup asks for, bound to the worker's server port.
pub fn create_server(
    factory: &dyn CapabilityFactory,
    config: &ServerConfig,
    port: u16,
) -> Result<Box<dyn Server>, DispatchError> {
    let variant = ServerVariant::select(config)?;
    factory
        .build_server(variant, config, port)
        .map_err(|source| DispatchError::Build {
            variant: variant.name(),
            source,
        })
}
