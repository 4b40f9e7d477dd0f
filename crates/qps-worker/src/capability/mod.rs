//! Benchmark capabilities.
//!
//! A session owns exactly one capability: a load-generating [`Client`] or a
//! [`Server`]-under-test. Sessions only ever ask a capability for a stats
//! snapshot; the workload itself runs on the capability's own threads and
//! stops when the capability is dropped.
//!
//! [`EchoCapabilities`] is the built-in factory: a line-echo server and a
//! closed-loop echo client.

pub mod echo_server;
pub mod histogram;
pub mod load_client;
pub mod usage;

use std::io;

use qps_protocol::{ClientConfig, ClientStats, ServerConfig, ServerStats};
use thiserror::Error;

use crate::dispatcher::{ClientVariant, ServerVariant};

pub use echo_server::{EchoServer, ServerThreading};
pub use histogram::Histogram;
pub use load_client::{ClientThreading, LoadClient, RpcShape};
pub use usage::{UsageSample, UsageTimer};

/// Errors from building a capability.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot resolve target {target}: {source}")]
    Resolve {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn workload thread: {0}")]
    Spawn(#[source] io::Error),
}

/// A load-generating client.
pub trait Client: Send {
    /// Cumulative statistics since the client was built.
    fn mark(&mut self) -> ClientStats;
}

/// A server-under-test.
pub trait Server: Send {
    /// Port the server is listening on.
    fn port(&self) -> u16;

    /// Cumulative statistics since the server was started.
    fn mark(&mut self) -> ServerStats;
}

/// Builds capabilities for the dispatcher.
pub trait CapabilityFactory: Send + Sync {
    fn build_client(
        &self,
        variant: ClientVariant,
        config: &ClientConfig,
    ) -> Result<Box<dyn Client>, BuildError>;

    fn build_server(
        &self,
        variant: ServerVariant,
        config: &ServerConfig,
        port: u16,
    ) -> Result<Box<dyn Server>, BuildError>;
}

/// Built-in echo workload.
#[derive(Debug, Clone)]
pub struct EchoCapabilities {
    bind_address: String,
}

impl EchoCapabilities {
    /// Servers started by this factory bind to `bind_address`.
    pub fn new(bind_address: impl Into<String>) -> Self {
        Self {
            bind_address: bind_address.into(),
        }
    }
}

impl CapabilityFactory for EchoCapabilities {
    fn build_client(
        &self,
        variant: ClientVariant,
        config: &ClientConfig,
    ) -> Result<Box<dyn Client>, BuildError> {
        let async_threads = config.async_client_threads as usize;
        let (threading, shape) = match variant {
            ClientVariant::SyncUnary => (ClientThreading::PerSlot, RpcShape::Unary),
            ClientVariant::SyncStreaming => (ClientThreading::PerSlot, RpcShape::Streaming),
            ClientVariant::AsyncUnary => (ClientThreading::Shared(async_threads), RpcShape::Unary),
            ClientVariant::AsyncStreaming => {
                (ClientThreading::Shared(async_threads), RpcShape::Streaming)
            }
        };
        Ok(Box::new(LoadClient::start(config, threading, shape)?))
    }

    fn build_server(
        &self,
        variant: ServerVariant,
        config: &ServerConfig,
        port: u16,
    ) -> Result<Box<dyn Server>, BuildError> {
        let threading = match variant {
            ServerVariant::Sync => ServerThreading::PerConnection,
            ServerVariant::Async => ServerThreading::Pool(config.threads as usize),
        };
        Ok(Box::new(EchoServer::start(&self.bind_address, port, threading)?))
    }
}
