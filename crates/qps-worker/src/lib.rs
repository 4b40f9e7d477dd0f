//! QPS Benchmark Worker
//!
//! A worker is remotely controlled by a benchmark driver. Over a single
//! streaming call the driver asks it to build either a load-generating
//! client (RunTest) or a server-under-test (RunServer), then requests stats
//! snapshots ("marks") until it closes the stream.
//!
//! A worker runs at most one such session at a time; concurrent calls are
//! turned away with RESOURCE_EXHAUSTED.
//!
//! This crate can be used in two modes:
//! - **Standalone binary**: `qps-worker`, listening for driver calls over TCP
//! - **In-process library**: [`Worker`] driven over any [`CallStream`], for tests

pub mod capability;
pub mod config;
pub mod dispatcher;
pub mod guard;
pub mod listener;
pub mod logging;
pub mod rpc;
pub mod session;
pub mod stream;

#[cfg(test)]
mod testing;

pub use capability::{BuildError, CapabilityFactory, Client, EchoCapabilities, Server};
pub use config::{ConfigError, WorkerConfig};
pub use dispatcher::{create_client, create_server, ClientVariant, DispatchError, ServerVariant};
pub use guard::{AdmissionGuard, AdmissionPermit};
pub use listener::{ListenerHandle, WorkerListener};
pub use rpc::Worker;
pub use session::{SessionError, SessionSummary};
pub use stream::{CallStream, JsonLinesStream, StreamError};
