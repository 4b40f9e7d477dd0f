//! Driver-Side Client
//!
//! Opens benchmark calls against a worker and exchanges messages over them.

pub mod call;
pub mod client;

pub use call::{Call, Response};
pub use client::WorkerClient;

/// Errors raised while talking to a worker
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Worker closed the call without a status")]
    MissingTrailer,
}

/// Result type for host operations
pub type HostResult<T> = Result<T, HostError>;
