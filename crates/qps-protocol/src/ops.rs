//! Per-method message types.

pub mod client;
pub mod server;

pub use client::{ClientArgs, ClientConfig, ClientStatus};
pub use server::{ServerArgs, ServerConfig, ServerStatus};

use serde::{Deserialize, Serialize};

/// Request for the current cumulative statistics snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mark {}

pub(crate) fn one() -> u32 {
    1
}
