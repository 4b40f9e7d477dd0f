//! QPS Bench - driver side
//!
//! Client library and command-line driver for remotely controlled QPS
//! benchmark workers. The worker itself lives in the `qps-worker` crate;
//! the messages both sides exchange live in `qps-protocol`.

pub mod host;
pub mod report;

pub use host::{Call, HostError, HostResult, Response, WorkerClient};
pub use report::Record;
