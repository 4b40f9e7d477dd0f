//! QPS Protocol Types
//!
//! Defines the control messages exchanged between a benchmark driver and a
//! worker, the call status codes, and the line framing used on the wire.

pub mod frame;
pub mod kind;
pub mod ops;
pub mod stats;
pub mod status;

pub use frame::{CallHeader, Method, ResponseFrame};
pub use kind::{ClientType, RpcType, ServerType};
pub use ops::{ClientArgs, ClientConfig, ClientStatus, Mark, ServerArgs, ServerConfig, ServerStatus};
pub use stats::{ClientStats, HistogramData, ServerStats};
pub use status::{CallStatus, StatusCode};

/// Default port the worker listens on for driver calls.
pub const DEFAULT_DRIVER_PORT: u16 = 10000;

/// Default port servers-under-test are bound to.
pub const DEFAULT_SERVER_PORT: u16 = 10010;
