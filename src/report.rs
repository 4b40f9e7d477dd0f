//! JSON-lines output for the driver.

use chrono::{DateTime, Utc};
use qps_protocol::ResponseFrame;
use serde::Serialize;

/// One line of driver output: something the worker sent, stamped on arrival.
#[derive(Debug, Serialize)]
pub struct Record<T> {
    pub timestamp: DateTime<Utc>,
    pub worker: String,
    /// Position of this frame within the call, starting at 0.
    pub seq: u64,
    #[serde(flatten)]
    pub frame: ResponseFrame<T>,
}

impl<T: Serialize> Record<T> {
    pub fn now(worker: impl Into<String>, seq: u64, frame: ResponseFrame<T>) -> Self {
        Self {
            timestamp: Utc::now(),
            worker: worker.into(),
            seq,
            frame,
        }
    }

    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
