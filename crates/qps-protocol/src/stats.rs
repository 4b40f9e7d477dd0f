//! Performance snapshot payloads.

use serde::{Deserialize, Serialize};

/// Serialized latency histogram.
///
/// Bucket `i` covers values in `[(1 + resolution)^i, (1 + resolution)^(i + 1))`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramData {
    pub bucket: Vec<u32>,
    pub min_seen: f64,
    pub max_seen: f64,
    pub sum: f64,
    pub sum_of_squares: f64,
    pub count: f64,
}

/// Cumulative statistics reported by a load-generating client.
///
/// Times are in seconds since the client was constructed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientStats {
    /// RPC latencies in nanoseconds.
    pub latencies: HistogramData,
    pub time_elapsed: f64,
    pub time_user: f64,
    pub time_system: f64,
}

/// Cumulative statistics reported by a server-under-test.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerStats {
    pub time_elapsed: f64,
    pub time_user: f64,
    pub time_system: f64,
}
