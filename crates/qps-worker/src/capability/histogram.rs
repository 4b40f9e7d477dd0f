//! Log-bucketed latency histogram.

use qps_protocol::HistogramData;

/// Relative width of each bucket.
pub const RESOLUTION: f64 = 0.01;

/// Largest value the histogram distinguishes (60 s in nanoseconds).
pub const MAX_POSSIBLE: f64 = 60e9;

/// Histogram with geometrically growing buckets.
#[derive(Debug, Clone)]
pub struct Histogram {
    one_on_log_multiplier: f64,
    buckets: Vec<u32>,
    min_seen: f64,
    max_seen: f64,
    sum: f64,
    sum_of_squares: f64,
    count: f64,
}

impl Histogram {
    pub fn new() -> Self {
        let one_on_log_multiplier = 1.0 / (1.0 + RESOLUTION).ln();
        let num_buckets = Self::bucket_index(one_on_log_multiplier, MAX_POSSIBLE) + 1;
        Self {
            one_on_log_multiplier,
            buckets: vec![0; num_buckets],
            min_seen: MAX_POSSIBLE,
            max_seen: 0.0,
            sum: 0.0,
            sum_of_squares: 0.0,
            count: 0.0,
        }
    }

    fn bucket_index(one_on_log_multiplier: f64, value: f64) -> usize {
        (value.clamp(1.0, MAX_POSSIBLE).ln() * one_on_log_multiplier) as usize
    }

    /// Record one value.
    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.sum_of_squares += value * value;
        self.count += 1.0;
        self.min_seen = self.min_seen.min(value);
        self.max_seen = self.max_seen.max(value);

        let index = Self::bucket_index(self.one_on_log_multiplier, value).min(self.buckets.len() - 1);
        self.buckets[index] = self.buckets[index].saturating_add(1);
    }

    /// Fold another histogram into this one.
    pub fn merge(&mut self, other: &Histogram) {
        self.sum += other.sum;
        self.sum_of_squares += other.sum_of_squares;
        self.count += other.count;
        self.min_seen = self.min_seen.min(other.min_seen);
        self.max_seen = self.max_seen.max(other.max_seen);
        for (mine, theirs) in self.buckets.iter_mut().zip(&other.buckets) {
            *mine = mine.saturating_add(*theirs);
        }
    }

    pub fn count(&self) -> f64 {
        self.count
    }

    pub fn data(&self) -> HistogramData {
        HistogramData {
            bucket: self.buckets.clone(),
            min_seen: self.min_seen,
            max_seen: self.max_seen,
            sum: self.sum,
            sum_of_squares: self.sum_of_squares,
            count: self.count,
        }
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}
