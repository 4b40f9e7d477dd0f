//! Tracing setup for the worker binary.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info,qps_worker=debug";

/// Install a stderr subscriber. `RUST_LOG` takes precedence over the default filter.
///
/// Calling this more than once is harmless; later calls keep the first subscriber.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(true)
        .try_init();
}
