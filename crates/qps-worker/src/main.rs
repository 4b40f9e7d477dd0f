//! QPS Worker Entrypoint
//!
//! Usage: qps-worker [--config FILE] [--driver-port N] [--server-port N]
//!
//! Listens for driver calls and serves one benchmark session at a time
//! until interrupted.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use qps_worker::{logging, Worker, WorkerConfig, WorkerListener};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "qps-worker")]
#[command(about = "Remotely controlled QPS benchmark worker", version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Port to listen on for driver calls
    #[arg(long)]
    driver_port: Option<u16>,

    /// Port servers-under-test are bound to
    #[arg(long)]
    server_port: Option<u16>,

    /// Address to bind both listeners to
    #[arg(long)]
    bind: Option<String>,

    /// Abort on client/server kinds this build does not know
    #[arg(long)]
    strict_kinds: bool,
}

impl Cli {
    fn into_config(self) -> Result<WorkerConfig, qps_worker::ConfigError> {
        let mut config = match &self.config {
            Some(path) => WorkerConfig::load(path)?,
            None => WorkerConfig::default(),
        };
        if let Some(port) = self.driver_port {
            config.driver_port = port;
        }
        if let Some(port) = self.server_port {
            config.server_port = port;
        }
        if let Some(bind) = self.bind {
            config.bind_address = bind;
        }
        config.strict_kinds |= self.strict_kinds;
        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    logging::init();

    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let worker = Arc::new(Worker::new(&config));
    let listener = match WorkerListener::bind(config.driver_addr(), worker) {
        Ok(listener) => listener,
        Err(e) => {
            error!(port = config.driver_port, error = %e, "failed to bind driver port");
            return ExitCode::FAILURE;
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        if let Err(e) = ctrlc::set_handler(move || stop.store(true, Ordering::Release)) {
            warn!(error = %e, "failed to install interrupt handler");
        }
    }

    match listener.local_addr() {
        Ok(addr) => info!(%addr, server_port = config.server_port, strict_kinds = config.strict_kinds, "worker listening"),
        Err(e) => warn!(error = %e, "listener address unavailable"),
    }

    if let Err(e) = listener.serve(&stop) {
        error!(error = %e, "listener failed");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
