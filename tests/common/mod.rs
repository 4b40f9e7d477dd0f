//! Shared helpers for worker integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::net::TcpListener;
use std::time::Duration;

use qps_bench::WorkerClient;
use qps_worker::{ListenerHandle, Worker, WorkerConfig, WorkerListener};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// A worker serving on a loopback port for the duration of a test.
pub struct TestWorker {
    pub handle: ListenerHandle,
    pub client: WorkerClient,
    pub server_port: u16,
}

/// Find a port nothing is listening on right now.
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

/// Start a worker from a config file, the way the binary does.
pub fn start_worker() -> TestWorker {
    let server_port = free_port();
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "bind_address = \"127.0.0.1\"\ndriver_port = 0\nserver_port = {}",
        server_port
    )
    .unwrap();

    let config = WorkerConfig::load(file.path()).unwrap();
    config.validate().unwrap();
    let worker = Arc::new(Worker::new(&config));
    let handle = WorkerListener::bind(config.driver_addr(), worker)
        .unwrap()
        .spawn()
        .unwrap();
    let client = WorkerClient::new(handle.local_addr())
        .unwrap()
        .with_read_timeout(Duration::from_secs(10));

    TestWorker {
        handle,
        client,
        server_port,
    }
}
