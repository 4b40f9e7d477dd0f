//! Closed-loop echo load client.
//!
//! The client drives `client_channels * outstanding_rpcs_per_channel` request
//! slots. Each slot has at most one request in flight against its channel's
//! target and records the round-trip latency of every completed request.

use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use qps_protocol::{ClientConfig, ClientStats};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, warn};

use super::histogram::Histogram;
use super::usage::UsageTimer;
use super::{BuildError, Client};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const IO_TIMEOUT: Duration = Duration::from_millis(500);
/// Pause after a failed request before the slot tries again.
const FAILURE_PAUSE: Duration = Duration::from_millis(20);

/// Thread layout of a load client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientThreading {
    /// One blocking thread per request slot.
    PerSlot,
    /// A fixed number of threads, each cycling through its share of slots.
    Shared(usize),
}

/// How requests map onto connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcShape {
    /// A new connection for every request.
    Unary,
    /// One long-lived connection per slot.
    Streaming,
}

/// Running load client. Stops its threads when dropped.
pub struct LoadClient {
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    histograms: Vec<Arc<Mutex<Histogram>>>,
    timer: UsageTimer,
}

impl LoadClient {
    /// Validate the config, resolve targets and start the workload threads.
    pub fn start(
        config: &ClientConfig,
        threading: ClientThreading,
        shape: RpcShape,
    ) -> Result<Self, BuildError> {
        if config.server_targets.is_empty() {
            return Err(BuildError::InvalidConfig("no server targets".into()));
        }
        if config.client_channels == 0 || config.outstanding_rpcs_per_channel == 0 {
            return Err(BuildError::InvalidConfig(
                "client_channels and outstanding_rpcs_per_channel must be at least 1".into(),
            ));
        }
        if threading == ClientThreading::Shared(0) {
            return Err(BuildError::InvalidConfig("async_client_threads must be at least 1".into()));
        }

        let targets = config
            .server_targets
            .iter()
            .map(|target| resolve(target))
            .collect::<Result<Vec<_>, _>>()?;

        let outstanding = config.outstanding_rpcs_per_channel as usize;
        let slots: Vec<Slot> = (0..config.client_channels as usize * outstanding)
            .map(|i| {
                let channel = i / outstanding;
                Slot::new(targets[channel % targets.len()], shape)
            })
            .collect();

        let payload: Arc<str> = Arc::from(random_payload(config.payload_size as usize));
        let groups = match threading {
            ClientThreading::PerSlot => slots.into_iter().map(|slot| vec![slot]).collect(),
            ClientThreading::Shared(threads) => distribute(slots, threads),
        };

        let stop = Arc::new(AtomicBool::new(false));
        let mut client = Self {
            stop: Arc::clone(&stop),
            workers: Vec::with_capacity(groups.len()),
            histograms: Vec::with_capacity(groups.len()),
            timer: UsageTimer::start(),
        };

        for (i, group) in groups.into_iter().enumerate() {
            let histogram = Arc::new(Mutex::new(Histogram::new()));
            let worker = {
                let histogram = Arc::clone(&histogram);
                let payload = Arc::clone(&payload);
                let stop = Arc::clone(&stop);
                thread::Builder::new()
                    .name(format!("load-client-{}", i))
                    .spawn(move || drive(group, &payload, &histogram, &stop))
                    // Dropping `client` stops the threads already started
                    .map_err(BuildError::Spawn)?
            };
            client.histograms.push(histogram);
            client.workers.push(worker);
        }

        debug!(threads = client.workers.len(), ?shape, "load client started");
        Ok(client)
    }
}

impl Client for LoadClient {
    fn mark(&mut self) -> ClientStats {
        let mut latencies = Histogram::new();
        for histogram in &self.histograms {
            if let Ok(histogram) = histogram.lock() {
                latencies.merge(&histogram);
            }
        }
        let sample = self.timer.sample();
        ClientStats {
            latencies: latencies.data(),
            time_elapsed: sample.wall,
            time_user: sample.user,
            time_system: sample.system,
        }
    }
}

impl Drop for LoadClient {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("load client thread panicked");
            }
        }
    }
}

fn resolve(target: &str) -> Result<SocketAddr, BuildError> {
    let mut addrs = target.to_socket_addrs().map_err(|source| BuildError::Resolve {
        target: target.to_string(),
        source,
    })?;
    addrs.next().ok_or_else(|| BuildError::Resolve {
        target: target.to_string(),
        source: io::Error::new(ErrorKind::NotFound, "no addresses"),
    })
}

fn random_payload(size: usize) -> String {
    let mut payload: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(size)
        .map(char::from)
        .collect();
    payload.push('\n');
    payload
}

/// Deal slots round-robin onto at most `threads` groups.
fn distribute(slots: Vec<Slot>, threads: usize) -> Vec<Vec<Slot>> {
    let mut groups: Vec<Vec<Slot>> = (0..threads.min(slots.len())).map(|_| Vec::new()).collect();
    let count = groups.len();
    for (i, slot) in slots.into_iter().enumerate() {
        groups[i % count].push(slot);
    }
    groups
}

fn drive(mut slots: Vec<Slot>, payload: &str, histogram: &Mutex<Histogram>, stop: &AtomicBool) {
    while !stop.load(Ordering::Acquire) {
        for slot in &mut slots {
            if stop.load(Ordering::Acquire) {
                return;
            }
            match slot.issue(payload) {
                Ok(latency) => {
                    if let Ok(mut histogram) = histogram.lock() {
                        histogram.add(latency.as_nanos() as f64);
                    }
                }
                Err(e) => {
                    debug!(addr = %slot.target, error = %e, "echo request failed");
                    thread::sleep(FAILURE_PAUSE);
                }
            }
        }
    }
}

struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Connection {
    fn open(target: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect_timeout(&target, CONNECT_TIMEOUT)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;
        Ok(Self {
            writer: stream.try_clone()?,
            reader: BufReader::new(stream),
        })
    }

    fn round_trip(&mut self, payload: &str, reply: &mut String) -> io::Result<()> {
        self.writer.write_all(payload.as_bytes())?;
        reply.clear();
        if self.reader.read_line(reply)? == 0 {
            return Err(io::Error::new(ErrorKind::UnexpectedEof, "server closed connection"));
        }
        Ok(())
    }
}

struct Slot {
    target: SocketAddr,
    shape: RpcShape,
    connection: Option<Connection>,
    reply: String,
}

impl Slot {
    fn new(target: SocketAddr, shape: RpcShape) -> Self {
        Self {
            target,
            shape,
            connection: None,
            reply: String::new(),
        }
    }

    /// Send one request and wait for its echo.
    fn issue(&mut self, payload: &str) -> io::Result<Duration> {
        let started = Instant::now();
        let mut connection = match self.connection.take() {
            Some(connection) => connection,
            None => Connection::open(self.target)?,
        };
        connection.round_trip(payload, &mut self.reply)?;
        let latency = started.elapsed();

        if self.shape == RpcShape::Streaming {
            self.connection = Some(connection);
        }
        Ok(latency)
    }
}
