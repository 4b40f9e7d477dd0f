//! Line-echo server-under-test.
//!
//! Every newline-terminated line a connection sends is written straight back.
//! The listener is bound when the server starts, so a busy port fails the
//! build instead of the first request.

use std::io::{self, BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use qps_protocol::ServerStats;
use tracing::{debug, warn};

use super::usage::UsageTimer;
use super::{BuildError, Server};

/// How often blocked threads wake up to check for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Pause of a pool thread after a pass in which none of its connections moved.
const IDLE_PAUSE: Duration = Duration::from_micros(200);

const READ_CHUNK: usize = 16 * 1024;

/// Thread layout of an echo server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerThreading {
    /// One thread per accepted connection.
    PerConnection,
    /// A fixed pool of threads. Each thread polls all connections assigned
    /// to it, so the pool serves any number of concurrent connections.
    Pool(usize),
}

/// Running echo server. Stops and releases its port when dropped.
pub struct EchoServer {
    port: u16,
    stop: Arc<AtomicBool>,
    acceptor: Option<JoinHandle<()>>,
    timer: UsageTimer,
}

impl EchoServer {
    /// Bind `bind_address:port` and start serving.
    pub fn start(bind_address: &str, port: u16, threading: ServerThreading) -> Result<Self, BuildError> {
        if threading == ServerThreading::Pool(0) {
            return Err(BuildError::InvalidConfig("server threads must be at least 1".into()));
        }

        let listener =
            TcpListener::bind((bind_address, port)).map_err(|source| BuildError::Bind { port, source })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| BuildError::Bind { port, source })?;
        let port = listener
            .local_addr()
            .map_err(|source| BuildError::Bind { port, source })?
            .port();

        let stop = Arc::new(AtomicBool::new(false));
        let acceptor = {
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name(format!("echo-accept-{}", port))
                .spawn(move || accept_loop(listener, threading, &stop))
                .map_err(BuildError::Spawn)?
        };

        debug!(port, ?threading, "echo server started");
        Ok(Self {
            port,
            stop,
            acceptor: Some(acceptor),
            timer: UsageTimer::start(),
        })
    }
}

impl Server for EchoServer {
    fn port(&self) -> u16 {
        self.port
    }

    fn mark(&mut self) -> ServerStats {
        let sample = self.timer.sample();
        ServerStats {
            time_elapsed: sample.wall,
            time_user: sample.user,
            time_system: sample.system,
        }
    }
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(acceptor) = self.acceptor.take() {
            if acceptor.join().is_err() {
                warn!(port = self.port, "echo accept thread panicked");
            }
        }
        debug!(port = self.port, "echo server stopped");
    }
}

fn accept_loop(listener: TcpListener, threading: ServerThreading, stop: &Arc<AtomicBool>) {
    let mut handlers: Vec<JoinHandle<()>> = Vec::new();
    let mut pool = match threading {
        ServerThreading::Pool(threads) => Some(spawn_pool(threads, stop)),
        ServerThreading::PerConnection => None,
    };
    let mut next = 0usize;

    while !stop.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!(%peer, "echo connection accepted");
                match &pool {
                    Some((senders, _)) => {
                        // Round-robin so long-lived connections spread across the pool
                        let sender = senders.get(next % senders.len().max(1));
                        next = next.wrapping_add(1);
                        if sender.map_or(true, |sender| sender.send(stream).is_err()) {
                            warn!(%peer, "no echo pool thread, dropping connection");
                        }
                    }
                    None => {
                        let stop = Arc::clone(stop);
                        match thread::Builder::new()
                            .name("echo-conn".into())
                            .spawn(move || log_connection_end(serve_connection(stream, &stop)))
                        {
                            Ok(handle) => handlers.push(handle),
                            Err(e) => warn!(error = %e, "failed to spawn echo connection thread"),
                        }
                    }
                }
                handlers.retain(|h| !h.is_finished());
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                warn!(error = %e, "echo accept failed");
                thread::sleep(POLL_INTERVAL);
            }
        }
    }

    if let Some((senders, workers)) = pool.take() {
        drop(senders);
        handlers.extend(workers);
    }
    for handle in handlers {
        let _ = handle.join();
    }
}

type Pool = (Vec<Sender<TcpStream>>, Vec<JoinHandle<()>>);

fn spawn_pool(threads: usize, stop: &Arc<AtomicBool>) -> Pool {
    let mut senders = Vec::with_capacity(threads);
    let mut workers = Vec::with_capacity(threads);
    for i in 0..threads {
        let (sender, receiver) = mpsc::channel::<TcpStream>();
        let stop = Arc::clone(stop);
        match thread::Builder::new()
            .name(format!("echo-pool-{}", i))
            .spawn(move || pool_worker(receiver, &stop))
        {
            Ok(handle) => {
                senders.push(sender);
                workers.push(handle);
            }
            Err(e) => warn!(error = %e, "failed to spawn echo pool thread"),
        }
    }
    (senders, workers)
}

/// Serve every connection handed to this thread, polling them in turn.
fn pool_worker(incoming: Receiver<TcpStream>, stop: &AtomicBool) {
    let mut connections: Vec<PolledConnection> = Vec::new();
    let mut buf = vec![0u8; READ_CHUNK];

    while !stop.load(Ordering::Acquire) {
        // Block for new connections only while there is nothing else to serve
        if connections.is_empty() {
            match incoming.recv_timeout(POLL_INTERVAL) {
                Ok(stream) => adopt(&mut connections, stream),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
        loop {
            match incoming.try_recv() {
                Ok(stream) => adopt(&mut connections, stream),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            }
        }

        let mut active = false;
        connections.retain_mut(|connection| match connection.poll(&mut buf) {
            Ok(Progress::Active) => {
                active = true;
                true
            }
            Ok(Progress::Idle) => true,
            Ok(Progress::Closed) => false,
            Err(e) => {
                log_connection_end(Err(e));
                false
            }
        });
        if !active {
            thread::sleep(IDLE_PAUSE);
        }
    }
}

fn adopt(connections: &mut Vec<PolledConnection>, stream: TcpStream) {
    match PolledConnection::new(stream) {
        Ok(connection) => connections.push(connection),
        Err(e) => log_connection_end(Err(e)),
    }
}

enum Progress {
    Active,
    Idle,
    Closed,
}

/// Nonblocking connection served by a pool thread.
struct PolledConnection {
    stream: TcpStream,
    inbound: Vec<u8>,
    outbound: Vec<u8>,
}

impl PolledConnection {
    fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            inbound: Vec::new(),
            outbound: Vec::new(),
        })
    }

    /// Read whatever has arrived, queue complete lines for echo and write as
    /// much of the queue as the socket takes.
    fn poll(&mut self, buf: &mut [u8]) -> io::Result<Progress> {
        let mut active = false;
        let mut closed = false;
        loop {
            match self.stream.read(buf) {
                Ok(0) => {
                    closed = true;
                    break;
                }
                Ok(n) => {
                    self.inbound.extend_from_slice(&buf[..n]);
                    active = true;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        if let Some(end) = self.inbound.iter().rposition(|&b| b == b'\n') {
            self.outbound.extend(self.inbound.drain(..=end));
        }
        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) => return Err(io::Error::from(ErrorKind::WriteZero)),
                Ok(n) => {
                    self.outbound.drain(..n);
                    active = true;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(if closed {
            Progress::Closed
        } else if active {
            Progress::Active
        } else {
            Progress::Idle
        })
    }
}

fn serve_connection(stream: TcpStream, stop: &AtomicBool) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(POLL_INTERVAL))?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let mut line = String::new();

    while !stop.load(Ordering::Acquire) {
        match reader.read_line(&mut line) {
            Ok(0) => return Ok(()),
            Ok(_) => {
                if line.ends_with('\n') {
                    writer.write_all(line.as_bytes())?;
                    line.clear();
                }
            }
            // Bytes read before a timeout stay in `line`
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn log_connection_end(result: io::Result<()>) {
    if let Err(e) = result {
        debug!(error = %e, "echo connection ended with error");
    }
}
