//! TCP listener for driver calls.
//!
//! Each accepted connection carries exactly one call and is served on its own
//! thread. The listener itself never limits concurrent calls; the worker's
//! admission guard decides which one runs.

use std::io::{self, BufReader, ErrorKind, Read};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::rpc::Worker;
use crate::stream::StreamError;

const ACCEPT_POLL: Duration = Duration::from_millis(20);

/// How long to wait for the driver to close after the trailer was sent.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Listening socket bound to a worker.
pub struct WorkerListener {
    listener: TcpListener,
    worker: Arc<Worker>,
}

impl WorkerListener {
    pub fn bind(addr: impl ToSocketAddrs, worker: Arc<Worker>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self { listener, worker })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept calls until `stop` is set.
    pub fn serve(self, stop: &AtomicBool) -> io::Result<()> {
        let calls = AtomicU64::new(0);
        while !stop.load(Ordering::Acquire) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let n = calls.fetch_add(1, Ordering::Relaxed);
                    let worker = Arc::clone(&self.worker);
                    let spawned = thread::Builder::new()
                        .name(format!("qps-call-{}", n))
                        .spawn(move || handle_connection(&worker, stream, peer));
                    if let Err(e) = spawned {
                        warn!(%peer, error = %e, "failed to spawn call thread");
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }
        info!("listener stopped");
        Ok(())
    }

    /// Serve on a background thread.
    pub fn spawn(self) -> io::Result<ListenerHandle> {
        let addr = self.local_addr()?;
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("qps-listener".into())
                .spawn(move || self.serve(&stop))?
        };
        Ok(ListenerHandle {
            addr,
            stop,
            thread: Some(thread),
        })
    }
}

/// Handle to a listener running on a background thread. Stops it on drop.
pub struct ListenerHandle {
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<io::Result<()>>>,
}

impl ListenerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting calls. Calls already running are not interrupted.
    pub fn shutdown(mut self) -> io::Result<()> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> io::Result<()> {
        self.stop.store(true, Ordering::Release);
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .unwrap_or_else(|_| Err(io::Error::new(ErrorKind::Other, "listener thread panicked"))),
            None => Ok(()),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop_and_join() {
            warn!(error = %e, "listener ended with error");
        }
    }
}

fn handle_connection(worker: &Worker, stream: TcpStream, peer: SocketAddr) {
    debug!(%peer, "call connected");
    match serve_connection(worker, &stream) {
        Ok(()) => debug!(%peer, "call closed"),
        Err(e) => warn!(%peer, error = %e, "call ended without trailer"),
    }
}

fn serve_connection(worker: &Worker, stream: &TcpStream) -> Result<(), StreamError> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    let mut reader = BufReader::new(stream.try_clone()?);

    let result = worker.serve_call(&mut reader, stream).map(|_| ());

    // Read whatever the driver still sends so closing does not reset the
    // connection before it has seen the trailer.
    let _ = stream.shutdown(Shutdown::Write);
    drain(&mut reader, stream, Instant::now() + DRAIN_TIMEOUT);
    result
}

/// Discard input until the peer closes or `deadline` passes.
fn drain(reader: &mut impl Read, stream: &TcpStream, deadline: Instant) {
    let mut buf = [0u8; 4096];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() || stream.set_read_timeout(Some(remaining)).is_err() {
            return;
        }
        match reader.read(&mut buf) {
            Ok(0) => return,
            Ok(_) => continue,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => return,
        }
    }
}
