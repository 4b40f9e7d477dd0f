//! Test doubles shared by unit tests.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use qps_protocol::{ClientConfig, ClientStats, HistogramData, ServerConfig, ServerStats};

use crate::capability::{BuildError, CapabilityFactory, Client, Server};
use crate::dispatcher::{ClientVariant, ServerVariant};
use crate::stream::{CallStream, StreamError};

fn malformed() -> StreamError {
    let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    StreamError::Malformed(err)
}

/// Call stream that replays a fixed script and records what is written.
pub struct ScriptedStream<In, Out> {
    inbound: VecDeque<Result<In, StreamError>>,
    written: Vec<Out>,
    write_limit: Option<usize>,
    reads: usize,
}

impl<In, Out> ScriptedStream<In, Out> {
    pub fn new(messages: Vec<In>) -> Self {
        Self {
            inbound: messages.into_iter().map(Ok).collect(),
            written: Vec::new(),
            write_limit: None,
            reads: 0,
        }
    }

    pub fn then_malformed(mut self) -> Self {
        self.inbound.push_back(Err(malformed()));
        self
    }

    pub fn then_io_error(mut self) -> Self {
        self.inbound
            .push_back(Err(StreamError::Io(io::Error::from(io::ErrorKind::ConnectionReset))));
        self
    }

    /// Accept `n` writes, fail every one after that.
    pub fn fail_writes_after(mut self, n: usize) -> Self {
        self.write_limit = Some(n);
        self
    }

    pub fn written(&self) -> &[Out] {
        &self.written
    }

    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl<In, Out: Clone> CallStream<In, Out> for ScriptedStream<In, Out> {
    fn read(&mut self) -> Result<Option<In>, StreamError> {
        self.reads += 1;
        self.inbound.pop_front().transpose()
    }

    fn write(&mut self, message: &Out) -> Result<(), StreamError> {
        if self.write_limit.is_some_and(|limit| self.written.len() >= limit) {
            return Err(StreamError::Io(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        self.written.push(message.clone());
        Ok(())
    }
}

/// Call stream fed from a channel, for sessions that must stay open while a
/// test does something else. Dropping the sender closes the stream.
pub struct ChannelStream<In, Out> {
    inbound: Receiver<In>,
    written: Arc<Mutex<Vec<Out>>>,
}

impl<In, Out> ChannelStream<In, Out> {
    pub fn new(inbound: Receiver<In>) -> (Self, Arc<Mutex<Vec<Out>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let stream = Self {
            inbound,
            written: Arc::clone(&written),
        };
        (stream, written)
    }
}

impl<In, Out: Clone> CallStream<In, Out> for ChannelStream<In, Out> {
    fn read(&mut self) -> Result<Option<In>, StreamError> {
        Ok(self.inbound.recv().ok())
    }

    fn write(&mut self, message: &Out) -> Result<(), StreamError> {
        self.written.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Capability factory that builds counting fakes.
#[derive(Default)]
pub struct FakeFactory {
    fail: bool,
    builds: AtomicUsize,
    live: Arc<AtomicUsize>,
    last_client: Mutex<Option<ClientVariant>>,
    last_server: Mutex<Option<(ServerVariant, u16)>>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory whose every build fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// Capabilities built and not yet dropped.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn last_client(&self) -> Option<ClientVariant> {
        *self.last_client.lock().unwrap()
    }

    pub fn last_server(&self) -> Option<(ServerVariant, u16)> {
        *self.last_server.lock().unwrap()
    }

    fn check(&self, port: u16) -> Result<Counted, BuildError> {
        if self.fail {
            return Err(BuildError::InvalidConfig("fake build failure".into()));
        }
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Counted {
            port,
            marks: 0,
            live: Arc::clone(&self.live),
        })
    }
}

impl CapabilityFactory for FakeFactory {
    fn build_client(
        &self,
        variant: ClientVariant,
        _config: &ClientConfig,
    ) -> Result<Box<dyn Client>, BuildError> {
        let client = self.check(0)?;
        *self.last_client.lock().unwrap() = Some(variant);
        Ok(Box::new(client))
    }

    fn build_server(
        &self,
        variant: ServerVariant,
        _config: &ServerConfig,
        port: u16,
    ) -> Result<Box<dyn Server>, BuildError> {
        let server = self.check(port)?;
        *self.last_server.lock().unwrap() = Some((variant, port));
        Ok(Box::new(server))
    }
}

/// Fake capability whose stats count the marks taken.
struct Counted {
    port: u16,
    marks: u32,
    live: Arc<AtomicUsize>,
}

impl Drop for Counted {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Client for Counted {
    fn mark(&mut self) -> ClientStats {
        self.marks += 1;
        ClientStats {
            latencies: HistogramData {
                count: self.marks as f64,
                ..Default::default()
            },
            time_elapsed: self.marks as f64,
            ..Default::default()
        }
    }
}

impl Server for Counted {
    fn port(&self) -> u16 {
        self.port
    }

    fn mark(&mut self) -> ServerStats {
        self.marks += 1;
        ServerStats {
            time_elapsed: self.marks as f64,
            ..Default::default()
        }
    }
}
