//! Worker service.
//!
//! Exposes the two benchmark methods, RunTest and RunServer. Every call first
//! tries to take the worker's admission guard; a call that loses is answered
//! with RESOURCE_EXHAUSTED before any message is read or written.

use std::io::{BufRead, Write};
use std::sync::Arc;

use qps_protocol::{
    CallHeader, CallStatus, ClientArgs, ClientStatus, Method, ServerArgs, ServerStatus,
};
use tracing::{error, info, info_span, warn};
use ulid::Ulid;

use crate::capability::{CapabilityFactory, EchoCapabilities};
use crate::config::WorkerConfig;
use crate::guard::AdmissionGuard;
use crate::session::{self, ClientRole, ServerRole, SessionError, SessionSummary};
use crate::stream::{CallStream, JsonLinesStream, StreamError};

/// A benchmark worker. One per process.
pub struct Worker {
    guard: AdmissionGuard,
    server_port: u16,
    factory: Arc<dyn CapabilityFactory>,
    strict_kinds: bool,
}

impl Worker {
    /// Create a worker with the built-in echo capabilities.
    pub fn new(config: &WorkerConfig) -> Self {
        let factory = Arc::new(EchoCapabilities::new(config.bind_address.clone()));
        Self::with_factory(config.server_port, factory).strict_kinds(config.strict_kinds)
    }

    /// Create a worker that builds capabilities with `factory`.
    pub fn with_factory(server_port: u16, factory: Arc<dyn CapabilityFactory>) -> Self {
        Self {
            guard: AdmissionGuard::new(),
            server_port,
            factory,
            strict_kinds: false,
        }
    }

    /// Abort the process on unrecognized client or server kinds.
    pub fn strict_kinds(mut self, strict: bool) -> Self {
        self.strict_kinds = strict;
        self
    }

    pub fn server_port(&self) -> u16 {
        self.server_port
    }

    /// Whether a session is currently running.
    pub fn is_busy(&self) -> bool {
        self.guard.is_busy()
    }

    /// RunTest: build a load-generating client and report its stats.
    pub fn run_test<S>(&self, stream: &mut S) -> CallStatus
    where
        S: CallStream<ClientArgs, ClientStatus> + ?Sized,
    {
        let Some(_permit) = self.guard.try_acquire() else {
            warn!("worker busy, rejecting run_test");
            return busy();
        };
        let role = ClientRole {
            factory: self.factory.as_ref(),
        };
        self.conclude(session::run(&role, stream))
    }

    /// RunServer: start a server-under-test on the worker's port and report its stats.
    pub fn run_server<S>(&self, stream: &mut S) -> CallStatus
    where
        S: CallStream<ServerArgs, ServerStatus> + ?Sized,
    {
        let Some(_permit) = self.guard.try_acquire() else {
            warn!("worker busy, rejecting run_server");
            return busy();
        };
        let role = ServerRole {
            factory: self.factory.as_ref(),
            server_port: self.server_port,
        };
        self.conclude(session::run(&role, stream))
    }

    fn conclude(&self, result: Result<SessionSummary, SessionError>) -> CallStatus {
        match result {
            Ok(summary) => {
                info!(marks = summary.marks, "session finished");
                CallStatus::ok()
            }
            Err(e) if self.strict_kinds && e.is_unsupported_kind() => {
                error!(error = %e, "driver and worker versions disagree, aborting");
                std::process::abort();
            }
            Err(e) => {
                warn!(code = %e.code(), error = %e, "session failed");
                e.to_status()
            }
        }
    }

    /// Serve one framed call: read the header, run the method, write the trailer.
    ///
    /// Returns the status sent to the driver. An error means the trailer
    /// itself could not be written.
    pub fn serve_call<R: BufRead, W: Write>(&self, reader: R, writer: W) -> Result<CallStatus, StreamError> {
        let mut stream = JsonLinesStream::new(reader, writer);
        let call_id = Ulid::new();

        let status = match stream.read_frame::<CallHeader>() {
            Ok(Some(header)) => match header.method() {
                Some(method) => {
                    let span = info_span!("call", method = method.as_str(), %call_id);
                    let _entered = span.enter();
                    match method {
                        Method::RunTest => self.run_test(&mut stream),
                        Method::RunServer => self.run_server(&mut stream),
                    }
                }
                None => {
                    warn!(method = %header.method, %call_id, "unknown method");
                    CallStatus::unimplemented(&header.method)
                }
            },
            Ok(None) => CallStatus::invalid_argument("connection closed before call header"),
            Err(e) => {
                warn!(error = %e, %call_id, "bad call header");
                CallStatus::invalid_argument(format!("bad call header: {}", e))
            }
        };

        stream.finish(&status)?;
        Ok(status)
    }
}

fn busy() -> CallStatus {
    CallStatus::resource_exhausted("worker is already running a session")
}
