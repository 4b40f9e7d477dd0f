//! Worker connection setup.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use qps_protocol::{CallHeader, ClientArgs, ClientStatus, Method, ServerArgs, ServerStatus};
use tracing::debug;

use super::call::Call;
use super::{HostError, HostResult};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for a single worker. Every call opens its own connection.
#[derive(Debug, Clone)]
pub struct WorkerClient {
    addr: SocketAddr,
    connect_timeout: Duration,
    read_timeout: Option<Duration>,
}

impl WorkerClient {
    /// Resolve `addr` and use its first address.
    pub fn new(addr: impl ToSocketAddrs) -> HostResult<Self> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| HostError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "address resolved to nothing")))?;
        Ok(Self {
            addr,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: None,
        })
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Fail `recv` when the worker stays silent this long.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Open a RunTest call.
    pub fn run_test(&self) -> HostResult<Call<ClientArgs, ClientStatus>> {
        self.open(Method::RunTest)
    }

    /// Open a RunServer call.
    pub fn run_server(&self) -> HostResult<Call<ServerArgs, ServerStatus>> {
        self.open(Method::RunServer)
    }

    fn open<Req, Resp>(&self, method: Method) -> HostResult<Call<Req, Resp>> {
        let stream = TcpStream::connect_timeout(&self.addr, self.connect_timeout).map_err(|source| {
            HostError::Connect {
                addr: self.addr.to_string(),
                source,
            }
        })?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(self.read_timeout)?;
        debug!(addr = %self.addr, method = method.as_str(), "call opened");

        let mut call = Call::new(stream)?;
        call.write_line(&CallHeader::new(method))?;
        Ok(call)
    }
}
