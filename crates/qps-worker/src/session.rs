//! Session protocol.
//!
//! A session is one admitted RunTest or RunServer call:
//!
//! 1. Read the first message. It must be a setup.
//! 2. Build the capability the setup names and acknowledge with a status
//!    that carries no stats.
//! 3. Answer every mark with a fresh snapshot until the driver closes its
//!    side of the stream.
//!
//! Both methods share this state machine; a [`SessionRole`] supplies the
//! message types, the capability and the status shape. The capability is
//! owned by [`run`] and dropped on every exit path.

use qps_protocol::{
    CallStatus, ClientArgs, ClientConfig, ClientStatus, ServerArgs, ServerConfig, ServerStatus, StatusCode,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::capability::{CapabilityFactory, Client, Server};
use crate::dispatcher::{self, DispatchError};
use crate::stream::{CallStream, StreamError};

/// Ways a session can fail.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("stream closed before setup")]
    MissingSetup,

    #[error("first message must be setup")]
    ExpectedSetup,

    #[error("only mark messages may follow setup")]
    ExpectedMark,

    #[error("malformed message: {0}")]
    Malformed(#[source] StreamError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("failed to write status: {0}")]
    Write(#[source] StreamError),
}

impl SessionError {
    /// Status code reported to the driver.
    pub fn code(&self) -> StatusCode {
        match self {
            Self::MissingSetup | Self::ExpectedSetup | Self::ExpectedMark | Self::Malformed(_) => {
                StatusCode::InvalidArgument
            }
            Self::Dispatch(_) => StatusCode::InvalidArgument,
            Self::Write(_) => StatusCode::Unknown,
        }
    }

    /// Whether the driver named a kind outside the known set.
    pub fn is_unsupported_kind(&self) -> bool {
        matches!(self, Self::Dispatch(DispatchError::UnsupportedKind { .. }))
    }

    pub fn to_status(&self) -> CallStatus {
        CallStatus::new(self.code(), self.to_string())
    }
}

/// Outcome of a session that ended with the driver closing its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    /// Marks answered after the initial status.
    pub marks: u64,
}

/// An inbound message, reduced to what the state machine cares about.
#[derive(Debug)]
pub enum Inbound<S> {
    Setup(S),
    Mark,
}

/// Method-specific half of a session.
pub trait SessionRole {
    type Args;
    type Setup;
    type Status;
    type Capability;

    fn classify(args: Self::Args) -> Inbound<Self::Setup>;

    /// Build the capability named by the setup.
    fn build(&self, setup: &Self::Setup) -> Result<Self::Capability, DispatchError>;

    /// Status acknowledging a successful setup.
    fn ready_status(&self, capability: &Self::Capability) -> Self::Status;

    /// Status answering one mark.
    fn mark_status(&self, capability: &mut Self::Capability) -> Self::Status;
}

/// RunTest: drives a load-generating client.
pub struct ClientRole<'a> {
    pub factory: &'a dyn CapabilityFactory,
}

impl SessionRole for ClientRole<'_> {
    type Args = ClientArgs;
    type Setup = ClientConfig;
    type Status = ClientStatus;
    type Capability = Box<dyn Client>;

    fn classify(args: ClientArgs) -> Inbound<ClientConfig> {
        match args {
            ClientArgs::Setup(config) => Inbound::Setup(config),
            ClientArgs::Mark(_) => Inbound::Mark,
        }
    }

    fn build(&self, setup: &ClientConfig) -> Result<Box<dyn Client>, DispatchError> {
        dispatcher::create_client(self.factory, setup)
    }

    fn ready_status(&self, _client: &Box<dyn Client>) -> ClientStatus {
        ClientStatus { stats: None }
    }

    fn mark_status(&self, client: &mut Box<dyn Client>) -> ClientStatus {
        ClientStatus {
            stats: Some(client.mark()),
        }
    }
}

/// RunServer: drives a server-under-test on the worker's fixed port.
///
/// Statuses report the port the server actually bound, which differs from
/// `server_port` only when that is 0.
pub struct ServerRole<'a> {
    pub factory: &'a dyn CapabilityFactory,
    pub server_port: u16,
}

impl SessionRole for ServerRole<'_> {
    type Args = ServerArgs;
    type Setup = ServerConfig;
    type Status = ServerStatus;
    type Capability = Box<dyn Server>;

    fn classify(args: ServerArgs) -> Inbound<ServerConfig> {
        match args {
            ServerArgs::Setup(config) => Inbound::Setup(config),
            ServerArgs::Mark(_) => Inbound::Mark,
        }
    }

    fn build(&self, setup: &ServerConfig) -> Result<Box<dyn Server>, DispatchError> {
        dispatcher::create_server(self.factory, setup, self.server_port)
    }

    fn ready_status(&self, server: &Box<dyn Server>) -> ServerStatus {
        ServerStatus {
            bound_port: server.port(),
            stats: None,
        }
    }

    fn mark_status(&self, server: &mut Box<dyn Server>) -> ServerStatus {
        ServerStatus {
            bound_port: server.port(),
            stats: Some(server.mark()),
        }
    }
}

/// Run one session to completion.
pub fn run<R, S>(role: &R, stream: &mut S) -> Result<SessionSummary, SessionError>
where
    R: SessionRole,
    S: CallStream<R::Args, R::Status> + ?Sized,
{
    let setup = match next_inbound::<R, S>(stream)? {
        Some(Inbound::Setup(setup)) => setup,
        Some(Inbound::Mark) => return Err(SessionError::ExpectedSetup),
        None => return Err(SessionError::MissingSetup),
    };

    let mut capability = role.build(&setup)?;
    stream
        .write(&role.ready_status(&capability))
        .map_err(SessionError::Write)?;
    info!("session ready");

    let mut marks = 0;
    loop {
        match next_inbound::<R, S>(stream)? {
            Some(Inbound::Mark) => {
                let status = role.mark_status(&mut capability);
                stream.write(&status).map_err(SessionError::Write)?;
                marks += 1;
                debug!(marks, "mark answered");
            }
            Some(Inbound::Setup(_)) => return Err(SessionError::ExpectedMark),
            None => return Ok(SessionSummary { marks }),
        }
    }
}

fn next_inbound<R, S>(stream: &mut S) -> Result<Option<Inbound<R::Setup>>, SessionError>
where
    R: SessionRole,
    S: CallStream<R::Args, R::Status> + ?Sized,
{
    match stream.read() {
        Ok(Some(args)) => Ok(Some(R::classify(args))),
        Ok(None) => Ok(None),
        // A broken read is indistinguishable from the driver going away
        Err(StreamError::Io(e)) => {
            debug!(error = %e, "read failed, treating as end of stream");
            Ok(None)
        }
        Err(e) => Err(SessionError::Malformed(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeFactory, ScriptedStream};
    use qps_protocol::{ClientType, Mark, RpcType, ServerType};

    fn client_setup() -> ClientArgs {
        ClientArgs::Setup(ClientConfig::new(
            ClientType::Synchronous,
            RpcType::Unary,
            vec!["127.0.0.1:1".into()],
        ))
    }

    fn server_setup() -> ServerArgs {
        ServerArgs::Setup(ServerConfig::new(ServerType::Synchronous))
    }

    fn run_client(
        factory: &FakeFactory,
        stream: &mut ScriptedStream<ClientArgs, ClientStatus>,
    ) -> Result<SessionSummary, SessionError> {
        run(&ClientRole { factory }, stream)
    }

    #[test]
    fn test_marks_get_one_status_each() {
        let factory = FakeFactory::new();
        let mut stream = ScriptedStream::new(vec![
            client_setup(),
            ClientArgs::Mark(Mark {}),
            ClientArgs::Mark(Mark {}),
            ClientArgs::Mark(Mark {}),
        ]);

        let summary = run_client(&factory, &mut stream).unwrap();

        assert_eq!(summary.marks, 3);
        assert_eq!(stream.written().len(), 4);
        assert_eq!(stream.written()[0], ClientStatus { stats: None });
        let counts: Vec<f64> = stream.written()[1..]
            .iter()
            .map(|s| s.stats.as_ref().unwrap().latencies.count)
            .collect();
        assert_eq!(counts, vec![1.0, 2.0, 3.0]);
        assert_eq!(factory.live(), 0);
    }

    #[test]
    fn test_setup_then_close_is_ok() {
        let factory = FakeFactory::new();
        let mut stream = ScriptedStream::new(vec![client_setup()]);

        let summary = run_client(&factory, &mut stream).unwrap();
        assert_eq!(summary.marks, 0);
        assert_eq!(stream.written().len(), 1);
    }

    #[test]
    fn test_mark_before_setup() {
        let factory = FakeFactory::new();
        let mut stream = ScriptedStream::new(vec![ClientArgs::Mark(Mark {}), client_setup()]);

        let err = run_client(&factory, &mut stream).unwrap_err();

        assert!(matches!(err, SessionError::ExpectedSetup));
        assert_eq!(err.code(), StatusCode::InvalidArgument);
        assert_eq!(factory.builds(), 0);
        assert!(stream.written().is_empty());
    }

    #[test]
    fn test_close_before_setup() {
        let factory = FakeFactory::new();
        let mut stream = ScriptedStream::<ClientArgs, ClientStatus>::new(vec![]);

        let err = run_client(&factory, &mut stream).unwrap_err();
        assert!(matches!(err, SessionError::MissingSetup));
        assert_eq!(err.code(), StatusCode::InvalidArgument);
    }

    #[test]
    fn test_malformed_first_frame() {
        let factory = FakeFactory::new();
        let mut stream = ScriptedStream::<ClientArgs, ClientStatus>::new(vec![]).then_malformed();

        let err = run_client(&factory, &mut stream).unwrap_err();
        assert!(matches!(err, SessionError::Malformed(_)));
        assert_eq!(factory.builds(), 0);
    }

    #[test]
    fn test_second_setup_is_violation() {
        let factory = FakeFactory::new();
        let mut stream = ScriptedStream::new(vec![client_setup(), ClientArgs::Mark(Mark {}), client_setup()]);

        let err = run_client(&factory, &mut stream).unwrap_err();

        assert!(matches!(err, SessionError::ExpectedMark));
        assert_eq!(stream.written().len(), 2);
        assert_eq!(factory.builds(), 1);
        assert_eq!(factory.live(), 0);
    }

    #[test]
    fn test_malformed_mark_releases_capability() {
        let factory = FakeFactory::new();
        let mut stream = ScriptedStream::new(vec![client_setup()]).then_malformed();

        let err = run_client(&factory, &mut stream).unwrap_err();
        assert_eq!(err.code(), StatusCode::InvalidArgument);
        assert_eq!(factory.live(), 0);
    }

    #[test]
    fn test_build_failure() {
        let factory = FakeFactory::failing();
        let mut stream = ScriptedStream::new(vec![client_setup(), ClientArgs::Mark(Mark {})]);

        let err = run_client(&factory, &mut stream).unwrap_err();
        assert!(matches!(err, SessionError::Dispatch(DispatchError::Build { .. })));
        assert_eq!(err.code(), StatusCode::InvalidArgument);
        assert!(!err.is_unsupported_kind());
        assert!(stream.written().is_empty());
    }

    #[test]
    fn test_unsupported_kind() {
        let factory = FakeFactory::new();
        let mut stream = ScriptedStream::new(vec![ClientArgs::Setup(ClientConfig::new(
            ClientType::Unrecognized("CALLBACK_CLIENT".into()),
            RpcType::Unary,
            vec![],
        ))]);

        let err = run_client(&factory, &mut stream).unwrap_err();
        assert!(err.is_unsupported_kind());
        assert_eq!(err.code(), StatusCode::InvalidArgument);
        assert_eq!(factory.builds(), 0);
    }

    #[test]
    fn test_initial_write_failure() {
        let factory = FakeFactory::new();
        let mut stream = ScriptedStream::new(vec![client_setup()]).fail_writes_after(0);

        let err = run_client(&factory, &mut stream).unwrap_err();
        assert!(matches!(err, SessionError::Write(_)));
        assert_eq!(err.code(), StatusCode::Unknown);
        assert_eq!(factory.live(), 0);
    }

    #[test]
    fn test_mark_write_failure() {
        let factory = FakeFactory::new();
        let mut stream = ScriptedStream::new(vec![
            client_setup(),
            ClientArgs::Mark(Mark {}),
            ClientArgs::Mark(Mark {}),
        ])
        .fail_writes_after(2);

        let err = run_client(&factory, &mut stream).unwrap_err();
        assert_eq!(err.code(), StatusCode::Unknown);
        assert_eq!(stream.written().len(), 2);
        assert_eq!(factory.live(), 0);
    }

    #[test]
    fn test_read_error_after_setup_ends_cleanly() {
        let factory = FakeFactory::new();
        let mut stream = ScriptedStream::new(vec![client_setup(), ClientArgs::Mark(Mark {})]).then_io_error();

        let summary = run_client(&factory, &mut stream).unwrap();
        assert_eq!(summary.marks, 1);
    }

    #[test]
    fn test_server_port_on_every_status() {
        let factory = FakeFactory::new();
        let mut stream = ScriptedStream::new(vec![
            server_setup(),
            ServerArgs::Mark(Mark {}),
            ServerArgs::Mark(Mark {}),
        ]);
        let role = ServerRole {
            factory: &factory,
            server_port: 50051,
        };

        let summary = run(&role, &mut stream).unwrap();

        assert_eq!(summary.marks, 2);
        assert_eq!(factory.last_server().map(|(_, port)| port), Some(50051));
        let written = stream.written();
        assert_eq!(written.len(), 3);
        assert!(written.iter().all(|s| s.bound_port == 50051));
        assert!(written[0].stats.is_none());
        let elapsed: Vec<f64> = written[1..]
            .iter()
            .map(|s| s.stats.as_ref().unwrap().time_elapsed)
            .collect();
        assert!(elapsed[0] <= elapsed[1]);
        assert_eq!(factory.live(), 0);
    }
}
