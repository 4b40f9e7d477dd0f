//! Protocol Error Tests
//!
//! Drivers that break the call protocol get a per-call error status, and the
//! worker keeps serving afterwards.

mod common;

use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream};

use common::{start_worker, TestWorker};
use qps_bench::Response;
use qps_protocol::{
    CallStatus, ClientArgs, ClientConfig, ClientStatus, ClientType, Mark, ResponseFrame, RpcType,
    ServerArgs, ServerConfig, ServerType, StatusCode,
};

fn expect_finished<T: std::fmt::Debug>(response: Response<T>) -> CallStatus {
    match response {
        Response::Finished(status) => status,
        other => panic!("expected final status, got {:?}", other),
    }
}

/// Send raw lines on a fresh connection and collect every line of the reply.
fn raw_call(worker: &TestWorker, lines: &[&str]) -> Vec<String> {
    let mut stream = TcpStream::connect(worker.handle.local_addr()).unwrap();
    for line in lines {
        writeln!(stream, "{}", line).unwrap();
    }
    stream.shutdown(Shutdown::Write).unwrap();
    BufReader::new(stream).lines().map(|l| l.unwrap()).collect()
}

fn assert_still_serving(worker: &TestWorker) {
    let mut call = worker.client.run_server().unwrap();
    call.send(&ServerArgs::Setup(ServerConfig::new(ServerType::Synchronous)))
        .unwrap();
    assert!(matches!(call.recv().unwrap(), Response::Message(_)));
    assert!(call.finish().unwrap().is_ok());
}

// =============================================================================
// Session violations
// =============================================================================

#[test]
fn test_mark_before_setup() {
    let worker = start_worker();
    let mut call = worker.client.run_test().unwrap();

    call.send(&ClientArgs::Mark(Mark {})).unwrap();
    let status = expect_finished(call.recv().unwrap());

    assert_eq!(status.code, StatusCode::InvalidArgument);
    assert_still_serving(&worker);
}

#[test]
fn test_close_before_setup() {
    let worker = start_worker();
    let call = worker.client.run_server().unwrap();

    let status = call.finish().unwrap();

    assert_eq!(status.code, StatusCode::InvalidArgument);
    assert_still_serving(&worker);
}

#[test]
fn test_setup_after_setup() {
    let worker = start_worker();
    let mut call = worker.client.run_server().unwrap();
    let setup = ServerArgs::Setup(ServerConfig::new(ServerType::Synchronous));

    call.send(&setup).unwrap();
    assert!(matches!(call.recv().unwrap(), Response::Message(_)));
    call.send(&setup).unwrap();
    let status = expect_finished(call.recv().unwrap());

    assert_eq!(status.code, StatusCode::InvalidArgument);
    assert_still_serving(&worker);
}

#[test]
fn test_unrecognized_client_kind() {
    let worker = start_worker();
    let mut call = worker.client.run_test().unwrap();

    call.send(&ClientArgs::Setup(ClientConfig::new(
        ClientType::Unrecognized("GENERIC_CLIENT".into()),
        RpcType::Unary,
        vec![format!("127.0.0.1:{}", worker.server_port)],
    )))
    .unwrap();
    let status = expect_finished(call.recv().unwrap());

    assert_eq!(status.code, StatusCode::InvalidArgument);
    assert!(status.message.unwrap().contains("GENERIC_CLIENT"));
    assert_still_serving(&worker);
}

#[test]
fn test_unreachable_target_fails_setup() {
    let worker = start_worker();
    let mut call = worker.client.run_test().unwrap();

    call.send(&ClientArgs::Setup(ClientConfig::new(
        ClientType::Synchronous,
        RpcType::Unary,
        vec!["no-such-host.invalid:1".into()],
    )))
    .unwrap();
    let status = expect_finished(call.recv().unwrap());

    assert_eq!(status.code, StatusCode::InvalidArgument);
    assert_still_serving(&worker);
}

// =============================================================================
// Framing violations
// =============================================================================

#[test]
fn test_unknown_method() {
    let worker = start_worker();

    let reply = raw_call(&worker, &["{\"method\":\"quit\"}"]);

    assert_eq!(reply.len(), 1);
    let frame: ResponseFrame<ClientStatus> = serde_json::from_str(&reply[0]).unwrap();
    match frame {
        ResponseFrame::Status(status) => assert_eq!(status.code, StatusCode::Unimplemented),
        other => panic!("expected status, got {:?}", other),
    }
    assert_still_serving(&worker);
}

#[test]
fn test_malformed_request_message() {
    let worker = start_worker();

    let reply = raw_call(&worker, &["{\"method\":\"run_test\"}", "not json"]);

    assert_eq!(reply.len(), 1);
    let frame: ResponseFrame<ClientStatus> = serde_json::from_str(&reply[0]).unwrap();
    assert!(matches!(frame, ResponseFrame::Status(s) if s.code == StatusCode::InvalidArgument));
    assert_still_serving(&worker);
}
