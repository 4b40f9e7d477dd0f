//! QPS Driver CLI
//!
//! Entry point for the `qps-driver` command-line tool. Runs one benchmark
//! session against a worker and prints every frame it sends back as a JSON
//! line on stdout.

use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use qps_bench::{Call, HostResult, Record, Response, WorkerClient};
use qps_protocol::{
    CallStatus, ClientArgs, ClientConfig, ClientType, Mark, ResponseFrame, RpcType, ServerArgs,
    ServerConfig, ServerType, DEFAULT_DRIVER_PORT,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qps-driver")]
#[command(about = "Drive a QPS benchmark worker", version)]
struct Cli {
    /// Worker address (host:port)
    #[arg(long, short = 'w', default_value_t = format!("localhost:{}", DEFAULT_DRIVER_PORT))]
    worker: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a server-under-test on the worker
    Server {
        /// Server kind, e.g. SYNCHRONOUS_SERVER or ASYNC_SERVER
        #[arg(long, default_value = "SYNCHRONOUS_SERVER")]
        server_type: String,

        /// Worker threads for pooled servers
        #[arg(long, default_value_t = 1)]
        threads: u32,

        #[command(flatten)]
        schedule: Schedule,
    },

    /// Start a load-generating client on the worker
    Client {
        /// Server-under-test addresses (host:port), repeatable
        #[arg(long = "target", short = 't', required = true)]
        targets: Vec<String>,

        /// Client kind, e.g. SYNCHRONOUS_CLIENT or ASYNC_CLIENT
        #[arg(long, default_value = "SYNCHRONOUS_CLIENT")]
        client_type: String,

        /// RPC shape, UNARY or STREAMING
        #[arg(long, default_value = "UNARY")]
        rpc_type: String,

        #[arg(long, default_value_t = 1)]
        channels: u32,

        #[arg(long, default_value_t = 1)]
        outstanding: u32,

        /// Threads shared by all slots of an async client
        #[arg(long, default_value_t = 1)]
        threads: u32,

        /// Request payload size in bytes
        #[arg(long, default_value_t = 0)]
        payload: u32,

        #[command(flatten)]
        schedule: Schedule,
    },
}

#[derive(Args)]
struct Schedule {
    /// Number of marks to request after setup
    #[arg(long, default_value_t = 3)]
    marks: u32,

    /// Milliseconds between marks
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,
}

fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    let client = match WorkerClient::new(cli.worker.as_str()) {
        Ok(client) => client,
        Err(e) => {
            error!(worker = %cli.worker, error = %e, "cannot resolve worker");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Server {
            server_type,
            threads,
            schedule,
        } => {
            let mut config = ServerConfig::new(ServerType::from(server_type));
            config.threads = threads;
            client.run_server().and_then(|call| {
                drive(call, &cli.worker, ServerArgs::Setup(config), ServerArgs::Mark(Mark {}), &schedule)
            })
        }
        Commands::Client {
            targets,
            client_type,
            rpc_type,
            channels,
            outstanding,
            threads,
            payload,
            schedule,
        } => {
            let mut config = ClientConfig::new(ClientType::from(client_type), RpcType::from(rpc_type), targets);
            config.client_channels = channels;
            config.outstanding_rpcs_per_channel = outstanding;
            config.async_client_threads = threads;
            config.payload_size = payload;
            client.run_test().and_then(|call| {
                drive(call, &cli.worker, ClientArgs::Setup(config), ClientArgs::Mark(Mark {}), &schedule)
            })
        }
    };

    match result {
        Ok(status) if status.is_ok() => ExitCode::SUCCESS,
        Ok(status) => {
            warn!(%status, "session did not finish cleanly");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "call failed");
            ExitCode::FAILURE
        }
    }
}

/// Send the setup, then `schedule.marks` marks, printing every response.
fn drive<Req, Resp>(
    mut call: Call<Req, Resp>,
    worker: &str,
    setup: Req,
    mark: Req,
    schedule: &Schedule,
) -> HostResult<CallStatus>
where
    Req: Serialize,
    Resp: Serialize + DeserializeOwned,
{
    let mut seq = 0u64;
    call.send(&setup)?;
    if let Some(status) = print_next(&mut call, worker, &mut seq)? {
        return Ok(status);
    }

    for _ in 0..schedule.marks {
        thread::sleep(Duration::from_millis(schedule.interval_ms));
        call.send(&mark)?;
        if let Some(status) = print_next(&mut call, worker, &mut seq)? {
            return Ok(status);
        }
    }

    let status = call.finish()?;
    print_record(Record::<Resp>::now(worker, seq, ResponseFrame::Status(status.clone())))?;
    Ok(status)
}

/// Print the next response. Returns the status if the call ended.
fn print_next<Req, Resp>(call: &mut Call<Req, Resp>, worker: &str, seq: &mut u64) -> HostResult<Option<CallStatus>>
where
    Req: Serialize,
    Resp: Serialize + DeserializeOwned,
{
    let (frame, finished) = match call.recv()? {
        Response::Message(message) => (ResponseFrame::Message(message), None),
        Response::Finished(status) => (ResponseFrame::Status(status.clone()), Some(status)),
    };
    print_record(Record::now(worker, *seq, frame))?;
    *seq += 1;
    Ok(finished)
}

fn print_record<T: Serialize>(record: Record<T>) -> HostResult<()> {
    println!("{}", record.to_json_line()?);
    Ok(())
}
