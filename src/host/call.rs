//! An open call to a worker.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::marker::PhantomData;
use std::net::{Shutdown, TcpStream};

use qps_protocol::{CallStatus, ResponseFrame};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{HostError, HostResult};

/// What the worker sent next.
#[derive(Debug, Clone, PartialEq)]
pub enum Response<T> {
    Message(T),
    /// The call is over; nothing follows.
    Finished(CallStatus),
}

/// A bidirectional call. `Req` flows to the worker, `Resp` back.
pub struct Call<Req, Resp> {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
    status: Option<CallStatus>,
    send_closed: bool,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> Call<Req, Resp> {
    pub(crate) fn new(stream: TcpStream) -> HostResult<Self> {
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            writer: stream,
            reader,
            status: None,
            send_closed: false,
            _marker: PhantomData,
        })
    }

    pub(crate) fn write_line<T: Serialize>(&mut self, frame: &T) -> HostResult<()> {
        let mut line = serde_json::to_vec(frame)?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Half-close: tell the worker no more requests are coming.
    pub fn close_send(&mut self) -> HostResult<()> {
        if self.send_closed {
            return Ok(());
        }
        self.send_closed = true;
        match self.writer.shutdown(Shutdown::Write) {
            Ok(()) => Ok(()),
            // Worker already closed the connection
            Err(e) if e.kind() == ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// The final status, once received.
    pub fn status(&self) -> Option<&CallStatus> {
        self.status.as_ref()
    }
}

impl<Req: Serialize, Resp: DeserializeOwned> Call<Req, Resp> {
    pub fn send(&mut self, request: &Req) -> HostResult<()> {
        self.write_line(request)
    }

    /// Wait for the next message or the final status.
    pub fn recv(&mut self) -> HostResult<Response<Resp>> {
        if let Some(status) = &self.status {
            return Ok(Response::Finished(status.clone()));
        }

        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Err(HostError::MissingTrailer);
            }
            if !line.trim().is_empty() {
                break;
            }
        }

        match serde_json::from_str::<ResponseFrame<Resp>>(line.trim_end())? {
            ResponseFrame::Message(message) => Ok(Response::Message(message)),
            ResponseFrame::Status(status) => {
                self.status = Some(status.clone());
                Ok(Response::Finished(status))
            }
        }
    }

    /// Close the send side and wait for the final status, discarding any
    /// messages still in flight.
    pub fn finish(mut self) -> HostResult<CallStatus> {
        self.close_send()?;
        loop {
            if let Response::Finished(status) = self.recv()? {
                return Ok(status);
            }
        }
    }
}
