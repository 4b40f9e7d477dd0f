//! Call streams.
//!
//! A session only sees a [`CallStream`]: read the next inbound message or
//! learn that the peer closed, write one outbound message. [`JsonLinesStream`]
//! implements it over any buffered reader and writer using the line framing
//! from `qps_protocol::frame`.

use std::io::{self, BufRead, Read, Write};

use qps_protocol::{CallStatus, ResponseFrame};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Maximum size of a single inbound frame (1 MB).
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Errors from reading or writing a call stream.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("frame exceeds maximum size of {max} bytes")]
    FrameTooLarge { max: usize },
}

/// Bidirectional message stream of one call.
pub trait CallStream<In, Out> {
    /// Read the next inbound message. `Ok(None)` means the peer closed its side.
    fn read(&mut self) -> Result<Option<In>, StreamError>;

    /// Write one outbound message.
    fn write(&mut self, message: &Out) -> Result<(), StreamError>;
}

/// Newline-delimited JSON call stream.
pub struct JsonLinesStream<R, W> {
    reader: R,
    writer: W,
    line: Vec<u8>,
}

impl<R: BufRead, W: Write> JsonLinesStream<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            line: Vec::new(),
        }
    }

    /// Read and decode the next frame, skipping blank lines.
    ///
    /// Frames are decoded from raw bytes, so a line that is not UTF-8 is
    /// [`StreamError::Malformed`] rather than an I/O error.
    pub fn read_frame<T: DeserializeOwned>(&mut self) -> Result<Option<T>, StreamError> {
        loop {
            self.line.clear();
            // Room for a full frame plus "\r\n"
            let limit = MAX_FRAME_BYTES as u64 + 2;
            let n = (&mut self.reader).take(limit).read_until(b'\n', &mut self.line)?;
            if n == 0 {
                return Ok(None);
            }
            let frame = strip_line_ending(&self.line);
            if frame.len() > MAX_FRAME_BYTES {
                return Err(StreamError::FrameTooLarge {
                    max: MAX_FRAME_BYTES,
                });
            }
            if frame.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Ok(Some(serde_json::from_slice(frame)?));
        }
    }

    /// Encode and write one frame, flushing it immediately.
    pub fn write_frame<T: Serialize>(&mut self, frame: &T) -> Result<(), StreamError> {
        let json = serde_json::to_string(frame)?;
        writeln!(self.writer, "{}", json)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Write the trailer that ends the call.
    pub fn finish(&mut self, status: &CallStatus) -> Result<(), StreamError> {
        self.write_frame(&ResponseFrame::<()>::Status(status.clone()))
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

impl<In, Out, R, W> CallStream<In, Out> for JsonLinesStream<R, W>
where
    In: DeserializeOwned,
    Out: Serialize,
    R: BufRead,
    W: Write,
{
    fn read(&mut self) -> Result<Option<In>, StreamError> {
        self.read_frame()
    }

    fn write(&mut self, message: &Out) -> Result<(), StreamError> {
        self.write_frame(&ResponseFrame::Message(message))
    }
}
