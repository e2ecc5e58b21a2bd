use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpStream},
    time::{Duration, Instant},
};

use bincode::{decode_from_slice, encode_to_vec};
use log::trace;
use thiserror::Error;

use super::{Request, Response, wire_config};

/// Upper bound for a single frame unless configured otherwise.
pub const DEFAULT_MAX_FRAME: usize = 16 * 1024 * 1024;

const LENGTH_PREFIX: usize = size_of::<u32>();

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },
    #[error("failed to encode message: {0}")]
    Serialize(#[from] bincode::error::EncodeError),
    #[error("failed to decode message: {0}")]
    Deserialize(#[from] bincode::error::DecodeError),
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Whether the underlying read or write ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            TransportError::Io(e)
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
        )
    }
}

/// Length-delimited frames over a byte stream: a 4-byte big-endian length,
/// then that many payload bytes.
pub struct ProtocolTransport<T: Read + Write> {
    stream: T,
    max_frame: usize,
}

impl<T: Read + Write> ProtocolTransport<T> {
    pub fn new(stream: T) -> Self {
        Self::with_max_frame(stream, DEFAULT_MAX_FRAME)
    }

    pub fn with_max_frame(stream: T, max_frame: usize) -> Self {
        Self { stream, max_frame }
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.stream
    }

    pub fn write_frame(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let len = u32::try_from(payload.len())
            .ok()
            .filter(|_| payload.len() <= self.max_frame)
            .ok_or(TransportError::FrameTooLarge {
                len: payload.len(),
                max: self.max_frame,
            })?;

        let mut frame = Vec::with_capacity(LENGTH_PREFIX + payload.len());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(payload);

        trace!("writing frame of {} bytes", payload.len());
        self.stream.write_all(&frame)?;
        self.stream.flush()?;
        Ok(())
    }

    pub fn read_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut len = [0_u8; LENGTH_PREFIX];
        self.stream.read_exact(&mut len)?;

        let len = u32::from_be_bytes(len) as usize;
        if len > self.max_frame {
            return Err(TransportError::FrameTooLarge {
                len,
                max: self.max_frame,
            });
        }

        let mut payload = vec![0_u8; len];
        self.stream.read_exact(&mut payload)?;
        trace!("read frame of {len} bytes");
        Ok(payload)
    }

    pub fn write_request(&mut self, req: &Request) -> Result<(), TransportError> {
        let payload = encode_to_vec(req, wire_config())?;
        self.write_frame(&payload)
    }

    pub fn read_request(&mut self) -> Result<Request, TransportError> {
        let payload = self.read_frame()?;
        let (req, _) = decode_from_slice(&payload, wire_config())?;
        Ok(req)
    }

    pub fn write_response(&mut self, resp: &Response) -> Result<(), TransportError> {
        let payload = encode_to_vec(resp, wire_config())?;
        self.write_frame(&payload)
    }
}

/// TCP stream whose reads and writes share one absolute deadline.
///
/// Every I/O call re-arms the socket timeout with the time left, so a response
/// trickling in byte by byte still cannot outlive the deadline.
#[derive(Debug)]
pub struct TimedStream {
    stream: TcpStream,
    deadline: Option<Instant>,
}

impl TimedStream {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            deadline: None,
        }
    }

    /// Arms the deadline `timeout` from now; `None` disarms it.
    pub fn arm(&mut self, timeout: Option<Duration>) {
        self.deadline = timeout.map(|t| Instant::now() + t);
    }

    /// Tears the connection down in both directions.
    pub fn shutdown(&self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            trace!("shutdown on a dead socket: {e}");
        }
    }

    fn remaining(&self) -> io::Result<Option<Duration>> {
        match self.deadline {
            None => Ok(None),
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    Err(io::Error::new(io::ErrorKind::TimedOut, "deadline elapsed"))
                } else {
                    Ok(Some(left))
                }
            }
        }
    }
}

impl Read for TimedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let left = self.remaining()?;
        self.stream.set_read_timeout(left)?;
        self.stream.read(buf)
    }
}

impl Write for TimedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let left = self.remaining()?;
        self.stream.set_write_timeout(left)?;
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}
