//! TCP byte source (serial-to-Ethernet bridges)

use crate::sources::{not_open, read_one, ByteSource};
use crate::types::{DecoderError, Result};
use std::io::{BufReader, ErrorKind};
use std::net::TcpStream;
use std::time::Duration;

/// Default bridge address
pub const DEFAULT_TCP_ADDRESS: &str = "127.0.0.1:23";

/// Reads bytes over a TCP connection
#[derive(Debug)]
pub struct TcpSource {
    address: String,
    read_timeout: Option<Duration>,
    stream: Option<BufReader<TcpStream>>,
}

impl TcpSource {
    /// Create a source for `host:port`
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            read_timeout: None,
            stream: None,
        }
    }

    /// Builder method: fail reads with `Timeout` after this long without data
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl ByteSource for TcpSource {
    fn open(&mut self) -> Result<()> {
        log::info!("Connecting to {}", self.address);
        let stream = TcpStream::connect(&self.address)?;
        stream.set_read_timeout(self.read_timeout)?;
        self.stream = Some(BufReader::new(stream));
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8> {
        let stream = self.stream.as_mut().ok_or_else(|| not_open("TCP connection"))?;
        match read_one(stream) {
            // A closed socket is a disconnect, not the end of the data
            Err(DecoderError::EndOfStream) => Err(DecoderError::Io(std::io::Error::new(
                ErrorKind::ConnectionAborted,
                "peer closed the connection",
            ))),
            other => other,
        }
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            log::info!("Closed connection to {}", self.address);
        }
    }
}
