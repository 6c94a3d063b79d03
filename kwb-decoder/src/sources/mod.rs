//! Byte sources (serial, TCP, replay files, memory)
//!
//! The frame decoder only needs a blocking single-byte read. Each transport
//! implements [`ByteSource`] and maps its I/O errors onto
//! [`DecoderError::Timeout`], [`DecoderError::EndOfStream`] or
//! [`DecoderError::Io`].

use crate::types::{DecoderError, Result};
use std::io::{ErrorKind, Read};

pub mod memory;
pub mod replay;
pub mod serial;
pub mod tcp;

// Re-export source types
pub use memory::MemorySource;
pub use replay::{ReplayFormat, ReplaySource};
pub use serial::SerialSource;
pub use tcp::TcpSource;

/// Common trait for all byte sources
pub trait ByteSource {
    /// Open (or reopen) the underlying transport
    fn open(&mut self) -> Result<()>;

    /// Block until one byte arrives
    ///
    /// Fails with `Timeout` when the transport's read timeout expires and
    /// with `EndOfStream` when no more data will ever arrive.
    fn read_byte(&mut self) -> Result<u8>;

    /// Release the transport; reading afterwards fails until reopened
    fn close(&mut self);
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn read_byte(&mut self) -> Result<u8> {
        (**self).read_byte()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Map an I/O error onto the decoder's transport taxonomy
pub(crate) fn map_io_error(e: std::io::Error) -> DecoderError {
    match e.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => DecoderError::Timeout,
        ErrorKind::UnexpectedEof => DecoderError::EndOfStream,
        _ => DecoderError::Io(e),
    }
}

/// Read exactly one byte from a reader
pub(crate) fn read_one<R: Read + ?Sized>(reader: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Err(DecoderError::EndOfStream),
            Ok(_) => return Ok(buf[0]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(map_io_error(e)),
        }
    }
}

pub(crate) fn not_open(what: &str) -> DecoderError {
    DecoderError::Io(std::io::Error::new(
        ErrorKind::NotConnected,
        format!("{} is not open", what),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    struct FailingReader(ErrorKind);

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(self.0, "boom"))
        }
    }

    #[test]
    fn test_read_one() {
        let mut cursor = Cursor::new(vec![7u8, 9]);
        assert_eq!(read_one(&mut cursor).unwrap(), 7);
        assert_eq!(read_one(&mut cursor).unwrap(), 9);
        assert!(matches!(read_one(&mut cursor), Err(DecoderError::EndOfStream)));
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            read_one(&mut FailingReader(ErrorKind::TimedOut)),
            Err(DecoderError::Timeout)
        ));
        assert!(matches!(
            read_one(&mut FailingReader(ErrorKind::WouldBlock)),
            Err(DecoderError::Timeout)
        ));
        assert!(matches!(
            read_one(&mut FailingReader(ErrorKind::ConnectionReset)),
            Err(DecoderError::Io(_))
        ));
    }

    #[test]
    fn test_boxed_source() {
        let mut source: Box<dyn ByteSource> = Box::new(MemorySource::new(vec![1, 2]));
        source.open().unwrap();
        assert_eq!(source.read_byte().unwrap(), 1);
        source.close();
        assert!(source.read_byte().is_err());
    }
}
