//! In-memory byte source

use crate::sources::{not_open, ByteSource};
use crate::types::{DecoderError, Result};

/// Serves bytes from a buffer, then reports end of stream
///
/// Reopening continues where the previous read stopped, like a live line
/// that kept transmitting while disconnected.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: Vec<u8>,
    position: usize,
    open: bool,
}

impl MemorySource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            position: 0,
            open: false,
        }
    }

    /// Bytes not yet read
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }
}

impl ByteSource for MemorySource {
    fn open(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8> {
        if !self.open {
            return Err(not_open("memory source"));
        }
        let byte = *self.data.get(self.position).ok_or(DecoderError::EndOfStream)?;
        self.position += 1;
        Ok(byte)
    }

    fn close(&mut self) {
        self.open = false;
    }
}
