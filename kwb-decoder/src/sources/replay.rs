//! Capture file replay
//!
//! Two capture layouts are supported: the raw byte stream as it came off the
//! wire, and the text format written by older logging tools with one decimal
//! byte value per line.

use crate::sources::{not_open, read_one, ByteSource};
use crate::types::{DecoderError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Capture file layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayFormat {
    /// Raw bytes
    #[default]
    Binary,
    /// One decimal value (0-255) per line
    Decimal,
}

/// Replays a capture file
#[derive(Debug)]
pub struct ReplaySource {
    path: PathBuf,
    format: ReplayFormat,
    reader: Option<BufReader<File>>,
    line: String,
    line_number: usize,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>, format: ReplayFormat) -> Self {
        Self {
            path: path.into(),
            format,
            reader: None,
            line: String::new(),
            line_number: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_decimal(&mut self) -> Result<u8> {
        let reader = self.reader.as_mut().ok_or_else(|| not_open("replay file"))?;
        loop {
            self.line.clear();
            if reader.read_line(&mut self.line)? == 0 {
                return Err(DecoderError::EndOfStream);
            }
            self.line_number += 1;

            let text = self.line.trim();
            if text.is_empty() {
                continue;
            }
            return text.parse::<u8>().map_err(|e| {
                DecoderError::InvalidData(format!(
                    "{:?} line {}: '{}' is not a byte value: {}",
                    self.path, self.line_number, text, e
                ))
            });
        }
    }
}

impl ByteSource for ReplaySource {
    fn open(&mut self) -> Result<()> {
        log::info!("Opening replay file {:?} ({:?})", self.path, self.format);
        let file = File::open(&self.path)?;
        self.reader = Some(BufReader::new(file));
        self.line_number = 0;
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8> {
        match self.format {
            ReplayFormat::Binary => {
                let reader = self.reader.as_mut().ok_or_else(|| not_open("replay file"))?;
                read_one(reader)
            }
            ReplayFormat::Decimal => self.read_decimal(),
        }
    }

    fn close(&mut self) {
        self.reader = None;
    }
}
