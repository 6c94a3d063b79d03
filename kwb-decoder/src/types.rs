//! Core types for the KWB protocol decoder
//!
//! This module defines the records that flow up the decoding pipeline: raw
//! framed [`Message`]s, the [`DecodedSignal`]s extracted from them, and the
//! error type shared by every layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type used throughout the decoder
pub type Timestamp = DateTime<Utc>;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DecoderError>;

/// Number of wire bytes counted by LENGTH that are not payload
/// (STX, LENGTH, MESSAGE_ID, COUNTER, CHECKSUM).
pub const FRAME_OVERHEAD: u8 = 5;

/// Errors that can occur during decoding
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("Timed out waiting for data from byte source")]
    Timeout,

    #[error("Byte source reached end of stream")]
    EndOfStream,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse signal map: {0}")]
    SignalMapParse(String),

    #[error("Invalid signal definition: {0}")]
    InvalidSignalDefinition(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl DecoderError {
    /// True for faults that a close + reopen of the byte source may cure
    pub fn is_transport_fault(&self) -> bool {
        matches!(self, DecoderError::Timeout | DecoderError::Io(_))
    }
}

/// Frame variant, determined by the byte following STX
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Secondary header byte 0x02 (`STX STX LENGTH ...`)
    Sense,
    /// LENGTH directly after STX
    Control,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Sense => write!(f, "Sense"),
            MessageKind::Control => write!(f, "Control"),
        }
    }
}

/// A framed message as read off the wire
///
/// Construction guarantees `payload.len() == declared_length - 5`. Whether
/// the checksum matches is a separate question answered by [`Message::is_valid`].
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    kind: MessageKind,
    message_id: u8,
    declared_length: u8,
    counter: u8,
    checksum: u8,
    payload: Vec<u8>,
    received_at: Timestamp,
}

impl Message {
    /// Build a message from its fields, checking the length invariant
    pub fn new(
        kind: MessageKind,
        message_id: u8,
        declared_length: u8,
        counter: u8,
        payload: Vec<u8>,
        checksum: u8,
        received_at: Timestamp,
    ) -> Result<Self> {
        let expected = declared_length.checked_sub(FRAME_OVERHEAD).ok_or_else(|| {
            DecoderError::InvalidData(format!(
                "declared length {} is shorter than the frame overhead",
                declared_length
            ))
        })?;
        if payload.len() != expected as usize {
            return Err(DecoderError::InvalidData(format!(
                "payload has {} bytes but declared length {} implies {}",
                payload.len(),
                declared_length,
                expected
            )));
        }
        Ok(Self::from_parts(
            kind,
            message_id,
            declared_length,
            counter,
            payload,
            checksum,
            received_at,
        ))
    }

    /// Build a message whose length invariant the caller has already upheld
    pub(crate) fn from_parts(
        kind: MessageKind,
        message_id: u8,
        declared_length: u8,
        counter: u8,
        payload: Vec<u8>,
        checksum: u8,
        received_at: Timestamp,
    ) -> Self {
        debug_assert_eq!(payload.len() + FRAME_OVERHEAD as usize, declared_length as usize);
        Self {
            kind,
            message_id,
            declared_length,
            counter,
            checksum,
            payload,
            received_at,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn message_id(&self) -> u8 {
        self.message_id
    }

    pub fn declared_length(&self) -> u8 {
        self.declared_length
    }

    pub fn counter(&self) -> u8 {
        self.counter
    }

    /// Checksum byte as received on the wire
    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    /// Payload with stuffing bytes already removed
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn received_at(&self) -> Timestamp {
        self.received_at
    }

    /// Checksum recomputed over LENGTH, ID, COUNTER and payload
    pub fn computed_checksum(&self) -> u8 {
        crate::checksum::message_checksum(
            self.declared_length,
            self.message_id,
            self.counter,
            &self.payload,
        )
    }

    /// Returns true if the wire checksum matches the recomputed one
    pub fn is_valid(&self) -> bool {
        self.computed_checksum() == self.checksum
    }

    /// True if both messages carry the same payload bytes
    pub fn is_same(&self, other: &Message) -> bool {
        self.payload == other.payload
    }
}

/// A decoded signal value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedSignal {
    /// Stable identifier from the signal map
    pub key: String,
    /// Human readable name (English)
    pub name: String,
    /// Scaled value; `None` when the sensor reports the disconnected sentinel
    pub value: Option<f64>,
    /// Engineering unit (e.g. "°C", "%", "rpm")
    pub unit: Option<String>,
    /// Home-automation state class (e.g. "measurement")
    pub state_class: String,
    /// Home-automation device class (e.g. "temperature")
    pub device_class: String,
}

impl fmt::Display for DecodedSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.value, &self.unit) {
            (Some(v), Some(unit)) if !unit.is_empty() => write!(f, "{}: {:.3} {}", self.key, v, unit),
            (Some(v), _) => write!(f, "{}: {:.3}", self.key, v),
            (None, _) => write!(f, "{}: n/a", self.key),
        }
    }
}
