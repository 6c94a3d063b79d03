//! Message Decoding Engine
//!
//! Extracts signal values from validated message payloads based on signal
//! definitions from the signal map. Handles bit flags, big-endian integers,
//! sign correction, scaling and the disconnected-sensor sentinel.

use crate::signals::{MessageSignals, SignalDefinition, SignalEncoding};
use crate::types::{DecodedSignal, Message};
use byteorder::{BigEndian, ByteOrder};

/// Raw value reported by an analog input with no sensor attached
pub const DISCONNECTED_SENTINEL: u64 = 1300;

/// Message decoder - extracts signals from message payloads
pub struct MessageDecoder;

impl MessageDecoder {
    /// Decode every signal defined for a message, ordered by key
    ///
    /// # Panics
    /// If a signal reaches past the end of the payload. That means the signal
    /// map does not describe this message and is treated as a configuration bug.
    pub fn decode_message(message: &Message, signals: &MessageSignals) -> Vec<DecodedSignal> {
        let payload = message.payload();
        let mut decoded: Vec<DecodedSignal> = signals
            .values()
            .map(|signal| {
                let required = signal.bytes_required();
                assert!(
                    required <= payload.len(),
                    "signal '{}' of message {} needs {} payload bytes but only {} were received",
                    signal.key,
                    message.message_id(),
                    required,
                    payload.len()
                );
                Self::decode_signal(payload, signal)
            })
            .collect();
        decoded.sort_by(|a, b| a.key.cmp(&b.key));
        decoded
    }

    /// Decode a single signal from payload data
    pub fn decode_signal(payload: &[u8], signal: &SignalDefinition) -> DecodedSignal {
        let value = match signal.encoding {
            SignalEncoding::BitFlag { byte_offset, bit_index } => {
                Some(Self::get_flag(payload, byte_offset, bit_index) as f64)
            }
            SignalEncoding::Numeric { byte_offset, byte_length, signed, scale, .. } => {
                Self::get_value(payload, byte_offset, byte_length, scale, signed)
            }
        };

        DecodedSignal {
            key: signal.key.clone(),
            name: signal.name.clone(),
            value,
            unit: signal.unit().map(str::to_string),
            state_class: signal.state_class.clone(),
            device_class: signal.device_class.clone(),
        }
    }

    /// Read one bit: `(payload[offset] >> bit) & 1`
    pub fn get_flag(payload: &[u8], offset: usize, bit: u8) -> u8 {
        (payload[offset] >> bit) & 1
    }

    /// Read a scaled big-endian integer
    ///
    /// Returns `None` for the disconnected-sensor sentinel (checked on the raw
    /// value, before sign correction and scaling).
    pub fn get_value(payload: &[u8], offset: usize, length: usize, scale: f64, signed: bool) -> Option<f64> {
        let raw = Self::extract_big_endian(payload, offset, length);
        if raw == DISCONNECTED_SENTINEL {
            return None;
        }

        let value = if signed {
            Self::twos_complement(raw, length)
        } else {
            raw as i128
        };
        Some(value as f64 * scale)
    }

    /// Accumulate `length` bytes starting at `offset`, most significant first
    fn extract_big_endian(payload: &[u8], offset: usize, length: usize) -> u64 {
        BigEndian::read_uint(&payload[offset..offset + length], length)
    }

    /// Interpret an N-byte raw value as two's complement
    fn twos_complement(raw: u64, length: usize) -> i128 {
        let bits = (length * 8) as u32;
        if raw >= 1u64 << (bits - 1) {
            raw as i128 - (1i128 << bits)
        } else {
            raw as i128
        }
    }
}
