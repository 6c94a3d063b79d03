//! Signal map
//!
//! Per-message-id dictionary of signal definitions. Built once at startup
//! (usually by [`crate::signals::table`]) and shared read-only afterwards.

use crate::types::{DecoderError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Highest message id a signal map may describe
pub const MAX_MESSAGE_ID: u8 = 254;

/// How a signal is laid out in the payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalEncoding {
    /// Single bit: `(payload[byte_offset] >> bit_index) & 1`
    BitFlag { byte_offset: usize, bit_index: u8 },
    /// Big-endian integer over `byte_length` bytes, multiplied by `scale`
    Numeric {
        byte_offset: usize,
        byte_length: usize,
        signed: bool,
        scale: f64,
        unit: String,
    },
}

/// A signal definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDefinition {
    /// Stable identifier, unique within a message id
    pub key: String,
    /// Human readable name (English)
    pub name: String,
    /// Payload layout
    pub encoding: SignalEncoding,
    /// Home-automation state class
    pub state_class: String,
    /// Home-automation device class
    pub device_class: String,
}

impl SignalDefinition {
    /// Create a bit flag signal
    pub fn bit_flag(key: impl Into<String>, byte_offset: usize, bit_index: u8) -> Self {
        Self::with_encoding(key, SignalEncoding::BitFlag { byte_offset, bit_index })
    }

    /// Create a numeric signal
    pub fn numeric(
        key: impl Into<String>,
        byte_offset: usize,
        byte_length: usize,
        signed: bool,
        scale: f64,
        unit: impl Into<String>,
    ) -> Self {
        Self::with_encoding(
            key,
            SignalEncoding::Numeric {
                byte_offset,
                byte_length,
                signed,
                scale,
                unit: unit.into(),
            },
        )
    }

    fn with_encoding(key: impl Into<String>, encoding: SignalEncoding) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            encoding,
            state_class: String::new(),
            device_class: String::new(),
        }
    }

    /// Builder method: set the human readable name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builder method: set state and device class
    pub fn with_classes(mut self, state_class: impl Into<String>, device_class: impl Into<String>) -> Self {
        self.state_class = state_class.into();
        self.device_class = device_class.into();
        self
    }

    /// Engineering unit, if the signal has one
    pub fn unit(&self) -> Option<&str> {
        match &self.encoding {
            SignalEncoding::BitFlag { .. } => None,
            SignalEncoding::Numeric { unit, .. } => Some(unit.as_str()),
        }
    }

    /// Number of payload bytes a message must carry for this signal to decode
    pub fn bytes_required(&self) -> usize {
        match self.encoding {
            SignalEncoding::BitFlag { byte_offset, .. } => byte_offset + 1,
            SignalEncoding::Numeric { byte_offset, byte_length, .. } => byte_offset + byte_length,
        }
    }

    /// Check the definition can be decoded at all
    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(DecoderError::InvalidSignalDefinition(
                "signal key must not be empty".to_string(),
            ));
        }
        match &self.encoding {
            SignalEncoding::BitFlag { bit_index, .. } if *bit_index > 7 => {
                Err(DecoderError::InvalidSignalDefinition(format!(
                    "signal '{}': bit index {} out of range 0-7",
                    self.key, bit_index
                )))
            }
            SignalEncoding::Numeric { byte_length, .. } if !(1..=8).contains(byte_length) => {
                Err(DecoderError::InvalidSignalDefinition(format!(
                    "signal '{}': byte length {} out of range 1-8",
                    self.key, byte_length
                )))
            }
            SignalEncoding::Numeric { scale, .. } if !scale.is_finite() => {
                Err(DecoderError::InvalidSignalDefinition(format!(
                    "signal '{}': scale must be finite",
                    self.key
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Signals of one message id, keyed by signal key
pub type MessageSignals = HashMap<String, SignalDefinition>;

/// Message id -> signal key -> definition
#[derive(Debug, Clone, Default)]
pub struct SignalMap {
    messages: HashMap<u8, MessageSignals>,
}

impl SignalMap {
    /// Create an empty signal map
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a signal to a message id
    ///
    /// Fails on an invalid definition, a message id above [`MAX_MESSAGE_ID`],
    /// or a key already defined for that message id.
    pub fn insert(&mut self, message_id: u8, signal: SignalDefinition) -> Result<()> {
        if message_id > MAX_MESSAGE_ID {
            return Err(DecoderError::InvalidSignalDefinition(format!(
                "message id {} out of range 0-{}",
                message_id, MAX_MESSAGE_ID
            )));
        }
        signal.validate()?;

        let signals = self.messages.entry(message_id).or_default();
        if signals.contains_key(&signal.key) {
            return Err(DecoderError::InvalidSignalDefinition(format!(
                "duplicate signal key '{}' for message id {}",
                signal.key, message_id
            )));
        }
        signals.insert(signal.key.clone(), signal);
        Ok(())
    }

    /// Builder method: add a signal, panicking on invalid input
    ///
    /// Meant for maps assembled in code where a bad definition is a bug.
    pub fn with_signal(mut self, message_id: u8, signal: SignalDefinition) -> Self {
        if let Err(e) = self.insert(message_id, signal) {
            panic!("invalid signal map entry: {}", e);
        }
        self
    }

    /// All signals for a message id
    pub fn get(&self, message_id: u8) -> Option<&MessageSignals> {
        self.messages.get(&message_id)
    }

    /// A single signal definition
    pub fn signal(&self, message_id: u8, key: &str) -> Option<&SignalDefinition> {
        self.get(message_id).and_then(|signals| signals.get(key))
    }

    /// Find every message id defining a signal key
    pub fn find_signal(&self, key: &str) -> Vec<(u8, &SignalDefinition)> {
        let mut found: Vec<(u8, &SignalDefinition)> = self
            .messages
            .iter()
            .filter_map(|(id, signals)| signals.get(key).map(|sig| (*id, sig)))
            .collect();
        found.sort_unstable_by_key(|(id, _)| *id);
        found
    }

    /// Message ids with at least one signal, ascending
    pub fn message_ids(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self.messages.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.messages.values().all(|signals| signals.is_empty())
    }

    /// Get signal map statistics
    pub fn stats(&self) -> SignalMapStats {
        SignalMapStats {
            num_messages: self.messages.len(),
            num_signals: self.messages.values().map(|signals| signals.len()).sum(),
        }
    }
}

/// Signal map statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalMapStats {
    /// Number of message ids with signal definitions
    pub num_messages: usize,
    /// Total number of signal definitions
    pub num_signals: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_map() {
        let map = SignalMap::new();
        assert!(map.is_empty());
        assert_eq!(map.stats(), SignalMapStats { num_messages: 0, num_signals: 0 });
        assert!(map.get(32).is_none());
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut map = SignalMap::new();
        map.insert(
            32,
            SignalDefinition::numeric("heater_temp", 12, 2, true, 0.1, "°C")
                .with_name("Heater Temp")
                .with_classes("measurement", "temperature"),
        )
        .unwrap();
        map.insert(32, SignalDefinition::bit_flag("heater_running", 3, 7)).unwrap();
        map.insert(33, SignalDefinition::numeric("boiler_output", 13, 1, false, 1.0, "%"))
            .unwrap();

        assert_eq!(map.stats(), SignalMapStats { num_messages: 2, num_signals: 3 });
        assert_eq!(map.message_ids(), vec![32, 33]);

        let sig = map.signal(32, "heater_temp").unwrap();
        assert_eq!(sig.name, "Heater Temp");
        assert_eq!(sig.unit(), Some("°C"));
        assert_eq!(sig.bytes_required(), 14);
        assert_eq!(map.signal(32, "heater_running").unwrap().unit(), None);

        let found = map.find_signal("boiler_output");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, 33);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut map = SignalMap::new();
        map.insert(32, SignalDefinition::bit_flag("ash_can_ok", 3, 6)).unwrap();
        let err = map.insert(32, SignalDefinition::bit_flag("ash_can_ok", 3, 7));
        assert!(matches!(err, Err(DecoderError::InvalidSignalDefinition(_))));
        // Same key under another message id is fine
        map.insert(33, SignalDefinition::bit_flag("ash_can_ok", 3, 7)).unwrap();
    }

    #[test]
    fn test_invalid_definitions_rejected() {
        let mut map = SignalMap::new();
        assert!(map.insert(255, SignalDefinition::bit_flag("x", 0, 0)).is_err());
        assert!(map.insert(32, SignalDefinition::bit_flag("x", 0, 8)).is_err());
        assert!(map.insert(32, SignalDefinition::numeric("x", 0, 0, false, 1.0, "")).is_err());
        assert!(map.insert(32, SignalDefinition::numeric("x", 0, 9, false, 1.0, "")).is_err());
        assert!(map.insert(32, SignalDefinition::numeric("x", 0, 2, false, f64::NAN, "")).is_err());
        assert!(map.insert(32, SignalDefinition::bit_flag("", 0, 0)).is_err());
        assert!(map.is_empty());
    }

    #[test]
    #[should_panic(expected = "invalid signal map entry")]
    fn test_with_signal_panics_on_bad_entry() {
        let _ = SignalMap::new().with_signal(32, SignalDefinition::bit_flag("x", 0, 9));
    }
}
