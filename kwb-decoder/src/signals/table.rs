//! Signal table loader
//!
//! Reads the tabular signal description (one CSV row per signal) and builds a
//! [`SignalMap`]. Columns:
//!
//! `message_id, source, type, offset, bit, length, signed, scale, units, key,
//! name_en, state_class, device_class`
//!
//! `type` is `bit` or `int`. Rows are kept only if their `source` and
//! `message_id` pass the [`SignalMapFilter`]; rows of any other type are skipped.

use crate::signals::map::{SignalDefinition, SignalMap};
use crate::types::{DecoderError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Controller source number used by the Easyfire boards
pub const DEFAULT_SOURCE: u32 = 10;

/// Message ids loaded unless configured otherwise
pub const DEFAULT_MESSAGE_IDS: [u8; 4] = [32, 33, 64, 65];

/// Which rows of the table to keep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMapFilter {
    /// Only rows with this `source`
    #[serde(default = "default_source")]
    pub source: u32,

    /// Only rows with one of these message ids (empty keeps every id)
    #[serde(default = "default_message_ids")]
    pub message_ids: Vec<u8>,
}

fn default_source() -> u32 {
    DEFAULT_SOURCE
}

fn default_message_ids() -> Vec<u8> {
    DEFAULT_MESSAGE_IDS.to_vec()
}

impl Default for SignalMapFilter {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE,
            message_ids: default_message_ids(),
        }
    }
}

impl SignalMapFilter {
    /// Create a filter with the default source and message ids
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the source
    pub fn with_source(mut self, source: u32) -> Self {
        self.source = source;
        self
    }

    /// Builder method: set the message ids
    pub fn with_message_ids(mut self, message_ids: Vec<u8>) -> Self {
        self.message_ids = message_ids;
        self
    }

    /// Check if a row should be loaded
    pub fn accepts(&self, source: u32, message_id: u32) -> bool {
        source == self.source
            && (self.message_ids.is_empty()
                || self.message_ids.iter().any(|&id| id as u32 == message_id))
    }
}

#[derive(Debug, Deserialize)]
struct SignalRow {
    message_id: u32,
    source: u32,
    #[serde(rename = "type")]
    kind: String,
    offset: usize,
    #[serde(default)]
    bit: Option<u8>,
    #[serde(default)]
    length: Option<usize>,
    #[serde(default)]
    signed: Option<String>,
    #[serde(default)]
    scale: Option<f64>,
    #[serde(default)]
    units: String,
    #[serde(default)]
    key: Option<String>,
    name_en: String,
    #[serde(default, alias = "sensor_class")]
    state_class: String,
    #[serde(default)]
    device_class: String,
}

impl SignalRow {
    /// Explicit key, or the English name lowercased with spaces as underscores
    fn resolved_key(&self) -> String {
        match self.key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => self.name_en.trim().to_lowercase().replace(' ', "_"),
        }
    }

    fn into_definition(self) -> Result<Option<SignalDefinition>> {
        let key = self.resolved_key();
        let definition = match self.kind.trim() {
            "bit" => {
                let bit = self.bit.ok_or_else(|| {
                    DecoderError::InvalidSignalDefinition(format!(
                        "bit signal '{}' has no bit column",
                        key
                    ))
                })?;
                SignalDefinition::bit_flag(key, self.offset, bit)
            }
            "int" => {
                let length = self.length.ok_or_else(|| {
                    DecoderError::InvalidSignalDefinition(format!(
                        "int signal '{}' has no length column",
                        key
                    ))
                })?;
                let signed = parse_flag(self.signed.as_deref().unwrap_or(""), &key)?;
                SignalDefinition::numeric(
                    key,
                    self.offset,
                    length,
                    signed,
                    self.scale.unwrap_or(1.0),
                    self.units,
                )
            }
            other => {
                log::warn!("Skipping signal '{}' with unsupported type '{}'", key, other);
                return Ok(None);
            }
        };

        Ok(Some(
            definition
                .with_name(self.name_en)
                .with_classes(self.state_class, self.device_class),
        ))
    }
}

fn parse_flag(value: &str, key: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" => Ok(false),
        "1" | "true" => Ok(true),
        other => Err(DecoderError::InvalidSignalDefinition(format!(
            "signal '{}': cannot interpret signed flag '{}'",
            key, other
        ))),
    }
}

/// Parse a signal table from any reader
pub fn parse_signal_map<R: Read>(reader: R, filter: &SignalMapFilter) -> Result<SignalMap> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut map = SignalMap::new();
    for row in csv_reader.deserialize::<SignalRow>() {
        let row = row.map_err(|e| DecoderError::SignalMapParse(e.to_string()))?;

        if !filter.accepts(row.source, row.message_id) {
            continue;
        }
        let message_id = u8::try_from(row.message_id).map_err(|_| {
            DecoderError::InvalidSignalDefinition(format!(
                "message id {} out of range",
                row.message_id
            ))
        })?;

        if let Some(definition) = row.into_definition()? {
            log::trace!("Signal {} -> message {}", definition.key, message_id);
            map.insert(message_id, definition)?;
        }
    }

    Ok(map)
}

/// Load a signal table from a CSV file
pub fn load_signal_map(path: &Path, filter: &SignalMapFilter) -> Result<SignalMap> {
    log::info!("Loading signal table: {:?}", path);

    let file = File::open(path).map_err(|e| {
        DecoderError::SignalMapParse(format!("Failed to read file {:?}: {}", path, e))
    })?;
    let map = parse_signal_map(file, filter)?;

    let stats = map.stats();
    log::info!(
        "Loaded {} signals for {} message ids from {:?}",
        stats.num_signals,
        stats.num_messages,
        path
    );
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::map::SignalEncoding;
    use std::io::Write;

    const TABLE: &str = "\
message_id,source,type,offset,bit,length,signed,scale,units,key,name_en,state_class,device_class
32,10,bit,3,6,,,,,,Ash Can OK,,
32,10,int,12,,2,1,0.1,°C,heater_temp,Heater Temp,measurement,temperature
33,10,int,13,,1,0,1,%,boiler_output,Heater Output,measurement,power_factor
33,11,int,13,,1,0,1,%,other_source,Other Source,,
48,10,int,45,,2,1,0.1,°C,,Loop 0 Out Temp,measurement,temperature
32,10,float,0,,4,0,1,,,Mystery Value,,
";

    #[test]
    fn test_parse_with_default_filter() {
        let map = parse_signal_map(TABLE.as_bytes(), &SignalMapFilter::default()).unwrap();
        assert_eq!(map.message_ids(), vec![32, 33]);
        assert_eq!(map.stats().num_signals, 3);

        let flag = map.signal(32, "ash_can_ok").unwrap();
        assert_eq!(flag.name, "Ash Can OK");
        assert_eq!(flag.encoding, SignalEncoding::BitFlag { byte_offset: 3, bit_index: 6 });

        let temp = map.signal(32, "heater_temp").unwrap();
        assert_eq!(temp.state_class, "measurement");
        assert_eq!(temp.device_class, "temperature");
        match &temp.encoding {
            SignalEncoding::Numeric { byte_offset, byte_length, signed, scale, unit } => {
                assert_eq!(*byte_offset, 12);
                assert_eq!(*byte_length, 2);
                assert!(*signed);
                assert!((scale - 0.1).abs() < 1e-12);
                assert_eq!(unit, "°C");
            }
            other => panic!("unexpected encoding {:?}", other),
        }

        assert!(map.signal(33, "boiler_output").is_some());
        assert!(map.signal(33, "other_source").is_none());
    }

    #[test]
    fn test_filter_selects_source_and_ids() {
        let filter = SignalMapFilter::new().with_source(10).with_message_ids(vec![48]);
        let map = parse_signal_map(TABLE.as_bytes(), &filter).unwrap();
        assert_eq!(map.message_ids(), vec![48]);
        // Key falls back to the lowercased English name
        assert!(map.signal(48, "loop_0_out_temp").is_some());

        let all_ids = SignalMapFilter::new().with_message_ids(vec![]);
        let map = parse_signal_map(TABLE.as_bytes(), &all_ids).unwrap();
        assert_eq!(map.message_ids(), vec![32, 33, 48]);
    }

    #[test]
    fn test_legacy_sensor_class_header() {
        let table = "\
message_id,source,type,offset,bit,length,signed,scale,units,key,name_en,sensor_class,device_class
64,10,int,19,,2,true,0.1,°C,,Loop 4 Out Temp,measurement,temperature
";
        let map = parse_signal_map(table.as_bytes(), &SignalMapFilter::default()).unwrap();
        let sig = map.signal(64, "loop_4_out_temp").unwrap();
        assert_eq!(sig.state_class, "measurement");
    }

    #[test]
    fn test_bad_rows_are_errors() {
        let missing_bit = "\
message_id,source,type,offset,bit,length,signed,scale,units,key,name_en,state_class,device_class
32,10,bit,3,,,,,,,Broken Flag,,
";
        assert!(matches!(
            parse_signal_map(missing_bit.as_bytes(), &SignalMapFilter::default()),
            Err(DecoderError::InvalidSignalDefinition(_))
        ));

        let bad_number = "\
message_id,source,type,offset,bit,length,signed,scale,units,key,name_en,state_class,device_class
32,10,int,abc,,2,0,1,,,Broken Int,,
";
        assert!(matches!(
            parse_signal_map(bad_number.as_bytes(), &SignalMapFilter::default()),
            Err(DecoderError::SignalMapParse(_))
        ));

        let duplicate = "\
message_id,source,type,offset,bit,length,signed,scale,units,key,name_en,state_class,device_class
32,10,bit,3,6,,,,,same,A,,
32,10,bit,3,7,,,,,same,B,,
";
        assert!(parse_signal_map(duplicate.as_bytes(), &SignalMapFilter::default()).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TABLE.as_bytes()).unwrap();
        file.flush().unwrap();

        let map = load_signal_map(file.path(), &SignalMapFilter::default()).unwrap();
        assert_eq!(map.stats().num_signals, 3);

        let missing = load_signal_map(Path::new("/nonexistent/signals.csv"), &SignalMapFilter::default());
        assert!(matches!(missing, Err(DecoderError::SignalMapParse(_))));
    }
}
