//! Signal map and its tabular loader
//!
//! This module contains the in-memory signal dictionary and the CSV loader
//! that builds it from the controller's signal table.

pub mod map;
pub mod table;

// Re-export key types for convenience
pub use map::{
    MessageSignals, SignalDefinition, SignalEncoding, SignalMap, SignalMapStats, MAX_MESSAGE_ID,
};
pub use table::{
    load_signal_map, parse_signal_map, SignalMapFilter, DEFAULT_MESSAGE_IDS, DEFAULT_SOURCE,
};
