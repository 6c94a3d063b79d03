//! KWB Protocol Decoder Library
//!
//! Decodes the framed, checksummed byte stream spoken by KWB Easyfire pellet
//! heating controllers into named sensor readings, and derives burner runtime,
//! heat energy and pellet consumption from the reported boiler output.
//!
//! # Architecture
//!
//! Data flows strictly upward:
//!
//! bytes → [`FrameDecoder`] → checksum validation → [`MessageDecoder`] →
//! [`MessageStream`] → caller
//!
//! - [`sources`] provides the byte transports (serial, TCP, replay files, memory)
//! - [`frame`] resynchronises on the STX marker and removes byte stuffing
//! - [`checksum`] implements the controller's rotate-and-add checksum
//! - [`signals`] holds the per-message signal map and its CSV loader
//! - [`stream`] filters messages and keeps the energy/runtime counters
//!
//! The library does NOT persist counters; read them back with
//! [`MessageStream::into_state`] and seed the next run with
//! [`MessageStream::with_state`].
//!
//! # Example Usage
//!
//! ```no_run
//! use kwb_decoder::{load_signal_map, MessageStream, SignalMapFilter, StreamConfig, TcpSource};
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let map = load_signal_map(Path::new("signals.csv"), &SignalMapFilter::default()).unwrap();
//! let source = TcpSource::new("192.168.1.50:23").with_read_timeout(Duration::from_secs(5));
//! let config = StreamConfig::new().with_reconnect(true);
//!
//! let mut stream = MessageStream::new(source, Arc::new(map), config).unwrap();
//! if let Some(record) = stream.read_data_once(&[32, 33], Some(Duration::from_secs(3))).unwrap() {
//!     println!("Energy so far: {:.2} kWh", record.energy_kwh);
//! }
//! ```

// Public modules
pub mod checksum;
pub mod config;
pub mod frame;
pub mod signals;
pub mod sources;
pub mod stream;
pub mod types;

// Re-export main types for convenience
pub use config::{FilterMode, HeaterConfig, StreamConfig};
pub use frame::{encode_frame, FrameDecoder, FrameState};
pub use message_decoder::{MessageDecoder, DISCONNECTED_SENTINEL};
pub use signals::{
    load_signal_map, parse_signal_map, SignalDefinition, SignalEncoding, SignalMap,
    SignalMapFilter,
};
pub use sources::{ByteSource, MemorySource, ReplayFormat, ReplaySource, SerialSource, TcpSource};
pub use stream::aggregate::{AggregateState, Aggregator, DataRecord, BOILER_OUTPUT_KEY};
pub use stream::{DataRecords, FilteredMessages, MessageStream, Messages, ReadOutcome};
pub use types::{DecodedSignal, DecoderError, Message, MessageKind, Result, Timestamp};

mod message_decoder;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
