//! Message stream API
//!
//! [`MessageStream`] is the entry point for reading a controller: it pulls
//! bytes from a [`ByteSource`], runs them through the [`FrameDecoder`], drops
//! frames with a bad checksum and hands out the rest as lazy iterators.
//!
//! Three views are offered, each built on the previous one:
//! - [`MessageStream::read_forever`]: every valid message, in arrival order
//! - [`MessageStream::read_messages`]: an optional deadline and id filter
//! - [`MessageStream::read_data`]: decoded signals plus energy accounting

pub mod aggregate;

use crate::config::{FilterMode, StreamConfig};
use crate::frame::{FrameDecoder, FrameState};
use crate::message_decoder::MessageDecoder;
use crate::signals::SignalMap;
use crate::sources::ByteSource;
use crate::types::{DecodedSignal, DecoderError, Message, Result};
use aggregate::{AggregateState, Aggregator, DataRecord};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why a filtered read stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Every requested message id was emitted
    Completed,
    /// The deadline passed first
    TimedOut,
    /// The byte source has no more data
    EndOfStream,
    /// A transport error was returned to the caller
    Failed,
}

/// Reads and decodes messages from one byte source
pub struct MessageStream<S: ByteSource> {
    source: S,
    decoder: FrameDecoder,
    signal_map: Arc<SignalMap>,
    config: StreamConfig,
    aggregator: Aggregator,
    is_open: bool,
}

impl<S: ByteSource> MessageStream<S> {
    /// Create a stream with fresh counters
    pub fn new(source: S, signal_map: Arc<SignalMap>, config: StreamConfig) -> Result<Self> {
        Self::with_state(source, signal_map, config, AggregateState::default())
    }

    /// Create a stream continuing from previously persisted counters
    pub fn with_state(
        source: S,
        signal_map: Arc<SignalMap>,
        config: StreamConfig,
        state: AggregateState,
    ) -> Result<Self> {
        config.heater.validate()?;
        Ok(Self {
            source,
            decoder: FrameDecoder::new(),
            signal_map,
            aggregator: Aggregator::new(config.heater.clone(), state),
            config,
            is_open: false,
        })
    }

    /// Open the byte source
    pub fn open(&mut self) -> Result<()> {
        self.source.open()?;
        self.decoder.reset();
        self.is_open = true;
        Ok(())
    }

    /// Close the byte source
    pub fn close(&mut self) {
        if self.is_open {
            self.source.close();
            self.is_open = false;
        }
    }

    /// Current accumulated counters
    pub fn state(&self) -> &AggregateState {
        self.aggregator.state()
    }

    /// Close the source and hand back the counters for persistence
    pub fn into_state(mut self) -> AggregateState {
        self.close();
        *self.aggregator.state()
    }

    /// The underlying byte source
    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn signal_map(&self) -> &SignalMap {
        &self.signal_map
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Frame decoder state (exposed for diagnostics)
    pub fn frame_state(&self) -> &FrameState {
        self.decoder.state()
    }

    /// Block until the next message with a valid checksum
    ///
    /// Transport faults trigger a close + reopen when reconnect is enabled;
    /// otherwise they are returned. Frames failing the checksum are logged
    /// and skipped.
    pub fn read_message(&mut self) -> Result<Message> {
        self.read_message_until(None)?.ok_or(DecoderError::Timeout)
    }

    /// Like [`Self::read_message`], giving up with `Ok(None)` once `deadline` passed
    ///
    /// The deadline is checked after every failed read and every rejected
    /// frame, so a silent source being reconnected over and over cannot hold
    /// the caller past it by more than one read.
    fn read_message_until(&mut self, deadline: Option<Instant>) -> Result<Option<Message>> {
        loop {
            match self.read_frame() {
                Ok(message) if message.is_valid() => return Ok(Some(message)),
                Ok(message) => {
                    log::debug!(
                        "Dropping message {} with bad checksum: received 0x{:02X}, computed 0x{:02X}",
                        message.message_id(),
                        message.checksum(),
                        message.computed_checksum()
                    );
                }
                Err(e) if e.is_transport_fault() && self.config.reconnect_on_timeout => {
                    if expired(deadline) {
                        log::debug!("Deadline passed while the byte source was failing ({})", e);
                        return Ok(None);
                    }
                    log::warn!("Byte source fault ({}), reconnecting", e);
                    self.reconnect()?;
                    continue;
                }
                Err(e) => return Err(e),
            }
            if expired(deadline) {
                return Ok(None);
            }
        }
    }

    fn read_frame(&mut self) -> Result<Message> {
        if !self.is_open {
            self.open()?;
        }
        loop {
            let byte = match self.source.read_byte() {
                Ok(byte) => byte,
                Err(e) => {
                    self.decoder.abort();
                    return Err(e);
                }
            };
            if let Some(message) = self.decoder.push(byte) {
                return Ok(message);
            }
        }
    }

    fn reconnect(&mut self) -> Result<()> {
        self.close();
        self.open()?;
        log::info!("Byte source reopened");
        Ok(())
    }

    /// Every valid message until the source ends or fails
    pub fn read_forever(&mut self) -> Messages<'_, S> {
        Messages { stream: self, done: false }
    }

    /// Valid messages, optionally limited by a deadline and an id filter
    ///
    /// With an empty `message_ids` every message is emitted until the
    /// deadline (or forever). Otherwise each requested id is emitted once and
    /// the iterator ends as soon as all of them were seen. The deadline is
    /// fixed when this method is called and checked between messages.
    pub fn read_messages(&mut self, message_ids: &[u8], timeout: Option<Duration>) -> FilteredMessages<'_, S> {
        let mut remaining = message_ids.to_vec();
        remaining.sort_unstable();
        remaining.dedup();

        FilteredMessages {
            filtered: !remaining.is_empty(),
            mode: self.config.filter_mode,
            deadline: timeout.map(|t| Instant::now() + t),
            remaining,
            seen: HashSet::new(),
            outcome: None,
            stream: self,
        }
    }

    /// Cumulative decoded records with energy accounting
    pub fn read_data(&mut self, message_ids: &[u8], timeout: Option<Duration>) -> DataRecords<'_, S> {
        DataRecords {
            inner: self.read_messages(message_ids, timeout),
        }
    }

    /// The last record produced before the filter completes or the deadline passes
    ///
    /// Both a non-empty id list and a timeout are required; the check happens
    /// before any I/O. Returns `Ok(None)` if no message arrived in time.
    pub fn read_data_once(&mut self, message_ids: &[u8], timeout: Option<Duration>) -> Result<Option<DataRecord>> {
        if message_ids.is_empty() {
            return Err(DecoderError::InvalidArgument(
                "read_data_once requires at least one message id".to_string(),
            ));
        }
        let timeout = timeout.ok_or_else(|| {
            DecoderError::InvalidArgument("read_data_once requires a timeout".to_string())
        })?;

        let mut records = self.read_data(message_ids, Some(timeout));
        let mut last = None;
        for record in &mut records {
            last = Some(record?);
        }
        log::debug!("Single-shot read finished: {:?}", records.outcome());
        Ok(last)
    }

    /// Decode all signals of a message (empty if its id has no signal map entry)
    pub fn decode(&self, message: &Message) -> Vec<DecodedSignal> {
        self.signal_map
            .get(message.message_id())
            .map(|signals| MessageDecoder::decode_message(message, signals))
            .unwrap_or_default()
    }

    /// Fold a message into the cumulative signal values and counters
    pub fn apply_message(&mut self, message: &Message) -> DataRecord {
        let decoded = self.decode(message);
        let now_msec = message.received_at().timestamp_millis() as f64;
        self.aggregator.apply(message.message_id(), decoded, now_msec)
    }
}

impl<S: ByteSource> Drop for MessageStream<S> {
    fn drop(&mut self) {
        self.close();
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() > deadline)
}

/// Iterator over every valid message
pub struct Messages<'a, S: ByteSource> {
    stream: &'a mut MessageStream<S>,
    done: bool,
}

impl<S: ByteSource> Iterator for Messages<'_, S> {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.stream.read_message() {
            Ok(message) => Some(Ok(message)),
            Err(DecoderError::EndOfStream) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Iterator returned by [`MessageStream::read_messages`]
pub struct FilteredMessages<'a, S: ByteSource> {
    stream: &'a mut MessageStream<S>,
    deadline: Option<Instant>,
    filtered: bool,
    mode: FilterMode,
    remaining: Vec<u8>,
    seen: HashSet<u8>,
    outcome: Option<ReadOutcome>,
}

impl<S: ByteSource> FilteredMessages<'_, S> {
    /// Why the iterator stopped (`None` while it is still running)
    pub fn outcome(&self) -> Option<ReadOutcome> {
        self.outcome
    }

    /// Requested ids not yet emitted
    pub fn remaining(&self) -> &[u8] {
        &self.remaining
    }

    fn deadline_passed(&self) -> bool {
        expired(self.deadline)
    }

    fn accept(&mut self, message_id: u8) -> bool {
        if self.seen.contains(&message_id) {
            return false;
        }
        let requested = self.remaining.contains(&message_id);
        if !requested && self.mode == FilterMode::Strict {
            return false;
        }
        self.seen.insert(message_id);
        self.remaining.retain(|&id| id != message_id);
        true
    }

    fn finish(&mut self, outcome: ReadOutcome) {
        log::debug!("Filtered read finished: {:?}", outcome);
        self.outcome = Some(outcome);
    }
}

impl<S: ByteSource> Iterator for FilteredMessages<'_, S> {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.outcome.is_some() {
            return None;
        }
        if self.filtered && self.remaining.is_empty() {
            self.finish(ReadOutcome::Completed);
            return None;
        }

        loop {
            if self.deadline_passed() {
                self.finish(ReadOutcome::TimedOut);
                return None;
            }

            let message = match self.stream.read_message_until(self.deadline) {
                Ok(Some(message)) => message,
                Ok(None) => {
                    self.finish(ReadOutcome::TimedOut);
                    return None;
                }
                Err(DecoderError::EndOfStream) => {
                    self.finish(ReadOutcome::EndOfStream);
                    return None;
                }
                Err(e) => {
                    self.finish(ReadOutcome::Failed);
                    return Some(Err(e));
                }
            };

            if self.deadline_passed() {
                self.finish(ReadOutcome::TimedOut);
                return None;
            }
            if !self.filtered || self.accept(message.message_id()) {
                return Some(Ok(message));
            }
            log::trace!("Skipping message {} (not requested or already seen)", message.message_id());
        }
    }
}

/// Iterator returned by [`MessageStream::read_data`]
pub struct DataRecords<'a, S: ByteSource> {
    inner: FilteredMessages<'a, S>,
}

impl<S: ByteSource> DataRecords<'_, S> {
    /// Why the iterator stopped (`None` while it is still running)
    pub fn outcome(&self) -> Option<ReadOutcome> {
        self.inner.outcome()
    }
}

impl<S: ByteSource> Iterator for DataRecords<'_, S> {
    type Item = Result<DataRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let message = match self.inner.next()? {
            Ok(message) => message,
            Err(e) => return Some(Err(e)),
        };
        Some(Ok(self.inner.stream.apply_message(&message)))
    }
}
