//! Frame synchronisation
//!
//! Wire layout:
//!
//! ```text
//! +-----+---------+--------+------------+---------+-----------------+----------+
//! | STX | [STX]   | LENGTH | MESSAGE_ID | COUNTER | PAYLOAD[LEN-5]  | CHECKSUM |
//! +-----+---------+--------+------------+---------+-----------------+----------+
//! ```
//!
//! The optional second STX marks a Sense frame; without it the frame is a
//! Control frame. A `0x00` after STX means the STX was spurious. Inside the
//! payload every `0x02` is followed by a stuffing byte that is dropped.
//!
//! [`FrameDecoder`] is fed one byte at a time and hands back a [`Message`]
//! whenever a checksum byte completes a frame. It never validates the
//! checksum itself; see [`Message::is_valid`].

use crate::checksum::message_checksum;
use crate::types::{Message, MessageKind, Timestamp, FRAME_OVERHEAD};
use chrono::Utc;

/// Start-of-frame marker
pub const STX: u8 = 0x02;

/// Byte inserted after a literal STX inside the payload
pub const STUFFING_BYTE: u8 = 0x00;

/// Decoder state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameState {
    /// Discarding bytes until STX
    WaitHeader,
    /// A read failed mid-frame; the partial frame was dropped and the
    /// decoder scans for STX exactly as in `WaitHeader`
    Resyncing,
    /// Decision point after STX: `0x00` aborts, `0x02` marks a Sense frame,
    /// anything else is LENGTH
    ReadLength { kind: MessageKind },
    ReadMessageId { kind: MessageKind, length: u8 },
    ReadCounter { kind: MessageKind, length: u8, message_id: u8 },
    ReadPayload {
        kind: MessageKind,
        length: u8,
        message_id: u8,
        counter: u8,
        /// Previous payload byte was STX; the next byte is stuffing
        stuffing: bool,
    },
    ReadChecksum { kind: MessageKind, length: u8, message_id: u8, counter: u8 },
}

impl FrameState {
    /// True while part of a frame has been consumed
    pub fn in_frame(&self) -> bool {
        !matches!(self, FrameState::WaitHeader | FrameState::Resyncing)
    }
}

/// Byte-at-a-time frame decoder
#[derive(Debug)]
pub struct FrameDecoder {
    state: FrameState,
    payload: Vec<u8>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder waiting for a header
    pub fn new() -> Self {
        Self {
            state: FrameState::WaitHeader,
            payload: Vec::with_capacity(u8::MAX as usize),
        }
    }

    /// Current state
    pub fn state(&self) -> &FrameState {
        &self.state
    }

    /// Feed one byte, stamping a completed frame with the current time
    pub fn push(&mut self, byte: u8) -> Option<Message> {
        self.push_at(byte, Utc::now())
    }

    /// Feed one byte; `now` becomes `received_at` if this byte completes a frame
    pub fn push_at(&mut self, byte: u8, now: Timestamp) -> Option<Message> {
        match std::mem::replace(&mut self.state, FrameState::WaitHeader) {
            FrameState::WaitHeader | FrameState::Resyncing => {
                if byte == STX {
                    self.state = FrameState::ReadLength { kind: MessageKind::Control };
                } else {
                    self.state = FrameState::WaitHeader;
                }
            }
            FrameState::ReadLength { .. } if byte == STUFFING_BYTE => {
                log::trace!("Spurious STX, waiting for next header");
            }
            FrameState::ReadLength { .. } if byte == STX => {
                self.state = FrameState::ReadLength { kind: MessageKind::Sense };
            }
            FrameState::ReadLength { .. } if byte < FRAME_OVERHEAD => {
                log::debug!("Length byte {} shorter than frame overhead, resynchronising", byte);
            }
            FrameState::ReadLength { kind } => {
                self.state = FrameState::ReadMessageId { kind, length: byte };
            }
            FrameState::ReadMessageId { kind, length } => {
                self.state = FrameState::ReadCounter { kind, length, message_id: byte };
            }
            FrameState::ReadCounter { kind, length, message_id } => {
                self.payload.clear();
                self.state = if length == FRAME_OVERHEAD {
                    FrameState::ReadChecksum { kind, length, message_id, counter: byte }
                } else {
                    FrameState::ReadPayload {
                        kind,
                        length,
                        message_id,
                        counter: byte,
                        stuffing: false,
                    }
                };
            }
            FrameState::ReadPayload { kind, length, message_id, counter, stuffing } => {
                let stuffing = if stuffing {
                    if byte != STUFFING_BYTE {
                        log::trace!("Unexpected stuffing byte 0x{:02X} dropped", byte);
                    }
                    false
                } else {
                    self.payload.push(byte);
                    byte == STX
                };

                let complete = self.payload.len() == (length - FRAME_OVERHEAD) as usize;
                self.state = if complete && !stuffing {
                    FrameState::ReadChecksum { kind, length, message_id, counter }
                } else {
                    FrameState::ReadPayload { kind, length, message_id, counter, stuffing }
                };
            }
            FrameState::ReadChecksum { kind, length, message_id, counter } => {
                let payload = std::mem::take(&mut self.payload);
                log::trace!(
                    "Frame complete: kind={} id={} counter={} length={} checksum=0x{:02X}",
                    kind,
                    message_id,
                    counter,
                    length,
                    byte
                );
                return Some(Message::from_parts(
                    kind, message_id, length, counter, payload, byte, now,
                ));
            }
        }
        None
    }

    /// Drop any partial frame after a failed read
    ///
    /// Moves to [`FrameState::Resyncing`] if a frame was in progress.
    pub fn abort(&mut self) {
        if self.state.in_frame() {
            log::debug!("Read failed mid-frame in state {:?}, resynchronising", self.state);
            self.state = FrameState::Resyncing;
        }
        self.payload.clear();
    }

    /// Return to `WaitHeader`, discarding everything (used after reopening the source)
    pub fn reset(&mut self) {
        self.state = FrameState::WaitHeader;
        self.payload.clear();
    }
}

/// Encode a frame for the wire, stuffing literal STX bytes in the payload
///
/// # Panics
/// If the payload is too long for the one-byte LENGTH field.
pub fn encode_frame(kind: MessageKind, message_id: u8, counter: u8, payload: &[u8]) -> Vec<u8> {
    let length = u8::try_from(payload.len() + FRAME_OVERHEAD as usize)
        .expect("payload too long for a single frame");
    let stuffed = payload.iter().filter(|&&b| b == STX).count();
    let mut buf = Vec::with_capacity(payload.len() + stuffed + 6);

    buf.push(STX);
    if kind == MessageKind::Sense {
        buf.push(STX);
    }
    buf.push(length);
    buf.push(message_id);
    buf.push(counter);
    for &b in payload {
        buf.push(b);
        if b == STX {
            buf.push(STUFFING_BYTE);
        }
    }
    buf.push(message_checksum(length, message_id, counter, payload));
    buf
}
