//! Incremental VRT packet framer
//!
//! [`PacketFramer`] turns an arbitrary chunking of the data channel's byte
//! stream into whole packets. It is an explicit state machine: each state
//! knows how many bytes it needs, input accumulates until that many are
//! available, and the state then advances without ever revisiting consumed
//! bytes. The same framer serves a blocking loop (read exactly
//! [`PacketFramer::bytes_needed`] bytes, feed them) and an event-driven
//! callback (feed whatever arrived, drain completed packets).
//!
//! ## Framing rules
//!
//! 1. Read the 4-byte header word
//! 2. Context / custom context: read `(size - 1) * 4` body bytes
//! 3. Data: read the 16-byte sub-header (stream id, tsi, tsf), then
//!    `(size - 6) * 4` payload bytes, then the 4-byte trailer

use tracing::trace;

use crate::types::{HEADER_BYTES, PacketHeader, PacketType};
use crate::Result;

/// Stream id + tsi + tsf in front of a data payload
pub const DATA_SUBHEADER_BYTES: usize = 16;
/// Data packet trailer word
pub const TRAILER_BYTES: usize = 4;

/// Consumed prefix length that triggers compaction of the input buffer
const COMPACT_THRESHOLD: usize = 64 * 1024;

/// A framed packet: parsed header plus every byte after the header word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub header: PacketHeader,
    pub body: Vec<u8>,
}

impl RawPacket {
    /// Reassemble the exact wire bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_BYTES + self.body.len());
        bytes.extend_from_slice(&self.header.to_word().to_be_bytes());
        bytes.extend_from_slice(&self.body);
        bytes
    }

    /// Wire length in bytes
    pub fn wire_len(&self) -> usize {
        HEADER_BYTES + self.body.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Header,
    ContextBody(PacketHeader),
    DataSubHeader(PacketHeader),
    DataPayload(PacketHeader),
    DataTrailer(PacketHeader),
}

impl FrameState {
    fn step_len(&self) -> usize {
        match self {
            FrameState::Header => HEADER_BYTES,
            FrameState::ContextBody(h) => (h.size as usize - 1) * 4,
            FrameState::DataSubHeader(_) => DATA_SUBHEADER_BYTES,
            FrameState::DataPayload(h) => h.payload_bytes(),
            FrameState::DataTrailer(_) => TRAILER_BYTES,
        }
    }
}

/// Re-entrant packet framer holding `(state, bytes_needed, partial_buffer)`
#[derive(Debug)]
pub struct PacketFramer {
    state: FrameState,
    input: Vec<u8>,
    cursor: usize,
    body: Vec<u8>,
    packets_framed: u64,
}

impl Default for PacketFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketFramer {
    pub fn new() -> Self {
        Self {
            state: FrameState::Header,
            input: Vec::new(),
            cursor: 0,
            body: Vec::new(),
            packets_framed: 0,
        }
    }

    /// Bytes still required before the current step can run.
    pub fn bytes_needed(&self) -> usize {
        self.state.step_len().saturating_sub(self.buffered())
    }

    /// Input bytes held but not yet consumed by a step
    pub fn buffered(&self) -> usize {
        self.input.len() - self.cursor
    }

    /// True when the next byte consumed starts a new packet header.
    pub fn at_boundary(&self) -> bool {
        self.state == FrameState::Header
    }

    /// At a boundary with nothing buffered: a clean place for the stream to end
    pub fn is_idle(&self) -> bool {
        self.at_boundary() && self.buffered() == 0
    }

    pub fn packets_framed(&self) -> u64 {
        self.packets_framed
    }

    /// Append input and return the first packet it completes, if any.
    ///
    /// Further packets completed by the same input stay buffered; drain them
    /// with [`PacketFramer::next_frame`].
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Option<RawPacket>> {
        self.input.extend_from_slice(bytes);
        self.advance()
    }

    /// Continue framing from already-buffered input.
    pub fn next_frame(&mut self) -> Result<Option<RawPacket>> {
        self.advance()
    }

    /// Feed a chunk and collect every packet it completes.
    pub fn feed_all(&mut self, bytes: &[u8]) -> Result<Vec<RawPacket>> {
        let mut packets = Vec::new();
        let mut next = self.feed(bytes)?;
        while let Some(raw) = next {
            packets.push(raw);
            next = self.next_frame()?;
        }
        Ok(packets)
    }

    /// Drop partial state, e.g. after a malformed header desynchronized the stream.
    pub fn reset(&mut self) {
        self.state = FrameState::Header;
        self.input.clear();
        self.cursor = 0;
        self.body.clear();
    }

    fn advance(&mut self) -> Result<Option<RawPacket>> {
        loop {
            let need = self.state.step_len();
            if self.buffered() < need {
                self.compact();
                return Ok(None);
            }

            let start = self.cursor;
            self.cursor += need;
            let step = start..self.cursor;

            match self.state {
                FrameState::Header => {
                    let header = match PacketHeader::parse_bytes(&self.input[step]) {
                        Ok(header) => header,
                        Err(e) => {
                            self.reset();
                            return Err(e);
                        }
                    };
                    trace!(
                        packet_type = ?header.packet_type,
                        count = header.count,
                        size = header.size,
                        "Framed packet header"
                    );
                    self.body.clear();
                    self.state = match header.packet_type {
                        PacketType::Context | PacketType::CustomContext => {
                            FrameState::ContextBody(header)
                        }
                        PacketType::Data => FrameState::DataSubHeader(header),
                    };
                }
                FrameState::ContextBody(header) | FrameState::DataTrailer(header) => {
                    self.body.extend_from_slice(&self.input[step]);
                    self.state = FrameState::Header;
                    self.packets_framed += 1;
                    let body = std::mem::take(&mut self.body);
                    return Ok(Some(RawPacket { header, body }));
                }
                FrameState::DataSubHeader(header) => {
                    self.body.reserve(header.packet_bytes() - HEADER_BYTES);
                    self.body.extend_from_slice(&self.input[step]);
                    self.state = FrameState::DataPayload(header);
                }
                FrameState::DataPayload(header) => {
                    self.body.extend_from_slice(&self.input[step]);
                    self.state = FrameState::DataTrailer(header);
                }
            }
        }
    }

    fn compact(&mut self) {
        if self.cursor == self.input.len() {
            self.input.clear();
            self.cursor = 0;
        } else if self.cursor >= COMPACT_THRESHOLD && self.cursor * 2 >= self.input.len() {
            self.input.drain(..self.cursor);
            self.cursor = 0;
        }
    }
}
