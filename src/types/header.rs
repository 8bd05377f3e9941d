//! VRT packet header word
//!
//! Every packet starts with one big-endian 32-bit word:
//!
//! ```text
//!  31    28 27    24 23    20 19    16 15                             0
//! +--------+--------+--------+--------+--------------------------------+
//! |  type  | count  |   ts   |  rsvd  |        size (32-bit words)     |
//! +--------+--------+--------+--------+--------------------------------+
//! ```
//!
//! `size` includes the header word itself, so a packet always occupies
//! exactly `size * 4` bytes on the wire.

use crate::{Result, SweepError};

/// Size of the header word in bytes
pub const HEADER_BYTES: usize = 4;

/// Words a data packet spends on header, stream id, timestamps and trailer
pub const DATA_OVERHEAD_WORDS: u16 = 6;

/// Packet type tag from bits `[31:28]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// IF data (samples)
    Data,
    /// Standard context (receiver/digitizer metadata)
    Context,
    /// Vendor custom context (sweep ids, recording state)
    CustomContext,
}

impl PacketType {
    /// Raw 4-bit tag as sent on the wire
    pub fn tag(self) -> u8 {
        match self {
            PacketType::Data => 1,
            PacketType::Context => 4,
            PacketType::CustomContext => 5,
        }
    }

    /// Map a raw tag to a packet type. Unknown tags are malformed.
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(PacketType::Data),
            4 => Ok(PacketType::Context),
            5 => Ok(PacketType::CustomContext),
            other => Err(SweepError::malformed(
                "packet header",
                format!("unknown packet type tag {}", other),
            )),
        }
    }

    pub fn is_context(self) -> bool {
        matches!(self, PacketType::Context | PacketType::CustomContext)
    }
}

/// Decoded packet header word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub packet_type: PacketType,
    /// Rolling 4-bit sequence number, wraps mod 16 per stream
    pub count: u8,
    /// Context packets carry tsi/tsf/indicators only when this is set
    pub timestamp_present: bool,
    /// Total packet size in 32-bit words including this header
    pub size: u16,
}

impl PacketHeader {
    pub fn new(packet_type: PacketType, count: u8, size: u16) -> Self {
        Self { packet_type, count: count & 0x0F, timestamp_present: true, size }
    }

    /// Parse and validate a header word.
    pub fn parse(word: u32) -> Result<Self> {
        let packet_type = PacketType::from_tag(((word >> 28) & 0x0F) as u8)?;
        let count = ((word >> 24) & 0x0F) as u8;
        let timestamp_present = (word >> 20) & 0x0F != 0;
        let size = (word & 0xFFFF) as u16;

        let header = Self { packet_type, count, timestamp_present, size };
        header.validate()?;
        Ok(header)
    }

    /// Parse the header from the first four bytes of a buffer.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self> {
        let word: [u8; HEADER_BYTES] = bytes
            .get(..HEADER_BYTES)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| {
                SweepError::malformed(
                    "packet header",
                    format!("need {} bytes, have {}", HEADER_BYTES, bytes.len()),
                )
            })?;
        Self::parse(u32::from_be_bytes(word))
    }

    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(SweepError::malformed("packet header", "size of zero words"));
        }
        if self.packet_type == PacketType::Data && self.size < DATA_OVERHEAD_WORDS {
            return Err(SweepError::malformed(
                "packet header",
                format!(
                    "data packet of {} words is smaller than the {} word minimum",
                    self.size, DATA_OVERHEAD_WORDS
                ),
            ));
        }
        Ok(())
    }

    /// Encode back to the wire word.
    pub fn to_word(&self) -> u32 {
        let ts = if self.timestamp_present { 1u32 } else { 0 };
        (u32::from(self.packet_type.tag()) << 28)
            | (u32::from(self.count & 0x0F) << 24)
            | (ts << 20)
            | u32::from(self.size)
    }

    /// Total packet length in bytes, header included
    pub fn packet_bytes(&self) -> usize {
        self.size as usize * 4
    }

    /// Payload length of a data packet in bytes
    pub fn payload_bytes(&self) -> usize {
        self.size.saturating_sub(DATA_OVERHEAD_WORDS) as usize * 4
    }
}
