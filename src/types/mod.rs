//! Core types for VRT packet representation.
//!
//! - [`PacketHeader`] is the 32-bit word that starts every packet
//! - [`Packet`] is either a [`ContextPacket`] (metadata) or a [`DataPacket`] (samples)
//! - [`StreamId`] is the closed set of stream identifiers the instrument emits
//! - [`Trailer`] exposes the mirrored flag pairs at the end of a data packet
//!
//! ## Usage Example
//!
//! ```rust
//! use vrtsweep::types::{PacketHeader, PacketType};
//!
//! let header = PacketHeader::new(PacketType::Data, 3, 10);
//! let parsed = PacketHeader::parse(header.to_word()).unwrap();
//! assert_eq!(parsed.count, 3);
//! assert_eq!(parsed.payload_bytes(), 16);
//! ```

mod header;
mod packet;
mod stream_id;
mod trailer;

pub use header::{DATA_OVERHEAD_WORDS, HEADER_BYTES, PacketHeader, PacketType};
pub use packet::{ContextField, ContextPacket, DataPacket, Packet, Payload};
pub use stream_id::{
    CUSTOM_STREAM_ID, DIGITIZER_STREAM_ID, IF_DATA_I14_STREAM_ID, IF_DATA_I14Q14_STREAM_ID,
    IF_DATA_I24_STREAM_ID, IF_DATA_PSD8_STREAM_ID, RECEIVER_STREAM_ID, RECORDING_STATE_STREAM_ID,
    StreamId,
};
pub use trailer::{Trailer, trailer_bits};
