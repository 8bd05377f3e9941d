//! VRT (VITA-49 style) packet protocol.
//!
//! - [`framer`] splits a byte stream into packets regardless of chunking
//! - [`decode`] turns framed packets into [`crate::types::Packet`] values
//! - [`encode`] builds wire bytes for recordings and replay
//! - [`reader`] drives the framer from a blocking [`std::io::Read`]

pub mod decode;
pub mod encode;
pub mod framer;
pub mod reader;

pub use decode::{decode, decode_packet, indicators};
pub use framer::{PacketFramer, RawPacket};
pub use reader::PacketReader;
