//! Async packet streams

mod packets;

pub use packets::{PacketStream, READ_CHUNK_BYTES};
