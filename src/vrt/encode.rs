//! VRT packet encoding
//!
//! The inverse of [`super::decode`]. Used to write recordings and to build
//! packet streams for replay and tests.

use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;

use super::framer::{DATA_SUBHEADER_BYTES, TRAILER_BYTES};
use crate::types::{DATA_OVERHEAD_WORDS, HEADER_BYTES, PacketHeader, PacketType, Trailer};
use crate::{Result, SweepError};

fn packet_words(body_bytes: usize, what: &str) -> Result<u16> {
    let total = HEADER_BYTES + body_bytes;
    if total % 4 != 0 {
        return Err(SweepError::malformed(what, format!("{} bytes is not word aligned", total)));
    }
    u16::try_from(total / 4).map_err(|_| {
        SweepError::malformed(what, format!("{} bytes exceeds the 16-bit size field", total))
    })
}

fn context_type(stream_id: u32) -> PacketType {
    // sweep ids, stream ids and recording state travel in vendor context packets
    if stream_id == crate::types::CUSTOM_STREAM_ID
        || stream_id == crate::types::RECORDING_STATE_STREAM_ID
    {
        PacketType::CustomContext
    } else {
        PacketType::Context
    }
}

/// Encode a timestamped context packet. `data` is padded to a word boundary.
pub fn encode_context(
    stream_id: u32,
    count: u8,
    tsi: u32,
    tsf: u64,
    indicators: u32,
    data: &[u8],
) -> Result<Vec<u8>> {
    let padded = data.len().div_ceil(4) * 4;
    let size = packet_words(4 + 4 + 8 + 4 + padded, "context encode")?;
    let header = PacketHeader::new(context_type(stream_id), count, size);

    let mut bytes = Vec::with_capacity(header.packet_bytes());
    bytes.extend_from_slice(&header.to_word().to_be_bytes());
    bytes.extend_from_slice(&stream_id.to_be_bytes());
    bytes.extend_from_slice(&tsi.to_be_bytes());
    bytes.extend_from_slice(&tsf.to_be_bytes());
    bytes.extend_from_slice(&indicators.to_be_bytes());
    bytes.extend_from_slice(data);
    bytes.resize(header.packet_bytes(), 0);
    Ok(bytes)
}

/// Encode a context packet without timestamps: header and stream id only.
pub fn encode_context_untimed(stream_id: u32, count: u8) -> Vec<u8> {
    let header = PacketHeader {
        packet_type: context_type(stream_id),
        count: count & 0x0F,
        timestamp_present: false,
        size: 2,
    };
    let mut bytes = header.to_word().to_be_bytes().to_vec();
    bytes.extend_from_slice(&stream_id.to_be_bytes());
    bytes
}

/// Encode a data packet around already-serialized payload bytes.
pub fn encode_data(
    stream_id: u32,
    count: u8,
    tsi: u32,
    tsf: u64,
    payload: &[u8],
    trailer: Trailer,
) -> Result<Vec<u8>> {
    let size = packet_words(DATA_SUBHEADER_BYTES + payload.len() + TRAILER_BYTES, "data encode")?;
    debug_assert!(size >= DATA_OVERHEAD_WORDS);
    let header = PacketHeader::new(PacketType::Data, count, size);

    let mut bytes = Vec::with_capacity(header.packet_bytes());
    bytes.extend_from_slice(&header.to_word().to_be_bytes());
    bytes.extend_from_slice(&stream_id.to_be_bytes());
    bytes.extend_from_slice(&tsi.to_be_bytes());
    bytes.extend_from_slice(&tsf.to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes.extend_from_slice(&trailer.value().to_be_bytes());
    Ok(bytes)
}

/// Hz to the 64-bit fixed-point form with 20 fractional bits.
pub fn encode_fixed_point(hz: f64) -> u64 {
    let whole = hz.floor();
    let frac = ((hz - whole) * 0xFFFFF as f64).round() as i64;
    (((whole as i64) << 20) | (frac & 0xFFFFF)) as u64
}

/// zlib-compressed JSON, prefixed with its compressed length.
pub fn encode_recording_state(state: &serde_json::Value) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(state)
        .map_err(|e| SweepError::config("recording state", e.to_string()))?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| SweepError::io("compressing recording state", e))?;
    let compressed =
        encoder.finish().map_err(|e| SweepError::io("compressing recording state", e))?;

    let len = u32::try_from(compressed.len())
        .map_err(|_| SweepError::config("recording state", "compressed state exceeds 4 GiB"))?;
    let mut data = len.to_be_bytes().to_vec();
    data.extend_from_slice(&compressed);
    Ok(data)
}

/// Serialize I/Q pairs as big-endian 16-bit words.
pub fn iq_payload(samples: &[[i16; 2]]) -> Vec<u8> {
    samples.iter().flat_map(|[i, q]| i.to_be_bytes().into_iter().chain(q.to_be_bytes())).collect()
}

/// Serialize real 16-bit samples.
pub fn i16_payload(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_be_bytes()).collect()
}
