//! VRT packet decoding
//!
//! Turns a framed [`RawPacket`] into a typed [`Packet`]. Context fields are
//! selected by the packet's stream id and then by its indicator word, using
//! an ordered table per stream: the first indicator bit that is set wins and
//! later bits are not inspected. Packets where no bit matches keep the raw
//! indicator word and bytes in [`ContextField::Unknown`].
//!
//! ## Fixed-point conventions
//!
//! - Frequencies (rffreq, bandwidth, rfoffset): 64-bit, integer Hz in
//!   `raw >> 20`, fraction `(raw & 0xFFFFF) / 0xFFFFF`
//! - Gain and reference level: signed 16-bit with 7 fractional bits
//! - Temperature: signed 16-bit with 6 fractional bits

use std::io::Read;

use flate2::read::ZlibDecoder;
use tracing::trace;

use super::framer::{DATA_SUBHEADER_BYTES, RawPacket, TRAILER_BYTES};
use crate::types::{
    ContextField, ContextPacket, DataPacket, HEADER_BYTES, Packet, PacketHeader, PacketType,
    Payload, StreamId, Trailer,
};
use crate::{Result, SweepError};

/// Indicator bits, grouped by the stream that defines them
pub mod indicators {
    pub const CTX_REFERENCE_POINT: u32 = 1 << 30;
    pub const CTX_RF_FREQ: u32 = 1 << 27;
    pub const CTX_GAIN: u32 = 1 << 23;
    pub const CTX_TEMPERATURE: u32 = 1 << 18;

    pub const CTX_BANDWIDTH: u32 = 1 << 29;
    pub const CTX_RF_OFFSET: u32 = 1 << 26;
    pub const CTX_REFERENCE_LEVEL: u32 = 1 << 24;

    pub const CTX_SWEEP_ID: u32 = 1 << 0;
    pub const CTX_STREAM_ID: u32 = 1 << 1;

    pub const CTX_RECORDING_STATE: u32 = 1 << 0;
}

/// stream id + tsi + tsf + indicator word
const CONTEXT_PREAMBLE_BYTES: usize = 20;

type FieldParser = fn(&[u8]) -> Result<ContextField>;

const RECEIVER_FIELDS: &[(u32, FieldParser)] = &[
    (indicators::CTX_REFERENCE_POINT, parse_ref_point),
    (indicators::CTX_RF_FREQ, parse_rf_freq),
    (indicators::CTX_GAIN, parse_gain),
    (indicators::CTX_TEMPERATURE, parse_temperature),
];

const DIGITIZER_FIELDS: &[(u32, FieldParser)] = &[
    (indicators::CTX_BANDWIDTH, parse_bandwidth),
    (indicators::CTX_RF_OFFSET, parse_rf_offset),
    (indicators::CTX_REFERENCE_LEVEL, parse_ref_level),
];

const CUSTOM_FIELDS: &[(u32, FieldParser)] = &[
    (indicators::CTX_SWEEP_ID, parse_sweep_id),
    (indicators::CTX_STREAM_ID, parse_stream_id),
];

const RECORDING_FIELDS: &[(u32, FieldParser)] =
    &[(indicators::CTX_RECORDING_STATE, parse_recording_state)];

fn field_table(stream_id: StreamId) -> Option<&'static [(u32, FieldParser)]> {
    match stream_id {
        StreamId::Receiver => Some(RECEIVER_FIELDS),
        StreamId::Digitizer => Some(DIGITIZER_FIELDS),
        StreamId::Custom => Some(CUSTOM_FIELDS),
        StreamId::RecordingState => Some(RECORDING_FIELDS),
        _ => None,
    }
}

/// Decode a framed packet.
pub fn decode(raw: &RawPacket) -> Result<Packet> {
    match raw.header.packet_type {
        PacketType::Context | PacketType::CustomContext => {
            decode_context(raw.header, &raw.body).map(Packet::Context)
        }
        PacketType::Data => decode_data(raw.header, &raw.body).map(Packet::Data),
    }
}

/// Decode exactly one packet from a complete byte buffer (e.g. an offline recording entry).
pub fn decode_packet(bytes: &[u8]) -> Result<Packet> {
    let header = PacketHeader::parse_bytes(bytes)?;
    if bytes.len() != header.packet_bytes() {
        return Err(SweepError::malformed(
            "standalone decode",
            format!(
                "header declares {} bytes but buffer holds {}",
                header.packet_bytes(),
                bytes.len()
            ),
        ));
    }
    decode(&RawPacket { header, body: bytes[HEADER_BYTES..].to_vec() })
}

/// Decode a context packet body (everything after the header word).
pub fn decode_context(header: PacketHeader, body: &[u8]) -> Result<ContextPacket> {
    let stream_id = StreamId::from_raw(read_u32(body, 0, "context stream id")?);

    if !header.timestamp_present {
        return Ok(ContextPacket {
            header,
            stream_id,
            tsi: None,
            tsf: None,
            indicators: None,
            field: None,
        });
    }

    let tsi = read_u32(body, 4, "context tsi")?;
    let tsf = read_u64(body, 8, "context tsf")?;
    let indicator_word = read_u32(body, 16, "context indicators")?;
    let data = &body[CONTEXT_PREAMBLE_BYTES..];

    let field = parse_context_field(stream_id, indicator_word, data)?;
    trace!(?stream_id, field = %field, "Decoded context packet");

    Ok(ContextPacket {
        header,
        stream_id,
        tsi: Some(tsi),
        tsf: Some(tsf),
        indicators: Some(indicator_word),
        field: Some(field),
    })
}

/// Run the ordered indicator table for a stream; first match wins.
pub fn parse_context_field(
    stream_id: StreamId,
    indicator_word: u32,
    data: &[u8],
) -> Result<ContextField> {
    let matched = field_table(stream_id)
        .and_then(|table| table.iter().find(|(mask, _)| indicator_word & mask != 0));

    match matched {
        Some((_, parser)) => parser(data),
        None => Ok(ContextField::Unknown { indicators: indicator_word, data: data.to_vec() }),
    }
}

/// Decode a data packet body: sub-header, payload, trailer.
pub fn decode_data(header: PacketHeader, body: &[u8]) -> Result<DataPacket> {
    let expected = DATA_SUBHEADER_BYTES + header.payload_bytes() + TRAILER_BYTES;
    if body.len() != expected {
        return Err(SweepError::malformed(
            "data packet",
            format!("expected {} body bytes for size {}, have {}", expected, header.size, body.len()),
        ));
    }

    let stream_id = StreamId::from_raw(read_u32(body, 0, "data stream id")?);
    let tsi = read_u32(body, 4, "data tsi")?;
    let tsf = read_u64(body, 8, "data tsf")?;
    let payload_bytes = &body[DATA_SUBHEADER_BYTES..expected - TRAILER_BYTES];
    let trailer = Trailer::new(read_u32(body, expected - TRAILER_BYTES, "data trailer")?);

    let payload = decode_payload(stream_id, payload_bytes);
    trace!(?stream_id, samples = payload.len(), trailer = trailer.value(), "Decoded data packet");

    Ok(DataPacket { header, stream_id, tsi, tsf, payload, trailer })
}

fn decode_payload(stream_id: StreamId, bytes: &[u8]) -> Payload {
    match stream_id {
        StreamId::IfDataI14Q14 => Payload::IqI16(
            bytes
                .chunks_exact(4)
                .map(|c| {
                    [i16::from_be_bytes([c[0], c[1]]), i16::from_be_bytes([c[2], c[3]])]
                })
                .collect(),
        ),
        StreamId::IfDataI14 => {
            Payload::I16(bytes.chunks_exact(2).map(|c| i16::from_be_bytes([c[0], c[1]])).collect())
        }
        StreamId::IfDataI24 => Payload::I32(
            bytes.chunks_exact(4).map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]])).collect(),
        ),
        StreamId::IfDataPsd8 => Payload::Psd8(bytes.to_vec()),
        _ => Payload::Raw(bytes.to_vec()),
    }
}

/// 64-bit frequency with 20 fractional bits
pub fn fixed_point_u64(raw: u64) -> f64 {
    (raw >> 20) as f64 + (raw & 0xFFFFF) as f64 / 0xFFFFF as f64
}

/// Signed variant of [`fixed_point_u64`]; the integer part uses an arithmetic shift
pub fn fixed_point_i64(raw: i64) -> f64 {
    (raw >> 20) as f64 + (raw & 0xFFFFF) as f64 / 0xFFFFF as f64
}

fn parse_ref_point(data: &[u8]) -> Result<ContextField> {
    Ok(ContextField::RefPoint(read_u32(data, 0, "reference point")?))
}

fn parse_rf_freq(data: &[u8]) -> Result<ContextField> {
    Ok(ContextField::RfFreq(fixed_point_u64(read_u64(data, 0, "rf frequency")?)))
}

fn parse_gain(data: &[u8]) -> Result<ContextField> {
    let stage1 = read_i16(data, 0, "gain stage 1")?;
    let stage2 = read_i16(data, 2, "gain stage 2")?;
    Ok(ContextField::Gain { stage1: f64::from(stage1) / 128.0, stage2: f64::from(stage2) / 128.0 })
}

fn parse_temperature(data: &[u8]) -> Result<ContextField> {
    let raw = read_i16(data, 2, "temperature")?;
    Ok(ContextField::Temperature(f64::from(raw) / 64.0))
}

fn parse_bandwidth(data: &[u8]) -> Result<ContextField> {
    Ok(ContextField::Bandwidth(fixed_point_u64(read_u64(data, 0, "bandwidth")?)))
}

fn parse_rf_offset(data: &[u8]) -> Result<ContextField> {
    let raw = read_u64(data, 0, "rf offset")? as i64;
    Ok(ContextField::RfOffset(fixed_point_i64(raw)))
}

fn parse_ref_level(data: &[u8]) -> Result<ContextField> {
    let raw = read_i16(data, 2, "reference level")?;
    Ok(ContextField::RefLevel(f64::from(raw) / 128.0))
}

fn parse_sweep_id(data: &[u8]) -> Result<ContextField> {
    Ok(ContextField::SweepId(read_u32(data, 0, "sweep id")?))
}

fn parse_stream_id(data: &[u8]) -> Result<ContextField> {
    Ok(ContextField::StreamId(read_u32(data, 0, "stream id")?))
}

fn parse_recording_state(data: &[u8]) -> Result<ContextField> {
    let len = read_u32(data, 0, "recording state length")? as usize;
    let compressed = data.get(4..4 + len).ok_or_else(|| {
        SweepError::malformed(
            "recording state",
            format!("declares {} compressed bytes, {} available", len, data.len().saturating_sub(4)),
        )
    })?;

    let mut json = Vec::new();
    ZlibDecoder::new(compressed)
        .read_to_end(&mut json)
        .map_err(|e| SweepError::malformed("recording state", format!("zlib: {}", e)))?;
    let value = serde_json::from_slice(&json)
        .map_err(|e| SweepError::malformed("recording state", format!("json: {}", e)))?;

    Ok(ContextField::RecordingState(value))
}

fn field_bytes<const N: usize>(data: &[u8], offset: usize, what: &str) -> Result<[u8; N]> {
    data.get(offset..offset + N).and_then(|b| b.try_into().ok()).ok_or_else(|| {
        SweepError::malformed(
            what,
            format!(
                "need {} bytes at offset {}, have {}",
                N,
                offset,
                data.len().saturating_sub(offset)
            ),
        )
    })
}

fn read_u32(data: &[u8], offset: usize, what: &str) -> Result<u32> {
    field_bytes::<4>(data, offset, what).map(u32::from_be_bytes)
}

fn read_u64(data: &[u8], offset: usize, what: &str) -> Result<u64> {
    field_bytes::<8>(data, offset, what).map(u64::from_be_bytes)
}

fn read_i16(data: &[u8], offset: usize, what: &str) -> Result<i16> {
    field_bytes::<2>(data, offset, what).map(i16::from_be_bytes)
}

#[cfg(test)]
mod tests {
    use super::indicators::*;
    use super::*;
    use crate::test_utils::{context_packet_bytes, data_packet_bytes};
    use crate::types::{
        CUSTOM_STREAM_ID, DIGITIZER_STREAM_ID, IF_DATA_I14_STREAM_ID, IF_DATA_I14Q14_STREAM_ID,
        IF_DATA_I24_STREAM_ID, IF_DATA_PSD8_STREAM_ID, RECEIVER_STREAM_ID, trailer_bits,
    };
    use crate::vrt::encode::{encode_fixed_point, encode_recording_state};

    fn context_field(stream: u32, indicator_word: u32, data: &[u8]) -> ContextField {
        let bytes = context_packet_bytes(stream, 0, indicator_word, data);
        match decode_packet(&bytes).unwrap() {
            Packet::Context(ctx) => ctx.field.expect("timestamped context has a field"),
            other => panic!("expected context packet, got {other:?}"),
        }
    }

    #[test]
    fn rf_frequency_uses_twenty_fractional_bits() {
        let raw: u64 = (2_400_000_000u64 << 20) | 0xFFFFF / 2;
        let field = context_field(RECEIVER_STREAM_ID, CTX_RF_FREQ, &raw.to_be_bytes());
        match field {
            ContextField::RfFreq(hz) => assert!((hz - 2_400_000_000.5).abs() < 1e-3),
            other => panic!("unexpected {other:?}"),
        }
        assert!((fixed_point_u64(encode_fixed_point(915.25e6)) - 915.25e6).abs() < 1e-3);
    }

    #[test]
    fn gain_and_reference_level_have_seven_fractional_bits() {
        let mut gain = Vec::new();
        gain.extend_from_slice(&(-256i16).to_be_bytes());
        gain.extend_from_slice(&64i16.to_be_bytes());
        assert_eq!(
            context_field(RECEIVER_STREAM_ID, CTX_GAIN, &gain),
            ContextField::Gain { stage1: -2.0, stage2: 0.5 }
        );

        let mut level = vec![0u8, 0];
        level.extend_from_slice(&(-1280i16).to_be_bytes());
        assert_eq!(
            context_field(DIGITIZER_STREAM_ID, CTX_REFERENCE_LEVEL, &level),
            ContextField::RefLevel(-10.0)
        );
    }

    #[test]
    fn first_matching_indicator_wins() {
        // both reference point and rf frequency set: reference point is checked first
        let both = CTX_REFERENCE_POINT | CTX_RF_FREQ;
        let data = 42u64.to_be_bytes();
        assert_eq!(context_field(RECEIVER_STREAM_ID, both, &data), ContextField::RefPoint(0));

        // sweep id outranks stream id on the custom stream
        let field = context_field(CUSTOM_STREAM_ID, CTX_SWEEP_ID | CTX_STREAM_ID, &9u32.to_be_bytes());
        assert_eq!(field, ContextField::SweepId(9));
    }

    #[test]
    fn unmatched_indicators_are_kept() {
        let field = context_field(DIGITIZER_STREAM_ID, 1 << 5, &[1, 2, 3, 4]);
        assert_eq!(field, ContextField::Unknown { indicators: 1 << 5, data: vec![1, 2, 3, 4] });

        let field = context_field(0x1234_5678, CTX_SWEEP_ID, &[9, 9, 9, 9]);
        assert!(matches!(field, ContextField::Unknown { indicators: 1, .. }));
    }

    #[test]
    fn negative_rf_offset() {
        let raw = encode_fixed_point(-1.5e6) as i64;
        let field = context_field(DIGITIZER_STREAM_ID, CTX_RF_OFFSET, &raw.to_be_bytes());
        match field {
            ContextField::RfOffset(hz) => assert!((hz + 1.5e6).abs() < 1e-3, "{hz}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn short_field_data_is_malformed() {
        let bytes = context_packet_bytes(RECEIVER_STREAM_ID, 0, CTX_RF_FREQ, &[0, 0, 0, 1]);
        let err = decode_packet(&bytes).unwrap_err();
        assert!(matches!(err, SweepError::MalformedPacket { .. }));
    }

    #[test]
    fn context_without_timestamp_reads_only_stream_id() {
        let header = PacketHeader {
            packet_type: PacketType::Context,
            count: 2,
            timestamp_present: false,
            size: 2,
        };
        let mut bytes = header.to_word().to_be_bytes().to_vec();
        bytes.extend_from_slice(&RECEIVER_STREAM_ID.to_be_bytes());
        let ctx = match decode_packet(&bytes).unwrap() {
            Packet::Context(ctx) => ctx,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(ctx.stream_id, StreamId::Receiver);
        assert_eq!(ctx.tsi, None);
        assert_eq!(ctx.field, None);
    }

    #[test]
    fn recording_state_round_trips_through_zlib() {
        let state = serde_json::json!({"mode": "SH", "attenuation": 20.0});
        let blob = encode_recording_state(&state).unwrap();
        let field = context_field(crate::types::RECORDING_STATE_STREAM_ID, CTX_RECORDING_STATE, &blob);
        assert_eq!(field, ContextField::RecordingState(state));
    }

    #[test]
    fn data_payload_layouts() {
        let payload: Vec<u8> = vec![0x00, 0x01, 0xFF, 0xFE, 0x7F, 0xFF, 0x80, 0x00];
        let trailer = Trailer::with_flags(&[trailer_bits::SPECTRAL_INVERSION]);

        let iq = decode_packet(&data_packet_bytes(IF_DATA_I14Q14_STREAM_ID, 5, &payload, trailer))
            .unwrap();
        let iq = iq.as_data().unwrap();
        assert_eq!(iq.payload, Payload::IqI16(vec![[1, -2], [i16::MAX, i16::MIN]]));
        assert!(iq.spectral_inversion());
        assert_eq!(iq.count(), 5);

        let i16s = decode_packet(&data_packet_bytes(IF_DATA_I14_STREAM_ID, 0, &payload, trailer))
            .unwrap();
        assert_eq!(i16s.as_data().unwrap().payload, Payload::I16(vec![1, -2, i16::MAX, i16::MIN]));

        let i32s = decode_packet(&data_packet_bytes(IF_DATA_I24_STREAM_ID, 0, &payload, trailer))
            .unwrap();
        assert_eq!(
            i32s.as_data().unwrap().payload,
            Payload::I32(vec![0x0001_FFFE, 0x7FFF_8000])
        );

        let psd = decode_packet(&data_packet_bytes(IF_DATA_PSD8_STREAM_ID, 0, &payload, trailer))
            .unwrap();
        assert_eq!(psd.as_data().unwrap().payload, Payload::Psd8(payload.clone()));

        let raw = decode_packet(&data_packet_bytes(0xDEAD_BEEF, 0, &payload, trailer)).unwrap();
        assert_eq!(raw.as_data().unwrap().payload, Payload::Raw(payload));
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let bytes = data_packet_bytes(IF_DATA_I14_STREAM_ID, 0, &[0u8; 8], Trailer::default());
        let err = decode_packet(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(err, SweepError::MalformedPacket { .. }));
    }
}
