//! Decoded VRT packet values

use std::fmt;

use super::{PacketHeader, StreamId, Trailer};

/// One decoded packet from the data channel
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Context(ContextPacket),
    Data(DataPacket),
}

impl Packet {
    pub fn header(&self) -> &PacketHeader {
        match self {
            Packet::Context(ctx) => &ctx.header,
            Packet::Data(data) => &data.header,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        match self {
            Packet::Context(ctx) => ctx.stream_id,
            Packet::Data(data) => data.stream_id,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Packet::Data(_))
    }

    pub fn as_context(&self) -> Option<&ContextPacket> {
        match self {
            Packet::Context(ctx) => Some(ctx),
            Packet::Data(_) => None,
        }
    }

    pub fn as_data(&self) -> Option<&DataPacket> {
        match self {
            Packet::Data(data) => Some(data),
            Packet::Context(_) => None,
        }
    }
}

/// Context (metadata) packet.
///
/// Timestamps and the indicator word are only present when the header's
/// timestamp flag is set; otherwise only the stream id was read and
/// `field` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextPacket {
    pub header: PacketHeader,
    pub stream_id: StreamId,
    pub tsi: Option<u32>,
    pub tsf: Option<u64>,
    pub indicators: Option<u32>,
    pub field: Option<ContextField>,
}

/// The single field carried by a context packet
#[derive(Debug, Clone, PartialEq)]
pub enum ContextField {
    /// Reference point identifier
    RefPoint(u32),
    /// RF (carrier) frequency in Hz
    RfFreq(f64),
    /// Front-end gain stages in dB
    Gain { stage1: f64, stage2: f64 },
    /// Temperature in degrees Celsius
    Temperature(f64),
    /// IF bandwidth in Hz
    Bandwidth(f64),
    /// RF offset in Hz
    RfOffset(f64),
    /// Reference level in dBm
    RefLevel(f64),
    /// Identifier the host assigned when starting the sweep
    SweepId(u32),
    StreamId(u32),
    /// Capture settings snapshot stored in recordings
    RecordingState(serde_json::Value),
    /// No parser matched; raw indicator word and remaining bytes are kept
    Unknown { indicators: u32, data: Vec<u8> },
}

impl ContextField {
    /// Stable field name, used as the key when accumulating context
    pub fn name(&self) -> &'static str {
        match self {
            ContextField::RefPoint(_) => "refpoint",
            ContextField::RfFreq(_) => "rffreq",
            ContextField::Gain { .. } => "gain",
            ContextField::Temperature(_) => "temperature",
            ContextField::Bandwidth(_) => "bandwidth",
            ContextField::RfOffset(_) => "rfoffset",
            ContextField::RefLevel(_) => "reflevel",
            ContextField::SweepId(_) => "sweepid",
            ContextField::StreamId(_) => "streamid",
            ContextField::RecordingState(_) => "recording_state",
            ContextField::Unknown { .. } => "unknown",
        }
    }

    /// Numeric view of scalar fields
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ContextField::RefPoint(v) | ContextField::SweepId(v) | ContextField::StreamId(v) => {
                Some(f64::from(*v))
            }
            ContextField::RfFreq(v)
            | ContextField::Temperature(v)
            | ContextField::Bandwidth(v)
            | ContextField::RfOffset(v)
            | ContextField::RefLevel(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ContextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextField::Gain { stage1, stage2 } => write!(f, "gain=({stage1}, {stage2})"),
            ContextField::RecordingState(value) => write!(f, "recording_state={value}"),
            ContextField::Unknown { indicators, data } => {
                write!(f, "unknown(indicators={indicators:#010x}, {} bytes)", data.len())
            }
            other => match other.as_f64() {
                Some(v) => write!(f, "{}={}", other.name(), v),
                None => write!(f, "{}", other.name()),
            },
        }
    }
}

/// Sample payload of a data packet, laid out according to its stream id
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Interleaved I/Q pairs
    IqI16(Vec<[i16; 2]>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    Psd8(Vec<u8>),
    /// Unknown stream: bytes kept verbatim
    Raw(Vec<u8>),
}

impl Payload {
    /// Number of samples (I/Q pairs count once)
    pub fn len(&self) -> usize {
        match self {
            Payload::IqI16(v) => v.len(),
            Payload::I16(v) => v.len(),
            Payload::I32(v) => v.len(),
            Payload::Psd8(v) => v.len(),
            Payload::Raw(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the samples are complex (I/Q) rather than real
    pub fn is_complex(&self) -> bool {
        matches!(self, Payload::IqI16(_))
    }
}

/// IF data packet
#[derive(Debug, Clone, PartialEq)]
pub struct DataPacket {
    pub header: PacketHeader,
    pub stream_id: StreamId,
    pub tsi: u32,
    pub tsf: u64,
    pub payload: Payload,
    pub trailer: Trailer,
}

impl DataPacket {
    /// Rolling sequence number from the header
    pub fn count(&self) -> u8 {
        self.header.count
    }

    /// Size in 32-bit words including header
    pub fn size(&self) -> u16 {
        self.header.size
    }

    pub fn spectral_inversion(&self) -> bool {
        self.trailer.spectral_inversion()
    }
}
