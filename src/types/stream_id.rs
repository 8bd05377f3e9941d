//! Known VRT stream identifiers

use serde::{Deserialize, Serialize};

pub const RECEIVER_STREAM_ID: u32 = 0x9000_0001;
pub const DIGITIZER_STREAM_ID: u32 = 0x9000_0002;
pub const IF_DATA_I14Q14_STREAM_ID: u32 = 0x9000_0003;
pub const CUSTOM_STREAM_ID: u32 = 0x9000_0004;
pub const IF_DATA_I14_STREAM_ID: u32 = 0x9000_0005;
pub const IF_DATA_I24_STREAM_ID: u32 = 0x9000_0006;
pub const IF_DATA_PSD8_STREAM_ID: u32 = 0x9000_0007;
pub const RECORDING_STATE_STREAM_ID: u32 = 0x9000_0008;

/// Closed set of stream identifiers the instrument emits.
///
/// Context streams select a field parser; data streams select the payload
/// sample layout. Anything else is kept as [`StreamId::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamId {
    /// Receiver context: reference point, RF frequency, gain, temperature
    Receiver,
    /// Digitizer context: bandwidth, RF offset, reference level
    Digitizer,
    /// Vendor context: sweep id, stream id
    Custom,
    /// Recording-state context injected into recordings
    RecordingState,
    /// Interleaved 16-bit I/Q samples
    IfDataI14Q14,
    /// Single-channel 16-bit samples
    IfDataI14,
    /// Single-channel 32-bit samples
    IfDataI24,
    /// Single-channel 8-bit power spectral density
    IfDataPsd8,
    Unknown(u32),
}

impl StreamId {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            RECEIVER_STREAM_ID => StreamId::Receiver,
            DIGITIZER_STREAM_ID => StreamId::Digitizer,
            CUSTOM_STREAM_ID => StreamId::Custom,
            RECORDING_STATE_STREAM_ID => StreamId::RecordingState,
            IF_DATA_I14Q14_STREAM_ID => StreamId::IfDataI14Q14,
            IF_DATA_I14_STREAM_ID => StreamId::IfDataI14,
            IF_DATA_I24_STREAM_ID => StreamId::IfDataI24,
            IF_DATA_PSD8_STREAM_ID => StreamId::IfDataPsd8,
            other => StreamId::Unknown(other),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            StreamId::Receiver => RECEIVER_STREAM_ID,
            StreamId::Digitizer => DIGITIZER_STREAM_ID,
            StreamId::Custom => CUSTOM_STREAM_ID,
            StreamId::RecordingState => RECORDING_STATE_STREAM_ID,
            StreamId::IfDataI14Q14 => IF_DATA_I14Q14_STREAM_ID,
            StreamId::IfDataI14 => IF_DATA_I14_STREAM_ID,
            StreamId::IfDataI24 => IF_DATA_I24_STREAM_ID,
            StreamId::IfDataPsd8 => IF_DATA_PSD8_STREAM_ID,
            StreamId::Unknown(raw) => raw,
        }
    }
}

impl From<u32> for StreamId {
    fn from(raw: u32) -> Self {
        StreamId::from_raw(raw)
    }
}
