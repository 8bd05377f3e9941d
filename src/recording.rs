//! Capture recordings
//!
//! A recording is the data channel's packet stream written verbatim, with
//! recording-state context packets spliced in at packet boundaries whenever
//! the capture settings change. Replaying a recording through the framer
//! therefore yields the original packets plus the settings in effect for
//! each stretch of them.

use std::collections::BTreeMap;
use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::device::RfeMode;
use crate::executor::CaptureRequest;
use crate::types::{ContextField, RECORDING_STATE_STREAM_ID};
use crate::vrt::encode::{encode_context, encode_recording_state};
use crate::vrt::indicators::CTX_RECORDING_STATE;
use crate::vrt::{PacketFramer, RawPacket};
use crate::{Result, SweepError};

/// Capture settings stored alongside recorded packets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<RfeMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fstart: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fstop: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rbw: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attenuation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimation: Option<u32>,
    /// Settings this crate does not interpret
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl RecordingState {
    pub fn from_request(request: &CaptureRequest) -> Self {
        Self {
            mode: Some(request.mode),
            fstart: Some(request.fstart),
            fstop: Some(request.fstop),
            rbw: Some(request.rbw),
            attenuation: Some(request.settings.attenuation),
            decimation: Some(request.settings.decimation),
            extra: BTreeMap::new(),
        }
    }

    /// Interpret a decoded recording-state context field.
    pub fn from_field(field: &ContextField) -> Option<Result<Self>> {
        match field {
            ContextField::RecordingState(value) => Some(
                serde_json::from_value(value.clone())
                    .map_err(|e| SweepError::malformed("recording state", e.to_string())),
            ),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| SweepError::config("recording state", e.to_string()))
    }
}

/// Writes packets to `W`, injecting queued state at the next packet boundary.
pub struct Recorder<W: Write> {
    writer: W,
    framer: PacketFramer,
    pending_state: Option<RecordingState>,
    count: u8,
    packets_written: u64,
    states_written: u64,
}

impl<W: Write> Recorder<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            framer: PacketFramer::new(),
            pending_state: None,
            count: 0,
            packets_written: 0,
            states_written: 0,
        }
    }

    /// Queue a settings snapshot; it is written before the next packet.
    pub fn queue_state(&mut self, state: RecordingState) {
        self.pending_state = Some(state);
    }

    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }

    pub fn states_written(&self) -> u64 {
        self.states_written
    }

    /// Record one framed packet.
    pub fn record(&mut self, raw: &RawPacket) -> Result<()> {
        self.write_pending_state()?;
        self.writer
            .write_all(&raw.to_bytes())
            .map_err(|e| SweepError::io("writing recording", e))?;
        self.packets_written += 1;
        trace!(packets = self.packets_written, "Recorded packet");
        Ok(())
    }

    /// Record raw data-channel bytes in whatever chunks they arrived.
    ///
    /// Bytes are framed first so queued state lands between packets, never
    /// inside one. Returns the number of packets completed by this chunk.
    pub fn record_bytes(&mut self, bytes: &[u8]) -> Result<usize> {
        let mut recorded = 0;
        let mut next = self.framer.feed(bytes)?;
        while let Some(raw) = next {
            self.record(&raw)?;
            recorded += 1;
            next = self.framer.next_frame()?;
        }
        Ok(recorded)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| SweepError::io("flushing recording", e))
    }

    pub fn into_inner(mut self) -> Result<W> {
        self.write_pending_state()?;
        self.flush()?;
        Ok(self.writer)
    }

    fn write_pending_state(&mut self) -> Result<()> {
        let Some(state) = self.pending_state.take() else {
            return Ok(());
        };
        let data = encode_recording_state(&state.to_json()?)?;
        let packet = encode_context(RECORDING_STATE_STREAM_ID, self.count, 0, 0, CTX_RECORDING_STATE, &data)?;
        self.count = (self.count + 1) & 0x0F;
        self.writer
            .write_all(&packet)
            .map_err(|e| SweepError::io("writing recording state", e))?;
        self.states_written += 1;
        debug!(states = self.states_written, "Recording state injected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_stream;
    use crate::types::{Packet, StreamId};
    use crate::vrt::PacketReader;
    use std::io::Cursor;

    fn state(attenuation: f64) -> RecordingState {
        RecordingState { mode: Some(RfeMode::Sh), attenuation: Some(attenuation), ..Default::default() }
    }

    fn replay(bytes: Vec<u8>) -> Vec<Packet> {
        PacketReader::new(Cursor::new(bytes)).collect::<Result<_>>().unwrap()
    }

    #[test]
    fn state_is_injected_between_packets() {
        let stream = sample_stream(6);
        let mut recorder = Recorder::new(Vec::new());
        recorder.queue_state(state(10.0));

        // odd chunk size so the state is queued mid-packet
        let (first, rest) = stream.split_at(37);
        recorder.record_bytes(first).unwrap();
        recorder.queue_state(state(20.0));
        recorder.record_bytes(rest).unwrap();

        assert_eq!(recorder.packets_written(), 6);
        assert_eq!(recorder.states_written(), 2);

        let packets = replay(recorder.into_inner().unwrap());
        assert_eq!(packets.len(), 8);
        assert_eq!(packets[0].stream_id(), StreamId::RecordingState);

        let states: Vec<RecordingState> = packets
            .iter()
            .filter_map(|p| p.as_context()?.field.as_ref())
            .filter_map(RecordingState::from_field)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(states, vec![state(10.0), state(20.0)]);
    }

    #[test]
    fn unknown_settings_survive_the_round_trip() {
        let mut original = RecordingState::from_request(&CaptureRequest::new(1e9, 2e9, 1e5, RfeMode::Zif));
        original.extra.insert("operator".to_string(), serde_json::json!("bench 3"));

        let mut recorder = Recorder::new(Vec::new());
        recorder.queue_state(original.clone());
        let packets = replay(recorder.into_inner().unwrap());
        assert_eq!(packets.len(), 1);

        let field = packets[0].as_context().and_then(|c| c.field.as_ref()).unwrap();
        assert_eq!(RecordingState::from_field(field).unwrap().unwrap(), original);
    }
}
