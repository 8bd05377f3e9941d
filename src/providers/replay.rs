//! Replay source for recordings made with [`crate::recording::Recorder`]

use std::path::Path;

use futures::StreamExt;
use tokio::fs::File;
use tokio::time::{Duration, Interval, MissedTickBehavior, interval};
use tracing::{debug, info, trace, warn};

use crate::provider::PacketSource;
use crate::recording::RecordingState;
use crate::stream::PacketStream;
use crate::types::Packet;
use crate::{Result, SweepError};

/// Reads a recording back as a packet source.
///
/// Unpaced by default. With [`ReplaySource::with_rate`] packets are released
/// at the given rate, scaled by the playback speed. Recording-state packets
/// are passed through and the most recent one is kept.
pub struct ReplaySource {
    packets: PacketStream<File>,
    rate: Option<f64>,
    speed: f64,
    interval: Option<Interval>,
    state: Option<RecordingState>,
    packets_read: u64,
}

impl ReplaySource {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .map_err(|e| SweepError::io(format!("opening recording {}", path.display()), e))?;
        info!(path = %path.display(), "Opened recording");
        Ok(Self::from_file(file))
    }

    pub fn from_file(file: File) -> Self {
        Self { packets: PacketStream::new(file), rate: None, speed: 1.0, interval: None, state: None, packets_read: 0 }
    }

    /// Pace playback at `packets_per_second`.
    pub fn with_rate(mut self, packets_per_second: f64) -> Result<Self> {
        if !(packets_per_second.is_finite() && packets_per_second > 0.0) {
            return Err(SweepError::invalid_request(format!(
                "replay rate must be positive, got {packets_per_second}"
            )));
        }
        self.rate = Some(packets_per_second);
        self.reset_interval();
        Ok(self)
    }

    /// Set playback speed (1.0 = recorded rate). Only affects paced playback.
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed.clamp(0.1, 10.0);
        self.reset_interval();
        debug!("Playback speed set to {}x", self.speed);
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Settings from the most recent recording-state packet read so far
    pub fn state(&self) -> Option<&RecordingState> {
        self.state.as_ref()
    }

    pub fn packets_read(&self) -> u64 {
        self.packets_read
    }

    fn reset_interval(&mut self) {
        self.interval = self.rate.map(|rate| {
            let mut interval = interval(Duration::from_secs_f64(1.0 / (rate * self.speed)));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
    }

    fn track_state(&mut self, packet: &Packet) {
        let Some(field) = packet.as_context().and_then(|c| c.field.as_ref()) else {
            return;
        };
        match RecordingState::from_field(field) {
            Some(Ok(state)) => {
                debug!(mode = ?state.mode, "Recording state changed");
                self.state = Some(state);
            }
            Some(Err(e)) => warn!("Ignoring unreadable recording state: {}", e),
            None => {}
        }
    }
}

#[async_trait::async_trait]
impl PacketSource for ReplaySource {
    async fn next_packet(&mut self) -> Result<Option<Packet>> {
        if let Some(interval) = self.interval.as_mut() {
            interval.tick().await;
        }

        let Some(packet) = self.packets.next().await.transpose()? else {
            debug!(packets = self.packets_read, "Reached end of recording");
            return Ok(None);
        };
        self.packets_read += 1;
        trace!(packets = self.packets_read, stream = ?packet.stream_id(), "Replayed packet");
        self.track_state(&packet);
        Ok(Some(packet))
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}
