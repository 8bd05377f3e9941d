//! Test utilities: packet builders, a scripted device and a deterministic
//! spectrum engine.
//!
//! Compiled for unit tests and for the `benchmark` feature so benches and
//! integration tests can build realistic packet streams.

#![cfg(any(test, feature = "benchmark"))]

use std::collections::HashMap;

use crate::Result;
use crate::SweepError;
use crate::device::{CorrectionKind, DeviceControl};
use crate::planner::{SweepEntry, SweepPlan};
use crate::spectrum::{CaptureContext, SpectrumEngine};
use crate::types::{
    CUSTOM_STREAM_ID, DataPacket, IF_DATA_I14_STREAM_ID, IF_DATA_I14Q14_STREAM_ID, Packet,
    RECEIVER_STREAM_ID, Trailer,
};
use crate::vrt::decode_packet;
use crate::vrt::encode::{encode_context, encode_data, encode_fixed_point};
use crate::vrt::indicators::{CTX_RF_FREQ, CTX_SWEEP_ID};

/// Install a fmt subscriber honouring `RUST_LOG`; repeated calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Timestamped context packet with zero timestamps.
pub fn context_packet_bytes(stream_id: u32, count: u8, indicators: u32, data: &[u8]) -> Vec<u8> {
    encode_context(stream_id, count, 0, 0, indicators, data).expect("test context fits a packet")
}

/// Data packet with zero timestamps. `payload` must be word aligned.
pub fn data_packet_bytes(stream_id: u32, count: u8, payload: &[u8], trailer: Trailer) -> Vec<u8> {
    encode_data(stream_id, count, 0, 0, payload, trailer).expect("test payload is word aligned")
}

pub fn sweep_id_packet_bytes(sweep_id: u32) -> Vec<u8> {
    context_packet_bytes(CUSTOM_STREAM_ID, 0, CTX_SWEEP_ID, &sweep_id.to_be_bytes())
}

pub fn rf_freq_packet_bytes(hz: f64) -> Vec<u8> {
    context_packet_bytes(RECEIVER_STREAM_ID, 0, CTX_RF_FREQ, &encode_fixed_point(hz).to_be_bytes())
}

/// Receiver context announcing an rf frequency but carrying only one word.
pub fn truncated_rf_freq_packet_bytes() -> Vec<u8> {
    context_packet_bytes(RECEIVER_STREAM_ID, 0, CTX_RF_FREQ, &[0u8; 4])
}

/// Mixed context and data packets of varying sizes, back to back.
pub fn sample_stream(n_packets: usize) -> Vec<u8> {
    let mut stream = Vec::new();
    for i in 0..n_packets {
        let count = (i % 16) as u8;
        let packet = match i % 3 {
            0 => rf_freq_packet_bytes(1e9 + i as f64 * 1e6),
            1 => data_packet_bytes(
                IF_DATA_I14Q14_STREAM_ID,
                count,
                &vec![(i % 251) as u8; (i % 5 + 1) * 16],
                Trailer::default(),
            ),
            _ => data_packet_bytes(IF_DATA_I14_STREAM_ID, count, &[], Trailer::new(i as u32)),
        };
        stream.extend_from_slice(&packet);
    }
    stream
}

/// Encode a correction table. `vector_size` is taken from the first vector.
pub fn correction_blob(freqs: &[(u32, u16)], vectors: &[(u16, Vec<i32>)]) -> Vec<u8> {
    let vector_size = vectors.first().map_or(0, |(_, v)| v.len());
    let mut blob = Vec::new();
    blob.extend_from_slice(&1u16.to_be_bytes());
    blob.extend_from_slice(&(freqs.len() as u16).to_be_bytes());
    blob.extend_from_slice(&(vectors.len() as u16).to_be_bytes());
    blob.extend_from_slice(&(vector_size as u16).to_be_bytes());
    blob.extend_from_slice(&[0u8; 40]);
    for (freq, index) in freqs {
        blob.extend_from_slice(&freq.to_be_bytes());
        blob.extend_from_slice(&index.to_be_bytes());
    }
    for (index, values) in vectors {
        blob.extend_from_slice(&index.to_be_bytes());
        for v in values {
            blob.extend_from_slice(&v.to_be_bytes());
        }
    }
    blob
}

/// Wire bytes a well-behaved device emits for `plan`: sweep id, then an
/// rf frequency context and a data packet per planned step.
pub fn sweep_stream(plan: &SweepPlan, sweep_id: u32, trailer: Trailer) -> Vec<u8> {
    let mut stream = sweep_id_packet_bytes(sweep_id);
    for i in 0..plan.step_count {
        let Some(step) = plan.step_for_packet(i) else { break };
        if !step.dd {
            stream.extend_from_slice(&rf_freq_packet_bytes(step.center));
        }
        let payload = [0u8; 32];
        stream.extend_from_slice(&data_packet_bytes(IF_DATA_I14_STREAM_ID, i as u8, &payload, trailer));
    }
    stream
}

/// Decoded form of [`sweep_stream`].
pub fn sweep_packets(plan: &SweepPlan, sweep_id: u32) -> Vec<Packet> {
    let bytes = sweep_stream(plan, sweep_id, Trailer::default());
    crate::vrt::PacketFramer::new()
        .feed_all(&bytes)
        .expect("generated stream frames cleanly")
        .iter()
        .map(|raw| decode_packet(&raw.to_bytes()).expect("generated packet decodes"))
        .collect()
}

/// Device double that records every command.
#[derive(Debug, Default)]
pub struct FakeDevice {
    pub entries: Vec<SweepEntry>,
    pub clears: u32,
    pub iterations: Option<u32>,
    pub started: Vec<u32>,
    pub aborts: u32,
    pub flushes: u32,
    /// Fail the next `sweep_start`
    pub fail_start: bool,
    pub corrections: HashMap<CorrectionKind, Vec<u8>>,
    pub correction_requests: u32,
}

impl FakeDevice {
    pub fn with_correction(mut self, kind: CorrectionKind, blob: Vec<u8>) -> Self {
        self.corrections.insert(kind, blob);
        self
    }
}

impl DeviceControl for FakeDevice {
    fn sweep_clear(&mut self) -> Result<()> {
        self.clears += 1;
        self.entries.clear();
        Ok(())
    }

    fn sweep_add(&mut self, entry: &SweepEntry) -> Result<()> {
        self.entries.push(*entry);
        Ok(())
    }

    fn sweep_iterations(&mut self, count: u32) -> Result<()> {
        self.iterations = Some(count);
        Ok(())
    }

    fn sweep_start(&mut self, sweep_id: u32) -> Result<()> {
        if std::mem::take(&mut self.fail_start) {
            return Err(SweepError::device_failed("sweep start"));
        }
        self.started.push(sweep_id);
        Ok(())
    }

    fn abort(&mut self) -> Result<()> {
        self.aborts += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }

    fn correction_size(&mut self, kind: CorrectionKind) -> Result<usize> {
        Ok(self.corrections.get(&kind).map_or(0, Vec::len))
    }

    fn correction_chunk(&mut self, kind: CorrectionKind, offset: usize, len: usize) -> Result<Vec<u8>> {
        self.correction_requests += 1;
        let blob = self
            .corrections
            .get(&kind)
            .ok_or_else(|| SweepError::device_failed(format!("no {kind} table")))?;
        Ok(blob.get(offset..offset + len).map(<[u8]>::to_vec).unwrap_or_default())
    }
}

/// Spectrum engine double.
///
/// Produces `full_bw / rbw` bins. Each bin holds either a fixed level or,
/// by default, its own center frequency in MHz, so stitched output can be
/// checked for placement.
#[derive(Debug, Default)]
pub struct FakeEngine {
    pub level: Option<f64>,
    pub fail: bool,
    pub contexts: Vec<CaptureContext>,
}

impl FakeEngine {
    pub fn flat(level: f64) -> Self {
        Self { level: Some(level), ..Self::default() }
    }
}

impl SpectrumEngine for FakeEngine {
    fn power_spectrum(&mut self, _packet: &DataPacket, ctx: &CaptureContext) -> Result<Vec<f64>> {
        if self.fail {
            return Err(SweepError::device_failed("spectrum computation"));
        }
        self.contexts.push(*ctx);
        let bins = (ctx.full_bw / ctx.rbw).round() as usize;
        let bin_bw = ctx.full_bw / bins as f64;
        Ok((0..bins)
            .map(|i| match self.level {
                Some(level) => level,
                None => (ctx.start_freq() + (i as f64 + 0.5) * bin_bw) / 1e6,
            })
            .collect())
    }
}
