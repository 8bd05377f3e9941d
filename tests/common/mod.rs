//! Shared fixtures for integration tests, built only from the public API.

#![allow(dead_code)]

use vrtsweep::device::CorrectionKind;
use vrtsweep::planner::SweepEntry;
use vrtsweep::types::{
    CUSTOM_STREAM_ID, DataPacket, IF_DATA_I14_STREAM_ID, RECEIVER_STREAM_ID, Trailer,
};
use vrtsweep::vrt::encode::{encode_context, encode_data, encode_fixed_point, i16_payload};
use vrtsweep::vrt::indicators::{CTX_RF_FREQ, CTX_SWEEP_ID};
use vrtsweep::{CaptureContext, DeviceControl, Result, SpectrumEngine, SweepPlan};

/// Device that accepts every command and remembers the sweep list.
#[derive(Debug, Default)]
pub struct ScriptedDevice {
    pub entries: Vec<SweepEntry>,
    pub started: Vec<u32>,
    pub aborts: u32,
    pub flushes: u32,
}

impl DeviceControl for ScriptedDevice {
    fn sweep_clear(&mut self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }

    fn sweep_add(&mut self, entry: &SweepEntry) -> Result<()> {
        self.entries.push(*entry);
        Ok(())
    }

    fn sweep_iterations(&mut self, _count: u32) -> Result<()> {
        Ok(())
    }

    fn sweep_start(&mut self, sweep_id: u32) -> Result<()> {
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

    fn correction_size(&mut self, _kind: CorrectionKind) -> Result<usize> {
        Ok(0)
    }

    fn correction_chunk(&mut self, _kind: CorrectionKind, _offset: usize, _len: usize) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// Engine whose bins hold their own center frequency in MHz.
#[derive(Debug, Default)]
pub struct FrequencyEngine;

impl SpectrumEngine for FrequencyEngine {
    fn power_spectrum(&mut self, _packet: &DataPacket, ctx: &CaptureContext) -> Result<Vec<f64>> {
        let bins = (ctx.full_bw / ctx.rbw).round() as usize;
        let bin_bw = ctx.full_bw / bins as f64;
        Ok((0..bins).map(|i| (ctx.start_freq() + (i as f64 + 0.5) * bin_bw) / 1e6).collect())
    }
}

/// What the instrument sends for `plan`: the sweep id, then an rf frequency
/// context before each non-DD data packet.
pub fn device_stream(plan: &SweepPlan, sweep_id: u32) -> Vec<u8> {
    let mut stream =
        encode_context(CUSTOM_STREAM_ID, 0, 0, 0, CTX_SWEEP_ID, &sweep_id.to_be_bytes()).unwrap();
    let samples = i16_payload(&[0i16; 64]);
    for i in 0..plan.step_count {
        let step = plan.step_for_packet(i).unwrap();
        if !step.dd {
            let freq = encode_fixed_point(step.center).to_be_bytes();
            stream.extend(encode_context(RECEIVER_STREAM_ID, 0, 0, 0, CTX_RF_FREQ, &freq).unwrap());
        }
        let count = (i % 16) as u8;
        stream.extend(encode_data(IF_DATA_I14_STREAM_ID, count, i, 0, &samples, Trailer::default()).unwrap());
    }
    stream
}

/// True when each bin holds a frequency within one RBW of its own center.
pub fn bins_in_place(result: &vrtsweep::SweepResult) -> bool {
    result.spectrum.iter().enumerate().all(|(i, &mhz)| {
        let center = result.bin_freq(i) + result.rbw / 2.0;
        (mhz * 1e6 - center).abs() <= result.rbw
    })
}
