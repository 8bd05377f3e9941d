//! End-to-end sweeps through the blocking discipline.
//!
//! The data channel is a byte buffer holding exactly what the instrument
//! would send for the planned sweep list.

mod common;

use std::io::Cursor;

use common::{FrequencyEngine, ScriptedDevice, bins_in_place, device_stream};
use vrtsweep::{BlockingSweeper, CaptureRequest, DeviceProperties, RfeMode, SweepError, SweepExecutor};

fn executor() -> SweepExecutor<ScriptedDevice, FrequencyEngine> {
    SweepExecutor::new(ScriptedDevice::default(), FrequencyEngine, DeviceProperties::r5500())
}

fn sweep(request: CaptureRequest) -> anyhow::Result<vrtsweep::SweepResult> {
    let plan = executor().plan(&request)?;
    let mut sweeper = BlockingSweeper::new(Cursor::new(device_stream(&plan, 0)), executor());
    let result = sweeper.capture_power_spectrum(&request)?;

    let (_, executor) = sweeper.into_parts();
    assert_eq!(executor.device().started, vec![0]);
    assert_eq!(executor.device().entries.len(), plan.entries().count());
    assert!(!executor.is_busy());
    Ok(result)
}

#[test]
fn sh_sweep_covers_the_requested_band() -> anyhow::Result<()> {
    let result = sweep(CaptureRequest::new(2.4e9, 2.5e9, 100e3, RfeMode::Sh))?;
    assert_eq!(result.fstart, 2.4e9);
    assert_eq!(result.fstop, 2.5e9);
    assert!(!result.spectrum.is_empty());
    assert!(bins_in_place(&result));
    Ok(())
}

#[test]
fn zif_sweep_covers_the_requested_band() -> anyhow::Result<()> {
    let result = sweep(CaptureRequest::new(3e9, 3.6e9, 500e3, RfeMode::Zif))?;
    assert!(bins_in_place(&result));
    Ok(())
}

#[test]
fn low_start_uses_direct_digitization() -> anyhow::Result<()> {
    let result = sweep(CaptureRequest::new(20e6, 300e6, 100e3, RfeMode::Shn))?;
    assert!(result.spectrum.iter().all(|&v| v > 0.0), "every bin was written");
    assert!(bins_in_place(&result));
    Ok(())
}

#[test]
fn foreign_sweep_id_aborts_the_sweep() -> anyhow::Result<()> {
    let request = CaptureRequest::new(2.4e9, 2.5e9, 100e3, RfeMode::Sh);
    let plan = executor().plan(&request)?;
    let mut sweeper = BlockingSweeper::new(Cursor::new(device_stream(&plan, 41)), executor());

    match sweeper.capture_power_spectrum(&request) {
        Err(SweepError::ProtocolInconsistency { expected: 0, found: 41 }) => {}
        other => panic!("expected ProtocolInconsistency, got {other:?}"),
    }
    assert!(!sweeper.executor().is_busy());
    assert_eq!(sweeper.executor().device().aborts, 1);
    assert_eq!(sweeper.executor().device().flushes, 1);
    Ok(())
}

#[test]
fn consecutive_sweeps_use_fresh_ids() -> anyhow::Result<()> {
    let request = CaptureRequest::new(1e9, 1.05e9, 250e3, RfeMode::Sh);
    let plan = executor().plan(&request)?;
    let mut stream = device_stream(&plan, 0);
    stream.extend(device_stream(&plan, 1));

    let mut sweeper = BlockingSweeper::new(Cursor::new(stream), executor());
    let first = sweeper.capture_power_spectrum(&request)?;
    let second = sweeper.capture_power_spectrum(&request)?;
    assert_eq!((first.sweep_id, second.sweep_id), (0, 1));
    assert_eq!(first.spectrum, second.spectrum);
    Ok(())
}
