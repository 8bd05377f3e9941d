//! Tests for the connection layer
//!
//! A duplex pipe stands in for the data-channel socket; the test writes the
//! bytes a device would emit and observes results through the handle.

use super::*;
use crate::device::{DeviceProperties, RfeMode};
use crate::executor::SweepExecutor;
use crate::planner::SweepPlan;
use crate::providers::StreamSource;
use crate::test_utils::{FakeDevice, FakeEngine, init_tracing, sweep_stream};
use crate::types::Trailer;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn request() -> CaptureRequest {
    CaptureRequest::new(1e9, 1.1e9, 100e3, RfeMode::Sh)
}

fn plan(request: &CaptureRequest) -> SweepPlan {
    SweepExecutor::new(FakeDevice::default(), FakeEngine::flat(0.0), DeviceProperties::r5500())
        .plan(request)
        .unwrap()
}

fn connect() -> (SweepConnection, DuplexStream) {
    init_tracing();
    let (device_side, host_side) = tokio::io::duplex(4096);
    let executor =
        SweepExecutor::new(FakeDevice::default(), FakeEngine::flat(-50.0), DeviceProperties::r5500());
    let connection = SweepConnection::spawn(StreamSource::new(host_side), EventSweeper::new(executor));
    (connection, device_side)
}

async fn wait_idle(connection: &SweepConnection) {
    timeout(WAIT, async {
        while connection.is_busy() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("sweep never went idle");
}

#[tokio::test]
async fn capture_delivers_a_result() -> anyhow::Result<()> {
    let (connection, mut device) = connect();
    let request = request();
    let plan = plan(&request);
    let mut results = Box::pin(connection.results());

    connection.capture(request).await?;
    assert!(connection.is_busy());

    device.write_all(&sweep_stream(&plan, 0, Trailer::default())).await?;
    let result = timeout(WAIT, results.next()).await?.expect("result stream ended");
    assert_eq!(result.sweep_id, 0);
    assert_eq!(result.spectrum.len(), plan.spectral_points);
    assert!(result.spectrum.iter().all(|&v| v == -50.0));

    wait_idle(&connection).await;
    assert!(connection.last_error().is_none());
    assert_eq!(connection.latest_result().map(|r| r.sweep_id), Some(0));
    Ok(())
}

#[tokio::test]
async fn second_capture_is_rejected_while_busy() -> anyhow::Result<()> {
    let (connection, _device) = connect();
    connection.capture(request()).await?;

    match connection.capture(request()).await {
        Err(SweepError::SweepBusy { sweep_id }) => assert_eq!(sweep_id, 0),
        other => panic!("expected SweepBusy, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn invalid_request_releases_the_claim() -> anyhow::Result<()> {
    let (connection, _device) = connect();
    let inverted = CaptureRequest::new(2e9, 1e9, 100e3, RfeMode::Sh);

    let err = connection.capture(inverted).await.unwrap_err();
    assert!(matches!(err, SweepError::InvalidRequest { .. }), "{err:?}");
    assert!(!connection.is_busy());
    connection.capture(request()).await?;
    Ok(())
}

#[tokio::test]
async fn foreign_sweep_id_is_reported() -> anyhow::Result<()> {
    let (connection, mut device) = connect();
    let request = request();
    let plan = plan(&request);
    let mut errors = Box::pin(connection.errors());

    connection.capture(request).await?;
    device.write_all(&sweep_stream(&plan, 9, Trailer::default())).await?;

    let error = timeout(WAIT, errors.next()).await?.expect("error stream ended");
    assert!(matches!(*error, SweepError::ProtocolInconsistency { expected: 0, found: 9 }), "{error:?}");
    wait_idle(&connection).await;
    assert!(connection.latest_result().is_none());
    Ok(())
}

#[tokio::test]
async fn closed_channel_mid_sweep_ends_the_driver() -> anyhow::Result<()> {
    let (connection, mut device) = connect();
    let request = request();
    let plan = plan(&request);
    let mut errors = Box::pin(connection.errors());

    connection.capture(request).await?;
    let stream = sweep_stream(&plan, 0, Trailer::default());
    device.write_all(&stream[..stream.len() / 2]).await?;
    drop(device);

    let error = timeout(WAIT, errors.next()).await?.expect("error stream ended");
    assert!(error.is_disconnect(), "{error:?}");
    wait_idle(&connection).await;

    timeout(WAIT, async {
        while connection.is_running() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await?;
    assert!(matches!(connection.capture(request).await, Err(SweepError::Disconnected)));
    Ok(())
}

#[tokio::test]
async fn continuous_capture_until_stopped() -> anyhow::Result<()> {
    let (connection, mut device) = connect();
    let request = request().continuous();
    let plan = plan(&request);
    let mut results = Box::pin(connection.results());

    connection.capture(request).await?;
    for sweep_id in 0..2 {
        device.write_all(&sweep_stream(&plan, sweep_id, Trailer::default())).await?;
        let result = timeout(WAIT, results.next()).await?.expect("result stream ended");
        assert_eq!(result.sweep_id, sweep_id);
    }
    assert!(connection.is_busy());

    connection.stop().await?;
    device.write_all(&sweep_stream(&plan, 2, Trailer::default())).await?;
    let result = timeout(WAIT, results.next()).await?.expect("result stream ended");
    assert_eq!(result.sweep_id, 2);
    wait_idle(&connection).await;
    Ok(())
}

#[tokio::test]
async fn dropping_the_connection_stops_the_driver() -> anyhow::Result<()> {
    let (connection, mut device) = connect();
    drop(connection);

    // the driver owns the host side of the pipe; once it exits, writes fail
    let closed = timeout(WAIT, async {
        loop {
            if device.write_all(&[0u8; 64]).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(closed.is_ok());
    Ok(())
}
