//! Driver runs the event-driven sweeper on a tokio task

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::device::DeviceControl;
use crate::executor::{CaptureRequest, SweepResult};
use crate::provider::PacketSource;
use crate::spectrum::SpectrumEngine;
use crate::sweeper::EventSweeper;
use crate::{Result, SweepError};

/// Requests from a connection handle to the driver task
#[derive(Debug)]
pub enum DriverCommand {
    Capture { request: CaptureRequest, reply: oneshot::Sender<Result<()>> },
    Stop,
}

/// Busy state shared between the driver task and its handles.
///
/// `claimed` covers a capture command between the handle and the driver's
/// reply; only the reply path clears it. `active` mirrors the executor's
/// open session and is updated by the driver alone.
#[derive(Debug, Default)]
pub struct SweepStatus {
    claimed: AtomicBool,
    active: AtomicBool,
    sweep_id: AtomicU32,
}

impl SweepStatus {
    pub fn is_busy(&self) -> bool {
        self.claimed.load(Ordering::Acquire) || self.active.load(Ordering::Acquire)
    }

    /// Id of the sweep most recently started
    pub fn sweep_id(&self) -> u32 {
        self.sweep_id.load(Ordering::Acquire)
    }

    /// Reserve the driver for one capture command.
    pub fn try_claim(&self) -> Result<()> {
        let busy = || SweepError::SweepBusy { sweep_id: self.sweep_id() };
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| busy())?;
        // the driver marks a sweep active before it releases the claim that started it
        if self.active.load(Ordering::Acquire) {
            self.release();
            return Err(busy());
        }
        Ok(())
    }

    /// Drop a claim once its capture has been answered or never reached the driver.
    pub(crate) fn release(&self) {
        self.claimed.store(false, Ordering::Release);
    }

    fn sync_with<D: DeviceControl, E: SpectrumEngine>(&self, sweeper: &EventSweeper<D, E>) {
        if let Some(id) = sweeper.executor().current_sweep_id() {
            self.sweep_id.store(id, Ordering::Release);
        }
        self.active.store(sweeper.is_busy(), Ordering::Release);
    }
}

/// Result of spawning the driver task
pub struct DriverChannels {
    /// Latest composite spectrum
    pub results: watch::Receiver<Option<Arc<SweepResult>>>,
    /// Latest error reported by the sweep or the source
    pub errors: watch::Receiver<Option<Arc<SweepError>>>,
    pub commands: mpsc::Sender<DriverCommand>,
    pub status: Arc<SweepStatus>,
    /// Cancellation token for shutdown
    pub cancel: CancellationToken,
}

/// Spawns the task that owns a [`PacketSource`] and an [`EventSweeper`].
///
/// Device calls run on the task itself, so `DeviceControl` implementations
/// used here should not block for long.
pub struct Driver;

impl Driver {
    pub fn spawn<S, D, E>(source: S, mut sweeper: EventSweeper<D, E>) -> DriverChannels
    where
        S: PacketSource,
        D: DeviceControl + Send + 'static,
        E: SpectrumEngine + Send + 'static,
    {
        let (result_tx, result_rx) = watch::channel(None);
        let (error_tx, error_rx) = watch::channel(None);
        let (command_tx, command_rx) = mpsc::channel(8);
        let status = Arc::new(SweepStatus::default());
        let cancel = CancellationToken::new();

        let result_tx = Arc::new(result_tx);
        let callback_tx = Arc::clone(&result_tx);
        sweeper.set_callback(Box::new(move |result| {
            debug!(sweep_id = result.sweep_id, bins = result.spectrum.len(), "Sweep result published");
            let _ = callback_tx.send(Some(Arc::new(result)));
        }));

        let task = DriverTask {
            sweeper,
            result_tx,
            error_tx,
            commands: command_rx,
            status: Arc::clone(&status),
            cancel: cancel.clone(),
        };
        tokio::spawn(task.run(source));

        DriverChannels { results: result_rx, errors: error_rx, commands: command_tx, status, cancel }
    }
}

struct DriverTask<D, E> {
    sweeper: EventSweeper<D, E>,
    result_tx: Arc<watch::Sender<Option<Arc<SweepResult>>>>,
    error_tx: watch::Sender<Option<Arc<SweepError>>>,
    commands: mpsc::Receiver<DriverCommand>,
    status: Arc<SweepStatus>,
    cancel: CancellationToken,
}

impl<D, E> DriverTask<D, E>
where
    D: DeviceControl + Send + 'static,
    E: SpectrumEngine + Send + 'static,
{
    async fn run<S: PacketSource>(mut self, mut source: S) {
        info!(source = source.name(), "Sweep driver started");
        let mut packet_count = 0u64;
        let mut error_count = 0u32;
        const MAX_ERRORS: u32 = 10;

        loop {
            // commands first so a stop lands before the packets queued behind it
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("Sweep driver cancelled");
                    break;
                }
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            debug!("All connection handles dropped, shutting down");
                            break;
                        }
                    }
                    continue;
                }
                next = source.next_packet() => next,
            };

            match next {
                Ok(Some(packet)) => {
                    packet_count += 1;
                    error_count = 0;
                    trace!(packets = packet_count, stream = ?packet.stream_id(), "Packet received");
                    if let Err(e) = self.sweeper.on_packet(&packet) {
                        warn!("Sweep failed: {}", e);
                        self.publish_error(e);
                    }
                    self.status.sync_with(&self.sweeper);
                }
                Ok(None) => {
                    info!("Data channel ended after {} packets", packet_count);
                    if let Some(sweep_id) = self.sweeper.on_disconnect() {
                        warn!(sweep_id, "Data channel closed mid-sweep");
                        self.publish_error(SweepError::EndOfStream { bytes_needed: 0, bytes_received: 0 });
                    }
                    self.status.sync_with(&self.sweeper);
                    break;
                }
                Err(e) if e.is_disconnect() => {
                    warn!("Data channel closed mid-packet: {}", e);
                    self.sweeper.on_disconnect();
                    self.status.sync_with(&self.sweeper);
                    self.publish_error(e);
                    break;
                }
                Err(e) => {
                    let e = self.sweeper.on_stream_error(e);
                    self.status.sync_with(&self.sweeper);
                    if matches!(e, SweepError::MalformedPacket { .. }) {
                        // the source decides whether framing can continue
                        warn!("Dropped undecodable packet: {}", e);
                        self.publish_error(e);
                        continue;
                    }

                    error_count += 1;
                    error!("Source error ({}/{}): {}", error_count, MAX_ERRORS, e);
                    let retryable = e.is_retryable();
                    self.publish_error(e);

                    if !retryable || error_count >= MAX_ERRORS {
                        error!("Data channel unusable, shutting down");
                        self.sweeper.on_disconnect();
                        self.status.sync_with(&self.sweeper);
                        break;
                    }

                    // 100ms, 200ms, 400ms, ... capped at 3.2s
                    let backoff = std::time::Duration::from_millis(50 * (1 << error_count.min(6)));
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        let _ = self.result_tx.send(None);
        info!("Sweep driver ended (processed {} packets)", packet_count);
    }

    fn handle_command(&mut self, command: DriverCommand) {
        match command {
            DriverCommand::Capture { request, reply } => {
                let outcome = self.sweeper.capture(&request);
                self.status.sync_with(&self.sweeper);
                self.status.release();
                match &outcome {
                    Ok(()) => info!(
                        sweep_id = self.status.sweep_id(),
                        fstart = request.fstart,
                        fstop = request.fstop,
                        "Capture started"
                    ),
                    Err(e) => debug!("Capture rejected: {}", e),
                }
                if reply.send(outcome).is_err() {
                    debug!("Capture requester went away");
                }
            }
            DriverCommand::Stop => self.sweeper.stop(),
        }
    }

    fn publish_error(&self, error: SweepError) {
        let _ = self.error_tx.send(Some(Arc::new(error)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceProperties, RfeMode};
    use crate::executor::SweepExecutor;
    use crate::test_utils::{FakeDevice, FakeEngine};

    fn sweeper() -> EventSweeper<FakeDevice, FakeEngine> {
        EventSweeper::new(SweepExecutor::new(
            FakeDevice::default(),
            FakeEngine::default(),
            DeviceProperties::r5500(),
        ))
    }

    #[test]
    fn queued_claim_survives_an_idle_sweeper() {
        let status = SweepStatus::default();
        let mut sweeper = sweeper();
        status.try_claim().unwrap();

        // packets handled while the capture command is still queued
        status.sync_with(&sweeper);
        assert!(status.is_busy());
        assert!(matches!(status.try_claim(), Err(SweepError::SweepBusy { .. })));

        sweeper.capture(&CaptureRequest::new(1e9, 1.1e9, 100e3, RfeMode::Sh)).unwrap();
        status.sync_with(&sweeper);
        status.release();
        assert!(status.is_busy());
        assert!(status.try_claim().is_err());
        assert_eq!(status.sweep_id(), 0);

        sweeper.on_disconnect();
        status.sync_with(&sweeper);
        assert!(!status.is_busy());
        assert!(status.try_claim().is_ok());
    }
}
