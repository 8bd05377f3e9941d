//! Async handle over a running sweep driver
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use vrtsweep::connection::SweepConnection;
//! use vrtsweep::providers::StreamSource;
//! use vrtsweep::{CaptureRequest, EventSweeper, RfeMode, SweepExecutor};
//! # use vrtsweep::{DeviceControl, DeviceProperties, SpectrumEngine};
//! # async fn run(device: impl DeviceControl + Send + 'static, engine: impl SpectrumEngine + Send + 'static) -> vrtsweep::Result<()> {
//! let socket = tokio::net::TcpStream::connect("192.168.1.40:37000").await?;
//! let executor = SweepExecutor::new(device, engine, DeviceProperties::r5500());
//! let connection = SweepConnection::spawn(StreamSource::new(socket), EventSweeper::new(executor));
//!
//! let mut results = Box::pin(connection.results());
//! connection.capture(CaptureRequest::new(2.3e9, 2.5e9, 100e3, RfeMode::Sh)).await?;
//! if let Some(result) = results.next().await {
//!     println!("{} bins from {} Hz", result.spectrum.len(), result.fstart);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::device::DeviceControl;
use crate::driver::{Driver, DriverCommand, SweepStatus};
use crate::executor::{CaptureRequest, SweepResult};
use crate::provider::PacketSource;
use crate::spectrum::SpectrumEngine;
use crate::sweeper::EventSweeper;
use crate::{Result, SweepError};

#[cfg(test)]
mod tests;

/// Handle to a sweeper running on its own task
pub struct SweepConnection {
    results: watch::Receiver<Option<Arc<SweepResult>>>,
    errors: watch::Receiver<Option<Arc<SweepError>>>,
    commands: mpsc::Sender<DriverCommand>,
    status: Arc<SweepStatus>,
    cancel: CancellationToken,
}

impl SweepConnection {
    /// Start the driver task. Must be called from within a tokio runtime.
    pub fn spawn<S, D, E>(source: S, sweeper: EventSweeper<D, E>) -> Self
    where
        S: PacketSource,
        D: DeviceControl + Send + 'static,
        E: SpectrumEngine + Send + 'static,
    {
        let channels = Driver::spawn(source, sweeper);
        info!("Sweep connection opened");
        Self {
            results: channels.results,
            errors: channels.errors,
            commands: channels.commands,
            status: channels.status,
            cancel: channels.cancel,
        }
    }

    /// Start a sweep.
    ///
    /// A sweep already in flight is rejected with [`SweepError::SweepBusy`]
    /// before anything is sent to the driver. Otherwise resolves once the
    /// device has been configured; the composite arrives on [`Self::results`].
    pub async fn capture(&self, request: CaptureRequest) -> Result<()> {
        self.status.try_claim()?;
        let mut claim = PendingClaim { status: &self.status, sent: false };

        let (reply, outcome) = oneshot::channel();
        self.commands
            .send(DriverCommand::Capture { request, reply })
            .await
            .map_err(|_| SweepError::Disconnected)?;
        claim.sent = true;
        outcome.await.map_err(|_| SweepError::Disconnected)?
    }

    /// Stop re-arming a continuous capture.
    pub async fn stop(&self) -> Result<()> {
        self.commands.send(DriverCommand::Stop).await.map_err(|_| SweepError::Disconnected)
    }

    pub fn is_busy(&self) -> bool {
        self.status.is_busy()
    }

    /// False once the driver task has exited.
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.commands.is_closed()
    }

    /// Composite spectra as they finalize.
    ///
    /// Latest-wins: a slow consumer sees the newest result, not a backlog.
    /// A new stream first yields the current result, if any.
    pub fn results(&self) -> impl Stream<Item = Arc<SweepResult>> + 'static {
        WatchStream::new(self.results.clone()).filter_map(|opt| async move { opt })
    }

    pub fn latest_result(&self) -> Option<Arc<SweepResult>> {
        self.results.borrow().clone()
    }

    /// Errors reported by the sweep or the data channel, latest-wins.
    pub fn errors(&self) -> impl Stream<Item = Arc<SweepError>> + 'static {
        WatchStream::new(self.errors.clone()).filter_map(|opt| async move { opt })
    }

    pub fn last_error(&self) -> Option<Arc<SweepError>> {
        self.errors.borrow().clone()
    }

    /// Stop the driver task.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// Releases a claim whose capture command never reached the driver.
struct PendingClaim<'a> {
    status: &'a SweepStatus,
    sent: bool,
}

impl Drop for PendingClaim<'_> {
    fn drop(&mut self) {
        if !self.sent {
            self.status.release();
        }
    }
}

impl Drop for SweepConnection {
    fn drop(&mut self) {
        debug!("Dropping sweep connection");
        self.cancel.cancel();
    }
}
