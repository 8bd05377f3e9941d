//! Blocking discipline: `capture_power_spectrum` returns the composite

use std::io::Read;

use tracing::debug;

use crate::device::DeviceControl;
use crate::executor::{CaptureRequest, SweepExecutor, SweepResult, SweepStart};
use crate::spectrum::SpectrumEngine;
use crate::vrt::PacketReader;
use crate::{Result, SweepError};

/// Runs sweeps on the calling thread, reading the data channel until the
/// sweep finalizes.
pub struct BlockingSweeper<R, D, E> {
    reader: PacketReader<R>,
    executor: SweepExecutor<D, E>,
}

impl<R: Read, D: DeviceControl, E: SpectrumEngine> BlockingSweeper<R, D, E> {
    pub fn new(data_channel: R, executor: SweepExecutor<D, E>) -> Self {
        Self { reader: PacketReader::new(data_channel), executor }
    }

    pub fn executor(&self) -> &SweepExecutor<D, E> {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut SweepExecutor<D, E> {
        &mut self.executor
    }

    /// Capture one composite spectrum. `request.continuous` is ignored.
    ///
    /// The data channel closing before the sweep completes abandons the
    /// session and yields [`SweepError::EndOfStream`].
    pub fn capture_power_spectrum(&mut self, request: &CaptureRequest) -> Result<SweepResult> {
        let sweep_id = match self.executor.start(request)? {
            SweepStart::Complete(result) => return Ok(result),
            SweepStart::Started { sweep_id } => sweep_id,
        };

        loop {
            let packet = match self.reader.next_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => {
                    debug!(sweep_id, "Data channel closed mid-sweep");
                    self.executor.abandon();
                    return Err(SweepError::EndOfStream { bytes_needed: 0, bytes_received: 0 });
                }
                Err(e) => return Err(self.executor.stream_error(e)),
            };
            if let Some(result) = self.executor.handle_packet(&packet)? {
                return Ok(result);
            }
        }
    }

    pub fn into_parts(self) -> (R, SweepExecutor<D, E>) {
        (self.reader.into_inner(), self.executor)
    }
}
