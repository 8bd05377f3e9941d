//! Event-driven discipline: results are delivered through a callback

use tracing::{debug, info};

use crate::{Result, SweepError};
use crate::device::DeviceControl;
use crate::executor::{CaptureRequest, SweepExecutor, SweepResult, SweepStart};
use crate::spectrum::SpectrumEngine;
use crate::types::Packet;
use crate::vrt::{PacketFramer, decode};

/// Receives each finished composite spectrum
pub type ResultCallback = Box<dyn FnMut(SweepResult) + Send>;

/// Sweeper fed by an event loop, one packet or byte chunk at a time.
///
/// `capture` returns as soon as the device is configured; the composite is
/// handed to the callback when the final packet arrives. A continuous
/// request is restarted after every result until [`EventSweeper::stop`].
pub struct EventSweeper<D, E> {
    executor: SweepExecutor<D, E>,
    framer: PacketFramer,
    callback: Option<ResultCallback>,
    repeat: Option<CaptureRequest>,
    results_delivered: u64,
}

impl<D: DeviceControl, E: SpectrumEngine> EventSweeper<D, E> {
    pub fn new(executor: SweepExecutor<D, E>) -> Self {
        Self { executor, framer: PacketFramer::new(), callback: None, repeat: None, results_delivered: 0 }
    }

    pub fn on_result<F>(mut self, callback: F) -> Self
    where
        F: FnMut(SweepResult) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn set_callback(&mut self, callback: ResultCallback) {
        self.callback = Some(callback);
    }

    pub fn executor(&self) -> &SweepExecutor<D, E> {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut SweepExecutor<D, E> {
        &mut self.executor
    }

    pub fn is_busy(&self) -> bool {
        self.executor.is_busy()
    }

    pub fn is_continuous(&self) -> bool {
        self.repeat.is_some()
    }

    pub fn results_delivered(&self) -> u64 {
        self.results_delivered
    }

    /// Start a sweep and return immediately.
    pub fn capture(&mut self, request: &CaptureRequest) -> Result<()> {
        match self.executor.start(request)? {
            SweepStart::Started { .. } => {
                self.repeat = request.continuous.then_some(*request);
            }
            SweepStart::Complete(result) => {
                // an empty plan never re-arms
                self.repeat = None;
                self.deliver(result);
            }
        }
        Ok(())
    }

    /// Stop re-arming a continuous capture. The sweep in flight still completes.
    pub fn stop(&mut self) {
        if self.repeat.take().is_some() {
            info!("Continuous capture stopped");
        }
    }

    /// Handle one decoded packet.
    pub fn on_packet(&mut self, packet: &Packet) -> Result<()> {
        let result = match self.executor.handle_packet(packet) {
            Ok(result) => result,
            Err(e) => {
                self.repeat = None;
                return Err(e);
            }
        };
        if let Some(result) = result {
            self.deliver(result);
            if let Some(request) = self.repeat {
                debug!("Re-arming continuous capture");
                if let Err(e) = self.executor.start(&request) {
                    self.repeat = None;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Handle a chunk of raw bytes from the data channel. Returns the number
    /// of packets processed.
    ///
    /// Every packet the chunk completes is handled before returning, even
    /// after one fails; the first error is returned.
    pub fn on_bytes(&mut self, bytes: &[u8]) -> Result<usize> {
        let mut processed = 0;
        let mut first_error = None;
        let mut next = self.framer.feed(bytes);
        loop {
            let raw = match next {
                Ok(Some(raw)) => raw,
                Ok(None) => break,
                Err(e) => {
                    // the framer has already dropped its partial state
                    first_error.get_or_insert(self.on_stream_error(e));
                    break;
                }
            };
            match decode(&raw) {
                Ok(packet) => {
                    processed += 1;
                    if let Err(e) = self.on_packet(&packet) {
                        first_error.get_or_insert(e);
                    }
                }
                Err(e) => {
                    first_error.get_or_insert(self.on_stream_error(e));
                }
            }
            next = self.framer.next_frame();
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(processed),
        }
    }

    /// A packet could not be read or decoded. Ends the open sweep the same
    /// way the blocking discipline does and stops re-arming.
    pub fn on_stream_error(&mut self, err: SweepError) -> SweepError {
        self.repeat = None;
        self.executor.stream_error(err)
    }

    /// The data channel closed. Returns the id of a sweep that was cut short.
    pub fn on_disconnect(&mut self) -> Option<u32> {
        self.repeat = None;
        self.framer.reset();
        self.executor.abandon()
    }

    fn deliver(&mut self, result: SweepResult) {
        self.results_delivered += 1;
        match self.callback.as_mut() {
            Some(callback) => callback(result),
            None => debug!(sweep_id = result.sweep_id, "No result callback registered"),
        }
    }
}
