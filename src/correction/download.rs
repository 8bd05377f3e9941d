//! Chunked download of calibration tables over the control channel

use tracing::{debug, warn};

use super::{CorrectionTable, CorrectionVectors};
use crate::device::{CorrectionKind, DeviceControl};
use crate::{Result, SweepError};

/// Largest chunk requested in one control-channel round trip
pub const DEFAULT_CHUNK_BYTES: usize = 4096;

/// Upper bound on the buffer reserved up front from the reported table size
const MAX_INITIAL_CAPACITY: usize = DEFAULT_CHUNK_BYTES * 16;

/// State of one table download. Owned by the caller for the duration of the
/// transfer and consumed by [`CorrectionDownload::finish`].
#[derive(Debug)]
pub struct CorrectionDownload {
    kind: CorrectionKind,
    total: usize,
    chunk_bytes: usize,
    buffer: Vec<u8>,
}

impl CorrectionDownload {
    pub fn new(kind: CorrectionKind, total: usize) -> Self {
        Self {
            kind,
            total,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            buffer: Vec::with_capacity(total.min(MAX_INITIAL_CAPACITY)),
        }
    }

    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes.max(1);
        self
    }

    pub fn kind(&self) -> CorrectionKind {
        self.kind
    }

    pub fn received(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_complete(&self) -> bool {
        self.buffer.len() >= self.total
    }

    /// `(offset, len)` of the next chunk to request, `None` once complete.
    pub fn next_request(&self) -> Option<(usize, usize)> {
        if self.is_complete() {
            return None;
        }
        let offset = self.buffer.len();
        Some((offset, self.chunk_bytes.min(self.total - offset)))
    }

    /// Append a received chunk.
    pub fn accept(&mut self, chunk: &[u8]) -> Result<()> {
        if chunk.is_empty() {
            return Err(SweepError::invalid_correction(format!(
                "{} table download stalled at {} of {} bytes",
                self.kind,
                self.buffer.len(),
                self.total
            )));
        }
        if self.buffer.len() + chunk.len() > self.total {
            return Err(SweepError::invalid_correction(format!(
                "{} table chunk overruns declared size {}",
                self.kind, self.total
            )));
        }
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        if !self.is_complete() {
            return Err(SweepError::invalid_correction(format!(
                "{} table incomplete: {} of {} bytes",
                self.kind,
                self.buffer.len(),
                self.total
            )));
        }
        Ok(self.buffer)
    }

    /// Run a complete download against a device.
    pub fn run<D: DeviceControl + ?Sized>(
        device: &mut D,
        kind: CorrectionKind,
    ) -> Result<Option<Vec<u8>>> {
        let total = device.correction_size(kind)?;
        if total == 0 {
            debug!(%kind, "Device has no stored correction table");
            return Ok(None);
        }

        let mut download = Self::new(kind, total);
        while let Some((offset, len)) = download.next_request() {
            let chunk = device.correction_chunk(kind, offset, len)?;
            download.accept(&chunk)?;
        }
        debug!(%kind, bytes = total, "Downloaded correction table");
        download.finish().map(Some)
    }
}

fn fetch_table<D: DeviceControl + ?Sized>(device: &mut D, kind: CorrectionKind) -> Option<CorrectionTable> {
    let parsed = CorrectionDownload::run(device, kind)
        .and_then(|blob| blob.map(|b| CorrectionTable::parse(&b)).transpose());
    match parsed {
        Ok(table) => table,
        Err(e) => {
            warn!(%kind, error = %e, "Correction table unavailable; continuing without it");
            None
        }
    }
}

/// Download and parse both calibration tables.
///
/// Any failure leaves the affected table absent, which makes its correction
/// a no-op rather than failing the caller.
pub fn fetch_correction_vectors<D: DeviceControl + ?Sized>(device: &mut D) -> CorrectionVectors {
    CorrectionVectors {
        noise: fetch_table(device, CorrectionKind::Noise),
        signal: fetch_table(device, CorrectionKind::Signal),
    }
}
