//! Device calibration data.
//!
//! The instrument stores two frequency-indexed tables of dB correction
//! curves: one for bins dominated by the noise floor and one for bins
//! carrying signal. [`CorrectionVectors`] holds whichever of the two could be
//! loaded; a missing table behaves as an all-zero correction.

mod download;
mod table;

use tracing::warn;

pub use download::{CorrectionDownload, DEFAULT_CHUNK_BYTES, fetch_correction_vectors};
pub use table::{CorrectionTable, FREQ_UNIT_HZ, TABLE_HEADER_BYTES};

/// Noise and signal correction tables
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrectionVectors {
    pub noise: Option<CorrectionTable>,
    pub signal: Option<CorrectionTable>,
}

impl CorrectionVectors {
    /// Parse raw blobs, dropping (with a warning) any that are malformed.
    pub fn from_blobs(noise: Option<&[u8]>, signal: Option<&[u8]>) -> Self {
        let parse = |name: &str, blob: Option<&[u8]>| {
            blob.and_then(|b| match CorrectionTable::parse(b) {
                Ok(table) => Some(table),
                Err(e) => {
                    warn!(table = name, error = %e, "Ignoring malformed correction table");
                    None
                }
            })
        };
        Self { noise: parse("noise", noise), signal: parse("signal", signal) }
    }

    pub fn is_empty(&self) -> bool {
        self.noise.is_none() && self.signal.is_none()
    }

    pub fn noise_correction(&self, freq_hz: f64, n_points: usize) -> Vec<f64> {
        lookup_or_zero(self.noise.as_ref(), freq_hz, n_points)
    }

    pub fn signal_correction(&self, freq_hz: f64, n_points: usize) -> Vec<f64> {
        lookup_or_zero(self.signal.as_ref(), freq_hz, n_points)
    }
}

fn lookup_or_zero(table: Option<&CorrectionTable>, freq_hz: f64, n_points: usize) -> Vec<f64> {
    match table {
        Some(table) => table.lookup(freq_hz, n_points),
        None => vec![0.0; n_points],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::correction_blob;

    #[test]
    fn malformed_blob_becomes_zero_correction() {
        let good = correction_blob(&[(1500, 0)], &[(0, vec![3_000_000; 4])]);
        let vectors = CorrectionVectors::from_blobs(Some(&[1, 2, 3]), Some(&good));
        assert!(vectors.noise.is_none());
        assert!(!vectors.is_empty());
        assert_eq!(vectors.noise_correction(1.5e9, 4), vec![0.0; 4]);
        assert_eq!(vectors.signal_correction(1.5e9, 4), vec![3.0; 4]);
        assert!(CorrectionVectors::default().is_empty());
    }
}
