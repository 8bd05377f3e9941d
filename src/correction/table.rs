//! Binary correction-vector table
//!
//! ```text
//! offset  size            field
//! 0       2               version
//! 2       2               freq_count
//! 4       2               vector_count
//! 6       2               vector_size
//! 8       40              reserved
//! 48      6 * freq_count  { freq: u32 (MHz), vector_index: u16 }
//! ...     per vector      { index: u16, values: i32[vector_size] (micro-dB) }
//! ```
//!
//! All fields are big-endian.

use std::collections::HashMap;

use crate::{Result, SweepError};

pub const TABLE_HEADER_BYTES: usize = 8 + 40;
const FREQ_ENTRY_BYTES: usize = 6;
/// Table frequencies are whole MHz
pub const FREQ_UNIT_HZ: f64 = 1e6;
const MICRO_DB: f64 = 1e6;

/// Frequency-indexed calibration curves
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionTable {
    pub version: u16,
    vector_size: usize,
    /// `(freq, vector_index)`, non-decreasing in `freq`
    freqs: Vec<(u32, u16)>,
    vectors: HashMap<u16, Vec<i32>>,
}

struct Cursor<'a> {
    blob: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let bytes = self.blob.get(self.pos..self.pos + n).ok_or_else(|| {
            SweepError::invalid_correction(format!(
                "truncated at {what}: need {n} bytes at offset {}, blob is {} bytes",
                self.pos,
                self.blob.len()
            ))
        })?;
        self.pos += n;
        Ok(bytes)
    }

    fn u16(&mut self, what: &str) -> Result<u16> {
        self.take(2, what).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        self.take(4, what).map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

impl CorrectionTable {
    pub fn parse(blob: &[u8]) -> Result<Self> {
        if blob.len() < TABLE_HEADER_BYTES {
            return Err(SweepError::invalid_correction(format!(
                "blob of {} bytes is shorter than the {} byte header",
                blob.len(),
                TABLE_HEADER_BYTES
            )));
        }

        let mut cursor = Cursor { blob, pos: 0 };
        let version = cursor.u16("version")?;
        let freq_count = cursor.u16("freq_count")? as usize;
        let vector_count = cursor.u16("vector_count")? as usize;
        let vector_size = cursor.u16("vector_size")? as usize;
        cursor.pos = TABLE_HEADER_BYTES;

        let declared = TABLE_HEADER_BYTES + freq_count * FREQ_ENTRY_BYTES + vector_count * (2 + 4 * vector_size);
        if blob.len() < declared {
            return Err(SweepError::invalid_correction(format!(
                "header declares {} bytes ({} frequencies, {} vectors of {}), blob has {}",
                declared,
                freq_count,
                vector_count,
                vector_size,
                blob.len()
            )));
        }

        let mut freqs = Vec::with_capacity(freq_count);
        for _ in 0..freq_count {
            let freq = cursor.u32("frequency entry")?;
            let index = cursor.u16("frequency entry")?;
            if let Some(&(prev, _)) = freqs.last()
                && freq < prev
            {
                return Err(SweepError::invalid_correction(format!(
                    "frequency list decreases from {prev} to {freq}"
                )));
            }
            freqs.push((freq, index));
        }

        let mut vectors = HashMap::with_capacity(vector_count);
        for _ in 0..vector_count {
            let index = cursor.u16("vector index")?;
            let values = cursor
                .take(4 * vector_size, "vector values")?
                .chunks_exact(4)
                .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            vectors.insert(index, values);
        }

        Ok(Self { version, vector_size, freqs, vectors })
    }

    pub fn vector_size(&self) -> usize {
        self.vector_size
    }

    pub fn len(&self) -> usize {
        self.freqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.freqs.is_empty()
    }

    /// Correction curve in dB for a capture at `freq_hz`, resampled to `n_points`.
    ///
    /// Selects the first table entry at or above the frequency, or the last
    /// entry when the frequency is above the table. An entry whose vector is
    /// missing yields zeros.
    pub fn lookup(&self, freq_hz: f64, n_points: usize) -> Vec<f64> {
        let target = freq_hz / FREQ_UNIT_HZ;
        let idx = self.freqs.partition_point(|&(freq, _)| f64::from(freq) < target);
        let Some(&(_, vector_index)) = self.freqs.get(idx).or_else(|| self.freqs.last()) else {
            return vec![0.0; n_points];
        };
        match self.vectors.get(&vector_index) {
            Some(values) => resample(values, n_points),
            None => vec![0.0; n_points],
        }
    }
}

/// Piecewise-linear resampling of micro-dB values onto `n` evenly spaced points, in dB.
fn resample(values: &[i32], n: usize) -> Vec<f64> {
    let db: Vec<f64> = values.iter().map(|&v| f64::from(v) / MICRO_DB).collect();
    if n == db.len() {
        return db;
    }
    match db.len() {
        0 => vec![0.0; n],
        1 => vec![db[0]; n],
        len => {
            let last = (len - 1) as f64;
            (0..n)
                .map(|i| {
                    let pos = if n > 1 { i as f64 * last / (n - 1) as f64 } else { 0.0 };
                    let lo = (pos.floor() as usize).min(len - 1);
                    let hi = (lo + 1).min(len - 1);
                    let frac = pos - lo as f64;
                    db[lo] + (db[hi] - db[lo]) * frac
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::correction_blob;
    use proptest::prelude::*;

    #[test]
    fn lookup_at_stored_frequency_is_identity() {
        let blob = correction_blob(&[(1000, 0), (2000, 1)], &[(0, vec![1_000_000, -2_500_000, 0]), (1, vec![5, 6, 7])]);
        let table = CorrectionTable::parse(&blob).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.vector_size(), 3);
        let curve = table.lookup(1000e6, 3);
        assert_eq!(curve, vec![1.0, -2.5, 0.0]);
    }

    #[test]
    fn selects_nearest_entry_at_or_above() {
        let blob = correction_blob(&[(1000, 0), (2000, 1)], &[(0, vec![1_000_000; 2]), (1, vec![2_000_000; 2])]);
        let table = CorrectionTable::parse(&blob).unwrap();
        assert_eq!(table.lookup(500e6, 2), vec![1.0, 1.0]);
        assert_eq!(table.lookup(1500e6, 2), vec![2.0, 2.0]);
        // above the table clamps to the last entry
        assert_eq!(table.lookup(9000e6, 2), vec![2.0, 2.0]);
    }

    #[test]
    fn resamples_linearly() {
        let blob = correction_blob(&[(1000, 0)], &[(0, vec![0, 2_000_000])]);
        let table = CorrectionTable::parse(&blob).unwrap();
        let curve = table.lookup(1000e6, 5);
        let expected = [0.0, 0.5, 1.0, 1.5, 2.0];
        for (got, want) in curve.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12);
        }
        assert_eq!(table.lookup(1000e6, 1), vec![0.0]);
    }

    #[test]
    fn missing_vector_yields_zeros() {
        let blob = correction_blob(&[(1000, 7)], &[(0, vec![1, 2])]);
        let table = CorrectionTable::parse(&blob).unwrap();
        assert_eq!(table.lookup(1000e6, 4), vec![0.0; 4]);
    }

    #[test]
    fn short_and_truncated_blobs_are_rejected() {
        assert!(matches!(
            CorrectionTable::parse(&[0u8; 47]).unwrap_err(),
            SweepError::InvalidCorrectionData { .. }
        ));

        let blob = correction_blob(&[(1000, 0)], &[(0, vec![1, 2, 3])]);
        let err = CorrectionTable::parse(&blob[..blob.len() - 1]).unwrap_err();
        assert!(matches!(err, SweepError::InvalidCorrectionData { .. }));
    }

    #[test]
    fn decreasing_frequencies_are_rejected() {
        let blob = correction_blob(&[(2000, 0), (1000, 0)], &[(0, vec![1])]);
        assert!(CorrectionTable::parse(&blob).is_err());
    }

    proptest! {
        #[test]
        fn resampled_curve_stays_within_bounds(
            values in prop::collection::vec(-50_000_000i32..50_000_000, 2..64),
            n in 1usize..512,
        ) {
            let curve = resample(&values, n);
            prop_assert_eq!(curve.len(), n);
            let lo = values.iter().copied().min().unwrap() as f64 / MICRO_DB;
            let hi = values.iter().copied().max().unwrap() as f64 / MICRO_DB;
            for v in curve {
                prop_assert!(v >= lo - 1e-9 && v <= hi + 1e-9);
            }
        }
    }
}
