//! Data packet trailer word

use serde::{Deserialize, Serialize};

/// Enable/indicator bit positions for each trailer flag.
///
/// A flag is only trusted when the indicator bit and its mirrored enable
/// bit twelve positions higher are both set.
pub mod trailer_bits {
    pub const VALID_DATA: (u32, u32) = (18, 30);
    pub const REFERENCE_LOCK: (u32, u32) = (17, 29);
    pub const SPECTRAL_INVERSION: (u32, u32) = (14, 26);
    pub const OVER_RANGE: (u32, u32) = (13, 25);
    pub const SAMPLE_LOSS: (u32, u32) = (12, 24);
}

/// Trailer of a data packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trailer(pub u32);

impl Trailer {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Check if a specific bit is set.
    pub fn is_set(&self, bit: u32) -> bool {
        (self.0 & (1 << bit)) != 0
    }

    /// True only when both bits of a mirrored pair are set.
    pub fn pair_set(&self, (indicator, enable): (u32, u32)) -> bool {
        self.is_set(indicator) && self.is_set(enable)
    }

    pub fn valid_data(&self) -> bool {
        self.pair_set(trailer_bits::VALID_DATA)
    }

    pub fn reference_lock(&self) -> bool {
        self.pair_set(trailer_bits::REFERENCE_LOCK)
    }

    /// The frequency axis of this capture is mirrored
    pub fn spectral_inversion(&self) -> bool {
        self.pair_set(trailer_bits::SPECTRAL_INVERSION)
    }

    pub fn over_range(&self) -> bool {
        self.pair_set(trailer_bits::OVER_RANGE)
    }

    pub fn sample_loss(&self) -> bool {
        self.pair_set(trailer_bits::SAMPLE_LOSS)
    }

    /// Build a trailer with the given flags asserted (both bits of each pair).
    pub fn with_flags(flags: &[(u32, u32)]) -> Self {
        let raw = flags.iter().fold(0u32, |acc, (a, b)| acc | (1 << a) | (1 << b));
        Self(raw)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}
