//! Instrument collaborators: receiver modes, capture settings, the control
//! channel interface and the capability table.
//!
//! The text command vocabulary of the control channel lives outside this
//! crate. [`DeviceControl`] is the seam: the executor only ever asks for the
//! handful of operations a sweep needs.

mod properties;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use properties::{DeviceProperties, ModeLimits};

use crate::planner::SweepEntry;
use crate::{Result, SweepError};

/// Receiver front-end mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RfeMode {
    /// Zero-IF, complex I/Q samples
    Zif,
    /// Super-heterodyne, real samples
    Sh,
    /// Super-heterodyne, narrow band
    Shn,
    /// Direct digitization of the lowest band
    Dd,
}

impl RfeMode {
    /// Modes that deliver a single real channel instead of I/Q pairs
    pub fn is_i_only(self) -> bool {
        matches!(self, RfeMode::Sh | RfeMode::Shn | RfeMode::Dd)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RfeMode::Zif => "ZIF",
            RfeMode::Sh => "SH",
            RfeMode::Shn => "SHN",
            RfeMode::Dd => "DD",
        }
    }
}

impl fmt::Display for RfeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RfeMode {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ZIF" => Ok(RfeMode::Zif),
            "SH" => Ok(RfeMode::Sh),
            "SHN" => Ok(RfeMode::Shn),
            "DD" => Ok(RfeMode::Dd),
            other => Err(SweepError::invalid_request(format!("unknown receiver mode {other:?}"))),
        }
    }
}

fn default_one() -> u32 {
    1
}

/// Per-capture device settings supplied with a request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Input attenuation in dB
    #[serde(default)]
    pub attenuation: f64,
    /// Packets per block emitted at each step
    #[serde(default = "default_one")]
    pub ppb: u32,
    #[serde(default = "default_one")]
    pub decimation: u32,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self { attenuation: 0.0, ppb: 1, decimation: 1 }
    }
}

/// Which calibration table to download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorrectionKind {
    Noise,
    Signal,
}

impl fmt::Display for CorrectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrectionKind::Noise => f.write_str("noise"),
            CorrectionKind::Signal => f.write_str("signal"),
        }
    }
}

/// Control channel operations needed to run a sweep.
pub trait DeviceControl {
    /// Remove every entry from the device's sweep list.
    fn sweep_clear(&mut self) -> Result<()>;

    fn sweep_add(&mut self, entry: &SweepEntry) -> Result<()>;

    /// Number of passes over the sweep list.
    fn sweep_iterations(&mut self, count: u32) -> Result<()>;

    /// Start the sweep list, tagging its packets with `sweep_id`.
    fn sweep_start(&mut self, sweep_id: u32) -> Result<()>;

    fn abort(&mut self) -> Result<()>;

    /// Discard packets still queued on the data channel.
    fn flush(&mut self) -> Result<()>;

    /// Size in bytes of a stored calibration table, zero when absent.
    fn correction_size(&mut self, kind: CorrectionKind) -> Result<usize>;

    fn correction_chunk(&mut self, kind: CorrectionKind, offset: usize, len: usize)
    -> Result<Vec<u8>>;
}

impl<D: DeviceControl + ?Sized> DeviceControl for &mut D {
    fn sweep_clear(&mut self) -> Result<()> {
        (**self).sweep_clear()
    }

    fn sweep_add(&mut self, entry: &SweepEntry) -> Result<()> {
        (**self).sweep_add(entry)
    }

    fn sweep_iterations(&mut self, count: u32) -> Result<()> {
        (**self).sweep_iterations(count)
    }

    fn sweep_start(&mut self, sweep_id: u32) -> Result<()> {
        (**self).sweep_start(sweep_id)
    }

    fn abort(&mut self) -> Result<()> {
        (**self).abort()
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn correction_size(&mut self, kind: CorrectionKind) -> Result<usize> {
        (**self).correction_size(kind)
    }

    fn correction_chunk(
        &mut self,
        kind: CorrectionKind,
        offset: usize,
        len: usize,
    ) -> Result<Vec<u8>> {
        (**self).correction_chunk(kind, offset, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_names_round_trip() {
        for mode in [RfeMode::Zif, RfeMode::Sh, RfeMode::Shn, RfeMode::Dd] {
            assert_eq!(mode.to_string().parse::<RfeMode>().unwrap(), mode);
        }
        assert_eq!("shn".parse::<RfeMode>().unwrap(), RfeMode::Shn);
        assert!("HDR".parse::<RfeMode>().is_err());
    }

    #[test]
    fn i_only_modes() {
        assert!(!RfeMode::Zif.is_i_only());
        assert!(RfeMode::Sh.is_i_only());
        assert!(RfeMode::Shn.is_i_only());
        assert!(RfeMode::Dd.is_i_only());
    }

    #[test]
    fn settings_defaults_from_yaml() {
        let settings: DeviceSettings = serde_yaml_ng::from_str("attenuation: 20").unwrap();
        assert_eq!(settings, DeviceSettings { attenuation: 20.0, ppb: 1, decimation: 1 });
    }
}
