//! Static capability table of an instrument model

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::RfeMode;
use crate::{Result, SweepError};

/// Bandwidth and tuning limits of one receiver mode, all in Hz
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeLimits {
    /// Instantaneous bandwidth covered by one capture
    pub full_bw: f64,
    /// Part of `full_bw` free of filter-edge and image artifacts
    pub usable_bw: f64,
    pub min_tunable: f64,
    pub max_tunable: f64,
}

impl ModeLimits {
    /// Lowest center frequency whose usable band stays inside the tuning range
    pub fn min_center(&self) -> f64 {
        self.min_tunable + self.usable_bw / 2.0
    }

    pub fn max_center(&self) -> f64 {
        self.max_tunable - self.usable_bw / 2.0
    }
}

fn default_spp_multiple() -> u32 {
    32
}

fn default_decimation() -> u32 {
    1
}

/// Device capability table.
///
/// Loaded from YAML so new models can be described without code changes:
///
/// ```yaml
/// model: R5500-408
/// max_spp: 32768
/// min_spp: 256
/// modes:
///   SH: { full_bw: 62.5e6, usable_bw: 40.0e6, min_tunable: 50.0e6, max_tunable: 8.0e9 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProperties {
    pub model: String,
    pub max_spp: u32,
    pub min_spp: u32,
    #[serde(default = "default_spp_multiple")]
    pub spp_multiple: u32,
    #[serde(default = "default_decimation")]
    pub min_decimation: u32,
    #[serde(default = "default_decimation")]
    pub max_decimation: u32,
    pub modes: BTreeMap<RfeMode, ModeLimits>,
}

impl DeviceProperties {
    /// Built-in table for the R5500 family.
    pub fn r5500() -> Self {
        const MHZ: f64 = 1e6;
        let tunable = |full_bw, usable_bw| ModeLimits {
            full_bw,
            usable_bw,
            min_tunable: 50.0 * MHZ,
            max_tunable: 8000.0 * MHZ,
        };

        let modes = BTreeMap::from([
            (RfeMode::Zif, tunable(125.0 * MHZ, 100.0 * MHZ)),
            (RfeMode::Sh, tunable(62.5 * MHZ, 40.0 * MHZ)),
            (RfeMode::Shn, tunable(62.5 * MHZ, 10.0 * MHZ)),
            (
                RfeMode::Dd,
                ModeLimits {
                    full_bw: 62.5 * MHZ,
                    usable_bw: 62.5 * MHZ,
                    min_tunable: 0.0,
                    max_tunable: 62.5 * MHZ,
                },
            ),
        ]);

        Self {
            model: "R5500".to_string(),
            max_spp: 32768,
            min_spp: 256,
            spp_multiple: 32,
            min_decimation: 1,
            max_decimation: 1024,
            modes,
        }
    }

    /// Parse and validate a YAML capability table.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let props: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| SweepError::config("device properties", e.to_string()))?;
        props.validate()?;
        debug!(model = %props.model, modes = props.modes.len(), "Loaded device properties");
        Ok(props)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| SweepError::io(format!("reading {}", path.display()), e))?;
        Self::from_yaml(&yaml)
    }

    /// Limits for a mode, or `InvalidRequest` when the model lacks it.
    pub fn limits(&self, mode: RfeMode) -> Result<&ModeLimits> {
        self.modes.get(&mode).ok_or_else(|| {
            SweepError::invalid_request(format!("{} does not support mode {}", self.model, mode))
        })
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |details: String| Err(SweepError::config("device properties", details));

        if self.spp_multiple == 0 {
            return invalid("spp_multiple must be positive".to_string());
        }
        if self.min_spp == 0 || self.min_spp > self.max_spp {
            return invalid(format!(
                "spp range {}..={} is empty or starts at zero",
                self.min_spp, self.max_spp
            ));
        }
        if self.min_decimation == 0 || self.min_decimation > self.max_decimation {
            return invalid(format!(
                "decimation range {}..={} is invalid",
                self.min_decimation, self.max_decimation
            ));
        }
        for (mode, limits) in &self.modes {
            if !(limits.full_bw > 0.0 && limits.usable_bw > 0.0) {
                return invalid(format!("{mode}: bandwidths must be positive"));
            }
            if limits.usable_bw > limits.full_bw {
                return invalid(format!(
                    "{mode}: usable bandwidth {} exceeds full bandwidth {}",
                    limits.usable_bw, limits.full_bw
                ));
            }
            if limits.min_tunable > limits.max_tunable {
                return invalid(format!(
                    "{mode}: tunable range {}..{} is inverted",
                    limits.min_tunable, limits.max_tunable
                ));
            }
        }
        Ok(())
    }
}
