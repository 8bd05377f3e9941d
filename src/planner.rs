//! Sweep planning
//!
//! [`plan_sweep`] turns a requested band and resolution into the list of
//! device captures that covers it. The plan fixes the exact number of data
//! packets the executor waits for and the size of the composite spectrum.
//!
//! ## Geometry
//!
//! ```text
//!          bandstart                                      bandstop
//!              |<------------------ requested ------------------>|
//!   [  DD  ][ step 0 ][ step 1 ] ... [ step n-1 ][ end ]
//!            <fstep> overlap of 4 * rbw between neighbours
//! ```
//!
//! - The DD entry only appears when the padded start lies below the mode's
//!   tunable range.
//! - The end entry only appears when the last regular step would have been
//!   tuned beyond the mode's highest usable center.
//!
//! ## Usage Example
//!
//! ```rust
//! use vrtsweep::device::{DeviceProperties, DeviceSettings, RfeMode};
//! use vrtsweep::plan_sweep;
//!
//! let props = DeviceProperties::r5500();
//! let plan = plan_sweep(100e6, 200e6, 100e3, RfeMode::Shn, &DeviceSettings::default(), &props)
//!     .unwrap();
//! assert!(plan.step_count > 0);
//! assert!(plan.rbw <= 100e3);
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::device::{DeviceProperties, DeviceSettings, ModeLimits, RfeMode};
use crate::{Result, SweepError};

/// Padding applied to each side of the requested band, in units of RBW
const EDGE_PAD_BINS: f64 = 4.0;

/// One entry of the device's sweep list
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepEntry {
    /// First center frequency, Hz
    pub fstart: f64,
    /// Last center frequency, Hz
    pub fstop: f64,
    pub fstep: f64,
    /// Samples per packet
    pub spp: u32,
    /// Packets per block
    pub ppb: u32,
    pub attenuation: f64,
    pub rfe_mode: RfeMode,
    pub decimation: u32,
}

impl SweepEntry {
    /// Number of tuning steps this entry makes.
    pub fn steps(&self) -> u32 {
        if self.fstep > 0.0 && self.fstop > self.fstart {
            ((self.fstop - self.fstart) / self.fstep).round() as u32 + 1
        } else {
            1
        }
    }

    /// Data packets this entry produces
    pub fn packets(&self) -> u32 {
        self.steps().saturating_mul(self.ppb)
    }
}

/// Which entry produced a given data packet, and where it was tuned
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedStep {
    pub mode: RfeMode,
    pub center: f64,
    pub dd: bool,
}

/// Capture plan for one sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPlan {
    pub mode: RfeMode,
    pub bandstart: f64,
    pub bandstop: f64,
    /// Regular entry, absent for empty and DD-only plans
    pub entry: Option<SweepEntry>,
    pub dd_entry: Option<SweepEntry>,
    pub end_entry: Option<SweepEntry>,
    pub dd_mode: bool,
    pub beyond_dd: bool,
    pub make_end_entry: bool,
    pub end_entry_freq: f64,
    /// Data packets the sweep produces across every entry
    pub step_count: u32,
    /// Length of the composite spectrum
    pub spectral_points: usize,
    /// Achieved resolution bandwidth, Hz
    pub rbw: f64,
    pub fstep: f64,
    pub spp: u32,
    pub ppb: u32,
    pub full_bw: f64,
    pub usable_bw: f64,
    /// Lower edge and width of the DD capture
    pub dd_start: f64,
    pub dd_bw: f64,
}

impl SweepPlan {
    fn empty(freq: f64, rbw: f64, mode: RfeMode, settings: &DeviceSettings) -> Self {
        Self {
            mode,
            bandstart: freq,
            bandstop: freq,
            entry: None,
            dd_entry: None,
            end_entry: None,
            dd_mode: false,
            beyond_dd: false,
            make_end_entry: false,
            end_entry_freq: 0.0,
            step_count: 0,
            spectral_points: 0,
            rbw,
            fstep: 0.0,
            spp: 0,
            ppb: settings.ppb,
            full_bw: 0.0,
            usable_bw: 0.0,
            dd_start: 0.0,
            dd_bw: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.step_count == 0
    }

    /// Entries in the order the device runs them.
    pub fn entries(&self) -> impl Iterator<Item = &SweepEntry> {
        self.dd_entry.iter().chain(self.entry.iter()).chain(self.end_entry.iter())
    }

    /// Map the n-th data packet of the sweep to the step that produced it.
    pub fn step_for_packet(&self, index: u32) -> Option<PlannedStep> {
        if index >= self.step_count {
            return None;
        }
        let mut index = index;
        if self.dd_mode {
            if index == 0 {
                return Some(PlannedStep {
                    mode: RfeMode::Dd,
                    center: self.dd_start + self.dd_bw / 2.0,
                    dd: true,
                });
            }
            index -= 1;
        }

        let step = index / self.ppb.max(1);
        let regular = self.entry.map_or(0, |e| e.steps());
        let center = if step < regular {
            let entry = self.entry?;
            entry.fstart + f64::from(step) * entry.fstep
        } else if self.make_end_entry && step == regular {
            self.end_entry_freq
        } else {
            return None;
        };
        Some(PlannedStep { mode: self.mode, center, dd: false })
    }
}

/// Round `value` to the nearest multiple of `multiple`, never below one multiple.
fn align(value: f64, multiple: u32) -> u32 {
    let m = f64::from(multiple);
    ((value / m).round().max(1.0) * m) as u32
}

fn bins(spp: u32, mode: RfeMode) -> u32 {
    if mode.is_i_only() { spp / 2 } else { spp }
}

/// Samples per packet giving roughly `rbw` over `full_bw`, before clamping.
fn packet_size(full_bw: f64, rbw: f64, mode: RfeMode, props: &DeviceProperties) -> u32 {
    let spp = align(full_bw / rbw, props.spp_multiple);
    if mode.is_i_only() { spp.saturating_mul(2) } else { spp }
}

fn clamp_spp(spp: u32, max: u32, props: &DeviceProperties) -> u32 {
    spp.min(max).max(props.min_spp)
}

/// Plan a sweep of `[fstart, fstop]` at resolution `rbw` in `mode`.
///
/// `fstart == fstop` yields an empty plan. An inverted range or a
/// non-positive resolution is rejected with [`SweepError::InvalidRequest`].
pub fn plan_sweep(
    fstart: f64,
    fstop: f64,
    rbw: f64,
    mode: RfeMode,
    settings: &DeviceSettings,
    props: &DeviceProperties,
) -> Result<SweepPlan> {
    if !(rbw.is_finite() && rbw > 0.0) {
        return Err(SweepError::invalid_request(format!("resolution {rbw} Hz is not positive")));
    }
    if !(fstart.is_finite() && fstop.is_finite()) {
        return Err(SweepError::invalid_request("frequency range is not finite"));
    }
    if fstart > fstop {
        return Err(SweepError::invalid_request(format!(
            "start {fstart} Hz is above stop {fstop} Hz"
        )));
    }
    if fstart == fstop {
        debug!(freq = fstart, "Empty sweep range");
        return Ok(SweepPlan::empty(fstart, rbw, mode, settings));
    }
    if settings.ppb == 0 {
        return Err(SweepError::invalid_request("packets per block must be at least 1"));
    }
    if !(props.min_decimation..=props.max_decimation).contains(&settings.decimation) {
        return Err(SweepError::invalid_request(format!(
            "decimation {} outside {}..={}",
            settings.decimation, props.min_decimation, props.max_decimation
        )));
    }

    let limits: ModeLimits = *props.limits(mode)?;
    let dd_limits = if mode == RfeMode::Dd { None } else { props.modes.get(&RfeMode::Dd).copied() };

    // achieved resolution, then padded band edges
    let mut spp = clamp_spp(packet_size(limits.full_bw, rbw, mode, props), props.max_spp, props);
    let mut true_rbw = limits.full_bw / f64::from(bins(spp, mode));
    let bandstart = fstart;
    let mut bandstop = fstop;
    let pad = |rbw: f64, bandstop: f64| (fstart - EDGE_PAD_BINS * rbw, bandstop + EDGE_PAD_BINS * rbw);

    let needs_dd = |pstart: f64| dd_limits.is_some() && pstart < limits.min_tunable;
    if needs_dd(pad(true_rbw, bandstop).0) && mode == RfeMode::Zif && spp > props.max_spp / 2 {
        // DD and ZIF captures share the packet buffer
        spp = clamp_spp(spp, props.max_spp / 2, props);
        true_rbw = limits.full_bw / f64::from(bins(spp, mode));
    }
    if bandstop - bandstart < true_rbw {
        bandstop = bandstart + true_rbw;
    }
    let (pstart, pstop) = pad(true_rbw, bandstop);

    let mut plan = SweepPlan {
        mode,
        bandstart,
        bandstop,
        entry: None,
        dd_entry: None,
        end_entry: None,
        dd_mode: false,
        beyond_dd: false,
        make_end_entry: false,
        end_entry_freq: 0.0,
        step_count: 0,
        spectral_points: ((bandstop - bandstart) / true_rbw).round() as usize,
        rbw: true_rbw,
        fstep: 0.0,
        spp,
        ppb: settings.ppb,
        full_bw: limits.full_bw,
        usable_bw: limits.usable_bw,
        dd_start: 0.0,
        dd_bw: 0.0,
    };

    let entry_for = |fstart: f64, fstop: f64, fstep: f64, spp: u32, ppb: u32, rfe_mode| SweepEntry {
        fstart,
        fstop,
        fstep,
        spp,
        ppb,
        attenuation: settings.attenuation,
        rfe_mode,
        decimation: settings.decimation,
    };

    match dd_limits {
        Some(dd) if needs_dd(pstart) => {
            let dd_spp =
                clamp_spp(packet_size(dd.full_bw, true_rbw, RfeMode::Dd, props), props.max_spp, props);
            plan.dd_mode = true;
            plan.dd_start = dd.min_tunable;
            plan.dd_bw = dd.full_bw;
            plan.dd_entry =
                Some(entry_for(dd.min_tunable, dd.min_tunable, 0.0, dd_spp, 1, RfeMode::Dd));
            plan.step_count += 1;
        }
        _ if pstart < limits.min_tunable => {
            warn!(
                pstart,
                min_tunable = limits.min_tunable,
                %mode,
                "Requested start is below the tunable range; low edge will not be covered"
            );
        }
        _ => {}
    }

    plan.beyond_dd = pstop >= limits.min_tunable;
    if plan.beyond_dd {
        let half = limits.usable_bw / 2.0;
        let (min_center, max_center) = (limits.min_center(), limits.max_center());
        let first = if plan.dd_mode { min_center } else { (pstart + half).max(min_center).min(max_center) };

        let fstep = limits.usable_bw - EDGE_PAD_BINS * true_rbw;
        if fstep <= 0.0 {
            return Err(SweepError::invalid_request(format!(
                "resolution {true_rbw} Hz is too coarse for {mode} usable bandwidth {}",
                limits.usable_bw
            )));
        }

        let remaining = pstop - (first + half);
        let mut steps = if remaining > 0.0 { (remaining / fstep).ceil() as u32 + 1 } else { 1 };
        let last_center = |steps: u32| first + f64::from(steps - 1) * fstep;

        if last_center(steps) > max_center {
            while steps > 1 && last_center(steps) > max_center {
                steps -= 1;
            }
            if last_center(steps) < max_center {
                plan.make_end_entry = true;
                plan.end_entry_freq = max_center;
                plan.end_entry = Some(entry_for(max_center, max_center, 0.0, spp, settings.ppb, mode));
            }
            if pstop > limits.max_tunable {
                warn!(
                    pstop,
                    max_tunable = limits.max_tunable,
                    %mode,
                    "Requested stop is above the tunable range; high edge will not be covered"
                );
            }
        }

        plan.fstep = fstep;
        plan.entry = Some(entry_for(first, last_center(steps), fstep, spp, settings.ppb, mode));
        plan.step_count = steps
            .checked_add(u32::from(plan.make_end_entry))
            .and_then(|n| n.checked_mul(settings.ppb))
            .and_then(|n| n.checked_add(plan.step_count))
            .ok_or_else(|| {
                SweepError::invalid_request(format!(
                    "{steps} steps at {} packets per block overflow the packet count",
                    settings.ppb
                ))
            })?;
    }

    debug!(
        %mode,
        bandstart = plan.bandstart,
        bandstop = plan.bandstop,
        rbw = plan.rbw,
        spp = plan.spp,
        step_count = plan.step_count,
        spectral_points = plan.spectral_points,
        dd_mode = plan.dd_mode,
        make_end_entry = plan.make_end_entry,
        "Planned sweep"
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn plan(fstart: f64, fstop: f64, rbw: f64, mode: RfeMode) -> Result<SweepPlan> {
        plan_sweep(fstart, fstop, rbw, mode, &DeviceSettings::default(), &DeviceProperties::r5500())
    }

    /// Frequency ranges covered by each step, in device order
    fn covered(plan: &SweepPlan) -> Vec<(f64, f64)> {
        (0..plan.step_count)
            .filter_map(|i| plan.step_for_packet(i))
            .map(|step| {
                if step.dd {
                    (plan.dd_start, plan.dd_start + plan.dd_bw)
                } else {
                    (step.center - plan.usable_bw / 2.0, step.center + plan.usable_bw / 2.0)
                }
            })
            .collect()
    }

    #[test]
    fn degenerate_range_is_empty() {
        let plan = plan(2400e6, 2400e6, 500.0, RfeMode::Sh).unwrap();
        assert_eq!(plan.step_count, 0);
        assert_eq!(plan.spectral_points, 0);
        assert_eq!(plan.entries().count(), 0);
        assert!(plan.step_for_packet(0).is_none());
    }

    #[test]
    fn inverted_range_and_bad_rbw_are_rejected() {
        let err = plan(200e6, 100e6, 100e3, RfeMode::Sh).unwrap_err();
        assert!(matches!(err, SweepError::InvalidRequest { .. }));
        assert!(plan(100e6, 200e6, 0.0, RfeMode::Sh).is_err());
        assert!(plan(100e6, 200e6, -5.0, RfeMode::Sh).is_err());
    }

    #[test]
    fn narrow_band_covers_span_in_usable_steps() {
        let plan = plan(100e6, 200e6, 100e3, RfeMode::Shn).unwrap();
        // 100 MHz over 10 MHz of usable bandwidth
        assert!((10..=11).contains(&plan.step_count), "step_count {}", plan.step_count);
        assert!(!plan.dd_mode);
        assert!(plan.rbw <= 100e3);

        let ranges = covered(&plan);
        assert!(ranges[0].0 <= 100e6);
        assert!(ranges.last().unwrap().1 >= 200e6);
        for pair in ranges.windows(2) {
            assert!(pair[1].0 <= pair[0].1, "gap between {:?} and {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn spp_is_aligned_and_doubled_for_real_modes() {
        let sh = plan(1e9, 1.1e9, 100e3, RfeMode::Sh).unwrap();
        let zif = plan(1e9, 1.1e9, 100e3, RfeMode::Zif).unwrap();
        assert_eq!(sh.spp % 64, 0);
        assert_eq!(sh.spp, 1280);
        assert_eq!(zif.spp, 1248);
        assert!((sh.rbw - 62.5e6 / 640.0).abs() < 1e-9);
        assert_eq!(sh.spectral_points, (100e6 / sh.rbw).round() as usize);
    }

    #[test]
    fn sub_bin_band_is_widened() {
        let plan = plan(1e9, 1e9 + 10.0, 100e3, RfeMode::Sh).unwrap();
        assert!((plan.bandstop - plan.bandstart - plan.rbw).abs() < 1e-6);
        assert_eq!(plan.spectral_points, 1);
        assert_eq!(plan.step_count, 1);
    }

    #[test]
    fn low_band_uses_a_single_dd_capture() {
        let plan = plan(10e6, 40e6, 100e3, RfeMode::Sh).unwrap();
        assert!(plan.dd_mode);
        assert!(!plan.beyond_dd);
        assert_eq!(plan.step_count, 1);
        assert!(plan.entry.is_none());
        assert_eq!(plan.dd_entry.unwrap().rfe_mode, RfeMode::Dd);
        assert!(plan.step_for_packet(0).unwrap().dd);
    }

    #[test]
    fn dd_then_regular_steps_from_the_lowest_center() {
        let plan = plan(10e6, 300e6, 100e3, RfeMode::Sh).unwrap();
        assert!(plan.dd_mode);
        assert!(plan.beyond_dd);
        let entry = plan.entry.unwrap();
        assert_eq!(entry.fstart, 70e6);
        assert_eq!(plan.step_count, 1 + entry.steps());
        assert_eq!(plan.entries().count(), 2);
        assert_eq!(plan.step_for_packet(1).unwrap().center, 70e6);
    }

    #[test]
    fn zif_with_dd_halves_the_packet_size() {
        let plan = plan(1e6, 200e6, 1e3, RfeMode::Zif).unwrap();
        assert!(plan.dd_mode);
        assert_eq!(plan.spp, 16384);

        let without_dd = plan_sweep(
            100e6,
            200e6,
            1e3,
            RfeMode::Zif,
            &DeviceSettings::default(),
            &DeviceProperties::r5500(),
        )
        .unwrap();
        assert_eq!(without_dd.spp, 32768);
    }

    #[test]
    fn top_of_range_appends_end_entry() {
        let plan = plan(7.9e9, 8.0e9, 100e3, RfeMode::Sh).unwrap();
        assert!(plan.make_end_entry);
        assert_eq!(plan.end_entry_freq, 7.98e9);
        let entry = plan.entry.unwrap();
        assert!(entry.fstop <= 7.98e9);
        assert_eq!(plan.step_count, entry.steps() + 1);
        let last = plan.step_for_packet(plan.step_count - 1).unwrap();
        assert_eq!(last.center, 7.98e9);
    }

    #[test]
    fn packets_per_block_multiply_steps() {
        let settings = DeviceSettings { ppb: 4, ..DeviceSettings::default() };
        let props = DeviceProperties::r5500();
        let single = plan(1e9, 1.2e9, 100e3, RfeMode::Sh).unwrap();
        let quad = plan_sweep(1e9, 1.2e9, 100e3, RfeMode::Sh, &settings, &props).unwrap();
        assert_eq!(quad.step_count, single.step_count * 4);
        assert_eq!(quad.step_for_packet(3).unwrap().center, quad.step_for_packet(0).unwrap().center);
        assert!(quad.step_for_packet(quad.step_count).is_none());
    }

    #[test]
    fn packet_count_overflow_is_rejected() {
        let settings = DeviceSettings { ppb: u32::MAX, ..DeviceSettings::default() };
        let err = plan_sweep(1e9, 1.2e9, 100e3, RfeMode::Sh, &settings, &DeviceProperties::r5500())
            .unwrap_err();
        assert!(matches!(err, SweepError::InvalidRequest { .. }), "{err:?}");
    }

    #[test]
    fn unsupported_decimation_is_rejected() {
        let settings = DeviceSettings { decimation: 4096, ..DeviceSettings::default() };
        let err = plan_sweep(1e9, 1.2e9, 100e3, RfeMode::Sh, &settings, &DeviceProperties::r5500())
            .unwrap_err();
        assert!(matches!(err, SweepError::InvalidRequest { .. }));
    }

    proptest! {
        #[test]
        fn plans_cover_the_tunable_part_of_the_request(
            fstart in 60e6f64..7.5e9,
            span in 1e6f64..800e6,
            rbw in prop::sample::select(vec![10e3, 50e3, 100e3, 500e3]),
            mode in prop::sample::select(vec![RfeMode::Zif, RfeMode::Sh, RfeMode::Shn]),
        ) {
            let plan = plan(fstart, fstart + span, rbw, mode).unwrap();
            let ranges = covered(&plan);
            prop_assert_eq!(ranges.len() as u32, plan.step_count);
            prop_assert!(ranges[0].0 <= plan.bandstart + 1.0);

            let top = plan.bandstop.min(8e9);
            prop_assert!(ranges.last().unwrap().1 >= top - 1.0);
            for pair in ranges.windows(2) {
                prop_assert!(pair[1].0 <= pair[0].1 + 1.0);
            }
        }
    }
}
