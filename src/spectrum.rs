//! Per-capture spectrum hooks and composite stitching
//!
//! The FFT and phase-calibration math that turns one capture's samples into
//! a power spectrum is outside this crate; [`SpectrumEngine`] is the
//! boundary. What stays here is the geometry: which bins of a capture are
//! usable, how calibration curves are applied bin by bin, and where a
//! capture lands in the composite buffer.

use crate::Result;
use crate::device::RfeMode;
use crate::executor::ExecutorConfig;
use crate::types::DataPacket;

/// Thermal noise density at room temperature, dBm/Hz
const THERMAL_NOISE_DBM_HZ: f64 = -174.0;

/// Everything known about the capture a data packet belongs to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureContext {
    pub mode: RfeMode,
    /// Carrier frequency the capture was tuned to, Hz
    pub center_freq: f64,
    pub full_bw: f64,
    pub usable_bw: f64,
    /// Plan resolution bandwidth, Hz
    pub rbw: f64,
    pub attenuation: f64,
    /// Latest reference level context, dBm
    pub reflevel: Option<f64>,
    pub spectral_inversion: bool,
    pub decimation: u32,
}

impl CaptureContext {
    /// Lower edge of the captured band
    pub fn start_freq(&self) -> f64 {
        self.center_freq - self.full_bw / 2.0
    }
}

/// Contiguous slice of a capture's spectrum that is safe to stitch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsableBins {
    pub start: usize,
    pub len: usize,
}

impl UsableBins {
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Computes a power spectrum from one capture.
pub trait SpectrumEngine {
    /// Power spectrum in dBm per bin, lowest frequency first, covering
    /// `ctx.full_bw` around `ctx.center_freq`.
    fn power_spectrum(&mut self, packet: &DataPacket, ctx: &CaptureContext) -> Result<Vec<f64>>;

    /// Usable sub-range of a `bins`-long spectrum.
    ///
    /// Defaults to the centered `usable_bw / full_bw` fraction.
    fn usable_bins(&self, ctx: &CaptureContext, bins: usize) -> UsableBins {
        if ctx.full_bw <= 0.0 || ctx.usable_bw >= ctx.full_bw {
            return UsableBins { start: 0, len: bins };
        }
        let len = ((bins as f64) * ctx.usable_bw / ctx.full_bw).round() as usize;
        let len = len.min(bins);
        UsableBins { start: (bins - len) / 2, len }
    }
}

impl<E: SpectrumEngine + ?Sized> SpectrumEngine for Box<E> {
    fn power_spectrum(&mut self, packet: &DataPacket, ctx: &CaptureContext) -> Result<Vec<f64>> {
        (**self).power_spectrum(packet, ctx)
    }

    fn usable_bins(&self, ctx: &CaptureContext, bins: usize) -> UsableBins {
        (**self).usable_bins(ctx, bins)
    }
}

/// Copy `src`, covering `[src_fstart, src_fstop)`, into `dst`, covering
/// `[dst_fstart, dst_fstop)`.
///
/// The source is clipped to the destination range on both ends; partial or
/// absent overlap is not an error. Returns the number of bins written.
pub fn copy_segment(
    src: &[f64],
    src_fstart: f64,
    src_fstop: f64,
    dst: &mut [f64],
    dst_fstart: f64,
    dst_fstop: f64,
) -> usize {
    if src.is_empty() || dst.is_empty() || src_fstop <= src_fstart || dst_fstop <= dst_fstart {
        return 0;
    }
    let src_rbw = (src_fstop - src_fstart) / src.len() as f64;
    let dst_rbw = (dst_fstop - dst_fstart) / dst.len() as f64;

    let start = src_fstart.max(dst_fstart);
    let stop = src_fstop.min(dst_fstop);
    if stop <= start {
        return 0;
    }

    let src_first = (((start - src_fstart) / src_rbw).round() as usize).min(src.len());
    let src_end = (((stop - src_fstart) / src_rbw).round() as usize).min(src.len());
    let dst_first = ((start - dst_fstart) / dst_rbw).round() as usize;
    if dst_first >= dst.len() || src_end <= src_first {
        return 0;
    }

    let n = (src_end - src_first).min(dst.len() - dst_first);
    dst[dst_first..dst_first + n].copy_from_slice(&src[src_first..src_first + n]);
    n
}

/// Power level separating noise-dominated bins from signal bins, dBm.
pub fn correction_threshold(freq_hz: f64, rbw: f64, attenuation: f64, config: &ExecutorConfig) -> f64 {
    THERMAL_NOISE_DBM_HZ
        + 10.0 * rbw.log10()
        + attenuation
        + config.noise_figure_db
        + config.noise_figure_slope_db_per_ghz * freq_hz / 1e9
        + config.threshold_margin_db
}

/// Add the signal curve to bins above `threshold` and the noise curve to the rest.
///
/// Curves are in capture order; `inverted` mirrors them to match a spectrum
/// whose frequency axis was flipped.
pub fn apply_corrections(
    spectrum: &mut [f64],
    noise: &[f64],
    signal: &[f64],
    threshold: f64,
    inverted: bool,
) {
    let pick = |curve: &[f64], i: usize| {
        let idx = if inverted { curve.len().checked_sub(i + 1) } else { Some(i) };
        idx.and_then(|idx| curve.get(idx)).copied().unwrap_or(0.0)
    };
    for (i, bin) in spectrum.iter_mut().enumerate() {
        *bin += if *bin > threshold { pick(signal, i) } else { pick(noise, i) };
    }
}
