//! Sweep execution
//!
//! [`SweepExecutor`] owns the single sweep session. It configures the device
//! from a plan, consumes decoded packets, correlates them by sweep identifier
//! and stitches corrected per-capture spectra into one composite buffer.
//!
//! The executor never reads from a transport itself. The blocking and
//! event-driven adapters in [`crate::sweeper`] feed it packets, so the
//! correction and stitching logic exists exactly once.
//!
//! ## State machine
//!
//! ```text
//!  Idle --start--> Planning --device configured--> AwaitingPackets
//!   ^                 |                                  |
//!   |              (error)                 packets_received == step_count
//!   |                 v                                  v
//!   +-------------- Idle <-------- result emitted --- Finalizing
//! ```

mod session;


use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

pub use session::SweepSession;

use crate::correction::{CorrectionVectors, fetch_correction_vectors};
use crate::device::{DeviceControl, DeviceProperties, DeviceSettings, RfeMode};
use crate::planner::{PlannedStep, SweepPlan, plan_sweep};
use crate::spectrum::{
    CaptureContext, SpectrumEngine, apply_corrections, copy_segment, correction_threshold,
};
use crate::types::{ContextField, ContextPacket, DataPacket, Packet};
use crate::{Result, SweepError};

fn default_correction_min_freq() -> f64 {
    1e9
}

fn default_noise_figure() -> f64 {
    10.0
}

fn default_noise_figure_slope() -> f64 {
    0.5
}

fn default_threshold_margin() -> f64 {
    6.0
}

/// Tunables of the correction model and sweep bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// SH captures at or above this carrier get calibration corrections, Hz
    #[serde(default = "default_correction_min_freq")]
    pub correction_min_freq: f64,
    #[serde(default = "default_noise_figure")]
    pub noise_figure_db: f64,
    #[serde(default = "default_noise_figure_slope")]
    pub noise_figure_slope_db_per_ghz: f64,
    #[serde(default = "default_threshold_margin")]
    pub threshold_margin_db: f64,
    #[serde(default)]
    pub initial_sweep_id: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            correction_min_freq: default_correction_min_freq(),
            noise_figure_db: default_noise_figure(),
            noise_figure_slope_db_per_ghz: default_noise_figure_slope(),
            threshold_margin_db: default_threshold_margin(),
            initial_sweep_id: 0,
        }
    }
}

impl ExecutorConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml_ng::from_str(yaml).map_err(|e| SweepError::config("executor config", e.to_string()))
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| SweepError::io(format!("reading {}", path.display()), e))?;
        Self::from_yaml(&yaml)
    }
}

/// A request for one composite power spectrum
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub fstart: f64,
    pub fstop: f64,
    pub rbw: f64,
    pub mode: RfeMode,
    #[serde(default)]
    pub settings: DeviceSettings,
    /// Re-arm after each result (event-driven discipline only)
    #[serde(default)]
    pub continuous: bool,
}

impl CaptureRequest {
    pub fn new(fstart: f64, fstop: f64, rbw: f64, mode: RfeMode) -> Self {
        Self { fstart, fstop, rbw, mode, settings: DeviceSettings::default(), continuous: false }
    }

    pub fn with_settings(mut self, settings: DeviceSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn continuous(mut self) -> Self {
        self.continuous = true;
        self
    }
}

/// Composite spectrum covering `[fstart, fstop)` at `rbw` per bin
#[derive(Debug, Clone, PartialEq)]
pub struct SweepResult {
    pub sweep_id: u32,
    pub fstart: f64,
    pub fstop: f64,
    pub rbw: f64,
    /// Power per bin in dBm
    pub spectrum: Vec<f64>,
}

impl SweepResult {
    /// Frequency at the lower edge of bin `i`
    pub fn bin_freq(&self, i: usize) -> f64 {
        self.fstart + i as f64 * self.rbw
    }
}

/// Outcome of [`SweepExecutor::start`]
#[derive(Debug, Clone, PartialEq)]
pub enum SweepStart {
    /// Device configured; packets are expected
    Started { sweep_id: u32 },
    /// Nothing to capture (empty range); the result is final already
    Complete(SweepResult),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    Idle,
    Planning,
    AwaitingPackets,
    Finalizing,
}

/// Drives one sweep at a time against a device and a spectrum engine.
pub struct SweepExecutor<D, E> {
    device: D,
    engine: E,
    props: DeviceProperties,
    corrections: CorrectionVectors,
    config: ExecutorConfig,
    state: SweepState,
    next_sweep_id: u32,
    session: Option<SweepSession>,
}

impl<D: DeviceControl, E: SpectrumEngine> SweepExecutor<D, E> {
    pub fn new(device: D, engine: E, props: DeviceProperties) -> Self {
        Self::with_config(device, engine, props, ExecutorConfig::default())
    }

    pub fn with_config(device: D, engine: E, props: DeviceProperties, config: ExecutorConfig) -> Self {
        Self {
            device,
            engine,
            props,
            corrections: CorrectionVectors::default(),
            next_sweep_id: config.initial_sweep_id,
            config,
            state: SweepState::Idle,
            session: None,
        }
    }

    pub fn set_corrections(&mut self, corrections: CorrectionVectors) {
        self.corrections = corrections;
    }

    /// Download calibration tables from the device; failures leave corrections empty.
    pub fn load_corrections(&mut self) {
        self.corrections = fetch_correction_vectors(&mut self.device);
        info!(
            noise = self.corrections.noise.is_some(),
            signal = self.corrections.signal.is_some(),
            "Correction vectors loaded"
        );
    }

    pub fn state(&self) -> SweepState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&SweepSession> {
        self.session.as_ref()
    }

    pub fn current_sweep_id(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.sweep_id)
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn properties(&self) -> &DeviceProperties {
        &self.props
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Plan a request against this executor's device properties.
    pub fn plan(&self, request: &CaptureRequest) -> Result<SweepPlan> {
        plan_sweep(request.fstart, request.fstop, request.rbw, request.mode, &request.settings, &self.props)
    }

    /// Begin a sweep. Fails with [`SweepError::SweepBusy`] while one is open.
    pub fn start(&mut self, request: &CaptureRequest) -> Result<SweepStart> {
        if let Some(session) = &self.session {
            return Err(SweepError::SweepBusy { sweep_id: session.sweep_id });
        }

        self.state = SweepState::Planning;
        let plan = match self.plan(request) {
            Ok(plan) => plan,
            Err(e) => {
                self.state = SweepState::Idle;
                return Err(e);
            }
        };

        let sweep_id = self.next_sweep_id;
        self.next_sweep_id = self.next_sweep_id.wrapping_add(1);

        if plan.is_empty() {
            self.state = SweepState::Idle;
            debug!(sweep_id, "Empty plan; nothing to capture");
            return Ok(SweepStart::Complete(SweepSession::new(sweep_id, *request, plan).into_result()));
        }

        if let Err(e) = self.configure_device(&plan, sweep_id) {
            warn!(sweep_id, error = %e, "Device setup failed");
            self.state = SweepState::Idle;
            return Err(e);
        }

        info!(
            sweep_id,
            fstart = plan.bandstart,
            fstop = plan.bandstop,
            rbw = plan.rbw,
            step_count = plan.step_count,
            "Sweep started"
        );
        self.session = Some(SweepSession::new(sweep_id, *request, plan));
        self.state = SweepState::AwaitingPackets;
        Ok(SweepStart::Started { sweep_id })
    }

    fn configure_device(&mut self, plan: &SweepPlan, sweep_id: u32) -> Result<()> {
        self.device.sweep_clear()?;
        for entry in plan.entries() {
            self.device.sweep_add(entry)?;
        }
        self.device.sweep_iterations(1)?;
        self.device.sweep_start(sweep_id)
    }

    /// Drop the open session, if any. Returns its sweep id.
    ///
    /// Used when the packet source closes mid-sweep.
    pub fn abandon(&mut self) -> Option<u32> {
        let session = self.session.take()?;
        self.state = SweepState::Idle;
        warn!(
            sweep_id = session.sweep_id,
            packets = session.packets_received,
            expected = session.plan.step_count,
            "Sweep abandoned"
        );
        Some(session.sweep_id)
    }

    /// End the open sweep after an error reading or decoding its packets.
    ///
    /// Both sweeper disciplines route transport errors through here. A
    /// disconnect only drops the session; any other error also aborts the
    /// device and flushes the data channel.
    pub fn stream_error(&mut self, err: SweepError) -> SweepError {
        if err.is_disconnect() {
            self.abandon();
            return err;
        }
        self.fail(err)
    }

    /// Abandon after a fatal error, stop the device and drop its queued packets.
    fn fail(&mut self, err: SweepError) -> SweepError {
        if self.abandon().is_none() {
            return err;
        }
        if let Err(abort_err) = self.device.abort() {
            warn!(error = %abort_err, "Device abort failed");
        }
        if let Err(flush_err) = self.device.flush() {
            warn!(error = %flush_err, "Data channel flush failed");
        }
        err
    }

    /// Feed one decoded packet. Returns the composite result when it completes the sweep.
    pub fn handle_packet(&mut self, packet: &Packet) -> Result<Option<SweepResult>> {
        if self.session.is_none() {
            debug!(stream = ?packet.stream_id(), "Ignoring packet outside a sweep");
            return Ok(None);
        }
        match packet {
            Packet::Context(ctx) => self.handle_context(ctx).map(|()| None),
            Packet::Data(data) => self.handle_data(data),
        }
    }

    fn handle_context(&mut self, ctx: &ContextPacket) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let Some(field) = &ctx.field else {
            return Ok(());
        };
        trace!(sweep_id = session.sweep_id, field = %field, "Context");

        if let ContextField::SweepId(found) = *field
            && found != session.sweep_id
        {
            let expected = session.sweep_id;
            return Err(self.fail(SweepError::ProtocolInconsistency { expected, found }));
        }
        session.record_context(field.clone());
        Ok(())
    }

    fn handle_data(&mut self, data: &DataPacket) -> Result<Option<SweepResult>> {
        match self.stitch(data) {
            Ok(true) => Ok(self.finalize()),
            Ok(false) => Ok(None),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Process one data packet into the composite. Returns true when the sweep is complete.
    fn stitch(&mut self, data: &DataPacket) -> Result<bool> {
        let Some(session) = self.session.as_mut() else {
            return Ok(false);
        };
        let index = session.packets_received;
        session.packets_received += 1;

        let Some(step) = session.plan.step_for_packet(index) else {
            warn!(sweep_id = session.sweep_id, index, "More data packets than planned");
            return Ok(session.is_complete());
        };

        let carrier = session.pending_carrier.take();
        let ctx = capture_context(session, &step, carrier, data.spectral_inversion());
        let mut spectrum = self.engine.power_spectrum(data, &ctx)?;

        let plan = &session.plan;
        if !step.dd && ctx.mode == RfeMode::Sh && ctx.center_freq >= self.config.correction_min_freq {
            let n = spectrum.len();
            let noise = self.corrections.noise_correction(ctx.center_freq, n);
            let signal = self.corrections.signal_correction(ctx.center_freq, n);
            let threshold =
                correction_threshold(ctx.center_freq, plan.rbw, ctx.attenuation, &self.config);
            apply_corrections(&mut spectrum, &noise, &signal, threshold, ctx.spectral_inversion);
        }

        let bin_bw = if spectrum.is_empty() { 0.0 } else { ctx.full_bw / spectrum.len() as f64 };
        let (segment, seg_start) = if step.dd && index == 0 {
            (&spectrum[..], plan.dd_start)
        } else {
            let usable = self.engine.usable_bins(&ctx, spectrum.len());
            let end = usable.end().min(spectrum.len());
            let start = usable.start.min(end);
            (&spectrum[start..end], ctx.start_freq() + start as f64 * bin_bw)
        };
        let seg_stop = seg_start + segment.len() as f64 * bin_bw;

        let written = copy_segment(
            segment,
            seg_start,
            seg_stop,
            &mut session.spectrum,
            plan.bandstart,
            plan.bandstop,
        );
        trace!(
            sweep_id = session.sweep_id,
            index,
            center = ctx.center_freq,
            written,
            "Stitched capture"
        );

        let dd_only = step.dd && !plan.beyond_dd;
        Ok(dd_only || session.is_complete())
    }

    fn finalize(&mut self) -> Option<SweepResult> {
        self.state = SweepState::Finalizing;
        let session = self.session.take()?;
        let result = session.into_result();
        self.state = SweepState::Idle;
        info!(
            sweep_id = result.sweep_id,
            points = result.spectrum.len(),
            "Sweep complete"
        );
        Some(result)
    }
}

/// Geometry of the capture that produced the packet at `step`.
fn capture_context(
    session: &SweepSession,
    step: &PlannedStep,
    carrier: Option<f64>,
    spectral_inversion: bool,
) -> CaptureContext {
    let plan = &session.plan;
    let settings = &session.request.settings;
    if step.dd {
        return CaptureContext {
            mode: RfeMode::Dd,
            center_freq: plan.dd_start + plan.dd_bw / 2.0,
            full_bw: plan.dd_bw,
            usable_bw: plan.dd_bw,
            rbw: plan.rbw,
            attenuation: settings.attenuation,
            reflevel: session.reflevel(),
            spectral_inversion,
            decimation: settings.decimation,
        };
    }
    CaptureContext {
        mode: step.mode,
        center_freq: carrier.unwrap_or(step.center),
        full_bw: plan.full_bw,
        usable_bw: plan.usable_bw,
        rbw: plan.rbw,
        attenuation: settings.attenuation,
        reflevel: session.reflevel(),
        spectral_inversion,
        decimation: settings.decimation,
    }
}
