//! State of the one sweep that may be in flight

use std::collections::BTreeMap;

use crate::planner::SweepPlan;
use crate::types::ContextField;

use super::{CaptureRequest, SweepResult};

/// Per-sweep state, created at start and consumed at finalization
#[derive(Debug)]
pub struct SweepSession {
    pub sweep_id: u32,
    pub request: CaptureRequest,
    pub plan: SweepPlan,
    pub packets_received: u32,
    /// Composite spectrum, `plan.spectral_points` long, zero-filled at start
    pub spectrum: Vec<f64>,
    /// Most recent value of each context field
    pub context: BTreeMap<&'static str, ContextField>,
    /// Carrier reported since the previous data packet
    pub(super) pending_carrier: Option<f64>,
}

impl SweepSession {
    pub fn new(sweep_id: u32, request: CaptureRequest, plan: SweepPlan) -> Self {
        Self {
            sweep_id,
            request,
            spectrum: vec![0.0; plan.spectral_points],
            plan,
            packets_received: 0,
            context: BTreeMap::new(),
            pending_carrier: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.packets_received >= self.plan.step_count
    }

    pub fn reflevel(&self) -> Option<f64> {
        match self.context.get("reflevel") {
            Some(ContextField::RefLevel(level)) => Some(*level),
            _ => None,
        }
    }

    pub(super) fn record_context(&mut self, field: ContextField) {
        if let ContextField::RfFreq(hz) = field {
            self.pending_carrier = Some(hz);
        }
        self.context.insert(field.name(), field);
    }

    pub fn into_result(self) -> SweepResult {
        SweepResult {
            sweep_id: self.sweep_id,
            fstart: self.plan.bandstart,
            fstop: self.plan.bandstop,
            rbw: self.plan.rbw,
            spectrum: self.spectrum,
        }
    }
}
