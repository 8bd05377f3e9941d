//! Error types for packet decoding and sweep execution.
//!
//! Every fallible operation in the crate returns [`SweepError`]. Variants carry
//! structured context so callers can tell a disconnected instrument apart from
//! a protocol violation, and decide whether retrying makes sense.
//!
//! ## Error Categories
//!
//! - **Protocol Errors**: malformed VRT packets, sweep identifier mismatches
//! - **Stream Errors**: the byte source closed mid-packet or mid-sweep
//! - **Session Errors**: a capture was requested while another is in flight
//! - **Calibration Errors**: correction-vector blobs that cannot be parsed
//! - **Collaborator Errors**: device control channel and transport failures
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use vrtsweep::SweepError;
//!
//! let error = SweepError::SweepBusy { sweep_id: 7 };
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use thiserror::Error;

/// Result type alias for sweep and protocol operations.
pub type Result<T, E = SweepError> = std::result::Result<T, E>;

/// Main error type for the crate.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SweepError {
    #[error("Malformed VRT packet ({context}): {details}")]
    MalformedPacket { context: String, details: String },

    #[error("Stream ended with {bytes_received} of {bytes_needed} required bytes")]
    EndOfStream { bytes_needed: usize, bytes_received: usize },

    #[error("Sweep {sweep_id} is still in progress")]
    SweepBusy { sweep_id: u32 },

    #[error("Sweep identifier mismatch: expected {expected}, stream reported {found}")]
    ProtocolInconsistency { expected: u32, found: u32 },

    #[error("Invalid correction data: {details}")]
    InvalidCorrectionData { details: String },

    #[error("Invalid capture request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Device operation failed: {operation}")]
    Device {
        operation: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("I/O error while {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error in {context}: {details}")]
    Config { context: String, details: String },

    #[error("Sweep driver is no longer running")]
    Disconnected,
}

impl SweepError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            SweepError::SweepBusy { .. } => true,
            SweepError::Device { .. } => true,
            SweepError::Io { .. } => true,
            SweepError::EndOfStream { .. } => true,
            SweepError::MalformedPacket { .. } => false,
            SweepError::ProtocolInconsistency { .. } => false,
            SweepError::InvalidCorrectionData { .. } => false,
            SweepError::InvalidRequest { .. } => false,
            SweepError::Config { .. } => false,
            SweepError::Disconnected => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            SweepError::MalformedPacket { .. } => vec![
                "Reconnect the data channel to resynchronize on a packet boundary",
                "Verify the instrument firmware speaks the expected VRT dialect",
            ],
            SweepError::EndOfStream { .. } => vec![
                "Check the instrument is still powered and reachable",
                "Reconnect the data channel and restart the sweep",
            ],
            SweepError::SweepBusy { .. } => vec![
                "Wait for the current sweep to finish before starting another",
                "Close the connection to abandon the in-flight sweep",
            ],
            SweepError::ProtocolInconsistency { .. } => vec![
                "Flush stale packets from the data channel before capturing",
                "Restart the sweep to obtain a fresh sweep identifier",
            ],
            SweepError::InvalidCorrectionData { .. } => vec![
                "Re-download the calibration vectors from the instrument",
                "Continue without corrections; results will be uncalibrated",
            ],
            SweepError::InvalidRequest { .. } => vec![
                "Ensure the start frequency does not exceed the stop frequency",
                "Use a positive resolution bandwidth",
            ],
            SweepError::Device { .. } => vec![
                "Check the control channel connection",
                "Retry the command after the instrument finishes its current task",
            ],
            SweepError::Io { .. } => vec![
                "Check network connectivity to the instrument",
                "Verify file paths and permissions for recordings",
            ],
            SweepError::Config { .. } => vec![
                "Check the configuration file syntax",
                "Compare field names against the documented schema",
            ],
            SweepError::Disconnected => vec![
                "Open a new connection",
                "Check the logs for the error that stopped the driver",
            ],
        }
    }

    /// Helper constructor for malformed packet errors.
    pub fn malformed(context: impl Into<String>, details: impl Into<String>) -> Self {
        SweepError::MalformedPacket { context: context.into(), details: details.into() }
    }

    /// Helper constructor for correction data errors.
    pub fn invalid_correction(details: impl Into<String>) -> Self {
        SweepError::InvalidCorrectionData { details: details.into() }
    }

    /// Helper constructor for rejected capture requests.
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        SweepError::InvalidRequest { reason: reason.into() }
    }

    /// Helper constructor for device errors without an underlying cause.
    pub fn device_failed(operation: impl Into<String>) -> Self {
        SweepError::Device { operation: operation.into(), source: None }
    }

    /// Helper constructor for device errors with source.
    pub fn device_failed_with_source(
        operation: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        SweepError::Device { operation: operation.into(), source: Some(source) }
    }

    /// Helper constructor for I/O errors with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::UnexpectedEof {
            return SweepError::EndOfStream { bytes_needed: 0, bytes_received: 0 };
        }
        SweepError::Io { context: context.into(), source }
    }

    /// Helper constructor for configuration errors.
    pub fn config(context: impl Into<String>, details: impl Into<String>) -> Self {
        SweepError::Config { context: context.into(), details: details.into() }
    }

    /// True when the error means the byte source went away rather than misbehaved.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, SweepError::EndOfStream { .. } | SweepError::Disconnected)
    }
}

impl From<std::io::Error> for SweepError {
    fn from(err: std::io::Error) -> Self {
        SweepError::io("reading from the data channel", err)
    }
}
