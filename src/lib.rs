//! VRT packet decoding, sweep planning and spectrum stitching for networked
//! RF spectrum analyzers.
//!
//! The instrument streams VITA-49 style packets over a data channel while a
//! separate control channel programs sweeps. This crate frames and decodes
//! that stream, plans the device sweep entries that cover a requested
//! frequency range, and stitches per-packet power spectra into one composite
//! spectrum with calibration corrections applied.
//!
//! # Features
//!
//! - **Incremental framing**: [`vrt::PacketFramer`] accepts bytes in any chunking
//! - **Sweep planning**: [`plan_sweep`] covers a range with DD, main and end entries
//! - **Stitching**: [`SweepExecutor`] places usable bins and applies corrections
//! - **Two disciplines**: [`BlockingSweeper`] for threads, [`EventSweeper`] for event loops
//! - **Async**: [`SweepConnection`] runs a sweeper on a tokio task
//! - **Recording**: [`recording::Recorder`] writes replayable captures
//!
//! The FFT is not part of this crate; supply a [`SpectrumEngine`].
//!
//! ## Example (blocking)
//!
//! ```rust,no_run
//! use std::net::TcpStream;
//! use vrtsweep::{BlockingSweeper, CaptureRequest, DeviceProperties, RfeMode, SweepExecutor};
//! # use vrtsweep::{DeviceControl, SpectrumEngine};
//!
//! # fn run(device: impl DeviceControl, engine: impl SpectrumEngine) -> vrtsweep::Result<()> {
//! let data = TcpStream::connect("192.168.1.40:37000")?;
//! let executor = SweepExecutor::new(device, engine, DeviceProperties::r5500());
//! let mut sweeper = BlockingSweeper::new(data, executor);
//!
//! let result = sweeper.capture_power_spectrum(&CaptureRequest::new(2.4e9, 2.5e9, 10e3, RfeMode::Sh))?;
//! println!("{} bins, first at {} Hz", result.spectrum.len(), result.bin_freq(0));
//! # Ok(())
//! # }
//! ```

mod error;

#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;
pub mod vrt;

pub mod correction;
pub mod device;
pub mod executor;
pub mod planner;
pub mod recording;
pub mod spectrum;
pub mod sweeper;

// Async data channel
pub mod connection;
pub mod driver;
pub mod provider;
pub mod providers;
pub mod stream;

pub use error::*;
pub use types::{ContextField, Packet, StreamId};

pub use correction::CorrectionVectors;
pub use device::{DeviceControl, DeviceProperties, DeviceSettings, RfeMode};
pub use executor::{CaptureRequest, ExecutorConfig, SweepExecutor, SweepResult};
pub use planner::{SweepPlan, plan_sweep};
pub use spectrum::{CaptureContext, SpectrumEngine};
pub use sweeper::{BlockingSweeper, EventSweeper};
pub use vrt::decode_packet;

pub use connection::SweepConnection;
pub use provider::PacketSource;
