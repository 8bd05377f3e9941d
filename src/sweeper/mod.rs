//! The two I/O disciplines around [`crate::executor::SweepExecutor`].
//!
//! - [`BlockingSweeper`] reads the data channel on the calling thread and
//!   returns the composite from `capture_power_spectrum`.
//! - [`EventSweeper`] is driven by an event loop through `on_packet` /
//!   `on_bytes` and reports composites through a callback.
//!
//! Both hand every packet to the same executor; neither contains any
//! stitching or correction logic of its own.

mod blocking;
mod event;

pub use blocking::BlockingSweeper;
pub use event::{EventSweeper, ResultCallback};
