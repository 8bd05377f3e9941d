//! [`crate::provider::PacketSource`] implementations

pub mod replay;
pub mod stream;

pub use replay::ReplaySource;
pub use stream::StreamSource;
