//! Source trait for the async data channel

use crate::Result;
use crate::types::Packet;

/// Anything that yields decoded packets: a live socket, a recording on disk.
///
/// Sources handle their own timing; a replay may pace itself while a socket
/// simply waits for the instrument. The driver may drop a pending
/// `next_packet` future to service a command, so implementations must not
/// lose data when that happens.
#[async_trait::async_trait]
pub trait PacketSource: Send + 'static {
    /// Get the next packet
    ///
    /// Returns:
    /// - `Ok(Some(packet))` - packet available
    /// - `Ok(None)` - source closed on a packet boundary
    /// - `Err(e)` - transport or framing failure
    async fn next_packet(&mut self) -> Result<Option<Packet>>;

    /// Short label used in logs
    fn name(&self) -> &'static str;
}
