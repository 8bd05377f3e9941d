//! Source over any async byte stream (usually a TCP socket)

use futures::StreamExt;
use tokio::io::AsyncRead;

use crate::Result;
use crate::provider::PacketSource;
use crate::stream::PacketStream;
use crate::types::Packet;

pub struct StreamSource<R> {
    packets: PacketStream<R>,
}

impl<R: AsyncRead + Unpin + Send + 'static> StreamSource<R> {
    pub fn new(reader: R) -> Self {
        Self { packets: PacketStream::new(reader) }
    }

    pub fn packets_framed(&self) -> u64 {
        self.packets.packets_framed()
    }
}

#[async_trait::async_trait]
impl<R: AsyncRead + Unpin + Send + 'static> PacketSource for StreamSource<R> {
    async fn next_packet(&mut self) -> Result<Option<Packet>> {
        self.packets.next().await.transpose()
    }

    fn name(&self) -> &'static str {
        "stream"
    }
}
