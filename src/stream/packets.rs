//! Decoded packets as a `futures::Stream`

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tracing::{debug, trace};

use crate::types::Packet;
use crate::vrt::{PacketFramer, decode};
use crate::{Result, SweepError};

/// Bytes requested from the reader per poll
pub const READ_CHUNK_BYTES: usize = 64 * 1024;

pin_project! {
    /// Frames and decodes packets from any [`AsyncRead`].
    ///
    /// The reader is polled for whatever it has available; chunk boundaries
    /// never affect which packets come out. The stream ends after the first
    /// error, or with `None` when the reader closes on a packet boundary.
    pub struct PacketStream<R> {
        #[pin]
        reader: R,
        framer: PacketFramer,
        buf: Vec<u8>,
        done: bool,
    }
}

impl<R: AsyncRead> PacketStream<R> {
    pub fn new(reader: R) -> Self {
        Self::with_chunk_size(reader, READ_CHUNK_BYTES)
    }

    pub fn with_chunk_size(reader: R, chunk: usize) -> Self {
        Self { reader, framer: PacketFramer::new(), buf: vec![0; chunk.max(1)], done: false }
    }

    pub fn packets_framed(&self) -> u64 {
        self.framer.packets_framed()
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }
}

impl<R: AsyncRead> Stream for PacketStream<R> {
    type Item = Result<Packet>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if *this.done {
                return Poll::Ready(None);
            }

            // drain whatever is already buffered before reading more
            match this.framer.next_frame() {
                Ok(Some(raw)) => return Poll::Ready(Some(decode(&raw))),
                Ok(None) => {}
                Err(e) => {
                    *this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
            }

            let mut read_buf = ReadBuf::new(this.buf.as_mut_slice());
            if let Err(e) = ready!(this.reader.as_mut().poll_read(cx, &mut read_buf)) {
                *this.done = true;
                return Poll::Ready(Some(Err(SweepError::io("reading data channel", e))));
            }
            let filled = read_buf.filled();

            if filled.is_empty() {
                *this.done = true;
                if this.framer.is_idle() {
                    debug!(packets = this.framer.packets_framed(), "Data channel closed");
                    return Poll::Ready(None);
                }
                let bytes_received = this.framer.buffered();
                let bytes_needed = bytes_received + this.framer.bytes_needed();
                return Poll::Ready(Some(Err(SweepError::EndOfStream { bytes_needed, bytes_received })));
            }

            trace!(bytes = filled.len(), "Data channel read");
            match this.framer.feed(filled) {
                Ok(Some(raw)) => return Poll::Ready(Some(decode(&raw))),
                Ok(None) => {}
                Err(e) => {
                    *this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_stream;
    use crate::vrt::PacketReader;
    use futures::StreamExt;
    use std::io::Cursor;

    #[tokio::test]
    async fn matches_the_blocking_reader() {
        let bytes = sample_stream(30);
        let expected: Vec<Packet> =
            PacketReader::new(Cursor::new(bytes.clone())).collect::<Result<_>>().unwrap();

        for chunk in [1, 5, 64, READ_CHUNK_BYTES] {
            let stream = PacketStream::with_chunk_size(Cursor::new(bytes.clone()), chunk);
            let packets: Vec<Packet> = stream.map(|p| p.unwrap()).collect().await;
            assert_eq!(packets, expected, "chunk size {chunk}");
        }
    }

    #[tokio::test]
    async fn truncated_packet_is_end_of_stream() {
        let mut bytes = sample_stream(2);
        bytes.truncate(bytes.len() - 3);

        let mut stream = PacketStream::new(Cursor::new(bytes));
        assert!(stream.next().await.unwrap().is_ok());
        match stream.next().await {
            Some(Err(SweepError::EndOfStream { bytes_needed, bytes_received })) => {
                assert!(bytes_received < bytes_needed);
            }
            other => panic!("expected EndOfStream, got {other:?}"),
        }
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn empty_reader_ends_cleanly() {
        let mut stream = PacketStream::new(tokio::io::empty());
        assert!(stream.next().await.is_none());
        assert_eq!(stream.packets_framed(), 0);
    }
}
