//! Blocking packet reader
//!
//! Pulls exactly [`PacketFramer::bytes_needed`] bytes at a time from any
//! [`Read`] source, so a socket is never read past the end of the packet the
//! caller is waiting for.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::net::TcpStream;
//! use vrtsweep::vrt::PacketReader;
//!
//! fn dump() -> vrtsweep::Result<()> {
//!     let socket = TcpStream::connect("192.168.1.40:37000")?;
//!     let mut reader = PacketReader::new(socket);
//!     while let Some(packet) = reader.next_packet()? {
//!         println!("{:?} from {:?}", packet.header().packet_type, packet.stream_id());
//!     }
//!     Ok(())
//! }
//! ```

use std::io::{ErrorKind, Read};

use tracing::debug;

use super::decode::decode;
use super::framer::{PacketFramer, RawPacket};
use crate::types::Packet;
use crate::{Result, SweepError};

pub struct PacketReader<R> {
    reader: R,
    framer: PacketFramer,
    scratch: Vec<u8>,
}

impl<R: Read> PacketReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, framer: PacketFramer::new(), scratch: Vec::new() }
    }

    /// Next framed packet, or `None` when the source closed on a packet boundary.
    ///
    /// Closing anywhere else yields [`SweepError::EndOfStream`] with the byte
    /// counts of the step that could not be completed.
    pub fn next_raw(&mut self) -> Result<Option<RawPacket>> {
        loop {
            let need = self.framer.bytes_needed();
            self.scratch.resize(need, 0);
            let got = read_fully(&mut self.reader, &mut self.scratch)?;

            if got < need {
                if got == 0 && self.framer.is_idle() {
                    debug!(packets = self.framer.packets_framed(), "Data channel closed");
                    return Ok(None);
                }
                let bytes_received = self.framer.buffered() + got;
                let bytes_needed = bytes_received + (need - got);
                self.framer.reset();
                return Err(SweepError::EndOfStream { bytes_needed, bytes_received });
            }

            if let Some(raw) = self.framer.feed(&self.scratch)? {
                return Ok(Some(raw));
            }
        }
    }

    /// Next decoded packet.
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        match self.next_raw()? {
            Some(raw) => decode(&raw).map(Some),
            None => Ok(None),
        }
    }

    pub fn packets_read(&self) -> u64 {
        self.framer.packets_framed()
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> Iterator for PacketReader<R> {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_packet().transpose()
    }
}

/// Read until `buf` is full or the source reports end of file.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{data_packet_bytes, sample_stream};
    use crate::types::{IF_DATA_I14_STREAM_ID, Trailer};
    use std::io::Cursor;

    /// Hands out at most `limit` bytes per read call.
    struct Trickle {
        inner: Cursor<Vec<u8>>,
        limit: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.limit);
            self.inner.read(&mut buf[..n])
        }
    }

    #[test]
    fn reads_until_clean_end() {
        let stream = sample_stream(6);
        let reader = PacketReader::new(Trickle { inner: Cursor::new(stream), limit: 3 });
        let packets: Vec<_> = reader.collect::<Result<_>>().unwrap();
        assert_eq!(packets.len(), 6);
    }

    #[test]
    fn truncated_packet_reports_end_of_stream() {
        let bytes = data_packet_bytes(IF_DATA_I14_STREAM_ID, 0, &[0u8; 64], Trailer::default());
        let cut = bytes.len() - 10;
        let mut reader = PacketReader::new(Cursor::new(bytes[..cut].to_vec()));
        match reader.next_packet() {
            Err(SweepError::EndOfStream { bytes_needed, bytes_received }) => {
                // the payload step is 64 bytes; 58 arrived
                assert_eq!(bytes_needed, 64);
                assert_eq!(bytes_received, 58);
            }
            other => panic!("expected EndOfStream, got {other:?}"),
        }
    }

    #[test]
    fn empty_source_is_a_clean_end() {
        let mut reader = PacketReader::new(Cursor::new(Vec::new()));
        assert!(reader.next_packet().unwrap().is_none());
        assert_eq!(reader.packets_read(), 0);
    }
}
