// SPDX-License-Identifier: Apache-2.0
//! In-memory stream backed by a growable `Vec<u8>` plus an empty no-op stream.

use crate::{Mark, Result, Stream, StreamError};

/// An in-memory byte buffer that can be both written to and read back from.
///
/// Supports `mark`/`seek`/`reset` exactly (it is a plain cursor over a
/// `Vec<u8>`), unlike pipe-backed adapters.
pub struct MemStream {
    buf: Vec<u8>,
    pos: usize,
}

impl MemStream {
    /// An empty, writable buffer.
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
        }
    }

    /// A buffer pre-seeded with `bytes`, read cursor at the start.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { buf: bytes, pos: 0 }
    }

    /// Consume the stream and return its accumulated bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for MemStream {
    fn default() -> Self {
        Self::new()
    }
}

impl Stream for MemStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let available = &self.buf[self.pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        if self.pos == self.buf.len() {
            self.buf.extend_from_slice(buf);
        } else {
            let end = self.pos + buf.len();
            if end > self.buf.len() {
                self.buf.resize(end, 0);
            }
            self.buf[self.pos..end].copy_from_slice(buf);
        }
        self.pos += buf.len();
        Ok(())
    }

    fn mark(&mut self) -> Result<Mark> {
        Ok(Mark(self.pos as u64))
    }

    fn seek(&mut self, mark: Mark) -> Result<()> {
        let pos = usize::try_from(mark.0).unwrap_or(usize::MAX);
        if pos > self.buf.len() {
            return Err(StreamError::SeekNotSupported);
        }
        self.pos = pos;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }
}

/// A stream that reads as empty and discards every write; used as a
/// placeholder `apply_textdelta` window consumer for excluded files (see
/// `wc-editor`).
pub struct EmptyStream;

impl Stream for EmptyStream {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Ok(0)
    }

    fn write(&mut self, _buf: &[u8]) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trip() {
        let mut s = MemStream::new();
        s.write(b"hello").unwrap();
        s.reset().unwrap();
        let mut out = [0u8; 5];
        let n = s.read(&mut out).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn mark_and_seek_restore_position() {
        let mut s = MemStream::from_bytes(b"0123456789".to_vec());
        let mut first = [0u8; 3];
        s.read(&mut first).unwrap();
        let mark = s.mark().unwrap();
        let mut skip = [0u8; 3];
        s.read(&mut skip).unwrap();
        s.seek(mark).unwrap();
        let mut again = [0u8; 3];
        s.read(&mut again).unwrap();
        assert_eq!(skip, again);
    }

    #[test]
    fn empty_stream_reads_zero_and_swallows_writes() {
        let mut e = EmptyStream;
        let mut buf = [0u8; 8];
        assert_eq!(e.read(&mut buf).unwrap(), 0);
        e.write(b"discarded").unwrap();
    }
}
