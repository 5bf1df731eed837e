// SPDX-License-Identifier: Apache-2.0
//! Forwards every capability to an inner stream except `close`.

use crate::{Mark, Result, Stream};

/// Wraps a stream so that [`Stream::close`] is a no-op, letting a caller hand
/// out a stream without giving up ownership of its lifecycle (e.g. feeding a
/// long-lived stream into a helper that always closes what it's given).
pub struct DisownStream<S> {
    inner: S,
}

impl<S: Stream> DisownStream<S> {
    /// Wrap a downstream stream whose `close` should be suppressed.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Unwrap back into the downstream stream.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Stream> Stream for DisownStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.inner.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.inner.write(buf)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn mark(&mut self) -> Result<Mark> {
        self.inner.mark()
    }

    fn seek(&mut self, mark: Mark) -> Result<()> {
        self.inner.seek(mark)
    }

    fn reset(&mut self) -> Result<()> {
        self.inner.reset()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::MemStream;

    #[test]
    fn close_does_not_consume_or_close_the_inner_stream() {
        let mut disowned = DisownStream::new(MemStream::from_bytes(b"kept".to_vec()));
        disowned.close().unwrap();
        let inner = disowned.into_inner();
        assert_eq!(inner.into_bytes(), b"kept");
    }

    #[test]
    fn read_and_write_pass_through_to_inner() {
        let mut disowned = DisownStream::new(MemStream::new());
        disowned.write(b"hello").unwrap();
        let inner = disowned.into_inner();
        assert_eq!(inner.into_bytes(), b"hello");

        let mut disowned = DisownStream::new(MemStream::from_bytes(b"hello".to_vec()));
        let mut buf = [0u8; 5];
        let n = disowned.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[test]
    fn mark_and_seek_pass_through_to_inner() {
        let mut disowned = DisownStream::new(MemStream::from_bytes(b"abcdef".to_vec()));
        let mut buf = [0u8; 3];
        disowned.read(&mut buf).unwrap();
        let mark = disowned.mark().unwrap();
        disowned.read(&mut buf).unwrap();
        disowned.seek(mark).unwrap();
        let n = disowned.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"def");
    }
}
