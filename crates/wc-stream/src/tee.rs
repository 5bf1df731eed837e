// SPDX-License-Identifier: Apache-2.0
//! Duplicates every write to two downstream streams.

use crate::{Result, Stream};

/// Forwards every `write` to both `a` and `b`; `read` is not supported since
/// a tee only makes sense as a write-side fan-out (e.g. writing a working
/// file while simultaneously feeding a checksum stream).
pub struct TeeStream<A, B> {
    a: A,
    b: B,
}

impl<A: Stream, B: Stream> TeeStream<A, B> {
    /// Wrap two downstream streams.
    pub fn new(a: A, b: B) -> Self {
        Self { a, b }
    }

    /// Unwrap back into the two downstream streams.
    pub fn into_inner(self) -> (A, B) {
        (self.a, self.b)
    }
}

impl<A: Stream, B: Stream> Stream for TeeStream<A, B> {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Err(crate::StreamError::Io(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "tee stream is write-only",
        )))
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.a.write(buf)?;
        self.b.write(buf)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let ra = self.a.close();
        let rb = self.b.close();
        ra.and(rb)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::MemStream;

    #[test]
    fn write_lands_in_both_downstreams() {
        let mut tee = TeeStream::new(MemStream::new(), MemStream::new());
        tee.write(b"duplicate me").unwrap();
        let (a, b) = tee.into_inner();
        assert_eq!(a.into_bytes(), b"duplicate me");
        assert_eq!(b.into_bytes(), b"duplicate me");
    }
}
