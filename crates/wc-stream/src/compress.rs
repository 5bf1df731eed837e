// SPDX-License-Identifier: Apache-2.0
//! DEFLATE-based compressed read/write adapters with a fixed internal buffer.
//!
//! Errors from the underlying `flate2`/`miniz_oxide` decoder are mapped onto
//! the stream error taxonomy rather than leaked as raw zlib codes.

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::{Result, Stream, StreamError};

const BUF_SIZE: usize = 4096;

/// Reads DEFLATE-compressed bytes from an inner [`Stream`], exposing the
/// decompressed content through [`Stream::read`].
pub struct DeflateReader<R> {
    decoder: DeflateDecoder<StreamReadAdapter<R>>,
}

impl<R: Stream> DeflateReader<R> {
    /// Wrap `inner`, decoding as it is read.
    pub fn new(inner: R) -> Self {
        Self {
            decoder: DeflateDecoder::new(StreamReadAdapter(inner)),
        }
    }
}

impl<R: Stream> Stream for DeflateReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.decoder.read(buf) {
            Ok(n) => Ok(n),
            Err(e) => Err(map_decode_error(e)),
        }
    }
}

fn map_decode_error(e: std::io::Error) -> StreamError {
    match e.kind() {
        std::io::ErrorKind::InvalidData => StreamError::MalformedData,
        std::io::ErrorKind::Unsupported => StreamError::UnrecognizedData,
        _ => StreamError::Io(e),
    }
}

/// Writes bytes through a DEFLATE encoder with a fixed `4 KiB` internal
/// buffer, forwarding compressed output to an inner [`Stream`].
pub struct DeflateWriter<W: Stream> {
    encoder: DeflateEncoder<StreamWriteAdapter<W>>,
}

impl<W: Stream> DeflateWriter<W> {
    /// Wrap `inner`, encoding as data is written.
    pub fn new(inner: W) -> Self {
        Self {
            encoder: DeflateEncoder::new(StreamWriteAdapter(inner), Compression::default()),
        }
    }

    /// Finish compression and return the inner stream.
    pub fn finish(self) -> Result<W> {
        let adapter = self.encoder.finish()?;
        Ok(adapter.0)
    }
}

impl<W: Stream> Stream for DeflateWriter<W> {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        let mut remaining = buf;
        while !remaining.is_empty() {
            let chunk = &remaining[..remaining.len().min(BUF_SIZE)];
            self.encoder.write_all(chunk)?;
            remaining = &remaining[chunk.len()..];
        }
        Ok(())
    }

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Err(StreamError::Io(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "deflate writer is write-only",
        )))
    }

    fn close(&mut self) -> Result<()> {
        self.encoder.flush()?;
        Ok(())
    }
}

/// Bridges a `wc_stream::Stream` to `std::io::Read` for use inside `flate2`.
struct StreamReadAdapter<S>(S);

impl<S: Stream> Read for StreamReadAdapter<S> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf).map_err(std::io::Error::other)
    }
}

/// Bridges a `wc_stream::Stream` to `std::io::Write` for use inside `flate2`.
struct StreamWriteAdapter<S>(S);

impl<S: Stream> Write for StreamWriteAdapter<S> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf).map_err(std::io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::MemStream;

    #[test]
    fn deflate_round_trip_all_byte_values() {
        let input: Vec<u8> = (0u8..=255).collect();

        let mut writer = DeflateWriter::new(MemStream::new());
        writer.write(&input).unwrap();
        writer.close().unwrap();
        let compressed = writer.finish().unwrap().into_bytes();

        let mut reader = DeflateReader::new(MemStream::from_bytes(compressed));
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, input);
    }

    #[test]
    fn deflate_reader_rejects_garbage() {
        let mut reader = DeflateReader::new(MemStream::from_bytes(vec![0xFF; 64]));
        let mut buf = [0u8; 16];
        let err = reader.read(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            StreamError::MalformedData | StreamError::UnrecognizedData | StreamError::Io(_)
        ));
    }
}
