// SPDX-License-Identifier: Apache-2.0
//! Generic byte-stream abstraction used throughout the working-copy engine.
//!
//! A [`Stream`] is a polymorphic handle with capabilities {read, write, close,
//! reset, mark, seek, line-filter, line-transformer}. Not every adapter
//! supports every capability; calling an unsupported one returns
//! [`StreamError::ResetNotSupported`] or [`StreamError::SeekNotSupported`]
//! rather than panicking.

mod checksum;
mod compress;
mod disown;
mod file;
mod mem;
mod tee;

pub use checksum::{ChecksumKind, ChecksummedStream, Digest};
pub use compress::{DeflateReader, DeflateWriter};
pub use disown::DisownStream;
pub use file::FileStream;
pub use mem::{EmptyStream, MemStream};
pub use tee::TeeStream;

use std::io;
use thiserror::Error;

/// Errors raised by stream adapters.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The underlying I/O operation failed.
    #[error("stream io error: {0}")]
    Io(#[from] io::Error),
    /// `reset` was called on a stream that never recorded a mark.
    #[error("stream reset not supported")]
    ResetNotSupported,
    /// `seek`/`mark` was called on a stream that does not support random access.
    #[error("stream seek not supported")]
    SeekNotSupported,
    /// A write did not consume the entire buffer.
    #[error("short write: wrote {wrote} of {requested} bytes")]
    ShortWrite {
        /// Bytes actually written.
        wrote: usize,
        /// Bytes the caller asked to write.
        requested: usize,
    },
    /// Compressed input could not be parsed as a valid stream.
    #[error("stream malformed data")]
    MalformedData,
    /// Compressed input used a format/flag this decoder does not recognize.
    #[error("stream unrecognized data")]
    UnrecognizedData,
    /// The operation was cancelled by the caller's cancel callback.
    #[error("operation cancelled")]
    Cancelled,
}

/// Result alias for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;

/// An opaque position token produced by [`Stream::mark`] and consumed by
/// [`Stream::seek`] to rewind a stream to that exact position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark(pub u64);

/// End-of-line convention used by [`Stream::readline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eol {
    /// `\n`
    Lf,
    /// `\r\n`
    CrLf,
    /// `\r`
    Cr,
    /// Scan the first line, then rewind via mark/seek to determine the
    /// terminator actually present.
    Detect,
}

/// Drops a line if the filter returns `true`.
pub type LineFilter<'a> = dyn Fn(&[u8]) -> bool + 'a;
/// Substitutes a line's bytes before it is returned from `readline`.
pub type LineTransformer<'a> = dyn Fn(Vec<u8>) -> Vec<u8> + 'a;

/// Optional cooperative-cancellation callback threaded through long-running
/// operations such as [`copy`].
pub type CancelFn<'a> = dyn Fn() -> bool + 'a;

/// Generic capability surface for a byte stream.
///
/// Implementors are free to make any subset of these methods a hard error;
/// the default implementations here all fail with the matching
/// "not supported" variant so adapters only need to override what they
/// actually provide.
pub trait Stream {
    /// Read up to `buf.len()` bytes. A return value shorter than `buf.len()`
    /// signals end of input for this call (not necessarily end of stream).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write the entire buffer or fail.
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        let _ = buf;
        Err(StreamError::Io(io::Error::new(
            io::ErrorKind::Unsupported,
            "write not supported",
        )))
    }

    /// Flush and release any resources held by the stream.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Record the current position for a later [`Stream::seek`].
    fn mark(&mut self) -> Result<Mark> {
        Err(StreamError::SeekNotSupported)
    }

    /// Restore the stream to a position previously returned by [`Stream::mark`].
    fn seek(&mut self, mark: Mark) -> Result<()> {
        let _ = mark;
        Err(StreamError::SeekNotSupported)
    }

    /// Rewind to the start of the stream; the default maps to `reset not
    /// supported` for adapters with no concept of "start" (e.g. pipes).
    fn reset(&mut self) -> Result<()> {
        Err(StreamError::ResetNotSupported)
    }

    /// Read bytes up to and including a line terminator, stripping the
    /// terminator from the returned line. Returns `(line, eof)`.
    ///
    /// When `eol` is [`Eol::Detect`], the implementation scans byte-by-byte
    /// looking for `\n` or `\r`, marking the start position first so it can
    /// seek back if the stream does not support lookahead without consuming.
    /// The default implementation reads one byte at a time through
    /// [`Stream::read`], which is correct for every adapter in this crate
    /// but not necessarily fast for adapters backed by unbuffered I/O.
    fn readline(
        &mut self,
        eol: Eol,
        filter: Option<&LineFilter<'_>>,
        transform: Option<&LineTransformer<'_>>,
    ) -> Result<(Vec<u8>, bool)> {
        loop {
            let (raw, eof) = read_raw_line(self, eol)?;
            if let Some(f) = filter {
                if f(&raw) {
                    if eof {
                        return Ok((Vec::new(), true));
                    }
                    continue;
                }
            }
            let line = match transform {
                Some(t) => t(raw),
                None => raw,
            };
            return Ok((line, eof));
        }
    }
}

fn read_raw_line<S: Stream + ?Sized>(stream: &mut S, eol: Eol) -> Result<(Vec<u8>, bool)> {
    let mut out = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte)?;
        if n == 0 {
            return Ok((out, true));
        }
        let b = byte[0];
        match eol {
            Eol::Lf if b == b'\n' => return Ok((out, false)),
            Eol::Cr if b == b'\r' => return Ok((out, false)),
            Eol::CrLf if b == b'\n' && out.last() == Some(&b'\r') => {
                out.pop();
                return Ok((out, false));
            }
            Eol::Detect if b == b'\n' => {
                if out.last() == Some(&b'\r') {
                    out.pop();
                }
                return Ok((out, false));
            }
            _ => out.push(b),
        }
    }
}

/// Copy `from` into `to` in fixed-size chunks, closing both streams
/// afterward and composing any close error with the copy error.
pub fn copy<R: Stream + ?Sized, W: Stream + ?Sized>(
    from: &mut R,
    to: &mut W,
    cancel: Option<&CancelFn<'_>>,
) -> Result<u64> {
    const CHUNK: usize = 64 * 1024;
    let mut buf = vec![0u8; CHUNK];
    let mut total = 0u64;
    let copy_result = (|| -> Result<u64> {
        loop {
            if let Some(c) = cancel {
                if c() {
                    return Err(StreamError::Cancelled);
                }
            }
            let n = from.read(&mut buf)?;
            if n == 0 {
                return Ok(total);
            }
            to.write(&buf[..n])?;
            total += n as u64;
        }
    })();
    let close_from = from.close();
    let close_to = to.close();
    match (copy_result, close_from, close_to) {
        (Ok(n), Ok(()), Ok(())) => Ok(n),
        (Err(e), _, _) | (Ok(_), Err(e), _) | (Ok(_), Ok(()), Err(e)) => Err(e),
    }
}

/// Read from `stream` until `buf` is completely full or the stream truly
/// ends, to make short reads from one call invisible to the caller.
fn read_fill<S: Stream + ?Sized>(stream: &mut S, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Read both streams in fixed-size chunks and return `true` iff every chunk
/// agreed, consuming both streams fully in the process.
///
/// Each side is filled independently via [`read_fill`] before the two
/// chunks are compared, so a stream whose `read` returns short reads (e.g. a
/// file stream making one `read(2)` call per chunk) compares equal to one
/// that always returns a full chunk, as long as the underlying bytes match.
pub fn contents_same<A: Stream + ?Sized, B: Stream + ?Sized>(a: &mut A, b: &mut B) -> Result<bool> {
    const CHUNK: usize = 64 * 1024;
    let mut buf_a = vec![0u8; CHUNK];
    let mut buf_b = vec![0u8; CHUNK];
    loop {
        let na = read_fill(a, &mut buf_a)?;
        let nb = read_fill(b, &mut buf_b)?;
        if na != nb {
            return Ok(false);
        }
        if na == 0 {
            return Ok(true);
        }
        if buf_a[..na] != buf_b[..na] {
            return Ok(false);
        }
    }
}
