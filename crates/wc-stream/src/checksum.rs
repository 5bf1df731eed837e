// SPDX-License-Identifier: Apache-2.0
//! Stream adapter that updates a running digest as bytes pass through it.

use md5::Md5;
use sha1::{Digest as _, Sha1};

use crate::{Result, Stream};

/// Which hash family a [`ChecksummedStream`] should maintain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    /// SHA-1, the pristine store's primary key.
    Sha1,
    /// MD5, kept for the pristine store's legacy cross-map.
    Md5,
}

/// A finalized digest, rendered as lowercase hex for logging/paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest(pub Vec<u8>);

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

enum Hasher {
    Sha1(Sha1),
    Md5(Md5),
}

impl Hasher {
    fn new(kind: ChecksumKind) -> Self {
        match kind {
            ChecksumKind::Sha1 => Self::Sha1(Sha1::new()),
            ChecksumKind::Md5 => Self::Md5(Md5::new()),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Sha1(h) => h.update(bytes),
            Self::Md5(h) => h.update(bytes),
        }
    }

    fn finalize(self) -> Digest {
        match self {
            Self::Sha1(h) => Digest(h.finalize().to_vec()),
            Self::Md5(h) => Digest(h.finalize().to_vec()),
        }
    }
}

/// Wraps an inner stream, updating a running digest on every `read` and/or
/// `write`. At [`Stream::close`] the digest is finalized; callers retrieve
/// it with [`ChecksummedStream::digest`] (only valid after `close`).
pub struct ChecksummedStream<S> {
    inner: S,
    read_hasher: Option<Hasher>,
    write_hasher: Option<Hasher>,
    digest: Option<Digest>,
    write_digest: Option<Digest>,
}

impl<S: Stream> ChecksummedStream<S> {
    /// Track a digest over bytes read from `inner`.
    pub fn on_read(inner: S, kind: ChecksumKind) -> Self {
        Self {
            inner,
            read_hasher: Some(Hasher::new(kind)),
            write_hasher: None,
            digest: None,
            write_digest: None,
        }
    }

    /// Track a digest over bytes written to `inner`.
    pub fn on_write(inner: S, kind: ChecksumKind) -> Self {
        Self {
            inner,
            read_hasher: None,
            write_hasher: Some(Hasher::new(kind)),
            digest: None,
            write_digest: None,
        }
    }

    /// The finalized read-side digest. Panics-free: returns `None` until
    /// `close` has run or if this stream was not tracking reads.
    pub fn digest(&self) -> Option<&Digest> {
        self.digest.as_ref()
    }

    /// The finalized write-side digest, if this stream was tracking writes.
    pub fn write_digest(&self) -> Option<&Digest> {
        self.write_digest.as_ref()
    }

    /// Drain any remaining input so the read digest reflects the whole
    /// stream even if the caller stopped short of EOF.
    pub fn drain(&mut self) -> Result<()> {
        let mut buf = [0u8; 8192];
        loop {
            let n = self.read(&mut buf)?;
            if n == 0 {
                return Ok(());
            }
        }
    }
}

impl<S: Stream> Stream for ChecksummedStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            if let Some(h) = &mut self.read_hasher {
                h.update(&buf[..n]);
            }
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        if let Some(h) = &mut self.write_hasher {
            h.update(buf);
        }
        self.inner.write(buf)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(h) = self.read_hasher.take() {
            self.digest = Some(h.finalize());
        }
        if let Some(h) = self.write_hasher.take() {
            self.write_digest = Some(h.finalize());
        }
        self.inner.close()
    }
}
