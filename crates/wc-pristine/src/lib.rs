// SPDX-License-Identifier: Apache-2.0
//! Content-addressed pristine blob store.
//!
//! Blobs are keyed by their SHA-1 content hash. A store additionally tracks
//! an auxiliary SHA-1 ↔ MD5 cross-map for legacy lookups: the MD5 mapping is
//! expected to be unique but this is a caller contract, not an invariant the
//! store enforces (see [`FsPristineStore::install`]).
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(unsafe_code)]

mod fs;

pub use fs::FsPristineStore;

use std::fmt;

use md5::{Digest as _, Md5};
use sha1::Sha1;
use thiserror::Error;

/// A 20-byte SHA-1 content hash.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Sha1Digest(pub [u8; 20]);

/// A 16-byte MD5 content hash, kept for legacy cross-lookups only.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Md5Digest(pub [u8; 16]);

impl Sha1Digest {
    /// Compute the SHA-1 digest of `bytes`.
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest);
        Self(out)
    }

    /// Parse a lowercase hex string into a digest.
    pub fn from_hex(s: &str) -> Option<Self> {
        parse_hex(s).map(Self)
    }

    /// The two-character shard prefix used for on-disk layout.
    pub fn shard(&self) -> String {
        format!("{:02x}{:02x}", self.0[0], self.0[1])
    }
}

impl Md5Digest {
    /// Compute the MD5 digest of `bytes`.
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Md5::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        let mut out = [0u8; 16];
        out.copy_from_slice(&digest);
        Self(out)
    }

    /// Parse a lowercase hex string into a digest.
    pub fn from_hex(s: &str) -> Option<Self> {
        parse_hex(s).map(Self)
    }
}

fn parse_hex<const N: usize>(s: &str) -> Option<[u8; N]> {
    if s.len() != N * 2 {
        return None;
    }
    let mut out = [0u8; N];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}

impl fmt::Display for Sha1Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Md5Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Errors raised by pristine store operations.
#[derive(Debug, Error)]
pub enum PristineError {
    /// The underlying I/O operation failed.
    #[error("pristine io error: {0}")]
    Io(#[from] std::io::Error),
    /// The blob content did not hash to the value the caller declared.
    #[error("pristine hash mismatch: expected {expected}, computed {computed}")]
    HashMismatch {
        /// The hash the caller declared.
        expected: Sha1Digest,
        /// The hash actually computed from the installed bytes.
        computed: Sha1Digest,
    },
    /// No blob is stored under this hash.
    #[error("pristine blob not found: {0}")]
    NotFound(Sha1Digest),
    /// The on-disk md5 index could not be parsed.
    #[error("pristine md5 index corrupt: {0}")]
    IndexCorrupt(String),
}

/// Result alias for pristine store operations.
pub type Result<T> = std::result::Result<T, PristineError>;

/// The verification depth requested of [`FsPristineStore::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    /// The blob file exists; content is not read.
    Exists,
    /// The blob exists and its file metadata looks usable (readable, non-empty
    /// permissions), without re-hashing content.
    ExpectedUsable,
    /// Like [`CheckMode::Exists`] but intended for checking many hashes in a
    /// single pass; callers should prefer [`FsPristineStore::check_batch`].
    BatchExists,
    /// The blob exists and its content is re-hashed and compared against the
    /// hash used to look it up.
    FullHash,
}

/// Outcome of a [`FsPristineStore::check`] or [`FsPristineStore::repair`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckResult {
    /// The blob satisfied the requested check.
    Ok,
    /// The blob is missing from disk.
    Missing,
    /// The blob exists but its content does not hash to the expected value.
    Corrupt,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn sha1_of_known_input() {
        let digest = Sha1Digest::of(b"abc");
        assert_eq!(digest.to_string(), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn md5_of_known_input() {
        let digest = Md5Digest::of(b"abc");
        assert_eq!(digest.to_string(), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn hex_round_trip() {
        let digest = Sha1Digest::of(b"round trip me");
        let hex = digest.to_string();
        let parsed = Sha1Digest::from_hex(&hex).unwrap();
        assert_eq!(digest, parsed);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        assert!(Sha1Digest::from_hex("abcd").is_none());
    }

    #[test]
    fn shard_is_first_two_bytes_as_hex() {
        let digest = Sha1Digest([0xab, 0xcd, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(digest.shard(), "abcd");
    }
}
