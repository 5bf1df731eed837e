// SPDX-License-Identifier: Apache-2.0
//! The "skel" format: a nested list of byte-strings used to serialize
//! work-queue items, property maps, and conflict descriptors.
//!
//! Encoding is a length-prefixed atom (`<len>:<bytes>`) or a parenthesized
//! list of skels (`(<skel>...)`), with single spaces separating siblings.
//! This mirrors the textual skel format work-queue items are described in
//! terms of throughout `spec.md` §4.5/§9 closely enough to round-trip every
//! operation this crate needs, without inventing a binary framing of its own.

use std::fmt::Write as _;

use crate::{DbError, Result};

/// A skel value: either an opaque byte-string atom or an ordered list of
/// child skels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skel {
    /// An opaque byte string.
    Atom(Vec<u8>),
    /// An ordered list of child skels.
    List(Vec<Skel>),
}

impl Skel {
    /// Convenience constructor for a UTF-8 atom.
    pub fn atom(s: impl Into<Vec<u8>>) -> Self {
        Self::Atom(s.into())
    }

    /// Convenience constructor for a list of skels.
    pub fn list(items: impl IntoIterator<Item = Skel>) -> Self {
        Self::List(items.into_iter().collect())
    }

    /// View this skel as an atom's bytes, if it is one.
    pub fn as_atom(&self) -> Option<&[u8]> {
        match self {
            Self::Atom(bytes) => Some(bytes),
            Self::List(_) => None,
        }
    }

    /// View this skel as an atom decoded as UTF-8, if it is an atom and
    /// valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        self.as_atom().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// View this skel as a list of children, if it is one.
    pub fn as_list(&self) -> Option<&[Skel]> {
        match self {
            Self::List(items) => Some(items),
            Self::Atom(_) => None,
        }
    }

    /// Render the canonical textual encoding.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut String) {
        match self {
            Self::Atom(bytes) => {
                let _ = write!(out, "{}:", bytes.len());
                for b in bytes {
                    out.push(*b as char);
                }
            }
            Self::List(items) => {
                out.push('(');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    item.encode_into(out);
                }
                out.push(')');
            }
        }
    }

    /// Parse the canonical textual encoding produced by [`Skel::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError::SkelMalformed`] if `text` is not a single
    /// well-formed skel.
    pub fn parse(text: &str) -> Result<Self> {
        let bytes = text.as_bytes();
        let mut pos = 0usize;
        let skel = parse_one(bytes, &mut pos)?;
        if pos != bytes.len() {
            return Err(DbError::SkelMalformed("trailing data after skel".into()));
        }
        Ok(skel)
    }
}

fn parse_one(bytes: &[u8], pos: &mut usize) -> Result<Skel> {
    match bytes.get(*pos) {
        Some(b'(') => {
            *pos += 1;
            let mut items = Vec::new();
            loop {
                match bytes.get(*pos) {
                    Some(b')') => {
                        *pos += 1;
                        return Ok(Skel::List(items));
                    }
                    Some(b' ') => *pos += 1,
                    Some(_) => items.push(parse_one(bytes, pos)?),
                    None => return Err(DbError::SkelMalformed("unterminated list".into())),
                }
            }
        }
        Some(c) if c.is_ascii_digit() => {
            let start = *pos;
            while matches!(bytes.get(*pos), Some(c) if c.is_ascii_digit()) {
                *pos += 1;
            }
            let len_str = std::str::from_utf8(&bytes[start..*pos])
                .map_err(|_| DbError::SkelMalformed("non-utf8 length".into()))?;
            let len: usize = len_str
                .parse()
                .map_err(|_| DbError::SkelMalformed("invalid atom length".into()))?;
            if bytes.get(*pos) != Some(&b':') {
                return Err(DbError::SkelMalformed("expected ':' after atom length".into()));
            }
            *pos += 1;
            if *pos + len > bytes.len() {
                return Err(DbError::SkelMalformed("atom length exceeds input".into()));
            }
            let atom = bytes[*pos..*pos + len].to_vec();
            *pos += len;
            Ok(Skel::Atom(atom))
        }
        Some(_) => Err(DbError::SkelMalformed("unexpected character".into())),
        None => Err(DbError::SkelMalformed("unexpected end of input".into())),
    }
}

/// Concatenate two skels into one, preserving relative order.
///
/// - atom + atom → a two-element list
/// - atom + list → `a` prepended to `b`'s children
/// - list + atom → `b` appended to `a`'s children
/// - list + list → `b`'s children appended to `a`'s children
pub fn merge(a: Skel, b: Skel) -> Skel {
    match (a, b) {
        (Skel::Atom(a), Skel::Atom(b)) => Skel::List(vec![Skel::Atom(a), Skel::Atom(b)]),
        (Skel::Atom(a), Skel::List(mut b)) => {
            b.insert(0, Skel::Atom(a));
            Skel::List(b)
        }
        (Skel::List(mut a), Skel::Atom(b)) => {
            a.push(Skel::Atom(b));
            Skel::List(a)
        }
        (Skel::List(mut a), Skel::List(b)) => {
            a.extend(b);
            Skel::List(a)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn atom_round_trips() {
        let skel = Skel::atom("hello");
        let text = skel.encode();
        assert_eq!(text, "5:hello");
        assert_eq!(Skel::parse(&text).unwrap(), skel);
    }

    #[test]
    fn nested_list_round_trips() {
        let skel = Skel::list([Skel::atom("file-install"), Skel::atom("/a/b.txt"), Skel::list([Skel::atom("x")])]);
        let text = skel.encode();
        let parsed = Skel::parse(&text).unwrap();
        assert_eq!(parsed, skel);
    }

    #[test]
    fn parse_rejects_trailing_garbage() {
        assert!(Skel::parse("5:hello extra").is_err());
    }

    #[test]
    fn parse_rejects_truncated_atom() {
        assert!(Skel::parse("10:short").is_err());
    }

    #[test]
    fn merge_atom_atom_makes_pair() {
        let merged = merge(Skel::atom("a"), Skel::atom("b"));
        assert_eq!(merged, Skel::list([Skel::atom("a"), Skel::atom("b")]));
    }

    #[test]
    fn merge_list_list_appends_children() {
        let a = Skel::list([Skel::atom("1"), Skel::atom("2")]);
        let b = Skel::list([Skel::atom("3")]);
        let merged = merge(a, b);
        assert_eq!(merged, Skel::list([Skel::atom("1"), Skel::atom("2"), Skel::atom("3")]));
    }

    #[test]
    fn merge_atom_list_prepends() {
        let merged = merge(Skel::atom("0"), Skel::list([Skel::atom("1")]));
        assert_eq!(merged, Skel::list([Skel::atom("0"), Skel::atom("1")]));
    }
}
