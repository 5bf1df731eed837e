// SPDX-License-Identifier: Apache-2.0
//! Property-map (de)serialization on top of the skel format.

use std::collections::BTreeMap;

use crate::{DbError, Result, Skel};

/// A property map: name → opaque value bytes. Stored in `BTreeMap` so the
/// skel encoding is deterministic (useful for tests and for diffing two
/// dumps of the same node).
pub type Props = BTreeMap<String, Vec<u8>>;

pub fn encode(props: &Props) -> String {
    let skel = Skel::list(
        props
            .iter()
            .map(|(name, value)| Skel::list([Skel::atom(name.as_bytes().to_vec()), Skel::atom(value.clone())])),
    );
    skel.encode()
}

pub fn decode(text: &str) -> Result<Props> {
    if text.is_empty() {
        return Ok(Props::new());
    }
    let skel = Skel::parse(text)?;
    let entries = skel
        .as_list()
        .ok_or_else(|| DbError::SkelMalformed("property map is not a list".into()))?;
    let mut props = Props::new();
    for entry in entries {
        let pair = entry
            .as_list()
            .ok_or_else(|| DbError::SkelMalformed("property entry is not a pair".into()))?;
        let [name, value] = pair else {
            return Err(DbError::SkelMalformed("property entry must have exactly 2 elements".into()));
        };
        let name = name
            .as_str()
            .ok_or_else(|| DbError::SkelMalformed("property name is not utf-8".into()))?
            .to_string();
        let value = value.as_atom().ok_or_else(|| DbError::SkelMalformed("property value is not an atom".into()))?;
        props.insert(name, value.to_vec());
    }
    Ok(props)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_props_round_trip() {
        let props = Props::new();
        let text = encode(&props);
        assert_eq!(decode(&text).unwrap(), props);
    }

    #[test]
    fn props_round_trip() {
        let mut props = Props::new();
        props.insert("svn:executable".to_string(), b"*".to_vec());
        props.insert("svn:mime-type".to_string(), b"text/plain".to_vec());
        let text = encode(&props);
        assert_eq!(decode(&text).unwrap(), props);
    }

    #[test]
    fn decode_rejects_malformed_skel() {
        assert!(decode("not a skel").is_err());
    }
}
