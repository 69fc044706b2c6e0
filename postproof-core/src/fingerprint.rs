//! Content fingerprinting.
//!
//! Content is first reduced to a canonical byte sequence, then hashed:
//!
//! - strings and raw bytes pass through unchanged
//! - structured records are rendered as compact JSON with object keys sorted
//!   by code point at every depth, so key insertion order and formatting in
//!   the source never change the fingerprint
//!
//! The similarity score used for drift reporting lives here too, since it is
//! the other half of "does this content still match".

use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sha3::{Digest, Sha3_256};

use crate::error::{ProofError, Result};

/// Digest algorithm used for a fingerprint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha3_256,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha3_256 => "sha3-256",
        }
    }

    /// Digest width in bytes.
    pub fn digest_len(&self) -> usize {
        32
    }

    fn digest(&self, bytes: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(bytes).to_vec(),
            Self::Sha3_256 => Sha3_256::digest(bytes).to_vec(),
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HashAlgorithm {
    type Err = ProofError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sha256" => Ok(Self::Sha256),
            "sha3-256" => Ok(Self::Sha3_256),
            other => Err(ProofError::InvalidInput(format!(
                "unknown hash algorithm: {other}"
            ))),
        }
    }
}

/// Immutable fingerprint of canonicalized content.
///
/// Equality is exact on both the algorithm and the lowercase hex digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentFingerprint {
    pub algorithm: HashAlgorithm,
    pub hash_hex: String,
}

impl ContentFingerprint {
    /// Build a fingerprint from a hex digest, validating width and case.
    pub fn from_hex(algorithm: HashAlgorithm, hash_hex: &str) -> Result<Self> {
        let bytes = hex::decode(hash_hex)
            .map_err(|e| ProofError::InvalidInput(format!("invalid digest hex: {e}")))?;
        if bytes.len() != algorithm.digest_len() {
            return Err(ProofError::InvalidInput(format!(
                "{algorithm} digest must be {} bytes, got {}",
                algorithm.digest_len(),
                bytes.len()
            )));
        }
        Ok(Self {
            algorithm,
            hash_hex: hex::encode(bytes),
        })
    }

    /// Raw digest bytes.
    pub fn digest(&self) -> Result<Vec<u8>> {
        hex::decode(&self.hash_hex)
            .map_err(|e| ProofError::InvalidInput(format!("invalid digest hex: {e}")))
    }
}

impl std::fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hash_hex)
    }
}

/// Input accepted by the fingerprint service.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text(String),
    Bytes(Vec<u8>),
    Structured(serde_json::Value),
}

impl Content {
    /// Capture any serializable record as structured content.
    pub fn structured<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Self::Structured)
            .map_err(|e| ProofError::Serialization(e.to_string()))
    }

    /// Parse a JSON document into structured content.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map(Self::Structured)
            .map_err(|e| ProofError::Serialization(e.to_string()))
    }
}

/// Deterministically serialize content to bytes.
pub fn canonicalize(content: &Content) -> Result<Vec<u8>> {
    match content {
        Content::Text(text) => Ok(text.as_bytes().to_vec()),
        Content::Bytes(bytes) => Ok(bytes.clone()),
        Content::Structured(value) => {
            let mut out = String::new();
            write_canonical(value, &mut out)?;
            Ok(out.into_bytes())
        }
    }
}

/// Canonicalize any serializable record directly.
pub fn canonicalize_record<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    canonicalize(&Content::structured(value)?)
}

fn write_canonical(value: &serde_json::Value, out: &mut String) -> Result<()> {
    use serde_json::Value;

    match value {
        Value::Null | Value::Bool(_) => out.push_str(&value.to_string()),
        Value::Number(n) => {
            if n.as_f64().is_some_and(|f| !f.is_finite()) {
                return Err(ProofError::Serialization(
                    "non-finite number cannot be canonicalized".into(),
                ));
            }
            out.push_str(&n.to_string());
        }
        Value::String(s) => out.push_str(&encode_json_string(s)?),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&encode_json_string(key)?);
                out.push(':');
                write_canonical(item, out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn encode_json_string(s: &str) -> Result<String> {
    serde_json::to_string(s).map_err(|e| ProofError::Serialization(e.to_string()))
}

/// Hash canonical bytes, rendering the digest as lowercase hex.
pub fn hash(bytes: &[u8], algorithm: HashAlgorithm) -> ContentFingerprint {
    ContentFingerprint {
        algorithm,
        hash_hex: hex::encode(algorithm.digest(bytes)),
    }
}

/// Canonicalize and hash in one step with the default algorithm.
pub fn fingerprint(content: &Content) -> Result<ContentFingerprint> {
    Ok(hash(&canonicalize(content)?, HashAlgorithm::default()))
}

/// Edit-distance similarity between two strings, scaled to 0..=100.
///
/// Computed as `(max_len - distance) * 100 / max_len` with integer
/// division over Unicode scalar values, so one edit in three characters
/// scores 66. Two empty strings are identical (100).
pub fn similarity(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 100;
    }
    let distance = levenshtein(&a, &b);
    ((max_len - distance) * 100 / max_len) as u8
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_canonicalize_sorts_keys_at_every_depth() {
        let a = Content::from_json_str(r#"{"b": 1, "a": {"z": true, "y": [2, {"d": 0, "c": null}]}}"#)
            .unwrap();
        let bytes = canonicalize(&a).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":{"y":[2,{"c":null,"d":0}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn test_canonicalize_ignores_whitespace() {
        let compact = Content::from_json_str(r#"{"text":"hi","author":"ana"}"#).unwrap();
        let spaced = Content::from_json_str("{\n  \"author\" : \"ana\",\n  \"text\": \"hi\"\n}").unwrap();
        assert_eq!(canonicalize(&compact).unwrap(), canonicalize(&spaced).unwrap());
    }

    #[test]
    fn test_text_and_bytes_pass_through() {
        assert_eq!(canonicalize(&Content::Text("héllo".into())).unwrap(), "héllo".as_bytes());
        assert_eq!(canonicalize(&Content::Bytes(vec![0, 255, 7])).unwrap(), vec![0, 255, 7]);
    }

    #[test]
    fn test_non_serializable_input_is_rejected() {
        use std::collections::HashMap;
        // JSON object keys must be strings.
        let mut map = HashMap::new();
        map.insert(vec![1u8, 2], "value");
        let err = Content::structured(&map).unwrap_err();
        assert!(matches!(err, ProofError::Serialization(_)));
    }

    #[test]
    fn test_hash_known_vector() {
        let fp = hash(b"abc", HashAlgorithm::Sha256);
        assert_eq!(
            fp.hash_hex,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(fp.algorithm, HashAlgorithm::Sha256);
    }

    #[test]
    fn test_fingerprint_equality_requires_same_algorithm() {
        let a = hash(b"abc", HashAlgorithm::Sha256);
        let b = hash(b"abc", HashAlgorithm::Sha3_256);
        assert_ne!(a, b);
        assert_eq!(a, hash(b"abc", HashAlgorithm::Sha256));
    }

    #[test]
    fn test_from_hex_rejects_wrong_width() {
        assert!(ContentFingerprint::from_hex(HashAlgorithm::Sha256, "abcd").is_err());
        let fp = ContentFingerprint::from_hex(HashAlgorithm::Sha256, &"AB".repeat(32)).unwrap();
        assert_eq!(fp.hash_hex, "ab".repeat(32));
    }

    #[test]
    fn test_similarity_examples() {
        assert_eq!(similarity("abc", "abd"), 66);
        assert_eq!(similarity("kitten", "kitten"), 100);
        assert_eq!(similarity("", "anything"), 0);
        assert_eq!(similarity("", ""), 100);
        assert_eq!(similarity("kitten", "sitting"), 57);
    }

    #[test]
    fn test_similarity_counts_characters_not_bytes() {
        assert_eq!(similarity("café", "cafe"), 75);
    }

    proptest! {
        #[test]
        fn prop_similarity_symmetric(a in ".{0,24}", b in ".{0,24}") {
            prop_assert_eq!(similarity(&a, &b), similarity(&b, &a));
        }

        #[test]
        fn prop_similarity_identity(a in ".{1,32}") {
            prop_assert_eq!(similarity(&a, &a), 100);
        }

        #[test]
        fn prop_key_order_does_not_change_hash(
            entries in proptest::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..8)
        ) {
            let forward: String = entries
                .iter()
                .map(|(k, v)| format!("\"{k}\":{v}"))
                .collect::<Vec<_>>()
                .join(",");
            let backward: String = entries
                .iter()
                .rev()
                .map(|(k, v)| format!("\"{k}\": {v}"))
                .collect::<Vec<_>>()
                .join(" , ");
            let a = fingerprint(&Content::from_json_str(&format!("{{{forward}}}")).unwrap()).unwrap();
            let b = fingerprint(&Content::from_json_str(&format!("{{ {backward} }}")).unwrap()).unwrap();
            prop_assert_eq!(a, b);
        }
    }

    #[test]
    fn test_fingerprint_deterministic_for_records() {
        let record = json!({"author": "ana", "text": "hello", "tags": ["x", "y"]});
        let first = fingerprint(&Content::Structured(record.clone())).unwrap();
        let second = fingerprint(&Content::Structured(record)).unwrap();
        assert_eq!(first, second);
    }
}
