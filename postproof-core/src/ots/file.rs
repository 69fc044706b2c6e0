//! Detached proof files: header, digest op, digest, tree.

use super::codec::{corrupt, write_varuint, ProofReader};
use super::op::Op;
use super::timestamp::Timestamp;
use crate::error::{ProofError, Result, CURRENT_PROOF_VERSION, MAX_PROOF_SIZE, PROOF_HEADER_MAGIC};
use crate::fingerprint::{ContentFingerprint, HashAlgorithm};

/// A proof for one digest, as stored in a record's proof blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedTimestampFile {
    /// Hash operation that produced the digest
    pub file_hash_op: Op,
    /// Tree rooted at the digest
    pub timestamp: Timestamp,
}

impl DetachedTimestampFile {
    /// Start an empty proof for a fingerprint.
    pub fn for_fingerprint(fingerprint: &ContentFingerprint) -> Result<Self> {
        let op = match fingerprint.algorithm {
            HashAlgorithm::Sha256 => Op::Sha256,
            other => {
                return Err(ProofError::InvalidInput(format!(
                    "calendar proofs require a sha256 fingerprint, got {other}"
                )))
            }
        };
        Ok(Self {
            file_hash_op: op,
            timestamp: Timestamp::new(fingerprint.digest()?),
        })
    }

    pub fn digest(&self) -> &[u8] {
        &self.timestamp.msg
    }

    /// Confirm the proof is rooted at the given fingerprint.
    pub fn check_rooted_at(&self, fingerprint: &ContentFingerprint) -> Result<()> {
        let expected = fingerprint.digest()?;
        if self.file_hash_op != Op::Sha256 || self.digest() != expected.as_slice() {
            return Err(ProofError::Mismatch {
                expected: fingerprint.to_string(),
                found: format!("{}:{}", self.file_hash_op.name(), hex::encode(self.digest())),
            });
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(PROOF_HEADER_MAGIC);
        write_varuint(&mut out, CURRENT_PROOF_VERSION);
        self.file_hash_op.write(&mut out);
        out.extend_from_slice(self.digest());
        self.timestamp.write(&mut out)?;
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_PROOF_SIZE {
            return Err(corrupt(format!(
                "proof of {} bytes exceeds maximum of {MAX_PROOF_SIZE}",
                bytes.len()
            )));
        }

        let mut reader = ProofReader::new(bytes);
        let magic = reader.read_bytes(PROOF_HEADER_MAGIC.len())?;
        if magic != PROOF_HEADER_MAGIC {
            return Err(corrupt("missing proof header magic"));
        }
        let version = reader.read_varuint()?;
        if version != CURRENT_PROOF_VERSION {
            return Err(corrupt(format!(
                "unsupported proof version {version} (current: {CURRENT_PROOF_VERSION})"
            )));
        }

        let tag = reader.read_byte()?;
        let file_hash_op = Op::read_with_tag(&mut reader, tag)?;
        let digest_len = file_hash_op
            .digest_len()
            .ok_or_else(|| corrupt(format!("{} is not a digest operation", file_hash_op.name())))?;
        let digest = reader.read_bytes(digest_len)?.to_vec();

        let timestamp = Timestamp::read(&mut reader, digest)?;
        reader.assert_eof()?;

        Ok(Self {
            file_hash_op,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::hash;
    use crate::ots::Attestation;

    fn sample() -> DetachedTimestampFile {
        let fp = hash(b"hello", HashAlgorithm::Sha256);
        let mut file = DetachedTimestampFile::for_fingerprint(&fp).unwrap();
        file.timestamp
            .add_op(Op::Append(vec![7; 16]))
            .unwrap()
            .add_op(Op::Sha256)
            .unwrap()
            .attestations
            .insert(Attestation::Pending {
                uri: "https://a.pool.opentimestamps.org".into(),
            });
        file
    }

    #[test]
    fn test_file_roundtrip() {
        let file = sample();
        let bytes = file.to_bytes().unwrap();
        assert!(bytes.starts_with(PROOF_HEADER_MAGIC));
        let parsed = DetachedTimestampFile::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, file);
        assert_eq!(parsed.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let err = DetachedTimestampFile::from_bytes(b"not a proof").unwrap_err();
        assert!(matches!(err, ProofError::CorruptProof(_)));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes.push(0x00);
        assert!(DetachedTimestampFile::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_rooted_check() {
        let file = sample();
        file.check_rooted_at(&hash(b"hello", HashAlgorithm::Sha256))
            .unwrap();
        let err = file
            .check_rooted_at(&hash(b"bye", HashAlgorithm::Sha256))
            .unwrap_err();
        assert!(matches!(err, ProofError::Mismatch { .. }));
    }

    #[test]
    fn test_sha3_fingerprint_unsupported() {
        let fp = hash(b"hello", HashAlgorithm::Sha3_256);
        assert!(DetachedTimestampFile::for_fingerprint(&fp).is_err());
    }
}
