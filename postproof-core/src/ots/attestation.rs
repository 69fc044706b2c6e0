//! Attestations: the leaves of a proof tree.

use super::codec::{corrupt, write_varbytes, write_varuint, ProofReader};
use crate::error::Result;

const TAG_LEN: usize = 8;
const BITCOIN_TAG: [u8; TAG_LEN] = [0x05, 0x88, 0x96, 0x0d, 0x73, 0xd7, 0x19, 0x01];
const PENDING_TAG: [u8; TAG_LEN] = [0x83, 0xdf, 0xe3, 0x0d, 0x2e, 0xf9, 0x0c, 0x8e];

const MAX_PAYLOAD_LENGTH: usize = 8192;
const MAX_URI_LENGTH: usize = 1000;

/// A claim that the message at this leaf existed at some point.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Attestation {
    /// The message equals the merkle root of the Bitcoin block at `height`.
    Bitcoin { height: u64 },
    /// A calendar has promised to commit the message; ask it again later.
    Pending { uri: String },
    /// An attestation type this crate does not interpret, kept verbatim.
    Unknown { tag: [u8; TAG_LEN], payload: Vec<u8> },
}

impl Attestation {
    pub fn tag(&self) -> [u8; TAG_LEN] {
        match self {
            Self::Bitcoin { .. } => BITCOIN_TAG,
            Self::Pending { .. } => PENDING_TAG,
            Self::Unknown { tag, .. } => *tag,
        }
    }

    fn payload(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        match self {
            Self::Bitcoin { height } => write_varuint(&mut payload, *height),
            Self::Pending { uri } => write_varbytes(&mut payload, uri.as_bytes()),
            Self::Unknown { payload: raw, .. } => payload.extend_from_slice(raw),
        }
        payload
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.tag());
        write_varbytes(out, &self.payload());
    }

    pub fn read(reader: &mut ProofReader<'_>) -> Result<Self> {
        let tag: [u8; TAG_LEN] = reader
            .read_bytes(TAG_LEN)?
            .try_into()
            .map_err(|_| corrupt("short attestation tag"))?;
        let payload = reader.read_varbytes(0, MAX_PAYLOAD_LENGTH)?;
        let mut inner = ProofReader::new(payload);

        let attestation = match tag {
            BITCOIN_TAG => Self::Bitcoin {
                height: inner.read_varuint()?,
            },
            PENDING_TAG => {
                let uri = inner.read_varbytes(0, MAX_URI_LENGTH)?;
                let uri = std::str::from_utf8(uri)
                    .map_err(|_| corrupt("pending attestation URI is not UTF-8"))?;
                validate_calendar_uri(uri)?;
                Self::Pending {
                    uri: uri.to_string(),
                }
            }
            _ => {
                return Ok(Self::Unknown {
                    tag,
                    payload: payload.to_vec(),
                })
            }
        };
        inner.assert_eof()?;
        Ok(attestation)
    }

    pub fn is_bitcoin(&self) -> bool {
        matches!(self, Self::Bitcoin { .. })
    }

    pub fn pending_uri(&self) -> Option<&str> {
        match self {
            Self::Pending { uri } => Some(uri),
            _ => None,
        }
    }
}

/// Calendar URIs are restricted to a conservative URL alphabet.
fn validate_calendar_uri(uri: &str) -> Result<()> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || "-._/:".contains(c);
    if uri.chars().all(allowed) {
        Ok(())
    } else {
        Err(corrupt(format!("illegal character in calendar URI {uri:?}")))
    }
}

impl Ord for Attestation {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;

        match self.tag().cmp(&other.tag()) {
            Ordering::Equal => {}
            unequal => return unequal,
        }
        match (self, other) {
            (Self::Bitcoin { height: a }, Self::Bitcoin { height: b }) => a.cmp(b),
            (Self::Pending { uri: a }, Self::Pending { uri: b }) => a.cmp(b),
            (Self::Unknown { payload: a, .. }, Self::Unknown { payload: b, .. }) => a.cmp(b),
            // Equal tags always map to the same variant.
            _ => Ordering::Equal,
        }
    }
}

impl PartialOrd for Attestation {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Attestation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bitcoin { height } => write!(f, "BitcoinBlockHeaderAttestation({height})"),
            Self::Pending { uri } => write!(f, "PendingAttestation({uri})"),
            Self::Unknown { tag, payload } => write!(
                f,
                "UnknownAttestation({}, {} bytes)",
                hex::encode(tag),
                payload.len()
            ),
        }
    }
}
