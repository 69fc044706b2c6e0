//! Commitment operations: the edges of a proof tree.

use sha2::Sha256;
use sha3::{Digest, Keccak256};

use super::codec::{corrupt, write_varbytes, ProofReader};
use crate::error::Result;

/// Longest message or argument an operation may consume or produce.
pub const MAX_OP_LENGTH: usize = 4096;

const TAG_SHA256: u8 = 0x08;
const TAG_KECCAK256: u8 = 0x67;
const TAG_APPEND: u8 = 0xf0;
const TAG_PREPEND: u8 = 0xf1;
const TAG_REVERSE: u8 = 0xf2;
const TAG_HEXLIFY: u8 = 0xf3;

/// A deterministic transformation from one message to the next.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    Sha256,
    Keccak256,
    Append(Vec<u8>),
    Prepend(Vec<u8>),
    Reverse,
    Hexlify,
}

impl Op {
    pub fn tag(&self) -> u8 {
        match self {
            Self::Sha256 => TAG_SHA256,
            Self::Keccak256 => TAG_KECCAK256,
            Self::Append(_) => TAG_APPEND,
            Self::Prepend(_) => TAG_PREPEND,
            Self::Reverse => TAG_REVERSE,
            Self::Hexlify => TAG_HEXLIFY,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Keccak256 => "keccak256",
            Self::Append(_) => "append",
            Self::Prepend(_) => "prepend",
            Self::Reverse => "reverse",
            Self::Hexlify => "hexlify",
        }
    }

    /// Argument bytes for binary operations.
    pub fn arg(&self) -> Option<&[u8]> {
        match self {
            Self::Append(arg) | Self::Prepend(arg) => Some(arg),
            _ => None,
        }
    }

    /// Whether this is a hash operation usable as the file digest op.
    pub fn is_crypto(&self) -> bool {
        matches!(self, Self::Sha256 | Self::Keccak256)
    }

    /// Digest width for crypto operations.
    pub fn digest_len(&self) -> Option<usize> {
        match self {
            Self::Sha256 | Self::Keccak256 => Some(32),
            _ => None,
        }
    }

    /// Apply the operation to a message.
    pub fn apply(&self, msg: &[u8]) -> Result<Vec<u8>> {
        if msg.len() > MAX_OP_LENGTH {
            return Err(corrupt(format!(
                "{} input of {} bytes exceeds {MAX_OP_LENGTH}",
                self.name(),
                msg.len()
            )));
        }
        let result = match self {
            Self::Sha256 => Sha256::digest(msg).to_vec(),
            Self::Keccak256 => Keccak256::digest(msg).to_vec(),
            Self::Append(arg) => [msg, arg.as_slice()].concat(),
            Self::Prepend(arg) => [arg.as_slice(), msg].concat(),
            Self::Reverse => {
                if msg.is_empty() {
                    return Err(corrupt("reverse of empty message"));
                }
                msg.iter().rev().copied().collect()
            }
            Self::Hexlify => {
                if msg.is_empty() {
                    return Err(corrupt("hexlify of empty message"));
                }
                hex::encode(msg).into_bytes()
            }
        };
        if result.len() > MAX_OP_LENGTH {
            return Err(corrupt(format!(
                "{} result of {} bytes exceeds {MAX_OP_LENGTH}",
                self.name(),
                result.len()
            )));
        }
        Ok(result)
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.push(self.tag());
        if let Some(arg) = self.arg() {
            write_varbytes(out, arg);
        }
    }

    /// Decode the operation identified by `tag`, reading its argument if any.
    pub fn read_with_tag(reader: &mut ProofReader<'_>, tag: u8) -> Result<Self> {
        match tag {
            TAG_SHA256 => Ok(Self::Sha256),
            TAG_KECCAK256 => Ok(Self::Keccak256),
            TAG_APPEND => Ok(Self::Append(
                reader.read_varbytes(1, MAX_OP_LENGTH)?.to_vec(),
            )),
            TAG_PREPEND => Ok(Self::Prepend(
                reader.read_varbytes(1, MAX_OP_LENGTH)?.to_vec(),
            )),
            TAG_REVERSE => Ok(Self::Reverse),
            TAG_HEXLIFY => Ok(Self::Hexlify),
            other => Err(corrupt(format!("unsupported operation tag 0x{other:02x}"))),
        }
    }
}

// Sort by tag, then by argument, matching the container's canonical order.
impl Ord for Op {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.tag()
            .cmp(&other.tag())
            .then_with(|| self.arg().cmp(&other.arg()))
    }
}

impl PartialOrd for Op {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.arg() {
            Some(arg) => write!(f, "{} {}", self.name(), hex::encode(arg)),
            None => f.write_str(self.name()),
        }
    }
}
