//! Calendar proof container.
//!
//! Proofs use the OpenTimestamps detached format, so a blob produced here can
//! be checked with any OpenTimestamps verifier:
//!
//! ```text
//! magic(31) | varuint version | digest op tag | digest | tree
//! tree      = (0xff item)* item
//! item      = 0x00 attestation | op-tag [varbytes arg] tree
//! ```
//!
//! Parsing and writing are lossless for every proof this crate accepts.

mod attestation;
mod codec;
mod file;
mod op;
mod timestamp;

pub use attestation::Attestation;
pub use codec::{write_varbytes, write_varuint, ProofReader};
pub use file::DetachedTimestampFile;
pub use op::{Op, MAX_OP_LENGTH};
pub use timestamp::{merge, AttestedMessage, Timestamp};
