//! The proof tree.
//!
//! Each node holds the message reached so far, the attestations made about
//! that message, and the operations leading to child messages. Merging two
//! trees over the same message is a set union: nothing present in either
//! input is ever dropped.

use std::collections::{BTreeMap, BTreeSet};

use super::attestation::Attestation;
use super::codec::{corrupt, ProofReader};
use super::op::Op;
use crate::error::Result;

/// Deepest nesting accepted when parsing.
const RECURSION_LIMIT: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    pub msg: Vec<u8>,
    pub attestations: BTreeSet<Attestation>,
    pub ops: BTreeMap<Op, Timestamp>,
}

/// An attestation together with the message it commits to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedMessage<'a> {
    pub msg: &'a [u8],
    pub attestation: &'a Attestation,
}

impl Timestamp {
    pub fn new(msg: impl Into<Vec<u8>>) -> Self {
        Self {
            msg: msg.into(),
            attestations: BTreeSet::new(),
            ops: BTreeMap::new(),
        }
    }

    /// Follow `op` from this node, creating the child if absent.
    pub fn add_op(&mut self, op: Op) -> Result<&mut Timestamp> {
        let next = op.apply(&self.msg)?;
        Ok(self.ops.entry(op).or_insert_with(|| Timestamp::new(next)))
    }

    /// Union another tree over the same message into this one.
    ///
    /// Returns whether anything new was added.
    pub fn merge_from(&mut self, other: &Timestamp) -> Result<bool> {
        if self.msg != other.msg {
            return Err(corrupt(format!(
                "cannot merge timestamps for different messages ({} vs {})",
                hex::encode(&self.msg),
                hex::encode(&other.msg)
            )));
        }

        let mut changed = false;
        for attestation in &other.attestations {
            changed |= self.attestations.insert(attestation.clone());
        }
        for (op, child) in &other.ops {
            match self.ops.get_mut(op) {
                Some(existing) => changed |= existing.merge_from(child)?,
                None => {
                    self.ops.insert(op.clone(), child.clone());
                    changed = true;
                }
            }
        }
        Ok(changed)
    }

    /// Every attestation in the tree with the message it attests, depth-first.
    pub fn all_attestations(&self) -> Vec<AttestedMessage<'_>> {
        let mut out = Vec::new();
        self.collect_attestations(&mut out);
        out
    }

    fn collect_attestations<'a>(&'a self, out: &mut Vec<AttestedMessage<'a>>) {
        for attestation in &self.attestations {
            out.push(AttestedMessage {
                msg: &self.msg,
                attestation,
            });
        }
        for child in self.ops.values() {
            child.collect_attestations(out);
        }
    }

    /// Mutable access to the node whose message is `msg`, if any.
    pub fn find_mut(&mut self, msg: &[u8]) -> Option<&mut Timestamp> {
        if self.msg == msg {
            return Some(self);
        }
        self.ops.values_mut().find_map(|child| child.find_mut(msg))
    }

    /// Whether any branch ends in a Bitcoin attestation.
    pub fn is_complete(&self) -> bool {
        self.all_attestations()
            .iter()
            .any(|a| a.attestation.is_bitcoin())
    }

    /// Check that every child message is its parent message with the edge applied.
    ///
    /// Parsed trees satisfy this by construction; hand-built ones may not.
    pub fn check_consistency(&self) -> Result<()> {
        for (op, child) in &self.ops {
            let expected = op.apply(&self.msg)?;
            if expected != child.msg {
                return Err(corrupt(format!(
                    "edge {op} from {} does not produce {}",
                    hex::encode(&self.msg),
                    hex::encode(&child.msg)
                )));
            }
            child.check_consistency()?;
        }
        Ok(())
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        if self.attestations.is_empty() && self.ops.is_empty() {
            return Err(corrupt("cannot serialize an empty timestamp node"));
        }

        let attestations: Vec<_> = self.attestations.iter().collect();
        if let Some((last, rest)) = attestations.split_last() {
            for attestation in rest {
                out.extend_from_slice(&[0xff, 0x00]);
                attestation.write(out);
            }
            if self.ops.is_empty() {
                out.push(0x00);
                last.write(out);
                return Ok(());
            }
            out.extend_from_slice(&[0xff, 0x00]);
            last.write(out);
        }

        let ops: Vec<_> = self.ops.iter().collect();
        if let Some(((last_op, last_child), rest)) = ops.split_last() {
            for (op, child) in rest {
                out.push(0xff);
                op.write(out);
                child.write(out)?;
            }
            last_op.write(out);
            last_child.write(out)?;
        }
        Ok(())
    }

    pub fn read(reader: &mut ProofReader<'_>, msg: Vec<u8>) -> Result<Self> {
        Self::read_at_depth(reader, msg, RECURSION_LIMIT)
    }

    fn read_at_depth(reader: &mut ProofReader<'_>, msg: Vec<u8>, depth: usize) -> Result<Self> {
        if depth == 0 {
            return Err(corrupt("proof nesting exceeds recursion limit"));
        }

        let mut node = Timestamp::new(msg);
        let mut tag = reader.read_byte()?;
        while tag == 0xff {
            let current = reader.read_byte()?;
            node.read_edge_or_attestation(reader, current, depth)?;
            tag = reader.read_byte()?;
        }
        node.read_edge_or_attestation(reader, tag, depth)?;
        Ok(node)
    }

    fn read_edge_or_attestation(
        &mut self,
        reader: &mut ProofReader<'_>,
        tag: u8,
        depth: usize,
    ) -> Result<()> {
        if tag == 0x00 {
            self.attestations.insert(Attestation::read(reader)?);
            return Ok(());
        }
        let op = Op::read_with_tag(reader, tag)?;
        let next = op.apply(&self.msg)?;
        let child = Self::read_at_depth(reader, next, depth - 1)?;
        match self.ops.get_mut(&op) {
            Some(existing) => {
                existing.merge_from(&child)?;
            }
            None => {
                self.ops.insert(op, child);
            }
        }
        Ok(())
    }

    /// Human-readable rendering of the tree, one edge or attestation per line.
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, indent: usize) {
        let pad = " ".repeat(indent);
        for attestation in &self.attestations {
            out.push_str(&format!("{pad}verify {attestation}\n"));
        }
        let branching = self.ops.len() > 1;
        for (op, child) in &self.ops {
            if branching {
                out.push_str(&format!("{pad} -> {op}\n"));
                child.render_into(out, indent + 4);
            } else {
                out.push_str(&format!("{pad}{op}\n"));
                child.render_into(out, indent);
            }
        }
    }
}

/// Pure merge: a new tree holding everything from both inputs.
pub fn merge(old: &Timestamp, new: &Timestamp) -> Result<Timestamp> {
    let mut combined = old.clone();
    combined.merge_from(new)?;
    Ok(combined)
}
