//! # Update Verifier
//!
//! Verifies a Merkle update against the expected prior root and yields the
//! new root as the next authoritative commitment.
//!
//! ## Cross-Check
//!
//! A node position is identified by the key prefix that leads to it. For
//! every pruned node on one side, the other side is located at the same
//! prefix:
//!
//! - pruned exactly there: hash and depth must match;
//! - strictly inside a pruned subtree: covered by that subtree's own check;
//! - inside a present edge: the edge, re-labelled with its label suffix,
//!   must hash to the pruned node;
//! - not present at all: shape mismatch.
//!
//! The check runs in both directions. Value changes, insertions (label
//! splits) and removals (label merges) pass; any change to a subtree that
//! is not on a modified key path does not.

use exo_cell::BitString;
use exo_core::{NodeHash, VerifyError};
use serde::Serialize;

use crate::hasher::{ChildRef, NodeHasher, Sha256NodeHasher};
use crate::skeleton::{Node, ProofSkeleton, UpdateSkeleton};
use crate::verify::{check_root, MerkleVerifier};

/// Result of a successful update verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    /// Root the update started from; equals the expected root.
    pub old_root: NodeHash,
    /// Root after the update.
    pub new_root: NodeHash,
    /// Depth of the new root cell.
    pub new_depth: u16,
}

/// Verifies Merkle updates.
#[derive(Debug, Clone)]
pub struct UpdateVerifier<H = Sha256NodeHasher> {
    merkle: MerkleVerifier<H>,
}

impl UpdateVerifier {
    /// Verifier using SHA-256 cell hashing.
    pub fn sha256() -> Self {
        Self {
            merkle: MerkleVerifier::sha256(),
        }
    }
}

impl Default for UpdateVerifier {
    fn default() -> Self {
        Self::sha256()
    }
}

enum Located<'a> {
    Pruned(ChildRef),
    InsidePruned,
    Edge { node: &'a Node, skip: usize },
    Absent,
}

impl<H: NodeHasher> UpdateVerifier<H> {
    /// Verifier using `hasher`.
    pub fn new(hasher: H) -> Self {
        Self {
            merkle: MerkleVerifier::new(hasher),
        }
    }

    /// Verify `update` starting from `expected_old`.
    ///
    /// The new root is only computed once the old root has matched.
    pub fn verify_update(
        &self,
        update: &UpdateSkeleton,
        expected_old: &NodeHash,
    ) -> Result<UpdateOutcome, VerifyError> {
        if update.old.key_bits() != update.new.key_bits() {
            return Err(VerifyError::ShapeMismatch(format!(
                "old skeleton keyed by {} bits, new by {}",
                update.old.key_bits(),
                update.new.key_bits()
            )));
        }

        let old = self.merkle.compute_root(&update.old)?;
        check_root(expected_old, &old.hash)?;
        let new = self.merkle.compute_root(&update.new)?;

        self.cross_check(&update.new, &update.old)?;
        self.cross_check(&update.old, &update.new)?;

        tracing::debug!(old_root = %old.hash, new_root = %new.hash, "merkle update verified");
        Ok(UpdateOutcome {
            old_root: old.hash,
            new_root: new.hash,
            new_depth: new.depth,
        })
    }

    /// Every pruned node of `from` must be consistent with `against`.
    fn cross_check(&self, from: &ProofSkeleton, against: &ProofSkeleton) -> Result<(), VerifyError> {
        let mut pending = vec![(from.root(), BitString::new())];
        while let Some((node, prefix)) = pending.pop() {
            match node {
                Node::Pruned(stored) => self.check_position(against, &prefix, stored)?,
                Node::Leaf { .. } => {}
                Node::Fork { label, left, right } => {
                    let mut base = prefix;
                    base.extend_from(label.bits());
                    let mut right_prefix = base.clone();
                    base.push(false);
                    right_prefix.push(true);
                    pending.push((left, base));
                    pending.push((right, right_prefix));
                }
            }
        }
        Ok(())
    }

    fn check_position(
        &self,
        skeleton: &ProofSkeleton,
        prefix: &BitString,
        stored: &ChildRef,
    ) -> Result<(), VerifyError> {
        let found = match locate(skeleton.root(), prefix) {
            Located::Pruned(other) => other,
            Located::InsidePruned => return Ok(()),
            Located::Edge { node, skip: 0 } => self.merkle.node_root(skeleton, node)?,
            Located::Edge { node, skip } => {
                let label = node
                    .label()
                    .ok_or_else(|| VerifyError::ShapeMismatch("pruned edge located".to_string()))?
                    .suffix(skip);
                self.merkle.relabelled_root(skeleton, node, &label)?
            }
            Located::Absent => {
                return Err(VerifyError::ShapeMismatch(format!(
                    "pruned subtree at prefix {prefix} has no counterpart"
                )));
            }
        };
        if !found.hash.ct_eq(&stored.hash) || found.depth != stored.depth {
            return Err(VerifyError::ShapeMismatch(format!(
                "subtree at prefix {prefix} differs between old and new"
            )));
        }
        Ok(())
    }
}

fn locate<'a>(root: &'a Node, prefix: &BitString) -> Located<'a> {
    let mut node = root;
    let mut consumed = 0;
    loop {
        let label = match node {
            Node::Pruned(stored) if consumed == prefix.len() => return Located::Pruned(*stored),
            Node::Pruned(_) => return Located::InsidePruned,
            Node::Fork { label, .. } | Node::Leaf { label, .. } => label,
        };
        let rest = prefix.suffix(consumed);
        let common = label.bits().common_prefix_len(&rest);
        if common == rest.len() {
            return Located::Edge {
                node,
                skip: rest.len(),
            };
        }
        if common < label.len() {
            return Located::Absent;
        }
        match (node, rest.get(label.len())) {
            (Node::Fork { left, right, .. }, Some(bit)) => {
                node = if bit { right } else { left };
                consumed += label.len() + 1;
            }
            _ => return Located::Absent,
        }
    }
}
