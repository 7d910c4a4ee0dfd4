//! # Merkle Verifier
//!
//! Folds a decoded skeleton bottom-up through the hash engine and compares
//! the result with a caller-supplied root.
//!
//! Pruned nodes contribute their stored hash and depth as-is. The computed
//! root must first agree with the hash the exotic wrapper commits to
//! (otherwise the structure is internally inconsistent: `ShapeMismatch`);
//! it is then compared with the expected root (`RootMismatch`). An all-zero
//! expected root never verifies.

use exo_core::{NodeHash, VerifyError};

use crate::hasher::{ChildRef, NodeHasher, Sha256NodeHasher};
use crate::label::Label;
use crate::skeleton::{LeafValue, Node, ProofSkeleton};

/// Recomputes skeleton roots.
#[derive(Debug, Clone)]
pub struct MerkleVerifier<H = Sha256NodeHasher> {
    hasher: H,
}

impl MerkleVerifier {
    /// Verifier using SHA-256 cell hashing.
    pub fn sha256() -> Self {
        Self {
            hasher: Sha256NodeHasher,
        }
    }
}

impl Default for MerkleVerifier {
    fn default() -> Self {
        Self::sha256()
    }
}

impl<H: NodeHasher> MerkleVerifier<H> {
    /// Verifier using `hasher`.
    pub fn new(hasher: H) -> Self {
        Self { hasher }
    }

    /// The hash engine in use.
    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Recompute the root of `skeleton` and check it against the hash its
    /// exotic wrapper commits to.
    pub fn compute_root(&self, skeleton: &ProofSkeleton) -> Result<ChildRef, VerifyError> {
        let computed = self.node_root(skeleton, skeleton.root())?;
        let claimed = skeleton.claimed();
        if !computed.hash.ct_eq(&claimed.hash) || computed.depth != claimed.depth {
            return Err(VerifyError::ShapeMismatch(format!(
                "skeleton hashes to {} at depth {}, wrapper commits to {} at depth {}",
                computed.hash, computed.depth, claimed.hash, claimed.depth
            )));
        }
        Ok(computed)
    }

    /// Verify `skeleton` against `expected`, returning the root on success.
    pub fn verify(&self, skeleton: &ProofSkeleton, expected: &NodeHash) -> Result<NodeHash, VerifyError> {
        let computed = self.compute_root(skeleton)?.hash;
        check_root(expected, &computed)?;
        tracing::debug!(root = %computed, "merkle proof verified");
        Ok(computed)
    }

    /// Hash and depth of `node` within `skeleton`.
    ///
    /// Post-order fold over an explicit stack; left subtrees hash first.
    pub(crate) fn node_root(&self, skeleton: &ProofSkeleton, node: &Node) -> Result<ChildRef, VerifyError> {
        enum Step<'a> {
            Enter(&'a Node),
            Join(&'a Label),
        }

        let mut work = vec![Step::Enter(node)];
        let mut folded: Vec<ChildRef> = Vec::new();
        while let Some(step) = work.pop() {
            match step {
                Step::Enter(Node::Pruned(stored)) => folded.push(*stored),
                Step::Enter(Node::Leaf { label, value }) => folded.push(self.leaf_root(skeleton, label, value)?),
                Step::Enter(Node::Fork { label, left, right }) => {
                    work.push(Step::Join(label));
                    work.push(Step::Enter(right));
                    work.push(Step::Enter(left));
                }
                Step::Join(label) => {
                    let (Some(right), Some(left)) = (folded.pop(), folded.pop()) else {
                        return Err(VerifyError::MalformedStructure("fork folded without both children".to_string()));
                    };
                    folded.push(self.hasher.hash_fork(label, left, right));
                }
            }
        }
        folded
            .pop()
            .ok_or_else(|| VerifyError::MalformedStructure("empty skeleton".to_string()))
    }

    /// Hash and depth of `node` seen through `label` instead of its own.
    pub(crate) fn relabelled_root(
        &self,
        skeleton: &ProofSkeleton,
        node: &Node,
        label: &Label,
    ) -> Result<ChildRef, VerifyError> {
        match node {
            Node::Pruned(stored) => Ok(*stored),
            Node::Leaf { value, .. } => self.leaf_root(skeleton, label, value),
            Node::Fork { left, right, .. } => {
                let left = self.node_root(skeleton, left)?;
                let right = self.node_root(skeleton, right)?;
                Ok(self.hasher.hash_fork(label, left, right))
            }
        }
    }

    fn leaf_root(&self, skeleton: &ProofSkeleton, label: &Label, value: &LeafValue) -> Result<ChildRef, VerifyError> {
        let mut refs = Vec::with_capacity(value.refs.len());
        for index in &value.refs {
            let cell = skeleton.arena().build(*index)?;
            refs.push(ChildRef {
                hash: cell.hash(0),
                depth: cell.depth(0),
            });
        }
        Ok(self.hasher.hash_leaf(label, &value.bits, &refs))
    }
}

/// Compare a computed root with the expected one. Zero never matches.
pub(crate) fn check_root(expected: &NodeHash, computed: &NodeHash) -> Result<(), VerifyError> {
    if expected.is_zero() || !computed.ct_eq(expected) {
        return Err(VerifyError::RootMismatch {
            expected: *expected,
            computed: *computed,
        });
    }
    Ok(())
}
