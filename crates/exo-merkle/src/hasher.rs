//! # Hash Engine
//!
//! Computes the level-0 representation hash and depth of a dictionary
//! edge cell from its label, its payload, and its children's level-0
//! hashes and depths:
//!
//! ```text
//! sha256(refs ‖ ⌊bits/8⌋+⌈bits/8⌉ ‖ padded(label ‖ payload)
//!        ‖ depth(child)… ‖ hash(child)…)
//! ```
//!
//! A fork's payload is empty and it has exactly two children; a leaf's
//! payload is its value bits and its children are the value's references.
//! The output equals the cell hash an ordinary cell with the same contents
//! has at level 0, so a root recomputed from a pruned skeleton matches the
//! hash of the full, unpruned dictionary.

use exo_cell::BitString;
use exo_core::NodeHash;
use sha2::{Digest, Sha256};

use crate::label::Label;

/// Level-0 hash and depth of a subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChildRef {
    /// Level-0 representation hash.
    pub hash: NodeHash,
    /// Level-0 depth.
    pub depth: u16,
}

/// Node hashing used by the verifiers.
///
/// Implementations must be pure: equal inputs give equal outputs.
pub trait NodeHasher {
    /// Hash a leaf edge: label, then value bits, with the value's references.
    fn hash_leaf(&self, label: &Label, value_bits: &BitString, value_refs: &[ChildRef]) -> ChildRef;

    /// Hash a fork edge: label, then two children. The fork's depth is one
    /// more than the deeper child.
    fn hash_fork(&self, label: &Label, left: ChildRef, right: ChildRef) -> ChildRef;
}

impl<H: NodeHasher + ?Sized> NodeHasher for &H {
    fn hash_leaf(&self, label: &Label, value_bits: &BitString, value_refs: &[ChildRef]) -> ChildRef {
        (**self).hash_leaf(label, value_bits, value_refs)
    }

    fn hash_fork(&self, label: &Label, left: ChildRef, right: ChildRef) -> ChildRef {
        (**self).hash_fork(label, left, right)
    }
}

/// SHA-256 hashing matching the cell representation format.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256NodeHasher;

impl NodeHasher for Sha256NodeHasher {
    fn hash_leaf(&self, label: &Label, value_bits: &BitString, value_refs: &[ChildRef]) -> ChildRef {
        let mut data = BitString::with_capacity(label.len() + value_bits.len() + 16);
        label.write_to(&mut data);
        data.extend_from(value_bits);
        edge_repr(&data, value_refs)
    }

    fn hash_fork(&self, label: &Label, left: ChildRef, right: ChildRef) -> ChildRef {
        let mut data = BitString::with_capacity(label.len() + 16);
        label.write_to(&mut data);
        edge_repr(&data, &[left, right])
    }
}

fn edge_repr(data: &BitString, refs: &[ChildRef]) -> ChildRef {
    let bits = data.len();
    let d1 = refs.len() as u8;
    let d2 = (bits / 8 + (bits + 7) / 8) as u8;

    let mut hasher = Sha256::new();
    hasher.update([d1, d2]);
    hasher.update(data.to_padded_bytes());
    let mut depth: u16 = 0;
    for child in refs {
        hasher.update(child.depth.to_be_bytes());
        depth = depth.max(child.depth.saturating_add(1));
    }
    for child in refs {
        hasher.update(child.hash.as_bytes());
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    ChildRef {
        hash: NodeHash::from_bytes(out),
        depth,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exo_cell::{Cell, CellBuilder};

    fn bits(s: &str) -> BitString {
        BitString::from_binary_str(s).unwrap()
    }

    fn child_of(cell: &Cell) -> ChildRef {
        ChildRef {
            hash: cell.hash(0),
            depth: cell.depth(0),
        }
    }

    #[test]
    fn test_leaf_matches_cell_hash() {
        let label = Label::canonical(bits("0101"), 4);
        let mut b = CellBuilder::new();
        label.store(&mut b).unwrap();
        b.store_bit(true).unwrap();
        let cell = b.build().unwrap();

        let leaf = Sha256NodeHasher.hash_leaf(&label, &bits("1"), &[]);
        assert_eq!(leaf, child_of(&cell));
    }

    #[test]
    fn test_fork_matches_cell_hash_and_depth() {
        let left = {
            let mut b = CellBuilder::new();
            b.store_uint(3, 2).unwrap();
            b.build().unwrap()
        };
        let right = {
            let mut inner = CellBuilder::new();
            inner.store_reference(left.clone()).unwrap();
            inner.build().unwrap()
        };
        let label = Label::canonical(bits("1"), 10);
        let mut b = CellBuilder::new();
        label.store(&mut b).unwrap();
        b.store_reference(left.clone()).unwrap();
        b.store_reference(right.clone()).unwrap();
        let cell = b.build().unwrap();

        let fork = Sha256NodeHasher.hash_fork(&label, child_of(&left), child_of(&right));
        assert_eq!(fork, child_of(&cell));
        assert_eq!(fork.depth, 2);
    }

    #[test]
    fn test_pruned_child_gives_original_hash() {
        let value = {
            let mut b = CellBuilder::new();
            b.store_uint(0xbeef, 16).unwrap();
            b.build().unwrap()
        };
        let pruned = Cell::pruned_branch(&value).unwrap();
        let label = Label::canonical(BitString::new(), 0);
        let full = Sha256NodeHasher.hash_leaf(&label, &BitString::new(), &[child_of(&value)]);
        let via_pruned = Sha256NodeHasher.hash_leaf(&label, &BitString::new(), &[child_of(&pruned)]);
        assert_eq!(full, via_pruned);
    }
}
