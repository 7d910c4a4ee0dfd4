//! # Exotic Cell Constructors and Views
//!
//! Builds pruned branches and Merkle wrappers from ordinary trees, and
//! exposes typed read-only views over Merkle proof and update cells.

use exo_core::{CellError, NodeHash};

use crate::builder::CellBuilder;
use crate::cell::{Cell, CellType};

const PRUNED_TAG: u64 = 1;
const MERKLE_PROOF_TAG: u64 = 3;
const MERKLE_UPDATE_TAG: u64 = 4;

impl Cell {
    /// Replace `cell` by a level-1 pruned branch carrying its level-0 hash
    /// and depth.
    ///
    /// Only level-0 cells can be pruned this way; pruning a subtree that
    /// already contains pruned branches would need a multi-level mask.
    pub fn pruned_branch(cell: &Cell) -> Result<Cell, CellError> {
        if cell.level() != 0 {
            return Err(CellError::InvalidExotic(format!(
                "cannot prune a level-{} cell",
                cell.level()
            )));
        }
        Self::pruned_from_parts(&cell.hash(0), cell.depth(0))
    }

    /// A level-1 pruned branch standing in for a subtree with the given
    /// level-0 hash and depth.
    pub fn pruned_from_parts(hash: &NodeHash, depth: u16) -> Result<Cell, CellError> {
        let mut b = CellBuilder::new();
        b.store_uint(PRUNED_TAG, 8)?;
        b.store_uint(1, 8)?;
        b.store_hash(hash)?;
        b.store_uint(u64::from(depth), 16)?;
        b.build_exotic()
    }

    /// Wrap a (partially pruned) tree in a Merkle proof cell.
    pub fn merkle_proof(child: &Cell) -> Result<Cell, CellError> {
        let mut b = CellBuilder::new();
        b.store_uint(MERKLE_PROOF_TAG, 8)?;
        b.store_hash(&child.hash(0))?;
        b.store_uint(u64::from(child.depth(0)), 16)?;
        b.store_reference(child.clone())?;
        b.build_exotic()
    }

    /// Pair two (partially pruned) trees in a Merkle update cell.
    pub fn merkle_update(old: &Cell, new: &Cell) -> Result<Cell, CellError> {
        let mut b = CellBuilder::new();
        b.store_uint(MERKLE_UPDATE_TAG, 8)?;
        b.store_hash(&old.hash(0))?;
        b.store_hash(&new.hash(0))?;
        b.store_uint(u64::from(old.depth(0)), 16)?;
        b.store_uint(u64::from(new.depth(0)), 16)?;
        b.store_reference(old.clone())?;
        b.store_reference(new.clone())?;
        b.build_exotic()
    }
}

/// Read-only view of a Merkle proof cell.
#[derive(Debug, Clone)]
pub struct MerkleProof {
    /// Committed level-0 hash of the wrapped tree.
    pub hash: NodeHash,
    /// Committed level-0 depth of the wrapped tree.
    pub depth: u16,
    /// The wrapped tree.
    pub child: Cell,
}

impl MerkleProof {
    /// View `cell` as a Merkle proof.
    pub fn from_cell(cell: &Cell) -> Result<Self, CellError> {
        if cell.cell_type() != CellType::MerkleProof {
            return Err(CellError::InvalidExotic(format!(
                "expected merkle_proof, got {}",
                cell.cell_type()
            )));
        }
        let mut s = cell.parser();
        s.skip(8)?;
        let hash = s.load_hash()?;
        let depth = s.load_uint(16)? as u16;
        let child = s.load_reference()?.clone();
        Ok(Self { hash, depth, child })
    }
}

/// Read-only view of a Merkle update cell.
#[derive(Debug, Clone)]
pub struct MerkleUpdate {
    /// Committed level-0 hash of the old tree.
    pub old_hash: NodeHash,
    /// Committed level-0 hash of the new tree.
    pub new_hash: NodeHash,
    /// Committed level-0 depth of the old tree.
    pub old_depth: u16,
    /// Committed level-0 depth of the new tree.
    pub new_depth: u16,
    /// The old tree.
    pub old: Cell,
    /// The new tree.
    pub new: Cell,
}

impl MerkleUpdate {
    /// View `cell` as a Merkle update.
    pub fn from_cell(cell: &Cell) -> Result<Self, CellError> {
        if cell.cell_type() != CellType::MerkleUpdate {
            return Err(CellError::InvalidExotic(format!(
                "expected merkle_update, got {}",
                cell.cell_type()
            )));
        }
        let mut s = cell.parser();
        s.skip(8)?;
        let old_hash = s.load_hash()?;
        let new_hash = s.load_hash()?;
        let old_depth = s.load_uint(16)? as u16;
        let new_depth = s.load_uint(16)? as u16;
        let old = s.load_reference()?.clone();
        let new = s.load_reference()?.clone();
        Ok(Self {
            old_hash,
            new_hash,
            old_depth,
            new_depth,
            old,
            new,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Cell {
        let mut leaf = CellBuilder::new();
        leaf.store_uint(0xabcd, 16).unwrap();
        let leaf = leaf.build().unwrap();
        let mut root = CellBuilder::new();
        root.store_bit(true).unwrap();
        root.store_reference(leaf).unwrap();
        root.build().unwrap()
    }

    #[test]
    fn test_proof_view_roundtrip() {
        let t = tree();
        let proof = Cell::merkle_proof(&t).unwrap();
        let view = MerkleProof::from_cell(&proof).unwrap();
        assert_eq!(view.hash, t.hash(0));
        assert_eq!(view.depth, 1);
        assert_eq!(view.child, t);
    }

    #[test]
    fn test_update_view_roundtrip() {
        let old = tree();
        let new = CellBuilder::new().build().unwrap();
        let update = Cell::merkle_update(&old, &new).unwrap();
        let view = MerkleUpdate::from_cell(&update).unwrap();
        assert_eq!(view.old_hash, old.hash(0));
        assert_eq!(view.new_hash, new.hash(0));
        assert_eq!(view.old_depth, 1);
        assert_eq!(view.new_depth, 0);
    }

    #[test]
    fn test_view_rejects_wrong_type() {
        let t = tree();
        assert!(MerkleProof::from_cell(&t).is_err());
        assert!(MerkleUpdate::from_cell(&Cell::merkle_proof(&t).unwrap()).is_err());
    }

    #[test]
    fn test_pruning_a_pruned_branch_is_rejected() {
        let pruned = Cell::pruned_branch(&tree()).unwrap();
        assert!(Cell::pruned_branch(&pruned).is_err());
    }

    #[test]
    fn test_proof_over_partially_pruned_tree_commits_to_original() {
        let t = tree();
        let leaf = t.reference(0).unwrap();
        let mut partial = CellBuilder::new();
        partial.store_bit(true).unwrap();
        partial
            .store_reference(Cell::pruned_branch(leaf).unwrap())
            .unwrap();
        let partial = partial.build().unwrap();
        let proof = Cell::merkle_proof(&partial).unwrap();
        assert_eq!(MerkleProof::from_cell(&proof).unwrap().hash, t.hash(0));
        assert_eq!(proof.level(), 0);
    }
}
