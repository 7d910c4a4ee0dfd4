//! # Cells — Data, References, and Per-Level Hashes
//!
//! A cell holds up to 1023 data bits and up to four references to other
//! cells. Exotic cells (pruned branches, libraries, Merkle proofs, Merkle
//! updates) carry their type in the first data byte and follow fixed
//! layouts.
//!
//! ## Hashing
//!
//! Every cell has one hash per significant level of its level mask. For
//! level `i` the hashed representation is
//!
//! ```text
//! d1 ‖ d2 ‖ (padded data | hash at previous significant level)
//!    ‖ depth(ref, i')… ‖ hash(ref, i')…
//! ```
//!
//! with `d1 = refs + 8·exotic + 32·mask.apply(i)`,
//! `d2 = ⌊bits/8⌋ + ⌈bits/8⌉`, depths as 2-byte big-endian, and
//! `i' = i + 1` for Merkle cells. A pruned branch computes only its
//! representation hash; its lower-level hashes are the ones stored in it.
//!
//! ## Security Invariant
//!
//! A Merkle proof or update cell can only be constructed when the hashes
//! and depths it stores equal the level-0 hashes and depths of its
//! children. Cells are immutable once built.

use std::sync::Arc;

use exo_core::{CellError, NodeHash};
use sha2::{Digest, Sha256};

use crate::bits::BitString;
use crate::level::{LevelMask, MAX_LEVEL};
use crate::slice::CellSlice;

/// Maximum number of data bits in a cell.
pub const MAX_DATA_BITS: usize = 1023;

/// Maximum number of references from a cell.
pub const MAX_REFS: usize = 4;

/// Hard ceiling on cell depth.
pub const MAX_CELL_DEPTH: u16 = 1024;

/// Bits in a pruned branch header (type + level mask).
const PRUNED_HEADER_BITS: usize = 16;
/// Bits in a library cell.
const LIBRARY_BITS: usize = 8 + 256;
/// Bits in a Merkle proof cell.
pub(crate) const MERKLE_PROOF_BITS: usize = 8 + 256 + 16;
/// Bits in a Merkle update cell.
pub(crate) const MERKLE_UPDATE_BITS: usize = 8 + 2 * 256 + 2 * 16;

/// The kind of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellType {
    /// Plain data cell.
    Ordinary,
    /// Stand-in for an elided subtree: its hash and depth only.
    PrunedBranch,
    /// Reference to a library cell by hash.
    Library,
    /// Wraps a partially pruned tree and commits to its original hash.
    MerkleProof,
    /// Pairs an old and new partially pruned tree.
    MerkleUpdate,
}

impl CellType {
    /// Map an exotic type tag to a cell type.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::PrunedBranch),
            2 => Some(Self::Library),
            3 => Some(Self::MerkleProof),
            4 => Some(Self::MerkleUpdate),
            _ => None,
        }
    }

    /// The exotic type tag, or `None` for ordinary cells.
    pub fn tag(self) -> Option<u8> {
        match self {
            Self::Ordinary => None,
            Self::PrunedBranch => Some(1),
            Self::Library => Some(2),
            Self::MerkleProof => Some(3),
            Self::MerkleUpdate => Some(4),
        }
    }

    /// Whether the type is exotic.
    pub fn is_exotic(self) -> bool {
        self != Self::Ordinary
    }

    /// Whether the type is a Merkle proof or update.
    pub fn is_merkle(self) -> bool {
        matches!(self, Self::MerkleProof | Self::MerkleUpdate)
    }

    /// Returns the type name used in logs and inspection output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ordinary => "ordinary",
            Self::PrunedBranch => "pruned_branch",
            Self::Library => "library",
            Self::MerkleProof => "merkle_proof",
            Self::MerkleUpdate => "merkle_update",
        }
    }
}

impl std::fmt::Display for CellType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate a cell's layout and derive its type and level mask.
///
/// Performs no hashing, so the bag-of-cells decoder can run it over every
/// record before materializing any cell.
pub(crate) fn resolve_layout(
    exotic: bool,
    data: &BitString,
    ref_masks: &[LevelMask],
) -> Result<(CellType, LevelMask), CellError> {
    if data.len() > MAX_DATA_BITS {
        return Err(CellError::BitOverflow { bits: data.len() });
    }
    if ref_masks.len() > MAX_REFS {
        return Err(CellError::RefOverflow { refs: ref_masks.len() });
    }
    let children = ref_masks
        .iter()
        .fold(LevelMask::EMPTY, |acc, m| acc.union(*m));
    if !exotic {
        return Ok((CellType::Ordinary, children));
    }

    if data.len() < 8 {
        return Err(CellError::InvalidExotic(format!(
            "exotic cell needs a type byte, has {} bits",
            data.len()
        )));
    }
    let tag = data.as_bytes()[0];
    let cell_type = CellType::from_tag(tag)
        .ok_or_else(|| CellError::InvalidExotic(format!("unknown exotic type {tag}")))?;

    let expect_refs = |n: usize| -> Result<(), CellError> {
        if ref_masks.len() == n {
            Ok(())
        } else {
            Err(CellError::InvalidExotic(format!(
                "{cell_type} needs {n} refs, has {}",
                ref_masks.len()
            )))
        }
    };
    let expect_bits = |n: usize| -> Result<(), CellError> {
        if data.len() == n {
            Ok(())
        } else {
            Err(CellError::InvalidExotic(format!(
                "{cell_type} needs {n} bits, has {}",
                data.len()
            )))
        }
    };

    match cell_type {
        CellType::PrunedBranch => {
            expect_refs(0)?;
            if data.len() < PRUNED_HEADER_BITS {
                return Err(CellError::InvalidExotic(
                    "pruned branch missing level mask".to_string(),
                ));
            }
            let raw = data.as_bytes()[1];
            let mask = LevelMask::new(raw)
                .filter(|m| m.mask() != 0)
                .ok_or_else(|| {
                    CellError::InvalidExotic(format!("pruned branch level mask {raw:#04x}"))
                })?;
            expect_bits(PRUNED_HEADER_BITS + mask.hash_index() * (256 + 16))?;
            Ok((cell_type, mask))
        }
        CellType::Library => {
            expect_refs(0)?;
            expect_bits(LIBRARY_BITS)?;
            Ok((cell_type, LevelMask::EMPTY))
        }
        CellType::MerkleProof => {
            expect_refs(1)?;
            expect_bits(MERKLE_PROOF_BITS)?;
            Ok((cell_type, children.shift_right()))
        }
        CellType::MerkleUpdate => {
            expect_refs(2)?;
            expect_bits(MERKLE_UPDATE_BITS)?;
            Ok((cell_type, children.shift_right()))
        }
        CellType::Ordinary => Err(CellError::InvalidExotic("ordinary tag".to_string())),
    }
}

struct CellInner {
    cell_type: CellType,
    data: BitString,
    refs: Vec<Cell>,
    level_mask: LevelMask,
    hashes: [NodeHash; 4],
    depths: [u16; 4],
}

/// An immutable cell. Cloning is cheap and shares the subtree.
#[derive(Clone)]
pub struct Cell(Arc<CellInner>);

impl Cell {
    /// Build a cell from data bits and references.
    ///
    /// When `exotic` is set the first data byte selects the exotic type and
    /// the layout is validated against it; Merkle cells additionally have
    /// their stored hashes and depths checked against their children.
    pub fn new(data: BitString, refs: Vec<Cell>, exotic: bool) -> Result<Self, CellError> {
        let masks: Vec<LevelMask> = refs.iter().map(Cell::level_mask).collect();
        let (cell_type, level_mask) = resolve_layout(exotic, &data, &masks)?;
        let (hashes, depths) = compute_hashes(cell_type, &data, &refs, level_mask)?;

        let cell = Self(Arc::new(CellInner {
            cell_type,
            data,
            refs,
            level_mask,
            hashes,
            depths,
        }));
        cell.check_merkle_commitments()?;
        Ok(cell)
    }

    /// The cell's type.
    pub fn cell_type(&self) -> CellType {
        self.0.cell_type
    }

    /// Whether the cell is exotic.
    pub fn is_exotic(&self) -> bool {
        self.0.cell_type.is_exotic()
    }

    /// The cell's data bits.
    pub fn data(&self) -> &BitString {
        &self.0.data
    }

    /// Number of data bits.
    pub fn bit_len(&self) -> usize {
        self.0.data.len()
    }

    /// The cell's references.
    pub fn refs(&self) -> &[Cell] {
        &self.0.refs
    }

    /// Reference `index`, if present.
    pub fn reference(&self, index: usize) -> Option<&Cell> {
        self.0.refs.get(index)
    }

    /// The cell's level mask.
    pub fn level_mask(&self) -> LevelMask {
        self.0.level_mask
    }

    /// The cell's level.
    pub fn level(&self) -> u8 {
        self.0.level_mask.level()
    }

    /// Hash at `level` (clamped to 3). Level 0 is the hash of the original,
    /// unpruned subtree.
    pub fn hash(&self, level: u8) -> NodeHash {
        self.0.hashes[usize::from(level.min(MAX_LEVEL))]
    }

    /// Depth at `level` (clamped to 3).
    pub fn depth(&self, level: u8) -> u16 {
        self.0.depths[usize::from(level.min(MAX_LEVEL))]
    }

    /// Representation hash: the identity of this exact cell.
    pub fn repr_hash(&self) -> NodeHash {
        self.hash(MAX_LEVEL)
    }

    /// Representation depth.
    pub fn repr_depth(&self) -> u16 {
        self.depth(MAX_LEVEL)
    }

    /// First descriptor byte: refs, exotic flag, and level mask.
    pub fn d1(&self) -> u8 {
        descriptor_d1(self.0.refs.len(), self.is_exotic(), self.0.level_mask)
    }

    /// Second descriptor byte: data length in half-bytes, rounded up.
    pub fn d2(&self) -> u8 {
        descriptor_d2(self.bit_len())
    }

    /// Start reading the cell's data and references.
    pub fn parser(&self) -> CellSlice<'_> {
        CellSlice::new(self)
    }

    /// Count distinct cells reachable from this one, stopping once `limit`
    /// is exceeded.
    pub fn count_unique(&self, limit: usize) -> usize {
        let mut seen = std::collections::HashSet::new();
        let mut stack = vec![self];
        while let Some(cell) = stack.pop() {
            if seen.len() > limit {
                break;
            }
            if seen.insert(cell.repr_hash()) {
                stack.extend(cell.refs().iter());
            }
        }
        seen.len()
    }

    fn check_merkle_commitments(&self) -> Result<(), CellError> {
        let bytes = self.0.data.as_bytes();
        match self.0.cell_type {
            CellType::MerkleProof => {
                let child = &self.0.refs[0];
                check_commitment(self.0.cell_type, &bytes[1..33], &bytes[33..35], child)
            }
            CellType::MerkleUpdate => {
                let (old, new) = (&self.0.refs[0], &self.0.refs[1]);
                check_commitment(self.0.cell_type, &bytes[1..33], &bytes[65..67], old)?;
                check_commitment(self.0.cell_type, &bytes[33..65], &bytes[67..69], new)
            }
            _ => Ok(()),
        }
    }
}

fn check_commitment(
    cell_type: CellType,
    hash: &[u8],
    depth: &[u8],
    child: &Cell,
) -> Result<(), CellError> {
    let stored_hash = NodeHash::from_slice(hash)
        .map_err(|e| CellError::InvalidExotic(format!("{cell_type}: {e}")))?;
    let stored_depth = u16::from_be_bytes([depth[0], depth[1]]);
    if !stored_hash.ct_eq(&child.hash(0)) {
        return Err(CellError::ExoticHashMismatch(format!(
            "{cell_type} stores {stored_hash}, child hashes to {}",
            child.hash(0)
        )));
    }
    if stored_depth != child.depth(0) {
        return Err(CellError::ExoticHashMismatch(format!(
            "{cell_type} stores depth {stored_depth}, child depth is {}",
            child.depth(0)
        )));
    }
    Ok(())
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.repr_hash() == other.repr_hash()
    }
}

impl Eq for Cell {}

impl std::fmt::Debug for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("type", &self.cell_type())
            .field("bits", &self.bit_len())
            .field("refs", &self.refs().len())
            .field("level_mask", &self.level_mask().mask())
            .field("hash", &self.repr_hash())
            .finish()
    }
}

/// `refs + 8·exotic + 32·mask`.
pub(crate) fn descriptor_d1(refs: usize, exotic: bool, mask: LevelMask) -> u8 {
    refs as u8 + if exotic { 8 } else { 0 } + mask.mask() * 32
}

/// `⌊bits/8⌋ + ⌈bits/8⌉`.
pub(crate) fn descriptor_d2(bits: usize) -> u8 {
    (bits / 8 + (bits + 7) / 8) as u8
}

fn compute_hashes(
    cell_type: CellType,
    data: &BitString,
    refs: &[Cell],
    level_mask: LevelMask,
) -> Result<([NodeHash; 4], [u16; 4]), CellError> {
    let is_pruned = cell_type == CellType::PrunedBranch;
    let total = level_mask.hash_count();
    let own = if is_pruned { 1 } else { total };
    let offset = total - own;
    let shift = u8::from(cell_type.is_merkle());
    let d2 = descriptor_d2(data.len());

    let mut hashes: Vec<NodeHash> = Vec::with_capacity(own);
    let mut depths: Vec<u16> = Vec::with_capacity(own);
    let significant = (0..=level_mask.level()).filter(|l| level_mask.is_significant(*l));
    for (hash_i, level) in significant.enumerate() {
        if hash_i < offset {
            continue;
        }
        let mut hasher = Sha256::new();
        let d1 = descriptor_d1(refs.len(), cell_type.is_exotic(), level_mask.apply(level));
        hasher.update([d1, d2]);
        match hashes.last() {
            Some(prev) => hasher.update(prev.as_bytes()),
            None => hasher.update(data.to_padded_bytes()),
        }

        let mut depth: u16 = 0;
        for child in refs {
            let child_depth = child.depth(level + shift);
            hasher.update(child_depth.to_be_bytes());
            depth = depth.max(child_depth.saturating_add(1));
        }
        if depth > MAX_CELL_DEPTH {
            return Err(CellError::DepthLimit { depth, max: MAX_CELL_DEPTH });
        }
        for child in refs {
            hasher.update(child.hash(level + shift).as_bytes());
        }

        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        hashes.push(NodeHash::from_bytes(out));
        depths.push(depth);
    }

    let mut resolved_hashes = [NodeHash::ZERO; 4];
    let mut resolved_depths = [0u16; 4];
    let bytes = data.as_bytes();
    for level in 0..=MAX_LEVEL {
        let index = level_mask.apply(level).hash_index();
        let slot = usize::from(level);
        if is_pruned && index != level_mask.hash_index() {
            // Lower levels of a pruned branch come from its stored data.
            let stored = level_mask.hash_index();
            let h = 2 + index * 32;
            let d = 2 + stored * 32 + index * 2;
            resolved_hashes[slot] = NodeHash::from_slice(&bytes[h..h + 32])
                .map_err(|e| CellError::InvalidExotic(format!("pruned branch: {e}")))?;
            resolved_depths[slot] = u16::from_be_bytes([bytes[d], bytes[d + 1]]);
        } else {
            let i = if is_pruned { 0 } else { index };
            resolved_hashes[slot] = hashes[i];
            resolved_depths[slot] = depths[i];
        }
    }
    Ok((resolved_hashes, resolved_depths))
}
