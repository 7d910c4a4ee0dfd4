//! # Proof Decoder — Typed Skeletons of Pruned Dictionaries
//!
//! Turns a Merkle proof or Merkle update into a tree of [`Node`]s: pruned
//! stand-ins carrying only a hash and depth, forks with two children, and
//! leaves carrying a value.
//!
//! ## Security Invariant
//!
//! Decoding never computes a hash. It works on the unhashed records of
//! phase one of the bag-of-cells decoder, so every structural violation
//! (wrong exotic tag, truncated labels, children count, remaining-length
//! violations, size ceilings) is reported before the hash engine runs.
//!
//! ## Remaining-Length Invariant
//!
//! The root edge is parsed against the configured key length. A child
//! edge is parsed against `parent remaining − label length − 1`; a label
//! longer than its remaining length is a shape mismatch.

use std::sync::Arc;

use exo_cell::{BitReader, BitString, Cell, CellType, DecodeLimits, RawBoc};
use exo_core::{NodeHash, VerifyError};

use crate::hasher::ChildRef;
use crate::label::Label;

/// Key length of a dictionary keyed by `MsgAddressInt`.
pub const DEFAULT_KEY_BITS: usize = 267;

/// Longest supported key.
pub const MAX_KEY_BITS: usize = 1023;

/// Value stored at a leaf: the rest of the leaf cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafValue {
    /// Value data bits.
    pub bits: BitString,
    /// Indices of the value's references in the decoded arena.
    pub refs: Vec<usize>,
}

/// A node of a decoded dictionary skeleton.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Elided subtree, asserted by hash and depth.
    Pruned(ChildRef),
    /// Edge ending in a fork.
    Fork {
        /// Edge label.
        label: Label,
        /// Subtree for next key bit `0`.
        left: Box<Node>,
        /// Subtree for next key bit `1`.
        right: Box<Node>,
    },
    /// Edge ending in a value.
    Leaf {
        /// Edge label.
        label: Label,
        /// Stored value.
        value: LeafValue,
    },
}

impl Node {
    /// Whether the node is a pruned stand-in.
    pub fn is_pruned(&self) -> bool {
        matches!(self, Self::Pruned(_))
    }

    /// Edge label, for present nodes.
    pub fn label(&self) -> Option<&Label> {
        match self {
            Self::Pruned(_) => None,
            Self::Fork { label, .. } | Self::Leaf { label, .. } => Some(label),
        }
    }

    fn visit(&self, mut f: impl FnMut(&Node)) {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            f(node);
            if let Self::Fork { left, right, .. } = node {
                stack.push(right);
                stack.push(left);
            }
        }
    }
}

/// Node counts of a skeleton.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SkeletonStats {
    /// Pruned stand-ins.
    pub pruned: usize,
    /// Forks.
    pub forks: usize,
    /// Leaves.
    pub leaves: usize,
}

/// A decoded Merkle proof.
#[derive(Debug, Clone)]
pub struct ProofSkeleton {
    root: Node,
    key_bits: usize,
    claimed: ChildRef,
    arena: Arc<RawBoc>,
}

impl ProofSkeleton {
    /// Root node.
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Key length the skeleton was decoded against.
    pub fn key_bits(&self) -> usize {
        self.key_bits
    }

    /// Hash and depth the wrapping exotic cell commits to.
    pub fn claimed(&self) -> ChildRef {
        self.claimed
    }

    /// Records backing leaf value references.
    pub fn arena(&self) -> &RawBoc {
        &self.arena
    }

    /// Count nodes by kind.
    pub fn stats(&self) -> SkeletonStats {
        let mut stats = SkeletonStats::default();
        self.root.visit(|node| match node {
            Node::Pruned(_) => stats.pruned += 1,
            Node::Fork { .. } => stats.forks += 1,
            Node::Leaf { .. } => stats.leaves += 1,
        });
        stats
    }
}

/// A decoded Merkle update: two independently owned skeletons.
#[derive(Debug, Clone)]
pub struct UpdateSkeleton {
    /// Dictionary before the update.
    pub old: ProofSkeleton,
    /// Dictionary after the update.
    pub new: ProofSkeleton,
}

/// Decodes proofs and updates for dictionaries with a fixed key length.
#[derive(Debug, Clone)]
pub struct ProofDecoder {
    key_bits: usize,
    limits: DecodeLimits,
}

impl Default for ProofDecoder {
    fn default() -> Self {
        Self {
            key_bits: DEFAULT_KEY_BITS,
            limits: DecodeLimits::default(),
        }
    }
}

impl ProofDecoder {
    /// Decoder for `key_bits`-bit keys under `limits`.
    pub fn new(key_bits: usize, limits: DecodeLimits) -> Result<Self, VerifyError> {
        if key_bits == 0 || key_bits > MAX_KEY_BITS {
            return Err(VerifyError::MalformedStructure(format!(
                "key length {key_bits} outside 1..={MAX_KEY_BITS}"
            )));
        }
        Ok(Self { key_bits, limits })
    }

    /// Configured key length.
    pub fn key_bits(&self) -> usize {
        self.key_bits
    }

    /// Configured limits.
    pub fn limits(&self) -> &DecodeLimits {
        &self.limits
    }

    /// Decode a serialized Merkle proof.
    pub fn decode_proof_boc(&self, bytes: &[u8]) -> Result<ProofSkeleton, VerifyError> {
        let (arena, root) = self.parse_single(bytes)?;
        self.decode_proof_raw(arena, root)
    }

    /// Decode a Merkle proof cell.
    pub fn decode_proof(&self, cell: &Cell) -> Result<ProofSkeleton, VerifyError> {
        let arena = Arc::new(RawBoc::from_cell(cell, &self.limits)?);
        self.decode_proof_raw(arena, 0)
    }

    /// Decode a serialized Merkle update.
    pub fn decode_update_boc(&self, bytes: &[u8]) -> Result<UpdateSkeleton, VerifyError> {
        let (arena, root) = self.parse_single(bytes)?;
        self.decode_update_raw(arena, root)
    }

    /// Decode a Merkle update cell.
    pub fn decode_update(&self, cell: &Cell) -> Result<UpdateSkeleton, VerifyError> {
        let arena = Arc::new(RawBoc::from_cell(cell, &self.limits)?);
        self.decode_update_raw(arena, 0)
    }

    fn parse_single(&self, bytes: &[u8]) -> Result<(Arc<RawBoc>, usize), VerifyError> {
        let raw = RawBoc::parse(bytes, &self.limits)?;
        if raw.roots.len() != 1 {
            return Err(VerifyError::MalformedStructure(format!(
                "expected one root, found {}",
                raw.roots.len()
            )));
        }
        let root = raw.roots[0];
        Ok((Arc::new(raw), root))
    }

    fn expect_type(arena: &RawBoc, index: usize, expected: CellType) -> Result<(), VerifyError> {
        let found = arena.cells[index].cell_type;
        if found != expected {
            return Err(VerifyError::MalformedStructure(format!(
                "expected {expected} cell, found {found}"
            )));
        }
        Ok(())
    }

    fn decode_proof_raw(&self, arena: Arc<RawBoc>, root: usize) -> Result<ProofSkeleton, VerifyError> {
        Self::expect_type(&arena, root, CellType::MerkleProof)?;
        let record = &arena.cells[root];
        let mut reader = BitReader::new(&record.data);
        reader.skip(8)?;
        let hash = load_hash(&mut reader)?;
        let depth = reader.load_uint(16)? as u16;
        let child = record.refs[0];

        let mut budget = self.limits.max_cells;
        let node = decode_node(&arena, child, self.key_bits, &mut budget)?;
        tracing::debug!(
            key_bits = self.key_bits,
            nodes = self.limits.max_cells - budget,
            "decoded merkle proof skeleton"
        );
        Ok(ProofSkeleton {
            root: node,
            key_bits: self.key_bits,
            claimed: ChildRef { hash, depth },
            arena,
        })
    }

    fn decode_update_raw(&self, arena: Arc<RawBoc>, root: usize) -> Result<UpdateSkeleton, VerifyError> {
        Self::expect_type(&arena, root, CellType::MerkleUpdate)?;
        let record = &arena.cells[root];
        let mut reader = BitReader::new(&record.data);
        reader.skip(8)?;
        let old_hash = load_hash(&mut reader)?;
        let new_hash = load_hash(&mut reader)?;
        let old_depth = reader.load_uint(16)? as u16;
        let new_depth = reader.load_uint(16)? as u16;
        let (old_child, new_child) = (record.refs[0], record.refs[1]);

        let mut budget = self.limits.max_cells;
        let old = decode_node(&arena, old_child, self.key_bits, &mut budget)?;
        let new = decode_node(&arena, new_child, self.key_bits, &mut budget)?;
        tracing::debug!(
            key_bits = self.key_bits,
            nodes = self.limits.max_cells - budget,
            "decoded merkle update skeletons"
        );
        Ok(UpdateSkeleton {
            old: ProofSkeleton {
                root: old,
                key_bits: self.key_bits,
                claimed: ChildRef {
                    hash: old_hash,
                    depth: old_depth,
                },
                arena: Arc::clone(&arena),
            },
            new: ProofSkeleton {
                root: new,
                key_bits: self.key_bits,
                claimed: ChildRef {
                    hash: new_hash,
                    depth: new_depth,
                },
                arena,
            },
        })
    }
}

fn load_hash(reader: &mut BitReader<'_>) -> Result<NodeHash, VerifyError> {
    let bits = reader.load_bits(256)?;
    NodeHash::from_slice(bits.as_bytes())
        .map_err(|e| VerifyError::MalformedStructure(e.to_string()))
}

/// Level-0 hash and depth stored in a pruned branch record.
fn pruned_level_zero(data: &BitString, hashes: usize) -> Result<ChildRef, VerifyError> {
    let bytes = data.as_bytes();
    let depth_at = 2 + hashes * 32;
    if bytes.len() < depth_at + 2 {
        return Err(VerifyError::MalformedStructure(
            "pruned branch truncated".to_string(),
        ));
    }
    let hash = NodeHash::from_slice(&bytes[2..34])
        .map_err(|e| VerifyError::MalformedStructure(e.to_string()))?;
    let depth = u16::from_be_bytes([bytes[depth_at], bytes[depth_at + 1]]);
    Ok(ChildRef { hash, depth })
}

/// Pending work of [`decode_node`].
enum Frame {
    /// Decode the edge at `index` against `remaining` key bits.
    Edge { index: usize, remaining: usize },
    /// Both children decoded; assemble the fork.
    Fork { label: Label },
}

/// One decoded edge record.
enum Decoded {
    Done(Node),
    Fork { label: Label, children: [usize; 2], below: usize },
}

/// Decode the dictionary rooted at `index`, depth-first with an explicit
/// stack so input depth never grows the call stack.
fn decode_node(
    arena: &RawBoc,
    index: usize,
    remaining: usize,
    budget: &mut usize,
) -> Result<Node, VerifyError> {
    let mut work = vec![Frame::Edge { index, remaining }];
    let mut done: Vec<Node> = Vec::new();
    while let Some(frame) = work.pop() {
        match frame {
            Frame::Edge { index, remaining } => {
                if *budget == 0 {
                    return Err(VerifyError::MalformedStructure(
                        "skeleton exceeds node limit".to_string(),
                    ));
                }
                *budget -= 1;
                match decode_edge(arena, index, remaining)? {
                    Decoded::Done(node) => done.push(node),
                    Decoded::Fork {
                        label,
                        children: [left, right],
                        below,
                    } => {
                        work.push(Frame::Fork { label });
                        work.push(Frame::Edge {
                            index: right,
                            remaining: below - 1,
                        });
                        work.push(Frame::Edge {
                            index: left,
                            remaining: below - 1,
                        });
                    }
                }
            }
            Frame::Fork { label } => {
                let (Some(right), Some(left)) = (done.pop(), done.pop()) else {
                    return Err(VerifyError::MalformedStructure(
                        "fork decoded without both children".to_string(),
                    ));
                };
                done.push(Node::Fork {
                    label,
                    left: Box::new(left),
                    right: Box::new(right),
                });
            }
        }
    }
    done.pop()
        .ok_or_else(|| VerifyError::MalformedStructure("empty skeleton".to_string()))
}

fn decode_edge(arena: &RawBoc, index: usize, remaining: usize) -> Result<Decoded, VerifyError> {
    let record = arena
        .cells
        .get(index)
        .ok_or_else(|| VerifyError::MalformedStructure(format!("cell {index} out of range")))?;
    match record.cell_type {
        CellType::PrunedBranch => Ok(Decoded::Done(Node::Pruned(pruned_level_zero(
            &record.data,
            record.level_mask.hash_index(),
        )?))),
        CellType::Ordinary => {
            let mut reader = BitReader::new(&record.data);
            let label = Label::parse(&mut reader, remaining)?;
            let below = label.remaining_after();
            if below == 0 {
                return Ok(Decoded::Done(Node::Leaf {
                    label,
                    value: LeafValue {
                        bits: reader.rest(),
                        refs: record.refs.clone(),
                    },
                }));
            }
            if reader.remaining() != 0 {
                return Err(VerifyError::MalformedStructure(format!(
                    "fork carries {} extra data bits",
                    reader.remaining()
                )));
            }
            if record.refs.len() != 2 {
                return Err(VerifyError::MalformedStructure(format!(
                    "fork has {} refs, needs 2",
                    record.refs.len()
                )));
            }
            Ok(Decoded::Fork {
                label,
                children: [record.refs[0], record.refs[1]],
                below,
            })
        }
        other => Err(VerifyError::MalformedStructure(format!(
            "{other} cell inside a dictionary"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{address_key, seeded_address, Dictionary};
    use exo_cell::{serialize, CellBuilder};

    fn dict(n: usize) -> Dictionary {
        let mut d = Dictionary::new(DEFAULT_KEY_BITS);
        for i in 0..n {
            d.set_bool(address_key(&seeded_address(&format!("entry-{i}"))), true);
        }
        d
    }

    #[test]
    fn test_decodes_single_key_proof() {
        let d = dict(11);
        let key = address_key(&seeded_address("entry-0"));
        let proof = d.merkle_proof(&[key]).unwrap();
        let skeleton = ProofDecoder::default().decode_proof(&proof).unwrap();
        let stats = skeleton.stats();
        assert_eq!(stats.leaves, 1);
        assert_eq!(stats.pruned, stats.forks);
        assert_eq!(skeleton.claimed().hash, d.root_hash().unwrap());
    }

    #[test]
    fn test_boc_and_cell_paths_agree() {
        let d = dict(5);
        let key = address_key(&seeded_address("entry-3"));
        let proof = d.merkle_proof(&[key]).unwrap();
        let bytes = serialize(&proof, true).unwrap();
        let decoder = ProofDecoder::default();
        let from_cell = decoder.decode_proof(&proof).unwrap();
        let from_boc = decoder.decode_proof_boc(&bytes).unwrap();
        assert_eq!(from_cell.root(), from_boc.root());
        assert_eq!(from_cell.claimed(), from_boc.claimed());
    }

    #[test]
    fn test_rejects_wrong_exotic_tag() {
        let d = dict(3);
        let key = address_key(&seeded_address("entry-1"));
        let update = d.merkle_update(&key, false).unwrap();
        let err = ProofDecoder::default().decode_proof(&update).unwrap_err();
        assert!(matches!(err, VerifyError::MalformedStructure(_)));

        let plain = d.to_cell().unwrap().unwrap();
        assert!(matches!(
            ProofDecoder::default().decode_proof(&plain),
            Err(VerifyError::MalformedStructure(_))
        ));
    }

    #[test]
    fn test_label_longer_than_remaining_is_shape_mismatch() {
        let mut edge = CellBuilder::new();
        edge.store_bits(&BitString::from_binary_str("011111010101").unwrap())
            .unwrap();
        let proof = Cell::merkle_proof(&edge.build().unwrap()).unwrap();
        let decoder = ProofDecoder::new(3, DecodeLimits::default()).unwrap();
        assert!(matches!(
            decoder.decode_proof(&proof),
            Err(VerifyError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_fork_with_one_ref_is_malformed() {
        let mut edge = CellBuilder::new();
        Label::canonical(BitString::new(), 8).store(&mut edge).unwrap();
        edge.store_reference(CellBuilder::new().build().unwrap()).unwrap();
        let edge = edge.build().unwrap();
        let proof = Cell::merkle_proof(&edge).unwrap();
        let decoder = ProofDecoder::new(8, DecodeLimits::default()).unwrap();
        let err = decoder.decode_proof(&proof).unwrap_err();
        assert!(err.to_string().contains("needs 2"));
    }

    #[test]
    fn test_single_pruned_root_is_valid() {
        let pruned = Cell::pruned_from_parts(&NodeHash::from_bytes([5; 32]), 0).unwrap();
        let proof = Cell::merkle_proof(&pruned).unwrap();
        let skeleton = ProofDecoder::default().decode_proof(&proof).unwrap();
        assert!(skeleton.root().is_pruned());
        assert_eq!(skeleton.stats().pruned, 1);
    }

    #[test]
    fn test_node_budget_enforced() {
        let d = dict(11);
        let key = address_key(&seeded_address("entry-0"));
        let proof = d.merkle_proof(&[key]).unwrap();
        let tight = ProofDecoder::new(
            DEFAULT_KEY_BITS,
            DecodeLimits {
                max_cells: 3,
                max_depth: 1023,
            },
        )
        .unwrap();
        assert!(tight.decode_proof(&proof).is_err());
    }

    #[test]
    fn test_key_bits_validated() {
        assert!(ProofDecoder::new(0, DecodeLimits::default()).is_err());
        assert!(ProofDecoder::new(1024, DecodeLimits::default()).is_err());
        assert!(ProofDecoder::new(1023, DecodeLimits::default()).is_ok());
    }
}
