//! # Test Fixtures — Dictionaries, Proofs and Updates
//!
//! Builds real dictionary cells in memory and produces Merkle proofs and
//! updates from them, pruning every subtree that holds none of the
//! requested keys. Used by this crate's tests and, behind the `testkit`
//! feature, by downstream crates.
//!
//! Fixture code: malformed input (a key of the wrong length) panics.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use exo_cell::{BitString, Cell, CellBuilder, MerkleUpdate};
use exo_core::{Address, CellError, NodeHash};
use sha2::{Digest, Sha256};

use crate::hasher::{ChildRef, NodeHasher, Sha256NodeHasher};
use crate::label::Label;

/// A dictionary value: data bits and references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    /// Value data bits.
    pub bits: BitString,
    /// Value references.
    pub refs: Vec<Cell>,
}

impl Value {
    /// A single-bit boolean value.
    pub fn bool(v: bool) -> Self {
        let mut bits = BitString::new();
        bits.push(v);
        Self {
            bits,
            refs: Vec::new(),
        }
    }
}

/// An in-memory `HashmapE` with fixed key length.
#[derive(Debug, Clone)]
pub struct Dictionary {
    key_bits: usize,
    entries: BTreeMap<BitString, Value>,
}

impl Dictionary {
    /// Empty dictionary keyed by `key_bits`-bit keys.
    pub fn new(key_bits: usize) -> Self {
        Self {
            key_bits,
            entries: BTreeMap::new(),
        }
    }

    /// Key length.
    pub fn key_bits(&self) -> usize {
        self.key_bits
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the dictionary is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace an entry.
    pub fn set(&mut self, key: BitString, value: Value) -> Option<Value> {
        assert_eq!(key.len(), self.key_bits, "fixture key has the wrong length");
        self.entries.insert(key, value)
    }

    /// Insert or replace a boolean entry.
    pub fn set_bool(&mut self, key: BitString, value: bool) -> Option<Value> {
        self.set(key, Value::bool(value))
    }

    /// Remove an entry.
    pub fn remove(&mut self, key: &BitString) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Look up an entry.
    pub fn get(&self, key: &BitString) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Root edge cell; `None` when empty.
    pub fn to_cell(&self) -> Result<Option<Cell>, CellError> {
        self.root_edge(None)
    }

    /// Representation hash of the root edge cell.
    pub fn root_hash(&self) -> Result<NodeHash, CellError> {
        Ok(self.require_root(None)?.hash(0))
    }

    /// Merkle proof keeping the paths to `keys` and pruning everything else.
    /// Absent keys keep the path down to where they would diverge.
    pub fn merkle_proof(&self, keys: &[BitString]) -> Result<Cell, CellError> {
        Cell::merkle_proof(&self.require_root(Some(keys))?)
    }

    /// Merkle update setting `key` to the boolean `value`.
    pub fn merkle_update(&self, key: &BitString, value: bool) -> Result<Cell, CellError> {
        self.merkle_update_with(key, Some(Value::bool(value)))
    }

    /// Merkle update removing `key`.
    pub fn merkle_removal(&self, key: &BitString) -> Result<Cell, CellError> {
        self.merkle_update_with(key, None)
    }

    /// Merkle update replacing (`Some`) or removing (`None`) `key`.
    pub fn merkle_update_with(&self, key: &BitString, value: Option<Value>) -> Result<Cell, CellError> {
        let targets = std::slice::from_ref(key);
        let old = self.require_root(Some(targets))?;
        let mut after = self.clone();
        match value {
            Some(v) => {
                after.set(key.clone(), v);
            }
            None => {
                after.remove(key);
            }
        }
        let new = after.require_root(Some(targets))?;
        Cell::merkle_update(&old, &new)
    }

    fn require_root(&self, targets: Option<&[BitString]>) -> Result<Cell, CellError> {
        self.root_edge(targets)?
            .ok_or_else(|| CellError::InvalidExotic("empty dictionary has no root cell".to_string()))
    }

    fn root_edge(&self, targets: Option<&[BitString]>) -> Result<Option<Cell>, CellError> {
        if self.entries.is_empty() {
            return Ok(None);
        }
        let entries: Vec<(BitString, &Value)> =
            self.entries.iter().map(|(k, v)| (k.clone(), v)).collect();
        build_edge(entries, self.key_bits, targets).map(Some)
    }
}

/// Build the edge holding `entries` (sorted keys of `key_bits` bits),
/// pruning every subtree no target key passes through.
fn build_edge<'v>(
    entries: Vec<(BitString, &'v Value)>,
    key_bits: usize,
    targets: Option<&[BitString]>,
) -> Result<Cell, CellError> {
    enum Step<'v> {
        /// Entries as key suffixes of length `remaining` below `prefix`.
        Edge {
            entries: Vec<(BitString, &'v Value)>,
            remaining: usize,
            prefix: BitString,
            pruning: bool,
        },
        Prune,
        Join(Label),
    }

    let mut work = vec![Step::Edge {
        entries,
        remaining: key_bits,
        prefix: BitString::new(),
        pruning: targets.is_some(),
    }];
    let mut built: Vec<Cell> = Vec::new();
    while let Some(step) = work.pop() {
        match step {
            Step::Edge {
                entries,
                remaining,
                prefix,
                pruning,
            } => {
                if let Some(keys) = targets.filter(|_| pruning) {
                    if !keys.iter().any(|k| k.starts_with(&prefix)) {
                        work.push(Step::Prune);
                        work.push(Step::Edge {
                            entries,
                            remaining,
                            prefix,
                            pruning: false,
                        });
                        continue;
                    }
                }

                if let [(key, value)] = entries.as_slice() {
                    let mut b = CellBuilder::new();
                    Label::canonical(key.clone(), remaining).store(&mut b)?;
                    b.store_bits(&value.bits)?;
                    for r in &value.refs {
                        b.store_reference(r.clone())?;
                    }
                    built.push(b.build()?);
                    continue;
                }

                let first = &entries[0].0;
                let last = &entries[entries.len() - 1].0;
                let common = first.common_prefix_len(last);
                let label = first.slice(0, common);
                let split = entries
                    .iter()
                    .position(|(k, _)| k.get(common) == Some(true))
                    .unwrap_or(entries.len());
                let child_remaining = remaining - common - 1;
                work.push(Step::Join(Label::canonical(label.clone(), remaining)));
                // Right first so the left subtree is built first.
                for (side, bit) in [(&entries[split..], true), (&entries[..split], false)] {
                    let shortened: Vec<(BitString, &Value)> = side
                        .iter()
                        .map(|(k, v)| (k.suffix(common + 1), *v))
                        .collect();
                    let mut child_prefix = prefix.clone();
                    child_prefix.extend_from(&label);
                    child_prefix.push(bit);
                    work.push(Step::Edge {
                        entries: shortened,
                        remaining: child_remaining,
                        prefix: child_prefix,
                        pruning,
                    });
                }
            }
            Step::Prune => {
                let full = built.pop().ok_or(CellError::RefUnderflow)?;
                built.push(Cell::pruned_branch(&full)?);
            }
            Step::Join(label) => {
                let (Some(right), Some(left)) = (built.pop(), built.pop()) else {
                    return Err(CellError::RefUnderflow);
                };
                let mut b = CellBuilder::new();
                label.store(&mut b)?;
                b.store_reference(left)?;
                b.store_reference(right)?;
                built.push(b.build()?);
            }
        }
    }
    built.pop().ok_or(CellError::RefUnderflow)
}

/// Deterministic address derived from `seed`, in workchain 0.
pub fn seeded_address(seed: &str) -> Address {
    let digest = Sha256::digest(seed.as_bytes());
    let mut account = [0u8; 32];
    account.copy_from_slice(&digest);
    Address::new(0, account)
}

/// Dictionary key of an address: its 267-bit `addr_std` serialization.
pub fn address_key(address: &Address) -> BitString {
    let mut key = BitString::with_capacity(Address::STD_BITS);
    key.push_uint(0b100, 3);
    key.push_uint(u64::from(address.workchain() as u8), 8);
    for byte in address.account() {
        key.push_uint(u64::from(*byte), 8);
    }
    key
}

/// Rebuild `update` with the first pruned node of its new tree replaced by
/// one carrying a different hash. Depths are preserved.
pub fn tamper_update(update: &Cell) -> Result<Cell, CellError> {
    let view = MerkleUpdate::from_cell(update)?;
    let new = replace_first_pruned(&view.new)?
        .ok_or_else(|| CellError::InvalidExotic("update has no pruned node to tamper".to_string()))?;
    Cell::merkle_update(&view.old, &new)
}

fn replace_first_pruned(cell: &Cell) -> Result<Option<Cell>, CellError> {
    if cell.cell_type() == exo_cell::CellType::PrunedBranch {
        let mut bytes = *cell.hash(0).as_bytes();
        bytes[0] ^= 0x01;
        return Cell::pruned_from_parts(&NodeHash::from_bytes(bytes), cell.depth(0)).map(Some);
    }
    for (i, child) in cell.refs().iter().enumerate() {
        if let Some(replaced) = replace_first_pruned(child)? {
            let mut b = CellBuilder::new();
            b.store_bits(cell.data())?;
            for (j, r) in cell.refs().iter().enumerate() {
                b.store_reference(if i == j { replaced.clone() } else { r.clone() })?;
            }
            return b.build().map(Some);
        }
    }
    Ok(None)
}

/// Hash engine that counts its invocations.
#[derive(Debug, Default)]
pub struct CountingHasher {
    calls: AtomicUsize,
}

impl CountingHasher {
    /// Number of leaf and fork hashes computed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl NodeHasher for CountingHasher {
    fn hash_leaf(&self, label: &Label, value_bits: &BitString, value_refs: &[ChildRef]) -> ChildRef {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Sha256NodeHasher.hash_leaf(label, value_bits, value_refs)
    }

    fn hash_fork(&self, label: &Label, left: ChildRef, right: ChildRef) -> ChildRef {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Sha256NodeHasher.hash_fork(label, left, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_key_matches_builder() {
        let addr = seeded_address("x");
        let mut b = CellBuilder::new();
        b.store_address(&addr).unwrap();
        assert_eq!(&address_key(&addr), b.build().unwrap().data());
    }

    #[test]
    fn test_single_entry_root_is_leaf() {
        let mut d = Dictionary::new(8);
        let mut key = BitString::new();
        key.push_uint(0xa5, 8);
        d.set_bool(key, true);
        let root = d.to_cell().unwrap().unwrap();
        assert!(root.refs().is_empty());
        // hml_long: 10, n=8 in 4 bits, 8 key bits, then the value bit
        assert_eq!(root.bit_len(), 2 + 4 + 8 + 1);
    }

    #[test]
    fn test_proof_hash_equals_root_hash() {
        let mut d = Dictionary::new(267);
        for i in 0..6 {
            d.set_bool(address_key(&seeded_address(&i.to_string())), true);
        }
        let proof = d
            .merkle_proof(&[address_key(&seeded_address("2"))])
            .unwrap();
        let view = exo_cell::MerkleProof::from_cell(&proof).unwrap();
        assert_eq!(view.hash, d.root_hash().unwrap());
    }
}
