//! # Bag of Cells — Generic Serialization Format
//!
//! Decodes and encodes the `serialized_boc#b5ee9c72` container.
//!
//! ## Two-Phase Decoding
//!
//! [`RawBoc::parse()`] validates framing, the optional CRC32-C trailer, the
//! reference graph (every reference points strictly forward), every exotic
//! cell layout, declared level masks, and the depth ceiling, without
//! computing a single hash. Only [`RawBoc::into_cells()`] builds cells,
//! bottom-up, hashing each once. Malformed or oversized input is therefore
//! rejected before any hashing work is spent on it.
//!
//! ## Security Invariant
//!
//! Cell count and depth are bounded by [`DecodeLimits`] before any
//! allocation proportional to the declared sizes.

use std::collections::{HashMap, HashSet};

use exo_core::{CellError, NodeHash};
use serde::{Deserialize, Serialize};

use crate::bits::BitString;
use crate::cell::{descriptor_d1, descriptor_d2, resolve_layout, Cell, CellType, MAX_REFS};
use crate::crc::crc32c;
use crate::level::LevelMask;

/// Magic prefix of the generic bag-of-cells format.
pub const BOC_MAGIC: u32 = 0xb5ee_9c72;

const FLAG_HAS_IDX: u8 = 0x80;
const FLAG_HAS_CRC32C: u8 = 0x40;
const FLAG_RESERVED: u8 = 0x18;
const SIZE_MASK: u8 = 0x07;

/// Resource ceilings enforced while decoding untrusted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecodeLimits {
    /// Maximum number of cells in one bag.
    pub max_cells: usize,
    /// Maximum depth of any root.
    pub max_depth: u16,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_cells: 4096,
            max_depth: 1023,
        }
    }
}

/// A structurally validated, not yet hashed, cell record.
#[derive(Debug, Clone)]
pub struct RawCell {
    /// Exotic type, or ordinary.
    pub cell_type: CellType,
    /// Data bits with the completion tag removed.
    pub data: BitString,
    /// Indices of referenced records; all greater than this record's index.
    pub refs: Vec<usize>,
    /// Level mask derived from the layout.
    pub level_mask: LevelMask,
    /// Depth in the reference graph.
    pub depth: u16,
}

/// Result of phase one: validated records and root indices.
#[derive(Debug, Clone)]
pub struct RawBoc {
    /// Cell records in serialization order.
    pub cells: Vec<RawCell>,
    /// Indices of the roots.
    pub roots: Vec<usize>,
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CellError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                CellError::Boc(format!(
                    "truncated: need {n} bytes at offset {}, have {}",
                    self.pos,
                    self.bytes.len() - self.pos
                ))
            })?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, CellError> {
        Ok(self.take(1)?[0])
    }

    fn uint(&mut self, n: usize) -> Result<usize, CellError> {
        let value = self
            .take(n)?
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
        usize::try_from(value).map_err(|_| CellError::Boc(format!("value {value} too large")))
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

impl RawBoc {
    /// Phase one: parse and validate without hashing.
    pub fn parse(bytes: &[u8], limits: &DecodeLimits) -> Result<Self, CellError> {
        let mut r = Reader { bytes, pos: 0 };
        let magic = r.uint(4)? as u32;
        if magic != BOC_MAGIC {
            return Err(CellError::Boc(format!("unknown magic {magic:#010x}")));
        }
        let flags = r.u8()?;
        if flags & FLAG_RESERVED != 0 {
            return Err(CellError::Boc(format!("reserved flags set: {flags:#04x}")));
        }
        let has_idx = flags & FLAG_HAS_IDX != 0;
        let has_crc = flags & FLAG_HAS_CRC32C != 0;
        let size = usize::from(flags & SIZE_MASK);
        if !(1..=4).contains(&size) {
            return Err(CellError::Boc(format!("reference size {size} out of range")));
        }
        let off_bytes = usize::from(r.u8()?);
        if !(1..=8).contains(&off_bytes) {
            return Err(CellError::Boc(format!("offset size {off_bytes} out of range")));
        }

        let cell_count = r.uint(size)?;
        let root_count = r.uint(size)?;
        let absent = r.uint(size)?;
        let tot_cells_size = r.uint(off_bytes)?;
        if cell_count == 0 {
            return Err(CellError::Boc("no cells".to_string()));
        }
        if cell_count > limits.max_cells {
            return Err(CellError::CellLimit {
                cells: cell_count,
                max: limits.max_cells,
            });
        }
        if root_count == 0 || root_count > cell_count {
            return Err(CellError::Boc(format!(
                "{root_count} roots for {cell_count} cells"
            )));
        }
        if absent != 0 {
            return Err(CellError::Boc("absent cells are not supported".to_string()));
        }

        if has_crc {
            if bytes.len() < 4 {
                return Err(CellError::Boc("missing checksum".to_string()));
            }
            let (payload, trailer) = bytes.split_at(bytes.len() - 4);
            let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
            let computed = crc32c(payload);
            if expected != computed {
                return Err(CellError::ChecksumMismatch { expected, computed });
            }
        }

        let mut roots = Vec::with_capacity(root_count);
        for _ in 0..root_count {
            let root = r.uint(size)?;
            if root >= cell_count {
                return Err(CellError::Boc(format!("root index {root} out of range")));
            }
            roots.push(root);
        }
        if has_idx {
            let idx_len = cell_count
                .checked_mul(off_bytes)
                .ok_or_else(|| CellError::Boc("index size overflow".to_string()))?;
            r.take(idx_len)?;
        }

        let trailer = if has_crc { 4 } else { 0 };
        if tot_cells_size.checked_add(trailer) != Some(r.remaining()) {
            return Err(CellError::Boc(format!(
                "cell data is {} bytes, header declares {tot_cells_size}",
                r.remaining().saturating_sub(trailer)
            )));
        }
        let mut data = Reader {
            bytes: r.take(tot_cells_size)?,
            pos: 0,
        };

        struct Record {
            exotic: bool,
            declared_mask: u8,
            data: BitString,
            refs: Vec<usize>,
        }

        let mut records = Vec::with_capacity(cell_count);
        for index in 0..cell_count {
            let d1 = data.u8()?;
            let d2 = data.u8()?;
            let ref_count = usize::from(d1 & 7);
            if ref_count > MAX_REFS {
                return Err(CellError::Boc(format!(
                    "cell {index} declares {ref_count} refs"
                )));
            }
            let exotic = d1 & 8 != 0;
            let with_hashes = d1 & 16 != 0;
            let declared_mask = d1 >> 5;
            if with_hashes {
                let mask = LevelMask::new(declared_mask)
                    .ok_or_else(|| CellError::Boc(format!("cell {index} level mask")))?;
                data.take(mask.hash_count() * (32 + 2))?;
            }

            let byte_len = usize::from(d2 / 2 + d2 % 2);
            let raw = data.take(byte_len)?;
            let bits = if d2 % 2 == 0 {
                byte_len * 8
            } else {
                let last = raw[byte_len - 1];
                if last == 0 {
                    return Err(CellError::Boc(format!(
                        "cell {index} missing completion tag"
                    )));
                }
                byte_len * 8 - 1 - last.trailing_zeros() as usize
            };
            let bits = BitString::from_bytes(raw, bits)
                .ok_or_else(|| CellError::Boc(format!("cell {index} data truncated")))?;

            let mut refs = Vec::with_capacity(ref_count);
            for _ in 0..ref_count {
                let target = data.uint(size)?;
                if target <= index || target >= cell_count {
                    return Err(CellError::Boc(format!(
                        "cell {index} references {target}; references must point forward"
                    )));
                }
                refs.push(target);
            }
            records.push(Record {
                exotic,
                declared_mask,
                data: bits,
                refs,
            });
        }

        if data.remaining() != 0 {
            return Err(CellError::Boc(format!(
                "{} unused bytes after the last cell",
                data.remaining()
            )));
        }

        // Children always follow parents, so resolve from the end.
        let mut resolved: Vec<Option<RawCell>> = vec![None; cell_count];
        for index in (0..cell_count).rev() {
            let record = &records[index];
            let mut masks = Vec::with_capacity(record.refs.len());
            let mut depth: u16 = 0;
            for target in &record.refs {
                let child = resolved[*target]
                    .as_ref()
                    .ok_or_else(|| CellError::Boc(format!("cell {target} unresolved")))?;
                masks.push(child.level_mask);
                depth = depth.max(child.depth.saturating_add(1));
            }
            if depth > limits.max_depth {
                return Err(CellError::DepthLimit {
                    depth,
                    max: limits.max_depth,
                });
            }
            let (cell_type, level_mask) = resolve_layout(record.exotic, &record.data, &masks)?;
            if level_mask.mask() != record.declared_mask {
                return Err(CellError::Boc(format!(
                    "cell {index} declares level mask {}, layout gives {}",
                    record.declared_mask,
                    level_mask.mask()
                )));
            }
            resolved[index] = Some(RawCell {
                cell_type,
                data: record.data.clone(),
                refs: record.refs.clone(),
                level_mask,
                depth,
            });
        }

        let cells = resolved
            .into_iter()
            .enumerate()
            .map(|(i, c)| c.ok_or_else(|| CellError::Boc(format!("cell {i} unresolved"))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { cells, roots })
    }

    /// Total number of records.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Phase two: build and hash cells bottom-up, returning the roots.
    pub fn into_cells(self) -> Result<Vec<Cell>, CellError> {
        let mut built: Vec<Option<Cell>> = vec![None; self.cells.len()];
        for (index, raw) in self.cells.into_iter().enumerate().rev() {
            let refs = raw
                .refs
                .iter()
                .map(|t| {
                    built[*t]
                        .clone()
                        .ok_or_else(|| CellError::Boc(format!("cell {t} unbuilt")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            built[index] = Some(Cell::new(raw.data, refs, raw.cell_type.is_exotic())?);
        }
        self.roots
            .iter()
            .map(|r| {
                built[*r]
                    .clone()
                    .ok_or_else(|| CellError::Boc(format!("root {r} unbuilt")))
            })
            .collect()
    }
}

impl RawBoc {
    /// Flatten an already built tree into unhashed records, enforcing the
    /// same limits as [`RawBoc::parse()`]. Shared subtrees are stored once.
    pub fn from_cell(root: &Cell, limits: &DecodeLimits) -> Result<Self, CellError> {
        let order = topological_order(root, limits.max_cells)?;
        let index: HashMap<NodeHash, usize> = order
            .iter()
            .enumerate()
            .map(|(i, c)| (c.repr_hash(), i))
            .collect();

        let mut cells: Vec<Option<RawCell>> = vec![None; order.len()];
        for (i, cell) in order.iter().enumerate().rev() {
            let mut refs = Vec::with_capacity(cell.refs().len());
            let mut depth: u16 = 0;
            for child in cell.refs() {
                let target = index
                    .get(&child.repr_hash())
                    .copied()
                    .ok_or_else(|| CellError::Boc("child missing from order".to_string()))?;
                let child_depth = cells[target].as_ref().map_or(0, |c| c.depth);
                depth = depth.max(child_depth.saturating_add(1));
                refs.push(target);
            }
            if depth > limits.max_depth {
                return Err(CellError::DepthLimit {
                    depth,
                    max: limits.max_depth,
                });
            }
            cells[i] = Some(RawCell {
                cell_type: cell.cell_type(),
                data: cell.data().clone(),
                refs,
                level_mask: cell.level_mask(),
                depth,
            });
        }
        let cells = cells.into_iter().flatten().collect();
        Ok(Self {
            cells,
            roots: vec![0],
        })
    }

    /// Build and hash the subtree rooted at record `index`.
    pub fn build(&self, index: usize) -> Result<Cell, CellError> {
        if index >= self.cells.len() {
            return Err(CellError::Boc(format!("cell {index} out of range")));
        }
        let mut reachable = vec![false; self.cells.len()];
        reachable[index] = true;
        for i in index..self.cells.len() {
            if reachable[i] {
                for target in &self.cells[i].refs {
                    reachable[*target] = true;
                }
            }
        }
        let mut built: HashMap<usize, Cell> = HashMap::new();
        for i in (index..self.cells.len()).rev().filter(|i| reachable[*i]) {
            let raw = &self.cells[i];
            let refs = raw
                .refs
                .iter()
                .map(|t| {
                    built
                        .get(t)
                        .cloned()
                        .ok_or_else(|| CellError::Boc(format!("cell {t} unbuilt")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            built.insert(i, Cell::new(raw.data.clone(), refs, raw.cell_type.is_exotic())?);
        }
        built
            .remove(&index)
            .ok_or_else(|| CellError::Boc(format!("cell {index} unbuilt")))
    }
}

/// Decode every root of a bag of cells.
pub fn deserialize(bytes: &[u8], limits: &DecodeLimits) -> Result<Vec<Cell>, CellError> {
    let raw = RawBoc::parse(bytes, limits)?;
    tracing::debug!(cells = raw.cell_count(), roots = raw.roots.len(), "parsed bag of cells");
    raw.into_cells()
}

/// Decode a bag of cells that must hold exactly one root.
pub fn deserialize_single(bytes: &[u8], limits: &DecodeLimits) -> Result<Cell, CellError> {
    let mut roots = deserialize(bytes, limits)?;
    if roots.len() != 1 {
        return Err(CellError::Boc(format!("expected one root, found {}", roots.len())));
    }
    roots
        .pop()
        .ok_or_else(|| CellError::Boc("no root".to_string()))
}

fn bytes_needed(value: usize) -> usize {
    let bits = usize::BITS - value.leading_zeros();
    ((bits as usize + 7) / 8).max(1)
}

/// Distinct cells of the tree, parents before children, root first.
fn topological_order(root: &Cell, max_cells: usize) -> Result<Vec<Cell>, CellError> {
    let mut seen: HashSet<NodeHash> = HashSet::new();
    let mut order = Vec::new();
    // Post-order walk; `true` marks a cell whose children are queued.
    let mut stack: Vec<(&Cell, bool)> = vec![(root, false)];
    while let Some((cell, expanded)) = stack.pop() {
        if expanded {
            order.push(cell.clone());
            continue;
        }
        if !seen.insert(cell.repr_hash()) {
            continue;
        }
        if seen.len() > max_cells {
            return Err(CellError::CellLimit {
                cells: seen.len(),
                max: max_cells,
            });
        }
        stack.push((cell, true));
        stack.extend(cell.refs().iter().rev().map(|child| (child, false)));
    }
    order.reverse();
    Ok(order)
}

/// Encode `root` as a single-root bag of cells, with a CRC32-C trailer when
/// `with_crc` is set. Identical subtrees are stored once.
pub fn serialize(root: &Cell, with_crc: bool) -> Result<Vec<u8>, CellError> {
    let order = topological_order(root, usize::MAX)?;
    let index: HashMap<NodeHash, usize> = order
        .iter()
        .enumerate()
        .map(|(i, c)| (c.repr_hash(), i))
        .collect();

    let size = bytes_needed(order.len());
    let mut cell_data = Vec::new();
    for cell in &order {
        cell_data.push(descriptor_d1(cell.refs().len(), cell.is_exotic(), cell.level_mask()));
        cell_data.push(descriptor_d2(cell.bit_len()));
        cell_data.extend_from_slice(&cell.data().to_padded_bytes());
        for child in cell.refs() {
            let target = index
                .get(&child.repr_hash())
                .copied()
                .ok_or_else(|| CellError::Boc("child missing from order".to_string()))?;
            push_uint(&mut cell_data, target, size);
        }
    }
    let off_bytes = bytes_needed(cell_data.len());

    let mut out = Vec::with_capacity(cell_data.len() + 32);
    out.extend_from_slice(&BOC_MAGIC.to_be_bytes());
    let mut flags = size as u8;
    if with_crc {
        flags |= FLAG_HAS_CRC32C;
    }
    out.push(flags);
    out.push(off_bytes as u8);
    push_uint(&mut out, order.len(), size);
    push_uint(&mut out, 1, size);
    push_uint(&mut out, 0, size);
    push_uint(&mut out, cell_data.len(), off_bytes);
    push_uint(&mut out, 0, size);
    out.extend_from_slice(&cell_data);
    if with_crc {
        let crc = crc32c(&out);
        out.extend_from_slice(&crc.to_le_bytes());
    }
    Ok(out)
}

fn push_uint(out: &mut Vec<u8>, value: usize, bytes: usize) {
    let be = (value as u64).to_be_bytes();
    out.extend_from_slice(&be[8 - bytes..]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CellBuilder;

    fn sample_tree() -> Cell {
        let mut shared = CellBuilder::new();
        shared.store_uint(0x5a, 7).unwrap();
        let shared = shared.build().unwrap();
        let mut mid = CellBuilder::new();
        mid.store_uint(1, 1).unwrap();
        mid.store_reference(shared.clone()).unwrap();
        let mid = mid.build().unwrap();
        let mut root = CellBuilder::new();
        root.store_uint(0xfeed, 16).unwrap();
        root.store_reference(mid).unwrap();
        root.store_reference(shared).unwrap();
        root.build().unwrap()
    }

    #[test]
    fn test_roundtrip_preserves_hash_and_dedups() {
        let root = sample_tree();
        for with_crc in [false, true] {
            let bytes = serialize(&root, with_crc).unwrap();
            let raw = RawBoc::parse(&bytes, &DecodeLimits::default()).unwrap();
            assert_eq!(raw.cell_count(), 3);
            let decoded = raw.into_cells().unwrap();
            assert_eq!(decoded[0].repr_hash(), root.repr_hash());
        }
    }

    #[test]
    fn test_empty_cell_known_encoding() {
        let cell = CellBuilder::new().build().unwrap();
        let bytes = serialize(&cell, false).unwrap();
        assert_eq!(
            bytes,
            vec![0xb5, 0xee, 0x9c, 0x72, 0x01, 0x01, 0x01, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let mut bytes = serialize(&sample_tree(), true).unwrap();
        let n = bytes.len();
        bytes[n - 6] ^= 0x01;
        assert!(matches!(
            RawBoc::parse(&bytes, &DecodeLimits::default()),
            Err(CellError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = serialize(&sample_tree(), false).unwrap();
        bytes[0] = 0;
        assert!(matches!(
            deserialize(&bytes, &DecodeLimits::default()),
            Err(CellError::Boc(_))
        ));
    }

    #[test]
    fn test_backward_reference_rejected() {
        // Two cells: cell 1 references cell 0.
        let bytes = vec![
            0xb5, 0xee, 0x9c, 0x72, 0x01, 0x01, 0x02, 0x01, 0x00, 0x05, 0x00, // header
            0x00, 0x00, // cell 0: empty
            0x01, 0x00, 0x00, // cell 1: one ref to 0
        ];
        let err = RawBoc::parse(&bytes, &DecodeLimits::default()).unwrap_err();
        assert!(err.to_string().contains("forward"));
    }

    #[test]
    fn test_cell_limit_enforced_before_allocation() {
        let bytes = vec![
            0xb5, 0xee, 0x9c, 0x72, 0x02, 0x01, 0xff, 0xff, 0x00, 0x01, 0x00, 0x00, 0x02, 0x00,
            0x00,
        ];
        let err = RawBoc::parse(&bytes, &DecodeLimits::default()).unwrap_err();
        assert!(matches!(err, CellError::CellLimit { cells: 65535, max: 4096 }));
    }

    #[test]
    fn test_depth_limit_enforced() {
        let mut cell = CellBuilder::new().build().unwrap();
        for _ in 0..10 {
            let mut b = CellBuilder::new();
            b.store_reference(cell).unwrap();
            cell = b.build().unwrap();
        }
        let bytes = serialize(&cell, false).unwrap();
        let limits = DecodeLimits {
            max_cells: 4096,
            max_depth: 5,
        };
        assert!(matches!(
            RawBoc::parse(&bytes, &limits),
            Err(CellError::DepthLimit { max: 5, .. })
        ));
        assert!(RawBoc::parse(&bytes, &DecodeLimits::default()).is_ok());
    }

    #[test]
    fn test_from_cell_matches_parse() {
        let root = sample_tree();
        let flat = RawBoc::from_cell(&root, &DecodeLimits::default()).unwrap();
        assert_eq!(flat.cell_count(), 3);
        assert_eq!(flat.cells[0].depth, 2);
        assert_eq!(flat.build(0).unwrap().repr_hash(), root.repr_hash());
        let mid = root.reference(0).unwrap();
        assert_eq!(flat.build(flat.cells[0].refs[0]).unwrap(), *mid);

        let tight = DecodeLimits {
            max_cells: 2,
            max_depth: 1023,
        };
        assert!(matches!(
            RawBoc::from_cell(&root, &tight),
            Err(CellError::CellLimit { max: 2, .. })
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = serialize(&sample_tree(), false).unwrap();
        bytes.push(0);
        assert!(RawBoc::parse(&bytes, &DecodeLimits::default()).is_err());
    }

    #[test]
    fn test_exotic_roundtrip() {
        let root = sample_tree();
        let proof = Cell::merkle_proof(&root).unwrap();
        let bytes = serialize(&proof, true).unwrap();
        let decoded = deserialize_single(&bytes, &DecodeLimits::default()).unwrap();
        assert_eq!(decoded.cell_type(), CellType::MerkleProof);
        assert_eq!(decoded.repr_hash(), proof.repr_hash());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = deserialize(&bytes, &DecodeLimits::default());
        }

        #[test]
        fn arbitrary_bodies_after_magic_never_panic(
            body in proptest::collection::vec(any::<u8>(), 0..256)
        ) {
            let mut bytes = BOC_MAGIC.to_be_bytes().to_vec();
            bytes.extend_from_slice(&body);
            let _ = deserialize(&bytes, &DecodeLimits::default());
        }
    }
}
