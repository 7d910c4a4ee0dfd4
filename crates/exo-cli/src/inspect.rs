//! # BoC Inspection
//!
//! `exo inspect FILE` prints the framing-level view of a bag of cells: cell
//! counts by type, and for each root its type, hashes and depth. Merkle
//! roots also show the hashes their wrappers commit to.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use exo_cell::{Cell, CellType, DecodeLimits, MerkleProof, MerkleUpdate, RawBoc};
use exo_core::NodeHash;
use serde::Serialize;

use crate::input::read_boc;
use crate::Output;

/// Arguments of `exo inspect`.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Bag of cells (binary or hex).
    pub file: PathBuf,

    /// Maximum number of cells in the input.
    #[arg(long, default_value_t = DecodeLimits::default().max_cells)]
    pub max_cells: usize,
}

/// Summary of one root.
#[derive(Debug, Serialize)]
pub struct RootSummary {
    /// Cell type.
    pub cell_type: &'static str,
    /// Representation hash.
    pub hash: NodeHash,
    /// Representation depth.
    pub depth: u16,
    /// Cell level.
    pub level: u8,
    /// Data bits.
    pub bits: usize,
    /// References.
    pub refs: usize,
    /// Hashes committed to by a Merkle wrapper (one for proofs, old and new
    /// for updates).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub commits: Vec<NodeHash>,
}

/// Summary of a bag of cells.
#[derive(Debug, Serialize)]
pub struct InspectReport {
    /// Distinct cells.
    pub cells: usize,
    /// Cell counts by type.
    pub by_type: BTreeMap<&'static str, usize>,
    /// Roots in order.
    pub roots: Vec<RootSummary>,
}

impl std::fmt::Display for InspectReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "cells: {}", self.cells)?;
        for (ty, n) in &self.by_type {
            writeln!(f, "  {ty:<14} {n}")?;
        }
        for (i, r) in self.roots.iter().enumerate() {
            writeln!(f, "root {i}: {}", r.cell_type)?;
            writeln!(f, "  hash:   {}", r.hash)?;
            writeln!(f, "  depth:  {}  level: {}  bits: {}  refs: {}", r.depth, r.level, r.bits, r.refs)?;
            for c in &r.commits {
                writeln!(f, "  commits to: {c}")?;
            }
        }
        Ok(())
    }
}

/// Execute `exo inspect`.
pub fn run_inspect(args: &InspectArgs, output: Output) -> Result<u8> {
    let bytes = read_boc(&args.file)?;
    let limits = DecodeLimits {
        max_cells: args.max_cells,
        ..DecodeLimits::default()
    };
    let report = inspect_bytes(&bytes, &limits)?;
    output.emit(&report)?;
    Ok(0)
}

fn inspect_bytes(bytes: &[u8], limits: &DecodeLimits) -> Result<InspectReport> {
    let raw = RawBoc::parse(bytes, limits).context("invalid bag of cells")?;
    let mut by_type = BTreeMap::new();
    for cell in &raw.cells {
        *by_type.entry(cell.cell_type.as_str()).or_insert(0) += 1;
    }
    let cells = raw.cell_count();
    let roots = raw
        .into_cells()
        .context("failed to build cells")?
        .iter()
        .map(summarize)
        .collect();
    Ok(InspectReport { cells, by_type, roots })
}

fn summarize(cell: &Cell) -> RootSummary {
    let commits = match cell.cell_type() {
        CellType::MerkleProof => MerkleProof::from_cell(cell).map(|p| vec![p.hash]).unwrap_or_default(),
        CellType::MerkleUpdate => MerkleUpdate::from_cell(cell)
            .map(|u| vec![u.old_hash, u.new_hash])
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    RootSummary {
        cell_type: cell.cell_type().as_str(),
        hash: cell.repr_hash(),
        depth: cell.repr_depth(),
        level: cell.level(),
        bits: cell.bit_len(),
        refs: cell.refs().len(),
        commits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exo_cell::serialize;
    use exo_merkle::testkit::{address_key, seeded_address, Dictionary};

    #[test]
    fn test_inspect_merkle_update() {
        let mut d = Dictionary::new(267);
        for i in 0..4 {
            d.set_bool(address_key(&seeded_address(&i.to_string())), true);
        }
        let key = address_key(&seeded_address("1"));
        let update = d.merkle_update(&key, false).unwrap();
        let bytes = serialize(&update, true).unwrap();

        let report = inspect_bytes(&bytes, &DecodeLimits::default()).unwrap();
        assert_eq!(report.roots.len(), 1);
        let root = &report.roots[0];
        assert_eq!(root.cell_type, CellType::MerkleUpdate.as_str());
        assert_eq!(root.commits[0], d.root_hash().unwrap());
        assert!(report.by_type.contains_key(CellType::PrunedBranch.as_str()));
        assert!(report.to_string().contains("commits to"));
    }

    #[test]
    fn test_inspect_rejects_garbage() {
        assert!(inspect_bytes(&[0xb5, 0xee, 0x9c, 0x72, 0], &DecodeLimits::default()).is_err());
    }
}
