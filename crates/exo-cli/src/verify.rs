//! # Offline Verification
//!
//! `exo verify-proof` and `exo verify-update` run the decoder and verifiers
//! on a bag of cells from disk.
//!
//! ## Usage
//!
//! ```bash
//! exo verify-proof --proof proof.boc --root 3f1c…
//! exo verify-update --update update.hex --root 3f1c… --key-bits 16
//! ```
//!
//! Exit status: `0` verified, `2` rejected, `1` the input could not be read.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use exo_cell::DecodeLimits;
use exo_core::{NodeHash, VerifyError};
use exo_merkle::{MerkleVerifier, ProofDecoder, SkeletonStats, UpdateVerifier, DEFAULT_KEY_BITS};
use serde::Serialize;

use crate::input::read_boc;
use crate::Output;

/// Decoder settings shared by both verify subcommands.
#[derive(Args, Debug, Clone)]
pub struct DecodeArgs {
    /// Expected root hash (hex). For updates, the prior root.
    #[arg(long)]
    pub root: NodeHash,

    /// Dictionary key length in bits.
    #[arg(long, default_value_t = DEFAULT_KEY_BITS)]
    pub key_bits: usize,

    /// Maximum number of cells in the input.
    #[arg(long, default_value_t = DecodeLimits::default().max_cells)]
    pub max_cells: usize,

    /// Maximum cell depth.
    #[arg(long, default_value_t = DecodeLimits::default().max_depth)]
    pub max_depth: u16,
}

impl DecodeArgs {
    fn decoder(&self) -> Result<ProofDecoder> {
        let limits = DecodeLimits {
            max_cells: self.max_cells,
            max_depth: self.max_depth,
        };
        Ok(ProofDecoder::new(self.key_bits, limits)?)
    }
}

/// Arguments of `exo verify-proof`.
#[derive(Args, Debug)]
pub struct VerifyProofArgs {
    /// Merkle proof bag of cells (binary or hex).
    #[arg(long)]
    pub proof: PathBuf,

    #[command(flatten)]
    pub decode: DecodeArgs,
}

/// Arguments of `exo verify-update`.
#[derive(Args, Debug)]
pub struct VerifyUpdateArgs {
    /// Merkle update bag of cells (binary or hex).
    #[arg(long)]
    pub update: PathBuf,

    #[command(flatten)]
    pub decode: DecodeArgs,
}

/// Classification of a verification result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Root matched.
    Ok,
    /// Input did not decode.
    MalformedStructure,
    /// Input decoded but is inconsistent.
    ShapeMismatch,
    /// Input commits to a different root.
    RootMismatch,
}

impl Verdict {
    fn of(err: &VerifyError) -> Self {
        match err {
            VerifyError::MalformedStructure(_) => Self::MalformedStructure,
            VerifyError::ShapeMismatch(_) => Self::ShapeMismatch,
            VerifyError::RootMismatch { .. } => Self::RootMismatch,
        }
    }

    fn exit_code(self) -> u8 {
        if self == Self::Ok {
            0
        } else {
            2
        }
    }
}

/// Result of one verification.
#[derive(Debug, Serialize)]
pub struct VerifyReport {
    /// Outcome class.
    pub verdict: Verdict,
    /// Root supplied on the command line.
    pub expected_root: NodeHash,
    /// New root, for verified updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_root: Option<NodeHash>,
    /// Node counts of the decoded skeleton(s).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skeletons: Vec<SkeletonStats>,
    /// Failure detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerifyReport {
    fn failed(expected_root: NodeHash, skeletons: Vec<SkeletonStats>, err: &VerifyError) -> Self {
        Self {
            verdict: Verdict::of(err),
            expected_root,
            new_root: None,
            skeletons,
            error: Some(err.to_string()),
        }
    }
}

impl std::fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.verdict {
            Verdict::Ok => writeln!(f, "OK")?,
            _ => writeln!(f, "ERROR")?,
        }
        writeln!(f, "  expected root: {}", self.expected_root)?;
        if let Some(root) = &self.new_root {
            writeln!(f, "  new root:      {root}")?;
        }
        for s in &self.skeletons {
            writeln!(f, "  skeleton:      {} forks, {} leaves, {} pruned", s.forks, s.leaves, s.pruned)?;
        }
        if let Some(err) = &self.error {
            writeln!(f, "  reason:        {err}")?;
        }
        Ok(())
    }
}

/// Execute `exo verify-proof`.
pub fn run_verify_proof(args: &VerifyProofArgs, output: Output) -> Result<u8> {
    let bytes = read_boc(&args.proof)?;
    let report = verify_proof_bytes(&bytes, &args.decode)?;
    output.emit(&report)?;
    Ok(report.verdict.exit_code())
}

/// Execute `exo verify-update`.
pub fn run_verify_update(args: &VerifyUpdateArgs, output: Output) -> Result<u8> {
    let bytes = read_boc(&args.update)?;
    let report = verify_update_bytes(&bytes, &args.decode)?;
    output.emit(&report)?;
    Ok(report.verdict.exit_code())
}

fn verify_proof_bytes(bytes: &[u8], args: &DecodeArgs) -> Result<VerifyReport> {
    let skeleton = match args.decoder()?.decode_proof_boc(bytes) {
        Ok(s) => s,
        Err(err) => return Ok(VerifyReport::failed(args.root, Vec::new(), &err)),
    };
    let stats = vec![skeleton.stats()];
    Ok(match MerkleVerifier::sha256().verify(&skeleton, &args.root) {
        Ok(_) => VerifyReport {
            verdict: Verdict::Ok,
            expected_root: args.root,
            new_root: None,
            skeletons: stats,
            error: None,
        },
        Err(err) => VerifyReport::failed(args.root, stats, &err),
    })
}

fn verify_update_bytes(bytes: &[u8], args: &DecodeArgs) -> Result<VerifyReport> {
    let update = match args.decoder()?.decode_update_boc(bytes) {
        Ok(u) => u,
        Err(err) => return Ok(VerifyReport::failed(args.root, Vec::new(), &err)),
    };
    let stats = vec![update.old.stats(), update.new.stats()];
    Ok(match UpdateVerifier::sha256().verify_update(&update, &args.root) {
        Ok(outcome) => VerifyReport {
            verdict: Verdict::Ok,
            expected_root: args.root,
            new_root: Some(outcome.new_root),
            skeletons: stats,
            error: None,
        },
        Err(err) => VerifyReport::failed(args.root, stats, &err),
    })
}
