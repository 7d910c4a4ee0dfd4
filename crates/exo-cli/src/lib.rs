//! # exo-cli — Operator Tooling for the Proof Verifier
//!
//! Provides the `exo` command-line interface over the verifier crates.
//!
//! ## Subcommands
//!
//! - `exo verify-proof` — Check a Merkle proof against an expected root.
//! - `exo verify-update` — Check a Merkle update and print the new root.
//! - `exo inspect` — Summarize a bag of cells.
//! - `exo dispatch` — Run one inbound message through the contract.
//!
//! ```bash
//! exo verify-proof --proof proof.boc --root 3f1c…
//! exo --json dispatch --config contract.yaml --sender 0:ab… --body body.hex
//! ```

pub mod dispatch;
pub mod input;
pub mod inspect;
pub mod verify;

use std::fmt::Display;

use serde::Serialize;

/// How reports are printed on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Output {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl Output {
    /// Print `report` in this format.
    pub fn emit<T: Serialize + Display>(&self, report: &T) -> anyhow::Result<()> {
        match self {
            Self::Text => print!("{report}"),
            Self::Json => println!("{}", serde_json::to_string_pretty(report)?),
        }
        Ok(())
    }
}
