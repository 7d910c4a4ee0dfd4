//! # exo-core — Foundational Types for the Exotic Verifier
//!
//! This crate is the leaf of the workspace DAG. It defines the primitives
//! shared by the cell layer, the Merkle verifiers, and the contract
//! dispatcher.
//!
//! ## Key Design Principles
//!
//! 1. **`NodeHash` is a newtype.** A 256-bit digest is never a bare
//!    `[u8; 32]` at an API boundary. Equality checks on hashes go through
//!    [`NodeHash::ct_eq()`].
//!
//! 2. **`Address` is exact.** Owner identity is compared on the raw
//!    `(workchain, account)` pair with no normalization.
//!
//! 3. **One error taxonomy.** Cell, verification, and contract errors are
//!    declared here so every crate classifies failures the same way.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `exo-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod address;
pub mod coins;
pub mod error;
pub mod hash;

// Re-export primary types for ergonomic imports.
pub use address::Address;
pub use coins::Coins;
pub use error::{CellError, ContractError, ExoError, ParseError, VerifyError};
pub use hash::NodeHash;
