//! # exo-merkle — Merkle Proof and Update Verification
//!
//! Verifies that a pruned dictionary (a `HashmapE` with fixed-length keys)
//! is consistent with a trusted root hash.
//!
//! - [`label`]: edge label codec.
//! - [`hasher`]: the pluggable hash engine ([`NodeHasher`]).
//! - [`skeleton`]: decodes Merkle proof and update cells into typed trees.
//! - [`verify`]: recomputes a proof root and compares it.
//! - [`update`]: verifies an update against the prior root and yields the
//!   new one.
//!
//! ## Security Invariant
//!
//! A verification result is one of three outcomes: the recomputed root,
//! a structural failure (`MalformedStructure` or `ShapeMismatch`), or a
//! `RootMismatch`. Structural failures are detected before any hashing;
//! the hash engine never sees input that failed to decode.
//!
//! ## Crate Policy
//!
//! - Depends on `exo-core` and `exo-cell` only.
//! - Verifiers hold no mutable state and may be shared across threads.
//! - `testkit` (fixture dictionaries) is compiled for tests and behind
//!   the `testkit` feature only.

pub mod hasher;
pub mod label;
pub mod skeleton;
pub mod update;
pub mod verify;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use hasher::{ChildRef, NodeHasher, Sha256NodeHasher};
pub use label::{Label, LabelKind};
pub use skeleton::{
    LeafValue, Node, ProofDecoder, ProofSkeleton, SkeletonStats, UpdateSkeleton, DEFAULT_KEY_BITS,
    MAX_KEY_BITS,
};
pub use update::{UpdateOutcome, UpdateVerifier};
pub use verify::MerkleVerifier;
