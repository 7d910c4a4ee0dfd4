//! # exo-cell — Cells and the Bag-of-Cells Codec
//!
//! Provides the data model every proof, update, and request in the
//! workspace is expressed in:
//!
//! - **Bit strings** and **level masks**.
//! - **Cells** with per-level SHA-256 representation hashes, including the
//!   exotic pruned branch, library, Merkle proof, and Merkle update types.
//! - **Builders and slices** for writing and reading cell contents.
//! - **Bag of cells** decoding (two-phase: validate, then hash) and
//!   encoding, with CRC32-C trailers.
//!
//! ## Crate Policy
//!
//! - Depends only on `exo-core` internally.
//! - Every read from untrusted bytes is bounds-checked and returns
//!   `CellError`; no decoder path panics.
//! - No `unsafe` code.

pub mod bits;
pub mod boc;
pub mod builder;
pub mod cell;
pub mod crc;
pub mod exotic;
pub mod level;
pub mod slice;

pub use bits::{BitReader, BitString};
pub use boc::{deserialize, deserialize_single, serialize, DecodeLimits, RawBoc};
pub use builder::CellBuilder;
pub use cell::{Cell, CellType, MAX_CELL_DEPTH, MAX_DATA_BITS, MAX_REFS};
pub use crc::crc32c;
pub use exotic::{MerkleProof, MerkleUpdate};
pub use level::{LevelMask, MAX_LEVEL};
pub use slice::CellSlice;
