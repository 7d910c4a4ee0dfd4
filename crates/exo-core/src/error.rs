//! # Error Types — Structured Error Hierarchy
//!
//! Defines the error types used throughout the workspace. All errors use
//! `thiserror` for derive-based `Display` and `Error` implementations.
//!
//! ## Design
//!
//! - Cell and BoC errors carry enough context to locate the offending
//!   record (cell index, bit counts).
//! - Verification errors fall into exactly three classes: the input did not
//!   parse (`MalformedStructure`), it parsed but violates a shape invariant
//!   (`ShapeMismatch`), or it is consistent but commits to a different root
//!   (`RootMismatch`).
//! - Contract errors carry the numeric exit code the request aborts with.

use thiserror::Error;

use crate::address::Address;
use crate::hash::NodeHash;

/// Top-level error type for the workspace.
#[derive(Error, Debug)]
pub enum ExoError {
    /// Cell construction, parsing, or BoC decoding failed.
    #[error("cell error: {0}")]
    Cell(#[from] CellError),

    /// Proof or update verification failed.
    #[error("verification error: {0}")]
    Verify(#[from] VerifyError),

    /// A contract request was rejected.
    #[error("contract error: {0}")]
    Contract(#[from] ContractError),

    /// Textual input could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error parsing textual hashes and addresses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Hex input of the wrong length or with non-hex characters.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// Address input not in `workchain:hex` form.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Error in the cell layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CellError {
    /// More than 1023 data bits were written to a cell.
    #[error("cell data overflow: {bits} bits exceeds 1023")]
    BitOverflow {
        /// Bits the cell would have held.
        bits: usize,
    },

    /// More than 4 references were attached to a cell.
    #[error("cell reference overflow: {refs} refs exceeds 4")]
    RefOverflow {
        /// References the cell would have held.
        refs: usize,
    },

    /// A read ran past the end of the cell's data.
    #[error("cell underflow: requested {requested} bits, {remaining} remaining")]
    Underflow {
        /// Bits requested.
        requested: usize,
        /// Bits left in the slice.
        remaining: usize,
    },

    /// A reference read ran past the cell's reference list.
    #[error("cell reference underflow")]
    RefUnderflow,

    /// Exotic cell whose layout does not match its type.
    #[error("invalid exotic cell: {0}")]
    InvalidExotic(String),

    /// Merkle cell whose stored hash or depth disagrees with its child.
    #[error("exotic hash mismatch: {0}")]
    ExoticHashMismatch(String),

    /// Cell depth exceeds the enforced ceiling.
    #[error("cell depth {depth} exceeds limit {max}")]
    DepthLimit {
        /// Depth reached.
        depth: u16,
        /// Configured ceiling.
        max: u16,
    },

    /// Too many cells in a bag of cells.
    #[error("bag of cells holds {cells} cells, limit is {max}")]
    CellLimit {
        /// Declared cell count.
        cells: usize,
        /// Configured ceiling.
        max: usize,
    },

    /// Bag-of-cells framing error.
    #[error("malformed bag of cells: {0}")]
    Boc(String),

    /// CRC32-C trailer does not match the payload.
    #[error("bag of cells checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Checksum stored in the trailer.
        expected: u32,
        /// Checksum computed over the payload.
        computed: u32,
    },
}

impl CellError {
    /// Whether the error concerns hash consistency rather than framing.
    ///
    /// Hash-consistency failures classify as [`VerifyError::ShapeMismatch`];
    /// everything else is [`VerifyError::MalformedStructure`].
    pub fn is_hash_inconsistency(&self) -> bool {
        matches!(self, Self::ExoticHashMismatch(_))
    }
}

/// Error verifying a Merkle proof or Merkle update.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// The input does not parse as the expected exotic structure.
    #[error("malformed structure: {0}")]
    MalformedStructure(String),

    /// The input parses but violates a depth or consistency invariant.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The recomputed root differs from the expected root.
    #[error("root mismatch: expected {expected}, computed {computed}")]
    RootMismatch {
        /// Root supplied by the caller.
        expected: NodeHash,
        /// Root recomputed from the proof.
        computed: NodeHash,
    },
}

impl VerifyError {
    /// Whether this is the ordinary "proof does not match" outcome rather
    /// than a structural rejection.
    pub fn is_root_mismatch(&self) -> bool {
        matches!(self, Self::RootMismatch { .. })
    }
}

impl From<CellError> for VerifyError {
    fn from(err: CellError) -> Self {
        if err.is_hash_inconsistency() {
            Self::ShapeMismatch(err.to_string())
        } else {
            Self::MalformedStructure(err.to_string())
        }
    }
}

/// Error processing a contract request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    /// Relay requested by someone other than the stored owner.
    #[error("sender {sender} is not the owner")]
    NotOwner {
        /// The rejected sender.
        sender: Address,
    },

    /// Request tag not recognized.
    #[error("unknown request op {op:#010x}")]
    UnknownRequest {
        /// The unrecognized op code.
        op: u32,
    },

    /// Request body could not be parsed.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Contract configuration rejected.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<CellError> for ContractError {
    fn from(err: CellError) -> Self {
        Self::MalformedRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_error_classification() {
        let shape: VerifyError = CellError::ExoticHashMismatch("proof".into()).into();
        assert!(matches!(shape, VerifyError::ShapeMismatch(_)));

        let malformed: VerifyError = CellError::Boc("bad magic".into()).into();
        assert!(matches!(malformed, VerifyError::MalformedStructure(_)));

        let depth: VerifyError = CellError::DepthLimit { depth: 2000, max: 1023 }.into();
        assert!(matches!(depth, VerifyError::MalformedStructure(_)));
    }

    #[test]
    fn test_root_mismatch_display() {
        let err = VerifyError::RootMismatch {
            expected: NodeHash::ZERO,
            computed: NodeHash::from_bytes([0xff; 32]),
        };
        let msg = err.to_string();
        assert!(msg.contains(&"00".repeat(32)));
        assert!(msg.contains(&"ff".repeat(32)));
        assert!(err.is_root_mismatch());
    }

    #[test]
    fn test_unknown_request_display() {
        let err = ContractError::UnknownRequest { op: 0xdead };
        assert_eq!(err.to_string(), "unknown request op 0x0000dead");
    }

    #[test]
    fn test_umbrella_conversions() {
        let err: ExoError = CellError::RefUnderflow.into();
        assert!(format!("{err}").contains("reference underflow"));
        let err: ExoError = ContractError::Config("key_bits".into()).into();
        assert!(format!("{err}").contains("key_bits"));
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = ExoError::from(io);
        assert!(format!("{err}").contains("file missing"));
    }

    #[test]
    fn test_checksum_display_is_hex() {
        let err = CellError::ChecksumMismatch { expected: 0xdeadbeef, computed: 1 };
        assert!(err.to_string().contains("deadbeef"));
        assert!(err.to_string().contains("00000001"));
    }
}
