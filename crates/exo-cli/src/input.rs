//! # Input Files
//!
//! Bags of cells are accepted as raw binary or as hex text (whitespace
//! and an optional `0x` prefix allowed). Binary input is recognized by the
//! BoC magic.

use std::path::Path;

use anyhow::{bail, Context, Result};
use exo_cell::{deserialize_single, Cell, DecodeLimits};

const MAGIC: [u8; 4] = [0xb5, 0xee, 0x9c, 0x72];

/// Read BoC bytes from `path`.
pub fn read_boc(path: &Path) -> Result<Vec<u8>> {
    let raw = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    if raw.starts_with(&MAGIC) {
        return Ok(raw);
    }
    let text = std::str::from_utf8(&raw)
        .with_context(|| format!("{} is neither a bag of cells nor hex text", path.display()))?;
    decode_hex(text).with_context(|| format!("invalid hex in {}", path.display()))
}

/// Read a single-root bag of cells from `path` and build its cell.
pub fn read_cell(path: &Path, limits: &DecodeLimits) -> Result<Cell> {
    let bytes = read_boc(path)?;
    deserialize_single(&bytes, limits).with_context(|| format!("failed to decode {}", path.display()))
}

/// Decode hex text, ignoring whitespace and a leading `0x`.
pub fn decode_hex(text: &str) -> Result<Vec<u8>> {
    let trimmed = text.trim();
    let digits: Vec<u8> = trimmed
        .strip_prefix("0x")
        .unwrap_or(trimmed)
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        bail!("odd number of hex digits ({})", digits.len());
    }
    digits
        .chunks(2)
        .map(|pair| {
            let hi = nibble(pair[0])?;
            let lo = nibble(pair[1])?;
            Ok((hi << 4) | lo)
        })
        .collect()
}

fn nibble(c: u8) -> Result<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => bail!("invalid hex digit {:?}", c as char),
    }
}

/// Encode bytes as lowercase hex.
pub fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use exo_cell::{serialize, CellBuilder};

    #[test]
    fn test_decode_hex_variants() {
        assert_eq!(decode_hex("0xB5ee 9c72\n").unwrap(), MAGIC.to_vec());
        assert!(decode_hex("abc").is_err());
        assert!(decode_hex("zz").is_err());
    }

    #[test]
    fn test_read_binary_and_hex_files() {
        let mut b = CellBuilder::new();
        b.store_uint(0x1234, 16).unwrap();
        let cell = b.build().unwrap();
        let bytes = serialize(&cell, true).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("cell.boc");
        let hex = dir.path().join("cell.hex");
        std::fs::write(&bin, &bytes).unwrap();
        std::fs::write(&hex, encode_hex(&bytes)).unwrap();

        let limits = DecodeLimits::default();
        assert_eq!(read_cell(&bin, &limits).unwrap(), cell);
        assert_eq!(read_cell(&hex, &limits).unwrap(), cell);
        assert!(read_boc(&dir.path().join("missing")).is_err());
    }
}
