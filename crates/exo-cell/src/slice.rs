//! # Cell Slices
//!
//! A read cursor over a cell's data bits and references. Every load is
//! bounds-checked and returns [`CellError::Underflow`] or
//! [`CellError::RefUnderflow`] instead of panicking, so parsers built on
//! slices are total over arbitrary input.

use exo_core::{Address, CellError, Coins, NodeHash};

use crate::bits::{BitReader, BitString};
use crate::cell::Cell;

/// Read cursor over a [`Cell`].
#[derive(Debug, Clone)]
pub struct CellSlice<'a> {
    cell: &'a Cell,
    bits: BitReader<'a>,
    ref_pos: usize,
}

impl<'a> CellSlice<'a> {
    /// Start reading `cell` from the beginning.
    pub fn new(cell: &'a Cell) -> Self {
        Self {
            cell,
            bits: BitReader::new(cell.data()),
            ref_pos: 0,
        }
    }

    /// The cell being read.
    pub fn cell(&self) -> &'a Cell {
        self.cell
    }

    /// Unread data bits.
    pub fn remaining_bits(&self) -> usize {
        self.bits.remaining()
    }

    /// Unread references.
    pub fn remaining_ref_count(&self) -> usize {
        self.cell.refs().len() - self.ref_pos
    }

    /// Copy of the unread data bits.
    pub fn remaining_bits_string(&self) -> BitString {
        self.bits.rest()
    }

    /// The unread references.
    pub fn remaining_refs(&self) -> &'a [Cell] {
        &self.cell.refs()[self.ref_pos..]
    }

    /// Read one bit.
    pub fn load_bit(&mut self) -> Result<bool, CellError> {
        self.bits.load_bit()
    }

    /// Read a `bits`-wide unsigned integer, at most 64 bits.
    pub fn load_uint(&mut self, bits: usize) -> Result<u64, CellError> {
        self.bits.load_uint(bits)
    }

    /// Read `bits` bits.
    pub fn load_bits(&mut self, bits: usize) -> Result<BitString, CellError> {
        self.bits.load_bits(bits)
    }

    /// Read `n` whole bytes.
    pub fn load_bytes(&mut self, n: usize) -> Result<Vec<u8>, CellError> {
        let bits = self.load_bits(n * 8)?;
        Ok(bits.as_bytes().to_vec())
    }

    /// Read a 256-bit hash.
    pub fn load_hash(&mut self) -> Result<NodeHash, CellError> {
        let bytes = self.load_bytes(NodeHash::LEN)?;
        NodeHash::from_slice(&bytes).map_err(|e| CellError::Boc(e.to_string()))
    }

    /// Read the next reference.
    pub fn load_reference(&mut self) -> Result<&'a Cell, CellError> {
        let cell = self
            .cell
            .refs()
            .get(self.ref_pos)
            .ok_or(CellError::RefUnderflow)?;
        self.ref_pos += 1;
        Ok(cell)
    }

    /// Read a `VarUInteger 16` coin amount.
    pub fn load_coins(&mut self) -> Result<Coins, CellError> {
        let len = self.load_uint(4)? as usize;
        let mut value = 0u128;
        for _ in 0..len {
            value = (value << 8) | u128::from(self.load_uint(8)? as u8);
        }
        Coins::from_nano(value).ok_or_else(|| CellError::Boc("coin amount overflow".to_string()))
    }

    /// Read an `addr_std` address without anycast.
    pub fn load_address(&mut self) -> Result<Address, CellError> {
        let tag = self.load_uint(2)?;
        if tag != 0b10 {
            return Err(CellError::Boc(format!("expected addr_std, got tag {tag:02b}")));
        }
        if self.load_bit()? {
            return Err(CellError::Boc("anycast addresses are not supported".to_string()));
        }
        let workchain = self.load_uint(8)? as u8 as i8;
        let bytes = self.load_bytes(32)?;
        let mut account = [0u8; 32];
        account.copy_from_slice(&bytes);
        Ok(Address::new(workchain, account))
    }

    /// Read `MsgAddress`: `addr_none` yields `None`, `addr_std` an address.
    pub fn load_maybe_address(&mut self) -> Result<Option<Address>, CellError> {
        let mut peek = self.clone();
        if peek.load_uint(2)? == 0 {
            *self = peek;
            return Ok(None);
        }
        self.load_address().map(Some)
    }

    /// Skip `bits` bits.
    pub fn skip(&mut self, bits: usize) -> Result<(), CellError> {
        self.bits.skip(bits)
    }

    /// Fail unless every bit and reference has been consumed.
    pub fn ensure_empty(&self) -> Result<(), CellError> {
        if self.remaining_bits() != 0 || self.remaining_ref_count() != 0 {
            return Err(CellError::Boc(format!(
                "{} unread bits and {} unread refs",
                self.remaining_bits(),
                self.remaining_ref_count()
            )));
        }
        Ok(())
    }
}
