//! # Cell Builder
//!
//! Accumulates data bits and references, then produces an immutable
//! [`Cell`]. Every store is bounds-checked against the 1023-bit and
//! 4-reference limits so an oversized cell can never be built.

use exo_core::{Address, CellError, Coins, NodeHash};

use crate::bits::BitString;
use crate::cell::{Cell, MAX_DATA_BITS, MAX_REFS};
use crate::slice::CellSlice;

/// Incremental cell constructor.
#[derive(Debug, Clone, Default)]
pub struct CellBuilder {
    data: BitString,
    refs: Vec<Cell>,
}

impl CellBuilder {
    /// Start an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bits written so far.
    pub fn bit_len(&self) -> usize {
        self.data.len()
    }

    /// References attached so far.
    pub fn ref_count(&self) -> usize {
        self.refs.len()
    }

    /// Bits still available.
    pub fn remaining_bits(&self) -> usize {
        MAX_DATA_BITS - self.data.len()
    }

    fn reserve(&self, bits: usize) -> Result<(), CellError> {
        let total = self.data.len() + bits;
        if total > MAX_DATA_BITS {
            return Err(CellError::BitOverflow { bits: total });
        }
        Ok(())
    }

    /// Store a single bit.
    pub fn store_bit(&mut self, bit: bool) -> Result<&mut Self, CellError> {
        self.reserve(1)?;
        self.data.push(bit);
        Ok(self)
    }

    /// Store the low `bits` bits of `value`, big-endian.
    pub fn store_uint(&mut self, value: u64, bits: usize) -> Result<&mut Self, CellError> {
        self.reserve(bits)?;
        self.data.push_uint(value, bits);
        Ok(self)
    }

    /// Store a bit string.
    pub fn store_bits(&mut self, bits: &BitString) -> Result<&mut Self, CellError> {
        self.reserve(bits.len())?;
        self.data.extend_from(bits);
        Ok(self)
    }

    /// Store whole bytes.
    pub fn store_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self, CellError> {
        self.reserve(bytes.len() * 8)?;
        for byte in bytes {
            self.data.push_uint(u64::from(*byte), 8);
        }
        Ok(self)
    }

    /// Store a 256-bit hash.
    pub fn store_hash(&mut self, hash: &NodeHash) -> Result<&mut Self, CellError> {
        self.store_bytes(hash.as_bytes())
    }

    /// Store a coin amount as `VarUInteger 16`: a 4-bit byte length, then
    /// the value in that many bytes.
    pub fn store_coins(&mut self, coins: Coins) -> Result<&mut Self, CellError> {
        let len = coins.byte_len();
        self.reserve(4 + len * 8)?;
        self.data.push_uint(len as u64, 4);
        let bytes = coins.as_nano().to_be_bytes();
        for byte in &bytes[16 - len..] {
            self.data.push_uint(u64::from(*byte), 8);
        }
        Ok(self)
    }

    /// Store `addr_std$10 anycast:(Maybe Anycast) workchain:int8 account:bits256`
    /// with no anycast.
    pub fn store_address(&mut self, address: &Address) -> Result<&mut Self, CellError> {
        self.reserve(Address::STD_BITS)?;
        self.data.push_uint(0b10, 2);
        self.data.push(false);
        self.data.push_uint(u64::from(address.workchain() as u8), 8);
        for byte in address.account() {
            self.data.push_uint(u64::from(*byte), 8);
        }
        Ok(self)
    }

    /// Store `addr_none$00`.
    pub fn store_address_none(&mut self) -> Result<&mut Self, CellError> {
        self.store_uint(0, 2)
    }

    /// Attach a reference.
    pub fn store_reference(&mut self, cell: Cell) -> Result<&mut Self, CellError> {
        if self.refs.len() >= MAX_REFS {
            return Err(CellError::RefOverflow { refs: self.refs.len() + 1 });
        }
        self.refs.push(cell);
        Ok(self)
    }

    /// Copy the unread bits and references of a slice.
    pub fn store_slice(&mut self, slice: &CellSlice<'_>) -> Result<&mut Self, CellError> {
        let bits = slice.remaining_bits_string();
        self.store_bits(&bits)?;
        for cell in slice.remaining_refs() {
            self.store_reference(cell.clone())?;
        }
        Ok(self)
    }

    /// Finish as an ordinary cell.
    pub fn build(&self) -> Result<Cell, CellError> {
        Cell::new(self.data.clone(), self.refs.clone(), false)
    }

    /// Finish as an exotic cell; the first data byte selects the type.
    pub fn build_exotic(&self) -> Result<Cell, CellError> {
        Cell::new(self.data.clone(), self.refs.clone(), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_overflow() {
        let mut b = CellBuilder::new();
        b.store_uint(0, 1000).unwrap();
        assert_eq!(b.remaining_bits(), 23);
        assert!(matches!(
            b.store_uint(0, 24),
            Err(CellError::BitOverflow { bits: 1024 })
        ));
        b.store_uint(0, 23).unwrap();
        assert!(b.store_bit(true).is_err());
        assert_eq!(b.build().unwrap().bit_len(), 1023);
    }

    #[test]
    fn test_ref_overflow() {
        let leaf = CellBuilder::new().build().unwrap();
        let mut b = CellBuilder::new();
        for _ in 0..4 {
            b.store_reference(leaf.clone()).unwrap();
        }
        assert!(matches!(
            b.store_reference(leaf),
            Err(CellError::RefOverflow { refs: 5 })
        ));
    }

    #[test]
    fn test_address_layout() {
        let addr = Address::new(-1, [0xab; 32]);
        let mut b = CellBuilder::new();
        b.store_address(&addr).unwrap();
        let cell = b.build().unwrap();
        assert_eq!(cell.bit_len(), 267);
        let bytes = cell.data().as_bytes();
        // 10 0 11111111 ...
        assert_eq!(bytes[0], 0b1001_1111);
        assert_eq!(bytes[1] >> 5, 0b111);
    }

    #[test]
    fn test_coins_layout() {
        let mut b = CellBuilder::new();
        b.store_coins(Coins::from_nano(0x0102).unwrap()).unwrap();
        let cell = b.build().unwrap();
        assert_eq!(cell.bit_len(), 4 + 16);
        assert_eq!(cell.data().to_string(), "00100000000100000010");

        let mut zero = CellBuilder::new();
        zero.store_coins(Coins::ZERO).unwrap();
        assert_eq!(zero.build().unwrap().bit_len(), 4);
    }
}
