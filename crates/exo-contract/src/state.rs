//! # Persistent Storage
//!
//! The contract stores a single cell, `owner:MsgAddressInt`, written at
//! deployment. There is no operation that rewrites it.

use exo_cell::Cell;
use exo_cell::CellBuilder;
use exo_core::{Address, ContractError};

/// Decoded contract storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractState {
    owner: Address,
}

impl ContractState {
    /// Initial storage for a deployment owned by `owner`.
    pub fn new(owner: Address) -> Self {
        Self { owner }
    }

    /// The owner address.
    pub fn owner(&self) -> &Address {
        &self.owner
    }

    /// Decode a storage cell.
    pub fn from_cell(cell: &Cell) -> Result<Self, ContractError> {
        let mut s = cell.parser();
        let owner = s.load_address()?;
        s.ensure_empty()?;
        Ok(Self { owner })
    }

    /// Encode as a storage cell.
    pub fn to_cell(&self) -> Result<Cell, ContractError> {
        let mut b = CellBuilder::new();
        b.store_address(&self.owner)?;
        Ok(b.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_cell_holds_only_the_owner() {
        let state = ContractState::new(Address::new(-1, [0x3c; 32]));
        let cell = state.to_cell().unwrap();
        assert_eq!(cell.bit_len(), Address::STD_BITS);
        assert!(cell.refs().is_empty());
        assert_eq!(ContractState::from_cell(&cell).unwrap(), state);
    }

    #[test]
    fn test_trailing_data_rejected() {
        let mut b = CellBuilder::new();
        b.store_address(&Address::new(0, [1; 32])).unwrap();
        b.store_bit(true).unwrap();
        assert!(matches!(
            ContractState::from_cell(&b.build().unwrap()),
            Err(ContractError::MalformedRequest(_))
        ));
    }
}
