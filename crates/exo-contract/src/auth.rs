//! # Authorization Gate
//!
//! Exact, constant-time match of the sender against the stored owner.
//!
//! ## Security Invariant
//!
//! A rejection always carries [`ContractError::NotOwner`], which maps to
//! exit code `0x2001` and to nothing else.

use exo_core::{Address, ContractError};

/// Allow the request only when `sender` is `owner`.
pub fn authorize(sender: &Address, owner: &Address) -> Result<(), ContractError> {
    if sender.ct_eq(owner) {
        return Ok(());
    }
    tracing::warn!(%sender, "relay rejected: sender is not the owner");
    Err(ContractError::NotOwner { sender: *sender })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_passes() {
        let owner = Address::new(0, [9; 32]);
        assert!(authorize(&owner, &owner).is_ok());
    }

    #[test]
    fn test_any_other_address_rejected() {
        let owner = Address::new(0, [9; 32]);
        let mut account = [9; 32];
        account[31] = 8;
        for sender in [Address::new(0, account), Address::new(-1, [9; 32])] {
            assert_eq!(
                authorize(&sender, &owner),
                Err(ContractError::NotOwner { sender })
            );
        }
    }
}
