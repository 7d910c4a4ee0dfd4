//! # Coin Amounts
//!
//! Amounts are carried in nano-units as an unsigned 120-bit value, the
//! range of the `VarUInteger 16` encoding used for `Grams`.

use serde::{Deserialize, Serialize};

/// An amount in nano-units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coins(u128);

impl Coins {
    /// Zero value.
    pub const ZERO: Self = Self(0);

    /// Nano-units per whole coin.
    pub const NANO_PER_COIN: u128 = 1_000_000_000;

    /// Largest amount representable in 15 bytes.
    pub const MAX: Self = Self((1u128 << 120) - 1);

    /// Build an amount from nano-units, rejecting values beyond 120 bits.
    pub const fn from_nano(nano: u128) -> Option<Self> {
        if nano > Self::MAX.0 {
            None
        } else {
            Some(Self(nano))
        }
    }

    /// The amount in nano-units.
    pub const fn as_nano(&self) -> u128 {
        self.0
    }

    /// Number of bytes the big-endian value occupies (0 for zero).
    pub const fn byte_len(&self) -> usize {
        ((128 - self.0.leading_zeros() as usize) + 7) / 8
    }
}

impl std::fmt::Display for Coins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole = self.0 / Self::NANO_PER_COIN;
        let frac = self.0 % Self::NANO_PER_COIN;
        write!(f, "{whole}.{frac:09}")
    }
}
