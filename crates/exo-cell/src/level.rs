//! # Level Masks
//!
//! A cell's level mask records which Merkle levels its hashes differ at.
//! Bit `i` set means the cell has a distinct hash at level `i + 1`.

/// Maximum cell level.
pub const MAX_LEVEL: u8 = 3;

/// Three-bit level mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LevelMask(u8);

impl LevelMask {
    /// Mask of a level-0 cell.
    pub const EMPTY: Self = Self(0);

    /// Wrap a raw mask, rejecting bits above level 3.
    pub const fn new(mask: u8) -> Option<Self> {
        if mask > 0b111 {
            None
        } else {
            Some(Self(mask))
        }
    }

    /// Raw mask bits.
    pub const fn mask(self) -> u8 {
        self.0
    }

    /// Highest level present in the mask.
    pub const fn level(self) -> u8 {
        (8 - self.0.leading_zeros()) as u8
    }

    /// Number of set bits; the index of this mask's own hash.
    pub const fn hash_index(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Number of distinct hashes a cell with this mask has.
    pub const fn hash_count(self) -> usize {
        self.hash_index() + 1
    }

    /// Mask restricted to levels below `level`.
    pub const fn apply(self, level: u8) -> Self {
        if level >= 8 {
            return self;
        }
        Self(self.0 & ((1u8 << level) - 1))
    }

    /// Whether `level` carries a distinct hash.
    pub const fn is_significant(self, level: u8) -> bool {
        level == 0 || (self.0 >> (level - 1)) & 1 != 0
    }

    /// Mask seen by a parent Merkle cell.
    pub const fn shift_right(self) -> Self {
        Self(self.0 >> 1)
    }

    /// Union of two masks.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}
