//! # Bit Strings
//!
//! A growable, big-endian-within-byte bit vector. Used for cell data,
//! dictionary labels, and key prefixes.

use exo_core::CellError;

/// A sequence of bits packed MSB-first into bytes.
///
/// Bits past `len` in the final byte are always zero, so derived equality
/// and ordering are bit-exact.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BitString {
    bytes: Vec<u8>,
    len: usize,
}

impl BitString {
    /// Create an empty bit string.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty bit string with room for `bits` bits.
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            bytes: Vec::with_capacity((bits + 7) / 8),
            len: 0,
        }
    }

    /// Take the first `len` bits of `bytes`.
    ///
    /// Returns `None` when `bytes` is too short.
    pub fn from_bytes(bytes: &[u8], len: usize) -> Option<Self> {
        let byte_len = (len + 7) / 8;
        if bytes.len() < byte_len {
            return None;
        }
        let mut out = bytes[..byte_len].to_vec();
        if len % 8 != 0 {
            if let Some(last) = out.last_mut() {
                *last &= 0xffu8 << (8 - len % 8);
            }
        }
        Some(Self { bytes: out, len })
    }

    /// Parse a string of `'0'`/`'1'` characters. Other characters are rejected.
    pub fn from_binary_str(s: &str) -> Option<Self> {
        let mut out = Self::with_capacity(s.len());
        for c in s.chars() {
            match c {
                '0' => out.push(false),
                '1' => out.push(true),
                _ => return None,
            }
        }
        Some(out)
    }

    /// Number of bits.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the string holds no bits.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Packed bytes; trailing bits of the last byte are zero.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Bit at `index`, or `None` past the end.
    pub fn get(&self, index: usize) -> Option<bool> {
        if index >= self.len {
            return None;
        }
        Some((self.bytes[index / 8] >> (7 - index % 8)) & 1 == 1)
    }

    /// Append one bit.
    pub fn push(&mut self, bit: bool) {
        if self.len % 8 == 0 {
            self.bytes.push(0);
        }
        if bit {
            let last = self.bytes.len() - 1;
            self.bytes[last] |= 1 << (7 - self.len % 8);
        }
        self.len += 1;
    }

    /// Append every bit of `other`.
    pub fn extend_from(&mut self, other: &BitString) {
        if self.len % 8 == 0 {
            self.bytes.extend_from_slice(&other.bytes);
            self.len += other.len;
            return;
        }
        for bit in other.iter() {
            self.push(bit);
        }
    }

    /// Append `n` copies of `bit`.
    pub fn push_repeated(&mut self, bit: bool, n: usize) {
        for _ in 0..n {
            self.push(bit);
        }
    }

    /// Append the low `bits` bits of `value`, most significant first.
    pub fn push_uint(&mut self, value: u64, bits: usize) {
        for i in (0..bits).rev() {
            let bit = if i >= 64 { false } else { (value >> i) & 1 == 1 };
            self.push(bit);
        }
    }

    /// Copy of bits `start..end`, clamped to the string.
    pub fn slice(&self, start: usize, end: usize) -> BitString {
        let end = end.min(self.len);
        let start = start.min(end);
        let mut out = Self::with_capacity(end - start);
        for i in start..end {
            out.push((self.bytes[i / 8] >> (7 - i % 8)) & 1 == 1);
        }
        out
    }

    /// Bits from `start` to the end.
    pub fn suffix(&self, start: usize) -> BitString {
        self.slice(start, self.len)
    }

    /// Whether `prefix` is a prefix of `self`.
    pub fn starts_with(&self, prefix: &BitString) -> bool {
        prefix.len <= self.len && self.common_prefix_len(prefix) == prefix.len
    }

    /// Length of the longest common prefix with `other`.
    pub fn common_prefix_len(&self, other: &BitString) -> usize {
        self.iter()
            .zip(other.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// If every bit is the same, that bit. An empty string yields `None`.
    pub fn uniform_bit(&self) -> Option<bool> {
        let first = self.get(0)?;
        self.iter().all(|b| b == first).then_some(first)
    }

    /// Iterate over the bits.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |i| (self.bytes[i / 8] >> (7 - i % 8)) & 1 == 1)
    }

    /// Bytes with the completion tag applied: when not byte aligned a single
    /// `1` bit follows the data and the rest of the byte is zero.
    pub fn to_padded_bytes(&self) -> Vec<u8> {
        let mut out = self.bytes.clone();
        if self.len % 8 != 0 {
            if let Some(last) = out.last_mut() {
                *last |= 1 << (7 - self.len % 8);
            }
        }
        out
    }
}

/// Read cursor over a [`BitString`].
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    bits: &'a BitString,
    pos: usize,
}

impl<'a> BitReader<'a> {
    /// Start reading `bits` from the beginning.
    pub fn new(bits: &'a BitString) -> Self {
        Self { bits, pos: 0 }
    }

    /// Bits consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Unread bits.
    pub fn remaining(&self) -> usize {
        self.bits.len() - self.pos
    }

    fn ensure(&self, bits: usize) -> Result<(), CellError> {
        let remaining = self.remaining();
        if bits > remaining {
            return Err(CellError::Underflow {
                requested: bits,
                remaining,
            });
        }
        Ok(())
    }

    /// Read one bit.
    pub fn load_bit(&mut self) -> Result<bool, CellError> {
        self.ensure(1)?;
        let bit = self.bits.get(self.pos).unwrap_or(false);
        self.pos += 1;
        Ok(bit)
    }

    /// Read a `bits`-wide unsigned integer, at most 64 bits.
    pub fn load_uint(&mut self, bits: usize) -> Result<u64, CellError> {
        if bits > 64 {
            return Err(CellError::Underflow {
                requested: bits,
                remaining: 64,
            });
        }
        self.ensure(bits)?;
        let mut value = 0u64;
        for _ in 0..bits {
            value = (value << 1) | u64::from(self.load_bit()?);
        }
        Ok(value)
    }

    /// Read `bits` bits.
    pub fn load_bits(&mut self, bits: usize) -> Result<BitString, CellError> {
        self.ensure(bits)?;
        let out = self.bits.slice(self.pos, self.pos + bits);
        self.pos += bits;
        Ok(out)
    }

    /// Skip `bits` bits.
    pub fn skip(&mut self, bits: usize) -> Result<(), CellError> {
        self.ensure(bits)?;
        self.pos += bits;
        Ok(())
    }

    /// Copy of the unread bits.
    pub fn rest(&self) -> BitString {
        self.bits.suffix(self.pos)
    }
}

impl FromIterator<bool> for BitString {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        let mut out = Self::new();
        for bit in iter {
            out.push(bit);
        }
        out
    }
}

impl std::fmt::Display for BitString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for bit in self.iter() {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for BitString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BitString[{}]({self})", self.len)
    }
}
