//! # Dictionary Edge Labels
//!
//! Every dictionary edge starts with a label `HmLabel ~n m`: the key bits
//! the edge consumes before forking, encoded against `m`, the key length
//! still remaining at the edge.
//!
//! ```text
//! hml_short$0  len:(Unary ~n) s:(n * Bit)
//! hml_long$10  n:(#<= m) s:(n * Bit)
//! hml_same$11  v:Bit n:(#<= m)
//! ```
//!
//! `#<= m` occupies `⌈log2(m + 1)⌉` bits. A decoded label remembers its
//! encoding so that re-hashing reproduces the original cell bit for bit.

use exo_cell::{BitReader, BitString, CellBuilder};
use exo_core::{CellError, VerifyError};

/// Width of a `#<= max` length field.
pub fn length_bits(max: usize) -> usize {
    (usize::BITS - max.leading_zeros()) as usize
}

/// Encoding chosen for a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    /// `hml_short$0`.
    Short,
    /// `hml_long$10`.
    Long,
    /// `hml_same$11` with the repeated bit.
    Same(bool),
}

/// A decoded (or derived) edge label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    bits: BitString,
    kind: LabelKind,
    max: usize,
}

impl Label {
    /// Read a label encoded against `max` remaining key bits.
    ///
    /// A length above `max` breaks the remaining-length invariant and is a
    /// shape mismatch; running out of bits is malformed structure.
    pub fn parse(reader: &mut BitReader<'_>, max: usize) -> Result<Self, VerifyError> {
        let too_long = |n: usize| {
            VerifyError::ShapeMismatch(format!("label of {n} bits exceeds remaining {max}"))
        };
        if !reader.load_bit()? {
            let mut n = 0usize;
            while reader.load_bit()? {
                n += 1;
                if n > max {
                    return Err(too_long(n));
                }
            }
            let bits = reader.load_bits(n)?;
            return Ok(Self {
                bits,
                kind: LabelKind::Short,
                max,
            });
        }
        let k = length_bits(max);
        if !reader.load_bit()? {
            let n = reader.load_uint(k)? as usize;
            if n > max {
                return Err(too_long(n));
            }
            let bits = reader.load_bits(n)?;
            return Ok(Self {
                bits,
                kind: LabelKind::Long,
                max,
            });
        }
        let v = reader.load_bit()?;
        let n = reader.load_uint(k)? as usize;
        if n > max {
            return Err(too_long(n));
        }
        let mut bits = BitString::with_capacity(n);
        bits.push_repeated(v, n);
        Ok(Self {
            bits,
            kind: LabelKind::Same(v),
            max,
        })
    }

    /// Shortest encoding of `bits` against `max`: short, replaced by long
    /// and then same only on strict improvement.
    pub fn canonical(bits: BitString, max: usize) -> Self {
        let n = bits.len();
        let k = length_bits(max);
        let mut kind = LabelKind::Short;
        let mut best = 2 * n + 2;
        if 2 + k + n < best {
            kind = LabelKind::Long;
            best = 2 + k + n;
        }
        if let Some(v) = bits.uniform_bit() {
            if 3 + k < best {
                kind = LabelKind::Same(v);
            }
        }
        Self { bits, kind, max }
    }

    /// The key bits the edge consumes.
    pub fn bits(&self) -> &BitString {
        &self.bits
    }

    /// Number of key bits the edge consumes.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Whether the label is empty.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Encoding in use.
    pub fn kind(&self) -> LabelKind {
        self.kind
    }

    /// Remaining key length the label is encoded against.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Key bits left after this label.
    pub fn remaining_after(&self) -> usize {
        self.max - self.bits.len()
    }

    /// The same edge seen `skip` bits further down: the label suffix,
    /// canonically re-encoded against the shorter remaining length.
    pub fn suffix(&self, skip: usize) -> Self {
        let skip = skip.min(self.bits.len());
        Self::canonical(self.bits.suffix(skip), self.max - skip)
    }

    /// Append the encoded label to `out`.
    pub fn write_to(&self, out: &mut BitString) {
        let n = self.bits.len();
        let k = length_bits(self.max);
        match self.kind {
            LabelKind::Short => {
                out.push(false);
                out.push_repeated(true, n);
                out.push(false);
                out.extend_from(&self.bits);
            }
            LabelKind::Long => {
                out.push_uint(0b10, 2);
                out.push_uint(n as u64, k);
                out.extend_from(&self.bits);
            }
            LabelKind::Same(v) => {
                out.push_uint(0b11, 2);
                out.push(v);
                out.push_uint(n as u64, k);
            }
        }
    }

    /// Write the encoded label into a cell under construction.
    pub fn store(&self, builder: &mut CellBuilder) -> Result<(), CellError> {
        let mut encoded = BitString::new();
        self.write_to(&mut encoded);
        builder.store_bits(&encoded)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(s: &str) -> BitString {
        BitString::from_binary_str(s).unwrap()
    }

    fn encode(label: &Label) -> BitString {
        let mut out = BitString::new();
        label.write_to(&mut out);
        out
    }

    #[test]
    fn test_length_bits() {
        assert_eq!(length_bits(0), 0);
        assert_eq!(length_bits(1), 1);
        assert_eq!(length_bits(2), 2);
        assert_eq!(length_bits(7), 3);
        assert_eq!(length_bits(8), 4);
        assert_eq!(length_bits(267), 9);
        assert_eq!(length_bits(1023), 10);
    }

    #[test]
    fn test_canonical_choices() {
        assert_eq!(Label::canonical(BitString::new(), 267).kind(), LabelKind::Short);
        assert_eq!(Label::canonical(bits("1"), 267).kind(), LabelKind::Short);
        assert_eq!(
            Label::canonical(bits("10110100101"), 267).kind(),
            LabelKind::Long
        );
        assert_eq!(
            Label::canonical(bits(&"1".repeat(20)), 267).kind(),
            LabelKind::Same(true)
        );
    }

    #[test]
    fn test_short_encoding() {
        let label = Label::canonical(bits("10"), 8);
        assert_eq!(encode(&label), bits("011010"));
    }

    #[test]
    fn test_parse_each_kind() {
        for (encoded, max, expected, kind) in [
            ("0110".to_string() + "10", 8, "10", LabelKind::Short),
            ("10".to_string() + "0011" + "101", 8, "101", LabelKind::Long),
            ("11".to_string() + "0" + "0100", 8, "0000", LabelKind::Same(false)),
        ] {
            let data = bits(&encoded);
            let mut reader = BitReader::new(&data);
            let label = Label::parse(&mut reader, max).unwrap();
            assert_eq!(label.bits(), &bits(expected));
            assert_eq!(label.kind(), kind);
            assert_eq!(reader.remaining(), 0);
            assert_eq!(encode(&label), data);
        }
    }

    #[test]
    fn test_parse_rejects_length_above_max() {
        let data = bits("1011111");
        let mut reader = BitReader::new(&data);
        assert!(matches!(
            Label::parse(&mut reader, 4),
            Err(VerifyError::ShapeMismatch(_))
        ));

        let unary = bits("0111110");
        let mut reader = BitReader::new(&unary);
        assert!(matches!(
            Label::parse(&mut reader, 3),
            Err(VerifyError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_parse_truncated_is_malformed() {
        let data = bits("0110");
        let mut reader = BitReader::new(&data);
        assert!(matches!(
            Label::parse(&mut reader, 8),
            Err(VerifyError::MalformedStructure(_))
        ));
    }

    #[test]
    fn test_suffix_reencodes() {
        let label = Label::canonical(bits(&"0".repeat(30)), 267);
        let tail = label.suffix(28);
        assert_eq!(tail.bits(), &bits("00"));
        assert_eq!(tail.max(), 239);
        assert_eq!(tail.kind(), LabelKind::Short);
        assert_eq!(tail.remaining_after(), 237);
    }
}
