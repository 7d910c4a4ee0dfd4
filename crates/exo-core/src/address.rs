//! # Account Addresses
//!
//! A standard internal address: a signed 8-bit workchain id and a 256-bit
//! account id. The raw textual form is `"<workchain>:<64 hex chars>"`,
//! e.g. `0:83df…` or `-1:3333…`.
//!
//! ## Security Invariant
//!
//! Owner authorization compares addresses with [`Address::ct_eq()`] on the
//! raw pair. No case folding or alternative encodings are accepted at
//! comparison time; parsing normalizes hex case only.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use subtle::ConstantTimeEq;

use crate::error::ParseError;

/// A standard (`addr_std`) internal address without anycast.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    workchain: i8,
    account: [u8; 32],
}

impl Address {
    /// Bit length of `addr_std$10 anycast:nothing workchain:int8 address:bits256`.
    pub const STD_BITS: usize = 2 + 1 + 8 + 256;

    /// Build an address from its parts.
    pub const fn new(workchain: i8, account: [u8; 32]) -> Self {
        Self { workchain, account }
    }

    /// The workchain id.
    pub const fn workchain(&self) -> i8 {
        self.workchain
    }

    /// The 256-bit account id.
    pub const fn account(&self) -> &[u8; 32] {
        &self.account
    }

    /// Constant-time equality on the raw representation.
    pub fn ct_eq(&self, other: &Self) -> bool {
        let wc = (self.workchain as u8).ct_eq(&(other.workchain as u8));
        (wc & self.account[..].ct_eq(&other.account[..])).into()
    }

    /// Render in raw form: `workchain:hex`.
    pub fn to_raw(&self) -> String {
        let hex: String = self.account.iter().map(|b| format!("{b:02x}")).collect();
        format!("{}:{hex}", self.workchain)
    }

    /// Parse the raw form `workchain:hex`.
    pub fn from_raw(s: &str) -> Result<Self, ParseError> {
        let s = s.trim();
        let (wc, hex) = s
            .split_once(':')
            .ok_or_else(|| ParseError::InvalidAddress(format!("missing ':' in {s:?}")))?;
        let workchain: i8 = wc
            .parse()
            .map_err(|e| ParseError::InvalidAddress(format!("bad workchain {wc:?}: {e}")))?;
        if hex.len() != 64 {
            return Err(ParseError::InvalidAddress(format!(
                "account id must be 64 hex chars, got {}",
                hex.len()
            )));
        }
        let mut account = [0u8; 32];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk)
                .map_err(|e| ParseError::InvalidAddress(format!("invalid hex: {e}")))?;
            account[i] = u8::from_str_radix(pair, 16)
                .map_err(|e| ParseError::InvalidAddress(format!("invalid hex at {}: {e}", i * 2)))?;
        }
        Ok(Self { workchain, account })
    }
}

impl std::str::FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_raw(s)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_raw())
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({})", self.to_raw())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_raw())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_raw(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_roundtrip() {
        let addr = Address::new(0, [0xab; 32]);
        let raw = addr.to_raw();
        assert_eq!(raw, format!("0:{}", "ab".repeat(32)));
        assert_eq!(Address::from_raw(&raw).unwrap(), addr);
    }

    #[test]
    fn test_masterchain_address() {
        let raw = format!("-1:{}", "33".repeat(32));
        let addr: Address = raw.parse().unwrap();
        assert_eq!(addr.workchain(), -1);
        assert_eq!(addr.to_string(), raw);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Address::from_raw("0").is_err());
        assert!(Address::from_raw("0:abcd").is_err());
        assert!(Address::from_raw(&format!("x:{}", "00".repeat(32))).is_err());
        assert!(Address::from_raw(&format!("300:{}", "00".repeat(32))).is_err());
    }

    #[test]
    fn test_ct_eq_distinguishes_workchain() {
        let a = Address::new(0, [1; 32]);
        let b = Address::new(-1, [1; 32]);
        assert!(a.ct_eq(&a));
        assert!(!a.ct_eq(&b));
    }

    #[test]
    fn test_serde_raw_string() {
        let addr = Address::new(0, [0x11; 32]);
        let json = serde_json::to_string(&addr).unwrap();
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
