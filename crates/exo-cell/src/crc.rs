//! CRC32-C (Castagnoli), as used by the bag-of-cells trailer.

const POLY: u32 = 0x82f6_3b78;

/// Compute the CRC32-C of `data`.
pub fn crc32c(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for byte in data {
        crc ^= u32::from(*byte);
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ POLY } else { crc >> 1 };
        }
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(crc32c(b"123456789"), 0xe306_9283);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(crc32c(&[]), 0);
    }
}
