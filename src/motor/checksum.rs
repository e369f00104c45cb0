// Checksum byte appended to every motor frame
//
// The controllers ship configured for a fixed trailer byte (0x6B); XOR and
// CRC-8 are selectable in the driver configuration.

/// Trailer byte used by the fixed scheme
pub const FIXED_CHECKSUM: u8 = 0x6B;

/// CRC-8 generator polynomial (x^8 + x^2 + x + 1)
const CRC8_POLY: u8 = 0x07;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumScheme {
    #[default]
    Fixed,
    Xor,
    Crc8,
}

impl ChecksumScheme {
    /// Compute the checksum byte over `bytes`
    pub fn compute(self, bytes: &[u8]) -> u8 {
        match self {
            ChecksumScheme::Fixed => FIXED_CHECKSUM,
            ChecksumScheme::Xor => bytes.iter().fold(0, |acc, &b| acc ^ b),
            ChecksumScheme::Crc8 => crc8(bytes),
        }
    }
}

// MSB-first, init 0, no final xor
fn crc8(bytes: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in bytes {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ CRC8_POLY
            } else {
                crc << 1
            };
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_ignores_content() {
        assert_eq!(ChecksumScheme::Fixed.compute(&[]), 0x6B);
        assert_eq!(ChecksumScheme::Fixed.compute(&[0x01, 0xF6, 0x00]), 0x6B);
        assert_eq!(ChecksumScheme::Fixed.compute(&[0xFF; 32]), 0x6B);
    }

    #[test]
    fn test_xor() {
        assert_eq!(ChecksumScheme::Xor.compute(&[]), 0);
        // 0x01 ^ 0x35 = 0x34
        assert_eq!(ChecksumScheme::Xor.compute(&[0x01, 0x35]), 0x34);
        assert_eq!(ChecksumScheme::Xor.compute(&[0xAA, 0xAA]), 0);
    }

    #[test]
    fn test_crc8_check_value() {
        // Standard CRC-8 (poly 0x07) check value for "123456789"
        assert_eq!(ChecksumScheme::Crc8.compute(b"123456789"), 0xF4);
        assert_eq!(ChecksumScheme::Crc8.compute(&[]), 0);
        assert_eq!(ChecksumScheme::Crc8.compute(&[0x01]), 0x07);
    }

    #[test]
    fn test_deterministic() {
        let data = [0x03, 0xFD, 0x01, 0x00, 0x64, 0x0A, 0x00, 0x00, 0x0C, 0x80];
        for scheme in [ChecksumScheme::Fixed, ChecksumScheme::Xor, ChecksumScheme::Crc8] {
            assert_eq!(scheme.compute(&data), scheme.compute(&data));
        }
    }
}
