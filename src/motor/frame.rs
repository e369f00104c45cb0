// Frame layout shared by requests and replies:
// [address, function_code, payload..., checksum]

use super::checksum::ChecksumScheme;

/// Smallest valid frame: address, function code, checksum
pub const MIN_FRAME_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame too short ({len} bytes)")]
    TooShort { len: usize },

    #[error("checksum mismatch: expected 0x{expected:02X}, received 0x{received:02X}")]
    ChecksumMismatch { expected: u8, received: u8 },
}

/// A complete request frame, immutable once the checksum is appended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    pub fn build(address: u8, function: u8, payload: &[u8], scheme: ChecksumScheme) -> Self {
        let mut bytes = Vec::with_capacity(payload.len() + MIN_FRAME_LEN);
        bytes.push(address);
        bytes.push(function);
        bytes.extend_from_slice(payload);
        bytes.push(scheme.compute(&bytes));
        Self { bytes }
    }

    pub fn address(&self) -> u8 {
        self.bytes[0]
    }

    pub fn function(&self) -> u8 {
        self.bytes[1]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Fields of a validated frame, borrowed from the raw bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fields<'a> {
    pub address: u8,
    pub function: u8,
    pub data: &'a [u8],
}

/// Treat the last byte as checksum and verify it over everything before it
pub fn parse_and_validate(bytes: &[u8], scheme: ChecksumScheme) -> Result<Fields<'_>, FrameError> {
    if bytes.len() < MIN_FRAME_LEN {
        return Err(FrameError::TooShort { len: bytes.len() });
    }

    let (body, trailer) = bytes.split_at(bytes.len() - 1);
    let expected = scheme.compute(body);
    let received = trailer[0];
    if expected != received {
        return Err(FrameError::ChecksumMismatch { expected, received });
    }

    Ok(Fields {
        address: body[0],
        function: body[1],
        data: &body[2..],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMES: [ChecksumScheme; 3] =
        [ChecksumScheme::Fixed, ChecksumScheme::Xor, ChecksumScheme::Crc8];

    #[test]
    fn test_build_layout() {
        let frame = Frame::build(1, 0xFF, &[0x66], ChecksumScheme::Fixed);
        assert_eq!(frame.as_bytes(), &[0x01, 0xFF, 0x66, 0x6B]);
        assert_eq!(frame.address(), 1);
        assert_eq!(frame.function(), 0xFF);

        let frame = Frame::build(2, 0x35, &[], ChecksumScheme::Xor);
        assert_eq!(frame.as_bytes(), &[0x02, 0x35, 0x37]);
    }

    #[test]
    fn test_parse_recovers_fields() {
        let payload = [0x01, 0x05, 0xDC, 0x0A, 0x00];
        for scheme in SCHEMES {
            let frame = Frame::build(7, 0xF6, &payload, scheme);
            let fields = parse_and_validate(frame.as_bytes(), scheme).unwrap();
            assert_eq!(fields.address, 7);
            assert_eq!(fields.function, 0xF6);
            assert_eq!(fields.data, &payload);
        }
    }

    #[test]
    fn test_too_short() {
        assert_eq!(
            parse_and_validate(&[0x01, 0x6B], ChecksumScheme::Fixed),
            Err(FrameError::TooShort { len: 2 })
        );
        assert_eq!(
            parse_and_validate(&[], ChecksumScheme::Crc8),
            Err(FrameError::TooShort { len: 0 })
        );
    }

    #[test]
    fn test_single_bit_tamper_detected() {
        let payload = [0x00, 0x01, 0x66, 0x0A, 0x00];
        for scheme in [ChecksumScheme::Xor, ChecksumScheme::Crc8] {
            let frame = Frame::build(3, 0xF6, &payload, scheme);
            // Flip every payload bit in turn, keeping the stale checksum
            for byte in 2..2 + payload.len() {
                for bit in 0..8 {
                    let mut tampered = frame.as_bytes().to_vec();
                    tampered[byte] ^= 1 << bit;
                    assert!(matches!(
                        parse_and_validate(&tampered, scheme),
                        Err(FrameError::ChecksumMismatch { .. })
                    ));
                }
            }
        }
    }

    #[test]
    fn test_fixed_scheme_rejects_wrong_trailer() {
        let err = parse_and_validate(&[0x01, 0xF3, 0x02, 0x6C], ChecksumScheme::Fixed).unwrap_err();
        assert_eq!(
            err,
            FrameError::ChecksumMismatch {
                expected: 0x6B,
                received: 0x6C
            }
        );
    }
}
