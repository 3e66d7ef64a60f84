//! CRC8 used on every OPP frame.
//!
//! Polynomial 0x07, initial value 0xFF, no reflection and no final XOR.
//! The checksum byte always follows the bytes it covers.

use crc::{Algorithm, Crc};

use crate::error::{ProtocolError, ProtocolResult};

pub const CRC_8_OPP: Algorithm<u8> = Algorithm {
    width: 8,
    poly: 0x07,
    init: 0xff,
    refin: false,
    refout: false,
    xorout: 0x00,
    check: 0xfb,
    residue: 0x00,
};

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_OPP);

/// Checksum over an entire message.
#[inline]
pub fn crc8_whole_msg(msg: &[u8]) -> u8 {
    CRC8.checksum(msg)
}

/// Checksum over `len` bytes of `msg` starting at `offset`.
pub fn crc8_part_msg(msg: &[u8], offset: usize, len: usize) -> ProtocolResult<u8> {
    offset
        .checked_add(len)
        .and_then(|end| msg.get(offset..end))
        .map(crc8_whole_msg)
        .ok_or(ProtocolError::OutOfRange {
            offset,
            len,
            actual: msg.len(),
        })
}

/// Verifies a record whose last byte is the checksum of the bytes before it.
pub fn verify_record(record: &[u8]) -> ProtocolResult<()> {
    let Some((&actual, body)) = record.split_last() else {
        return Err(ProtocolError::InvalidLength {
            expected: 1,
            actual: 0,
        });
    };
    let expected = crc8_whole_msg(body);
    if expected == actual {
        Ok(())
    } else {
        Err(ProtocolError::CrcMismatch { expected, actual })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(crc8_whole_msg(b"123456789"), 0xFB);
    }

    #[test]
    fn test_empty_message_is_init_value() {
        assert_eq!(crc8_whole_msg(&[]), 0xFF);
    }

    #[test]
    fn test_known_frames() {
        assert_eq!(crc8_whole_msg(&[0x20, 0x0D, 0, 0, 0, 0]), 0x60);
        assert_eq!(crc8_whole_msg(&[0x21, 0x0D, 0, 0, 0, 0]), 0x49);
        assert_eq!(crc8_whole_msg(&[0x20, 0x02, 0, 0, 0, 0]), 0x50);
        assert_eq!(crc8_whole_msg(&[0x20, 0x08, 0, 0, 0, 0]), 0x8D);
        assert_eq!(crc8_whole_msg(&[0x20, 0x08, 0xFF, 0xFF, 0xFF, 0xFF]), 0x53);
    }

    #[test]
    fn test_part_matches_whole() {
        let msg = [0xAA, 0x20, 0x0D, 0, 0, 0, 0, 0xBB];
        assert_eq!(crc8_part_msg(&msg, 1, 6), Ok(0x60));
    }

    #[test]
    fn test_part_out_of_range() {
        let msg = [0x20, 0x0D, 0x00];
        assert!(matches!(
            crc8_part_msg(&msg, 1, 3),
            Err(ProtocolError::OutOfRange { .. })
        ));
        assert!(crc8_part_msg(&msg, usize::MAX, 2).is_err());
    }

    #[test]
    fn test_verify_record() {
        assert!(verify_record(&[0x20, 0x0D, 0, 0, 0, 0, 0x60]).is_ok());
        assert_eq!(
            verify_record(&[0x20, 0x0D, 0, 0, 0, 0, 0x61]),
            Err(ProtocolError::CrcMismatch {
                expected: 0x60,
                actual: 0x61
            })
        );
        assert!(verify_record(&[]).is_err());
    }
}
