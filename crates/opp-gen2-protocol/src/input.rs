//! Response record parsing.
//!
//! Every board answers an addressed query with one fixed-length record that
//! starts with its address and the command it answers and ends with a CRC8.
//! Config and version answers arrive concatenated, one record per board, and
//! are terminated by a single end-of-message byte.

use crate::commands::{
    CONFIG_RECORD_LEN, EOM_CMD, GET_GEN2_CFG, GET_VERS_CMD, INPUT_RECORD_LEN, INV_CMD,
    MATRIX_RECORD_LEN, READ_GEN2_INP_CMD, READ_MATRIX_INP, VERSION_RECORD_LEN, WINGS_PER_BOARD,
    is_gen2_address, is_gen2_card_id,
};
use crate::crc::verify_record;
use crate::error::{ProtocolError, ProtocolResult};
use crate::version::FirmwareVersion;
use crate::wing::WingType;

fn record<const N: usize>(data: &[u8], cmd: u8) -> ProtocolResult<[u8; N]> {
    let bytes: [u8; N] = data
        .get(..N)
        .and_then(|head| head.try_into().ok())
        .ok_or(ProtocolError::InvalidLength {
            expected: N,
            actual: data.len(),
        })?;
    let [addr, actual, ..] = bytes.as_slice() else {
        return Err(ProtocolError::InvalidLength {
            expected: N,
            actual: data.len(),
        });
    };
    if !is_gen2_address(*addr) {
        return Err(ProtocolError::NotGen2Address(*addr));
    }
    if *actual != cmd {
        return Err(ProtocolError::UnexpectedCommand {
            expected: cmd,
            actual: *actual,
        });
    }
    verify_record(&bytes)?;
    Ok(bytes)
}

/// Raw digital input word of one board (active-low).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputRecord {
    pub addr: u8,
    pub state: u32,
}

impl InputRecord {
    pub fn parse(data: &[u8]) -> ProtocolResult<Self> {
        let [addr, _, s0, s1, s2, s3, _] = record::<INPUT_RECORD_LEN>(data, READ_GEN2_INP_CMD)?;
        Ok(Self {
            addr,
            state: u32::from_be_bytes([s0, s1, s2, s3]),
        })
    }
}

/// Raw matrix input banks of one board (active-low).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixRecord {
    pub addr: u8,
    pub banks: [u32; 2],
}

impl MatrixRecord {
    pub fn parse(data: &[u8]) -> ProtocolResult<Self> {
        let [addr, _, a0, a1, a2, a3, b0, b1, b2, b3, _] =
            record::<MATRIX_RECORD_LEN>(data, READ_MATRIX_INP)?;
        Ok(Self {
            addr,
            banks: [
                u32::from_be_bytes([a0, a1, a2, a3]),
                u32::from_be_bytes([b0, b1, b2, b3]),
            ],
        })
    }
}

/// Wing population of one board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigRecord {
    pub addr: u8,
    pub wings: [WingType; WINGS_PER_BOARD],
}

impl ConfigRecord {
    pub fn parse(data: &[u8]) -> ProtocolResult<Self> {
        let bytes = record::<CONFIG_RECORD_LEN>(data, GET_GEN2_CFG)?;
        let [addr, _, w0, w1, w2, w3, _] = bytes;
        Ok(Self {
            addr,
            wings: [w0, w1, w2, w3].map(WingType::from_u8),
        })
    }
}

/// Firmware version of one board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRecord {
    pub addr: u8,
    pub version: FirmwareVersion,
}

impl VersionRecord {
    pub fn parse(data: &[u8]) -> ProtocolResult<Self> {
        let bytes = record::<VERSION_RECORD_LEN>(data, GET_VERS_CMD)?;
        let [addr, _, a, b, c, d, _] = bytes;
        Ok(Self {
            addr,
            version: FirmwareVersion::from_be_bytes([a, b, c, d]),
        })
    }
}

/// Card addresses listed in an inventory response, in chain order.
///
/// The response is the inventory command byte, one identifier per board and
/// an end-of-message byte. Identifiers that are not Gen2 cards are skipped.
pub fn parse_inventory(msg: &[u8]) -> ProtocolResult<Vec<u8>> {
    let Some((&first, rest)) = msg.split_first() else {
        return Err(ProtocolError::InvalidLength {
            expected: 2,
            actual: 0,
        });
    };
    if first != INV_CMD {
        return Err(ProtocolError::UnexpectedCommand {
            expected: INV_CMD,
            actual: first,
        });
    }
    let end = rest
        .iter()
        .position(|&b| b == EOM_CMD)
        .ok_or(ProtocolError::MissingTerminator)?;
    Ok(rest
        .iter()
        .take(end)
        .copied()
        .filter(|&b| is_gen2_card_id(b))
        .collect())
}

/// How a concatenated record sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceEnd {
    /// A record was followed by the end-of-message byte.
    Terminated,
    /// The record at `offset` failed its CRC. Parsing stopped there.
    BadCrc { offset: usize },
    /// Fewer than a full record remained at `offset`.
    Short { offset: usize },
    /// The byte after the record at `offset` neither ended the message nor
    /// started another record of the same kind.
    Malformed { offset: usize },
}

impl SequenceEnd {
    /// Whether the stream must be resynchronized.
    pub fn lost_sync(&self) -> bool {
        matches!(self, Self::Short { .. } | Self::Malformed { .. })
    }
}

/// Records parsed from a concatenated response, up to the point parsing stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSequence<T> {
    pub records: Vec<T>,
    pub end: SequenceEnd,
}

fn parse_sequence<T>(
    msg: &[u8],
    cmd: u8,
    len: usize,
    parse: impl Fn(&[u8]) -> ProtocolResult<T>,
) -> RecordSequence<T> {
    let mut records = Vec::new();
    let mut offset = 0;
    let end = loop {
        let Some(chunk) = msg.get(offset..offset + len) else {
            break SequenceEnd::Short { offset };
        };
        match parse(chunk) {
            Ok(record) => records.push(record),
            Err(ProtocolError::CrcMismatch { .. }) => break SequenceEnd::BadCrc { offset },
            Err(_) => break SequenceEnd::Malformed { offset },
        }
        if msg.get(offset + len) == Some(&EOM_CMD) {
            break SequenceEnd::Terminated;
        }
        if msg.get(offset + len + 1) == Some(&cmd) {
            offset += len;
        } else {
            break SequenceEnd::Malformed { offset };
        }
    };
    RecordSequence { records, end }
}

/// Parses the concatenated answer to a configuration query.
pub fn parse_config_response(msg: &[u8]) -> RecordSequence<ConfigRecord> {
    parse_sequence(msg, GET_GEN2_CFG, CONFIG_RECORD_LEN, ConfigRecord::parse)
}

/// Parses the concatenated answer to a version query.
pub fn parse_version_response(msg: &[u8]) -> RecordSequence<VersionRecord> {
    parse_sequence(msg, GET_VERS_CMD, VERSION_RECORD_LEN, VersionRecord::parse)
}
