//! Stream resynchronization for the steady-state input read path.
//!
//! Bytes arrive from a chain in arbitrary chunks. The resynchronizer buffers
//! them and carves out complete input and matrix records. When the stream is
//! marked out of sync it discards bytes up to the next plausible record start.

use tracing::trace;

use crate::commands::{
    EOM_CMD, INPUT_RECORD_LEN, MATRIX_RECORD_LEN, MIN_RECORD_LEN, READ_GEN2_INP_CMD,
    READ_MATRIX_INP, is_gen2_address,
};

/// A complete record carved from the stream. Its CRC has not been checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawRecord {
    Input([u8; INPUT_RECORD_LEN]),
    Matrix([u8; MATRIX_RECORD_LEN]),
}

impl RawRecord {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Input(bytes) => bytes,
            Self::Matrix(bytes) => bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncEvent {
    Record(RawRecord),
    EndOfMessage,
    /// Bytes dropped while realigning.
    Discarded(usize),
}

#[derive(Debug, Default)]
pub struct Resynchronizer {
    buffer: Vec<u8>,
    lost_sync: bool,
    discarded: u64,
}

impl Resynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Marks the stream as misaligned. The next call to
    /// [`next_event`](Self::next_event) scans for a record start.
    pub fn lost_sync(&mut self) {
        self.lost_sync = true;
    }

    pub fn is_synchronized(&self) -> bool {
        !self.lost_sync
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes discarded since creation.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Returns the next event, or `None` when more bytes are needed.
    ///
    /// Nothing is interpreted until at least a minimal record is buffered.
    /// A matrix record stays buffered until all of it has arrived.
    pub fn next_event(&mut self) -> Option<ResyncEvent> {
        if self.buffer.len() < MIN_RECORD_LEN {
            return None;
        }

        if self.lost_sync {
            let skip = self
                .buffer
                .iter()
                .position(|&b| is_gen2_address(b))
                .unwrap_or(self.buffer.len());
            if skip < self.buffer.len() {
                self.lost_sync = false;
            }
            if skip > 0 {
                return Some(self.discard(skip));
            }
        }

        let (first, second) = match self.buffer.as_slice() {
            [first, second, ..] => (*first, *second),
            _ => return None,
        };

        if is_gen2_address(first) {
            match second {
                READ_GEN2_INP_CMD => {
                    let mut record = [0u8; INPUT_RECORD_LEN];
                    record.copy_from_slice(self.buffer.get(..INPUT_RECORD_LEN)?);
                    self.buffer.drain(..INPUT_RECORD_LEN);
                    Some(ResyncEvent::Record(RawRecord::Input(record)))
                }
                READ_MATRIX_INP => {
                    let mut record = [0u8; MATRIX_RECORD_LEN];
                    record.copy_from_slice(self.buffer.get(..MATRIX_RECORD_LEN)?);
                    self.buffer.drain(..MATRIX_RECORD_LEN);
                    Some(ResyncEvent::Record(RawRecord::Matrix(record)))
                }
                _ => {
                    self.lost_sync = true;
                    Some(self.discard(2))
                }
            }
        } else if first == EOM_CMD {
            self.buffer.drain(..1);
            Some(ResyncEvent::EndOfMessage)
        } else {
            self.lost_sync = true;
            Some(self.discard(1))
        }
    }

    fn discard(&mut self, count: usize) -> ResyncEvent {
        let count = count.min(self.buffer.len());
        trace!(count, "discarding bytes to resynchronize");
        self.buffer.drain(..count);
        self.discarded += count as u64;
        ResyncEvent::Discarded(count)
    }
}

impl Iterator for Resynchronizer {
    type Item = ResyncEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::crc8_whole_msg;

    fn input_frame(addr: u8, state: u32) -> Vec<u8> {
        let mut out = vec![addr, READ_GEN2_INP_CMD];
        out.extend(state.to_be_bytes());
        out.push(crc8_whole_msg(&out));
        out
    }

    fn records(resync: &mut Resynchronizer) -> Vec<RawRecord> {
        resync
            .filter_map(|event| match event {
                ResyncEvent::Record(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_splits_back_to_back_records() {
        let mut resync = Resynchronizer::new();
        let mut bytes = input_frame(0x20, 0xFFFF_FFFF);
        bytes.extend(input_frame(0x21, 0xFFFF_FFFE));
        bytes.push(EOM_CMD);
        resync.push(&bytes);
        assert_eq!(records(&mut resync).len(), 2);
        // The trailing terminator stays until a full record is buffered.
        assert_eq!(resync.buffered(), 1);
    }

    #[test]
    fn test_waits_for_minimum_record() {
        let mut resync = Resynchronizer::new();
        let frame = input_frame(0x20, 0);
        resync.push(frame.get(..6).unwrap_or_default());
        assert_eq!(resync.next_event(), None);
        resync.push(frame.get(6..).unwrap_or_default());
        assert!(matches!(
            resync.next_event(),
            Some(ResyncEvent::Record(RawRecord::Input(_)))
        ));
    }

    #[test]
    fn test_partial_matrix_record_is_kept() {
        let mut resync = Resynchronizer::new();
        resync.push(&[0x20, READ_MATRIX_INP, 0, 0, 0, 0, 0, 0]);
        assert_eq!(resync.next_event(), None);
        assert_eq!(resync.buffered(), 8);
        resync.push(&[0, 0, 0]);
        assert!(matches!(
            resync.next_event(),
            Some(ResyncEvent::Record(RawRecord::Matrix(_)))
        ));
        assert_eq!(resync.buffered(), 0);
    }

    #[test]
    fn test_leading_terminators_are_consumed() {
        let mut resync = Resynchronizer::new();
        resync.push(&[EOM_CMD, EOM_CMD]);
        resync.push(&input_frame(0x20, 1));
        let events: Vec<_> = resync.by_ref().collect();
        assert_eq!(events.first(), Some(&ResyncEvent::EndOfMessage));
        assert!(resync.is_synchronized());
        assert!(matches!(events.last(), Some(ResyncEvent::Record(_))));
    }

    #[test]
    fn test_unknown_command_drops_two_bytes() {
        let mut resync = Resynchronizer::new();
        resync.push(&[0x20, 0x55]);
        resync.push(&input_frame(0x21, 7));
        assert_eq!(resync.next_event(), Some(ResyncEvent::Discarded(2)));
        assert!(!resync.is_synchronized());
        assert_eq!(records(&mut resync).len(), 1);
        assert!(resync.is_synchronized());
        assert_eq!(resync.discarded(), 2);
    }

    #[test]
    fn test_lost_sync_skips_to_next_address() {
        let mut resync = Resynchronizer::new();
        resync.push(&[0x01, 0x02, 0x03]);
        resync.push(&input_frame(0x22, 0));
        resync.lost_sync();
        assert_eq!(resync.next_event(), Some(ResyncEvent::Discarded(3)));
        assert!(resync.is_synchronized());
        let records = records(&mut resync);
        assert_eq!(records.len(), 1);
        assert_eq!(records.first().and_then(|r| r.as_bytes().first().copied()), Some(0x22));
    }

    #[test]
    fn test_lost_sync_with_no_address_empties_buffer() {
        let mut resync = Resynchronizer::new();
        resync.push(&[0x01; 9]);
        resync.lost_sync();
        assert_eq!(resync.next_event(), Some(ResyncEvent::Discarded(9)));
        assert!(!resync.is_synchronized());
        assert_eq!(resync.buffered(), 0);
    }
}
