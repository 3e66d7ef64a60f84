//! Fuzzes the steady-state input stream resynchronizer.
//!
//! Arbitrary bytes are pushed in arbitrary chunk sizes. Every emitted record
//! must be a whole input or matrix record starting at a Gen2 address, and the
//! resynchronizer must never panic.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_resync

#![no_main]

use libfuzzer_sys::fuzz_target;
use opp_gen2_protocol::{RawRecord, ResyncEvent, Resynchronizer, is_gen2_address};

fuzz_target!(|data: &[u8]| {
    let Some((&chunk, rest)) = data.split_first() else {
        return;
    };
    let chunk = usize::from(chunk).max(1);

    let mut resync = Resynchronizer::new();
    for (i, piece) in rest.chunks(chunk).enumerate() {
        resync.push(piece);
        if i % 7 == 3 {
            resync.lost_sync();
        }
        while let Some(event) = resync.next_event() {
            if let ResyncEvent::Record(record) = event {
                let bytes = record.as_bytes();
                let expected = match &record {
                    RawRecord::Input(_) => 7,
                    RawRecord::Matrix(_) => 11,
                };
                assert_eq!(bytes.len(), expected);
                assert!(bytes.first().is_some_and(|&b| is_gen2_address(b)));
                let _ = opp_gen2_protocol::verify_record(bytes);
            }
        }
    }
});
