//! Property-based tests for the OPP Gen2 protocol.
//!
//! Covers CRC8 detection guarantees, stream resynchronization after
//! corruption, chunking independence and switch diff idempotence.

use opp_gen2_protocol::commands::{READ_GEN2_INP_CMD, READ_MATRIX_INP};
use opp_gen2_protocol::{
    RawRecord, ResyncEvent, Resynchronizer, crc8_part_msg, crc8_whole_msg, diff_inputs,
    diff_matrix, is_gen2_address, verify_record,
};
use proptest::prelude::*;

/// Bytes that can never be mistaken for a record header.
fn is_clean(byte: u8) -> bool {
    !is_gen2_address(byte) && byte != READ_GEN2_INP_CMD && byte != READ_MATRIX_INP
}

/// An input frame whose payload and CRC bytes are all clean.
fn clean_frame(addr: u8, state: [u8; 4]) -> Vec<u8> {
    let [s0, s1, s2, start] = state;
    (0u16..=0xFF)
        .map(|step| start.wrapping_add(step as u8))
        .map(|s3| {
            let mut frame = vec![addr, READ_GEN2_INP_CMD, s0, s1, s2, s3];
            frame.push(crc8_whole_msg(&frame));
            frame
        })
        .find(|frame| frame.iter().skip(2).all(|&b| is_clean(b)))
        .unwrap_or_default()
}

fn clean_byte() -> impl Strategy<Value = u8> {
    any::<u8>().prop_filter("header byte", |&b| is_clean(b))
}

fn frames(max: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    proptest::collection::vec(
        (0x20u8..=0x2F, proptest::array::uniform4(clean_byte())),
        1..=max,
    )
    .prop_map(|frames| {
        frames
            .into_iter()
            .map(|(addr, state)| clean_frame(addr, state))
            .collect()
    })
}

fn collect_records(resync: &mut Resynchronizer) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    while let Some(event) = resync.next_event() {
        if let ResyncEvent::Record(record) = event {
            out.push(record.as_bytes().to_vec());
        }
    }
    out
}

fn feed_in_chunks(bytes: &[u8], chunks: &[usize]) -> Vec<Vec<u8>> {
    let mut resync = Resynchronizer::new();
    let mut records = Vec::new();
    let mut rest = bytes;
    let mut sizes = chunks.iter().cycle();
    while !rest.is_empty() {
        let size = sizes.next().copied().unwrap_or(1).clamp(1, rest.len());
        let (head, tail) = rest.split_at(size);
        resync.push(head);
        records.extend(collect_records(&mut resync));
        rest = tail;
    }
    records
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(500))]

    /// A message followed by its own CRC always verifies.
    #[test]
    fn prop_crc_appended_verifies(msg in proptest::collection::vec(any::<u8>(), 0..64)) {
        let mut framed = msg.clone();
        framed.push(crc8_whole_msg(&msg));
        prop_assert!(verify_record(&framed).is_ok());
    }

    /// The partial-message CRC equals the whole-message CRC of the same range.
    #[test]
    fn prop_part_equals_whole(
        prefix in proptest::collection::vec(any::<u8>(), 0..8),
        msg in proptest::collection::vec(any::<u8>(), 0..32),
        suffix in proptest::collection::vec(any::<u8>(), 0..8),
    ) {
        let mut whole = prefix.clone();
        whole.extend(&msg);
        whole.extend(&suffix);
        prop_assert_eq!(crc8_part_msg(&whole, prefix.len(), msg.len()), Ok(crc8_whole_msg(&msg)));
    }

    /// Flipping any single bit of a framed message is detected.
    #[test]
    fn prop_single_bit_flip_detected(
        msg in proptest::collection::vec(any::<u8>(), 1..32),
        bit in any::<prop::sample::Index>(),
    ) {
        let mut framed = msg.clone();
        framed.push(crc8_whole_msg(&msg));
        let index = bit.index(framed.len() * 8);
        if let Some(byte) = framed.get_mut(index / 8) {
            *byte ^= 1 << (index % 8);
        }
        prop_assert!(verify_record(&framed).is_err());
    }

    /// Chunk boundaries never change what the resynchronizer delivers.
    #[test]
    fn prop_resync_chunking_independent(
        bytes in proptest::collection::vec(any::<u8>(), 0..128),
        chunks in proptest::collection::vec(1usize..16, 1..8),
    ) {
        prop_assert_eq!(feed_in_chunks(&bytes, &[bytes.len().max(1)]), feed_in_chunks(&bytes, &chunks));
    }

    /// Clean frames pass through unchanged and in order.
    #[test]
    fn prop_resync_passes_clean_stream(
        frames in frames(8),
        chunks in proptest::collection::vec(1usize..16, 1..8),
    ) {
        let stream: Vec<u8> = frames.concat();
        prop_assert_eq!(feed_in_chunks(&stream, &chunks), frames);
    }

    /// After a truncated frame and arbitrary noise, every frame but the first
    /// one following the noise is recovered, and nothing before it is lost.
    #[test]
    fn prop_resync_recovers_after_corruption(
        before in frames(4),
        partial_len in 0usize..7,
        partial in frames(1),
        noise in proptest::collection::vec(
            any::<u8>().prop_filter("record command", |&b| b != READ_GEN2_INP_CMD && b != READ_MATRIX_INP),
            0..24,
        ),
        after in frames(6),
        chunks in proptest::collection::vec(1usize..16, 1..8),
    ) {
        let mut stream: Vec<u8> = before.concat();
        let partial_frame = partial.concat();
        stream.extend(partial_frame.iter().take(partial_len));
        stream.extend(&noise);
        stream.extend(after.concat());

        let records = feed_in_chunks(&stream, &chunks);

        prop_assert!(records.len() <= before.len() + after.len() + 1);
        prop_assert_eq!(records.get(..before.len()), Some(before.as_slice()));
        let tail = after.get(1..).unwrap_or_default();
        let delivered_tail = records.len().checked_sub(tail.len()).and_then(|start| records.get(start..));
        prop_assert_eq!(delivered_tail, Some(tail));
        for record in &records {
            prop_assert!(matches!(record.get(1), Some(&READ_GEN2_INP_CMD)));
        }
    }

    /// Applying a diff reproduces the new word, and a second diff is empty.
    #[test]
    fn prop_diff_idempotent(old in any::<u32>(), new in any::<u32>()) {
        let mut rebuilt = old;
        let mut count = 0u32;
        for transition in diff_inputs(old, new) {
            rebuilt ^= 1 << transition.channel;
            prop_assert_eq!(transition.active, new & (1 << transition.channel) == 0);
            count += 1;
        }
        prop_assert_eq!(rebuilt, new);
        prop_assert_eq!(count, (old ^ new).count_ones());
        prop_assert_eq!(diff_inputs(new, new).count(), 0);
    }

    /// Matrix channels always land in the 32..96 range.
    #[test]
    fn prop_matrix_channels_in_range(old in any::<[u32; 2]>(), new in any::<[u32; 2]>()) {
        for transition in diff_matrix(old, new) {
            prop_assert!((32..96).contains(&transition.channel));
        }
        prop_assert_eq!(diff_matrix(new, new).count(), 0);
    }
}

#[test]
fn test_matrix_record_carved_whole() {
    let mut frame = vec![0x20, READ_MATRIX_INP];
    frame.extend([0xFF; 8]);
    frame.push(crc8_whole_msg(&frame));
    let mut resync = Resynchronizer::new();
    resync.push(&frame);
    assert!(matches!(
        resync.next_event(),
        Some(ResyncEvent::Record(RawRecord::Matrix(bytes))) if bytes.as_slice() == frame.as_slice()
    ));
}
