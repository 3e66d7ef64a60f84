//! Fuzzes the handshake response parsers.
//!
//! Inventory, configuration and version answers, plus the single-record
//! parsers, must reject garbage with an error instead of panicking.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_responses

#![no_main]

use libfuzzer_sys::fuzz_target;
use opp_gen2_protocol::{
    Command, ConfigRecord, InputRecord, MatrixRecord, VersionRecord, crc8_whole_msg,
    parse_config_response, parse_inventory, parse_version_response,
};

fuzz_target!(|data: &[u8]| {
    let _ = crc8_whole_msg(data);
    let _ = Command::classify(data);

    if let Ok(addrs) = parse_inventory(data) {
        assert!(addrs.len() < data.len());
    }

    let configs = parse_config_response(data);
    assert!(configs.records.len() * 7 <= data.len());
    let versions = parse_version_response(data);
    assert!(versions.records.len() * 7 <= data.len());

    let _ = InputRecord::parse(data);
    let _ = MatrixRecord::parse(data);
    let _ = ConfigRecord::parse(data);
    let _ = VersionRecord::parse(data);
});
