//! Open Pinball Project (OPP) Gen2 serial protocol.
//!
//! This crate is intentionally I/O-free. It provides pure functions and types
//! for talking to a daisy-chain of OPP Gen2 I/O boards so the wire handling can
//! be tested and fuzzed without a serial port.
//!
//! # Key Features
//! - CRC8 (poly 0x07, init 0xFF) over whole and partial messages
//! - Request framing for inventory, configuration, version, input reads,
//!   solenoid configuration, switch/coil mapping, kicks, incandescents and
//!   neopixels
//! - Fixed-length response record parsing
//! - Stream resynchronization for the steady-state input read path
//! - Switch state diffing (active-low inputs and matrix banks)
//! - Solenoid rule encodings (hold strength, minimum-off factor, legacy
//!   switch/coil fit)

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(static_mut_refs)]
#![deny(clippy::unwrap_used)]

pub mod commands;
pub mod crc;
pub mod diff;
pub mod error;
pub mod frame;
pub mod input;
pub mod output;
pub mod resync;
pub mod solenoid;
pub mod version;
pub mod wing;

pub use commands::{
    Command, EOM_CMD, INV_CMD, card_address, card_number, is_gen2_address, is_gen2_card_id,
};
pub use crc::{crc8_part_msg, crc8_whole_msg, verify_record};
pub use diff::{InputTransition, MATRIX_CHANNEL_BASE, diff_inputs, diff_matrix, is_active};
pub use error::{ProtocolError, ProtocolResult};
pub use frame::{FrameBuilder, HexDump, hex_dump};
pub use input::{
    ConfigRecord, InputRecord, MatrixRecord, RecordSequence, SequenceEnd, VersionRecord,
    parse_config_response, parse_inventory, parse_version_response,
};
pub use output::{
    build_configure_solenoid, build_get_config, build_get_version, build_incand_update,
    build_inventory, build_kick, build_neo_color_table, build_neo_set, build_read_inputs,
    build_read_matrix, build_solenoid_input,
};
pub use resync::{RawRecord, ResyncEvent, Resynchronizer};
pub use solenoid::{
    CoilSettings, SolenoidConfig, hold_value, matching_switch_channel, minimum_off_factor,
    solenoid_config,
};
pub use version::FirmwareVersion;
pub use wing::{BoardLayout, WingType};
