//! Request builders for every message the host sends to a chain.

use crate::commands::{
    CFG_IND_SOL_CMD, CFG_SOL_INP_REMOVE, CHNG_NEO_CMD, CHNG_NEO_COLOR_TBL, EOM_CMD, GET_GEN2_CFG,
    GET_VERS_CMD, INCAND_CMD, INCAND_SET_ON_OFF, INV_CMD, KICK_SOL_CMD, NEO_CMD_ON,
    READ_GEN2_INP_CMD, READ_MATRIX_INP, SET_SOL_INP_CMD,
};
use crate::frame::FrameBuilder;
use crate::solenoid::SolenoidConfig;

/// Length of a config, version or input-read request frame.
pub const QUERY_FRAME_LEN: usize = 7;
/// Length of a matrix-read request frame.
pub const MATRIX_QUERY_FRAME_LEN: usize = 11;

/// Inventory request: the boards append their addresses as it passes.
pub fn build_inventory() -> Vec<u8> {
    vec![INV_CMD, EOM_CMD]
}

fn build_query(addrs: &[u8], cmd: u8) -> Vec<u8> {
    let mut builder = FrameBuilder::with_capacity(addrs.len() * QUERY_FRAME_LEN + 1);
    for &addr in addrs {
        builder.begin(addr, cmd).write_zeros(4).finish();
    }
    builder.end_of_message();
    builder.into_inner()
}

/// Configuration query for every board in `addrs`, terminated once.
pub fn build_get_config(addrs: &[u8]) -> Vec<u8> {
    build_query(addrs, GET_GEN2_CFG)
}

/// Firmware version query for every board in `addrs`, terminated once.
pub fn build_get_version(addrs: &[u8]) -> Vec<u8> {
    build_query(addrs, GET_VERS_CMD)
}

/// Single input-read frame. Callers concatenate these and terminate the
/// composite message themselves.
pub fn build_read_inputs(addr: u8) -> Vec<u8> {
    let mut builder = FrameBuilder::with_capacity(QUERY_FRAME_LEN);
    builder.begin(addr, READ_GEN2_INP_CMD).write_zeros(4).finish();
    builder.into_inner()
}

/// Single matrix-read frame (two 32-bit banks of zero payload).
pub fn build_read_matrix(addr: u8) -> Vec<u8> {
    let mut builder = FrameBuilder::with_capacity(MATRIX_QUERY_FRAME_LEN);
    builder.begin(addr, READ_MATRIX_INP).write_zeros(8).finish();
    builder.into_inner()
}

/// Configures solenoid `channel` on the board at `addr`.
pub fn build_configure_solenoid(addr: u8, channel: u8, config: &SolenoidConfig) -> Vec<u8> {
    let mut builder = FrameBuilder::with_capacity(8);
    builder
        .begin(addr, CFG_IND_SOL_CMD)
        .write_u8(channel)
        .write_u8(config.flags)
        .write_u8(config.pulse_ms)
        .write_u8(config.hold_and_off())
        .finish()
        .end_of_message();
    builder.into_inner()
}

/// Adds or removes the firmware mapping that fires `coil` from `switch`.
pub fn build_solenoid_input(addr: u8, switch: u8, coil: u8, remove: bool) -> Vec<u8> {
    let coil = if remove {
        coil.wrapping_add(CFG_SOL_INP_REMOVE)
    } else {
        coil
    };
    let mut builder = FrameBuilder::with_capacity(6);
    builder
        .begin(addr, SET_SOL_INP_CMD)
        .write_u8(switch)
        .write_u8(coil)
        .finish()
        .end_of_message();
    builder.into_inner()
}

/// Kicks the solenoids selected by `mask`, driving them to `value`.
pub fn build_kick(addr: u8, value: u16, mask: u16) -> Vec<u8> {
    let mut builder = FrameBuilder::with_capacity(7);
    builder
        .begin(addr, KICK_SOL_CMD)
        .write_u16_be(value)
        .write_u16_be(mask)
        .finish();
    builder.into_inner()
}

/// Replaces the on/off state of all incandescents on a board. No terminator
/// is needed for this command.
pub fn build_incand_update(addr: u8, state: u32) -> Vec<u8> {
    let mut builder = FrameBuilder::with_capacity(8);
    builder
        .begin(addr, INCAND_CMD)
        .write_u8(INCAND_SET_ON_OFF)
        .write_u32_be(state)
        .finish();
    builder.into_inner()
}

/// Stores an RGB color into color table `slot`. The board expects green first.
pub fn build_neo_color_table(addr: u8, slot: u8, rgb: [u8; 3]) -> Vec<u8> {
    let [r, g, b] = rgb;
    let mut builder = FrameBuilder::with_capacity(7);
    builder
        .begin(addr, CHNG_NEO_COLOR_TBL)
        .write_u8(slot)
        .write_bytes(&[g, r, b])
        .finish();
    builder.into_inner()
}

/// Lights `pixel` with color table `slot`.
pub fn build_neo_set(addr: u8, pixel: u8, slot: u8) -> Vec<u8> {
    let mut builder = FrameBuilder::with_capacity(5);
    builder
        .begin(addr, CHNG_NEO_CMD)
        .write_u8(pixel)
        .write_u8(NEO_CMD_ON | slot)
        .finish();
    builder.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::verify_record;

    #[test]
    fn test_inventory() {
        assert_eq!(build_inventory(), vec![0xF0, 0xFF]);
    }

    #[test]
    fn test_config_query_two_boards() {
        assert_eq!(
            build_get_config(&[0x20, 0x21]),
            vec![
                0x20, 0x0D, 0, 0, 0, 0, 0x60, 0x21, 0x0D, 0, 0, 0, 0, 0x49, 0xFF
            ]
        );
    }

    #[test]
    fn test_version_query() {
        assert_eq!(
            build_get_version(&[0x20]),
            vec![0x20, 0x02, 0, 0, 0, 0, 0x50, 0xFF]
        );
    }

    #[test]
    fn test_empty_query_is_bare_terminator() {
        assert_eq!(build_get_config(&[]), vec![0xFF]);
    }

    #[test]
    fn test_read_frames() {
        assert_eq!(
            build_read_inputs(0x21),
            vec![0x21, 0x08, 0, 0, 0, 0, 0xA4]
        );
        let matrix = build_read_matrix(0x20);
        assert_eq!(matrix.len(), MATRIX_QUERY_FRAME_LEN);
        assert!(verify_record(&matrix).is_ok());
    }

    #[test]
    fn test_configure_solenoid_layout() {
        let config = SolenoidConfig {
            flags: 0x02,
            pulse_ms: 10,
            hold: 3,
            off_factor: 2,
        };
        let frame = build_configure_solenoid(0x20, 5, &config);
        assert_eq!(frame.get(..6), Some(&[0x20, 0x14, 5, 0x02, 10, 0x23][..]));
        assert!(frame.get(..7).is_some_and(|f| verify_record(f).is_ok()));
        assert_eq!(frame.last(), Some(&0xFF));
    }

    #[test]
    fn test_solenoid_input_remove_offset() {
        let add = build_solenoid_input(0x20, 9, 5, false);
        let remove = build_solenoid_input(0x20, 9, 5, true);
        assert_eq!(add.get(..4), Some(&[0x20, 0x17, 9, 5][..]));
        assert_eq!(remove.get(3), Some(&0x85));
        assert_eq!(add.len(), 6);
        assert_eq!(remove.last(), Some(&0xFF));
    }

    #[test]
    fn test_kick_layout() {
        let frame = build_kick(0x22, 0x0020, 0x0020);
        assert_eq!(frame.get(..6), Some(&[0x22, 0x07, 0x00, 0x20, 0x00, 0x20][..]));
        assert!(verify_record(&frame).is_ok());
    }

    #[test]
    fn test_incand_update_layout() {
        let frame = build_incand_update(0x21, 0x8000_0001);
        assert_eq!(
            frame.get(..7),
            Some(&[0x21, 0x13, 0x07, 0x80, 0x00, 0x00, 0x01][..])
        );
        assert_eq!(frame.len(), 8);
        assert!(verify_record(&frame).is_ok());
    }

    #[test]
    fn test_neopixel_frames() {
        let table = build_neo_color_table(0x20, 3, [0x10, 0x20, 0x30]);
        assert_eq!(table.get(..6), Some(&[0x20, 0x11, 3, 0x20, 0x10, 0x30][..]));
        let set = build_neo_set(0x20, 7, 3);
        assert_eq!(set.get(..4), Some(&[0x20, 0x0F, 7, 0x83][..]));
        assert!(verify_record(&set).is_ok());
    }
}
