//! Wing types and the per-board channel masks they imply.
//!
//! A Gen2 board has four wing slots of eight pins each. The wing type decides
//! which bits of the board's 32-bit input and incandescent words, and which
//! of its 16 solenoid bits, are populated.

use crate::commands::WINGS_PER_BOARD;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WingType {
    Solenoid,
    Input,
    Incandescent,
    MatrixOut,
    MatrixIn,
    Neopixel,
    HighSideIncandescent,
    #[default]
    Empty,
}

impl WingType {
    pub fn from_u8(val: u8) -> Self {
        match val {
            1 => Self::Solenoid,
            2 => Self::Input,
            3 => Self::Incandescent,
            4 => Self::MatrixOut,
            5 => Self::MatrixIn,
            6 => Self::Neopixel,
            7 => Self::HighSideIncandescent,
            _ => Self::Empty,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Solenoid => 1,
            Self::Input => 2,
            Self::Incandescent => 3,
            Self::MatrixOut => 4,
            Self::MatrixIn => 5,
            Self::Neopixel => 6,
            Self::HighSideIncandescent => 7,
            Self::Empty => 0,
        }
    }
}

/// Channel masks derived from a board's four wing types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoardLayout {
    pub solenoid_mask: u32,
    pub input_mask: u32,
    pub incand_mask: u32,
    pub has_matrix: bool,
    pub has_neopixel: bool,
}

impl BoardLayout {
    pub fn from_wings(wings: &[WingType; WINGS_PER_BOARD]) -> Self {
        let mut layout = Self::default();
        for (index, wing) in wings.iter().enumerate() {
            let nibble_shift = 4 * index as u32;
            let byte_shift = 8 * index as u32;
            match wing {
                WingType::Solenoid => {
                    layout.solenoid_mask |= 0x0F << nibble_shift;
                    // Solenoid wings carry one switch per coil.
                    layout.input_mask |= 0x0F << byte_shift;
                }
                WingType::Input => layout.input_mask |= 0xFF << byte_shift,
                WingType::Incandescent | WingType::HighSideIncandescent => {
                    layout.incand_mask |= 0xFF << byte_shift;
                }
                WingType::MatrixOut => layout.has_matrix = true,
                WingType::Neopixel => layout.has_neopixel = true,
                WingType::MatrixIn | WingType::Empty => {}
            }
        }
        layout
    }

    pub fn has_solenoids(&self) -> bool {
        self.solenoid_mask != 0
    }

    pub fn has_inputs(&self) -> bool {
        self.input_mask != 0
    }

    pub fn has_incandescents(&self) -> bool {
        self.incand_mask != 0
    }
}
