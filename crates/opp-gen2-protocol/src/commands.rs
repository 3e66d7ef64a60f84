//! OPP Gen2 command bytes and message classification.
//!
//! Every addressed message starts with a Gen2 card address (`0x20..=0x3F`)
//! followed by a command byte. Two commands stand alone without an address:
//! the inventory request (`0xF0`) and the end-of-message marker (`0xFF`).

/// Mask applied to the first byte of an addressed message.
pub const GEN2_ADDR_MASK: u8 = 0xE0;
/// Value of a masked Gen2 address byte.
pub const GEN2_ADDR_MARKER: u8 = 0x20;
/// Mask applied to card identifiers inside an inventory response.
pub const CARD_ID_TYPE_MASK: u8 = 0xF0;
/// Value of a masked Gen2 card identifier.
pub const CARD_ID_GEN2_CARD: u8 = 0x20;

pub const GET_VERS_CMD: u8 = 0x02;
pub const KICK_SOL_CMD: u8 = 0x07;
pub const READ_GEN2_INP_CMD: u8 = 0x08;
pub const GET_GEN2_CFG: u8 = 0x0D;
pub const CHNG_NEO_CMD: u8 = 0x0F;
pub const CHNG_NEO_COLOR_TBL: u8 = 0x11;
pub const INCAND_CMD: u8 = 0x13;
pub const CFG_IND_SOL_CMD: u8 = 0x14;
pub const SET_SOL_INP_CMD: u8 = 0x17;
pub const READ_MATRIX_INP: u8 = 0x19;
pub const INV_CMD: u8 = 0xF0;
pub const ILLEGAL_CMD: u8 = 0xFE;
pub const EOM_CMD: u8 = 0xFF;

pub const CFG_SOL_USE_SWITCH: u8 = 0x01;
pub const CFG_SOL_AUTO_CLR: u8 = 0x02;
pub const CFG_SOL_ON_OFF: u8 = 0x04;
/// Added to the coil number of a mapping frame to remove the mapping.
pub const CFG_SOL_INP_REMOVE: u8 = 0x80;

/// Incandescent sub-command that replaces the whole on/off state.
pub const INCAND_SET_ON_OFF: u8 = 0x07;
/// Set on a neopixel color slot byte to light the pixel.
pub const NEO_CMD_ON: u8 = 0x80;
/// Size of a neopixel board's color table.
pub const NUM_COLOR_TBL: usize = 32;

pub const INPUT_RECORD_LEN: usize = 7;
pub const MATRIX_RECORD_LEN: usize = 11;
pub const CONFIG_RECORD_LEN: usize = 7;
pub const VERSION_RECORD_LEN: usize = 7;
/// Smallest record the resynchronizer will try to interpret.
pub const MIN_RECORD_LEN: usize = 7;

/// Number of wing slots on a Gen2 board.
pub const WINGS_PER_BOARD: usize = 4;

/// Returns `true` when `byte` is the first byte of an addressed message.
#[inline]
pub const fn is_gen2_address(byte: u8) -> bool {
    byte & GEN2_ADDR_MASK == GEN2_ADDR_MARKER
}

/// Returns `true` when `byte` names a Gen2 card inside an inventory response.
#[inline]
pub const fn is_gen2_card_id(byte: u8) -> bool {
    byte & CARD_ID_TYPE_MASK == CARD_ID_GEN2_CARD
}

/// Card number (position on the chain) of a Gen2 address.
#[inline]
pub const fn card_number(addr: u8) -> u8 {
    addr.wrapping_sub(CARD_ID_GEN2_CARD)
}

/// Gen2 address of the card at `card` on the chain.
#[inline]
pub const fn card_address(card: u8) -> u8 {
    card.wrapping_add(CARD_ID_GEN2_CARD)
}

/// Closed set of commands the host sends or receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    GetVersion,
    KickSolenoid,
    ReadInputs,
    GetConfig,
    NeopixelSet,
    NeopixelColorTable,
    Incandescent,
    ConfigureSolenoid,
    SetSolenoidInput,
    ReadMatrix,
    Inventory,
    Illegal,
    EndOfMessage,
}

impl Command {
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            GET_VERS_CMD => Some(Self::GetVersion),
            KICK_SOL_CMD => Some(Self::KickSolenoid),
            READ_GEN2_INP_CMD => Some(Self::ReadInputs),
            GET_GEN2_CFG => Some(Self::GetConfig),
            CHNG_NEO_CMD => Some(Self::NeopixelSet),
            CHNG_NEO_COLOR_TBL => Some(Self::NeopixelColorTable),
            INCAND_CMD => Some(Self::Incandescent),
            CFG_IND_SOL_CMD => Some(Self::ConfigureSolenoid),
            SET_SOL_INP_CMD => Some(Self::SetSolenoidInput),
            READ_MATRIX_INP => Some(Self::ReadMatrix),
            INV_CMD => Some(Self::Inventory),
            ILLEGAL_CMD => Some(Self::Illegal),
            EOM_CMD => Some(Self::EndOfMessage),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::GetVersion => GET_VERS_CMD,
            Self::KickSolenoid => KICK_SOL_CMD,
            Self::ReadInputs => READ_GEN2_INP_CMD,
            Self::GetConfig => GET_GEN2_CFG,
            Self::NeopixelSet => CHNG_NEO_CMD,
            Self::NeopixelColorTable => CHNG_NEO_COLOR_TBL,
            Self::Incandescent => INCAND_CMD,
            Self::ConfigureSolenoid => CFG_IND_SOL_CMD,
            Self::SetSolenoidInput => SET_SOL_INP_CMD,
            Self::ReadMatrix => READ_MATRIX_INP,
            Self::Inventory => INV_CMD,
            Self::Illegal => ILLEGAL_CMD,
            Self::EndOfMessage => EOM_CMD,
        }
    }

    /// Classifies an inbound message by its leading bytes.
    ///
    /// Addressed messages are classified by their second byte. A lone
    /// inventory or end-of-message byte classifies as itself. Anything
    /// else, including an addressed message with an unknown command, is
    /// [`Command::Illegal`]. An empty message is an end of message.
    pub fn classify(msg: &[u8]) -> Self {
        let Some(&first) = msg.first() else {
            return Self::EndOfMessage;
        };
        if is_gen2_address(first) {
            return msg
                .get(1)
                .and_then(|&cmd| Self::from_u8(cmd))
                .unwrap_or(Self::Illegal);
        }
        match first {
            INV_CMD => Self::Inventory,
            EOM_CMD => Self::EndOfMessage,
            _ => Self::Illegal,
        }
    }
}
