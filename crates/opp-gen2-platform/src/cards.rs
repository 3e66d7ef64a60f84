//! Card objects created from board configuration records.
//!
//! A card is the slice of one board that serves one purpose. A board with a
//! solenoid wing and an input wing yields a solenoid card and an input card
//! sharing the same address.

use std::collections::BTreeMap;

use opp_gen2_protocol::commands::NUM_COLOR_TBL;
use opp_gen2_protocol::{
    CoilSettings, InputTransition, MATRIX_CHANNEL_BASE, card_number, diff_inputs, diff_matrix,
    is_active,
};

use crate::channel::ChannelKey;

/// One solenoid channel and the rules attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solenoid {
    /// Settings from the last `configure_driver`, if any.
    pub settings: Option<CoilSettings>,
    /// Switches currently linked to this coil by hardware rules.
    pub switches: Vec<ChannelKey>,
    pub can_be_pulsed: bool,
    pub use_switch: bool,
}

impl Default for Solenoid {
    fn default() -> Self {
        Self {
            settings: None,
            switches: Vec::new(),
            can_be_pulsed: true,
            use_switch: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SolenoidCard {
    pub chain: String,
    pub addr: u8,
    pub mask: u32,
    pub solenoids: BTreeMap<u8, Solenoid>,
}

impl SolenoidCard {
    pub fn new(chain: &str, addr: u8, mask: u32) -> Self {
        let solenoids = (0u8..32)
            .filter(|bit| mask & (1 << bit) != 0)
            .map(|bit| (bit, Solenoid::default()))
            .collect();
        Self {
            chain: chain.to_string(),
            addr,
            mask,
            solenoids,
        }
    }

    pub fn card(&self) -> u8 {
        card_number(self.addr)
    }
}

/// Digital inputs of one board.
#[derive(Debug, Clone)]
pub struct InputCard {
    pub chain: String,
    pub addr: u8,
    pub mask: u32,
    /// Last raw word reported by the board (active-low).
    pub old_state: u32,
}

impl InputCard {
    pub fn new(chain: &str, addr: u8, mask: u32) -> Self {
        Self {
            chain: chain.to_string(),
            addr,
            mask,
            old_state: u32::MAX,
        }
    }

    pub fn card(&self) -> u8 {
        card_number(self.addr)
    }

    /// Records `state` as the new baseline and returns what changed.
    pub fn apply(&mut self, state: u32) -> Vec<InputTransition> {
        let transitions = diff_inputs(self.old_state, state).collect();
        self.old_state = state;
        transitions
    }

    /// Logical state of every populated channel.
    pub fn snapshot(&self) -> impl Iterator<Item = (u8, bool)> + '_ {
        (0u8..32)
            .filter(|bit| self.mask & (1 << bit) != 0)
            .map(|bit| (bit, is_active(self.old_state, bit)))
    }
}

/// Matrix inputs of one board, two 32-bit banks.
#[derive(Debug, Clone)]
pub struct MatrixCard {
    pub chain: String,
    pub addr: u8,
    pub old_state: [u32; 2],
}

impl MatrixCard {
    pub fn new(chain: &str, addr: u8) -> Self {
        Self {
            chain: chain.to_string(),
            addr,
            old_state: [u32::MAX; 2],
        }
    }

    pub fn card(&self) -> u8 {
        card_number(self.addr)
    }

    pub fn apply(&mut self, banks: [u32; 2]) -> Vec<InputTransition> {
        let transitions = diff_matrix(self.old_state, banks).collect();
        self.old_state = banks;
        transitions
    }

    pub fn snapshot(&self) -> impl Iterator<Item = (u8, bool)> + '_ {
        let [bank0, bank1] = self.old_state;
        (0u8..32)
            .map(move |bit| (MATRIX_CHANNEL_BASE + bit, is_active(bank0, bit)))
            .chain((0u8..32).map(move |bit| (MATRIX_CHANNEL_BASE + 32 + bit, is_active(bank1, bit))))
    }
}

/// Incandescent outputs of one board.
///
/// `new_state` is what the host wants, `old_state` what the board was last
/// sent. Bits are active-high.
#[derive(Debug, Clone)]
pub struct IncandCard {
    pub chain: String,
    pub addr: u8,
    pub mask: u32,
    pub old_state: u32,
    pub new_state: u32,
}

impl IncandCard {
    pub fn new(chain: &str, addr: u8, mask: u32) -> Self {
        Self {
            chain: chain.to_string(),
            addr,
            mask,
            old_state: 0,
            new_state: 0,
        }
    }

    pub fn card(&self) -> u8 {
        card_number(self.addr)
    }

    pub fn set(&mut self, channel: u8, on: bool) {
        let Some(bit) = 1u32.checked_shl(u32::from(channel)) else {
            return;
        };
        if on {
            self.new_state |= bit;
        } else {
            self.new_state &= !bit;
        }
    }

    /// The state to transmit, when it differs from what the board has.
    pub fn pending(&self) -> Option<u32> {
        (self.old_state != self.new_state).then_some(self.new_state)
    }
}

/// Result of looking up a color in a neopixel card's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSlot {
    Existing(u8),
    /// Newly allocated; the table entry still has to be sent.
    Allocated(u8),
    Full,
}

/// Neopixel outputs of one board.
#[derive(Debug, Clone)]
pub struct NeopixelCard {
    pub chain: String,
    pub addr: u8,
    pub pixels: Vec<u8>,
    pub color_table: Vec<[u8; 3]>,
}

impl NeopixelCard {
    pub fn new(chain: &str, addr: u8) -> Self {
        Self {
            chain: chain.to_string(),
            addr,
            pixels: Vec::new(),
            color_table: Vec::with_capacity(NUM_COLOR_TBL),
        }
    }

    pub fn card(&self) -> u8 {
        card_number(self.addr)
    }

    pub fn add_pixel(&mut self, pixel: u8) {
        if !self.pixels.contains(&pixel) {
            self.pixels.push(pixel);
        }
    }

    pub fn color_slot(&mut self, rgb: [u8; 3]) -> ColorSlot {
        if let Some(index) = self.color_table.iter().position(|c| *c == rgb) {
            return u8::try_from(index).map_or(ColorSlot::Full, ColorSlot::Existing);
        }
        if self.color_table.len() >= NUM_COLOR_TBL {
            return ColorSlot::Full;
        }
        let slot = u8::try_from(self.color_table.len()).map_or(ColorSlot::Full, ColorSlot::Allocated);
        if matches!(slot, ColorSlot::Allocated(_)) {
            self.color_table.push(rgb);
        }
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solenoid_card_channels_follow_mask() {
        let card = SolenoidCard::new("c", 0x20, 0x00F0);
        assert_eq!(card.solenoids.keys().copied().collect::<Vec<_>>(), vec![4, 5, 6, 7]);
        assert!(card.solenoids.values().all(|s| s.can_be_pulsed));
    }

    #[test]
    fn test_input_card_apply_and_snapshot() {
        let mut card = InputCard::new("c", 0x21, 0x0F);
        let transitions = card.apply(0xFFFF_FFFE);
        assert_eq!(transitions.len(), 1);
        assert_eq!(card.card(), 1);
        let snapshot: Vec<_> = card.snapshot().collect();
        assert_eq!(snapshot, vec![(0, true), (1, false), (2, false), (3, false)]);
        assert!(card.apply(0xFFFF_FFFE).is_empty());
    }

    #[test]
    fn test_matrix_snapshot_covers_both_banks() {
        let mut card = MatrixCard::new("c", 0x20);
        card.apply([u32::MAX, 0xFFFF_FFFE]);
        let snapshot: Vec<_> = card.snapshot().collect();
        assert_eq!(snapshot.len(), 64);
        assert_eq!(snapshot.first(), Some(&(32, false)));
        assert!(snapshot.contains(&(64, true)));
    }

    #[test]
    fn test_incand_pending() {
        let mut card = IncandCard::new("c", 0x20, 0xFF);
        assert_eq!(card.pending(), None);
        card.set(3, true);
        assert_eq!(card.pending(), Some(0x08));
        card.old_state = 0x08;
        assert_eq!(card.pending(), None);
        card.set(3, false);
        assert_eq!(card.pending(), Some(0));
        card.set(40, true);
        assert_eq!(card.new_state, 0);
    }

    #[test]
    fn test_color_table_allocation() {
        let mut card = NeopixelCard::new("c", 0x20);
        assert_eq!(card.color_slot([1, 2, 3]), ColorSlot::Allocated(0));
        assert_eq!(card.color_slot([1, 2, 3]), ColorSlot::Existing(0));
        assert_eq!(card.color_slot([3, 2, 1]), ColorSlot::Allocated(1));
        for value in 2u8..32 {
            assert_eq!(card.color_slot([value, 0, 0]), ColorSlot::Allocated(value));
        }
        assert_eq!(card.color_slot([0xFF, 0xFF, 0xFF]), ColorSlot::Full);
        assert_eq!(card.color_slot([1, 2, 3]), ColorSlot::Existing(0));
    }
}
