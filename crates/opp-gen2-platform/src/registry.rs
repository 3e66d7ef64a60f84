//! Owned registry of chains and cards.
//!
//! Cards live in per-kind tables and are found through index maps keyed by
//! [`CardKey`]. The registry is plain data; the platform wraps it in a mutex
//! and never holds that lock across an await point.

use std::collections::{BTreeMap, HashMap};

use opp_gen2_protocol::{
    BoardLayout, ConfigRecord, FirmwareVersion, VersionRecord, WingType, build_read_inputs,
    build_read_matrix, card_number, commands::EOM_CMD, commands::WINGS_PER_BOARD, hex_dump,
};
use tracing::{debug, info};

use crate::cards::{IncandCard, InputCard, MatrixCard, NeopixelCard, Solenoid, SolenoidCard};
use crate::channel::{CardKey, ChannelKey};
use crate::error::{PlatformError, PlatformResult};

/// What the host knows about one board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardInfo {
    pub addr: u8,
    pub wings: [WingType; WINGS_PER_BOARD],
    pub version: Option<FirmwareVersion>,
}

impl BoardInfo {
    pub fn card(&self) -> u8 {
        card_number(self.addr)
    }
}

/// Per-chain state built during the handshake.
#[derive(Debug, Clone, Default)]
pub struct ChainState {
    pub id: String,
    pub boards: Vec<BoardInfo>,
    pub min_version: Option<FirmwareVersion>,
    /// Composite input read sent every poll cycle. Empty when the chain has
    /// no switch-bearing cards.
    pub read_input_msg: Vec<u8>,
    /// Number of input and matrix cards answering the composite read.
    pub switch_cards: usize,
    pub ready: bool,
}

impl ChainState {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    /// Firmware version used for version-gated behavior.
    pub fn firmware(&self) -> FirmwareVersion {
        self.min_version.unwrap_or_default()
    }
}

/// Card counts by kind, for logs and tooling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CardCounts {
    pub solenoid: usize,
    pub input: usize,
    pub matrix: usize,
    pub incand: usize,
    pub neopixel: usize,
}

#[derive(Debug, Default)]
pub struct Registry {
    pub(crate) chains: BTreeMap<String, ChainState>,
    pub(crate) solenoid_cards: Vec<SolenoidCard>,
    pub(crate) input_cards: Vec<InputCard>,
    pub(crate) matrix_cards: Vec<MatrixCard>,
    pub(crate) incand_cards: Vec<IncandCard>,
    pub(crate) neopixel_cards: Vec<NeopixelCard>,
    solenoid_index: HashMap<CardKey, usize>,
    input_index: HashMap<CardKey, usize>,
    matrix_index: HashMap<CardKey, usize>,
    incand_index: HashMap<CardKey, usize>,
    neopixel_index: HashMap<CardKey, usize>,
    pub(crate) bad_crc: u64,
}

fn card_key(chain: &str, addr: u8) -> CardKey {
    CardKey {
        chain: chain.to_string(),
        card: card_number(addr),
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain is already known.
    pub fn begin_chain(&mut self, chain: &str) -> PlatformResult<()> {
        if self.chains.contains_key(chain) {
            return Err(PlatformError::AlreadyConnected(chain.to_string()));
        }
        self.chains.insert(chain.to_string(), ChainState::new(chain));
        Ok(())
    }

    /// Drops a chain and every card on it.
    pub fn forget_chain(&mut self, chain: &str) {
        self.chains.remove(chain);
        self.solenoid_cards.retain(|c| c.chain != chain);
        self.input_cards.retain(|c| c.chain != chain);
        self.matrix_cards.retain(|c| c.chain != chain);
        self.incand_cards.retain(|c| c.chain != chain);
        self.neopixel_cards.retain(|c| c.chain != chain);
        self.rebuild_indexes();
    }

    fn rebuild_indexes(&mut self) {
        self.solenoid_index = index(&self.solenoid_cards, |c| card_key(&c.chain, c.addr));
        self.input_index = index(&self.input_cards, |c| card_key(&c.chain, c.addr));
        self.matrix_index = index(&self.matrix_cards, |c| card_key(&c.chain, c.addr));
        self.incand_index = index(&self.incand_cards, |c| card_key(&c.chain, c.addr));
        self.neopixel_index = index(&self.neopixel_cards, |c| card_key(&c.chain, c.addr));
    }

    pub fn chain(&self, chain: &str) -> Option<&ChainState> {
        self.chains.get(chain)
    }

    pub(crate) fn chain_mut(&mut self, chain: &str) -> PlatformResult<&mut ChainState> {
        self.chains
            .get_mut(chain)
            .ok_or_else(|| PlatformError::NotConnected(chain.to_string()))
    }

    pub fn chain_ids(&self) -> Vec<String> {
        self.chains.keys().cloned().collect()
    }

    pub fn ready_chain_ids(&self) -> Vec<String> {
        self.chains
            .values()
            .filter(|c| c.ready)
            .map(|c| c.id.clone())
            .collect()
    }

    pub fn bad_crc_count(&self) -> u64 {
        self.bad_crc
    }

    pub fn card_counts(&self, chain: &str) -> CardCounts {
        CardCounts {
            solenoid: self.solenoid_cards.iter().filter(|c| c.chain == chain).count(),
            input: self.input_cards.iter().filter(|c| c.chain == chain).count(),
            matrix: self.matrix_cards.iter().filter(|c| c.chain == chain).count(),
            incand: self.incand_cards.iter().filter(|c| c.chain == chain).count(),
            neopixel: self.neopixel_cards.iter().filter(|c| c.chain == chain).count(),
        }
    }

    /// Records the card addresses found by the inventory.
    pub fn record_inventory(&mut self, chain: &str, addrs: &[u8]) -> PlatformResult<()> {
        let state = self.chain_mut(chain)?;
        state.boards = addrs
            .iter()
            .map(|&addr| BoardInfo {
                addr,
                wings: [WingType::Empty; WINGS_PER_BOARD],
                version: None,
            })
            .collect();
        info!(chain, boards = addrs.len(), "inventory complete");
        Ok(())
    }

    /// Creates the cards a board's wings imply and extends the chain's
    /// composite input read.
    pub fn register_board(&mut self, chain: &str, record: &ConfigRecord) -> PlatformResult<()> {
        let layout = BoardLayout::from_wings(&record.wings);
        let key = card_key(chain, record.addr);

        let state = self.chain_mut(chain)?;
        match state.boards.iter_mut().find(|b| b.addr == record.addr) {
            Some(board) => board.wings = record.wings,
            None => state.boards.push(BoardInfo {
                addr: record.addr,
                wings: record.wings,
                version: None,
            }),
        }

        let mut read_frames = Vec::new();
        if layout.has_inputs() && !self.input_index.contains_key(&key) {
            read_frames.extend(build_read_inputs(record.addr));
            self.input_index.insert(key.clone(), self.input_cards.len());
            self.input_cards
                .push(InputCard::new(chain, record.addr, layout.input_mask));
        }
        if layout.has_matrix && !self.matrix_index.contains_key(&key) {
            read_frames.extend(build_read_matrix(record.addr));
            self.matrix_index.insert(key.clone(), self.matrix_cards.len());
            self.matrix_cards.push(MatrixCard::new(chain, record.addr));
        }
        if layout.has_solenoids() && !self.solenoid_index.contains_key(&key) {
            self.solenoid_index
                .insert(key.clone(), self.solenoid_cards.len());
            self.solenoid_cards
                .push(SolenoidCard::new(chain, record.addr, layout.solenoid_mask));
        }
        if layout.has_incandescents() && !self.incand_index.contains_key(&key) {
            self.incand_index.insert(key.clone(), self.incand_cards.len());
            self.incand_cards
                .push(IncandCard::new(chain, record.addr, layout.incand_mask));
        }
        if layout.has_neopixel && !self.neopixel_index.contains_key(&key) {
            self.neopixel_index.insert(key, self.neopixel_cards.len());
            self.neopixel_cards.push(NeopixelCard::new(chain, record.addr));
        }

        if !read_frames.is_empty() {
            let switch_cards = usize::from(layout.has_inputs()) + usize::from(layout.has_matrix);
            let state = self.chain_mut(chain)?;
            if state.read_input_msg.last() == Some(&EOM_CMD) {
                state.read_input_msg.pop();
            }
            state.read_input_msg.extend(read_frames);
            state.read_input_msg.push(EOM_CMD);
            state.switch_cards += switch_cards;
        }

        debug!(
            chain,
            addr = record.addr,
            wings = ?record.wings,
            ?layout,
            "registered board"
        );
        Ok(())
    }

    /// Records a board's firmware version and updates the chain minimum.
    ///
    /// # Errors
    ///
    /// Returns an error if the board reports the pre-release placeholder.
    pub fn record_version(&mut self, chain: &str, record: &VersionRecord) -> PlatformResult<()> {
        if record.version.is_pre_release() {
            return Err(PlatformError::PreReleaseFirmware {
                chain: chain.to_string(),
                addr: record.addr,
                version: record.version,
            });
        }
        let state = self.chain_mut(chain)?;
        if let Some(board) = state.boards.iter_mut().find(|b| b.addr == record.addr) {
            board.version = Some(record.version);
        }
        state.min_version = Some(
            state
                .min_version
                .map_or(record.version, |v| v.min(record.version)),
        );
        info!(
            chain,
            addr = record.addr,
            version = %record.version,
            "board firmware"
        );
        Ok(())
    }

    pub(crate) fn input_card_mut(&mut self, chain: &str, addr: u8) -> Option<&mut InputCard> {
        let index = *self.input_index.get(&card_key(chain, addr))?;
        self.input_cards.get_mut(index)
    }

    pub(crate) fn matrix_card_mut(&mut self, chain: &str, addr: u8) -> Option<&mut MatrixCard> {
        let index = *self.matrix_index.get(&card_key(chain, addr))?;
        self.matrix_cards.get_mut(index)
    }

    pub(crate) fn solenoid_card(&self, key: &ChannelKey) -> Option<&SolenoidCard> {
        let index = *self.solenoid_index.get(&key.card_key())?;
        self.solenoid_cards.get(index)
    }

    pub(crate) fn solenoid(&self, key: &ChannelKey) -> Option<&Solenoid> {
        self.solenoid_card(key)?.solenoids.get(&key.channel)
    }

    pub(crate) fn solenoid_mut(&mut self, key: &ChannelKey) -> Option<&mut Solenoid> {
        let index = *self.solenoid_index.get(&key.card_key())?;
        self.solenoid_cards
            .get_mut(index)?
            .solenoids
            .get_mut(&key.channel)
    }

    pub(crate) fn incand_card_mut(&mut self, key: &CardKey) -> Option<&mut IncandCard> {
        let index = *self.incand_index.get(key)?;
        self.incand_cards.get_mut(index)
    }

    pub(crate) fn neopixel_card_mut(&mut self, key: &CardKey) -> Option<&mut NeopixelCard> {
        let index = *self.neopixel_index.get(key)?;
        self.neopixel_cards.get_mut(index)
    }

    /// Whether `key` names a populated switch.
    pub fn has_switch(&self, key: &ChannelKey) -> bool {
        let card = key.card_key();
        let digital = self
            .input_index
            .get(&card)
            .and_then(|&i| self.input_cards.get(i))
            .is_some_and(|c| {
                1u32.checked_shl(u32::from(key.channel))
                    .is_some_and(|bit| c.mask & bit != 0)
            });
        let matrix = self.matrix_index.contains_key(&card) && (32..96).contains(&key.channel);
        digital || matrix
    }

    /// Whether `key` names a populated incandescent.
    pub fn has_incand(&self, key: &ChannelKey) -> bool {
        self.incand_index
            .get(&key.card_key())
            .and_then(|&i| self.incand_cards.get(i))
            .is_some_and(|c| {
                1u32.checked_shl(u32::from(key.channel))
                    .is_some_and(|bit| c.mask & bit != 0)
            })
    }

    /// Logical state of every switch, keyed by identifier. 1 means active.
    pub fn hw_switch_states(&self) -> BTreeMap<String, u8> {
        let digital = self.input_cards.iter().flat_map(|card| {
            card.snapshot()
                .map(move |(channel, active)| (ChannelKey::new(&card.chain, card.card(), channel), active))
        });
        let matrix = self.matrix_cards.iter().flat_map(|card| {
            card.snapshot()
                .map(move |(channel, active)| (ChannelKey::new(&card.chain, card.card(), channel), active))
        });
        digital
            .chain(matrix)
            .map(|(key, active)| (key.to_string(), u8::from(active)))
            .collect()
    }

    /// Logs the composite input read of a chain.
    pub(crate) fn log_read_message(&self, chain: &str) {
        if let Some(state) = self.chains.get(chain) {
            debug!(chain, msg = %hex_dump(&state.read_input_msg), "composite input read");
        }
    }
}

fn index<T>(cards: &[T], key: impl Fn(&T) -> CardKey) -> HashMap<CardKey, usize> {
    cards
        .iter()
        .enumerate()
        .map(|(i, card)| (key(card), i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(addr: u8, wings: [u8; 4]) -> ConfigRecord {
        ConfigRecord {
            addr,
            wings: wings.map(WingType::from_u8),
        }
    }

    #[test]
    fn test_register_solenoid_and_incand_boards() -> PlatformResult<()> {
        let mut registry = Registry::new();
        registry.begin_chain("c")?;
        registry.record_inventory("c", &[0x20, 0x21])?;
        registry.register_board("c", &config(0x20, [1, 0, 0, 0]))?;
        registry.register_board("c", &config(0x21, [3, 0, 0, 0]))?;

        let counts = registry.card_counts("c");
        assert_eq!(counts.solenoid, 1);
        assert_eq!(counts.input, 1);
        assert_eq!(counts.incand, 1);
        assert_eq!(counts.matrix, 0);

        let chain = registry.chain("c").ok_or(PlatformError::NotConnected("c".into()))?;
        assert_eq!(chain.read_input_msg, {
            let mut msg = build_read_inputs(0x20);
            msg.push(EOM_CMD);
            msg
        });
        assert_eq!(chain.switch_cards, 1);
        assert!(registry.has_switch(&ChannelKey::new("c", 0, 3)));
        assert!(!registry.has_switch(&ChannelKey::new("c", 0, 4)));
        assert!(registry.has_incand(&ChannelKey::new("c", 1, 7)));
        Ok(())
    }

    #[test]
    fn test_composite_read_keeps_single_terminator() -> PlatformResult<()> {
        let mut registry = Registry::new();
        registry.begin_chain("c")?;
        registry.register_board("c", &config(0x20, [2, 0, 0, 0]))?;
        registry.register_board("c", &config(0x21, [4, 5, 0, 0]))?;
        let chain = registry.chain("c").ok_or(PlatformError::NotConnected("c".into()))?;
        assert_eq!(chain.read_input_msg.len(), 7 + 11 + 1);
        assert_eq!(
            chain.read_input_msg.iter().filter(|&&b| b == EOM_CMD).count(),
            1
        );
        assert_eq!(chain.switch_cards, 2);
        Ok(())
    }

    #[test]
    fn test_version_minimum_and_placeholder() -> PlatformResult<()> {
        let mut registry = Registry::new();
        registry.begin_chain("c")?;
        registry.record_inventory("c", &[0x20, 0x21])?;
        registry.record_version(
            "c",
            &VersionRecord {
                addr: 0x20,
                version: FirmwareVersion(0x0002_0000),
            },
        )?;
        registry.record_version(
            "c",
            &VersionRecord {
                addr: 0x21,
                version: FirmwareVersion(0x0001_0000),
            },
        )?;
        assert_eq!(
            registry.chain("c").and_then(|c| c.min_version),
            Some(FirmwareVersion(0x0001_0000))
        );
        assert!(matches!(
            registry.record_version(
                "c",
                &VersionRecord {
                    addr: 0x20,
                    version: FirmwareVersion::PRE_RELEASE,
                },
            ),
            Err(PlatformError::PreReleaseFirmware { addr: 0x20, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_duplicate_chain_and_forget() -> PlatformResult<()> {
        let mut registry = Registry::new();
        registry.begin_chain("c")?;
        assert!(registry.begin_chain("c").is_err());
        registry.register_board("c", &config(0x20, [1, 2, 0, 0]))?;
        registry.forget_chain("c");
        assert!(registry.chain("c").is_none());
        assert_eq!(registry.card_counts("c"), CardCounts::default());
        assert!(!registry.has_switch(&ChannelKey::new("c", 0, 0)));
        Ok(())
    }

    #[test]
    fn test_switch_snapshot() -> PlatformResult<()> {
        let mut registry = Registry::new();
        registry.begin_chain("c")?;
        registry.register_board("c", &config(0x20, [1, 0, 0, 0]))?;
        if let Some(card) = registry.input_card_mut("c", 0x20) {
            card.old_state = 0xFFFF_FFFD;
        }
        let states = registry.hw_switch_states();
        assert_eq!(states.len(), 4);
        assert_eq!(states.get("c-0-1"), Some(&1));
        assert_eq!(states.get("c-0-0"), Some(&0));
        Ok(())
    }
}
