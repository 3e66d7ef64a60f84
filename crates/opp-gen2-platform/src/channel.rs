//! Channel identifiers.
//!
//! Every switch, coil and light is addressed by the chain it hangs off, the
//! card's position on that chain and the channel on the card. The string
//! form `chain-card-channel` is what the host sees.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{PlatformError, PlatformResult};

/// Chain alias assumed when an identifier omits the chain.
pub const DEFAULT_CHAIN_ALIAS: &str = "0";

/// Identifies a card on a chain.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CardKey {
    pub chain: String,
    pub card: u8,
}

/// Identifies a channel on a card.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelKey {
    pub chain: String,
    pub card: u8,
    pub channel: u8,
}

impl ChannelKey {
    pub fn new(chain: impl Into<String>, card: u8, channel: u8) -> Self {
        Self {
            chain: chain.into(),
            card,
            channel,
        }
    }

    pub fn card_key(&self) -> CardKey {
        CardKey {
            chain: self.chain.clone(),
            card: self.card,
        }
    }

    pub fn same_card(&self, other: &Self) -> bool {
        self.chain == other.chain && self.card == other.card
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.chain, self.card, self.channel)
    }
}

/// Resolves host identifiers into channel keys.
pub struct ChannelResolver<'a> {
    aliases: &'a BTreeMap<String, String>,
    chains: &'a [String],
}

impl<'a> ChannelResolver<'a> {
    /// `chains` lists the connected chain ids.
    pub fn new(aliases: &'a BTreeMap<String, String>, chains: &'a [String]) -> Self {
        Self { aliases, chains }
    }

    /// Resolves `chain-card-channel`, `card-channel` or `channel`.
    ///
    /// The chain part is looked up in the alias table first, then among the
    /// connected chain ids. An unknown chain resolves to the only connected
    /// chain when there is exactly one.
    ///
    /// # Errors
    ///
    /// Returns an error when the numbers do not parse or the chain cannot be
    /// determined.
    pub fn resolve(&self, kind: &'static str, number: &str) -> PlatformResult<ChannelKey> {
        let unknown = || PlatformError::UnknownChannel {
            kind,
            number: number.to_string(),
        };

        let mut parts = number.trim().rsplitn(3, '-');
        let channel = parts.next().ok_or_else(unknown)?;
        let card = parts.next().unwrap_or("0");
        let alias = parts.next().unwrap_or(DEFAULT_CHAIN_ALIAS);

        let channel: u8 = channel.parse().map_err(|_err| unknown())?;
        let card: u8 = card.parse().map_err(|_err| unknown())?;

        let chain = if let Some(chain) = self.aliases.get(alias) {
            chain.clone()
        } else if self.chains.iter().any(|c| c == alias) {
            alias.to_string()
        } else if let [only] = self.chains {
            only.clone()
        } else {
            return Err(PlatformError::InvalidConfiguration(format!(
                "chain {alias} in {kind} {number} is not configured"
            )));
        };

        Ok(ChannelKey {
            chain,
            card,
            channel,
        })
    }
}
