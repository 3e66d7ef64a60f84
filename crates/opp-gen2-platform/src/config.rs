//! Platform configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use opp_gen2_protocol::CoilSettings;
use serde::{Deserialize, Serialize};

use crate::error::{PlatformError, PlatformResult};

/// Configuration for a set of OPP chains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OppConfig {
    /// Serial ports, one per chain. The port name doubles as the chain id.
    pub ports: Vec<String>,

    /// Serial baud rate.
    ///
    /// Default: 115200.
    pub baud: u32,

    /// Input poll rate in Hz.
    ///
    /// Default: 100. Faster polling saturates the link.
    pub poll_hz: u32,

    /// Chain aliases used in channel identifiers, mapped to chain ids.
    /// See [`OppConfig::add_index_aliases`].
    pub chains: BTreeMap<String, String>,

    /// Pulse width used when a coil does not set one.
    ///
    /// Default: 10ms.
    pub default_pulse_ms: u8,

    /// Incandescent update rate in Hz.
    ///
    /// Default: 50.
    pub lamp_update_hz: u32,

    /// End-of-message probes sent before a chain is declared dead.
    ///
    /// Default: 100.
    pub probe_attempts: u32,

    /// Wait between probes in milliseconds.
    ///
    /// Default: 10ms.
    pub probe_interval_ms: u64,

    /// How long a handshake step waits for its response.
    ///
    /// Default: 1000ms.
    pub response_timeout_ms: u64,
}

impl Default for OppConfig {
    fn default() -> Self {
        Self {
            ports: Vec::new(),
            baud: 115_200,
            poll_hz: 100,
            chains: BTreeMap::new(),
            default_pulse_ms: 10,
            lamp_update_hz: 50,
            probe_attempts: 100,
            probe_interval_ms: 10,
            response_timeout_ms: 1000,
        }
    }
}

impl OppConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are out of range.
    pub fn validate(&self) -> PlatformResult<()> {
        if !(1..=1000).contains(&self.poll_hz) {
            return Err(PlatformError::InvalidConfiguration(
                "poll_hz must be between 1 and 1000".to_string(),
            ));
        }
        if !(1..=1000).contains(&self.lamp_update_hz) {
            return Err(PlatformError::InvalidConfiguration(
                "lamp_update_hz must be between 1 and 1000".to_string(),
            ));
        }
        if self.baud == 0 {
            return Err(PlatformError::InvalidConfiguration(
                "baud must be non-zero".to_string(),
            ));
        }
        if self.probe_attempts == 0 {
            return Err(PlatformError::InvalidConfiguration(
                "probe_attempts must be at least 1".to_string(),
            ));
        }
        if self.response_timeout_ms == 0 {
            return Err(PlatformError::InvalidConfiguration(
                "response_timeout_ms must be non-zero".to_string(),
            ));
        }
        if let Some((alias, _)) = self.chains.iter().find(|(alias, _)| alias.contains('-')) {
            return Err(PlatformError::InvalidConfiguration(format!(
                "chain alias {alias} may not contain '-'"
            )));
        }
        Ok(())
    }

    /// Aliases each port by its position in `ports`, so `0-1-9` names
    /// card 1 on the first port. Explicit aliases win.
    pub fn add_index_aliases(&mut self) {
        for (index, port) in self.ports.iter().enumerate() {
            self.chains
                .entry(index.to_string())
                .or_insert_with(|| port.clone());
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.poll_hz.max(1)))
    }

    pub fn lamp_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.lamp_update_hz.max(1)))
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// A solenoid driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoilConfig {
    pub number: String,
    pub pulse_ms: Option<u8>,
    /// Hold strength on the coarse 0-8 scale.
    pub hold_power: Option<u8>,
    /// Hold strength on the 0-16 scale. Takes priority over `hold_power`.
    pub hold_power16: Option<u8>,
    pub allow_enable: bool,
    pub recycle: bool,
    pub recycle_factor: Option<u8>,
}

impl CoilConfig {
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            ..Self::default()
        }
    }

    /// Settings passed to the rule encoder.
    pub fn settings(&self, default_pulse_ms: u8) -> CoilSettings {
        CoilSettings {
            pulse_ms: self
                .pulse_ms
                .filter(|&ms| ms > 0)
                .unwrap_or(default_pulse_ms),
            hold_power16: self.hold_power16,
            hold_power: self.hold_power,
            allow_enable: self.allow_enable,
            recycle: self.recycle,
            recycle_factor: self.recycle_factor,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchConfig {
    pub number: String,
    pub invert: bool,
}

impl SwitchConfig {
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            invert: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedConfig {
    pub number: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixLightConfig {
    pub number: String,
}
