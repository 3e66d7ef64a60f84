//! Hardware rules and direct driver actions.
//!
//! A rule links a switch to a coil on the same board so the board fires the
//! coil by itself. Every rule boils down to two frames: a switch-to-coil
//! mapping (newer firmware only) and a solenoid reconfiguration.

use opp_gen2_protocol::{
    CoilSettings, build_configure_solenoid, build_kick, build_solenoid_input, hex_dump,
    hold_value, matching_switch_channel, minimum_off_factor, solenoid_config,
};
use tracing::debug;

use crate::channel::ChannelKey;
use crate::config::CoilConfig;
use crate::error::{PlatformError, PlatformResult};
use crate::platform::{OppPlatform, SwitchHandle};
use crate::ports::DriverPlatform;

/// A configured solenoid driver.
#[derive(Clone)]
pub struct DriverHandle {
    pub key: ChannelKey,
    platform: OppPlatform,
}

impl std::fmt::Debug for DriverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverHandle")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl DriverHandle {
    pub fn number(&self) -> String {
        self.key.to_string()
    }

    fn settings(&self) -> PlatformResult<CoilSettings> {
        self.platform
            .inner
            .registry
            .lock()
            .solenoid(&self.key)
            .and_then(|s| s.settings)
            .ok_or_else(|| self.unknown())
    }

    fn unknown(&self) -> PlatformError {
        PlatformError::UnknownChannel {
            kind: "coil",
            number: self.number(),
        }
    }

    fn can_be_pulsed(&self) -> bool {
        self.platform
            .inner
            .registry
            .lock()
            .solenoid(&self.key)
            .is_some_and(|s| s.can_be_pulsed)
    }

    fn kick(&self, on: bool) -> PlatformResult<()> {
        let bit = 1u16
            .checked_shl(u32::from(self.key.channel))
            .ok_or_else(|| self.unknown())?;
        let addr = self
            .platform
            .inner
            .registry
            .lock()
            .solenoid_card(&self.key)
            .map(|c| c.addr)
            .ok_or_else(|| self.unknown())?;
        let frame = build_kick(addr, if on { bit } else { 0 }, bit);
        debug!(coil = %self.key, on, frame = %hex_dump(&frame), "kick");
        self.platform.writer(&self.key.chain)?.send(frame)
    }

    /// Fires the coil for its configured pulse width.
    ///
    /// # Errors
    ///
    /// Returns an error if `pulse_ms` differs from the configured width or
    /// the chain is gone.
    pub fn pulse(&self, pulse_ms: Option<u8>) -> PlatformResult<()> {
        let settings = self.settings()?;
        if let Some(ms) = pulse_ms.filter(|&ms| ms != settings.pulse_ms) {
            return Err(PlatformError::InvalidConfiguration(format!(
                "coil {} is configured for {} ms, cannot pulse for {ms} ms",
                self.key, settings.pulse_ms
            )));
        }
        if !self.can_be_pulsed() {
            reconfigure_driver(&self.platform, &self.key, false)?;
        }
        self.kick(true)
    }

    /// Turns the coil on and keeps it at its hold strength.
    ///
    /// # Errors
    ///
    /// Returns an error if the coil has no hold value.
    pub fn enable(&self) -> PlatformResult<()> {
        let settings = self.settings()?;
        if hold_value(&settings) == 0 {
            return Err(PlatformError::InvalidConfiguration(format!(
                "coil {} cannot be enabled without a hold power",
                self.key
            )));
        }
        if self.can_be_pulsed() {
            reconfigure_driver(&self.platform, &self.key, true)?;
        }
        self.kick(true)
    }

    /// # Errors
    ///
    /// Returns an error if the chain is gone.
    pub fn disable(&self) -> PlatformResult<()> {
        self.kick(false)
    }
}

/// Sends a configure-solenoid frame reflecting the coil's settings and the
/// switches currently mapped to it.
pub(crate) fn reconfigure_driver(
    platform: &OppPlatform,
    key: &ChannelKey,
    use_hold: bool,
) -> PlatformResult<()> {
    let writer = platform.writer(&key.chain)?;
    let frame = {
        let mut registry = platform.inner.registry.lock();
        let version = registry
            .chain(&key.chain)
            .map(|c| c.firmware())
            .unwrap_or_default();
        let addr = registry
            .solenoid_card(key)
            .map(|c| c.addr)
            .ok_or_else(|| unknown_coil(key))?;
        let solenoid = registry.solenoid_mut(key).ok_or_else(|| unknown_coil(key))?;
        let settings = solenoid.settings.ok_or_else(|| unknown_coil(key))?;
        let mapped: Vec<u8> = solenoid.switches.iter().map(|s| s.channel).collect();
        let config = solenoid_config(
            &settings,
            version,
            key.channel,
            use_hold,
            solenoid.use_switch,
            &mapped,
        )?;
        solenoid.can_be_pulsed = !use_hold;
        build_configure_solenoid(addr, key.channel, &config)
    };
    debug!(coil = %key, use_hold, frame = %hex_dump(&frame), "reconfigure solenoid");
    writer.send(frame)
}

fn unknown_coil(key: &ChannelKey) -> PlatformError {
    PlatformError::UnknownChannel {
        kind: "coil",
        number: key.to_string(),
    }
}

/// Maps or unmaps a switch to a coil on the board. Firmware without switch
/// mapping has no such command, so nothing is sent.
fn send_switch_coil_mapping(
    platform: &OppPlatform,
    switch: &ChannelKey,
    coil: &ChannelKey,
    remove: bool,
) -> PlatformResult<()> {
    let (supported, addr) = {
        let registry = platform.inner.registry.lock();
        let supported = registry
            .chain(&coil.chain)
            .is_some_and(|c| c.firmware().supports_switch_mapping());
        let addr = registry
            .solenoid_card(coil)
            .map(|c| c.addr)
            .ok_or_else(|| unknown_coil(coil))?;
        (supported, addr)
    };
    if !supported {
        return Ok(());
    }
    let frame = build_solenoid_input(addr, switch.channel, coil.channel, remove);
    debug!(%switch, %coil, remove, frame = %hex_dump(&frame), "switch mapping");
    platform.writer(&coil.chain)?.send(frame)
}

/// Checks that a rule can link `switch` to `coil` in hardware.
pub(crate) fn verify_coil_and_switch_fit(
    platform: &OppPlatform,
    switch: &SwitchHandle,
    coil: &DriverHandle,
) -> PlatformResult<()> {
    if switch.invert {
        return Err(PlatformError::InvalidConfiguration(format!(
            "inverted switch {} cannot drive a hardware rule",
            switch.key
        )));
    }
    let mismatch = |reason| PlatformError::SwitchCoilMismatch {
        switch: switch.key.to_string(),
        driver: coil.key.to_string(),
        reason,
    };
    if !switch.key.same_card(&coil.key) {
        return Err(mismatch("switch and coil are on different boards"));
    }
    let mapping = platform
        .inner
        .registry
        .lock()
        .chain(&coil.key.chain)
        .is_some_and(|c| c.firmware().supports_switch_mapping());
    if !mapping && matching_switch_channel(coil.key.channel) != Some(switch.key.channel) {
        return Err(mismatch("firmware only supports the coil's wired switch"));
    }
    Ok(())
}

/// Links `switch` to `coil` and reconfigures the coil.
fn write_hw_rule(
    platform: &OppPlatform,
    switch: &SwitchHandle,
    coil: &DriverHandle,
    use_hold: bool,
) -> PlatformResult<()> {
    verify_coil_and_switch_fit(platform, switch, coil)?;
    {
        let mut registry = platform.inner.registry.lock();
        let solenoid = registry
            .solenoid_mut(&coil.key)
            .ok_or_else(|| unknown_coil(&coil.key))?;
        if !solenoid.switches.contains(&switch.key) {
            solenoid.switches.push(switch.key.clone());
        }
        solenoid.use_switch = true;
    }
    send_switch_coil_mapping(platform, &switch.key, &coil.key, false)?;
    reconfigure_driver(platform, &coil.key, use_hold)
}

impl DriverPlatform for OppPlatform {
    fn configure_driver(&self, config: &CoilConfig) -> PlatformResult<DriverHandle> {
        let key = self.resolve("coil", &config.number)?;
        let settings = config.settings(self.inner.config.default_pulse_ms);
        minimum_off_factor(&settings)?;
        {
            let mut registry = self.inner.registry.lock();
            let solenoid = registry
                .solenoid_mut(&key)
                .ok_or_else(|| PlatformError::UnknownChannel {
                    kind: "coil",
                    number: config.number.clone(),
                })?;
            solenoid.settings = Some(settings);
        }
        debug!(
            coil = %key,
            pulse_ms = settings.pulse_ms,
            hold = hold_value(&settings),
            "configure driver"
        );
        reconfigure_driver(self, &key, hold_value(&settings) != 0)?;
        Ok(DriverHandle {
            key,
            platform: self.clone(),
        })
    }

    fn set_pulse_on_hit_rule(&self, switch: &SwitchHandle, coil: &DriverHandle) -> PlatformResult<()> {
        write_hw_rule(self, switch, coil, false)
    }

    fn set_pulse_on_hit_and_release_rule(
        &self,
        switch: &SwitchHandle,
        coil: &DriverHandle,
    ) -> PlatformResult<()> {
        write_hw_rule(self, switch, coil, false)
    }

    fn set_pulse_on_hit_and_enable_and_release_rule(
        &self,
        switch: &SwitchHandle,
        coil: &DriverHandle,
    ) -> PlatformResult<()> {
        if hold_value(&coil.settings()?) == 0 {
            return Err(PlatformError::InvalidConfiguration(format!(
                "coil {} needs a hold power for an enable rule",
                coil.key
            )));
        }
        write_hw_rule(self, switch, coil, true)
    }

    fn set_pulse_on_hit_and_enable_and_release_and_disable_rule(
        &self,
        _enable_switch: &SwitchHandle,
        _disable_switch: &SwitchHandle,
        _coil: &DriverHandle,
    ) -> PlatformResult<()> {
        Err(PlatformError::Unsupported(
            "pulse on hit and enable and release and disable",
        ))
    }

    fn clear_hw_rule(&self, switch: &SwitchHandle, coil: &DriverHandle) -> PlatformResult<()> {
        let (was_mapped, unmapped) = {
            let mut registry = self.inner.registry.lock();
            let solenoid = registry
                .solenoid_mut(&coil.key)
                .ok_or_else(|| unknown_coil(&coil.key))?;
            let was_mapped = solenoid.switches.contains(&switch.key);
            solenoid.switches.retain(|s| *s != switch.key);
            if solenoid.switches.is_empty() {
                solenoid.use_switch = false;
            }
            (was_mapped, solenoid.switches.is_empty())
        };
        if was_mapped {
            send_switch_coil_mapping(self, &switch.key, &coil.key, true)?;
        }
        if unmapped {
            reconfigure_driver(self, &coil.key, false)?;
        }
        Ok(())
    }
}
