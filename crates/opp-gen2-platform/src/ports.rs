//! Host-facing capability traits.
//!
//! The platform is one object implementing four narrow capabilities. A host
//! can depend on just the ones it uses.

use std::collections::BTreeMap;

use crate::config::{CoilConfig, LedConfig, MatrixLightConfig, SwitchConfig};
use crate::error::PlatformResult;
use crate::lights::{LedHandle, MatrixLightHandle};
use crate::platform::{OppPlatform, SwitchHandle};
use crate::rules::DriverHandle;

/// Receives switch edges from the poll path.
///
/// Called with no platform lock held, so implementations may call back into
/// the platform.
pub trait SwitchStateTracker: Send + Sync {
    /// `state` is 1 for active, 0 for inactive.
    fn process_switch_by_num(&self, number: &str, state: u8, platform: &OppPlatform);
}

pub trait SwitchPlatform {
    /// # Errors
    ///
    /// Returns an error if the number does not name a populated switch.
    fn configure_switch(&self, config: &SwitchConfig) -> PlatformResult<SwitchHandle>;

    /// Current logical state of every switch, 1 meaning active.
    fn get_hw_switch_states(&self) -> BTreeMap<String, u8>;
}

pub trait DriverPlatform {
    /// # Errors
    ///
    /// Returns an error if the number does not name a solenoid or the coil
    /// settings are invalid.
    fn configure_driver(&self, config: &CoilConfig) -> PlatformResult<DriverHandle>;

    /// Pulses `coil` whenever `switch` closes.
    ///
    /// # Errors
    ///
    /// Returns an error if the switch is inverted or does not fit the coil.
    fn set_pulse_on_hit_rule(&self, switch: &SwitchHandle, coil: &DriverHandle) -> PlatformResult<()>;

    /// Identical to [`set_pulse_on_hit_rule`](Self::set_pulse_on_hit_rule):
    /// a board always completes a pulse once started.
    ///
    /// # Errors
    ///
    /// Returns an error if the switch is inverted or does not fit the coil.
    fn set_pulse_on_hit_and_release_rule(
        &self,
        switch: &SwitchHandle,
        coil: &DriverHandle,
    ) -> PlatformResult<()>;

    /// Pulses then holds `coil` while `switch` stays closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the coil has no hold value, or the switch is
    /// inverted or does not fit the coil.
    fn set_pulse_on_hit_and_enable_and_release_rule(
        &self,
        switch: &SwitchHandle,
        coil: &DriverHandle,
    ) -> PlatformResult<()>;

    /// Not available on this hardware.
    ///
    /// # Errors
    ///
    /// Always returns [`PlatformError::Unsupported`](crate::PlatformError::Unsupported).
    fn set_pulse_on_hit_and_enable_and_release_and_disable_rule(
        &self,
        enable_switch: &SwitchHandle,
        disable_switch: &SwitchHandle,
        coil: &DriverHandle,
    ) -> PlatformResult<()>;

    /// Unlinks `switch` from `coil`.
    ///
    /// # Errors
    ///
    /// Returns an error if the coil cannot be reconfigured.
    fn clear_hw_rule(&self, switch: &SwitchHandle, coil: &DriverHandle) -> PlatformResult<()>;
}

pub trait LedPlatform {
    /// # Errors
    ///
    /// Returns an error for more than three color channels or an unknown
    /// neopixel.
    fn configure_led(&self, config: &LedConfig, channels: u8) -> PlatformResult<LedHandle>;
}

pub trait MatrixLightPlatform {
    /// Starts the lamp update task on first use.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown incandescent or when called outside a
    /// tokio runtime.
    fn configure_matrixlight(&self, config: &MatrixLightConfig) -> PlatformResult<MatrixLightHandle>;
}
