//! Solenoid rule encodings.
//!
//! Pure functions that turn a coil's settings and the chain's firmware
//! version into the bytes of a configure-solenoid frame.

use crate::commands::{CFG_SOL_AUTO_CLR, CFG_SOL_ON_OFF, CFG_SOL_USE_SWITCH};
use crate::error::{ProtocolError, ProtocolResult};
use crate::version::FirmwareVersion;

/// Strongest hold the host can request.
pub const MAX_HOLD: u8 = 16;
/// Strongest hold a pre-mapping board can encode in its four-bit field.
pub const LEGACY_MAX_HOLD: u8 = 15;
pub const MAX_RECYCLE_FACTOR: u8 = 7;
pub const DEFAULT_RECYCLE_FACTOR: u8 = 2;

/// Switch channel wired to each coil channel on pre-mapping boards.
const LEGACY_SWITCH_FOR_COIL: [u8; 16] = [0, 1, 2, 3, 8, 9, 10, 11, 16, 17, 18, 19, 24, 25, 26, 27];

/// Per-coil settings as supplied by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoilSettings {
    pub pulse_ms: u8,
    /// Hold strength on the 0-16 scale.
    pub hold_power16: Option<u8>,
    /// Hold strength on the coarse 0-8 scale.
    pub hold_power: Option<u8>,
    pub allow_enable: bool,
    pub recycle: bool,
    pub recycle_factor: Option<u8>,
}

/// Fields of a configure-solenoid frame after the channel byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolenoidConfig {
    pub flags: u8,
    pub pulse_ms: u8,
    pub hold: u8,
    pub off_factor: u8,
}

impl SolenoidConfig {
    /// Hold in the low nibble, minimum-off factor in the high nibble.
    pub fn hold_and_off(&self) -> u8 {
        (self.hold & 0x0F) | (self.off_factor << 4)
    }
}

/// Hold strength (0-16) for a coil. Zero means pulse only.
pub fn hold_value(settings: &CoilSettings) -> u8 {
    if let Some(fine) = settings.hold_power16.filter(|&h| h > 0) {
        fine.min(MAX_HOLD)
    } else if let Some(coarse) = settings.hold_power.filter(|&h| h > 0) {
        if coarse >= 8 { MAX_HOLD } else { coarse * 2 }
    } else if settings.allow_enable {
        MAX_HOLD
    } else {
        0
    }
}

/// Multiple of the pulse width the board waits before the coil may fire again.
pub fn minimum_off_factor(settings: &CoilSettings) -> ProtocolResult<u8> {
    if !settings.recycle {
        return Ok(0);
    }
    match settings.recycle_factor.filter(|&f| f > 0) {
        Some(factor) if factor > MAX_RECYCLE_FACTOR => {
            Err(ProtocolError::InvalidRecycleFactor(factor))
        }
        Some(factor) => Ok(factor),
        None => Ok(DEFAULT_RECYCLE_FACTOR),
    }
}

/// Switch channel hard-wired to `coil` on boards without switch mapping.
pub fn matching_switch_channel(coil: u8) -> Option<u8> {
    LEGACY_SWITCH_FOR_COIL.get(usize::from(coil)).copied()
}

/// Computes the configure-solenoid fields for `coil`.
///
/// `use_switch` is the driver's legacy switch-trigger flag and
/// `mapped_switches` lists the switch channels currently mapped to it.
pub fn solenoid_config(
    settings: &CoilSettings,
    version: FirmwareVersion,
    coil: u8,
    use_hold: bool,
    use_switch: bool,
    mapped_switches: &[u8],
) -> ProtocolResult<SolenoidConfig> {
    let mut flags = 0;
    let mut hold = 0;

    if use_hold {
        hold = hold_value(settings);
        if hold == 0 {
            return Err(ProtocolError::ZeroHold);
        }
        if hold >= MAX_HOLD {
            if version.supports_switch_mapping() {
                flags |= CFG_SOL_ON_OFF;
                hold = 0;
            } else {
                hold = LEGACY_MAX_HOLD;
            }
        }
    } else {
        flags |= CFG_SOL_AUTO_CLR;
    }

    let off_factor = minimum_off_factor(settings)?;

    let switch_triggered = if version.supports_switch_mapping() {
        matching_switch_channel(coil).is_some_and(|sw| mapped_switches.contains(&sw))
    } else {
        use_switch
    };
    if switch_triggered {
        flags |= CFG_SOL_USE_SWITCH;
    }

    Ok(SolenoidConfig {
        flags,
        pulse_ms: settings.pulse_ms,
        hold,
        off_factor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NEW_FW: FirmwareVersion = FirmwareVersion(0x0002_0000);
    const OLD_FW: FirmwareVersion = FirmwareVersion(0x0001_0000);

    #[test]
    fn test_hold_value_priority() {
        let fine = CoilSettings {
            hold_power16: Some(10),
            hold_power: Some(3),
            ..Default::default()
        };
        assert_eq!(hold_value(&fine), 10);

        let coarse = CoilSettings {
            hold_power: Some(9),
            ..Default::default()
        };
        assert_eq!(hold_value(&coarse), 16);

        let coarse = CoilSettings {
            hold_power: Some(3),
            ..Default::default()
        };
        assert_eq!(hold_value(&coarse), 6);

        let enable = CoilSettings {
            allow_enable: true,
            ..Default::default()
        };
        assert_eq!(hold_value(&enable), 16);

        assert_eq!(hold_value(&CoilSettings::default()), 0);
    }

    #[test]
    fn test_minimum_off_factor() {
        let mut settings = CoilSettings {
            recycle_factor: Some(5),
            ..Default::default()
        };
        assert_eq!(minimum_off_factor(&settings), Ok(0));
        settings.recycle = true;
        assert_eq!(minimum_off_factor(&settings), Ok(5));
        settings.recycle_factor = None;
        assert_eq!(minimum_off_factor(&settings), Ok(2));
        settings.recycle_factor = Some(8);
        assert_eq!(
            minimum_off_factor(&settings),
            Err(ProtocolError::InvalidRecycleFactor(8))
        );
    }

    #[test]
    fn test_legacy_switch_table() {
        assert_eq!(matching_switch_channel(5), Some(9));
        assert_eq!(matching_switch_channel(0), Some(0));
        assert_eq!(matching_switch_channel(15), Some(27));
        assert_eq!(matching_switch_channel(16), None);
        for coil in 0u8..16 {
            let expected = ((coil & 0x0C) << 1) | (coil & 0x03);
            assert_eq!(matching_switch_channel(coil), Some(expected));
        }
    }

    #[test]
    fn test_pulse_only_sets_auto_clear() -> Result<(), ProtocolError> {
        let settings = CoilSettings {
            pulse_ms: 10,
            ..Default::default()
        };
        let config = solenoid_config(&settings, NEW_FW, 0, false, false, &[])?;
        assert_eq!(config.flags, CFG_SOL_AUTO_CLR);
        assert_eq!(config.hold, 0);
        assert_eq!(config.pulse_ms, 10);
        Ok(())
    }

    #[test]
    fn test_full_hold_depends_on_firmware() -> Result<(), ProtocolError> {
        let settings = CoilSettings {
            pulse_ms: 30,
            allow_enable: true,
            ..Default::default()
        };
        let new = solenoid_config(&settings, NEW_FW, 1, true, false, &[])?;
        assert_eq!(new.flags, CFG_SOL_ON_OFF);
        assert_eq!(new.hold, 0);

        let old = solenoid_config(&settings, OLD_FW, 1, true, false, &[])?;
        assert_eq!(old.flags, 0);
        assert_eq!(old.hold, 15);
        Ok(())
    }

    #[test]
    fn test_zero_hold_rejected() {
        assert_eq!(
            solenoid_config(&CoilSettings::default(), NEW_FW, 0, true, false, &[]),
            Err(ProtocolError::ZeroHold)
        );
    }

    #[test]
    fn test_use_switch_flag() -> Result<(), ProtocolError> {
        let settings = CoilSettings::default();
        let legacy = solenoid_config(&settings, OLD_FW, 5, false, true, &[])?;
        assert_eq!(legacy.flags, CFG_SOL_AUTO_CLR | CFG_SOL_USE_SWITCH);

        let mapped = solenoid_config(&settings, NEW_FW, 5, false, false, &[9])?;
        assert_eq!(mapped.flags, CFG_SOL_AUTO_CLR | CFG_SOL_USE_SWITCH);

        let other = solenoid_config(&settings, NEW_FW, 5, false, true, &[4])?;
        assert_eq!(other.flags, CFG_SOL_AUTO_CLR);
        Ok(())
    }

    #[test]
    fn test_hold_and_off_packing() {
        let config = SolenoidConfig {
            flags: 0,
            pulse_ms: 0,
            hold: 6,
            off_factor: 7,
        };
        assert_eq!(config.hold_and_off(), 0x76);
    }
}
