//! Firmware version handling.

use std::fmt;

/// A 32-bit board firmware version, one byte per dotted component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FirmwareVersion(pub u32);

impl FirmwareVersion {
    /// Oldest firmware the host supports.
    pub const MIN_SUPPORTED: Self = Self(0x0000_0100);
    /// Placeholder reported by pre-release firmware.
    pub const PRE_RELEASE: Self = Self(0x0102_0304);
    /// First firmware that takes explicit switch/coil mappings.
    pub const SWITCH_MAPPING: Self = Self(0x0002_0000);

    pub const fn from_be_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub fn is_supported(self) -> bool {
        self >= Self::MIN_SUPPORTED
    }

    pub fn is_pre_release(self) -> bool {
        self == Self::PRE_RELEASE
    }

    /// Whether switch/coil links are set with explicit mapping frames rather
    /// than the fixed nibble rule.
    pub fn supports_switch_mapping(self) -> bool {
        self >= Self::SWITCH_MAPPING
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0.to_be_bytes();
        write!(f, "{a:02}.{b:02}.{c:02}.{d:02}")
    }
}

impl From<u32> for FirmwareVersion {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(FirmwareVersion(0x0002_0000).to_string(), "00.02.00.00");
        assert_eq!(FirmwareVersion(0x0001_0203).to_string(), "00.01.02.03");
        assert_eq!(FirmwareVersion::PRE_RELEASE.to_string(), "01.02.03.04");
    }

    #[test]
    fn test_thresholds() {
        assert!(!FirmwareVersion(0x0000_00FF).is_supported());
        assert!(FirmwareVersion::MIN_SUPPORTED.is_supported());
        assert!(!FirmwareVersion(0x0001_FFFF).supports_switch_mapping());
        assert!(FirmwareVersion(0x0002_0000).supports_switch_mapping());
        assert!(FirmwareVersion::PRE_RELEASE.is_pre_release());
    }

    #[test]
    fn test_ordering_is_numeric() {
        let mut versions = vec![
            FirmwareVersion(0x0002_0000),
            FirmwareVersion(0x0000_0100),
            FirmwareVersion(0x0001_0000),
        ];
        versions.sort();
        assert_eq!(versions.first(), Some(&FirmwareVersion::MIN_SUPPORTED));
    }
}
