//! Switch state diffing.
//!
//! Inputs are active-low: a cleared bit means the switch is closed. A diff
//! compares the last reported word with a fresh one and yields one transition
//! per changed bit, lowest bit first.

/// First logical channel of a board's matrix switches. Bank 0 occupies
/// channels 32..64 and bank 1 occupies 64..96.
pub const MATRIX_CHANNEL_BASE: u8 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputTransition {
    pub channel: u8,
    pub active: bool,
}

/// Logical state of `bit` in an active-low word.
#[inline]
pub fn is_active(word: u32, bit: u8) -> bool {
    word.checked_shr(u32::from(bit)).is_some_and(|w| w & 1 == 0)
}

fn diff_word(old: u32, new: u32, base: u8) -> impl Iterator<Item = InputTransition> {
    let changes = old ^ new;
    (0u8..32)
        .filter(move |&bit| changes & (1 << bit) != 0)
        .map(move |bit| InputTransition {
            channel: base + bit,
            active: is_active(new, bit),
        })
}

/// Transitions between two digital input words.
pub fn diff_inputs(old: u32, new: u32) -> impl Iterator<Item = InputTransition> {
    diff_word(old, new, 0)
}

/// Transitions between two matrix snapshots, bank 0 first.
pub fn diff_matrix(old: [u32; 2], new: [u32; 2]) -> impl Iterator<Item = InputTransition> {
    let [old0, old1] = old;
    let [new0, new1] = new;
    diff_word(old0, new0, MATRIX_CHANNEL_BASE).chain(diff_word(old1, new1, MATRIX_CHANNEL_BASE + 32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_change_no_transitions() {
        assert_eq!(diff_inputs(0x1234_5678, 0x1234_5678).count(), 0);
        assert_eq!(diff_matrix([1, 2], [1, 2]).count(), 0);
    }

    #[test]
    fn test_cleared_bit_is_active() {
        let transitions: Vec<_> = diff_inputs(0xFFFF_FFFF, 0xFFFF_FFFE).collect();
        assert_eq!(
            transitions,
            vec![InputTransition {
                channel: 0,
                active: true
            }]
        );
        let transitions: Vec<_> = diff_inputs(0xFFFF_FFFE, 0xFFFF_FFFF).collect();
        assert_eq!(
            transitions,
            vec![InputTransition {
                channel: 0,
                active: false
            }]
        );
    }

    #[test]
    fn test_lowest_bit_first() {
        let channels: Vec<u8> = diff_inputs(0, 0x8000_0005).map(|t| t.channel).collect();
        assert_eq!(channels, vec![0, 2, 31]);
    }

    #[test]
    fn test_matrix_offsets() {
        let transitions: Vec<_> =
            diff_matrix([u32::MAX, u32::MAX], [0xFFFF_FFFE, 0x7FFF_FFFF]).collect();
        assert_eq!(
            transitions,
            vec![
                InputTransition {
                    channel: 32,
                    active: true
                },
                InputTransition {
                    channel: 95,
                    active: true
                },
            ]
        );
    }

    #[test]
    fn test_is_active() {
        assert!(is_active(0xFFFF_FFFD, 1));
        assert!(!is_active(0xFFFF_FFFD, 0));
        assert!(!is_active(0, 40));
    }
}
