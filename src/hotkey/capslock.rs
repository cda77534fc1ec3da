//! Caps Lock flag normalization
//!
//! macOS attaches extra modifier bits to Caps Lock transitions, which the
//! input method layer treats as an input source switch request. Rewriting
//! the flags to the bare lock bit keeps Caps Lock a pure case toggle.

use super::keys::{keycode, EventKind, KeyEvent, ModifierFlags};

/// Returns true for flags-changed events produced by the Caps Lock key
pub fn is_caps_lock_transition(event: &KeyEvent) -> bool {
    event.kind == EventKind::FlagsChanged && event.keycode == keycode::CAPS_LOCK
}

/// Reduce a Caps Lock event's flags to exactly the lock bit, or nothing
pub fn normalize(flags: ModifierFlags) -> ModifierFlags {
    if flags.contains(ModifierFlags::ALPHA_SHIFT) {
        ModifierFlags::ALPHA_SHIFT
    } else {
        ModifierFlags::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engaged_keeps_only_lock_bit() {
        let input = ModifierFlags::ALPHA_SHIFT
            | ModifierFlags::SHIFT
            | ModifierFlags::NON_COALESCED
            | ModifierFlags::from_bits_retain(0x20);
        assert_eq!(normalize(input), ModifierFlags::ALPHA_SHIFT);
    }

    #[test]
    fn test_disengaged_is_empty() {
        let input = ModifierFlags::NON_COALESCED | ModifierFlags::COMMAND;
        assert!(normalize(input).is_empty());
        assert!(normalize(ModifierFlags::empty()).is_empty());
    }

    #[test]
    fn test_output_is_lock_bit_or_empty() {
        // Walk every single bit plus a handful of dense combinations
        let mut inputs: Vec<u64> = (0..64).map(|bit| 1u64 << bit).collect();
        inputs.extend([0, u64::MAX, 0x0001_0100, 0x00FF_FFFF, 0xFFFE_FFFF]);

        for bits in inputs {
            let out = normalize(ModifierFlags::from_bits_retain(bits));
            assert!(
                out == ModifierFlags::ALPHA_SHIFT || out.is_empty(),
                "input {bits:#x} produced {:#x}",
                out.bits()
            );
            assert_eq!(out.is_empty(), bits & 0x0001_0000 == 0);
        }
    }

    #[test]
    fn test_transition_detection() {
        let caps = KeyEvent::flags_changed(keycode::CAPS_LOCK, ModifierFlags::ALPHA_SHIFT);
        assert!(is_caps_lock_transition(&caps));
        assert!(!is_caps_lock_transition(&KeyEvent::key_down(keycode::CAPS_LOCK)));
        assert!(!is_caps_lock_transition(&KeyEvent::flags_changed(
            keycode::LEFT_SHIFT,
            ModifierFlags::SHIFT
        )));
    }
}
