//! Key code and modifier flag definitions
//!
//! Provides the macOS virtual key codes and CGEventFlags bit masks the
//! daemon cares about, plus a platform-neutral representation of the
//! events delivered by the event tap.

use serde::{Deserialize, Serialize};

/// macOS virtual key codes (kVK_*)
pub mod keycode {
    /// kVK_Shift
    pub const LEFT_SHIFT: u16 = 0x38;
    /// kVK_CapsLock
    pub const CAPS_LOCK: u16 = 0x39;
    /// kVK_RightShift
    pub const RIGHT_SHIFT: u16 = 0x3C;
    /// kVK_Command
    pub const COMMAND: u16 = 0x37;
    /// kVK_RightCommand
    pub const RIGHT_COMMAND: u16 = 0x36;
    /// kVK_Option
    pub const OPTION: u16 = 0x3A;
    /// kVK_RightOption
    pub const RIGHT_OPTION: u16 = 0x3D;
    /// kVK_Control
    pub const CONTROL: u16 = 0x3B;
    /// kVK_RightControl
    pub const RIGHT_CONTROL: u16 = 0x3E;
    /// kVK_Function
    pub const FUNCTION: u16 = 0x3F;
    /// kVK_ANSI_A
    #[cfg(test)]
    pub const ANSI_A: u16 = 0x00;
}

bitflags::bitflags! {
    /// Modifier flag bits, matching CGEventFlags / NX_* masks
    ///
    /// Unnamed bits from the platform are retained so a rewrite can tell
    /// exactly what it dropped.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct ModifierFlags: u64 {
        /// Caps Lock engaged (kCGEventFlagMaskAlphaShift)
        const ALPHA_SHIFT = 0x0001_0000;
        /// Either Shift held (kCGEventFlagMaskShift)
        const SHIFT = 0x0002_0000;
        /// kCGEventFlagMaskControl
        const CONTROL = 0x0004_0000;
        /// kCGEventFlagMaskAlternate
        const OPTION = 0x0008_0000;
        /// kCGEventFlagMaskCommand
        const COMMAND = 0x0010_0000;
        /// kCGEventFlagMaskSecondaryFn
        const FUNCTION = 0x0080_0000;
        /// kCGEventFlagMaskNonCoalesced
        const NON_COALESCED = 0x0000_0100;
        /// NX_DEVICELSHIFTKEYMASK
        const DEVICE_LEFT_SHIFT = 0x0000_0002;
        /// NX_DEVICERSHIFTKEYMASK
        const DEVICE_RIGHT_SHIFT = 0x0000_0004;
    }
}

/// Modifiers that turn a Shift press into a shortcut
pub const CHORD_MODIFIERS: ModifierFlags = ModifierFlags::CONTROL
    .union(ModifierFlags::OPTION)
    .union(ModifierFlags::COMMAND)
    .union(ModifierFlags::FUNCTION);

/// Which physical Shift key an event pertains to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftSide {
    Left,
    Right,
}

impl ShiftSide {
    pub const ALL: [ShiftSide; 2] = [ShiftSide::Left, ShiftSide::Right];

    /// Map a key code to a Shift side, if it is one
    pub fn from_keycode(code: u16) -> Option<Self> {
        match code {
            keycode::LEFT_SHIFT => Some(Self::Left),
            keycode::RIGHT_SHIFT => Some(Self::Right),
            _ => None,
        }
    }

    pub fn keycode(self) -> u16 {
        match self {
            Self::Left => keycode::LEFT_SHIFT,
            Self::Right => keycode::RIGHT_SHIFT,
        }
    }

    fn device_mask(self) -> ModifierFlags {
        match self {
            Self::Left => ModifierFlags::DEVICE_LEFT_SHIFT,
            Self::Right => ModifierFlags::DEVICE_RIGHT_SHIFT,
        }
    }

    /// Whether this side is held according to `flags`
    ///
    /// Prefers the device-dependent side bits so releasing one Shift while
    /// the other is still held is seen as a release. Synthetic events that
    /// carry no side bits fall back to the generic Shift bit.
    pub fn is_held(self, flags: ModifierFlags) -> bool {
        let side_bits = ModifierFlags::DEVICE_LEFT_SHIFT | ModifierFlags::DEVICE_RIGHT_SHIFT;
        if flags.intersects(side_bits) {
            flags.contains(self.device_mask())
        } else {
            flags.contains(ModifierFlags::SHIFT)
        }
    }
}

impl std::fmt::Display for ShiftSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShiftSide::Left => write!(f, "left"),
            ShiftSide::Right => write!(f, "right"),
        }
    }
}

/// Non-Shift, non-Caps-Lock modifier keys that form chords with Shift
pub fn is_chord_modifier(code: u16) -> bool {
    matches!(
        code,
        keycode::COMMAND
            | keycode::RIGHT_COMMAND
            | keycode::OPTION
            | keycode::RIGHT_OPTION
            | keycode::CONTROL
            | keycode::RIGHT_CONTROL
            | keycode::FUNCTION
    )
}

/// Kind of keyboard event delivered by the tap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    KeyDown,
    KeyUp,
    FlagsChanged,
}

/// A keyboard event, detached from the platform event object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub kind: EventKind,
    pub keycode: u16,
    pub flags: ModifierFlags,
}

impl KeyEvent {
    #[cfg(test)]
    pub fn key_down(keycode: u16) -> Self {
        Self {
            kind: EventKind::KeyDown,
            keycode,
            flags: ModifierFlags::empty(),
        }
    }

    #[cfg(test)]
    pub fn key_up(keycode: u16) -> Self {
        Self {
            kind: EventKind::KeyUp,
            keycode,
            flags: ModifierFlags::empty(),
        }
    }

    pub fn flags_changed(keycode: u16, flags: ModifierFlags) -> Self {
        Self {
            kind: EventKind::FlagsChanged,
            keycode,
            flags,
        }
    }
}
