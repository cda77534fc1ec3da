//! Solitary Shift tap detection
//!
//! Tracks left and right Shift independently through `Up -> Down -> Up`
//! and classifies each release as a solitary tap or not.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::keys::{is_chord_modifier, EventKind, KeyEvent, ModifierFlags, ShiftSide, CHORD_MODIFIERS};

/// Shortest press that counts as a tap (exclusive)
pub const TAP_MIN: Duration = Duration::from_millis(50);
/// Longest press that counts as a tap (exclusive)
pub const TAP_MAX: Duration = Duration::from_millis(500);

/// Press state of one Shift key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShiftState {
    /// Key is currently held
    pub is_down: bool,
    /// When the current press started, only set while held
    pub pressed_at: Option<Instant>,
    /// Another key was pressed since this press started
    pub other_key_since_press: bool,
}

/// Result of classifying a Shift release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Clean press and release inside the tap window
    Tap,
    /// Another key was pressed while Shift was held
    Chorded,
    /// Held for `TAP_MIN` or less
    TooShort,
    /// Held for `TAP_MAX` or more
    TooLong,
}

/// Per-side state machine fed with every keyboard event except Caps Lock
#[derive(Debug, Default)]
pub struct ShiftTapDetector {
    left: ShiftState,
    right: ShiftState,
}

impl ShiftTapDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, side: ShiftSide) -> &ShiftState {
        match side {
            ShiftSide::Left => &self.left,
            ShiftSide::Right => &self.right,
        }
    }

    fn state_mut(&mut self, side: ShiftSide) -> &mut ShiftState {
        match side {
            ShiftSide::Left => &mut self.left,
            ShiftSide::Right => &mut self.right,
        }
    }

    /// Feed one event; returns the side whose release was a solitary tap
    pub fn handle(&mut self, event: &KeyEvent, now: Instant) -> Option<ShiftSide> {
        match event.kind {
            EventKind::KeyDown => {
                self.mark_other_key(event.keycode);
                None
            }
            EventKind::KeyUp => None,
            EventKind::FlagsChanged => match ShiftSide::from_keycode(event.keycode) {
                Some(side) => self.handle_shift(side, event.flags, now),
                None => {
                    if is_chord_modifier(event.keycode) {
                        self.mark_other_key(event.keycode);
                    }
                    None
                }
            },
        }
    }

    /// Disqualify every held side whose own key is not `keycode`
    fn mark_other_key(&mut self, keycode: u16) {
        for side in ShiftSide::ALL {
            let state = self.state_mut(side);
            if state.is_down && keycode != side.keycode() && !state.other_key_since_press {
                state.other_key_since_press = true;
                debug!(%side, keycode, "shift chord detected");
            }
        }
    }

    fn handle_shift(&mut self, side: ShiftSide, flags: ModifierFlags, now: Instant) -> Option<ShiftSide> {
        let state = self.state_mut(side);
        // Cmd, Option, Control or Fn held at either edge makes a shortcut
        let chorded = flags.intersects(CHORD_MODIFIERS);

        match (state.is_down, side.is_held(flags)) {
            (false, true) => {
                *state = ShiftState {
                    is_down: true,
                    pressed_at: Some(now),
                    other_key_since_press: chorded,
                };
                trace!(%side, chorded, "shift pressed");
                None
            }
            (true, false) => {
                state.other_key_since_press |= chorded;
                let held = state
                    .pressed_at
                    .map(|t| now.saturating_duration_since(t))
                    .unwrap_or_default();
                let release = classify(state, held);
                *state = ShiftState::default();
                debug!(%side, ?release, held_ms = held.as_millis() as u64, "shift released");
                (release == Release::Tap).then_some(side)
            }
            // Repeated flags for an unchanged side
            _ => None,
        }
    }
}

fn classify(state: &ShiftState, held: Duration) -> Release {
    if state.other_key_since_press {
        Release::Chorded
    } else if held <= TAP_MIN {
        Release::TooShort
    } else if held >= TAP_MAX {
        Release::TooLong
    } else {
        Release::Tap
    }
}
