//! Hotkey module for global keyboard event interception
//!
//! Uses a macOS CGEventTap to watch every key-down, key-up and
//! flags-changed event, detect solitary Shift taps and normalize Caps
//! Lock transitions.

mod capslock;
mod controller;
mod detector;
mod keys;
mod listener;
mod router;
#[cfg(target_os = "macos")]
mod tap;

pub use controller::MonitoringHealth;
pub use keys::ShiftSide;
pub use listener::{MonitorCommand, MonitorHandle, MonitorReply};
pub use router::{TapRequest, TapStats};

// Wiring used by the macOS entry point and by tests
#[cfg_attr(not(target_os = "macos"), allow(unused_imports))]
pub use controller::{EventTapController, SUPERVISE_INTERVAL};
#[cfg_attr(not(target_os = "macos"), allow(unused_imports))]
pub use listener::HotkeyListener;
#[cfg_attr(not(target_os = "macos"), allow(unused_imports))]
pub use router::KeyRouter;
#[cfg(target_os = "macos")]
pub use tap::CgEventTapBackend;

#[cfg(test)]
pub(crate) use controller::fakes;
