//! Input source classification and switching
//!
//! Groups the enabled input sources into CJK-style and Latin-style and
//! toggles between the preferred source of each group.

mod classify;
mod registry;
mod switcher;
#[cfg(target_os = "macos")]
mod tis;

pub use classify::ClassifierRules;
pub use switcher::{SwitchCounts, SwitchStats};

#[cfg_attr(not(target_os = "macos"), allow(unused_imports))]
pub use switcher::InputSourceSwitcher;
#[cfg(target_os = "macos")]
pub use tis::TisRegistry;
