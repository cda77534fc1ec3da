//! Accessibility permission checks
//!
//! Installing a modifying event tap requires the process to be trusted
//! for Accessibility. The permission can be granted or revoked at any
//! time from System Settings, so callers poll it instead of caching it.

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "macos")]
pub use macos::AxPermission;

/// Source of truth for the Accessibility permission
pub trait PermissionProbe {
    /// Current permission state, without any UI
    fn is_granted(&self) -> bool;

    /// Current permission state, showing the system prompt if missing
    fn request(&self) -> bool;
}

/// System Settings pane where the permission is granted
pub const SETTINGS_URL: &str =
    "x-apple.systempreferences:com.apple.preference.security?Privacy_Accessibility";
