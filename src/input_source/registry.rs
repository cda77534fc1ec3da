//! Input source registry capability
//!
//! The daemon reads snapshots of the system's input sources and asks the
//! registry to select one; it never mutates a descriptor.

use serde::{Deserialize, Serialize};

/// Category reported by the system for an input source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    /// kTISCategoryKeyboardInputSource
    Keyboard,
    /// Palettes, ink and other non-keyboard sources
    Other,
}

/// Snapshot of one input source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSourceDescriptor {
    pub id: String,
    pub display_name: String,
    pub category: SourceCategory,
    pub is_enabled: bool,
    pub is_selectable: bool,
}

impl InputSourceDescriptor {
    /// Enabled keyboard source that can be selected
    pub fn is_switchable(&self) -> bool {
        self.category == SourceCategory::Keyboard && self.is_enabled && self.is_selectable
    }
}

/// Errors reported by the registry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("current input source is unavailable")]
    NoCurrentSource,

    #[error("input source list is unavailable")]
    ListUnavailable,

    #[error("input source {0} not found")]
    NotFound(String),

    #[error("selecting input source {id} failed with status {status}")]
    Select { id: String, status: i32 },
}

/// System input source registry
pub trait InputSourceRegistry: Send + Sync {
    fn current(&self) -> Result<InputSourceDescriptor, RegistryError>;

    /// All enabled input sources, in system order
    fn enabled_sources(&self) -> Result<Vec<InputSourceDescriptor>, RegistryError>;

    fn select(&self, source: &InputSourceDescriptor) -> Result<(), RegistryError>;
}
