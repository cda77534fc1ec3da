//! Configuration loading and management

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::input_source::ClassifierRules;

/// File in the data directory overriding the classifier keyword lists
const CLASSIFIER_FILE: &str = "classifier.json";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Keyword lists for grouping input sources
    pub classifier: ClassifierRules,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        Self::load_from(&PathBuf::from(home).join(".local").join("share").join("shift-switch"))
    }

    /// Load configuration rooted at `data_dir`
    pub fn load_from(data_dir: &Path) -> Result<Self> {
        let socket_path = data_dir.join("daemon.sock");
        let classifier = load_classifier(&data_dir.join(CLASSIFIER_FILE))?;

        Ok(Self {
            socket_path,
            data_dir: data_dir.to_owned(),
            classifier,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}

/// Read classifier overrides; a missing file means built-in defaults
fn load_classifier(path: &Path) -> Result<ClassifierRules> {
    if !path.exists() {
        return Ok(ClassifierRules::default());
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let rules = serde_json::from_str(&raw)
        .with_context(|| format!("invalid classifier rules in {}", path.display()))?;
    info!(?path, "classifier rules loaded");
    Ok(rules)
}
