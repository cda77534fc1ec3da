//! Input source toggling
//!
//! Picks the opposite group's preferred source and selects it. The
//! switch worker runs toggles one at a time on whichever thread polls it;
//! the daemon polls it from the main thread, where the system input
//! source calls must happen.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::events::MonitorEvent;
use crate::hotkey::TapRequest;

use super::classify::{ClassifierRules, SourceGroup};
use super::registry::{InputSourceDescriptor, InputSourceRegistry, RegistryError};

/// Why a toggle did not happen
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SwitchError {
    #[error("failed to query input sources: {0}")]
    Query(RegistryError),

    #[error("no {target:?} input source enabled to switch to from {current}")]
    NoTarget { current: String, target: SourceGroup },

    #[error(transparent)]
    Select(RegistryError),
}

/// A completed switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Switched {
    pub from: String,
    pub to: String,
}

/// Switch outcome counters for the current process
#[derive(Debug, Default)]
pub struct SwitchStats {
    switched: AtomicU64,
    failed: AtomicU64,
}

/// Plain copy of `SwitchStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchCounts {
    pub switched: u64,
    pub failed: u64,
}

impl SwitchStats {
    pub fn snapshot(&self) -> SwitchCounts {
        SwitchCounts {
            switched: self.switched.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Toggles between the CJK-style and Latin-style input source groups
pub struct InputSourceSwitcher<R: InputSourceRegistry> {
    registry: R,
    rules: ClassifierRules,
    stats: Arc<SwitchStats>,
}

impl<R: InputSourceRegistry> InputSourceSwitcher<R> {
    pub fn new(registry: R, rules: ClassifierRules) -> Self {
        Self {
            registry,
            rules,
            stats: Arc::new(SwitchStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<SwitchStats> {
        Arc::clone(&self.stats)
    }

    /// Switch to the preferred source of the other group
    pub fn toggle(&self) -> Result<Switched, SwitchError> {
        let result = self.try_toggle();
        let counter = match &result {
            Ok(_) => &self.stats.switched,
            Err(_) => &self.stats.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        result
    }

    fn try_toggle(&self) -> Result<Switched, SwitchError> {
        let current = self.registry.current().map_err(SwitchError::Query)?;
        let candidates: Vec<InputSourceDescriptor> = self
            .registry
            .enabled_sources()
            .map_err(SwitchError::Query)?
            .into_iter()
            .filter(InputSourceDescriptor::is_switchable)
            .collect();

        let current_group = self.rules.classify(&current);
        let wanted = match current_group {
            SourceGroup::CjkStyle => SourceGroup::LatinStyle,
            SourceGroup::LatinStyle | SourceGroup::Unclassified => SourceGroup::CjkStyle,
        };
        debug!(
            current = %current.id,
            ?current_group,
            ?wanted,
            candidates = candidates.len(),
            "choosing toggle target"
        );

        let target = match wanted {
            SourceGroup::LatinStyle => self.latin_candidate(&candidates),
            _ => self.cjk_candidate(&candidates),
        }
        .ok_or_else(|| SwitchError::NoTarget {
            current: current.id.clone(),
            target: wanted,
        })?;

        self.registry.select(target).map_err(SwitchError::Select)?;

        Ok(Switched {
            from: current.id,
            to: target.id.clone(),
        })
    }

    /// Primary CJK source if enabled, otherwise the first CJK source
    fn cjk_candidate<'a>(&self, sources: &'a [InputSourceDescriptor]) -> Option<&'a InputSourceDescriptor> {
        let mut cjk = sources
            .iter()
            .filter(|s| self.rules.classify(s) == SourceGroup::CjkStyle)
            .peekable();
        let first = cjk.peek().copied();
        cjk.find(|s| self.rules.is_primary_cjk(s)).or(first)
    }

    fn latin_candidate<'a>(&self, sources: &'a [InputSourceDescriptor]) -> Option<&'a InputSourceDescriptor> {
        sources
            .iter()
            .find(|s| self.rules.classify(s) == SourceGroup::LatinStyle)
    }

    /// Log every enabled source with its computed group
    pub fn log_sources(&self) {
        match self.registry.enabled_sources() {
            Ok(sources) => {
                info!(count = sources.len(), "enabled input sources");
                for (index, source) in sources.iter().enumerate() {
                    debug!(
                        index,
                        id = %source.id,
                        name = %source.display_name,
                        category = ?source.category,
                        switchable = source.is_switchable(),
                        group = ?self.rules.classify(source),
                        "input source"
                    );
                }
            }
            Err(e) => warn!(error = %e, "failed to list input sources"),
        }
    }
}

impl<R: InputSourceRegistry> InputSourceSwitcher<R> {
    /// Serve tap requests until every sender is gone
    ///
    /// Toggles run inline, in arrival order, on the polling thread. Must
    /// not be moved onto a spawned task or the blocking pool.
    pub async fn run(&self, mut tap_rx: mpsc::Receiver<TapRequest>, event_tx: broadcast::Sender<MonitorEvent>) {
        info!("switch worker started");

        while let Some(request) = tap_rx.recv().await {
            let event = match self.toggle() {
                Ok(Switched { from, to }) => {
                    info!(side = %request.side, %from, %to, "input source switched");
                    MonitorEvent::InputSourceSwitched { from, to }
                }
                Err(e) => {
                    warn!(side = %request.side, error = %e, "input source switch failed");
                    MonitorEvent::SwitchFailed {
                        reason: e.to_string(),
                    }
                }
            };
            let _ = event_tx.send(event);
        }

        info!("switch worker stopped");
    }
}
