//! Per-event dispatch for the event tap callback
//!
//! Runs synchronously inside the tap callback, so nothing here may block.
//! Solitary taps are handed to the switch worker with `try_send` and
//! logging stays at debug level or below.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace};

use crate::events::MonitorEvent;

use super::capslock;
use super::detector::ShiftTapDetector;
use super::keys::{EventKind, KeyEvent, ModifierFlags, ShiftSide};

/// A solitary Shift tap waiting for the switch worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapRequest {
    pub side: ShiftSide,
}

/// What the tap should do with the event it just delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Deliver unchanged
    PassThrough,
    /// Deliver with the flags replaced
    Rewrite(ModifierFlags),
}

/// In-memory counters for the current process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapStats {
    pub events_seen: u64,
    pub shift_presses: u64,
    pub solitary_taps: u64,
    pub taps_dropped: u64,
    pub caps_lock_normalized: u64,
}

/// Routes tap events to the Caps Lock normalizer and the Shift detector
pub struct KeyRouter {
    detector: ShiftTapDetector,
    tap_tx: mpsc::Sender<TapRequest>,
    event_tx: broadcast::Sender<MonitorEvent>,
    stats: TapStats,
}

impl KeyRouter {
    pub fn new(tap_tx: mpsc::Sender<TapRequest>, event_tx: broadcast::Sender<MonitorEvent>) -> Self {
        Self {
            detector: ShiftTapDetector::new(),
            tap_tx,
            event_tx,
            stats: TapStats::default(),
        }
    }

    pub fn stats(&self) -> TapStats {
        self.stats
    }

    /// Handle one event delivered by the tap
    pub fn route(&mut self, event: &KeyEvent, now: Instant) -> Disposition {
        self.stats.events_seen += 1;

        if capslock::is_caps_lock_transition(event) {
            let flags = capslock::normalize(event.flags);
            self.stats.caps_lock_normalized += 1;
            trace!(
                engaged = !flags.is_empty(),
                original = event.flags.bits(),
                "caps lock normalized"
            );
            return Disposition::Rewrite(flags);
        }

        let was_down = self.shift_down_count();
        let tap = self.detector.handle(event, now);
        if event.kind == EventKind::FlagsChanged && self.shift_down_count() > was_down {
            self.stats.shift_presses += 1;
        }

        if let Some(side) = tap {
            self.stats.solitary_taps += 1;
            debug!(%side, "solitary shift tap");
            let _ = self.event_tx.send(MonitorEvent::SolitaryTap { side });

            if let Err(e) = self.tap_tx.try_send(TapRequest { side }) {
                self.stats.taps_dropped += 1;
                debug!(%side, error = %e, "switch queue unavailable, tap dropped");
            }
        }

        Disposition::PassThrough
    }

    fn shift_down_count(&self) -> usize {
        ShiftSide::ALL
            .iter()
            .filter(|side| self.detector.state(**side).is_down)
            .count()
    }

    /// Called when the OS reports it disabled the tap
    pub fn tap_disabled(&self, reason: &str) {
        debug!(reason, "event tap disabled by the system");
    }
}
