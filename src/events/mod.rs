//! Events module for monitor observability
//!
//! Structured events published by the event tap controller, the key
//! router and the switch worker, relayed to subscribed IPC clients.

use serde::{Deserialize, Serialize};

use crate::hotkey::ShiftSide;

/// Events emitted while monitoring the keyboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// Event tap installed and enabled
    MonitoringStarted,

    /// Event tap removed
    MonitoringStopped,

    /// Accessibility permission state differs from the previous check
    PermissionChanged { granted: bool },

    /// The system disabled an active event tap
    HookInvalidated,

    /// The system refused to create the event tap
    HookCreationFailed { reason: String },

    /// A Shift key was tapped on its own
    SolitaryTap { side: ShiftSide },

    /// Input source switched
    InputSourceSwitched {
        /// Input source ID before the switch
        from: String,
        /// Input source ID after the switch
        to: String,
    },

    /// A toggle attempt was abandoned
    SwitchFailed { reason: String },
}

impl std::fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorEvent::MonitoringStarted => write!(f, "MONITORING_STARTED"),
            MonitorEvent::MonitoringStopped => write!(f, "MONITORING_STOPPED"),
            MonitorEvent::PermissionChanged { granted } => {
                write!(f, "PERMISSION_CHANGED (granted={})", granted)
            }
            MonitorEvent::HookInvalidated => write!(f, "HOOK_INVALIDATED"),
            MonitorEvent::HookCreationFailed { reason } => {
                write!(f, "HOOK_CREATION_FAILED ({})", reason)
            }
            MonitorEvent::SolitaryTap { side } => write!(f, "SOLITARY_TAP ({})", side),
            MonitorEvent::InputSourceSwitched { from, to } => {
                write!(f, "INPUT_SOURCE_SWITCHED ({} -> {})", from, to)
            }
            MonitorEvent::SwitchFailed { reason } => write!(f, "SWITCH_FAILED ({})", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = MonitorEvent::InputSourceSwitched {
            from: "com.apple.keylayout.ABC".into(),
            to: "com.apple.inputmethod.SCIM.ITABC".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("input_source_switched"));
        assert!(json.contains("SCIM.ITABC"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"solitary_tap","side":"right"}"#;
        let event: MonitorEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, MonitorEvent::SolitaryTap { side: ShiftSide::Right });
    }

    #[test]
    fn test_display() {
        let event = MonitorEvent::PermissionChanged { granted: false };
        assert_eq!(event.to_string(), "PERMISSION_CHANGED (granted=false)");
    }
}
