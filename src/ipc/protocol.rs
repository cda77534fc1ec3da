//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::MonitorEvent;
use crate::hotkey::{MonitoringHealth, TapStats};
use crate::input_source::SwitchCounts;

/// Largest accepted message body
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Requests from the shell to the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to monitor event notifications
    Subscribe,

    /// Install the event tap if permission allows
    StartMonitoring,

    /// Remove the event tap until the next start
    StopMonitoring,

    /// Remove and reinstall the event tap
    ReinitializeMonitoring,

    /// Check Accessibility permission, optionally showing the system prompt
    CheckPermission {
        #[serde(default)]
        prompt: bool,
    },
}

/// Responses from the daemon to the shell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Monitoring state after a start/stop/reinitialize
    Monitoring { health: MonitoringHealth },

    /// Permission state, with the settings pane to open when missing
    Permission {
        granted: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        settings_url: Option<String>,
    },

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification from daemon to shell (for subscribed clients)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Monitor event occurred
    Event { event: MonitorEvent },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Event tap state
    pub monitoring: MonitoringHealth,

    /// Event counters since startup
    pub taps: TapStats,

    /// Switch counters since startup
    pub switches: SwitchCounts,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            monitoring: MonitoringHealth::default(),
            taps: TapStats::default(),
            switches: SwitchCounts::default(),
            uptime_secs: 0,
        }
    }
}

impl Response {
    pub fn error(code: &str, message: impl std::fmt::Display) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = Request::CheckPermission { prompt: true };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("check_permission"));
        assert!(json.contains("\"prompt\":true"));
    }

    #[test]
    fn test_prompt_defaults_to_false() {
        let req: Request = serde_json::from_str(r#"{"type":"check_permission"}"#).unwrap();
        assert_eq!(req, Request::CheckPermission { prompt: false });
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(DaemonStatus::default());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("status"));
        assert!(json.contains("last_permission_granted"));
    }

    #[test]
    fn test_granted_permission_omits_url() {
        let resp = Response::Permission { granted: true, settings_url: None };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("settings_url"));
    }

    #[test]
    fn test_notification_wraps_event() {
        let note = Notification::Event { event: MonitorEvent::HookInvalidated };
        let json = serde_json::to_string(&note).unwrap();
        assert_eq!(json, r#"{"type":"event","event":{"type":"hook_invalidated"}}"#);
    }
}
