use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod interval;

pub use interval::{Interval, IntervalError, Phase};

/// Header carrying the watch channel id on every push notification.
pub const CHANNEL_ID_HEADER: &str = "X-Goog-Channel-Id";
/// Header carrying the resource state (`sync`, `exists`, `not_exists`).
pub const RESOURCE_STATE_HEADER: &str = "X-Goog-Resource-State";
/// Channel type used when registering a push watch.
pub const CHANNEL_TYPE_WEBHOOK: &str = "web_hook";

pub const WEBHOOK_PATH: &str = "/notify";
pub const HEALTHCHECK_PATH: &str = "/healthcheck";
/// Path appended to the light agent base address.
pub const LIGHT_STATE_PATH: &str = "/light/state";

/// Event record as delivered by the calendar source, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEvent {
    pub summary: String,
    pub description: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub status: Option<String>, // "confirmed", "tentative", "cancelled"
    pub recurring: bool,
}

impl SourceEvent {
    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }
}

/// Notification kinds that share a cooldown in the throttle gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// An interval just started: light on.
    Start,
    /// Nothing in progress, either no interval left or the next one has
    /// not started yet: light off.
    Absence,
}

impl NotificationKind {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationKind::Start => "start",
            NotificationKind::Absence => "absence",
        }
    }
}

/// Body posted to the light agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightState {
    pub on: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirek: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,
}

impl LightState {
    pub fn on(mirek: Option<u16>, brightness: Option<u8>) -> Self {
        Self {
            on: true,
            mirek,
            brightness,
        }
    }

    pub fn off() -> Self {
        Self {
            on: false,
            mirek: None,
            brightness: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_state_off_serializes_bare() {
        let json = serde_json::to_string(&LightState::off()).unwrap();
        assert_eq!(json, r#"{"on":false}"#);
    }

    #[test]
    fn test_light_state_on_includes_configured_params() {
        let json = serde_json::to_string(&LightState::on(Some(366), Some(80))).unwrap();
        assert_eq!(json, r#"{"on":true,"mirek":366,"brightness":80}"#);

        let json = serde_json::to_string(&LightState::on(None, Some(50))).unwrap();
        assert_eq!(json, r#"{"on":true,"brightness":50}"#);
    }

    #[test]
    fn test_notification_kind_matches_serde_name() {
        for kind in [NotificationKind::Start, NotificationKind::Absence] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_cancelled_status() {
        let mut event = SourceEvent {
            summary: "lunch".to_string(),
            description: String::new(),
            start: None,
            end: None,
            status: Some("cancelled".to_string()),
            recurring: false,
        };
        assert!(event.is_cancelled());
        event.status = None;
        assert!(!event.is_cancelled());
    }
}
