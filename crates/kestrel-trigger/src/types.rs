use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of external event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
  Webhook,
  Hotkey,
  FileWatcher,
  Email,
  Api,
  Mouse,
  Image,
  Gesture,
  ElementChange,
}

impl TriggerKind {
  pub const ALL: [TriggerKind; 9] = [
    Self::Webhook,
    Self::Hotkey,
    Self::FileWatcher,
    Self::Email,
    Self::Api,
    Self::Mouse,
    Self::Image,
    Self::Gesture,
    Self::ElementChange,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Webhook => "webhook",
      Self::Hotkey => "hotkey",
      Self::FileWatcher => "file_watcher",
      Self::Email => "email",
      Self::Api => "api",
      Self::Mouse => "mouse",
      Self::Image => "image",
      Self::Gesture => "gesture",
      Self::ElementChange => "element_change",
    }
  }
}

impl fmt::Display for TriggerKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Opaque handle returned by a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriggerHandle(pub u64);

impl fmt::Display for TriggerHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "trigger-{}", self.0)
  }
}

/// Event delivered to a registered listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
  /// Unique identifier for this event
  pub event_id: String,

  pub kind: TriggerKind,

  /// Payload data from the event source
  pub payload: serde_json::Value,

  /// Timestamp when the event fired (Unix millis)
  pub timestamp: i64,
}

impl TriggerEvent {
  pub fn new(kind: TriggerKind, payload: serde_json::Value) -> Self {
    Self {
      event_id: uuid::Uuid::new_v4().to_string(),
      kind,
      payload,
      timestamp: chrono::Utc::now().timestamp_millis(),
    }
  }
}
