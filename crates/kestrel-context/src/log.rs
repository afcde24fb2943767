use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a user-visible log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
  #[default]
  Info,
  Warning,
  Error,
  Success,
}

impl LogLevel {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Info => "info",
      Self::Warning => "warning",
      Self::Error => "error",
      Self::Success => "success",
    }
  }

  /// Lenient parse used for module configs; unknown levels are `Info`.
  pub fn parse(level: &str) -> Self {
    match level.trim().to_ascii_lowercase().as_str() {
      "warning" | "warn" => Self::Warning,
      "error" => Self::Error,
      "success" => Self::Success,
      _ => Self::Info,
    }
  }
}

impl fmt::Display for LogLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A user-visible log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
  pub id: String,
  pub timestamp: DateTime<Utc>,
  pub level: LogLevel,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub node_id: Option<String>,
  pub message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub details: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub duration_ms: Option<u64>,
}

impl LogEntry {
  pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      timestamp: Utc::now(),
      level,
      node_id: None,
      message: message.into(),
      details: None,
      duration_ms: None,
    }
  }

  pub fn for_node(mut self, node_id: impl Into<String>) -> Self {
    self.node_id = Some(node_id.into());
    self
  }

  pub fn with_details(mut self, details: serde_json::Value) -> Self {
    self.details = Some(details);
    self
  }

  pub fn with_duration(mut self, duration_ms: u64) -> Self {
    self.duration_ms = Some(duration_ms);
    self
  }
}

/// In-memory ring of log entries. A capacity of 0 keeps everything.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
  entries: VecDeque<LogEntry>,
  capacity: usize,
}

impl LogBuffer {
  pub fn new(capacity: usize) -> Self {
    Self {
      entries: VecDeque::new(),
      capacity,
    }
  }

  pub fn push(&mut self, entry: LogEntry) {
    if self.capacity > 0 && self.entries.len() == self.capacity {
      self.entries.pop_front();
    }
    self.entries.push_back(entry);
  }

  pub fn entries(&self) -> Vec<LogEntry> {
    self.entries.iter().cloned().collect()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn clear(&mut self) {
    self.entries.clear();
  }
}
