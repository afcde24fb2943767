use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::log::LogLevel;
use crate::loops::LoopSpec;

/// Outcome of one module invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleResult {
  pub success: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data: Option<Value>,
  /// Outgoing handle label to follow instead of the default edges.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub branch: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub log_level: Option<LogLevel>,
  /// Filled in by the scheduler.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub duration_ms: Option<u64>,
  /// Request for the scheduler to drive a loop or call a subflow.
  #[serde(skip)]
  pub control: Option<Control>,
}

/// Work a module hands back to the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
  Loop(LoopSpec),
  Subflow { target: String },
}

impl ModuleResult {
  pub fn ok() -> Self {
    Self {
      success: true,
      ..Default::default()
    }
  }

  pub fn ok_with(message: impl Into<String>) -> Self {
    Self::ok().with_message(message)
  }

  pub fn failure(error: impl Into<String>) -> Self {
    Self {
      success: false,
      error: Some(error.into()),
      log_level: Some(LogLevel::Error),
      ..Default::default()
    }
  }

  pub fn with_message(mut self, message: impl Into<String>) -> Self {
    self.message = Some(message.into());
    self
  }

  pub fn with_data(mut self, data: Value) -> Self {
    self.data = Some(data);
    self
  }

  pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
    self.branch = Some(branch.into());
    self
  }

  pub fn with_log_level(mut self, level: LogLevel) -> Self {
    self.log_level = Some(level);
    self
  }

  pub fn with_control(mut self, control: Control) -> Self {
    self.control = Some(control);
    self
  }

  /// Text shown in the run log: the error for failures, else the message.
  pub fn summary(&self) -> Option<&str> {
    if self.success {
      self.message.as_deref()
    } else {
      self.error.as_deref().or(self.message.as_deref())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_failure_defaults() {
    let result = ModuleResult::failure("boom");
    assert!(!result.success);
    assert_eq!(result.summary(), Some("boom"));
    assert_eq!(result.log_level, Some(LogLevel::Error));
  }

  #[test]
  fn test_control_not_serialized() {
    let result = ModuleResult::ok()
      .with_branch("true")
      .with_control(Control::Subflow { target: "s".into() });
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json, json!({ "success": true, "branch": "true" }));
  }
}
