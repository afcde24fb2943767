use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_INDEX_VAR: &str = "loop_index";
pub const DEFAULT_ITEM_VAR: &str = "loop_item";

/// How a loop decides whether to run another iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopKind {
  /// `count` iterations, index `0..count`.
  Count,
  /// `start..=end` stepping by `step`.
  Range,
  /// Until the condition evaluates false.
  While,
  /// Once per element of a list.
  Foreach,
}

impl LoopKind {
  pub fn parse(kind: &str) -> Option<Self> {
    match kind.trim().to_ascii_lowercase().as_str() {
      "count" | "times" => Some(Self::Count),
      "range" => Some(Self::Range),
      "while" => Some(Self::While),
      "foreach" | "for_each" => Some(Self::Foreach),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Count => "count",
      Self::Range => "range",
      Self::While => "while",
      Self::Foreach => "foreach",
    }
  }
}

/// Descriptor returned by the `loop` and `foreach` modules. The loop driver
/// builds a [`LoopFrame`] from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopSpec {
  pub kind: LoopKind,
  pub index_var: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub item_var: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub count: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub start: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub end: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub step: Option<i64>,
  /// Unresolved condition, re-evaluated before every `while` iteration.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub condition: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub items: Option<Vec<Value>>,
  /// Safety cap for `while` loops.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_iterations: Option<u64>,
}

impl LoopSpec {
  pub fn count(count: i64) -> Self {
    Self {
      count: Some(count),
      ..Self::empty(LoopKind::Count)
    }
  }

  pub fn range(start: i64, end: i64, step: i64) -> Self {
    Self {
      start: Some(start),
      end: Some(end),
      step: Some(step),
      ..Self::empty(LoopKind::Range)
    }
  }

  pub fn while_condition(condition: impl Into<String>, max_iterations: u64) -> Self {
    Self {
      condition: Some(condition.into()),
      max_iterations: Some(max_iterations),
      ..Self::empty(LoopKind::While)
    }
  }

  pub fn foreach(items: Vec<Value>) -> Self {
    Self {
      item_var: Some(DEFAULT_ITEM_VAR.to_string()),
      items: Some(items),
      ..Self::empty(LoopKind::Foreach)
    }
  }

  pub fn with_index_var(mut self, name: impl Into<String>) -> Self {
    self.index_var = name.into();
    self
  }

  pub fn with_item_var(mut self, name: impl Into<String>) -> Self {
    self.item_var = Some(name.into());
    self
  }

  fn empty(kind: LoopKind) -> Self {
    Self {
      kind,
      index_var: DEFAULT_INDEX_VAR.to_string(),
      item_var: None,
      count: None,
      start: None,
      end: None,
      step: None,
      condition: None,
      items: None,
      max_iterations: None,
    }
  }
}

/// A live loop on the context's loop stack.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopFrame {
  pub node_id: String,
  pub kind: LoopKind,
  pub index_var: String,
  pub item_var: Option<String>,
  /// Zero-based number of the running iteration.
  pub current_index: u64,
  pub count: Option<i64>,
  pub start: Option<i64>,
  pub end: Option<i64>,
  pub step: Option<i64>,
  pub condition: Option<String>,
  pub data: Option<Vec<Value>>,
}

impl LoopFrame {
  pub fn new(node_id: impl Into<String>, spec: &LoopSpec) -> Self {
    Self {
      node_id: node_id.into(),
      kind: spec.kind,
      index_var: spec.index_var.clone(),
      item_var: spec.item_var.clone(),
      current_index: 0,
      count: spec.count,
      start: spec.start,
      end: spec.end,
      step: spec.step,
      condition: spec.condition.clone(),
      data: spec.items.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_parse_kind() {
    assert_eq!(LoopKind::parse("Count"), Some(LoopKind::Count));
    assert_eq!(LoopKind::parse("for_each"), Some(LoopKind::Foreach));
    assert_eq!(LoopKind::parse("until"), None);
  }

  #[test]
  fn test_foreach_defaults() {
    let spec = LoopSpec::foreach(vec![json!(1)]);
    assert_eq!(spec.index_var, DEFAULT_INDEX_VAR);
    assert_eq!(spec.item_var.as_deref(), Some(DEFAULT_ITEM_VAR));

    let frame = LoopFrame::new("l1", &spec.with_item_var("row"));
    assert_eq!(frame.item_var.as_deref(), Some("row"));
    assert_eq!(frame.data, Some(vec![json!(1)]));
    assert_eq!(frame.current_index, 0);
  }
}
