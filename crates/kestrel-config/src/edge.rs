use serde::{Deserialize, Serialize};

/// A directed edge between two nodes.
///
/// `source_handle` is the label of the output port the edge leaves from
/// (`"true"`, `"body"`, `"error"`, ...). The compiler derives the branch
/// class from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDef {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  pub source: String,
  pub target: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source_handle: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub target_handle: Option<String>,
}

impl EdgeDef {
  /// Plain edge without handle labels.
  pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
    Self {
      id: None,
      source: source.into(),
      target: target.into(),
      source_handle: None,
      target_handle: None,
    }
  }

  /// Edge leaving from a labelled source handle.
  pub fn with_handle(
    source: impl Into<String>,
    target: impl Into<String>,
    handle: impl Into<String>,
  ) -> Self {
    Self {
      source_handle: Some(handle.into()),
      ..Self::new(source, target)
    }
  }
}
