use serde::{Deserialize, Serialize};

/// Semantic category of an outgoing edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchClass {
  Default,
  ConditionTrue,
  ConditionFalse,
  LoopBody,
  LoopDone,
  Error,
}

impl BranchClass {
  /// Classify a source handle label. Labels are matched exactly; anything
  /// unrecognised (including no label) is a default edge.
  pub fn from_handle(handle: Option<&str>) -> Self {
    match handle {
      Some("true") => Self::ConditionTrue,
      Some("false") => Self::ConditionFalse,
      Some("body") | Some("loop") => Self::LoopBody,
      Some("done") | Some("exit") => Self::LoopDone,
      Some("error") | Some("catch") => Self::Error,
      _ => Self::Default,
    }
  }

  /// Whether the handle label is one of the recognised branch labels.
  pub fn is_recognized(handle: &str) -> bool {
    Self::from_handle(Some(handle)) != Self::Default
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Default => "default",
      Self::ConditionTrue => "true",
      Self::ConditionFalse => "false",
      Self::LoopBody => "body",
      Self::LoopDone => "done",
      Self::Error => "error",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_handle_vocabulary() {
    assert_eq!(BranchClass::from_handle(Some("true")), BranchClass::ConditionTrue);
    assert_eq!(BranchClass::from_handle(Some("false")), BranchClass::ConditionFalse);
    assert_eq!(BranchClass::from_handle(Some("body")), BranchClass::LoopBody);
    assert_eq!(BranchClass::from_handle(Some("loop")), BranchClass::LoopBody);
    assert_eq!(BranchClass::from_handle(Some("done")), BranchClass::LoopDone);
    assert_eq!(BranchClass::from_handle(Some("exit")), BranchClass::LoopDone);
    assert_eq!(BranchClass::from_handle(Some("error")), BranchClass::Error);
    assert_eq!(BranchClass::from_handle(Some("catch")), BranchClass::Error);
  }

  #[test]
  fn test_unknown_labels_are_default() {
    assert_eq!(BranchClass::from_handle(None), BranchClass::Default);
    assert_eq!(BranchClass::from_handle(Some("output")), BranchClass::Default);
    assert_eq!(BranchClass::from_handle(Some("TRUE")), BranchClass::Default);
    assert_eq!(BranchClass::from_handle(Some("")), BranchClass::Default);
    assert!(!BranchClass::is_recognized("case1"));
    assert!(BranchClass::is_recognized("catch"));
  }
}
