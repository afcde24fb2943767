use serde::{Deserialize, Serialize};

/// An initial variable seeded into the execution context before a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDef {
  pub name: String,
  #[serde(default)]
  pub value: serde_json::Value,
}

impl VariableDef {
  pub fn new(name: impl Into<String>, value: serde_json::Value) -> Self {
    Self {
      name: name.into(),
      value,
    }
  }
}
