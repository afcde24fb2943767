use kestrel_config::NodeDef;
use kestrel_resolver::{Variables, parse_bool, parse_float, parse_int, resolve_config, to_display};
use serde_json::{Map, Value};

use crate::error::ModuleError;

/// A node's configuration as seen by its module.
///
/// `resolved` is the node's data bag with every `{name}` placeholder
/// substituted at dispatch time. `raw` keeps the authored values for modules
/// that re-evaluate them later (a `while` condition).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleConfig {
  pub node_id: String,
  pub node_type: String,
  pub label: String,
  pub resolved: Map<String, Value>,
  pub raw: Map<String, Value>,
}

impl ModuleConfig {
  /// Resolve a node's data bag against the current variables.
  pub fn from_node<V: Variables + ?Sized>(node: &NodeDef, vars: &V) -> Self {
    Self {
      node_id: node.id.clone(),
      node_type: node.node_type.clone(),
      label: node.label().to_string(),
      resolved: resolve_config(&node.data, vars),
      raw: node.data.clone(),
    }
  }

  /// Config whose raw and resolved maps are the same; for tests and tools.
  pub fn from_map(node_type: impl Into<String>, data: Map<String, Value>) -> Self {
    Self {
      node_id: String::new(),
      node_type: node_type.into(),
      label: String::new(),
      resolved: data.clone(),
      raw: data,
    }
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self.resolved.get(key)
  }

  pub fn raw(&self, key: &str) -> Option<&Value> {
    self.raw.get(key)
  }

  /// Scalar value as a string. Null and missing are `None`.
  pub fn str(&self, key: &str) -> Option<String> {
    match self.get(key)? {
      Value::Null => None,
      value => Some(to_display(value)),
    }
  }

  pub fn str_or(&self, key: &str, default: &str) -> String {
    self.str(key).unwrap_or_else(|| default.to_string())
  }

  /// Non-empty string or a `MissingField` error.
  pub fn require_str(&self, key: &str) -> Result<String, ModuleError> {
    self
      .str(key)
      .filter(|s| !s.trim().is_empty())
      .ok_or_else(|| ModuleError::MissingField {
        field: key.to_string(),
      })
  }

  pub fn opt_int(&self, key: &str) -> Option<i64> {
    self.get(key).and_then(parse_int)
  }

  pub fn int(&self, key: &str, default: i64) -> i64 {
    self.opt_int(key).unwrap_or(default)
  }

  pub fn float(&self, key: &str, default: f64) -> f64 {
    self.get(key).and_then(parse_float).unwrap_or(default)
  }

  pub fn bool(&self, key: &str, default: bool) -> bool {
    self.get(key).and_then(parse_bool).unwrap_or(default)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::collections::HashMap;

  #[test]
  fn test_from_node_resolves_and_keeps_raw() {
    let node = NodeDef::new("n1", "print_log")
      .with_data("label", json!("Say hi"))
      .with_data("message", json!("hi {name}"))
      .with_data("count", json!("{n}"));
    let vars = HashMap::from([
      ("name".to_string(), json!("ada")),
      ("n".to_string(), json!(4)),
    ]);

    let config = ModuleConfig::from_node(&node, &vars);
    assert_eq!(config.label, "Say hi");
    assert_eq!(config.str("message").as_deref(), Some("hi ada"));
    assert_eq!(config.raw("message"), Some(&json!("hi {name}")));
    assert_eq!(config.get("count"), Some(&json!(4)));
    assert_eq!(config.int("count", 0), 4);
  }

  #[test]
  fn test_accessors() {
    let data = json!({
      "s": "text",
      "n": "12",
      "f": "1.5",
      "b": "yes",
      "blank": "  ",
      "nothing": null,
    });
    let config = ModuleConfig::from_map("x", data.as_object().cloned().unwrap());

    assert_eq!(config.int("n", 0), 12);
    assert_eq!(config.int("s", 7), 7);
    assert_eq!(config.float("f", 0.0), 1.5);
    assert!(config.bool("b", false));
    assert!(config.bool("missing", true));
    assert_eq!(config.str("nothing"), None);
    assert_eq!(config.str_or("missing", "d"), "d");
    assert!(matches!(
      config.require_str("blank"),
      Err(ModuleError::MissingField { field }) if field == "blank"
    ));
    assert_eq!(config.require_str("s").unwrap(), "text");
  }
}
