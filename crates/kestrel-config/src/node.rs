use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 2-D canvas position of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
  #[serde(default)]
  pub x: f64,
  #[serde(default)]
  pub y: f64,
}

impl Position {
  pub fn new(x: f64, y: f64) -> Self {
    Self { x, y }
  }
}

/// A node as authored in the editor.
///
/// `node_type` selects the module that runs the node. Everything the module
/// needs lives in the free-form `data` bag, alongside a few keys the engine
/// itself understands (`label`, `disabled`, `width`, `height`, `timeout`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  pub id: String,
  #[serde(rename = "type")]
  pub node_type: String,
  #[serde(default)]
  pub position: Position,
  #[serde(default)]
  pub data: Map<String, Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub style: Option<Map<String, Value>>,
}

impl NodeDef {
  pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      node_type: node_type.into(),
      position: Position::default(),
      data: Map::new(),
      style: None,
    }
  }

  /// Builder-style helper used heavily by tests and tooling.
  pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
    self.data.insert(key.into(), value);
    self
  }

  pub fn at(mut self, x: f64, y: f64) -> Self {
    self.position = Position::new(x, y);
    self
  }

  /// Human readable label, falling back to the node id.
  pub fn label(&self) -> &str {
    self
      .data
      .get("label")
      .and_then(|v| v.as_str())
      .filter(|s| !s.is_empty())
      .unwrap_or(&self.id)
  }

  /// Whether the node was disabled in the editor.
  pub fn is_disabled(&self) -> bool {
    match self.data.get("disabled") {
      Some(Value::Bool(b)) => *b,
      Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
      _ => false,
    }
  }

  /// Width of a group node, from `data.width` or `style.width`.
  pub fn width(&self) -> Option<f64> {
    self.dimension("width")
  }

  /// Height of a group node, from `data.height` or `style.height`.
  pub fn height(&self) -> Option<f64> {
    self.dimension("height")
  }

  /// String value from the data bag.
  pub fn data_str(&self, key: &str) -> Option<&str> {
    self.data.get(key).and_then(|v| v.as_str())
  }

  fn dimension(&self, key: &str) -> Option<f64> {
    self
      .data
      .get(key)
      .and_then(parse_dimension)
      .or_else(|| self.style.as_ref()?.get(key).and_then(parse_dimension))
  }
}

/// Dimensions come either as numbers or as CSS strings like `"240px"`.
fn parse_dimension(value: &Value) -> Option<f64> {
  match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().trim_end_matches("px").trim().parse().ok(),
    _ => None,
  }
}
