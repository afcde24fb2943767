use serde::{Deserialize, Serialize};

use crate::edge::EdgeDef;
use crate::node::NodeDef;
use crate::variable::VariableDef;

/// A workflow as authored in the editor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default)]
  pub nodes: Vec<NodeDef>,
  #[serde(default)]
  pub edges: Vec<EdgeDef>,
  #[serde(default)]
  pub variables: Vec<VariableDef>,
}

impl WorkflowDef {
  /// Display name, falling back to the id and then to `"workflow"`.
  pub fn display_name(&self) -> &str {
    self
      .name
      .as_deref()
      .or(self.id.as_deref())
      .unwrap_or("workflow")
  }

  /// Get a node by id.
  pub fn get_node(&self, node_id: &str) -> Option<&NodeDef> {
    self.nodes.iter().find(|n| n.id == node_id)
  }
}
