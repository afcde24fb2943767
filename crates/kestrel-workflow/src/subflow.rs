use std::collections::{HashMap, HashSet, VecDeque};

use kestrel_config::{NodeDef, WorkflowDef};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::graph::{GraphEdge, NodeKind};

/// How a subflow's members were identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubflowKind {
  /// A group node marked as subflow; members lie inside its bounding box.
  Grouped,
  /// A header node; members are everything reachable downstream of it.
  Headered,
}

/// A named, callable subset of the workflow's nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subflow {
  /// Id of the group or header node defining the subflow.
  pub id: String,
  pub name: String,
  pub kind: SubflowKind,
  /// Member node ids in definition order.
  pub members: Vec<String>,
}

impl Subflow {
  pub fn member_set(&self) -> HashSet<String> {
    self.members.iter().cloned().collect()
  }
}

pub(crate) fn identify(
  workflow: &WorkflowDef,
  kinds: &HashMap<String, NodeKind>,
  outgoing: &HashMap<String, Vec<GraphEdge>>,
) -> Vec<Subflow> {
  let mut subflows = Vec::new();

  for node in &workflow.nodes {
    match kinds.get(&node.id) {
      Some(NodeKind::Group) if is_truthy(node.data.get("isSubflow")) => {
        subflows.push(grouped(workflow, kinds, node));
      }
      Some(NodeKind::SubflowHeader) => {
        subflows.push(headered(workflow, kinds, outgoing, node));
      }
      _ => {}
    }
  }

  subflows
}

fn subflow_name(node: &NodeDef) -> String {
  node
    .data_str("subflowName")
    .filter(|s| !s.is_empty())
    .unwrap_or_else(|| node.label())
    .to_string()
}

fn grouped(workflow: &WorkflowDef, kinds: &HashMap<String, NodeKind>, group: &NodeDef) -> Subflow {
  let name = subflow_name(group);
  let (Some(width), Some(height)) = (group.width(), group.height()) else {
    warn!(group_id = %group.id, subflow = %name, "subflow group has no size, it has no members");
    return Subflow {
      id: group.id.clone(),
      name,
      kind: SubflowKind::Grouped,
      members: Vec::new(),
    };
  };

  let (left, top) = (group.position.x, group.position.y);
  let (right, bottom) = (left + width, top + height);

  let members = workflow
    .nodes
    .iter()
    .filter(|n| n.id != group.id)
    .filter(|n| !kinds.get(&n.id).is_some_and(|k| k.is_structural()))
    .filter(|n| {
      let p = n.position;
      p.x >= left && p.x <= right && p.y >= top && p.y <= bottom
    })
    .map(|n| n.id.clone())
    .collect();

  Subflow {
    id: group.id.clone(),
    name,
    kind: SubflowKind::Grouped,
    members,
  }
}

fn headered(
  workflow: &WorkflowDef,
  kinds: &HashMap<String, NodeKind>,
  outgoing: &HashMap<String, Vec<GraphEdge>>,
  header: &NodeDef,
) -> Subflow {
  let mut seen: HashSet<String> = HashSet::new();
  let mut queue: VecDeque<&str> = VecDeque::from([header.id.as_str()]);

  while let Some(id) = queue.pop_front() {
    for edge in outgoing.get(id).map(|v| v.as_slice()).unwrap_or(&[]) {
      let structural = kinds.get(&edge.target).is_some_and(|k| k.is_structural());
      if !structural && seen.insert(edge.target.clone()) {
        queue.push_back(edge.target.as_str());
      }
    }
  }

  let members = workflow
    .nodes
    .iter()
    .filter(|n| seen.contains(&n.id))
    .map(|n| n.id.clone())
    .collect();

  Subflow {
    id: header.id.clone(),
    name: subflow_name(header),
    kind: SubflowKind::Headered,
    members,
  }
}

fn is_truthy(value: Option<&Value>) -> bool {
  match value {
    Some(Value::Bool(b)) => *b,
    Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
    Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
    _ => false,
  }
}
