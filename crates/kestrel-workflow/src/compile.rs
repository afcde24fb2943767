use std::collections::{HashMap, HashSet};

use kestrel_config::WorkflowDef;
use tracing::{debug, warn};

use crate::branch::BranchClass;
use crate::error::GraphError;
use crate::graph::{ConditionBranches, ExecutionGraph, GraphEdge, LoopBranches, NodeKind};
use crate::subflow;

/// Compile a workflow definition into an execution graph.
pub fn compile(workflow: &WorkflowDef) -> Result<ExecutionGraph, GraphError> {
  // Index nodes by id
  let mut index: HashMap<String, usize> = HashMap::with_capacity(workflow.nodes.len());
  let mut kinds: HashMap<String, NodeKind> = HashMap::with_capacity(workflow.nodes.len());
  for (i, node) in workflow.nodes.iter().enumerate() {
    if node.id.is_empty() {
      return Err(GraphError::EmptyNodeId { index: i });
    }
    if index.insert(node.id.clone(), i).is_some() {
      return Err(GraphError::DuplicateNode(node.id.clone()));
    }
    kinds.insert(node.id.clone(), NodeKind::of(&node.node_type));
  }

  // Classify edges by source handle
  let mut edges: Vec<GraphEdge> = Vec::with_capacity(workflow.edges.len());
  let mut condition_slots: HashMap<(String, BranchClass), usize> = HashMap::new();

  for edge in &workflow.edges {
    if !index.contains_key(&edge.source) || !index.contains_key(&edge.target) {
      return Err(GraphError::InvalidEdge {
        from: edge.source.clone(),
        to: edge.target.clone(),
      });
    }

    let class = BranchClass::from_handle(edge.source_handle.as_deref());

    // Condition classes hold a single target: last wins. The replaced edge
    // stays in the graph so its target is still skipped, never started.
    if matches!(class, BranchClass::ConditionTrue | BranchClass::ConditionFalse) {
      let slot = (edge.source.clone(), class);
      if let Some(previous) = condition_slots.insert(slot, edges.len()) {
        let dropped = &mut edges[previous];
        dropped.superseded = true;
        warn!(
          node_id = %edge.source,
          branch = class.as_str(),
          dropped_target = %dropped.target,
          kept_target = %edge.target,
          "condition branch has several targets, keeping the last"
        );
      }
    }

    edges.push(GraphEdge {
      source: edge.source.clone(),
      target: edge.target.clone(),
      class,
      handle: edge.source_handle.clone(),
      back_edge: false,
      superseded: false,
    });
  }

  let mut outgoing: HashMap<String, Vec<GraphEdge>> = HashMap::new();
  for edge in edges {
    outgoing.entry(edge.source.clone()).or_default().push(edge);
  }

  // Branch maps
  let mut conditions: HashMap<String, ConditionBranches> = HashMap::new();
  let mut loops: HashMap<String, LoopBranches> = HashMap::new();
  let mut errors: HashMap<String, Vec<String>> = HashMap::new();

  for (source, out) in &outgoing {
    for edge in out.iter().filter(|e| !e.superseded) {
      match edge.class {
        BranchClass::ConditionTrue => {
          conditions.entry(source.clone()).or_default().on_true = Some(edge.target.clone());
        }
        BranchClass::ConditionFalse => {
          conditions.entry(source.clone()).or_default().on_false = Some(edge.target.clone());
        }
        BranchClass::LoopBody => {
          push_unique(&mut loops.entry(source.clone()).or_default().body, &edge.target);
        }
        BranchClass::LoopDone => {
          push_unique(&mut loops.entry(source.clone()).or_default().done, &edge.target);
        }
        BranchClass::Error => {
          push_unique(errors.entry(source.clone()).or_default(), &edge.target);
        }
        BranchClass::Default => {}
      }
    }
  }

  let mut graph = ExecutionGraph {
    workflow: workflow.clone(),
    index,
    kinds,
    outgoing,
    incoming: HashMap::new(),
    conditions,
    loops,
    errors,
    start_nodes: Vec::new(),
    subflows: Vec::new(),
    subflow_members: HashSet::new(),
  };

  // Loop back-edges: body nodes wired back into their own loop node
  let loop_ids: Vec<String> = graph.loops.keys().cloned().collect();
  for loop_id in loop_ids {
    let closure = graph.body_closure(&loop_id);
    let body: HashSet<&String> = closure.body.iter().collect();
    for (source, out) in graph.outgoing.iter_mut() {
      let from_body = body.contains(source) || *source == loop_id;
      if !from_body {
        continue;
      }
      for edge in out.iter_mut().filter(|e| e.target == loop_id) {
        debug!(loop_id = %loop_id, source = %edge.source, "marking loop back-edge");
        edge.back_edge = true;
      }
    }
  }

  // Reverse adjacency, in definition order of the edges
  for edge in &workflow.edges {
    if let Some(classified) = graph
      .outgoing
      .get(&edge.source)
      .and_then(|out| {
        out.iter().find(|e| {
          e.target == edge.target && e.handle == edge.source_handle
        })
      })
      .cloned()
    {
      let incoming = graph.incoming.entry(edge.target.clone()).or_default();
      if !incoming.contains(&classified) {
        incoming.push(classified);
      }
    }
  }

  // Subflows are identified before start detection so their members can
  // be excluded from the main flow
  graph.subflows = subflow::identify(&graph.workflow, &graph.kinds, &graph.outgoing);
  graph.subflow_members = graph
    .subflows
    .iter()
    .flat_map(|s| s.members.iter().cloned())
    .collect();

  // Start nodes
  graph.start_nodes = graph
    .workflow
    .nodes
    .iter()
    .map(|n| n.id.as_str())
    .filter(|id| !graph.kind(id).is_structural())
    .filter(|id| !graph.is_subflow_member(id))
    .filter(|id| graph.incoming(id).iter().all(|e| e.back_edge))
    .map(str::to_string)
    .collect();

  debug!(
    nodes = graph.len(),
    start_nodes = ?graph.start_nodes,
    subflows = graph.subflows.len(),
    "workflow compiled"
  );

  Ok(graph)
}

fn push_unique(targets: &mut Vec<String>, target: &str) {
  if !targets.iter().any(|t| t == target) {
    targets.push(target.to_string());
  }
}
