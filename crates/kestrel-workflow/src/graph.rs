use std::collections::{HashMap, HashSet, VecDeque};

use kestrel_config::{NodeDef, WorkflowDef};

use crate::branch::BranchClass;
use crate::subflow::Subflow;
use crate::{GROUP_TYPE, LOOP_TYPES, SUBFLOW_CALL_TYPE, SUBFLOW_HEADER_TYPE};

/// How the scheduler treats a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
  /// Ordinary module invocation.
  Task,
  /// `loop` / `foreach`: the module produces a descriptor, the loop driver
  /// runs the body.
  Loop,
  /// `subflow`: the module names a target, the subflow runner executes it.
  SubflowCall,
  /// Visual container; never executed.
  Group,
  /// Marks the start of a headered subflow; never executed.
  SubflowHeader,
}

impl NodeKind {
  pub fn of(node_type: &str) -> Self {
    if LOOP_TYPES.contains(&node_type) {
      Self::Loop
    } else if node_type == SUBFLOW_CALL_TYPE {
      Self::SubflowCall
    } else if node_type == GROUP_TYPE {
      Self::Group
    } else if node_type == SUBFLOW_HEADER_TYPE {
      Self::SubflowHeader
    } else {
      Self::Task
    }
  }

  /// Structural nodes shape the graph but never run.
  pub fn is_structural(&self) -> bool {
    matches!(self, Self::Group | Self::SubflowHeader)
  }
}

/// A classified edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
  pub source: String,
  pub target: String,
  pub class: BranchClass,
  /// Raw source handle label as authored.
  pub handle: Option<String>,
  /// Edge from a loop body back into its own loop node. Ignored by the join
  /// rule and by start-node detection.
  pub back_edge: bool,
  /// Condition edge replaced by a later edge of the same class. Never taken,
  /// but still feeds start detection and skip propagation.
  pub superseded: bool,
}

/// Branch targets of a condition node. At most one per class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionBranches {
  pub on_true: Option<String>,
  pub on_false: Option<String>,
}

/// Branch targets of a loop node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopBranches {
  pub body: Vec<String>,
  pub done: Vec<String>,
}

/// Nodes a loop re-runs on every iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyClosure {
  /// Transitive closure over body edges, in definition order.
  pub body: Vec<String>,
  /// Error handlers hanging off body nodes (and what they lead to).
  pub errors: Vec<String>,
}

impl BodyClosure {
  /// Every node scheduled inside one iteration.
  pub fn members(&self) -> HashSet<String> {
    self.body.iter().chain(self.errors.iter()).cloned().collect()
  }

  pub fn is_empty(&self) -> bool {
    self.body.is_empty()
  }
}

/// The compiled, immutable execution graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionGraph {
  pub(crate) workflow: WorkflowDef,
  pub(crate) index: HashMap<String, usize>,
  pub(crate) kinds: HashMap<String, NodeKind>,
  pub(crate) outgoing: HashMap<String, Vec<GraphEdge>>,
  pub(crate) incoming: HashMap<String, Vec<GraphEdge>>,
  pub(crate) conditions: HashMap<String, ConditionBranches>,
  pub(crate) loops: HashMap<String, LoopBranches>,
  pub(crate) errors: HashMap<String, Vec<String>>,
  pub(crate) start_nodes: Vec<String>,
  pub(crate) subflows: Vec<Subflow>,
  pub(crate) subflow_members: HashSet<String>,
}

impl ExecutionGraph {
  /// The definition this graph was compiled from.
  pub fn workflow(&self) -> &WorkflowDef {
    &self.workflow
  }

  /// Get a node by id.
  pub fn node(&self, node_id: &str) -> Option<&NodeDef> {
    self.index.get(node_id).map(|i| &self.workflow.nodes[*i])
  }

  /// Node ids in definition order.
  pub fn node_ids(&self) -> impl Iterator<Item = &str> {
    self.workflow.nodes.iter().map(|n| n.id.as_str())
  }

  pub fn len(&self) -> usize {
    self.workflow.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.workflow.nodes.is_empty()
  }

  pub fn kind(&self, node_id: &str) -> NodeKind {
    self.kinds.get(node_id).copied().unwrap_or(NodeKind::Task)
  }

  /// Nodes that can execute (everything but groups and subflow headers).
  pub fn executable_count(&self) -> usize {
    self.kinds.values().filter(|k| !k.is_structural()).count()
  }

  pub fn outgoing(&self, node_id: &str) -> &[GraphEdge] {
    self
      .outgoing
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  pub fn incoming(&self, node_id: &str) -> &[GraphEdge] {
    self
      .incoming
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Distinct downstream node ids.
  pub fn next(&self, node_id: &str) -> Vec<&str> {
    dedup(self.outgoing(node_id).iter().map(|e| e.target.as_str()))
  }

  /// Distinct upstream node ids.
  pub fn prev(&self, node_id: &str) -> Vec<&str> {
    dedup(self.incoming(node_id).iter().map(|e| e.source.as_str()))
  }

  /// Distinct targets of one edge class.
  pub fn targets(&self, node_id: &str, class: BranchClass) -> Vec<&str> {
    dedup(
      self
        .outgoing(node_id)
        .iter()
        .filter(|e| e.class == class && !e.superseded)
        .map(|e| e.target.as_str()),
    )
  }

  /// Targets selected by a module's `branch` result.
  ///
  /// Raw handle labels win, so modules may route on arbitrary labels. When no
  /// edge carries the label, the label's branch class is used.
  pub fn targets_for_branch(&self, node_id: &str, branch: &str) -> Vec<&str> {
    let exact = dedup(
      self
        .outgoing(node_id)
        .iter()
        .filter(|e| e.handle.as_deref() == Some(branch) && !e.superseded)
        .map(|e| e.target.as_str()),
    );
    if !exact.is_empty() {
      return exact;
    }
    self.targets(node_id, BranchClass::from_handle(Some(branch)))
  }

  pub fn condition_branches(&self, node_id: &str) -> Option<&ConditionBranches> {
    self.conditions.get(node_id)
  }

  pub fn loop_branches(&self, node_id: &str) -> Option<&LoopBranches> {
    self.loops.get(node_id)
  }

  pub fn error_targets(&self, node_id: &str) -> &[String] {
    self
      .errors
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  pub fn has_error_branch(&self, node_id: &str) -> bool {
    !self.error_targets(node_id).is_empty()
  }

  /// Predecessors the join rule waits for: sources of non-error edges that
  /// are not loop back-edges.
  pub fn join_predecessors(&self, node_id: &str) -> Vec<&str> {
    dedup(
      self
        .incoming(node_id)
        .iter()
        .filter(|e| e.class != BranchClass::Error && !e.back_edge)
        .map(|e| e.source.as_str()),
    )
  }

  /// Sources that reach `node_id` only through error edges. A guarded node
  /// that finishes without failing tells its handler to stand down, so the
  /// handler's join waits for these too before it can be skipped.
  pub fn error_predecessors(&self, node_id: &str) -> Vec<&str> {
    let joins = self.join_predecessors(node_id);
    dedup(
      self
        .incoming(node_id)
        .iter()
        .filter(|e| e.class == BranchClass::Error && !e.back_edge)
        .map(|e| e.source.as_str())
        .filter(|source| !joins.contains(source)),
    )
  }

  /// Start nodes of the main flow.
  pub fn start_nodes(&self) -> &[String] {
    &self.start_nodes
  }

  pub fn subflows(&self) -> &[Subflow] {
    &self.subflows
  }

  pub fn is_subflow_member(&self, node_id: &str) -> bool {
    self.subflow_members.contains(node_id)
  }

  /// Locate a subflow by name first, then by the id of its group/header node.
  pub fn find_subflow(&self, target: &str) -> Option<&Subflow> {
    self
      .subflows
      .iter()
      .find(|s| s.name == target)
      .or_else(|| self.subflows.iter().find(|s| s.id == target))
  }

  /// Nodes the main flow may schedule.
  pub fn main_members(&self) -> HashSet<String> {
    self
      .node_ids()
      .filter(|id| !self.kind(id).is_structural() && !self.is_subflow_member(id))
      .map(str::to_string)
      .collect()
  }

  /// Candidates with no incoming edge (of any class, back-edges aside) from
  /// inside `members`, in definition order.
  pub fn local_start_nodes<'a>(
    &self,
    candidates: impl IntoIterator<Item = &'a String>,
    members: &HashSet<String>,
  ) -> Vec<String> {
    candidates
      .into_iter()
      .filter(|id| {
        !self
          .incoming(id)
          .iter()
          .any(|e| !e.back_edge && members.contains(&e.source))
      })
      .cloned()
      .collect()
  }

  /// Compute the body closure of a loop node.
  ///
  /// The body is everything reachable from the loop's body targets over
  /// non-error edges, never re-entering the loop node itself. Error handlers
  /// of body nodes, and everything they lead to, are collected separately.
  pub fn body_closure(&self, loop_id: &str) -> BodyClosure {
    let seeds = self
      .loops
      .get(loop_id)
      .map(|b| b.body.clone())
      .unwrap_or_default();

    let mut body: HashSet<String> = HashSet::new();
    let mut error_seeds: Vec<String> = Vec::new();
    let mut queue: VecDeque<String> = seeds.into_iter().filter(|s| s != loop_id).collect();

    while let Some(id) = queue.pop_front() {
      if !body.insert(id.clone()) {
        continue;
      }
      for edge in self.outgoing(&id) {
        if edge.target == loop_id {
          continue;
        }
        if edge.class == BranchClass::Error {
          error_seeds.push(edge.target.clone());
        } else if !body.contains(&edge.target) {
          queue.push_back(edge.target.clone());
        }
      }
    }

    let mut errors: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = error_seeds.into_iter().collect();
    while let Some(id) = queue.pop_front() {
      if id == loop_id || body.contains(&id) || !errors.insert(id.clone()) {
        continue;
      }
      for edge in self.outgoing(&id) {
        queue.push_back(edge.target.clone());
      }
    }

    BodyClosure {
      body: self.in_definition_order(&body),
      errors: self.in_definition_order(&errors),
    }
  }

  pub(crate) fn in_definition_order(&self, set: &HashSet<String>) -> Vec<String> {
    self
      .node_ids()
      .filter(|id| set.contains(*id))
      .map(str::to_string)
      .collect()
  }
}

fn dedup<'a>(iter: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
  let mut seen = HashSet::new();
  iter.filter(|id| seen.insert(*id)).collect()
}
