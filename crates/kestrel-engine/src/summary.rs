use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use kestrel_context::RunStatus;
use serde::{Deserialize, Serialize};

/// Scheduling state of a node, as last observed in the run.
///
/// Loop bodies reset their nodes to `Pending` on every iteration, so the
/// state of a body node reflects its latest iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
  Pending,
  Executing,
  Executed,
  Failed,
  Skipped,
  Cancelled,
}

/// Outcome of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
  pub execution_id: String,
  pub status: RunStatus,
  /// Nodes that can execute (groups and subflow headers excluded).
  pub total_nodes: usize,
  /// Distinct nodes that completed at least once.
  pub executed_nodes: usize,
  /// Distinct nodes that failed without an error branch to recover them.
  pub failed_nodes: usize,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error_message: Option<String>,
  pub started_at: DateTime<Utc>,
  pub completed_at: DateTime<Utc>,
  pub duration_ms: u64,
}

impl RunSummary {
  pub fn is_success(&self) -> bool {
    self.status == RunStatus::Completed
  }
}

/// Per-run bookkeeping shared by every scope.
#[derive(Debug, Default)]
pub(crate) struct RunTracker {
  states: HashMap<String, NodeState>,
  executed: HashSet<String>,
  failed: HashSet<String>,
  first_error: Option<String>,
}

impl RunTracker {
  pub(crate) fn set_state(&mut self, node_id: &str, state: NodeState) {
    self.states.insert(node_id.to_string(), state);
  }

  pub(crate) fn state(&self, node_id: &str) -> Option<NodeState> {
    self.states.get(node_id).copied()
  }

  pub(crate) fn states(&self) -> HashMap<String, NodeState> {
    self.states.clone()
  }

  pub(crate) fn record_executed(&mut self, node_id: &str, success: bool) {
    self.executed.insert(node_id.to_string());
    let state = if success {
      NodeState::Executed
    } else {
      NodeState::Failed
    };
    self.set_state(node_id, state);
  }

  /// A failure nothing recovered from.
  pub(crate) fn record_unrecovered(&mut self, node_id: &str, message: String) {
    self.failed.insert(node_id.to_string());
    if self.first_error.is_none() {
      self.first_error = Some(message);
    }
  }

  pub(crate) fn executed_count(&self) -> usize {
    self.executed.len()
  }

  pub(crate) fn failed_count(&self) -> usize {
    self.failed.len()
  }

  pub(crate) fn first_error(&self) -> Option<String> {
    self.first_error.clone()
  }
}
