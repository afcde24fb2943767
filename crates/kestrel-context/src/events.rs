//! Execution events and notifiers for observability.
//!
//! Events are emitted during workflow execution to allow consumers to observe
//! progress, stream rows to a preview table, mirror logs to a UI, etc.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::log::{LogEntry, LogLevel};
use crate::result::ModuleResult;

/// Final state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
  Completed,
  Failed,
  Stopped,
}

impl RunStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Completed => "completed",
      Self::Failed => "failed",
      Self::Stopped => "stopped",
    }
  }
}

/// Events emitted during workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
  /// Workflow execution has started.
  WorkflowStarted {
    execution_id: String,
    workflow: String,
    total_nodes: usize,
  },

  /// A node has started executing.
  NodeStarted { execution_id: String, node_id: String },

  /// A node has finished, successfully or not.
  NodeCompleted {
    execution_id: String,
    node_id: String,
    result: ModuleResult,
  },

  /// A node will not run in this pass: disabled or on an untaken branch.
  NodeSkipped { execution_id: String, node_id: String },

  /// A user-visible log entry.
  Log { execution_id: String, entry: LogEntry },

  /// A variable was written.
  VariableUpdated {
    execution_id: String,
    name: String,
    value: Value,
  },

  /// A data row was committed (only the first rows, up to the preview cap).
  DataRow {
    execution_id: String,
    row: Map<String, Value>,
  },

  /// Free-form progress message.
  Progress {
    execution_id: String,
    message: String,
    level: LogLevel,
  },

  /// Workflow execution has finished.
  WorkflowFinished {
    execution_id: String,
    status: RunStatus,
    executed_nodes: usize,
    failed_nodes: usize,
  },
}

/// Trait for receiving execution events.
///
/// The engine calls `notify` from whichever task produced the event.
/// Implementations must not block. A panicking notifier is caught and logged;
/// it never aborts the run.
pub trait ExecutionNotifier: Send + Sync {
  /// Called when an execution event occurs.
  fn notify(&self, event: ExecutionEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// A notifier that sends events to an unbounded channel.
///
/// The channel is unbounded: `notify` never waits on the consumer.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }

  /// Create a notifier together with its receiving end.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self::new(tx), rx)
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Ignore send errors - receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
