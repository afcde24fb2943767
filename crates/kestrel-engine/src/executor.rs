//! Workflow executor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use kestrel_config::WorkflowDef;
use kestrel_context::{
  BrowserSession, ExecutionContext, ExecutionEvent, ExecutionNotifier, LogEntry, LogLevel, RunStatus,
};
use kestrel_module::ModuleRegistry;
use kestrel_workflow::{ExecutionGraph, compile};
use serde_json::{Map, Value};
use tracing::{error, info, instrument, warn};

use crate::config::ExecutorConfig;
use crate::error::EngineError;
use crate::scheduler::{Scope, Shared, run_scope};
use crate::summary::{NodeState, RunSummary, RunTracker};

/// Runs one workflow once.
///
/// The workflow is compiled up front, so an invalid graph is reported by
/// [`WorkflowExecutor::new`] before anything executes. `execute` may be
/// awaited while another task holds a [`StopHandle`].
pub struct WorkflowExecutor {
  shared: Arc<Shared>,
  preserve_browser: bool,
  overrides: Vec<(String, Value)>,
  started: AtomicBool,
  browser: Mutex<Option<Arc<dyn BrowserSession>>>,
}

impl WorkflowExecutor {
  /// Compile a workflow and prepare its execution context.
  ///
  /// # Errors
  /// Returns [`EngineError::InvalidGraph`] if the workflow does not compile.
  pub fn new(
    workflow: &WorkflowDef,
    registry: Arc<ModuleRegistry>,
    config: ExecutorConfig,
    notifier: Arc<dyn ExecutionNotifier>,
  ) -> Result<Self, EngineError> {
    let graph = compile(workflow)?;
    let execution_id = uuid::Uuid::new_v4().to_string();
    let ctx = Arc::new(ExecutionContext::new(
      execution_id,
      notifier,
      config.context_options(),
    ));

    let shared = Shared {
      graph,
      registry,
      policy: config.effective_policy(),
      cancel: ctx.cancellation_token(),
      ctx,
      grace: config.stop_grace_period,
      max_subflow_depth: config.max_subflow_depth,
      tracker: Mutex::new(RunTracker::default()),
    };

    Ok(Self {
      shared: Arc::new(shared),
      preserve_browser: config.preserve_browser,
      overrides: Vec::new(),
      started: AtomicBool::new(false),
      browser: Mutex::new(None),
    })
  }

  /// Variables applied on top of the workflow's own when the run starts.
  pub fn with_variables(mut self, variables: impl IntoIterator<Item = (String, Value)>) -> Self {
    self.overrides.extend(variables);
    self
  }

  pub fn execution_id(&self) -> &str {
    self.shared.ctx.execution_id()
  }

  pub fn graph(&self) -> &ExecutionGraph {
    &self.shared.graph
  }

  /// The run's shared context.
  pub fn context(&self) -> Arc<ExecutionContext> {
    self.shared.ctx.clone()
  }

  /// Execute the workflow to completion, failure or stop.
  ///
  /// Errors never escape: every node failure is routed and counted, and the
  /// outcome is reported in the returned summary. An executor runs once; a
  /// second call reports a failed run without executing anything.
  #[instrument(
    name = "workflow_execute",
    skip(self),
    fields(
      execution_id = %self.execution_id(),
      workflow = %self.shared.graph.workflow().display_name(),
    )
  )]
  pub async fn execute(&self) -> RunSummary {
    let started_at = Utc::now();
    let clock = Instant::now();
    let ctx = &self.shared.ctx;

    if self.started.swap(true, Ordering::SeqCst) {
      warn!(execution_id = %ctx.execution_id(), "executor_already_ran");
      return self.summary(
        RunStatus::Failed,
        Some("workflow executor has already run".to_string()),
        started_at,
        clock,
      );
    }

    let workflow = self.shared.graph.workflow();
    let total_nodes = self.shared.graph.executable_count();
    info!(
      execution_id = %ctx.execution_id(),
      workflow = %workflow.display_name(),
      total_nodes = total_nodes,
      "workflow_started"
    );
    ctx.emit(ExecutionEvent::WorkflowStarted {
      execution_id: ctx.execution_id().to_string(),
      workflow: workflow.display_name().to_string(),
      total_nodes,
    });
    ctx.log(
      LogLevel::Info,
      format!("workflow '{}' started", workflow.display_name()),
    );

    for variable in &workflow.variables {
      ctx.set(variable.name.clone(), variable.value.clone());
    }
    for (name, value) in &self.overrides {
      ctx.set(name.clone(), value.clone());
    }

    let outcome = run_scope(self.shared.clone(), Scope::main(&self.shared.graph)).await;
    let cancelled = outcome.cancelled || self.shared.cancel.is_cancelled();

    let browser = ctx.release_handles(self.preserve_browser).await;
    *self.browser.lock().unwrap_or_else(|e| e.into_inner()) = browser;

    let (failed_nodes, first_error) = {
      let tracker = self.shared.tracker();
      (tracker.failed_count(), tracker.first_error())
    };
    let (status, error_message) = if cancelled {
      (RunStatus::Stopped, None)
    } else if failed_nodes > 0 {
      (RunStatus::Failed, first_error)
    } else {
      (RunStatus::Completed, None)
    };

    let summary = self.summary(status, error_message, started_at, clock);
    self.finish(&summary);
    summary
  }

  fn summary(
    &self,
    status: RunStatus,
    error_message: Option<String>,
    started_at: DateTime<Utc>,
    clock: Instant,
  ) -> RunSummary {
    let tracker = self.shared.tracker();
    RunSummary {
      execution_id: self.execution_id().to_string(),
      status,
      total_nodes: self.shared.graph.executable_count(),
      executed_nodes: tracker.executed_count(),
      failed_nodes: tracker.failed_count(),
      error_message,
      started_at,
      completed_at: Utc::now(),
      duration_ms: clock.elapsed().as_millis() as u64,
    }
  }

  fn finish(&self, summary: &RunSummary) {
    let ctx = &self.shared.ctx;
    let name = self.shared.graph.workflow().display_name();

    let entry = match summary.status {
      RunStatus::Completed => {
        info!(
          execution_id = %summary.execution_id,
          executed_nodes = summary.executed_nodes,
          duration_ms = summary.duration_ms,
          "workflow_completed"
        );
        LogEntry::new(LogLevel::Success, format!("workflow '{name}' completed"))
      }
      RunStatus::Failed => {
        error!(
          execution_id = %summary.execution_id,
          failed_nodes = summary.failed_nodes,
          error = %summary.error_message.as_deref().unwrap_or_default(),
          "workflow_failed"
        );
        LogEntry::new(
          LogLevel::Error,
          format!(
            "workflow '{name}' failed: {} node(s) failed",
            summary.failed_nodes
          ),
        )
      }
      RunStatus::Stopped => {
        warn!(execution_id = %summary.execution_id, "workflow_stopped");
        LogEntry::new(LogLevel::Warning, format!("workflow '{name}' stopped"))
      }
    };
    ctx.push_log(entry.with_duration(summary.duration_ms));

    ctx.emit(ExecutionEvent::WorkflowFinished {
      execution_id: summary.execution_id.clone(),
      status: summary.status,
      executed_nodes: summary.executed_nodes,
      failed_nodes: summary.failed_nodes,
    });
  }

  /// Stop the run. Edge-triggered and idempotent; safe to call before,
  /// during or after `execute`.
  pub fn stop(&self) {
    self.stop_handle().stop();
  }

  /// A cloneable handle that stops this run from another task.
  pub fn stop_handle(&self) -> StopHandle {
    StopHandle {
      ctx: self.shared.ctx.clone(),
    }
  }

  /// Every committed data row, in commit order.
  pub fn get_collected_data(&self) -> Vec<Map<String, Value>> {
    self.shared.ctx.get_collected_data()
  }

  pub fn logs(&self) -> Vec<LogEntry> {
    self.shared.ctx.logs()
  }

  pub fn variables(&self) -> HashMap<String, Value> {
    self.shared.ctx.variables()
  }

  pub fn node_state(&self, node_id: &str) -> Option<NodeState> {
    self.shared.tracker().state(node_id)
  }

  pub fn node_states(&self) -> HashMap<String, NodeState> {
    self.shared.tracker().states()
  }

  /// The browser left open by a run with `preserve_browser` set.
  pub fn take_browser(&self) -> Option<Arc<dyn BrowserSession>> {
    self.browser.lock().unwrap_or_else(|e| e.into_inner()).take()
  }
}

/// Stops a running workflow from any task or thread.
#[derive(Clone)]
pub struct StopHandle {
  ctx: Arc<ExecutionContext>,
}

impl StopHandle {
  pub fn stop(&self) {
    if !self.ctx.is_cancelled() {
      info!(execution_id = %self.ctx.execution_id(), "workflow_stop_requested");
    }
    self.ctx.stop();
  }

  pub fn is_stopped(&self) -> bool {
    self.ctx.is_cancelled()
  }
}
