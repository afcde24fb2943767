//! Parallel scheduler.
//!
//! A scope is a set of member nodes plus the nodes it starts from: the main
//! flow, one loop iteration, or one subflow call. A scope runs its ready nodes
//! as tasks on a `JoinSet` and routes every completion through the join rule:
//! a node becomes ready once each in-scope predecessor along a non-error edge
//! has signalled it. A signal either activates the successor (edge taken) or
//! skips it (edge not taken). A node reached only by skips is itself skipped
//! and passes the skip on, so joins behind untaken branches never stall.
//! Error handlers are skipped the same way once every node they guard has
//! finished without needing them.

use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::BoxFuture;
use kestrel_context::{Control, ExecutionContext, ExecutionEvent, LogEntry, LogLevel, ModuleResult};
use kestrel_module::{Module, ModuleConfig, ModuleError, ModuleRegistry, TIMEOUT_KEY, TimeoutPolicy};
use kestrel_workflow::{BranchClass, ExecutionGraph, NodeKind};
use serde_json::{Value, json};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::loops::drive_loop;
use crate::subflow::run_subflow;
use crate::summary::{NodeState, RunTracker};

/// Everything the scopes of one run share.
pub(crate) struct Shared {
  pub(crate) graph: ExecutionGraph,
  pub(crate) registry: Arc<ModuleRegistry>,
  pub(crate) policy: TimeoutPolicy,
  pub(crate) ctx: Arc<ExecutionContext>,
  pub(crate) cancel: CancellationToken,
  pub(crate) grace: Duration,
  pub(crate) max_subflow_depth: usize,
  pub(crate) tracker: Mutex<RunTracker>,
}

impl Shared {
  pub(crate) fn tracker(&self) -> MutexGuard<'_, RunTracker> {
    self.tracker.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn execution_id(&self) -> &str {
    self.ctx.execution_id()
  }

  fn label(&self, node_id: &str) -> String {
    self
      .graph
      .node(node_id)
      .map(|n| n.label().to_string())
      .unwrap_or_else(|| node_id.to_string())
  }
}

/// Where a scope sits: inside a loop body or not, and how many subflow calls
/// deep.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Nesting {
  pub(crate) in_loop: bool,
  pub(crate) depth: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct Scope {
  pub(crate) name: String,
  pub(crate) members: Arc<HashSet<String>>,
  pub(crate) starts: Vec<String>,
  pub(crate) nesting: Nesting,
}

impl Scope {
  pub(crate) fn main(graph: &ExecutionGraph) -> Self {
    Self {
      name: "main".to_string(),
      members: Arc::new(graph.main_members()),
      starts: graph.start_nodes().to_vec(),
      nesting: Nesting::default(),
    }
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ScopeOutcome {
  /// Failures in this scope (and in loop bodies below it) that no error
  /// branch recovered.
  pub(crate) unrecovered: usize,
  pub(crate) cancelled: bool,
}

struct NodeOutcome {
  result: ModuleResult,
  cancelled: bool,
  nested_unrecovered: usize,
}

impl NodeOutcome {
  fn finished(result: ModuleResult, nested_unrecovered: usize) -> Self {
    Self {
      result,
      cancelled: false,
      nested_unrecovered,
    }
  }

  fn cancelled() -> Self {
    Self {
      result: ModuleResult::failure("cancelled"),
      cancelled: true,
      nested_unrecovered: 0,
    }
  }
}

/// One predecessor's verdict on one successor, aggregated over every edge
/// between the two.
struct Signal {
  from: String,
  to: String,
  /// Only error edges connect the pair; such signals settle the handler
  /// side of the join, never the ordinary predecessors.
  error_only: bool,
  activate: bool,
}

#[derive(Debug, Default)]
struct Join {
  /// Ordinary predecessors still to report. The node never starts before
  /// these are settled.
  remaining: HashSet<String>,
  /// Guarded nodes still to report. Only needed to decide a skip.
  guarded: HashSet<String>,
  activated: bool,
}

/// Run a scope to completion. Boxed so loops and subflows can recurse.
pub(crate) fn run_scope(shared: Arc<Shared>, scope: Scope) -> BoxFuture<'static, ScopeOutcome> {
  async move { ScopeRun::new(shared, scope).run().await }.boxed()
}

struct ScopeRun {
  shared: Arc<Shared>,
  scope: Scope,
  joins: HashMap<String, Join>,
  /// Nodes already dispatched or skipped in this pass.
  done: HashSet<String>,
  in_flight: HashSet<String>,
  tasks: JoinSet<(String, NodeOutcome)>,
  queue: VecDeque<Signal>,
  outcome: ScopeOutcome,
}

impl ScopeRun {
  fn new(shared: Arc<Shared>, scope: Scope) -> Self {
    Self {
      shared,
      scope,
      joins: HashMap::new(),
      done: HashSet::new(),
      in_flight: HashSet::new(),
      tasks: JoinSet::new(),
      queue: VecDeque::new(),
      outcome: ScopeOutcome::default(),
    }
  }

  async fn run(mut self) -> ScopeOutcome {
    debug!(
      execution_id = %self.shared.execution_id(),
      scope = %self.scope.name,
      start_nodes = ?self.scope.starts,
      "scope_started"
    );

    for node_id in self.scope.starts.clone() {
      self.ready(&node_id);
    }
    self.drain_signals();

    let cancel = self.shared.cancel.clone();
    while !self.tasks.is_empty() {
      tokio::select! {
        biased;
        _ = cancel.cancelled() => {
          self.cancel_in_flight().await;
          break;
        }
        joined = self.tasks.join_next() => match joined {
          Some(Ok((node_id, outcome))) => {
            self.complete(node_id, outcome);
            self.drain_signals();
          }
          Some(Err(e)) => {
            error!(execution_id = %self.shared.execution_id(), error = %e, "node_task_aborted");
          }
          None => break,
        }
      }
    }

    // Tasks that died without reporting back.
    for node_id in std::mem::take(&mut self.in_flight) {
      if self.outcome.cancelled {
        self.shared.tracker().set_state(&node_id, NodeState::Cancelled);
      } else {
        self.outcome.unrecovered += 1;
        let message = format!("{}: node task panicked", self.shared.label(&node_id));
        let mut tracker = self.shared.tracker();
        tracker.record_executed(&node_id, false);
        tracker.record_unrecovered(&node_id, message);
      }
    }

    if cancel.is_cancelled() {
      self.outcome.cancelled = true;
    }

    debug!(
      execution_id = %self.shared.execution_id(),
      scope = %self.scope.name,
      unrecovered = self.outcome.unrecovered,
      cancelled = self.outcome.cancelled,
      "scope_finished"
    );
    self.outcome
  }

  /// A node's join is satisfied and at least one predecessor activated it.
  fn ready(&mut self, node_id: &str) {
    if !self.done.insert(node_id.to_string()) {
      return;
    }

    let shared = self.shared.clone();
    if shared.cancel.is_cancelled() {
      return;
    }
    if self.scope.nesting.in_loop && (shared.ctx.should_break() || shared.ctx.should_continue()) {
      debug!(execution_id = %shared.execution_id(), node_id = %node_id, "node_not_dispatched");
      return;
    }

    let Some(node) = shared.graph.node(node_id) else {
      return;
    };
    if shared.graph.kind(node_id).is_structural() {
      return;
    }
    if node.is_disabled() {
      self.mark_skipped(node_id, "disabled");
      let taken = self.success_targets(node_id, None);
      self.send_signals(node_id, &taken);
      return;
    }

    self.in_flight.insert(node_id.to_string());
    shared.tracker().set_state(node_id, NodeState::Executing);
    self
      .tasks
      .spawn(run_node(shared.clone(), node_id.to_string(), self.scope.nesting));
  }

  fn mark_skipped(&self, node_id: &str, reason: &str) {
    debug!(
      execution_id = %self.shared.execution_id(),
      node_id = %node_id,
      reason = %reason,
      "node_skipped"
    );
    self.shared.tracker().set_state(node_id, NodeState::Skipped);
    self.shared.ctx.emit(ExecutionEvent::NodeSkipped {
      execution_id: self.shared.execution_id().to_string(),
      node_id: node_id.to_string(),
    });
  }

  fn drain_signals(&mut self) {
    while let Some(signal) = self.queue.pop_front() {
      if !self.scope.members.contains(&signal.to) || self.done.contains(&signal.to) {
        continue;
      }

      let graph = &self.shared.graph;
      let members = &self.scope.members;
      let in_scope = |preds: Vec<&str>| -> HashSet<String> {
        preds
          .into_iter()
          .filter(|p| members.contains(*p))
          .map(str::to_string)
          .collect()
      };
      let join = self.joins.entry(signal.to.clone()).or_insert_with(|| Join {
        remaining: in_scope(graph.join_predecessors(&signal.to)),
        guarded: in_scope(graph.error_predecessors(&signal.to)),
        activated: false,
      });
      if signal.error_only {
        join.guarded.remove(&signal.from);
      } else {
        join.remaining.remove(&signal.from);
      }
      join.activated |= signal.activate;

      if !join.remaining.is_empty() {
        continue;
      }
      if join.activated {
        self.ready(&signal.to);
      } else if join.guarded.is_empty() {
        self.done.insert(signal.to.clone());
        self.mark_skipped(&signal.to, "untaken branch");
        self.send_signals(&signal.to, &HashSet::new());
      }
    }
  }

  /// Queue one signal per distinct successor: activate the ones in `taken`,
  /// skip the rest. Loop body edges belong to the loop driver and back-edges
  /// to the enclosing loop, so neither is signalled here.
  fn send_signals(&mut self, node_id: &str, taken: &HashSet<String>) {
    let graph = &self.shared.graph;
    let is_loop = graph.kind(node_id) == NodeKind::Loop;

    let mut order: Vec<String> = Vec::new();
    let mut error_only: HashMap<String, bool> = HashMap::new();
    for edge in graph.outgoing(node_id) {
      if edge.back_edge || (is_loop && edge.class == BranchClass::LoopBody) {
        continue;
      }
      let is_error = edge.class == BranchClass::Error;
      match error_only.get_mut(&edge.target) {
        Some(only) => *only &= is_error,
        None => {
          order.push(edge.target.clone());
          error_only.insert(edge.target.clone(), is_error);
        }
      }
    }

    for target in order {
      let activate = taken.contains(&target);
      self.queue.push_back(Signal {
        from: node_id.to_string(),
        error_only: error_only.get(&target).copied().unwrap_or(false),
        activate,
        to: target,
      });
    }
  }

  fn success_targets(&self, node_id: &str, branch: Option<&str>) -> HashSet<String> {
    let graph = &self.shared.graph;
    let targets = match branch {
      Some(branch) => {
        let targets = graph.targets_for_branch(node_id, branch);
        if targets.is_empty() {
          debug!(
            execution_id = %self.shared.execution_id(),
            node_id = %node_id,
            branch = %branch,
            "branch_without_targets"
          );
        }
        targets
      }
      None => {
        let mut targets = graph.targets(node_id, BranchClass::Default);
        if graph.kind(node_id) == NodeKind::Loop {
          targets.extend(graph.targets(node_id, BranchClass::LoopDone));
        }
        targets
      }
    };
    targets.into_iter().map(str::to_string).collect()
  }

  fn complete(&mut self, node_id: String, outcome: NodeOutcome) {
    self.in_flight.remove(&node_id);
    self.outcome.unrecovered += outcome.nested_unrecovered;

    if outcome.cancelled {
      self.shared.tracker().set_state(&node_id, NodeState::Cancelled);
      self.outcome.cancelled = true;
      return;
    }

    let result = outcome.result;
    let taken = if result.success {
      self.success_targets(&node_id, result.branch.as_deref())
    } else if self.shared.graph.has_error_branch(&node_id) {
      info!(
        execution_id = %self.shared.execution_id(),
        node_id = %node_id,
        "node_failure_recovered"
      );
      self
        .shared
        .graph
        .error_targets(&node_id)
        .iter()
        .cloned()
        .collect()
    } else {
      self.outcome.unrecovered += 1;
      let error = result.summary().unwrap_or("failed");
      let message = format!("{}: {}", self.shared.label(&node_id), error);
      self.shared.tracker().record_unrecovered(&node_id, message);

      let node_type = self
        .shared
        .graph
        .node(&node_id)
        .map(|n| n.node_type.as_str())
        .unwrap_or_default();
      if self.shared.policy.is_critical(node_type) {
        warn!(
          execution_id = %self.shared.execution_id(),
          node_id = %node_id,
          node_type = %node_type,
          "subtree_aborted"
        );
        HashSet::new()
      } else {
        self.success_targets(&node_id, None)
      }
    };

    self.send_signals(&node_id, &taken);
  }

  /// Abort every task of this scope and give them the grace period to
  /// unwind. Whatever is still running afterwards is abandoned.
  async fn cancel_in_flight(&mut self) {
    self.outcome.cancelled = true;
    self.tasks.abort_all();

    let grace = self.shared.grace;
    let tasks = &mut self.tasks;
    let drain = async {
      let mut finished = Vec::new();
      while let Some(joined) = tasks.join_next().await {
        if let Ok((node_id, _)) = joined {
          finished.push(node_id);
        }
      }
      finished
    };

    match tokio::time::timeout(grace, drain).await {
      Ok(finished) => {
        for node_id in finished {
          self.in_flight.remove(&node_id);
        }
      }
      Err(_) => {
        warn!(
          execution_id = %self.shared.execution_id(),
          scope = %self.scope.name,
          grace_ms = grace.as_millis() as u64,
          "stop_grace_period_elapsed"
        );
      }
    }

    for node_id in &self.in_flight {
      info!(execution_id = %self.shared.execution_id(), node_id = %node_id, "node_cancelled");
    }
  }
}

/// Task body for one node: invoke its module, then drive any loop or subflow
/// it asked for, then record and announce the result.
async fn run_node(shared: Arc<Shared>, node_id: String, nesting: Nesting) -> (String, NodeOutcome) {
  let outcome = execute_node(&shared, &node_id, nesting).await;
  (node_id, outcome)
}

async fn execute_node(shared: &Arc<Shared>, node_id: &str, nesting: Nesting) -> NodeOutcome {
  let ctx = &shared.ctx;
  let Some(node) = shared.graph.node(node_id) else {
    return NodeOutcome::finished(ModuleResult::failure(format!("node '{node_id}' not found")), 0);
  };

  ctx.emit(ExecutionEvent::NodeStarted {
    execution_id: ctx.execution_id().to_string(),
    node_id: node_id.to_string(),
  });
  info!(
    execution_id = %ctx.execution_id(),
    node_id = %node_id,
    node_type = %node.node_type,
    "node_started"
  );

  let started = Instant::now();
  let mut nested_unrecovered = 0;

  let mut result = match shared.registry.get(&node.node_type) {
    None => {
      warn!(
        execution_id = %ctx.execution_id(),
        node_id = %node_id,
        node_type = %node.node_type,
        "unknown_module"
      );
      ModuleResult::ok_with(format!("skipped unknown module '{}'", node.node_type))
        .with_log_level(LogLevel::Warning)
    }
    Some(module) => {
      let config = ModuleConfig::from_node(node, &**ctx);
      match invoke(shared, module.as_ref(), &config).await {
        Invocation::Cancelled => return NodeOutcome::cancelled(),
        Invocation::Done(result) => result,
      }
    }
  };

  match result.control.take() {
    Some(Control::Loop(spec)) if result.success && shared.graph.kind(node_id) == NodeKind::Loop => {
      let run = drive_loop(shared.clone(), node_id, spec, nesting).await;
      if run.cancelled {
        return NodeOutcome::cancelled();
      }
      nested_unrecovered = run.unrecovered;
      result.data = Some(merge_data(result.data.take(), json!({ "iterations": run.iterations })));
    }
    Some(Control::Subflow { target }) if result.success => {
      match run_subflow(shared.clone(), node_id, &target, nesting).await {
        Ok(outcome) if outcome.cancelled => return NodeOutcome::cancelled(),
        Ok(outcome) if outcome.unrecovered > 0 => {
          result = ModuleResult::failure(format!(
            "subflow '{target}' failed: {} node(s) failed",
            outcome.unrecovered
          ));
        }
        Ok(_) => {}
        Err(message) => result = ModuleResult::failure(message),
      }
    }
    Some(control) => {
      debug!(node_id = %node_id, control = ?control, "control_ignored");
    }
    None => {}
  }

  let duration_ms = started.elapsed().as_millis() as u64;
  result.duration_ms = Some(duration_ms);
  record(shared, node_id, &result, duration_ms);
  NodeOutcome::finished(result, nested_unrecovered)
}

enum Invocation {
  Done(ModuleResult),
  Cancelled,
}

/// Call a module under its timeout, turning errors and panics into failing
/// results.
async fn invoke(shared: &Shared, module: &dyn Module, config: &ModuleConfig) -> Invocation {
  let limit = shared
    .policy
    .effective_timeout(&config.node_type, config.get(TIMEOUT_KEY));
  let call = AssertUnwindSafe(module.execute(config, &shared.ctx)).catch_unwind();

  let outcome = match limit {
    Some(limit) => match tokio::time::timeout(limit, call).await {
      Ok(outcome) => outcome,
      Err(_) => {
        let ms = limit.as_millis();
        warn!(
          execution_id = %shared.execution_id(),
          node_id = %config.node_id,
          timeout_ms = ms as u64,
          "node_timed_out"
        );
        return Invocation::Done(ModuleResult::failure(format!("execution timeout ({ms}ms)")));
      }
    },
    None => call.await,
  };

  match outcome {
    Ok(Ok(result)) => Invocation::Done(result),
    Ok(Err(ModuleError::Cancelled)) if shared.cancel.is_cancelled() => Invocation::Cancelled,
    Ok(Err(e)) => Invocation::Done(ModuleResult::failure(e.to_string())),
    Err(panic) => {
      let message = panic_message(&*panic);
      error!(
        execution_id = %shared.execution_id(),
        node_id = %config.node_id,
        panic = %message,
        "module_panicked"
      );
      Invocation::Done(ModuleResult::failure(format!("internal error: {message}")))
    }
  }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
  if let Some(s) = panic.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = panic.downcast_ref::<String>() {
    s.clone()
  } else {
    "module panicked".to_string()
  }
}

fn merge_data(data: Option<Value>, extra: Value) -> Value {
  match (data, extra) {
    (Some(Value::Object(mut base)), Value::Object(extra)) => {
      base.extend(extra);
      Value::Object(base)
    }
    (_, extra) => extra,
  }
}

/// Book-keep a finished node and tell the outside world about it.
fn record(shared: &Shared, node_id: &str, result: &ModuleResult, duration_ms: u64) {
  let ctx = &shared.ctx;
  let label = shared.label(node_id);
  shared.tracker().record_executed(node_id, result.success);

  let entry = if result.success {
    info!(
      execution_id = %ctx.execution_id(),
      node_id = %node_id,
      duration_ms = duration_ms,
      "node_completed"
    );
    let level = result.log_level.unwrap_or(LogLevel::Success);
    let message = format!("{label}: {}", result.summary().unwrap_or("completed"));
    LogEntry::new(level, message)
  } else {
    warn!(
      execution_id = %ctx.execution_id(),
      node_id = %node_id,
      duration_ms = duration_ms,
      error = %result.summary().unwrap_or("failed"),
      "node_failed"
    );
    let message = format!("{label}: {}", result.summary().unwrap_or("failed"));
    LogEntry::new(LogLevel::Error, message)
  };

  let mut entry = entry.for_node(node_id).with_duration(duration_ms);
  if let Some(data) = &result.data {
    entry = entry.with_details(data.clone());
  }
  ctx.push_log(entry);

  ctx.emit(ExecutionEvent::NodeCompleted {
    execution_id: ctx.execution_id().to_string(),
    node_id: node_id.to_string(),
    result: result.clone(),
  });
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_panic_message() {
    let boxed: Box<dyn Any + Send> = Box::new("boom");
    assert_eq!(panic_message(&*boxed), "boom");
    let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
    assert_eq!(panic_message(&*boxed), "owned");
    let boxed: Box<dyn Any + Send> = Box::new(7u8);
    assert_eq!(panic_message(&*boxed), "module panicked");
  }

  #[test]
  fn test_merge_data() {
    let merged = merge_data(Some(json!({"a": 1})), json!({"iterations": 3}));
    assert_eq!(merged, json!({"a": 1, "iterations": 3}));
    let merged = merge_data(Some(json!("text")), json!({"iterations": 3}));
    assert_eq!(merged, json!({"iterations": 3}));
    let merged = merge_data(None, json!({"iterations": 0}));
    assert_eq!(merged, json!({"iterations": 0}));
  }
}
