//! Loop driver.
//!
//! A loop node's module only describes the loop. The driver pushes a frame,
//! then re-runs the loop's body closure as a fresh scope once per iteration,
//! so every body node is pending again at the start of each pass.

use std::collections::HashSet;
use std::sync::Arc;

use kestrel_context::{ExecutionContext, LoopFrame, LoopKind, LoopSpec};
use kestrel_resolver::evaluate_condition;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::scheduler::{Nesting, Scope, Shared, run_scope};
use crate::summary::NodeState;

#[derive(Debug, Default)]
pub(crate) struct LoopRun {
  pub(crate) iterations: u64,
  pub(crate) unrecovered: usize,
  pub(crate) cancelled: bool,
}

/// Values seeded into the context before one iteration.
#[derive(Debug, PartialEq)]
struct Step {
  index: Value,
  item: Option<Value>,
}

pub(crate) async fn drive_loop(shared: Arc<Shared>, node_id: &str, spec: LoopSpec, nesting: Nesting) -> LoopRun {
  let ctx = shared.ctx.clone();
  let mut run = LoopRun::default();

  let closure = shared.graph.body_closure(node_id);
  if closure.is_empty() {
    warn!(execution_id = %ctx.execution_id(), node_id = %node_id, "loop_without_body");
    return run;
  }
  let members: Arc<HashSet<String>> = Arc::new(closure.members());
  let starts = shared.graph.local_start_nodes(&closure.body, &members);

  info!(
    execution_id = %ctx.execution_id(),
    node_id = %node_id,
    loop_type = %spec.kind.as_str(),
    body_nodes = closure.body.len(),
    "loop_started"
  );
  ctx.push_loop(LoopFrame::new(node_id, &spec));

  let mut iteration: u64 = 0;
  loop {
    if shared.cancel.is_cancelled() {
      run.cancelled = true;
      break;
    }
    let Some(step) = step_at(&spec, iteration, &ctx) else {
      break;
    };

    ctx.set(&spec.index_var, step.index);
    if let (Some(var), Some(item)) = (&spec.item_var, step.item) {
      ctx.set(var, item);
    }
    ctx.update_loop(|frame| frame.current_index = iteration);

    {
      let mut tracker = shared.tracker();
      for member in members.iter() {
        tracker.set_state(member, NodeState::Pending);
      }
    }

    let scope = Scope {
      name: format!("loop:{node_id}"),
      members: members.clone(),
      starts: starts.clone(),
      nesting: Nesting {
        in_loop: true,
        depth: nesting.depth,
      },
    };
    let outcome = run_scope(shared.clone(), scope).await;
    run.iterations += 1;
    run.unrecovered += outcome.unrecovered;
    iteration += 1;

    ctx.take_continue();
    if outcome.cancelled {
      run.cancelled = true;
      break;
    }
    if ctx.take_break() {
      debug!(execution_id = %ctx.execution_id(), node_id = %node_id, iteration = iteration - 1, "loop_break");
      break;
    }
  }

  ctx.pop_loop();
  info!(
    execution_id = %ctx.execution_id(),
    node_id = %node_id,
    iterations = run.iterations,
    cancelled = run.cancelled,
    "loop_finished"
  );
  run
}

/// The values for the given iteration, or `None` once the loop is done.
fn step_at(spec: &LoopSpec, iteration: u64, ctx: &ExecutionContext) -> Option<Step> {
  let index = |i: u64| Step {
    index: json!(i),
    item: None,
  };

  match spec.kind {
    LoopKind::Count => {
      let count = spec.count.unwrap_or(0).max(0) as u64;
      (iteration < count).then(|| index(iteration))
    }
    LoopKind::Range => {
      let start = spec.start.unwrap_or(0);
      let end = spec.end?;
      let step = spec.step.unwrap_or(1);
      if step == 0 {
        return None;
      }
      let offset = i64::try_from(iteration).ok()?.checked_mul(step)?;
      let value = start.checked_add(offset)?;
      let within = if step > 0 { value <= end } else { value >= end };
      within.then(|| Step {
        index: json!(value),
        item: None,
      })
    }
    LoopKind::While => {
      let max = spec.max_iterations.unwrap_or(1000);
      if iteration >= max {
        warn!(execution_id = %ctx.execution_id(), max_iterations = max, "loop_max_iterations_reached");
        return None;
      }
      let condition = spec.condition.as_deref().unwrap_or_default();
      match evaluate_condition(condition, ctx) {
        Ok(true) => Some(index(iteration)),
        Ok(false) => None,
        Err(e) => {
          warn!(execution_id = %ctx.execution_id(), error = %e, "loop_condition_failed");
          None
        }
      }
    }
    LoopKind::Foreach => {
      let items = spec.items.as_deref().unwrap_or_default();
      let item = items.get(usize::try_from(iteration).ok()?)?;
      Some(Step {
        index: json!(iteration),
        item: Some(item.clone()),
      })
    }
  }
}
