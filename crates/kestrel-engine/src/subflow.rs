//! Subflow runner.

use std::sync::Arc;

use tracing::info;

use crate::scheduler::{Nesting, Scope, ScopeOutcome, Shared, run_scope};

/// Run the subflow named `target` on behalf of `caller`, sharing the run's
/// context. Errors are messages for the calling node's failing result.
pub(crate) async fn run_subflow(
  shared: Arc<Shared>,
  caller: &str,
  target: &str,
  nesting: Nesting,
) -> Result<ScopeOutcome, String> {
  if nesting.depth >= shared.max_subflow_depth {
    return Err(format!(
      "subflow '{target}' exceeds the maximum nesting depth of {}",
      shared.max_subflow_depth
    ));
  }

  let subflow = shared
    .graph
    .find_subflow(target)
    .ok_or_else(|| format!("subflow '{target}' not found"))?;
  let members = Arc::new(subflow.member_set());
  let starts = shared.graph.local_start_nodes(&subflow.members, &members);
  let name = subflow.name.clone();

  info!(
    execution_id = %shared.ctx.execution_id(),
    node_id = %caller,
    subflow = %name,
    members = members.len(),
    depth = nesting.depth + 1,
    "subflow_started"
  );

  let scope = Scope {
    name: format!("subflow:{name}"),
    members,
    starts,
    nesting: Nesting {
      in_loop: nesting.in_loop,
      depth: nesting.depth + 1,
    },
  };
  let outcome = run_scope(shared.clone(), scope).await;

  info!(
    execution_id = %shared.ctx.execution_id(),
    node_id = %caller,
    subflow = %name,
    unrecovered = outcome.unrecovered,
    cancelled = outcome.cancelled,
    "subflow_finished"
  );
  Ok(outcome)
}
