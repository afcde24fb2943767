use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kestrel_context::ContextOptions;
use kestrel_module::TimeoutPolicy;
use kestrel_trigger::TriggerManager;

/// Configuration for a workflow executor.
#[derive(Clone)]
pub struct ExecutorConfig {
  /// Committed rows pushed to the notifier as they happen. The full table is
  /// always available through `get_collected_data`.
  pub data_preview_limit: usize,
  /// Size of the in-memory log ring; 0 keeps every entry.
  pub log_capacity: usize,
  /// How long `stop()` waits for in-flight nodes to unwind.
  pub stop_grace_period: Duration,
  /// Leave the browser open when the run ends; see `take_browser`.
  pub preserve_browser: bool,
  /// Nested subflow calls beyond this depth fail the calling node.
  pub max_subflow_depth: usize,
  /// Modules whose failure (without an error branch) aborts their subtree.
  /// `None` uses the list from the timeout table.
  pub critical_modules: Option<Vec<String>>,
  pub timeout_policy: TimeoutPolicy,
  /// Browser profile directory handed to the context.
  pub user_data_dir: Option<PathBuf>,
  pub trigger_manager: Option<Arc<dyn TriggerManager>>,
}

impl Default for ExecutorConfig {
  fn default() -> Self {
    Self {
      data_preview_limit: 20,
      log_capacity: 5000,
      stop_grace_period: Duration::from_secs(1),
      preserve_browser: false,
      max_subflow_depth: 64,
      critical_modules: None,
      timeout_policy: TimeoutPolicy::default(),
      user_data_dir: None,
      trigger_manager: None,
    }
  }
}

impl ExecutorConfig {
  /// The timeout policy with the critical-module override applied.
  pub(crate) fn effective_policy(&self) -> TimeoutPolicy {
    match &self.critical_modules {
      Some(modules) => self
        .timeout_policy
        .clone()
        .with_critical_modules(modules.iter().cloned()),
      None => self.timeout_policy.clone(),
    }
  }

  pub(crate) fn context_options(&self) -> ContextOptions {
    ContextOptions {
      data_preview_limit: self.data_preview_limit,
      log_capacity: self.log_capacity,
      user_data_dir: self.user_data_dir.clone(),
      trigger_manager: self.trigger_manager.clone(),
    }
  }
}
