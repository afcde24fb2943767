use async_trait::async_trait;
use kestrel_context::{ExecutionContext, ModuleResult};

use crate::config::ModuleConfig;
use crate::error::ModuleError;

/// The code behind a node type.
///
/// Modules read inputs only through their [`ModuleConfig`] (already
/// resolved) or the resolver, and signal control flow only through
/// `ModuleResult::branch` and `ModuleResult::control`. A module must not keep
/// the context beyond the call.
#[async_trait]
pub trait Module: Send + Sync {
  /// The node `type` this module handles.
  fn module_type(&self) -> &str;

  async fn execute(
    &self,
    config: &ModuleConfig,
    ctx: &ExecutionContext,
  ) -> Result<ModuleResult, ModuleError>;
}
