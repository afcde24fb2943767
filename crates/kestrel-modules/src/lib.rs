//! Kestrel Modules
//!
//! Built-in modules every engine ships with. Feature modules (browser, OCR,
//! media, documents) plug into the same [`ModuleRegistry`] from their own
//! crates.

mod control;
mod data;
mod http;
mod logging;
mod timing;
mod trigger;
mod variables;

use std::sync::{Arc, OnceLock};

use kestrel_module::ModuleRegistry;
use kestrel_trigger::TriggerKind;

pub use control::{
  BreakLoop, Condition, ContinueLoop, Foreach, Loop, RaiseError, Structural, SubflowCall,
};
pub use data::{AddData, CommitRow};
pub use http::HttpRequest;
pub use logging::{ExportLog, PrintLog};
pub use timing::{ScheduledTask, Wait};
pub use trigger::TriggerModule;
pub use variables::{IncrementDecrement, ListOperation, SetVariable};

/// Register every built-in module.
pub fn register_builtins(registry: &mut ModuleRegistry) {
  registry.register(Condition);
  registry.register(Loop);
  registry.register(Foreach);
  registry.register(BreakLoop);
  registry.register(ContinueLoop);
  registry.register(SubflowCall);
  registry.register(Structural::new("group"));
  registry.register(Structural::new("subflow_header"));
  registry.register(RaiseError);

  registry.register(SetVariable);
  registry.register(IncrementDecrement);
  registry.register(ListOperation);

  registry.register(AddData);
  registry.register(CommitRow);
  registry.register(PrintLog);
  registry.register(ExportLog);

  registry.register(Wait);
  registry.register(ScheduledTask);
  registry.register(HttpRequest::new());

  for kind in TriggerKind::ALL {
    registry.register(TriggerModule::new(kind));
  }
}

/// Process-wide registry holding the built-in modules.
pub fn default_registry() -> Arc<ModuleRegistry> {
  static REGISTRY: OnceLock<Arc<ModuleRegistry>> = OnceLock::new();
  REGISTRY
    .get_or_init(|| {
      let mut registry = ModuleRegistry::new();
      register_builtins(&mut registry);
      Arc::new(registry)
    })
    .clone()
}
