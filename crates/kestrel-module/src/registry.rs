use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::module::Module;

/// Maps node types to module implementations.
///
/// Populated once at startup and shared read-only afterwards.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
  modules: HashMap<String, Arc<dyn Module>>,
}

impl ModuleRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a module under its own type. Returns the module it replaced.
  pub fn register(&mut self, module: impl Module + 'static) -> Option<Arc<dyn Module>> {
    self.register_arc(Arc::new(module))
  }

  pub fn register_arc(&mut self, module: Arc<dyn Module>) -> Option<Arc<dyn Module>> {
    let module_type = module.module_type().to_string();
    debug!(module_type = %module_type, "module_registered");
    self.modules.insert(module_type, module)
  }

  pub fn get(&self, module_type: &str) -> Option<Arc<dyn Module>> {
    self.modules.get(module_type).cloned()
  }

  pub fn contains(&self, module_type: &str) -> bool {
    self.modules.contains_key(module_type)
  }

  /// Registered types, sorted.
  pub fn module_types(&self) -> Vec<String> {
    let mut types: Vec<String> = self.modules.keys().cloned().collect();
    types.sort();
    types
  }

  pub fn len(&self) -> usize {
    self.modules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.modules.is_empty()
  }
}
