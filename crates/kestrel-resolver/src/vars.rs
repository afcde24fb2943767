use std::collections::HashMap;

use serde_json::{Map, Value};

/// Read access to a set of named variables.
///
/// Implemented for plain maps and by the execution context, so resolution
/// works the same in tests and at runtime.
pub trait Variables {
  /// Look up a variable by its exact name.
  fn get_var(&self, name: &str) -> Option<Value>;

  /// Copy of every variable, used as the context for expressions.
  fn snapshot(&self) -> Map<String, Value>;
}

impl Variables for HashMap<String, Value> {
  fn get_var(&self, name: &str) -> Option<Value> {
    self.get(name).cloned()
  }

  fn snapshot(&self) -> Map<String, Value> {
    self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
  }
}

impl Variables for Map<String, Value> {
  fn get_var(&self, name: &str) -> Option<Value> {
    self.get(name).cloned()
  }

  fn snapshot(&self) -> Map<String, Value> {
    self.clone()
  }
}

impl<T: Variables + ?Sized> Variables for &T {
  fn get_var(&self, name: &str) -> Option<Value> {
    (**self).get_var(name)
  }

  fn snapshot(&self) -> Map<String, Value> {
    (**self).snapshot()
  }
}
