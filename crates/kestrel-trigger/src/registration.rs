use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::TriggerError;
use crate::manager::{OnFire, TriggerManager};
use crate::types::{TriggerHandle, TriggerKind};

/// A registration that is removed from its manager when dropped.
pub struct TriggerRegistration {
  manager: Arc<dyn TriggerManager>,
  handle: Option<TriggerHandle>,
}

impl TriggerRegistration {
  pub fn register(
    manager: Arc<dyn TriggerManager>,
    kind: TriggerKind,
    params: Map<String, Value>,
    on_fire: OnFire,
  ) -> Result<Self, TriggerError> {
    let handle = manager.register(kind, params, on_fire)?;
    Ok(Self {
      manager,
      handle: Some(handle),
    })
  }

  /// Unregister now, returning the manager's error instead of logging it.
  pub fn release(mut self) -> Result<(), TriggerError> {
    match self.handle.take() {
      Some(handle) => self.manager.unregister(handle),
      None => Ok(()),
    }
  }
}

impl Drop for TriggerRegistration {
  fn drop(&mut self) {
    if let Some(handle) = self.handle.take() {
      if let Err(e) = self.manager.unregister(handle) {
        warn!(handle = %handle, error = %e, "failed to unregister trigger");
      }
    }
  }
}
