use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::TriggerError;
use crate::types::{TriggerEvent, TriggerHandle, TriggerKind};

/// Callback invoked when a registered trigger fires.
pub type OnFire = Arc<dyn Fn(TriggerEvent) + Send + Sync>;

/// Event source the engine registers trigger listeners with.
///
/// Implementations may invoke `on_fire` from any thread, any number of
/// times, until the registration is removed.
pub trait TriggerManager: Send + Sync {
  /// Register a listener for events of `kind` matching `params`.
  fn register(
    &self,
    kind: TriggerKind,
    params: Map<String, Value>,
    on_fire: OnFire,
  ) -> Result<TriggerHandle, TriggerError>;

  /// Remove a listener. Unknown handles are an error.
  fn unregister(&self, handle: TriggerHandle) -> Result<(), TriggerError>;
}
