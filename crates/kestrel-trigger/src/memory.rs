use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::TriggerError;
use crate::manager::{OnFire, TriggerManager};
use crate::types::{TriggerEvent, TriggerHandle, TriggerKind};

struct Listener {
  kind: TriggerKind,
  params: Map<String, Value>,
  on_fire: OnFire,
}

impl Listener {
  /// A listener registered with a `key` param only hears events carrying
  /// the same key. Without one it hears every event of its kind.
  fn matches(&self, kind: TriggerKind, key: Option<&str>) -> bool {
    if self.kind != kind {
      return false;
    }
    match self.params.get("key").and_then(|v| v.as_str()) {
      Some(wanted) => key == Some(wanted),
      None => true,
    }
  }
}

/// Process-local trigger manager.
///
/// Events are injected with [`fire`](Self::fire), by an embedding
/// application bridging real event sources or by tests.
#[derive(Default)]
pub struct InMemoryTriggerManager {
  listeners: Mutex<HashMap<TriggerHandle, Listener>>,
  next_id: AtomicU64,
}

impl InMemoryTriggerManager {
  pub fn new() -> Self {
    Self::default()
  }

  /// Deliver an event to every matching listener. Returns how many
  /// listeners were notified.
  pub fn fire(&self, kind: TriggerKind, key: Option<&str>, payload: Value) -> usize {
    let targets: Vec<OnFire> = {
      let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
      listeners
        .values()
        .filter(|l| l.matches(kind, key))
        .map(|l| l.on_fire.clone())
        .collect()
    };

    debug!(kind = %kind, key = ?key, listeners = targets.len(), "trigger_fired");

    for on_fire in &targets {
      on_fire(TriggerEvent::new(kind, payload.clone()));
    }
    targets.len()
  }

  /// Number of live registrations.
  pub fn len(&self) -> usize {
    self.listeners.lock().unwrap_or_else(|e| e.into_inner()).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl TriggerManager for InMemoryTriggerManager {
  fn register(
    &self,
    kind: TriggerKind,
    params: Map<String, Value>,
    on_fire: OnFire,
  ) -> Result<TriggerHandle, TriggerError> {
    let handle = TriggerHandle(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
    let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
    listeners.insert(
      handle,
      Listener {
        kind,
        params,
        on_fire,
      },
    );
    debug!(kind = %kind, handle = %handle, "trigger_registered");
    Ok(handle)
  }

  fn unregister(&self, handle: TriggerHandle) -> Result<(), TriggerError> {
    let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
    match listeners.remove(&handle) {
      Some(_) => {
        debug!(handle = %handle, "trigger_unregistered");
        Ok(())
      }
      None => Err(TriggerError::NotFound(handle.to_string())),
    }
  }
}
