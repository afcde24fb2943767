use std::time::Duration;

use async_trait::async_trait;
use kestrel_context::{ExecutionContext, ModuleResult};
use kestrel_module::{Module, ModuleConfig, ModuleError};
use kestrel_trigger::{TriggerError, TriggerKind, wait_for_event};
use serde_json::{Value, json};

const DEFAULT_RESULT_VARIABLE: &str = "trigger_data";

/// A node that blocks until an external event arrives.
///
/// Every trigger type works the same way: the node's resolved config is the
/// registration's params, a kind-specific field (`webhookId`, `hotkey`,
/// `watchPath`, ...) becomes the match `key`, the wait is bounded by
/// `triggerTimeout` in milliseconds (0 or unset waits forever), and the
/// event payload is stored in `resultVariable` (default `trigger_data`).
pub struct TriggerModule {
  kind: TriggerKind,
  module_type: String,
}

impl TriggerModule {
  pub fn new(kind: TriggerKind) -> Self {
    Self {
      kind,
      module_type: format!("{}_trigger", kind.as_str()),
    }
  }

  fn key_field(&self) -> Option<&'static str> {
    match self.kind {
      TriggerKind::Webhook => Some("webhookId"),
      TriggerKind::Hotkey => Some("hotkey"),
      TriggerKind::FileWatcher => Some("watchPath"),
      TriggerKind::Image => Some("imagePath"),
      TriggerKind::Gesture => Some("gesture"),
      TriggerKind::ElementChange => Some("selector"),
      TriggerKind::Mouse => Some("mouseEvent"),
      TriggerKind::Email | TriggerKind::Api => None,
    }
  }
}

#[async_trait]
impl Module for TriggerModule {
  fn module_type(&self) -> &str {
    &self.module_type
  }

  async fn execute(&self, config: &ModuleConfig, ctx: &ExecutionContext) -> Result<ModuleResult, ModuleError> {
    let manager = ctx
      .trigger_manager()
      .ok_or_else(|| ModuleError::failed("no trigger manager is configured"))?;

    let mut params = config.resolved.clone();
    if !params.contains_key("key") {
      if let Some(key) = self.key_field().and_then(|field| config.str(field)) {
        params.insert("key".into(), Value::String(key));
      }
    }

    let timeout = match config.int("triggerTimeout", 0) {
      ms if ms > 0 => Some(Duration::from_millis(ms as u64)),
      _ => None,
    };

    let token = ctx.cancellation_token();
    let event = match wait_for_event(manager, self.kind, params, timeout, &token).await {
      Ok(event) => event,
      Err(TriggerError::Timeout { ms }) => {
        return Ok(ModuleResult::failure(format!("{} trigger timed out after {ms}ms", self.kind)));
      }
      Err(TriggerError::Cancelled) => return Err(ModuleError::Cancelled),
      Err(e) => return Err(e.into()),
    };

    let variable = config
      .str("resultVariable")
      .filter(|s| !s.is_empty())
      .unwrap_or_else(|| DEFAULT_RESULT_VARIABLE.to_string());
    ctx.set(variable, event.payload.clone());

    Ok(
      ModuleResult::ok_with(format!("{} trigger fired", self.kind)).with_data(json!({
        "event_id": event.event_id,
        "payload": event.payload,
        "timestamp": event.timestamp,
      })),
    )
  }
}
