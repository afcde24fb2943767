use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::TriggerError;
use crate::manager::TriggerManager;
use crate::registration::TriggerRegistration;
use crate::types::{TriggerEvent, TriggerKind};

/// Wait for the first event of `kind` matching `params`.
///
/// The listener is unregistered on every exit path: event received, timeout,
/// cancellation, or the future being dropped. `None` waits without a limit.
pub async fn wait_for_event(
  manager: Arc<dyn TriggerManager>,
  kind: TriggerKind,
  params: Map<String, Value>,
  timeout: Option<Duration>,
  cancel: &CancellationToken,
) -> Result<TriggerEvent, TriggerError> {
  let (tx, rx) = oneshot::channel::<TriggerEvent>();
  let slot = Mutex::new(Some(tx));

  let registration = TriggerRegistration::register(
    manager,
    kind,
    params,
    Arc::new(move |event| {
      let sender = slot.lock().unwrap_or_else(|e| e.into_inner()).take();
      if let Some(sender) = sender {
        let _ = sender.send(event);
      }
    }),
  )?;

  info!(kind = %kind, timeout_ms = ?timeout.map(|t| t.as_millis()), "trigger_waiting");

  let deadline = async {
    match timeout {
      Some(t) => tokio::time::sleep(t).await,
      None => std::future::pending::<()>().await,
    }
  };

  let outcome = tokio::select! {
    received = rx => received.map_err(|_| TriggerError::Cancelled),
    _ = cancel.cancelled() => Err(TriggerError::Cancelled),
    _ = deadline => Err(TriggerError::Timeout {
      ms: timeout.map(|t| t.as_millis() as u64).unwrap_or_default(),
    }),
  };

  if let Err(e) = registration.release() {
    warn!(kind = %kind, error = %e, "trigger_unregister_failed");
  }

  match &outcome {
    Ok(event) => info!(kind = %kind, event_id = %event.event_id, "trigger_received"),
    Err(e) => debug!(kind = %kind, error = %e, "trigger_wait_ended"),
  }
  outcome
}
