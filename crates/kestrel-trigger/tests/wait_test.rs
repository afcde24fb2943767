use std::sync::Arc;
use std::time::Duration;

use kestrel_trigger::{InMemoryTriggerManager, TriggerError, TriggerKind, TriggerManager, wait_for_event};
use serde_json::{Map, json};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_event_delivered_and_unregistered() {
  let manager = Arc::new(InMemoryTriggerManager::new());
  let cancel = CancellationToken::new();

  let firing = manager.clone();
  tokio::spawn(async move {
    // Wait until the listener is in place
    while firing.is_empty() {
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
    firing.fire(TriggerKind::Hotkey, None, json!({ "keys": "ctrl+k" }));
  });

  let dyn_manager: Arc<dyn TriggerManager> = manager.clone();
  let event = wait_for_event(
    dyn_manager,
    TriggerKind::Hotkey,
    Map::new(),
    Some(Duration::from_secs(5)),
    &cancel,
  )
  .await
  .unwrap();

  assert_eq!(event.kind, TriggerKind::Hotkey);
  assert_eq!(event.payload["keys"], "ctrl+k");
  assert!(manager.is_empty());
}

#[tokio::test]
async fn test_timeout_unregisters() {
  let manager = Arc::new(InMemoryTriggerManager::new());
  let cancel = CancellationToken::new();

  let result = wait_for_event(
    manager.clone(),
    TriggerKind::FileWatcher,
    Map::new(),
    Some(Duration::from_millis(30)),
    &cancel,
  )
  .await;

  assert!(matches!(result, Err(TriggerError::Timeout { ms: 30 })));
  assert!(manager.is_empty());
}

#[tokio::test]
async fn test_cancellation_unregisters() {
  let manager = Arc::new(InMemoryTriggerManager::new());
  let cancel = CancellationToken::new();

  let canceller = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(20)).await;
    canceller.cancel();
  });

  let result = wait_for_event(manager.clone(), TriggerKind::Email, Map::new(), None, &cancel).await;

  assert!(matches!(result, Err(TriggerError::Cancelled)));
  assert!(manager.is_empty());
}

#[tokio::test]
async fn test_dropped_wait_unregisters() {
  let manager = Arc::new(InMemoryTriggerManager::new());
  let cancel = CancellationToken::new();

  let wait = wait_for_event(manager.clone(), TriggerKind::Mouse, Map::new(), None, &cancel);
  let _ = tokio::time::timeout(Duration::from_millis(20), wait).await;

  assert!(manager.is_empty());
}

/// Registers fine but has always lost the listener by the time it is
/// removed.
#[derive(Default)]
struct ForgetfulManager {
  unregisters: std::sync::atomic::AtomicUsize,
}

impl TriggerManager for ForgetfulManager {
  fn register(
    &self,
    _kind: TriggerKind,
    _params: Map<String, serde_json::Value>,
    _on_fire: kestrel_trigger::OnFire,
  ) -> Result<kestrel_trigger::TriggerHandle, TriggerError> {
    Ok(kestrel_trigger::TriggerHandle(7))
  }

  fn unregister(&self, handle: kestrel_trigger::TriggerHandle) -> Result<(), TriggerError> {
    self.unregisters.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    Err(TriggerError::NotFound(handle.to_string()))
  }
}

#[tokio::test]
async fn test_failed_unregister_does_not_mask_outcome() {
  let manager = Arc::new(ForgetfulManager::default());
  let cancel = CancellationToken::new();

  let result = wait_for_event(
    manager.clone(),
    TriggerKind::Api,
    Map::new(),
    Some(Duration::from_millis(20)),
    &cancel,
  )
  .await;

  assert!(matches!(result, Err(TriggerError::Timeout { ms: 20 })));
  // Released exactly once, never again on drop
  assert_eq!(manager.unregisters.load(std::sync::atomic::Ordering::SeqCst), 1);
}
