use std::sync::Arc;
use std::time::{Duration, Instant};

use kestrel_context::{ContextOptions, Control, ExecutionContext, LogLevel, LoopKind, NoopNotifier};
use kestrel_module::{ModuleConfig, ModuleError, TimeoutPolicy};
use kestrel_modules::default_registry;
use kestrel_trigger::{InMemoryTriggerManager, TriggerKind};
use serde_json::{Value, json};

fn context() -> ExecutionContext {
  ExecutionContext::new("exec", Arc::new(NoopNotifier), ContextOptions::default())
}

fn config(module_type: &str, data: Value) -> ModuleConfig {
  ModuleConfig::from_map(module_type, data.as_object().cloned().unwrap_or_default())
}

async fn run(
  ctx: &ExecutionContext,
  module_type: &str,
  data: Value,
) -> Result<kestrel_context::ModuleResult, ModuleError> {
  let module = default_registry().get(module_type).unwrap();
  module.execute(&config(module_type, data), ctx).await
}

#[test]
fn test_every_builtin_has_a_timeout_entry() {
  let registry = default_registry();
  let policy = TimeoutPolicy::builtin();
  let listed: Vec<String> = policy.entries().into_iter().map(|(t, _)| t).collect();
  for module_type in registry.module_types() {
    assert!(listed.contains(&module_type), "{module_type} missing from timeout table");
  }
  assert!(registry.contains("webhook_trigger"));
  assert!(registry.contains("element_change_trigger"));
}

#[tokio::test]
async fn test_set_variable_value_types() {
  let ctx = context();
  ctx.set("x", json!(1));

  run(&ctx, "set_variable", json!({ "variableName": "a", "variableValue": "5" })).await.unwrap();
  assert_eq!(ctx.get("a"), Some(json!(5)));

  run(&ctx, "set_variable", json!({ "variableName": "s", "variableValue": "5", "valueType": "string" }))
    .await
    .unwrap();
  assert_eq!(ctx.get("s"), Some(json!("5")));

  run(&ctx, "set_variable", json!({ "variableName": "j", "variableValue": "{\"k\": [1]}", "valueType": "json" }))
    .await
    .unwrap();
  assert_eq!(ctx.get("j"), Some(json!({ "k": [1] })));

  run(&ctx, "set_variable", json!({ "variableName": "e", "variableValue": "{x} + 2", "valueType": "expression" }))
    .await
    .unwrap();
  assert_eq!(ctx.get("e"), Some(json!(3)));

  let err = run(&ctx, "set_variable", json!({ "variableName": "n", "variableValue": "abc", "valueType": "number" }))
    .await
    .unwrap_err();
  assert!(matches!(err, ModuleError::InvalidField { .. }));
}

#[tokio::test]
async fn test_condition_modes() {
  let ctx = context();
  ctx.set("x", json!(5));

  let result = run(&ctx, "condition", json!({ "leftValue": 5, "operator": ">", "rightValue": "0" }))
    .await
    .unwrap();
  assert_eq!(result.branch.as_deref(), Some("true"));

  let result = run(&ctx, "condition", json!({ "condition": "{x} < 0" })).await.unwrap();
  assert_eq!(result.branch.as_deref(), Some("false"));
}

#[tokio::test]
async fn test_loop_descriptors() {
  let ctx = context();

  let result = run(&ctx, "loop", json!({ "loopType": "count", "count": "3", "indexVariable": "i" }))
    .await
    .unwrap();
  match result.control {
    Some(Control::Loop(spec)) => {
      assert_eq!(spec.kind, LoopKind::Count);
      assert_eq!(spec.count, Some(3));
      assert_eq!(spec.index_var, "i");
    }
    other => panic!("unexpected control {other:?}"),
  }

  let err = run(&ctx, "loop", json!({ "loopType": "range", "endValue": 3, "stepValue": 0 }))
    .await
    .unwrap_err();
  assert!(err.to_string().contains("step cannot be 0"));

  ctx.set("names", json!(["a", "b"]));
  let result = run(&ctx, "foreach", json!({ "listVariable": "names", "itemVariable": "name" }))
    .await
    .unwrap();
  match result.control {
    Some(Control::Loop(spec)) => {
      assert_eq!(spec.items, Some(vec![json!("a"), json!("b")]));
      assert_eq!(spec.item_var.as_deref(), Some("name"));
    }
    other => panic!("unexpected control {other:?}"),
  }
}

#[tokio::test]
async fn test_break_outside_loop_warns() {
  let ctx = context();
  let result = run(&ctx, "break_loop", json!({})).await.unwrap();
  assert!(result.success);
  assert_eq!(result.log_level, Some(LogLevel::Warning));
  assert!(!ctx.should_break());
}

#[tokio::test]
async fn test_subflow_names_target() {
  let ctx = context();
  let result = run(&ctx, "subflow", json!({ "subflowName": "cleanup" })).await.unwrap();
  assert_eq!(result.control, Some(Control::Subflow { target: "cleanup".into() }));
  assert!(run(&ctx, "subflow", json!({})).await.is_err());
}

#[tokio::test]
async fn test_increment_and_list_operations() {
  let ctx = context();
  run(&ctx, "increment_decrement", json!({ "variableName": "c" })).await.unwrap();
  run(&ctx, "increment_decrement", json!({ "variableName": "c", "step": 4 })).await.unwrap();
  run(&ctx, "increment_decrement", json!({ "variableName": "c", "operation": "decrement" }))
    .await
    .unwrap();
  assert_eq!(ctx.get("c"), Some(json!(4)));

  run(&ctx, "list_operation", json!({ "variableName": "l", "operation": "append", "value": "a" }))
    .await
    .unwrap();
  run(&ctx, "list_operation", json!({ "variableName": "l", "operation": "extend", "value": ["b", "c"] }))
    .await
    .unwrap();
  run(&ctx, "list_operation", json!({ "variableName": "l", "operation": "length", "resultVariable": "n" }))
    .await
    .unwrap();
  assert_eq!(ctx.get("n"), Some(json!(3)));

  ctx.set("scalar", json!(1));
  assert!(run(&ctx, "list_operation", json!({ "variableName": "scalar", "operation": "append", "value": 2 }))
    .await
    .is_err());
  assert_eq!(ctx.get("scalar"), Some(json!(1)));
}

#[tokio::test]
async fn test_data_rows() {
  let ctx = context();
  run(&ctx, "add_data", json!({ "columnName": "name", "value": "ada" })).await.unwrap();
  run(&ctx, "add_data", json!({ "fields": { "age": 36 } })).await.unwrap();
  run(&ctx, "commit_row", json!({})).await.unwrap();
  let result = run(&ctx, "commit_row", json!({})).await.unwrap();
  assert!(result.message.unwrap().contains("empty"));

  let rows = ctx.get_collected_data();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0]["name"], json!("ada"));
  assert_eq!(rows[0]["age"], json!(36));
}

#[tokio::test]
async fn test_raise_error_fails() {
  let ctx = context();
  let result = run(&ctx, "raise_error", json!({ "message": "nope" })).await.unwrap();
  assert!(!result.success);
  assert_eq!(result.error.as_deref(), Some("nope"));
}

#[tokio::test]
async fn test_export_log() {
  let ctx = context();
  ctx.log_node("n1", LogLevel::Info, "first");
  ctx.log(LogLevel::Error, "second");
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("logs").join("run.json");

  run(&ctx, "export_log", json!({ "filePath": path.to_string_lossy() })).await.unwrap();

  let written: Vec<Value> = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
  assert_eq!(written.len(), 2);
  assert_eq!(written[0]["message"], "first");

  let text_path = dir.path().join("run.txt");
  run(&ctx, "export_log", json!({ "filePath": text_path.to_string_lossy() })).await.unwrap();
  let text = std::fs::read_to_string(&text_path).unwrap();
  assert!(text.contains("[n1] first"));
  assert!(text.contains("[error] second"));
}

#[tokio::test]
async fn test_wait_observes_stop() {
  let ctx = Arc::new(context());
  let stopper = ctx.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(30)).await;
    stopper.stop();
  });

  let started = Instant::now();
  let result = run(&ctx, "wait", json!({ "duration": 60, "unit": "s" })).await;
  assert!(matches!(result, Err(ModuleError::Cancelled)));
  assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_trigger_module_stores_payload() {
  let manager = Arc::new(InMemoryTriggerManager::new());
  let options = ContextOptions {
    trigger_manager: Some(manager.clone()),
    ..Default::default()
  };
  let ctx = ExecutionContext::new("exec", Arc::new(NoopNotifier), options);

  let firing = manager.clone();
  tokio::spawn(async move {
    loop {
      if firing.fire(TriggerKind::Webhook, Some("orders"), json!({ "id": 42 })) > 0 {
        break;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
  });

  let result = run(&ctx, "webhook_trigger", json!({ "webhookId": "orders", "triggerTimeout": 5000 }))
    .await
    .unwrap();
  assert!(result.success);
  assert_eq!(ctx.get("trigger_data"), Some(json!({ "id": 42 })));
  assert!(manager.is_empty());
}

#[tokio::test]
async fn test_trigger_timeout_is_failure() {
  let manager = Arc::new(InMemoryTriggerManager::new());
  let options = ContextOptions {
    trigger_manager: Some(manager.clone()),
    ..Default::default()
  };
  let ctx = ExecutionContext::new("exec", Arc::new(NoopNotifier), options);

  let result = run(&ctx, "hotkey_trigger", json!({ "hotkey": "ctrl+k", "triggerTimeout": 20 }))
    .await
    .unwrap();
  assert!(!result.success);
  assert!(result.error.unwrap().contains("timed out"));
  assert!(manager.is_empty());
}

#[tokio::test]
async fn test_trigger_without_manager_fails() {
  let ctx = context();
  assert!(run(&ctx, "email_trigger", json!({})).await.is_err());
}
