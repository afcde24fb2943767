#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use kestrel_config::{EdgeDef, NodeDef, WorkflowDef};
use kestrel_context::{ExecutionContext, ExecutionEvent, ExecutionNotifier, ModuleResult};
use kestrel_engine::{ExecutorConfig, WorkflowExecutor};
use kestrel_module::{Module, ModuleConfig, ModuleError, ModuleRegistry};
use serde_json::Value;

/// One invocation of the `record` module.
#[derive(Debug, Clone)]
pub struct Record {
  pub node_id: String,
  /// The node's resolved `tag`.
  pub tag: Value,
  pub started: Instant,
  pub finished: Instant,
}

#[derive(Debug, Clone, Default)]
pub struct Recorder {
  records: Arc<Mutex<Vec<Record>>>,
}

impl Recorder {
  pub fn records(&self) -> Vec<Record> {
    self.records.lock().unwrap().clone()
  }

  pub fn order(&self) -> Vec<String> {
    self.records().into_iter().map(|r| r.node_id).collect()
  }

  pub fn tags(&self, node_id: &str) -> Vec<Value> {
    self
      .records()
      .into_iter()
      .filter(|r| r.node_id == node_id)
      .map(|r| r.tag)
      .collect()
  }

  pub fn count(&self, node_id: &str) -> usize {
    self.records().iter().filter(|r| r.node_id == node_id).count()
  }

  pub fn get(&self, node_id: &str) -> Option<Record> {
    self.records().into_iter().find(|r| r.node_id == node_id)
  }
}

/// `record`: optionally sleeps `sleepMs`, then records the invocation.
pub struct RecordModule {
  recorder: Recorder,
}

#[async_trait]
impl Module for RecordModule {
  fn module_type(&self) -> &str {
    "record"
  }

  async fn execute(&self, config: &ModuleConfig, _ctx: &ExecutionContext) -> Result<ModuleResult, ModuleError> {
    let started = Instant::now();
    let sleep_ms = config.int("sleepMs", 0);
    if sleep_ms > 0 {
      tokio::time::sleep(Duration::from_millis(sleep_ms as u64)).await;
    }
    self.recorder.records.lock().unwrap().push(Record {
      node_id: config.node_id.clone(),
      tag: config.get("tag").cloned().unwrap_or(Value::Null),
      started,
      finished: Instant::now(),
    });
    Ok(ModuleResult::ok_with("recorded"))
  }
}

/// `fail`: always returns a failing result.
pub struct FailModule;

#[async_trait]
impl Module for FailModule {
  fn module_type(&self) -> &str {
    "fail"
  }

  async fn execute(&self, _config: &ModuleConfig, _ctx: &ExecutionContext) -> Result<ModuleResult, ModuleError> {
    Ok(ModuleResult::failure("boom"))
  }
}

/// `hang`: never returns.
pub struct HangModule;

#[async_trait]
impl Module for HangModule {
  fn module_type(&self) -> &str {
    "hang"
  }

  async fn execute(&self, _config: &ModuleConfig, _ctx: &ExecutionContext) -> Result<ModuleResult, ModuleError> {
    std::future::pending::<()>().await;
    Ok(ModuleResult::ok())
  }
}

/// `panic`: panics inside execute.
pub struct PanicModule;

#[async_trait]
impl Module for PanicModule {
  fn module_type(&self) -> &str {
    "panic"
  }

  async fn execute(&self, _config: &ModuleConfig, _ctx: &ExecutionContext) -> Result<ModuleResult, ModuleError> {
    panic!("kaboom");
  }
}

/// Built-in modules plus the test modules above.
pub fn registry(recorder: &Recorder) -> Arc<ModuleRegistry> {
  let mut registry = ModuleRegistry::new();
  kestrel_modules::register_builtins(&mut registry);
  registry.register(RecordModule {
    recorder: recorder.clone(),
  });
  registry.register(FailModule);
  registry.register(HangModule);
  registry.register(PanicModule);
  Arc::new(registry)
}

/// Collects every event for later inspection.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
  events: Arc<Mutex<Vec<ExecutionEvent>>>,
}

impl EventLog {
  pub fn events(&self) -> Vec<ExecutionEvent> {
    self.events.lock().unwrap().clone()
  }
}

impl ExecutionNotifier for EventLog {
  fn notify(&self, event: ExecutionEvent) {
    self.events.lock().unwrap().push(event);
  }
}

pub fn node(id: &str, node_type: &str, data: Value) -> NodeDef {
  let mut node = NodeDef::new(id, node_type);
  if let Value::Object(map) = data {
    node.data = map;
  }
  node
}

pub fn record(id: &str) -> NodeDef {
  NodeDef::new(id, "record")
}

pub fn edge(from: &str, to: &str) -> EdgeDef {
  EdgeDef::new(from, to)
}

pub fn branch(from: &str, to: &str, handle: &str) -> EdgeDef {
  EdgeDef::with_handle(from, to, handle)
}

pub fn workflow(nodes: Vec<NodeDef>, edges: Vec<EdgeDef>) -> WorkflowDef {
  WorkflowDef {
    name: Some("test".to_string()),
    nodes,
    edges,
    ..Default::default()
  }
}

pub fn executor(wf: &WorkflowDef, recorder: &Recorder) -> WorkflowExecutor {
  executor_with(wf, recorder, ExecutorConfig::default(), EventLog::default())
}

pub fn executor_with(
  wf: &WorkflowDef,
  recorder: &Recorder,
  config: ExecutorConfig,
  events: EventLog,
) -> WorkflowExecutor {
  WorkflowExecutor::new(wf, registry(recorder), config, Arc::new(events)).unwrap()
}
