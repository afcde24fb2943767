use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use kestrel_resolver::Variables;
use kestrel_trigger::TriggerManager;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::HandleError;
use crate::events::{ExecutionEvent, ExecutionNotifier};
use crate::handles::{BrowserSession, ExternalHandle, FrameRef, PageRef};
use crate::kill::{KillSwitch, ReleaserGuard};
use crate::log::{LogBuffer, LogEntry, LogLevel};
use crate::loops::LoopFrame;
use crate::user_data::prepare_user_data_dir;

/// Knobs for a context, set by the executor.
#[derive(Clone)]
pub struct ContextOptions {
  /// Rows pushed to the notifier as they are committed. The full table is
  /// always kept.
  pub data_preview_limit: usize,
  /// Size of the in-memory log ring; 0 keeps every entry.
  pub log_capacity: usize,
  /// Browser profile directory.
  pub user_data_dir: Option<PathBuf>,
  pub trigger_manager: Option<Arc<dyn TriggerManager>>,
}

impl Default for ContextOptions {
  fn default() -> Self {
    Self {
      data_preview_limit: 20,
      log_capacity: 5000,
      user_data_dir: None,
      trigger_manager: None,
    }
  }
}

#[derive(Default)]
struct State {
  variables: HashMap<String, Value>,
  current_row: Map<String, Value>,
  data_rows: Vec<Map<String, Value>>,
  loop_stack: Vec<LoopFrame>,
}

#[derive(Default)]
struct Handles {
  browser: Option<(Arc<dyn BrowserSession>, ReleaserGuard)>,
  current_page: Option<PageRef>,
  current_frame: Option<FrameRef>,
  iframe_locator: Option<String>,
  attached: Vec<(Arc<dyn ExternalHandle>, ReleaserGuard)>,
}

/// State shared by every module invocation of one workflow run.
pub struct ExecutionContext {
  execution_id: String,
  state: Mutex<State>,
  handles: Mutex<Handles>,
  logs: Mutex<LogBuffer>,
  should_break: AtomicBool,
  should_continue: AtomicBool,
  /// Rows streamed so far. Held from commit to emit so previews leave in
  /// table order; always locked after `state`.
  previewed: Mutex<usize>,
  preview_limit: usize,
  notifier: Arc<dyn ExecutionNotifier>,
  kill: KillSwitch,
  user_data_dir: Option<PathBuf>,
  trigger_manager: Option<Arc<dyn TriggerManager>>,
}

impl ExecutionContext {
  pub fn new(
    execution_id: impl Into<String>,
    notifier: Arc<dyn ExecutionNotifier>,
    options: ContextOptions,
  ) -> Self {
    Self {
      execution_id: execution_id.into(),
      state: Mutex::new(State::default()),
      handles: Mutex::new(Handles::default()),
      logs: Mutex::new(LogBuffer::new(options.log_capacity)),
      should_break: AtomicBool::new(false),
      should_continue: AtomicBool::new(false),
      previewed: Mutex::new(0),
      preview_limit: options.data_preview_limit,
      notifier,
      kill: KillSwitch::new(),
      user_data_dir: options.user_data_dir,
      trigger_manager: options.trigger_manager,
    }
  }

  pub fn execution_id(&self) -> &str {
    &self.execution_id
  }

  fn state(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn previewed(&self) -> MutexGuard<'_, usize> {
    self.previewed.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn handles(&self) -> MutexGuard<'_, Handles> {
    self.handles.lock().unwrap_or_else(|e| e.into_inner())
  }

  // Variables

  pub fn get(&self, name: &str) -> Option<Value> {
    self.state().variables.get(name).cloned()
  }

  pub fn get_or(&self, name: &str, default: Value) -> Value {
    self.get(name).unwrap_or(default)
  }

  pub fn has(&self, name: &str) -> bool {
    self.state().variables.contains_key(name)
  }

  /// Write a variable and notify observers.
  pub fn set(&self, name: impl Into<String>, value: Value) {
    let name = name.into();
    self.state().variables.insert(name.clone(), value.clone());
    debug!(execution_id = %self.execution_id, variable = %name, "variable_updated");
    self.emit(ExecutionEvent::VariableUpdated {
      execution_id: self.execution_id.clone(),
      name,
      value,
    });
  }

  /// Read-modify-write a variable under the context lock, so concurrent
  /// updates from parallel nodes are not lost. Observers are notified when
  /// the variable exists afterwards.
  pub fn modify<T>(&self, name: &str, f: impl FnOnce(&mut Option<Value>) -> T) -> T {
    let (out, after) = {
      let mut state = self.state();
      let mut slot = state.variables.remove(name);
      let out = f(&mut slot);
      if let Some(value) = &slot {
        state.variables.insert(name.to_string(), value.clone());
      }
      (out, slot)
    };

    if let Some(value) = after {
      self.emit(ExecutionEvent::VariableUpdated {
        execution_id: self.execution_id.clone(),
        name: name.to_string(),
        value,
      });
    }
    out
  }

  pub fn remove(&self, name: &str) -> Option<Value> {
    self.state().variables.remove(name)
  }

  /// Snapshot of all variables.
  pub fn variables(&self) -> HashMap<String, Value> {
    self.state().variables.clone()
  }

  // Data rows

  /// Write a field of the uncommitted row.
  pub fn add_data_value(&self, column: impl Into<String>, value: Value) {
    self.state().current_row.insert(column.into(), value);
  }

  pub fn current_row(&self) -> Map<String, Value> {
    self.state().current_row.clone()
  }

  /// Append the current row to the table and start a new one. Returns false
  /// when the current row is empty.
  pub fn commit_row(&self) -> bool {
    let mut state = self.state();
    if state.current_row.is_empty() {
      return false;
    }
    let row = std::mem::take(&mut state.current_row);
    state.data_rows.push(row.clone());
    let mut previewed = self.previewed();
    drop(state);

    if *previewed < self.preview_limit {
      *previewed += 1;
      self.emit(ExecutionEvent::DataRow {
        execution_id: self.execution_id.clone(),
        row,
      });
    }
    true
  }

  pub fn data_rows(&self) -> Vec<Map<String, Value>> {
    self.state().data_rows.clone()
  }

  /// The full table collected by the run.
  pub fn get_collected_data(&self) -> Vec<Map<String, Value>> {
    self.data_rows()
  }

  pub fn clear_data(&self) {
    let mut state = self.state();
    state.data_rows.clear();
    state.current_row.clear();
    *self.previewed() = 0;
  }

  // Loop stack

  pub fn push_loop(&self, frame: LoopFrame) {
    self.state().loop_stack.push(frame);
  }

  pub fn pop_loop(&self) -> Option<LoopFrame> {
    self.state().loop_stack.pop()
  }

  /// Innermost live loop.
  pub fn current_loop(&self) -> Option<LoopFrame> {
    self.state().loop_stack.last().cloned()
  }

  /// Mutate the innermost frame. Returns false when no loop is live.
  pub fn update_loop(&self, f: impl FnOnce(&mut LoopFrame)) -> bool {
    match self.state().loop_stack.last_mut() {
      Some(frame) => {
        f(frame);
        true
      }
      None => false,
    }
  }

  pub fn loop_depth(&self) -> usize {
    self.state().loop_stack.len()
  }

  pub fn request_break(&self) {
    self.should_break.store(true, Ordering::SeqCst);
  }

  pub fn request_continue(&self) {
    self.should_continue.store(true, Ordering::SeqCst);
  }

  pub fn should_break(&self) -> bool {
    self.should_break.load(Ordering::SeqCst)
  }

  pub fn should_continue(&self) -> bool {
    self.should_continue.load(Ordering::SeqCst)
  }

  /// Consume the break flag.
  pub fn take_break(&self) -> bool {
    self.should_break.swap(false, Ordering::SeqCst)
  }

  /// Consume the continue flag.
  pub fn take_continue(&self) -> bool {
    self.should_continue.swap(false, Ordering::SeqCst)
  }

  // Cancellation

  pub fn kill_switch(&self) -> &KillSwitch {
    &self.kill
  }

  /// Register a releaser run by `stop()`, e.g. to close a socket a module
  /// is blocked on.
  pub fn on_cancel(&self, releaser: impl FnOnce() + Send + 'static) -> ReleaserGuard {
    self.kill.on_cancel(releaser)
  }

  pub fn cancellation_token(&self) -> CancellationToken {
    self.kill.token()
  }

  pub fn is_cancelled(&self) -> bool {
    self.kill.is_fired()
  }

  /// Fire the kill switch. Idempotent.
  pub fn stop(&self) {
    let released = self.kill.fire();
    if released > 0 {
      info!(execution_id = %self.execution_id, releasers = released, "handles_interrupted");
    }
  }

  // External handles

  /// Attach a browser session. Its `kill` runs if the run is stopped.
  pub fn set_browser(&self, browser: Arc<dyn BrowserSession>) {
    let killer = browser.clone();
    let guard = self.kill.on_cancel(move || killer.kill());
    let mut handles = self.handles();
    handles.browser = Some((browser, guard));
    handles.current_page = None;
    handles.current_frame = None;
  }

  pub fn browser(&self) -> Option<Arc<dyn BrowserSession>> {
    self.handles().browser.as_ref().map(|(b, _)| b.clone())
  }

  /// Frame locator subsequent browser operations should target. `None`
  /// targets the main frame.
  pub fn set_iframe_locator(&self, locator: Option<String>) {
    let mut handles = self.handles();
    handles.iframe_locator = locator;
    handles.current_frame = None;
  }

  pub fn iframe_locator(&self) -> Option<String> {
    self.handles().iframe_locator.clone()
  }

  pub fn current_page(&self) -> Option<PageRef> {
    self.handles().current_page.clone()
  }

  /// Focus the most recently opened page.
  pub async fn switch_to_latest_page(&self) -> Result<PageRef, HandleError> {
    let browser = self.browser().ok_or(HandleError::NoBrowser)?;
    let page = browser
      .pages()
      .await?
      .pop()
      .ok_or(HandleError::NoPage)?;

    let mut handles = self.handles();
    if handles.current_page.as_ref() != Some(&page) {
      debug!(execution_id = %self.execution_id, page = %page.id, url = %page.url, "page_switched");
      handles.current_frame = None;
    }
    handles.current_page = Some(page.clone());
    Ok(page)
  }

  /// Frame to operate on: the iframe locator inside the current page when
  /// one is set, else the page's main frame. Re-resolved after navigation.
  pub async fn get_current_frame(&self) -> Result<FrameRef, HandleError> {
    let page = match self.current_page() {
      Some(page) => page,
      None => self.switch_to_latest_page().await?,
    };

    let (browser, locator) = {
      let handles = self.handles();
      if let Some(frame) = &handles.current_frame {
        if frame.page_id == page.id {
          return Ok(frame.clone());
        }
      }
      (
        handles.browser.as_ref().map(|(b, _)| b.clone()),
        handles.iframe_locator.clone(),
      )
    };

    let frame = match locator {
      Some(locator) => {
        let browser = browser.ok_or(HandleError::NoBrowser)?;
        browser.frame(&page, &locator).await?
      }
      None => FrameRef {
        page_id: page.id.clone(),
        locator: None,
      },
    };

    self.handles().current_frame = Some(frame.clone());
    Ok(frame)
  }

  /// Hand a resource to the run. It is closed on release and killed on stop.
  pub fn attach_handle(&self, handle: Arc<dyn ExternalHandle>) {
    let killer = handle.clone();
    let guard = self.kill.on_cancel(move || killer.kill());
    debug!(execution_id = %self.execution_id, handle = %handle.name(), "handle_attached");
    self.handles().attached.push((handle, guard));
  }

  pub fn handle_names(&self) -> Vec<String> {
    self
      .handles()
      .attached
      .iter()
      .map(|(h, _)| h.name().to_string())
      .collect()
  }

  /// Close every attached handle. The browser is closed too unless
  /// `keep_browser` is set, in which case it is returned to the caller.
  /// Close failures are logged and swallowed.
  pub async fn release_handles(&self, keep_browser: bool) -> Option<Arc<dyn BrowserSession>> {
    let (browser, attached) = {
      let mut handles = self.handles();
      handles.current_page = None;
      handles.current_frame = None;
      (handles.browser.take(), std::mem::take(&mut handles.attached))
    };

    for (handle, _guard) in attached.into_iter().rev() {
      if let Err(e) = handle.close().await {
        warn!(execution_id = %self.execution_id, handle = %handle.name(), error = %e, "handle_close_failed");
      }
    }

    let (browser, _guard) = browser?;
    if keep_browser {
      return Some(browser);
    }
    if let Err(e) = browser.close().await {
      warn!(execution_id = %self.execution_id, error = %e, "browser_close_failed");
    }
    None
  }

  pub fn user_data_dir(&self) -> Option<&Path> {
    self.user_data_dir.as_deref()
  }

  /// Prepare the browser profile directory before a launch.
  pub fn ensure_user_data_dir(&self) -> Result<Option<PathBuf>, HandleError> {
    match &self.user_data_dir {
      Some(dir) => {
        prepare_user_data_dir(dir)?;
        Ok(Some(dir.clone()))
      }
      None => Ok(None),
    }
  }

  pub fn trigger_manager(&self) -> Option<Arc<dyn TriggerManager>> {
    self.trigger_manager.clone()
  }

  // Logging

  pub fn log(&self, level: LogLevel, message: impl Into<String>) {
    self.push_log(LogEntry::new(level, message));
  }

  pub fn log_node(&self, node_id: &str, level: LogLevel, message: impl Into<String>) {
    self.push_log(LogEntry::new(level, message).for_node(node_id));
  }

  /// Record an entry in the ring, mirror it to tracing and the notifier.
  pub fn push_log(&self, entry: LogEntry) {
    let node_id = entry.node_id.as_deref().unwrap_or("-");
    match entry.level {
      LogLevel::Error => error!(execution_id = %self.execution_id, node_id = %node_id, "{}", entry.message),
      LogLevel::Warning => warn!(execution_id = %self.execution_id, node_id = %node_id, "{}", entry.message),
      LogLevel::Info | LogLevel::Success => {
        info!(execution_id = %self.execution_id, node_id = %node_id, "{}", entry.message)
      }
    }

    self
      .logs
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push(entry.clone());
    self.emit(ExecutionEvent::Log {
      execution_id: self.execution_id.clone(),
      entry,
    });
  }

  /// Snapshot of the log ring, oldest first.
  pub fn logs(&self) -> Vec<LogEntry> {
    self.logs.lock().unwrap_or_else(|e| e.into_inner()).entries()
  }

  pub fn send_progress(&self, message: impl Into<String>, level: Option<LogLevel>) {
    let message = message.into();
    debug!(execution_id = %self.execution_id, message = %message, "progress");
    self.emit(ExecutionEvent::Progress {
      execution_id: self.execution_id.clone(),
      message,
      level: level.unwrap_or_default(),
    });
  }

  /// Deliver an event to the notifier. A panicking notifier is logged and
  /// otherwise ignored.
  pub fn emit(&self, event: ExecutionEvent) {
    if catch_unwind(AssertUnwindSafe(|| self.notifier.notify(event))).is_err() {
      warn!(execution_id = %self.execution_id, "notifier panicked, event dropped");
    }
  }
}

impl Variables for ExecutionContext {
  fn get_var(&self, name: &str) -> Option<Value> {
    self.get(name)
  }

  fn snapshot(&self) -> Map<String, Value> {
    self
      .state()
      .variables
      .iter()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect()
  }
}
