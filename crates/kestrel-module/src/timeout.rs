use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use std::time::Duration;

use kestrel_resolver::parse_int;
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, warn};

/// Node config key overriding the module's default timeout, in milliseconds.
pub const TIMEOUT_KEY: &str = "timeout";

const BUILTIN_TABLE: &str = include_str!("default_timeouts.json");

#[derive(Debug, Deserialize)]
struct TimeoutTable {
  default_ms: u64,
  #[serde(default)]
  exempt: Vec<String>,
  #[serde(default)]
  abort_on_failure: Vec<String>,
  #[serde(default)]
  modules: HashMap<String, u64>,
}

/// How long each module may run, and which failures abort their subtree.
///
/// A timeout of 0 means unbounded. Exempt modules (waits, schedulers, loops,
/// subflows, prompts, players, triggers) manage their own waiting, so a
/// node's `timeout` override is ignored for them.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutPolicy {
  default_ms: u64,
  exempt: HashSet<String>,
  critical: HashSet<String>,
  modules: HashMap<String, u64>,
}

impl TimeoutPolicy {
  /// The table bundled with the engine.
  pub fn builtin() -> &'static TimeoutPolicy {
    static BUILTIN: OnceLock<TimeoutPolicy> = OnceLock::new();
    BUILTIN.get_or_init(|| {
      Self::from_json(BUILTIN_TABLE).unwrap_or_else(|e| {
        error!(error = %e, "bundled timeout table is invalid, using a flat default");
        Self::flat(30_000)
      })
    })
  }

  /// Parse a timeout table.
  pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
    let table: TimeoutTable = serde_json::from_str(json)?;
    Ok(Self {
      default_ms: table.default_ms,
      exempt: table.exempt.into_iter().collect(),
      critical: table.abort_on_failure.into_iter().collect(),
      modules: table.modules,
    })
  }

  /// Same timeout for every module, nothing exempt, nothing critical.
  pub fn flat(default_ms: u64) -> Self {
    Self {
      default_ms,
      exempt: HashSet::new(),
      critical: HashSet::new(),
      modules: HashMap::new(),
    }
  }

  /// Change the timeout used for types missing from the table.
  pub fn with_default_ms(mut self, default_ms: u64) -> Self {
    self.default_ms = default_ms;
    self
  }

  /// Replace the set of modules whose failure aborts their subtree.
  pub fn with_critical_modules(mut self, modules: impl IntoIterator<Item = String>) -> Self {
    self.critical = modules.into_iter().collect();
    self
  }

  pub fn set_timeout(&mut self, module_type: impl Into<String>, ms: u64) {
    self.modules.insert(module_type.into(), ms);
  }

  pub fn default_ms(&self) -> u64 {
    self.default_ms
  }

  /// Declared default for a module type, in milliseconds.
  pub fn timeout_ms(&self, module_type: &str) -> u64 {
    self
      .modules
      .get(module_type)
      .copied()
      .unwrap_or(self.default_ms)
  }

  pub fn is_exempt(&self, module_type: &str) -> bool {
    self.exempt.contains(module_type)
  }

  /// Whether a failure without an error branch aborts the node's subtree.
  pub fn is_critical(&self, module_type: &str) -> bool {
    self.critical.contains(module_type)
  }

  pub fn critical_modules(&self) -> Vec<String> {
    let mut modules: Vec<String> = self.critical.iter().cloned().collect();
    modules.sort();
    modules
  }

  /// Effective timeout in milliseconds for a node, 0 meaning unbounded.
  ///
  /// `node_override` is the node's `timeout` config value. It is ignored for
  /// exempt modules and when it is not a non-negative integer.
  pub fn effective_ms(&self, module_type: &str, node_override: Option<&Value>) -> u64 {
    let declared = self.timeout_ms(module_type);
    if self.is_exempt(module_type) {
      return declared;
    }

    match node_override {
      None | Some(Value::Null) => declared,
      Some(Value::String(s)) if s.trim().is_empty() => declared,
      Some(value) => match parse_int(value) {
        Some(ms) if ms >= 0 => ms as u64,
        _ => {
          warn!(module_type = %module_type, value = %value, "ignoring invalid timeout override");
          declared
        }
      },
    }
  }

  /// Effective timeout as a duration; `None` when unbounded.
  pub fn effective_timeout(&self, module_type: &str, node_override: Option<&Value>) -> Option<Duration> {
    match self.effective_ms(module_type, node_override) {
      0 => None,
      ms => Some(Duration::from_millis(ms)),
    }
  }

  /// `(module_type, default_ms)` for every listed type, sorted by type.
  pub fn entries(&self) -> Vec<(String, u64)> {
    let mut entries: Vec<(String, u64)> = self.modules.iter().map(|(k, v)| (k.clone(), *v)).collect();
    entries.sort();
    entries
  }
}

impl Default for TimeoutPolicy {
  fn default() -> Self {
    Self::builtin().clone()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_bundled_table_parses() {
    let policy = TimeoutPolicy::from_json(BUILTIN_TABLE).unwrap();
    assert!(policy.entries().len() >= 120);
    assert_eq!(&policy, TimeoutPolicy::builtin());
  }

  #[test]
  fn test_exempt_modules_are_unbounded_and_ignore_overrides() {
    let policy = TimeoutPolicy::builtin();
    for module_type in ["wait", "scheduled_task", "loop", "foreach", "subflow"] {
      assert!(policy.is_exempt(module_type), "{module_type}");
      assert_eq!(policy.effective_timeout(module_type, Some(&json!(5))), None);
    }
  }

  #[test]
  fn test_node_override() {
    let policy = TimeoutPolicy::builtin();
    let declared = policy.timeout_ms("http_request");
    assert!(declared > 0);
    assert_eq!(policy.effective_ms("http_request", None), declared);
    assert_eq!(policy.effective_ms("http_request", Some(&json!(250))), 250);
    assert_eq!(policy.effective_ms("http_request", Some(&json!("1500"))), 1500);
    assert_eq!(policy.effective_timeout("http_request", Some(&json!(0))), None);
    assert_eq!(policy.effective_ms("http_request", Some(&json!(-3))), declared);
    assert_eq!(policy.effective_ms("http_request", Some(&json!("soon"))), declared);
    assert_eq!(policy.effective_ms("http_request", Some(&json!(""))), declared);
  }

  #[test]
  fn test_unknown_type_uses_default() {
    let policy = TimeoutPolicy::flat(1234);
    assert_eq!(policy.timeout_ms("anything"), 1234);
    assert_eq!(policy.clone().with_default_ms(0).effective_timeout("anything", None), None);
  }

  #[test]
  fn test_critical_modules() {
    let policy = TimeoutPolicy::builtin();
    assert!(policy.is_critical("click_element"));
    assert!(!policy.is_critical("print_log"));

    let custom = policy.clone().with_critical_modules(["print_log".to_string()]);
    assert_eq!(custom.critical_modules(), vec!["print_log".to_string()]);
  }
}
