use std::path::PathBuf;

use async_trait::async_trait;
use kestrel_context::{ExecutionContext, LogLevel, ModuleResult};
use kestrel_module::{Module, ModuleConfig, ModuleError};
use serde_json::json;

/// `print_log`: put `message` in the run log at `level`.
///
/// The message travels in the result; the scheduler records it with the
/// node's completion entry.
pub struct PrintLog;

#[async_trait]
impl Module for PrintLog {
  fn module_type(&self) -> &str {
    "print_log"
  }

  async fn execute(&self, config: &ModuleConfig, _ctx: &ExecutionContext) -> Result<ModuleResult, ModuleError> {
    let message = config.str_or("message", "");
    let level = LogLevel::parse(&config.str_or("level", "info"));
    Ok(ModuleResult::ok_with(message).with_log_level(level))
  }
}

/// `export_log`: write the run log collected so far to `filePath`, as JSON
/// when `format` is `json` (or the path ends in `.json`), else as text.
pub struct ExportLog;

#[async_trait]
impl Module for ExportLog {
  fn module_type(&self) -> &str {
    "export_log"
  }

  async fn execute(&self, config: &ModuleConfig, ctx: &ExecutionContext) -> Result<ModuleResult, ModuleError> {
    let path = PathBuf::from(config.require_str("filePath")?);
    let as_json = match config.str("format") {
      Some(format) => format.eq_ignore_ascii_case("json"),
      None => path.extension().is_some_and(|ext| ext == "json"),
    };

    let entries = ctx.logs();
    let contents = if as_json {
      serde_json::to_string_pretty(&entries).map_err(|e| ModuleError::failed(e.to_string()))?
    } else {
      entries
        .iter()
        .map(|entry| {
          format!(
            "[{}] [{}] {}{}\n",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.level,
            entry.node_id.as_deref().map(|id| format!("[{id}] ")).unwrap_or_default(),
            entry.message
          )
        })
        .collect()
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| ModuleError::failed(format!("failed to create '{}': {e}", parent.display())))?;
    }
    tokio::fs::write(&path, contents)
      .await
      .map_err(|e| ModuleError::failed(format!("failed to write '{}': {e}", path.display())))?;

    Ok(
      ModuleResult::ok_with(format!("exported {} log entries to {}", entries.len(), path.display()))
        .with_data(json!({ "path": path.display().to_string(), "entries": entries.len() })),
    )
  }
}
