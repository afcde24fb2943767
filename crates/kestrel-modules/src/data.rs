use async_trait::async_trait;
use kestrel_context::{ExecutionContext, ModuleResult};
use kestrel_module::{Module, ModuleConfig, ModuleError};
use serde_json::Value;

/// `add_data`: write `value` into column `columnName` of the current row, or
/// every entry of a `fields` map.
pub struct AddData;

#[async_trait]
impl Module for AddData {
  fn module_type(&self) -> &str {
    "add_data"
  }

  async fn execute(&self, config: &ModuleConfig, ctx: &ExecutionContext) -> Result<ModuleResult, ModuleError> {
    if let Some(Value::Object(fields)) = config.get("fields") {
      for (column, value) in fields {
        ctx.add_data_value(column.clone(), value.clone());
      }
      return Ok(ModuleResult::ok_with(format!("added {} fields", fields.len())));
    }

    let column = config.require_str("columnName")?;
    let value = config.get("value").cloned().unwrap_or(Value::Null);
    ctx.add_data_value(column.clone(), value);
    Ok(ModuleResult::ok_with(format!("added column '{column}'")))
  }
}

/// `commit_row`: append the current row to the collected data.
pub struct CommitRow;

#[async_trait]
impl Module for CommitRow {
  fn module_type(&self) -> &str {
    "commit_row"
  }

  async fn execute(&self, _config: &ModuleConfig, ctx: &ExecutionContext) -> Result<ModuleResult, ModuleError> {
    if ctx.commit_row() {
      Ok(ModuleResult::ok_with(format!("row {} committed", ctx.data_rows().len())))
    } else {
      Ok(ModuleResult::ok_with("current row is empty, nothing committed"))
    }
  }
}
