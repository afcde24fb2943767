use async_trait::async_trait;
use kestrel_context::{ExecutionContext, ModuleResult};
use kestrel_module::{Module, ModuleConfig, ModuleError};
use kestrel_resolver::{evaluate_expression, parse_bool, parse_float, to_display};
use serde_json::{Number, Value, json};

/// `set_variable`: write `variableValue` to `variableName`.
///
/// `valueType` selects the conversion: `auto` (default) keeps typed values
/// and turns numeric or boolean text into numbers or booleans, `string`,
/// `number`, `boolean`, `json`, and `expression` which evaluates the
/// unresolved value as an expression.
pub struct SetVariable;

#[async_trait]
impl Module for SetVariable {
  fn module_type(&self) -> &str {
    "set_variable"
  }

  async fn execute(&self, config: &ModuleConfig, ctx: &ExecutionContext) -> Result<ModuleResult, ModuleError> {
    let name = config.require_str("variableName")?;
    let value_type = config.str_or("valueType", "auto");
    let raw = config.get("variableValue").cloned().unwrap_or(Value::Null);

    let value = match value_type.as_str() {
      "auto" => auto_value(raw),
      "string" | "text" => Value::String(to_display(&raw)),
      "number" => parse_float(&raw)
        .map(number_value)
        .ok_or_else(|| ModuleError::invalid("variableValue", format!("'{}' is not a number", to_display(&raw))))?,
      "boolean" | "bool" => parse_bool(&raw)
        .map(Value::Bool)
        .ok_or_else(|| ModuleError::invalid("variableValue", format!("'{}' is not a boolean", to_display(&raw))))?,
      "json" => match raw {
        Value::String(s) => serde_json::from_str(&s).map_err(|e| ModuleError::invalid("variableValue", e.to_string()))?,
        other => other,
      },
      "expression" => {
        let expression = config
          .raw("variableValue")
          .and_then(|v| v.as_str())
          .ok_or_else(|| ModuleError::invalid("variableValue", "expression must be a string"))?;
        evaluate_expression(expression, ctx)?
      }
      other => return Err(ModuleError::invalid("valueType", format!("unknown value type '{other}'"))),
    };

    ctx.set(name.clone(), value.clone());
    Ok(ModuleResult::ok_with(format!("{name} = {}", to_display(&value))).with_data(value))
  }
}

/// Numeric and boolean text becomes typed; everything else is kept.
fn auto_value(value: Value) -> Value {
  let Value::String(s) = &value else {
    return value;
  };
  let trimmed = s.trim();
  if let Ok(n) = trimmed.parse::<i64>() {
    return json!(n);
  }
  if let Ok(f) = trimmed.parse::<f64>() {
    if f.is_finite() {
      return number_value(f);
    }
  }
  match trimmed {
    "true" => Value::Bool(true),
    "false" => Value::Bool(false),
    _ => value,
  }
}

/// Integral floats are stored as integers.
fn number_value(f: f64) -> Value {
  if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
    json!(f as i64)
  } else {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
  }
}

/// `increment_decrement`: add or subtract `step` (default 1) from a numeric
/// variable. A missing variable counts as 0.
pub struct IncrementDecrement;

#[async_trait]
impl Module for IncrementDecrement {
  fn module_type(&self) -> &str {
    "increment_decrement"
  }

  async fn execute(&self, config: &ModuleConfig, ctx: &ExecutionContext) -> Result<ModuleResult, ModuleError> {
    let name = config.require_str("variableName")?;
    let operation = config.str_or("operation", "increment");
    let step = config.get("step").or_else(|| config.get("amount")).cloned().unwrap_or(json!(1));
    let step = parse_float(&step).ok_or_else(|| ModuleError::invalid("step", "expected a number"))?;
    let sign = match operation.as_str() {
      "increment" | "+" | "add" => 1.0,
      "decrement" | "-" | "subtract" => -1.0,
      other => return Err(ModuleError::invalid("operation", format!("unknown operation '{other}'"))),
    };

    let updated = ctx.modify(&name, |slot| {
      let current = match slot.as_ref() {
        None | Some(Value::Null) => 0.0,
        Some(value) => parse_float(value).ok_or_else(|| {
          ModuleError::invalid("variableName", format!("'{name}' is not a number"))
        })?,
      };
      let next = number_value(current + sign * step);
      *slot = Some(next.clone());
      Ok::<_, ModuleError>(next)
    })?;

    Ok(ModuleResult::ok_with(format!("{name} = {updated}")).with_data(updated))
  }
}

/// `list_operation`: append, extend, insert, pop, remove, clear, get and
/// length on a list variable.
pub struct ListOperation;

#[async_trait]
impl Module for ListOperation {
  fn module_type(&self) -> &str {
    "list_operation"
  }

  async fn execute(&self, config: &ModuleConfig, ctx: &ExecutionContext) -> Result<ModuleResult, ModuleError> {
    let name = config.require_str("variableName")?;
    let operation = config.require_str("operation")?;
    let value = config.get("value").cloned().unwrap_or(Value::Null);
    let index = config.opt_int("index");
    let result_variable = config.str("resultVariable").filter(|s| !s.is_empty());

    let output = ctx.modify(&name, |slot| {
      let mut list = match slot.take() {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => {
          let message = format!("'{name}' is not a list");
          *slot = Some(other);
          return Err(ModuleError::invalid("variableName", message));
        }
      };
      let output = apply(&mut list, &operation, value, index);
      *slot = Some(Value::Array(list));
      output
    })?;

    if let (Some(target), Some(output)) = (&result_variable, &output) {
      ctx.set(target.clone(), output.clone());
    }

    let mut result = ModuleResult::ok_with(format!("{operation} on '{name}'"));
    if let Some(output) = output {
      result = result.with_data(output);
    }
    Ok(result)
  }
}

fn apply(list: &mut Vec<Value>, operation: &str, value: Value, index: Option<i64>) -> Result<Option<Value>, ModuleError> {
  match operation {
    "append" | "push" => {
      list.push(value);
      Ok(None)
    }
    "extend" => {
      let items = match value {
        Value::Array(items) => items,
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
          Ok(Value::Array(items)) => items,
          _ => return Err(ModuleError::invalid("value", "extend expects a list")),
        },
        _ => return Err(ModuleError::invalid("value", "extend expects a list")),
      };
      list.extend(items);
      Ok(None)
    }
    "insert" => {
      let at = match index {
        Some(i) => position(list.len() + 1, i)?,
        None => list.len(),
      };
      list.insert(at, value);
      Ok(None)
    }
    "pop" => {
      if list.is_empty() {
        return Err(ModuleError::failed("cannot pop from an empty list"));
      }
      let at = position(list.len(), index.unwrap_or(-1))?;
      Ok(Some(list.remove(at)))
    }
    "remove" => {
      let text = to_display(&value);
      let found = list.iter().position(|item| *item == value || to_display(item) == text);
      match found {
        Some(at) => Ok(Some(list.remove(at))),
        None => Err(ModuleError::failed(format!("value '{text}' is not in the list"))),
      }
    }
    "clear" => {
      list.clear();
      Ok(None)
    }
    "get" => {
      let at = position(list.len(), index.unwrap_or(0))?;
      Ok(Some(list[at].clone()))
    }
    "length" | "len" => Ok(Some(json!(list.len()))),
    other => Err(ModuleError::invalid("operation", format!("unknown operation '{other}'"))),
  }
}

/// Python-style index: negative counts from the end.
fn position(len: usize, index: i64) -> Result<usize, ModuleError> {
  let resolved = if index < 0 { len as i64 + index } else { index };
  if resolved < 0 || resolved as usize >= len {
    return Err(ModuleError::invalid("index", format!("index {index} out of range")));
  }
  Ok(resolved as usize)
}
