use async_trait::async_trait;
use kestrel_context::{Control, ExecutionContext, LogLevel, LoopKind, LoopSpec, ModuleResult};
use kestrel_module::{Module, ModuleConfig, ModuleError};
use kestrel_resolver::{evaluate_condition, parse_float, to_display};
use serde_json::{Value, json};

const DEFAULT_MAX_ITERATIONS: u64 = 1000;

/// `condition`: routes to the `true` or `false` branch.
///
/// Compare mode uses `leftValue`, `operator`, `rightValue`. Expression mode
/// (`conditionType = "expression"`, or only `condition` set) evaluates the
/// `condition` expression.
pub struct Condition;

#[async_trait]
impl Module for Condition {
  fn module_type(&self) -> &str {
    "condition"
  }

  async fn execute(&self, config: &ModuleConfig, ctx: &ExecutionContext) -> Result<ModuleResult, ModuleError> {
    let expression_mode = config.str("conditionType").as_deref() == Some("expression")
      || (config.get("leftValue").is_none() && config.raw("condition").is_some());

    let outcome = if expression_mode {
      let expression = config
        .raw("condition")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ModuleError::MissingField {
          field: "condition".into(),
        })?;
      evaluate_condition(expression, ctx)?
    } else {
      let left = config.get("leftValue").cloned().unwrap_or(Value::Null);
      let right = config.get("rightValue").cloned().unwrap_or(Value::Null);
      let operator = config.str_or("operator", "==");
      compare(&left, &operator, &right)?
    };

    Ok(
      ModuleResult::ok_with(format!("condition is {outcome}"))
        .with_branch(if outcome { "true" } else { "false" })
        .with_data(json!({ "result": outcome })),
    )
  }
}

/// Compare two resolved values. Numeric when both sides parse as numbers,
/// textual otherwise.
pub(crate) fn compare(left: &Value, operator: &str, right: &Value) -> Result<bool, ModuleError> {
  let l = to_display(left);
  let r = to_display(right);
  let numbers = match (parse_number(left), parse_number(right)) {
    (Some(a), Some(b)) => Some((a, b)),
    _ => None,
  };

  let result = match operator.trim() {
    "==" | "=" | "equals" | "eq" => match numbers {
      Some((a, b)) => a == b,
      None => l == r,
    },
    "!=" | "not_equals" | "ne" => match numbers {
      Some((a, b)) => a != b,
      None => l != r,
    },
    ">" | "greater_than" | "gt" => ordered(numbers, &l, &r, |o| o.is_gt()),
    ">=" | "greater_or_equal" | "gte" => ordered(numbers, &l, &r, |o| o.is_ge()),
    "<" | "less_than" | "lt" => ordered(numbers, &l, &r, |o| o.is_lt()),
    "<=" | "less_or_equal" | "lte" => ordered(numbers, &l, &r, |o| o.is_le()),
    "contains" => contains(left, &l, right, &r),
    "not_contains" => !contains(left, &l, right, &r),
    "starts_with" => l.starts_with(&r),
    "ends_with" => l.ends_with(&r),
    "is_empty" => is_empty(left),
    "not_empty" => !is_empty(left),
    other => return Err(ModuleError::invalid("operator", format!("unknown operator '{other}'"))),
  };
  Ok(result)
}

fn parse_number(value: &Value) -> Option<f64> {
  match value {
    Value::Number(_) => parse_float(value),
    Value::String(s) if !s.trim().is_empty() => parse_float(value),
    _ => None,
  }
}

fn ordered(
  numbers: Option<(f64, f64)>,
  l: &str,
  r: &str,
  test: impl Fn(std::cmp::Ordering) -> bool,
) -> bool {
  match numbers {
    Some((a, b)) => a.partial_cmp(&b).is_some_and(test),
    None => test(l.cmp(r)),
  }
}

fn contains(left: &Value, l: &str, right: &Value, r: &str) -> bool {
  match left {
    Value::Array(items) => items.iter().any(|item| item == right || to_display(item) == r),
    Value::Object(map) => map.contains_key(r),
    _ => l.contains(r),
  }
}

fn is_empty(value: &Value) -> bool {
  match value {
    Value::Null => true,
    Value::String(s) => s.is_empty(),
    Value::Array(items) => items.is_empty(),
    Value::Object(map) => map.is_empty(),
    _ => false,
  }
}

/// `loop`: count, range, while and foreach loops. Returns a descriptor; the
/// scheduler drives the body.
pub struct Loop;

#[async_trait]
impl Module for Loop {
  fn module_type(&self) -> &str {
    "loop"
  }

  async fn execute(&self, config: &ModuleConfig, ctx: &ExecutionContext) -> Result<ModuleResult, ModuleError> {
    let kind_name = config.str_or("loopType", "count");
    let kind = LoopKind::parse(&kind_name)
      .ok_or_else(|| ModuleError::invalid("loopType", format!("unknown loop type '{kind_name}'")))?;

    let spec = match kind {
      LoopKind::Count => {
        let count = config
          .opt_int("count")
          .or_else(|| config.opt_int("loopCount"))
          .ok_or_else(|| ModuleError::invalid("count", "expected an integer"))?;
        LoopSpec::count(count.max(0))
      }
      LoopKind::Range => {
        let start = config.int("startValue", 0);
        let end = config
          .opt_int("endValue")
          .ok_or_else(|| ModuleError::invalid("endValue", "expected an integer"))?;
        let step = config.int("stepValue", 1);
        if step == 0 {
          return Err(ModuleError::invalid("stepValue", "step cannot be 0"));
        }
        LoopSpec::range(start, end, step)
      }
      LoopKind::While => {
        let condition = config
          .raw("condition")
          .and_then(|v| v.as_str())
          .filter(|s| !s.trim().is_empty())
          .ok_or_else(|| ModuleError::MissingField {
            field: "condition".into(),
          })?;
        let max = config.int("maxIterations", DEFAULT_MAX_ITERATIONS as i64).max(0) as u64;
        LoopSpec::while_condition(condition, max)
      }
      LoopKind::Foreach => LoopSpec::foreach(foreach_items(config, ctx)?),
    };

    let spec = with_variable_names(spec, config);
    Ok(describe(spec))
  }
}

/// `foreach`: iterate a list.
pub struct Foreach;

#[async_trait]
impl Module for Foreach {
  fn module_type(&self) -> &str {
    "foreach"
  }

  async fn execute(&self, config: &ModuleConfig, ctx: &ExecutionContext) -> Result<ModuleResult, ModuleError> {
    let spec = with_variable_names(LoopSpec::foreach(foreach_items(config, ctx)?), config);
    Ok(describe(spec))
  }
}

fn with_variable_names(mut spec: LoopSpec, config: &ModuleConfig) -> LoopSpec {
  if let Some(name) = config.str("indexVariable").filter(|s| !s.is_empty()) {
    spec.index_var = name;
  }
  if let Some(name) = config.str("itemVariable").filter(|s| !s.is_empty()) {
    spec.item_var = Some(name);
  }
  spec
}

fn describe(spec: LoopSpec) -> ModuleResult {
  let message = match spec.kind {
    LoopKind::Count => format!("loop {} times", spec.count.unwrap_or(0)),
    LoopKind::Range => format!(
      "loop from {} to {} step {}",
      spec.start.unwrap_or(0),
      spec.end.unwrap_or(0),
      spec.step.unwrap_or(1)
    ),
    LoopKind::While => "loop while condition holds".to_string(),
    LoopKind::Foreach => format!("iterate {} items", spec.items.as_ref().map_or(0, |i| i.len())),
  };
  ModuleResult::ok_with(message).with_control(Control::Loop(spec))
}

/// The list to iterate: `items` resolved to a list, a JSON array string, or
/// the name of a list variable (`listVariable`).
fn foreach_items(config: &ModuleConfig, ctx: &ExecutionContext) -> Result<Vec<Value>, ModuleError> {
  if let Some(name) = config.str("listVariable").filter(|s| !s.is_empty()) {
    return match ctx.get(&name) {
      Some(value) => as_list("listVariable", value),
      None => Err(ModuleError::invalid("listVariable", format!("variable '{name}' is not set"))),
    };
  }

  match config.get("items").or_else(|| config.get("dataSource")) {
    Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
      Ok(value @ Value::Array(_)) => as_list("items", value),
      _ => match ctx.get(s.trim()) {
        Some(value) => as_list("items", value),
        None => Err(ModuleError::invalid("items", "expected a list")),
      },
    },
    Some(value) => as_list("items", value.clone()),
    None => Err(ModuleError::MissingField {
      field: "items".into(),
    }),
  }
}

fn as_list(field: &str, value: Value) -> Result<Vec<Value>, ModuleError> {
  match value {
    Value::Array(items) => Ok(items),
    Value::Object(map) => Ok(
      map
        .into_iter()
        .map(|(key, value)| json!({ "key": key, "value": value }))
        .collect(),
    ),
    Value::Null => Ok(Vec::new()),
    other => Err(ModuleError::invalid(field, format!("expected a list, got {other}"))),
  }
}

/// `break_loop`: leave the innermost loop after the current iteration.
pub struct BreakLoop;

#[async_trait]
impl Module for BreakLoop {
  fn module_type(&self) -> &str {
    "break_loop"
  }

  async fn execute(&self, _config: &ModuleConfig, ctx: &ExecutionContext) -> Result<ModuleResult, ModuleError> {
    if ctx.loop_depth() == 0 {
      return Ok(ModuleResult::ok_with("break_loop outside of a loop has no effect").with_log_level(LogLevel::Warning));
    }
    ctx.request_break();
    Ok(ModuleResult::ok_with("breaking out of loop"))
  }
}

/// `continue_loop`: skip the rest of the current iteration.
pub struct ContinueLoop;

#[async_trait]
impl Module for ContinueLoop {
  fn module_type(&self) -> &str {
    "continue_loop"
  }

  async fn execute(&self, _config: &ModuleConfig, ctx: &ExecutionContext) -> Result<ModuleResult, ModuleError> {
    if ctx.loop_depth() == 0 {
      return Ok(
        ModuleResult::ok_with("continue_loop outside of a loop has no effect").with_log_level(LogLevel::Warning),
      );
    }
    ctx.request_continue();
    Ok(ModuleResult::ok_with("continuing with next iteration"))
  }
}

/// `subflow`: call a named subflow. The scheduler runs it.
pub struct SubflowCall;

#[async_trait]
impl Module for SubflowCall {
  fn module_type(&self) -> &str {
    "subflow"
  }

  async fn execute(&self, config: &ModuleConfig, _ctx: &ExecutionContext) -> Result<ModuleResult, ModuleError> {
    let target = ["subflowName", "subflowId", "target"]
      .iter()
      .find_map(|key| config.str(key).filter(|s| !s.trim().is_empty()))
      .ok_or_else(|| ModuleError::MissingField {
        field: "subflowName".into(),
      })?;

    Ok(ModuleResult::ok_with(format!("calling subflow '{target}'")).with_control(Control::Subflow { target }))
  }
}

/// Structural node types. The scheduler never dispatches them; registering
/// them keeps them out of the unknown-module path.
pub struct Structural {
  module_type: &'static str,
}

impl Structural {
  pub fn new(module_type: &'static str) -> Self {
    Self { module_type }
  }
}

#[async_trait]
impl Module for Structural {
  fn module_type(&self) -> &str {
    self.module_type
  }

  async fn execute(&self, _config: &ModuleConfig, _ctx: &ExecutionContext) -> Result<ModuleResult, ModuleError> {
    Ok(ModuleResult::ok())
  }
}

/// `raise_error`: fail deliberately with `message`.
pub struct RaiseError;

#[async_trait]
impl Module for RaiseError {
  fn module_type(&self) -> &str {
    "raise_error"
  }

  async fn execute(&self, config: &ModuleConfig, _ctx: &ExecutionContext) -> Result<ModuleResult, ModuleError> {
    Ok(ModuleResult::failure(config.str_or("message", "error raised by workflow")))
  }
}
