use minijinja::Environment;
use serde_json::Value;
use tracing::debug;

use crate::error::ResolveError;
use crate::resolve::render_expression;
use crate::vars::Variables;

/// Evaluate a minijinja expression against the variables.
///
/// Placeholders are substituted first, so both `{count} > 3` and
/// `count > 3` work. String values are spliced in as string literals:
/// `{name} == 'ada'` and `'{name}' == 'ada'` compare the same way.
pub fn evaluate_expression<V: Variables + ?Sized>(expression: &str, vars: &V) -> Result<Value, ResolveError> {
  let source = render_expression(expression, vars);
  let env = Environment::new();

  let compiled = env
    .compile_expression(&source)
    .map_err(|e| ResolveError::InvalidExpression {
      expression: source.clone(),
      message: e.to_string(),
    })?;

  let context = minijinja::Value::from_serialize(vars.snapshot());
  let result = compiled
    .eval(context)
    .map_err(|e| ResolveError::Evaluation {
      expression: source.clone(),
      message: e.to_string(),
    })?;

  let value = serde_json::to_value(&result).map_err(|e| ResolveError::Evaluation {
    expression: source.clone(),
    message: e.to_string(),
  })?;

  debug!(expression = %source, result = %value, "expression_evaluated");
  Ok(value)
}

/// Evaluate an expression for its truthiness.
///
/// Empty expressions are false. A literal `true`/`false` short-circuits.
pub fn evaluate_condition<V: Variables + ?Sized>(expression: &str, vars: &V) -> Result<bool, ResolveError> {
  let trimmed = expression.trim();
  if trimmed.is_empty() {
    return Ok(false);
  }

  let value = evaluate_expression(trimmed, vars)?;
  Ok(truthy(&value))
}

fn truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
    Value::String(s) => !s.is_empty(),
    Value::Array(items) => !items.is_empty(),
    Value::Object(map) => !map.is_empty(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::{Map, json};

  fn vars() -> Map<String, Value> {
    json!({ "x": 5, "items": [1, 2, 3], "name": "ada" })
      .as_object()
      .cloned()
      .unwrap()
  }

  #[test]
  fn test_arithmetic_with_placeholders() {
    assert_eq!(evaluate_expression("{x} + 2", &vars()).unwrap(), json!(7));
    assert_eq!(evaluate_expression("x * 3", &vars()).unwrap(), json!(15));
  }

  #[test]
  fn test_conditions() {
    assert!(evaluate_condition("{x} > 0", &vars()).unwrap());
    assert!(!evaluate_condition("x > 10", &vars()).unwrap());
    assert!(evaluate_condition("items | length == 3", &vars()).unwrap());
    assert!(evaluate_condition("name == 'ada'", &vars()).unwrap());
    assert!(!evaluate_condition("   ", &vars()).unwrap());
  }

  #[test]
  fn test_string_placeholders_become_literals() {
    assert!(evaluate_condition("{name} == 'ada'", &vars()).unwrap());
    assert!(evaluate_condition("'{name}' == 'ada'", &vars()).unwrap());
    assert!(evaluate_condition("\"{name}\" == 'ada'", &vars()).unwrap());
    assert_eq!(
      evaluate_expression("{name} ~ '!'", &vars()).unwrap(),
      json!("ada!")
    );
  }

  #[test]
  fn test_quotes_inside_string_values_stay_literal() {
    let mut vars = vars();
    vars.insert("quote".into(), json!("it's \"fine\""));
    assert!(evaluate_condition("{quote} | length == 11", &vars).unwrap());
  }

  #[test]
  fn test_invalid_expression() {
    let err = evaluate_expression("x +", &vars()).unwrap_err();
    assert!(matches!(err, ResolveError::InvalidExpression { .. }));
  }
}
