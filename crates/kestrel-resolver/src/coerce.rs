use serde_json::Value;

use crate::resolve::resolve;
use crate::vars::Variables;

/// Resolve then parse as an integer, falling back to `default`.
pub fn to_int<V: Variables + ?Sized>(value: &Value, vars: &V, default: i64) -> i64 {
  parse_int(&resolve(value, vars)).unwrap_or(default)
}

/// Resolve then parse as a float, falling back to `default`.
pub fn to_float<V: Variables + ?Sized>(value: &Value, vars: &V, default: f64) -> f64 {
  parse_float(&resolve(value, vars)).unwrap_or(default)
}

/// Resolve then parse as a boolean, falling back to `default`.
pub fn to_bool<V: Variables + ?Sized>(value: &Value, vars: &V, default: bool) -> bool {
  parse_bool(&resolve(value, vars)).unwrap_or(default)
}

/// Parse an already resolved value as an integer. Floats are truncated.
pub fn parse_int(value: &Value) -> Option<i64> {
  match value {
    Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
    Value::String(s) => {
      let s = s.trim();
      s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
    }
    Value::Bool(b) => Some(i64::from(*b)),
    _ => None,
  }
}

/// Parse an already resolved value as a float.
pub fn parse_float(value: &Value) -> Option<f64> {
  match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse::<f64>().ok(),
    Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
    _ => None,
  }
}

/// Parse an already resolved value as a boolean.
pub fn parse_bool(value: &Value) -> Option<bool> {
  match value {
    Value::Bool(b) => Some(*b),
    Value::Number(n) => n.as_f64().map(|f| f != 0.0),
    Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
      "true" | "1" | "yes" | "on" => Some(true),
      "false" | "0" | "no" | "off" | "" => Some(false),
      _ => None,
    },
    Value::Null => Some(false),
    _ => None,
  }
}
