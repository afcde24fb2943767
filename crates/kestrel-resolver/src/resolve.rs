use serde_json::{Map, Value};

use crate::path::lookup;
use crate::vars::Variables;

/// Resolve a config value against the variables.
///
/// Strings go through placeholder substitution; everything else is returned
/// unchanged.
pub fn resolve<V: Variables + ?Sized>(value: &Value, vars: &V) -> Value {
  match value {
    Value::String(s) => resolve_str(s, vars),
    other => other.clone(),
  }
}

/// Resolve a string.
///
/// A string that is exactly one known placeholder yields the raw value, so
/// `"{items}"` stays a list. Any other string yields a string.
pub fn resolve_str<V: Variables + ?Sized>(input: &str, vars: &V) -> Value {
  if let Some(name) = whole_placeholder(input) {
    if let Some(value) = lookup(vars, name) {
      return value;
    }
  }
  Value::String(render(input, vars))
}

/// Substitute every known placeholder by its string form.
pub fn render<V: Variables + ?Sized>(input: &str, vars: &V) -> String {
  substitute(input, vars, |value, _| to_display(value))
}

/// Substitute placeholders into expression source. Strings become string
/// literals unless the placeholder already sits between matching quotes.
pub(crate) fn render_expression<V: Variables + ?Sized>(input: &str, vars: &V) -> String {
  substitute(input, vars, |value, quoted| match value {
    Value::String(_) if !quoted => value.to_string(),
    Value::Null if !quoted => "none".to_string(),
    other => to_display(other),
  })
}

/// Walk `input`, replacing each placeholder that names a known variable
/// with `splice(value, quoted)`. `quoted` is true when the placeholder is
/// wrapped in a matching pair of `'` or `"`.
fn substitute<V, F>(input: &str, vars: &V, splice: F) -> String
where
  V: Variables + ?Sized,
  F: Fn(&Value, bool) -> String,
{
  let mut out = String::with_capacity(input.len());
  let mut rest = input;

  while let Some(open) = rest.find('{') {
    out.push_str(&rest[..open]);
    let after = &rest[open + 1..];

    match placeholder_end(after) {
      Some(close) => {
        let name = &after[..close];
        let tail = &after[close + 1..];
        match lookup(vars, name) {
          Some(value) => {
            let quoted = out
              .chars()
              .last()
              .is_some_and(|q| matches!(q, '\'' | '"') && tail.starts_with(q));
            out.push_str(&splice(&value, quoted));
          }
          None => {
            out.push('{');
            out.push_str(name);
            out.push('}');
          }
        }
        rest = tail;
      }
      None => {
        out.push('{');
        rest = after;
      }
    }
  }

  out.push_str(rest);
  out
}

/// Resolve every string nested anywhere inside a config map.
pub fn resolve_config<V: Variables + ?Sized>(config: &Map<String, Value>, vars: &V) -> Map<String, Value> {
  config
    .iter()
    .map(|(k, v)| (k.clone(), resolve_deep(v, vars)))
    .collect()
}

fn resolve_deep<V: Variables + ?Sized>(value: &Value, vars: &V) -> Value {
  match value {
    Value::String(s) => resolve_str(s, vars),
    Value::Array(items) => Value::Array(items.iter().map(|v| resolve_deep(v, vars)).collect()),
    Value::Object(map) => Value::Object(resolve_config(map, vars)),
    other => other.clone(),
  }
}

/// The string form used when a value is spliced into text.
pub fn to_display(value: &Value) -> String {
  match value {
    Value::Null => String::new(),
    Value::String(s) => s.clone(),
    Value::Bool(b) => b.to_string(),
    Value::Number(n) => n.to_string(),
    Value::Array(_) | Value::Object(_) => value.to_string(),
  }
}

fn whole_placeholder(input: &str) -> Option<&str> {
  let inner = input.strip_prefix('{')?.strip_suffix('}')?;
  is_placeholder_name(inner).then_some(inner)
}

/// Index of the `}` closing a placeholder whose `{` was just consumed.
fn placeholder_end(after_open: &str) -> Option<usize> {
  let close = after_open.find('}')?;
  is_placeholder_name(&after_open[..close]).then_some(close)
}

fn is_placeholder_name(name: &str) -> bool {
  !name.is_empty()
    && !name
      .chars()
      .any(|c| c.is_whitespace() || matches!(c, '{' | '}' | '"' | '\'' | ':' | ','))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::collections::HashMap;

  fn vars() -> HashMap<String, Value> {
    HashMap::from([
      ("name".to_string(), json!("ada")),
      ("count".to_string(), json!(3)),
      ("ratio".to_string(), json!(0.5)),
      ("flag".to_string(), json!(true)),
      ("items".to_string(), json!([1, 2])),
      ("nothing".to_string(), Value::Null),
      ("user".to_string(), json!({ "id": 9 })),
    ])
  }

  #[test]
  fn test_whole_placeholder_keeps_type() {
    assert_eq!(resolve_str("{count}", &vars()), json!(3));
    assert_eq!(resolve_str("{items}", &vars()), json!([1, 2]));
    assert_eq!(resolve_str("{flag}", &vars()), json!(true));
    assert_eq!(resolve_str("{user.id}", &vars()), json!(9));
  }

  #[test]
  fn test_embedded_placeholders_are_stringified() {
    assert_eq!(resolve_str("hi {name}!", &vars()), json!("hi ada!"));
    assert_eq!(resolve_str("{count}{count}", &vars()), json!("33"));
    assert_eq!(render("{ratio} {flag} {nothing}|", &vars()), "0.5 true |");
    assert_eq!(render("list={items}", &vars()), "list=[1,2]");
  }

  #[test]
  fn test_missing_placeholder_left_literal() {
    assert_eq!(resolve_str("{missing}", &vars()), json!("{missing}"));
    assert_eq!(render("a {missing} b {name}", &vars()), "a {missing} b ada");
  }

  #[test]
  fn test_non_placeholder_braces_untouched() {
    assert_eq!(render(r#"{"a": 1}"#, &vars()), r#"{"a": 1}"#);
    assert_eq!(render("{ name }", &vars()), "{ name }");
    assert_eq!(render("{{name}}", &vars()), "{ada}");
    assert_eq!(render("open { only", &vars()), "open { only");
    assert_eq!(render("{}", &vars()), "{}");
  }

  #[test]
  fn test_non_strings_unchanged() {
    assert_eq!(resolve(&json!(5), &vars()), json!(5));
    assert_eq!(resolve(&json!(["{name}"]), &vars()), json!(["{name}"]));
  }

  #[test]
  fn test_resolve_config_is_deep() {
    let config = json!({
      "url": "https://example.com/{user.id}",
      "count": "{count}",
      "nested": { "items": ["{name}", 4] },
      "timeout": 100,
    });
    let resolved = resolve_config(config.as_object().unwrap(), &vars());
    assert_eq!(
      Value::Object(resolved),
      json!({
        "url": "https://example.com/9",
        "count": 3,
        "nested": { "items": ["ada", 4] },
        "timeout": 100,
      })
    );
  }
}
