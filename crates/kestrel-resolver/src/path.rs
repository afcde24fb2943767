use serde_json::Value;

use crate::vars::Variables;

/// Look up a placeholder name.
///
/// An exact variable name always wins. Otherwise the name is treated as a
/// path: `a.b`, `a[0]` and `a.0.b` walk into maps and lists starting at the
/// variable `a`.
pub fn lookup<V: Variables + ?Sized>(vars: &V, name: &str) -> Option<Value> {
  if let Some(value) = vars.get_var(name) {
    return Some(value);
  }

  let mut segments = split_path(name)?.into_iter();
  let root = segments.next()?;
  let mut current = vars.get_var(root)?;

  for segment in segments {
    current = match &current {
      Value::Object(map) => map.get(segment)?.clone(),
      Value::Array(items) => {
        let index: usize = segment.parse().ok()?;
        items.get(index)?.clone()
      }
      _ => return None,
    };
  }

  Some(current)
}

/// Split `a.b[0].c` into `["a", "b", "0", "c"]`. `None` when the path is
/// malformed or has a single segment.
fn split_path(path: &str) -> Option<Vec<&str>> {
  let mut segments = Vec::new();
  let mut rest = path;

  while !rest.is_empty() {
    if let Some(stripped) = rest.strip_prefix('[') {
      let end = stripped.find(']')?;
      segments.push(stripped[..end].trim());
      rest = &stripped[end + 1..];
      rest = rest.strip_prefix('.').unwrap_or(rest);
      continue;
    }

    let end = rest.find(['.', '[']).unwrap_or(rest.len());
    if end == 0 {
      return None;
    }
    segments.push(&rest[..end]);
    rest = &rest[end..];
    rest = rest.strip_prefix('.').unwrap_or(rest);
  }

  if segments.len() < 2 || segments.iter().any(|s| s.is_empty()) {
    return None;
  }
  Some(segments)
}
