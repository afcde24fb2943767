use std::str::FromStr;

use async_trait::async_trait;
use kestrel_context::{ExecutionContext, ModuleResult};
use kestrel_module::{Module, ModuleConfig, ModuleError};
use reqwest::Method;
use serde_json::{Map, Value, json};
use tracing::debug;

const DEFAULT_RESULT_VARIABLE: &str = "http_response";

/// `http_request`: call `url` with `method`, optional `headers` and `body`.
///
/// The response `{status, headers, body}` is stored in `resultVariable`
/// (default `http_response`). JSON bodies are parsed. Non-2xx statuses fail
/// the node unless `allowErrorStatus` is set.
pub struct HttpRequest {
  client: reqwest::Client,
}

impl HttpRequest {
  pub fn new() -> Self {
    Self {
      client: reqwest::Client::new(),
    }
  }
}

impl Default for HttpRequest {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Module for HttpRequest {
  fn module_type(&self) -> &str {
    "http_request"
  }

  async fn execute(&self, config: &ModuleConfig, ctx: &ExecutionContext) -> Result<ModuleResult, ModuleError> {
    let url = config.require_str("url")?;
    let method_name = config.str_or("method", "GET").to_ascii_uppercase();
    let method = Method::from_str(&method_name)
      .map_err(|_| ModuleError::invalid("method", format!("unknown method '{method_name}'")))?;

    let mut request = self.client.request(method, &url);
    for (name, value) in headers(config)? {
      request = request.header(name, value);
    }
    match config.get("body") {
      None | Some(Value::Null) => {}
      Some(Value::String(s)) if s.is_empty() => {}
      Some(Value::String(s)) => request = request.body(s.clone()),
      Some(other) => request = request.json(other),
    }

    debug!(node_id = %config.node_id, method = %method_name, url = %url, "http_request_sending");
    let token = ctx.cancellation_token();
    let response = tokio::select! {
      response = request.send() => response.map_err(|e| ModuleError::failed(format!("request failed: {e}")))?,
      _ = token.cancelled() => return Err(ModuleError::Cancelled),
    };

    let status = response.status();
    let response_headers: Map<String, Value> = response
      .headers()
      .iter()
      .filter_map(|(k, v)| Some((k.to_string(), Value::String(v.to_str().ok()?.to_string()))))
      .collect();
    let text = response
      .text()
      .await
      .map_err(|e| ModuleError::failed(format!("failed to read response: {e}")))?;
    let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

    let payload = json!({
      "status": status.as_u16(),
      "headers": response_headers,
      "body": body,
    });
    let variable = config
      .str("resultVariable")
      .filter(|s| !s.is_empty())
      .unwrap_or_else(|| DEFAULT_RESULT_VARIABLE.to_string());
    ctx.set(variable, payload.clone());

    if !status.is_success() && !config.bool("allowErrorStatus", false) {
      return Ok(ModuleResult::failure(format!("HTTP {status}")).with_data(payload));
    }
    Ok(ModuleResult::ok_with(format!("HTTP {status}")).with_data(payload))
  }
}

/// Headers from a map or a JSON object string.
fn headers(config: &ModuleConfig) -> Result<Vec<(String, String)>, ModuleError> {
  let map = match config.get("headers") {
    None | Some(Value::Null) => return Ok(Vec::new()),
    Some(Value::String(s)) if s.trim().is_empty() => return Ok(Vec::new()),
    Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
      Ok(Value::Object(map)) => map,
      _ => return Err(ModuleError::invalid("headers", "expected a JSON object")),
    },
    Some(Value::Object(map)) => map.clone(),
    Some(_) => return Err(ModuleError::invalid("headers", "expected an object")),
  };

  Ok(
    map
      .into_iter()
      .map(|(k, v)| {
        let value = match v {
          Value::String(s) => s,
          other => other.to_string(),
        };
        (k, value)
      })
      .collect(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_headers_from_string() {
    let config = ModuleConfig::from_map(
      "http_request",
      json!({ "headers": "{\"X-Token\": \"abc\", \"X-Retry\": 3}" })
        .as_object()
        .cloned()
        .unwrap(),
    );
    let mut parsed = headers(&config).unwrap();
    parsed.sort();
    assert_eq!(
      parsed,
      vec![
        ("X-Retry".to_string(), "3".to_string()),
        ("X-Token".to_string(), "abc".to_string()),
      ]
    );
  }

  #[test]
  fn test_headers_rejects_lists() {
    let config = ModuleConfig::from_map("http_request", json!({ "headers": [1] }).as_object().cloned().unwrap());
    assert!(headers(&config).is_err());
  }
}
