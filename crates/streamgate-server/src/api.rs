//! Upstream HTTP execution.
//!
//! Security type comes from the spec when it has an opinion, else from the
//! path-pattern fallback. Credentials and base URL are selected by the
//! routing tables. Responses always carry `status_code`; a 2xx body that is
//! not a JSON object comes back as `{raw_response, status_code}`.

use crate::config::Config;
use crate::error::InvokeError;
use crate::routing::{base_url_for_path, credentials_for, security_type_from_path};
use openapiv3::OpenAPI;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::{json, Map, Value};
use streamgate_openapi::spec::security_type_for_endpoint;

const CONTENT_TYPE_JSON: &str = "application/json";

/// Execute an upstream API call and parse the response.
///
/// `substituted` lists argument keys already materialized into the path;
/// they are not repeated as query parameters. The `resource` and
/// `parameters` discriminators never become query parameters either.
///
/// # Errors
///
/// Returns an error for missing credentials, transport failures, and any
/// response with status >= 400.
#[allow(clippy::too_many_arguments)]
pub async fn execute_api_call(
    client: &Client,
    cfg: &Config,
    spec: &OpenAPI,
    method: &Method,
    path: &str,
    parameters: &Map<String, Value>,
    substituted: &[String],
    request_body: Option<&Value>,
) -> Result<Value, InvokeError> {
    let security_type = security_type_for_endpoint(spec, method.as_str(), path)
        .unwrap_or_else(|| security_type_from_path(path).to_string());
    tracing::debug!(method = %method, path, security_type, "executing upstream call");

    let (api_key, api_secret) = credentials_for(cfg, &security_type, path)
        .filter(|(key, secret)| !key.is_empty() && !secret.is_empty())
        .ok_or_else(|| InvokeError::MissingCredentials(security_type.clone()))?;

    let base_url = base_url_for_path(cfg, path);
    if base_url.is_empty() {
        return Err(InvokeError::BaseUrl(path.to_string()));
    }

    let full_url = format!("{}{}", base_url.trim_end_matches('/'), path);

    let mut request = client
        .request(method.clone(), &full_url)
        .header(CONTENT_TYPE, CONTENT_TYPE_JSON)
        .header(ACCEPT, CONTENT_TYPE_JSON)
        .basic_auth(&api_key, Some(&api_secret));

    if *method == Method::GET {
        let query = query_parameters(parameters, substituted);
        if !query.is_empty() {
            request = request.query(&query);
        }
    }

    if let Some(body) = request_body {
        let bytes = serde_json::to_vec(body)?;
        tracing::debug!(body = %String::from_utf8_lossy(&bytes), "request body");
        request = request.body(bytes);
    }

    let response = request
        .send()
        .await
        .map_err(|e| InvokeError::Transport(e.to_string()))?;

    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| InvokeError::Transport(e.to_string()))?;

    if status >= 400 {
        return Err(InvokeError::UpstreamStatus { status, body });
    }

    parse_response(&body, status)
}

/// Query pairs for a GET: every argument not substituted into the path and
/// not a tool-surface discriminator.
fn query_parameters(
    parameters: &Map<String, Value>,
    substituted: &[String],
) -> Vec<(String, String)> {
    parameters
        .iter()
        .filter(|(key, _)| {
            key.as_str() != "resource"
                && key.as_str() != "parameters"
                && !substituted.iter().any(|s| s == *key)
        })
        .map(|(key, value)| (key.clone(), value_to_string(value)))
        .collect()
}

fn parse_response(body: &str, status: u16) -> Result<Value, InvokeError> {
    if body.trim().is_empty() {
        return Ok(json!({ "status_code": status }));
    }

    match serde_json::from_str::<Map<String, Value>>(body) {
        Ok(mut map) => {
            map.insert("status_code".to_string(), json!(status));
            Ok(Value::Object(map))
        }
        Err(_) => Ok(json!({ "raw_response": body, "status_code": status })),
    }
}

/// Render a JSON value as a URL or path component.
pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
