use std::collections::HashMap;
use std::time::Duration;

use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use promptloom_core::error::{LoomError, Result};
use promptloom_core::graph::Node;
use promptloom_core::run::NodeResult;

use super::{node_data, NodeRunner};
use crate::context::ExecutionContext;
use crate::template;

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Deserialize)]
struct ApiData {
    #[serde(default)]
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    output_variable: Option<String>,
}

/// Issue an HTTP request with placeholder-resolved URL, headers and body.
/// Transport failures abort the run; non-2xx responses are recorded with
/// their status code and parsed body, mirroring how HTTP clients treat
/// status codes as data rather than errors.
pub(super) async fn execute(
    runner: &NodeRunner,
    node: &Node,
    ctx: &mut ExecutionContext,
) -> Result<NodeResult> {
    let data: ApiData = node_data(node)?;

    let method = match data.method.to_uppercase().as_str() {
        "GET" => Method::GET,
        "POST" => Method::POST,
        "PUT" => Method::PUT,
        "PATCH" => Method::PATCH,
        "DELETE" => Method::DELETE,
        other => return Err(LoomError::UnsupportedMethod(other.to_string())),
    };

    // URL substitutions are percent-encoded; header and body substitutions
    // are plain text
    let url = template::resolve_url(&data.url, &ctx.variables);

    let mut request = runner
        .http
        .request(method.clone(), &url)
        .timeout(Duration::from_secs(runner.config.request_timeout_secs));

    for (name, value) in &data.headers {
        request = request.header(name, template::resolve(value, &ctx.variables));
    }

    if method != Method::GET {
        match data.body {
            Some(Value::String(body)) => {
                request = request.body(template::resolve(&body, &ctx.variables));
            }
            Some(body) => {
                request = request.json(&body);
            }
            None => {}
        }
    }

    info!(node_id = %node.id, method = %method, url = %url, "api node issuing request");

    let response = request
        .send()
        .await
        .map_err(|e| LoomError::Http(e.to_string()))?;

    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| LoomError::Http(e.to_string()))?;

    // Parsed JSON when the body is JSON, raw text otherwise
    let payload = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

    let output_variable = data
        .output_variable
        .unwrap_or_else(|| "api_result".to_string());
    ctx.set_variable(&output_variable, payload.clone());

    Ok(NodeResult::success()
        .with_output_variable(output_variable)
        .with_extra("status_code", json!(status))
        .with_extra("response", payload))
}
