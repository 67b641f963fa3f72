use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use promptloom_core::error::{LoomError, Result};
use promptloom_core::graph::Node;
use promptloom_core::run::NodeResult;

use super::{node_data, NodeRunner};
use crate::context::ExecutionContext;
use crate::template;

fn default_output_variable() -> String {
    "scraped_data".to_string()
}

#[derive(Deserialize)]
struct ScraperData {
    #[serde(default)]
    url: String,
    #[serde(default)]
    container_selector: String,
    #[serde(default)]
    field_selectors: Vec<FieldSelector>,
    #[serde(default)]
    link_field_name: Option<String>,
    #[serde(default)]
    link_selector: Option<String>,
    #[serde(default = "default_output_variable")]
    output_variable: String,
}

#[derive(Deserialize)]
struct FieldSelector {
    name: String,
    selector: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeRequest {
    url: String,
    container_selector: String,
    field_selectors: Vec<ScrapeField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    link_field_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    link_selector: Option<String>,
}

#[derive(Serialize)]
struct ScrapeField {
    name: String,
    selector: String,
}

/// Delegate to the external scraper service.
///
/// Scraping degrades gracefully: service errors, transport failures and a
/// missing service URL are all recorded as node-level failures with an
/// error payload in the output variable, and the run continues. Only an
/// incomplete node configuration (missing URL, container selector or field
/// selectors) aborts the run — that is an authoring error.
pub(super) async fn execute(
    runner: &NodeRunner,
    node: &Node,
    ctx: &mut ExecutionContext,
) -> Result<NodeResult> {
    let data: ScraperData = node_data(node)?;
    let output_variable = data.output_variable.clone();

    let url = template::resolve(&data.url, &ctx.variables);
    let container_selector = template::resolve(&data.container_selector, &ctx.variables);
    let field_selectors: Vec<ScrapeField> = data
        .field_selectors
        .iter()
        .map(|fs| ScrapeField {
            // Field names are identifiers, not templates
            name: fs.name.clone(),
            selector: template::resolve(&fs.selector, &ctx.variables),
        })
        .collect();

    if url.is_empty() || container_selector.is_empty() || field_selectors.is_empty() {
        return Err(LoomError::ConfigIncomplete(format!(
            "scraper node {}: URL, container selector, and field selectors are required",
            node.id
        )));
    }

    let service_url = match &runner.config.scraper_service_url {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => {
            let message = "Scraper service URL is not configured".to_string();
            warn!(node_id = %node.id, "{}", message);
            return Ok(record_failure(ctx, &output_variable, message, None));
        }
    };

    let link_selector = data
        .link_selector
        .as_deref()
        .map(|s| template::resolve(s, &ctx.variables));
    let (link_field_name, link_selector) = match (data.link_field_name, link_selector) {
        // Forward the link pair only when both halves are present
        (Some(name), Some(selector)) => (Some(name), Some(selector)),
        _ => (None, None),
    };

    let payload = ScrapeRequest {
        url,
        container_selector,
        field_selectors,
        link_field_name,
        link_selector,
    };

    info!(node_id = %node.id, service_url = %service_url, "scraper node calling service");

    let response = runner
        .http
        .post(format!("{}/scrape", service_url))
        .timeout(Duration::from_secs(runner.config.scraper_timeout_secs))
        .json(&payload)
        .send()
        .await;

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            let message = "Connection error while calling scraper service".to_string();
            error!(node_id = %node.id, error = %e, "{}", message);
            return Ok(record_failure(
                ctx,
                &output_variable,
                message,
                Some(json!(e.to_string())),
            ));
        }
    };

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let parsed = serde_json::from_str::<Value>(&body).unwrap_or(Value::Null);

    if status.is_success() {
        let item_count = parsed.as_array().map(|a| a.len());
        info!(node_id = %node.id, ?item_count, "scraper node succeeded");
        ctx.set_variable(&output_variable, parsed.clone());
        return Ok(NodeResult::success()
            .with_output(parsed)
            .with_output_variable(output_variable));
    }

    let details = if parsed.is_null() {
        json!({"raw_body": body})
    } else {
        parsed
    };
    let message = "Failed to scrape data from service".to_string();
    error!(node_id = %node.id, status = %status, "{}", message);

    let failure_payload = json!({
        "error": message,
        "status": status.as_u16(),
        "details": details,
    });
    ctx.set_variable(&output_variable, failure_payload.clone());
    Ok(NodeResult::failure(message)
        .with_output_variable(output_variable)
        .with_extra("status", json!(status.as_u16()))
        .with_extra("details", failure_payload["details"].clone()))
}

fn record_failure(
    ctx: &mut ExecutionContext,
    output_variable: &str,
    message: String,
    details: Option<Value>,
) -> NodeResult {
    let mut payload = serde_json::Map::new();
    payload.insert("error".to_string(), json!(message));
    if let Some(details) = &details {
        payload.insert("details".to_string(), details.clone());
    }
    ctx.set_variable(output_variable, Value::Object(payload));

    let mut result = NodeResult::failure(message).with_output_variable(output_variable);
    if let Some(details) = details {
        result = result.with_extra("details", details);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptloom_core::config::EngineConfig;
    use promptloom_core::graph::NodeKind;
    use promptloom_core::traits::{
        Completion, CompletionClient, CompletionRequest, MemoryPromptStore,
    };
    use std::sync::Arc;

    struct NoCompletions;

    impl CompletionClient for NoCompletions {
        fn generate_completion(
            &self,
            _request: CompletionRequest,
        ) -> futures::future::BoxFuture<'_, Result<Completion>> {
            Box::pin(async { Err(LoomError::Provider("not configured".into())) })
        }
    }

    fn runner_with(config: EngineConfig) -> NodeRunner {
        NodeRunner::new(Arc::new(NoCompletions), Arc::new(MemoryPromptStore::new()), config)
    }

    fn scraper_node(data: serde_json::Value) -> Node {
        Node {
            id: "scrape".into(),
            kind: NodeKind::Scraper,
            data: data.as_object().cloned().unwrap(),
        }
    }

    fn complete_node(output_variable: &str) -> Node {
        scraper_node(json!({
            "url": "http://example.com",
            "container_selector": ".item",
            "field_selectors": [{"name": "title", "selector": "h2"}],
            "output_variable": output_variable,
        }))
    }

    /// One-shot HTTP server answering the first request with a fixed
    /// response, returning its base URL.
    async fn spawn_stub(status_line: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // Drain the whole request before responding so the client is
            // never mid-write when the socket closes
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        request.extend_from_slice(&buf[..n]);
                        if request_complete(&request) {
                            break;
                        }
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// Headers fully received and, per content-length, the body too.
    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text
            .lines()
            .find_map(|line| {
                let line = line.to_ascii_lowercase();
                let value = line.strip_prefix("content-length:")?;
                value.trim().parse::<usize>().ok()
            })
            .unwrap_or(0);
        request.len() >= header_end + 4 + content_length
    }

    fn config_with_service(base: String) -> EngineConfig {
        EngineConfig {
            scraper_service_url: Some(base),
            scraper_timeout_secs: 5,
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_success_stores_scraped_array() {
        let base = spawn_stub("200 OK", r#"[{"title":"A"},{"title":"B"}]"#).await;
        let node = complete_node("scraped");
        let mut ctx = ExecutionContext::new("u1", Default::default());

        let result = execute(&runner_with(config_with_service(base)), &node, &mut ctx)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output_variable.as_deref(), Some("scraped"));
        assert_eq!(
            ctx.variables["scraped"],
            json!([{"title": "A"}, {"title": "B"}])
        );
    }

    #[tokio::test]
    async fn test_service_error_recorded_with_status_and_details() {
        let base = spawn_stub(
            "500 Internal Server Error",
            r#"{"message":"selector matched nothing"}"#,
        )
        .await;
        let node = complete_node("scraped");
        let mut ctx = ExecutionContext::new("u1", Default::default());

        let result = execute(&runner_with(config_with_service(base)), &node, &mut ctx)
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.extra["status"], json!(500));
        assert_eq!(
            result.extra["details"],
            json!({"message": "selector matched nothing"})
        );
        assert_eq!(
            ctx.variables["scraped"]["error"],
            json!("Failed to scrape data from service")
        );
        assert_eq!(ctx.variables["scraped"]["status"], json!(500));
    }

    #[tokio::test]
    async fn test_incomplete_config_aborts() {
        let node = scraper_node(json!({"url": "http://example.com"}));
        let mut ctx = ExecutionContext::new("u1", Default::default());

        let err = execute(&runner_with(EngineConfig::default()), &node, &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, LoomError::ConfigIncomplete(_)));
    }

    #[tokio::test]
    async fn test_missing_service_url_is_nonfatal() {
        let node = scraper_node(json!({
            "url": "http://example.com",
            "container_selector": ".item",
            "field_selectors": [{"name": "title", "selector": "h2"}],
            "output_variable": "scraped",
        }));
        let mut ctx = ExecutionContext::new("u1", Default::default());

        let result = execute(&runner_with(EngineConfig::default()), &node, &mut ctx)
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(
            ctx.variables["scraped"]["error"],
            json!("Scraper service URL is not configured")
        );
    }

    #[tokio::test]
    async fn test_transport_failure_is_nonfatal() {
        let node = scraper_node(json!({
            "url": "http://example.com",
            "container_selector": ".item",
            "field_selectors": [{"name": "title", "selector": "h2"}],
        }));
        let config = EngineConfig {
            scraper_service_url: Some("http://127.0.0.1:1".to_string()),
            scraper_timeout_secs: 1,
            ..EngineConfig::default()
        };
        let mut ctx = ExecutionContext::new("u1", Default::default());

        let result = execute(&runner_with(config), &node, &mut ctx).await.unwrap();
        assert!(!result.success);
        assert_eq!(
            ctx.variables["scraped_data"]["error"],
            json!("Connection error while calling scraper service")
        );
    }
}
