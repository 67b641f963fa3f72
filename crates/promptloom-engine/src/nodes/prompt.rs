use serde::Deserialize;
use serde_json::json;
use tracing::info;

use promptloom_core::error::Result;
use promptloom_core::graph::Node;
use promptloom_core::run::NodeResult;
use promptloom_core::traits::CompletionRequest;

use super::{node_data, NodeRunner};
use crate::context::ExecutionContext;
use crate::template;

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2000
}

#[derive(Deserialize)]
struct PromptData {
    /// Reference to a saved prompt; takes precedence over inline content.
    #[serde(default)]
    prompt_id: Option<String>,
    #[serde(default)]
    content: String,
    #[serde(default = "default_provider")]
    provider: String,
    #[serde(default = "default_model")]
    model: String,
    #[serde(default = "default_temperature")]
    temperature: f32,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default)]
    output_variable: Option<String>,
}

/// Resolve the prompt text, call the provider, store the completion.
/// Provider failures abort the run: downstream nodes depend on the output.
pub(super) async fn execute(
    runner: &NodeRunner,
    node: &Node,
    ctx: &mut ExecutionContext,
) -> Result<NodeResult> {
    let data: PromptData = node_data(node)?;

    let content = match &data.prompt_id {
        Some(prompt_id) => runner.prompts.current_version_content(prompt_id).await?,
        None => data.content.clone(),
    };

    let prompt = template::resolve(&content, &ctx.variables);

    info!(
        node_id = %node.id,
        provider = %data.provider,
        model = %data.model,
        "prompt node calling provider"
    );

    let completion = runner
        .completions
        .generate_completion(CompletionRequest {
            user_id: ctx.user_id.clone(),
            provider: data.provider,
            model: data.model,
            prompt,
            temperature: data.temperature,
            max_tokens: data.max_tokens,
        })
        .await?;

    let output_variable = data.output_variable.unwrap_or_else(|| "result".to_string());
    ctx.set_variable(&output_variable, json!(completion.text));

    Ok(NodeResult::success()
        .with_output(json!(completion.text))
        .with_output_variable(output_variable))
}
