use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use promptloom_core::error::{LoomError, Result};
use promptloom_core::graph::Node;
use promptloom_core::run::NodeResult;

use super::node_data;
use crate::context::ExecutionContext;
use crate::template;

fn default_output_variable() -> String {
    "transformed_result".to_string()
}

fn default_transformation() -> String {
    "json_parse".to_string()
}

#[derive(Deserialize)]
struct TransformData {
    #[serde(default)]
    input_variable: String,
    #[serde(default = "default_output_variable")]
    output_variable: String,
    #[serde(default = "default_transformation")]
    transformation: String,
    #[serde(default)]
    regex: String,
}

/// Apply one of the fixed transformation vocabulary to an input variable.
///
/// Type mismatches and other data-shaped failures are recorded in the node
/// result (with an error payload written to the output variable) and the
/// run continues — a later output node can still report partial state.
/// Unknown transformation names are authoring errors and abort the run.
/// There is no `custom_code`: arbitrary code execution is not supported.
pub(super) fn execute(node: &Node, ctx: &mut ExecutionContext) -> Result<NodeResult> {
    let data: TransformData = node_data(node)?;

    let input_variable = template::resolve(&data.input_variable, &ctx.variables);
    let input = ctx.variables.get(&input_variable).cloned().unwrap_or(Value::Null);

    if input.is_null() {
        warn!(
            node_id = %node.id,
            input_variable = %input_variable,
            "transform input variable not found or null"
        );
    }

    match apply(&data.transformation, &input, &data.regex) {
        Ok(transformed) => {
            ctx.set_variable(&data.output_variable, transformed.clone());
            Ok(NodeResult::success()
                .with_output(transformed)
                .with_output_variable(data.output_variable))
        }
        Err(err @ LoomError::UnsupportedTransform(_)) => Err(err),
        Err(err) => {
            let message = err.to_string();
            let payload = json!({"error": message});
            ctx.set_variable(&data.output_variable, payload.clone());
            Ok(NodeResult::failure(message)
                .with_output(payload)
                .with_output_variable(data.output_variable))
        }
    }
}

fn apply(transformation: &str, input: &Value, regex: &str) -> Result<Value> {
    match transformation {
        "json_parse" => json_parse(input),
        "json_stringify" => Ok(Value::String(serde_json::to_string(input)?)),
        "to_uppercase" => {
            require_string(input, "uppercase transformation").map(|s| json!(s.to_uppercase()))
        }
        "to_lowercase" => {
            require_string(input, "lowercase transformation").map(|s| json!(s.to_lowercase()))
        }
        "trim" => require_string(input, "trim transformation").map(|s| json!(s.trim())),
        "extract_text" => extract_text(input, regex),
        "custom_code" => Err(LoomError::UnsupportedTransform(
            "custom_code (arbitrary code execution is disabled)".to_string(),
        )),
        other => Err(LoomError::UnsupportedTransform(other.to_string())),
    }
}

fn require_string<'a>(input: &'a Value, what: &str) -> Result<&'a str> {
    input
        .as_str()
        .ok_or_else(|| LoomError::TypeMismatch(format!("Input must be a string for {}", what)))
}

fn json_parse(input: &Value) -> Result<Value> {
    let text = require_string(input, "JSON parsing")?;
    serde_json::from_str(text)
        .map_err(|e| LoomError::TypeMismatch(format!("Input is not valid JSON: {}", e)))
}

fn extract_text(input: &Value, regex: &str) -> Result<Value> {
    let text = require_string(input, "text extraction")?;
    if regex.is_empty() {
        return Err(LoomError::TypeMismatch(
            "Regex pattern is required for text extraction".to_string(),
        ));
    }
    let re = regex::Regex::new(regex)
        .map_err(|e| LoomError::TypeMismatch(format!("Invalid regex pattern: {}", e)))?;

    // First capture group of the first match; empty string when absent
    let extracted = re
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or("");
    Ok(json!(extracted))
}
