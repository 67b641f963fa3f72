use serde::Deserialize;
use serde_json::{json, Value};

use promptloom_core::error::Result;
use promptloom_core::graph::Node;
use promptloom_core::run::NodeResult;

use super::node_data;
use crate::context::ExecutionContext;

#[derive(Deserialize)]
struct InputData {
    #[serde(default)]
    variable: String,
    #[serde(default)]
    default_value: Option<Value>,
}

/// Input nodes pass through variables already present in the context and
/// seed a default when the variable is unset. They never fail.
pub(super) fn execute_input(node: &Node, ctx: &mut ExecutionContext) -> Result<NodeResult> {
    let data: InputData = node_data(node)?;

    if !ctx.variables.contains_key(&data.variable) {
        if let Some(default) = data.default_value {
            ctx.set_variable(&data.variable, default);
        }
    }

    let value = ctx.variables.get(&data.variable).cloned().unwrap_or(Value::Null);

    Ok(NodeResult::success()
        .with_extra("variable", json!(data.variable))
        .with_extra("value", value))
}

#[derive(Deserialize)]
struct OutputData {
    #[serde(default)]
    variables: Vec<String>,
}

/// Output nodes report the current values of the named variables. They
/// read the context but write nothing back.
pub(super) fn execute_output(node: &Node, ctx: &mut ExecutionContext) -> Result<NodeResult> {
    let data: OutputData = node_data(node)?;

    let mut output = serde_json::Map::new();
    for name in &data.variables {
        let value = ctx.variables.get(name).cloned().unwrap_or(Value::Null);
        output.insert(name.clone(), value);
    }

    Ok(NodeResult::success().with_output(Value::Object(output)))
}
