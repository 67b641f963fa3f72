use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use promptloom_core::error::Result;
use promptloom_core::graph::Node;
use promptloom_core::run::NodeResult;

use super::node_data;
use crate::condition;
use crate::context::ExecutionContext;

#[derive(Deserialize)]
struct ConditionData {
    #[serde(default)]
    condition: String,
    #[serde(default)]
    true_path: Option<String>,
    #[serde(default)]
    false_path: Option<String>,
}

/// Evaluate the condition and pick the branch to execute next.
///
/// Condition nodes own their own forward traversal: the returned branch id
/// (if any) is dispatched directly and the generic outgoing-edge walk is
/// suppressed. An unevaluable condition aborts the run — it must never
/// silently default to a branch.
pub(super) fn execute(
    node: &Node,
    ctx: &mut ExecutionContext,
) -> Result<(NodeResult, Option<String>)> {
    let data: ConditionData = node_data(node)?;

    let substituted = condition::substitute(&data.condition, &ctx.variables);
    let condition_met = condition::evaluate_expr(&substituted)?;

    debug!(node_id = %node.id, condition_met, "condition evaluated");

    let branch = if condition_met { data.true_path } else { data.false_path };

    let result = NodeResult::success()
        .with_extra("condition", json!(substituted))
        .with_extra("condition_met", json!(condition_met))
        .with_extra("path_taken", json!(if condition_met { "true" } else { "false" }));

    Ok((result, branch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptloom_core::graph::NodeKind;
    use promptloom_core::run::Variables;

    fn condition_node(data: serde_json::Value) -> Node {
        Node {
            id: "cond".into(),
            kind: NodeKind::Condition,
            data: data.as_object().cloned().unwrap(),
        }
    }

    fn ctx_with(vars: serde_json::Value) -> ExecutionContext {
        ExecutionContext::new("u1", vars.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn test_true_branch_selected() {
        let node = condition_node(json!({
            "condition": "{{x}} == 'yes'",
            "true_path": "t",
            "false_path": "f",
        }));
        let mut ctx = ctx_with(json!({"x": "yes"}));

        let (result, branch) = execute(&node, &mut ctx).unwrap();
        assert_eq!(branch.as_deref(), Some("t"));
        assert_eq!(result.extra["condition_met"], json!(true));
        assert_eq!(result.extra["path_taken"], json!("true"));
    }

    #[test]
    fn test_false_branch_selected() {
        let node = condition_node(json!({
            "condition": "{{x}} == 'yes'",
            "true_path": "t",
            "false_path": "f",
        }));
        let mut ctx = ctx_with(json!({"x": "no"}));

        let (_, branch) = execute(&node, &mut ctx).unwrap();
        assert_eq!(branch.as_deref(), Some("f"));
    }

    #[test]
    fn test_no_paths_still_reports_outcome() {
        let node = condition_node(json!({"condition": "{{x}} == 'yes'"}));
        let mut ctx = ctx_with(json!({"x": "yes"}));

        let (result, branch) = execute(&node, &mut ctx).unwrap();
        assert!(branch.is_none());
        assert_eq!(result.extra["condition_met"], json!(true));
    }

    #[test]
    fn test_unevaluable_condition_errors() {
        let node = condition_node(json!({"condition": "{{missing}} == 'x'"}));
        let mut ctx = ctx_with(json!({}));
        assert!(execute(&node, &mut ctx).is_err());
    }

    #[test]
    fn test_recorded_condition_is_substituted_form() {
        let node = condition_node(json!({"condition": "{{x}} == 'yes'"}));
        let mut ctx = ctx_with(json!({"x": "yes"}));

        let (result, _) = execute(&node, &mut ctx).unwrap();
        assert_eq!(result.extra["condition"], json!("'yes' == 'yes'"));
    }
}
