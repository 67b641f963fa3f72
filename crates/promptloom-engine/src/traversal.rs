use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use promptloom_core::error::{LoomError, Result};
use promptloom_core::graph::WorkflowGraph;

use crate::context::ExecutionContext;
use crate::nodes::{NextStep, NodeRunner};

/// Depth-first graph walker.
///
/// The walk is pre-order: a node executes, then its first outgoing branch is
/// explored fully before the second. An explicit work stack replaces
/// recursion; pushing a node's successors in reverse keeps the listed edge
/// order. A node whose result is already recorded is skipped, which both
/// deduplicates diamond-shaped joins and terminates cycles.
pub struct TraversalEngine {
    runner: NodeRunner,
}

impl TraversalEngine {
    pub fn new(runner: NodeRunner) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &NodeRunner {
        &self.runner
    }

    /// Execute every reachable node, mutating `ctx` as it goes.
    ///
    /// On error the context keeps the results of all nodes that completed
    /// before the abort, so callers can surface partial progress.
    pub async fn run(
        &self,
        graph: &WorkflowGraph,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut stack: Vec<String> = graph
            .start_node_ids()
            .into_iter()
            .rev()
            .map(str::to_string)
            .collect();

        info!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            starts = stack.len(),
            "starting graph traversal"
        );

        while let Some(node_id) = stack.pop() {
            if cancel.is_cancelled() {
                return Err(LoomError::Cancelled);
            }
            if ctx.node_results.contains_key(&node_id) {
                debug!(node_id = %node_id, "node already executed, skipping");
                continue;
            }

            let node = graph
                .node(&node_id)
                .ok_or_else(|| LoomError::NodeNotFound(node_id.clone()))?;

            info!(node_id = %node.id, node_type = %node.kind, "executing node");
            let outcome = self.runner.execute(node, ctx).await?;
            ctx.node_results.insert(node_id.clone(), outcome.result);

            match outcome.next {
                NextStep::FollowEdges => {
                    for next in graph.next_node_ids(&node_id).into_iter().rev() {
                        stack.push(next.to_string());
                    }
                }
                NextStep::Branch(Some(next)) => stack.push(next),
                NextStep::Branch(None) => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptloom_core::config::EngineConfig;
    use promptloom_core::error::Result;
    use promptloom_core::graph::{Edge, Node, NodeKind};
    use promptloom_core::traits::{
        Completion, CompletionClient, CompletionRequest, MemoryPromptStore,
    };
    use serde_json::json;
    use std::sync::Arc;

    struct EchoCompletions;

    impl CompletionClient for EchoCompletions {
        fn generate_completion(
            &self,
            request: CompletionRequest,
        ) -> futures::future::BoxFuture<'_, Result<Completion>> {
            Box::pin(async move {
                Ok(Completion {
                    text: format!("echo: {}", request.prompt),
                    provider: request.provider,
                    model: request.model,
                })
            })
        }
    }

    fn engine() -> TraversalEngine {
        TraversalEngine::new(NodeRunner::new(
            Arc::new(EchoCompletions),
            Arc::new(MemoryPromptStore::new()),
            EngineConfig::default(),
        ))
    }

    fn input_node(id: &str, variable: &str, default: &str) -> Node {
        Node {
            id: id.into(),
            kind: NodeKind::Input,
            data: json!({"variable": variable, "default_value": default})
                .as_object()
                .cloned()
                .unwrap(),
        }
    }

    fn edge(source: &str, target: &str) -> Edge {
        Edge { source: source.into(), target: target.into() }
    }

    #[tokio::test]
    async fn test_diamond_executes_join_once() {
        // a -> b, a -> c, b -> d, c -> d
        let graph = WorkflowGraph::new(
            vec![
                input_node("a", "va", "1"),
                input_node("b", "vb", "2"),
                input_node("c", "vc", "3"),
                input_node("d", "vd", "4"),
            ],
            vec![edge("a", "b"), edge("a", "c"), edge("b", "d"), edge("c", "d")],
        );
        let mut ctx = ExecutionContext::new("u1", Default::default());

        engine()
            .run(&graph, &mut ctx, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ctx.node_results.len(), 4);
        assert!(ctx.node_results["d"].success);
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        let graph = WorkflowGraph::new(
            vec![input_node("a", "va", "1"), input_node("b", "vb", "2")],
            vec![edge("a", "b"), edge("b", "a")],
        );
        let mut ctx = ExecutionContext::new("u1", Default::default());

        // "a" is an edge target, so nothing qualifies as a start node until
        // we seed the cycle through an external entry.
        let graph = WorkflowGraph::new(
            {
                let mut nodes = graph.nodes;
                nodes.push(input_node("entry", "ve", "0"));
                nodes
            },
            {
                let mut edges = graph.edges;
                edges.push(edge("entry", "a"));
                edges
            },
        );

        engine()
            .run(&graph, &mut ctx, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ctx.node_results.len(), 3);
    }

    #[tokio::test]
    async fn test_start_nodes_run_in_graph_order() {
        let graph = WorkflowGraph::new(
            vec![
                input_node("a", "first", "a"),
                input_node("b", "first", "b"),
                input_node("c", "first", "c"),
            ],
            vec![],
        );
        let mut ctx = ExecutionContext::new("u1", Default::default());

        engine()
            .run(&graph, &mut ctx, &CancellationToken::new())
            .await
            .unwrap();

        // All three are starts; "a" runs first and seeds the shared variable.
        assert_eq!(ctx.variables["first"], json!("a"));
        assert_eq!(ctx.node_results.len(), 3);
    }

    #[tokio::test]
    async fn test_condition_branch_suppresses_edges() {
        let cond = Node {
            id: "cond".into(),
            kind: NodeKind::Condition,
            data: json!({
                "condition": "{{x}} == 'yes'",
                "true_path": "t",
                "false_path": "f",
            })
            .as_object()
            .cloned()
            .unwrap(),
        };
        let graph = WorkflowGraph::new(
            vec![cond, input_node("t", "taken", "true"), input_node("f", "taken", "false")],
            // Edges from the condition node must be ignored in favor of the
            // branch target.
            vec![edge("cond", "f")],
        );
        let mut ctx = ExecutionContext::new(
            "u1",
            json!({"x": "yes"}).as_object().cloned().unwrap(),
        );

        engine()
            .run(&graph, &mut ctx, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ctx.variables["taken"], json!("true"));
        assert!(!ctx.node_results.contains_key("f"));
    }

    #[tokio::test]
    async fn test_dangling_edge_target_aborts() {
        let graph = WorkflowGraph::new(
            vec![input_node("a", "va", "1")],
            vec![edge("a", "ghost")],
        );
        let mut ctx = ExecutionContext::new("u1", Default::default());

        let err = engine()
            .run(&graph, &mut ctx, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LoomError::NodeNotFound(id) if id == "ghost"));
        // The node that ran before the abort keeps its result.
        assert!(ctx.node_results.contains_key("a"));
    }

    #[tokio::test]
    async fn test_cancellation_stops_before_next_node() {
        let graph = WorkflowGraph::new(vec![input_node("a", "va", "1")], vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut ctx = ExecutionContext::new("u1", Default::default());

        let err = engine().run(&graph, &mut ctx, &cancel).await.unwrap_err();
        assert!(matches!(err, LoomError::Cancelled));
        assert!(ctx.node_results.is_empty());
    }
}
