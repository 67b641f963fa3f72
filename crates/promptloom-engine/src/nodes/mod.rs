//! Node executors — one per node type.
//!
//! Executors are invoked by the traversal engine with the node and the
//! run's mutable context. Recoverable failures (transform type mismatches,
//! scraper degradation) are returned as failed [`NodeResult`]s; errors the
//! run cannot survive propagate as [`LoomError`]s and abort the traversal.

mod api;
mod condition;
mod io;
mod prompt;
mod scraper;
mod transform;

use std::sync::Arc;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use promptloom_core::config::EngineConfig;
use promptloom_core::error::{LoomError, Result};
use promptloom_core::graph::{Node, NodeKind};
use promptloom_core::run::NodeResult;
use promptloom_core::traits::{CompletionClient, PromptStore};

use crate::context::ExecutionContext;

/// What the traversal engine should do after a node executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    /// Follow all outgoing edges (the generic forward step).
    FollowEdges,
    /// Condition nodes dispatch their own single successor and suppress
    /// the generic edge walk.
    Branch(Option<String>),
}

/// Result of one node execution plus its traversal directive.
#[derive(Debug)]
pub struct ExecOutcome {
    pub result: NodeResult,
    pub next: NextStep,
}

impl ExecOutcome {
    fn follow(result: NodeResult) -> Self {
        Self { result, next: NextStep::FollowEdges }
    }
}

/// Executes individual nodes against shared collaborators.
pub struct NodeRunner {
    pub(crate) completions: Arc<dyn CompletionClient>,
    pub(crate) prompts: Arc<dyn PromptStore>,
    pub(crate) http: Client,
    pub(crate) config: EngineConfig,
}

impl NodeRunner {
    pub fn new(
        completions: Arc<dyn CompletionClient>,
        prompts: Arc<dyn PromptStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            completions,
            prompts,
            http: Client::new(),
            config,
        }
    }

    /// Execute a single node. Mutates `ctx.variables` according to the
    /// node type; never touches `ctx.node_results`.
    pub async fn execute(&self, node: &Node, ctx: &mut ExecutionContext) -> Result<ExecOutcome> {
        debug!(node_id = %node.id, node_type = %node.kind, "dispatching node");
        match &node.kind {
            NodeKind::Prompt => Ok(ExecOutcome::follow(prompt::execute(self, node, ctx).await?)),
            NodeKind::Condition => {
                let (result, branch) = condition::execute(node, ctx)?;
                Ok(ExecOutcome { result, next: NextStep::Branch(branch) })
            }
            NodeKind::Input => Ok(ExecOutcome::follow(io::execute_input(node, ctx)?)),
            NodeKind::Output => Ok(ExecOutcome::follow(io::execute_output(node, ctx)?)),
            NodeKind::ApiCall => Ok(ExecOutcome::follow(api::execute(self, node, ctx).await?)),
            NodeKind::Transform => Ok(ExecOutcome::follow(transform::execute(node, ctx)?)),
            NodeKind::Scraper => Ok(ExecOutcome::follow(scraper::execute(self, node, ctx).await?)),
            NodeKind::Other(kind) => Err(LoomError::UnsupportedNodeType(kind.clone())),
        }
    }
}

/// Deserialize a node's `data` payload into its typed configuration.
fn node_data<T: DeserializeOwned>(node: &Node) -> Result<T> {
    serde_json::from_value(serde_json::Value::Object(node.data.clone())).map_err(|e| {
        LoomError::ConfigIncomplete(format!("node {}: invalid configuration: {}", node.id, e))
    })
}
