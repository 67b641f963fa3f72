use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use promptloom_core::error::{LoomError, Result};
use promptloom_core::event::{EventBus, RunEvent};
use promptloom_core::graph::WorkflowGraph;
use promptloom_core::run::{ExecutionRun, RunOutcome, RunStatus};
use promptloom_core::traits::RunStore;

use crate::context::ExecutionContext;
use crate::nodes::NodeRunner;
use crate::traversal::TraversalEngine;

/// Drives a run through its lifecycle: pending → running → completed/failed.
///
/// Persists a snapshot on every transition and publishes a terminal event
/// when the run finishes. Node-level failures do not fail the run; only
/// structural errors (unknown node, unevaluable condition, transport
/// failure, cancellation) do.
pub struct Coordinator {
    engine: TraversalEngine,
    store: Arc<dyn RunStore>,
    events: Arc<EventBus>,
}

impl Coordinator {
    pub fn new(runner: NodeRunner, store: Arc<dyn RunStore>, events: Arc<EventBus>) -> Self {
        Self {
            engine: TraversalEngine::new(runner),
            store,
            events,
        }
    }

    pub async fn execute(&self, run: ExecutionRun, graph: &WorkflowGraph) -> Result<RunOutcome> {
        self.execute_with_cancel(run, graph, &CancellationToken::new())
            .await
    }

    /// Execute a pending run to a terminal state.
    ///
    /// Returns `Err` only when the run cannot be started (already finalized);
    /// execution failures are reported through the returned [`RunOutcome`]
    /// and the run's `failed` status.
    pub async fn execute_with_cancel(
        &self,
        mut run: ExecutionRun,
        graph: &WorkflowGraph,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        if run.status.is_terminal() {
            return Err(LoomError::Store(format!(
                "execution {} is already {}",
                run.id, run.status
            )));
        }

        info!(execution_id = %run.id, workflow_id = %run.workflow_id, "starting execution");

        run.status = RunStatus::Running;
        run.started_at.get_or_insert_with(Utc::now);
        self.persist(&run).await;

        let mut ctx = ExecutionContext::new(run.user_id.clone(), run.input_data.clone());

        match self.engine.run(graph, &mut ctx, cancel).await {
            Ok(()) => {
                run.status = RunStatus::Completed;
                run.output_data = Some(ctx.variables.clone());
                run.node_results = ctx.node_results;
                run.completed_at = Some(Utc::now());
                self.persist(&run).await;

                info!(execution_id = %run.id, "execution completed");
                self.events.publish(RunEvent::WorkflowExecutionCompleted {
                    execution_id: run.id.clone(),
                    workflow_id: run.workflow_id.clone(),
                    user_id: run.user_id.clone(),
                    status: run.status.to_string(),
                    completed_at: run.completed_at.unwrap_or_else(Utc::now),
                    output_data: ctx.variables.clone(),
                });

                Ok(RunOutcome {
                    success: true,
                    variables: Some(ctx.variables),
                    node_results: Some(run.node_results.clone()),
                    error: None,
                })
            }
            Err(e) => {
                let message = e.to_string();
                run.status = RunStatus::Failed;
                run.error = Some(message.clone());
                // Keep whatever executed before the abort for diagnostics
                run.node_results = ctx.node_results;
                run.completed_at = Some(Utc::now());
                self.persist(&run).await;

                error!(execution_id = %run.id, error = %message, "execution failed");
                self.events.publish(RunEvent::WorkflowExecutionFailed {
                    execution_id: run.id.clone(),
                    workflow_id: run.workflow_id.clone(),
                    user_id: run.user_id.clone(),
                    status: run.status.to_string(),
                    error: message.clone(),
                    completed_at: run.completed_at.unwrap_or_else(Utc::now),
                });

                Ok(RunOutcome {
                    success: false,
                    variables: None,
                    node_results: Some(run.node_results.clone()),
                    error: Some(message),
                })
            }
        }
    }

    /// Persistence is best-effort: a failing store must not take the run
    /// down with it.
    async fn persist(&self, run: &ExecutionRun) {
        if let Err(e) = self.store.save(run).await {
            error!(execution_id = %run.id, error = %e, "failed to persist run snapshot");
        }
    }
}
