use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Variable context threaded through a single run.
pub type Variables = serde_json::Map<String, serde_json::Value>;

/// Lifecycle state of an execution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Terminal states are final; a finalized run is never mutated again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Result of executing a single node. Write-once per node id within a run;
/// presence in the run's result map is the "already executed" marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    /// Whether the node succeeded.
    pub success: bool,
    /// The node's output payload, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    /// The context variable the node wrote, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_variable: Option<String>,
    /// Error detail for failed nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Node-type-specific fields (condition_met, status_code, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl NodeResult {
    pub fn success() -> Self {
        Self {
            success: true,
            output: None,
            output_variable: None,
            error: None,
            extra: Default::default(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            output_variable: None,
            error: Some(error.into()),
            extra: Default::default(),
        }
    }

    pub fn with_output(mut self, output: serde_json::Value) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_output_variable(mut self, name: impl Into<String>) -> Self {
        self.output_variable = Some(name.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// The external-facing record of one workflow invocation.
///
/// Created in `pending` by the caller; the coordinator transitions it
/// pending → running → {completed | failed}.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRun {
    pub id: String,
    pub workflow_id: String,
    pub user_id: String,
    pub status: RunStatus,
    /// Initial variables for the run.
    #[serde(default)]
    pub input_data: Variables,
    /// Final variable snapshot, set on completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_data: Option<Variables>,
    /// Per-node results in a stable order for diagnostics.
    #[serde(default)]
    pub node_results: BTreeMap<String, NodeResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionRun {
    /// Create a pending run for a workflow with the given initial variables.
    pub fn new(
        workflow_id: impl Into<String>,
        user_id: impl Into<String>,
        input_data: Variables,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            user_id: user_id.into(),
            status: RunStatus::Pending,
            input_data,
            output_data: None,
            node_results: BTreeMap::new(),
            error: None,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Summary returned to the caller after a run finishes.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Variables>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_results: Option<BTreeMap<String, NodeResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
