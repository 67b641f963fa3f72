use std::collections::BTreeMap;

use promptloom_core::run::{NodeResult, Variables};

/// Mutable state owned by one in-flight run.
///
/// `variables` is shared across all node executions within the run; later
/// writes are visible to subsequently executed nodes. There is no rollback
/// when a branch is abandoned. `node_results` doubles as the
/// already-executed marker: a node with an entry here is never re-executed.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Owner of the run; used to resolve provider credentials.
    pub user_id: String,
    pub variables: Variables,
    pub node_results: BTreeMap<String, NodeResult>,
}

impl ExecutionContext {
    pub fn new(user_id: impl Into<String>, variables: Variables) -> Self {
        Self {
            user_id: user_id.into(),
            variables,
            node_results: BTreeMap::new(),
        }
    }

    /// Write a variable, returning the name for result records.
    pub fn set_variable(&mut self, name: impl Into<String>, value: serde_json::Value) -> String {
        let name = name.into();
        self.variables.insert(name.clone(), value);
        name
    }
}
