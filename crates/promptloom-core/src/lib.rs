pub mod config;
pub mod error;
pub mod event;
pub mod graph;
pub mod run;
pub mod traits;

pub use config::EngineConfig;
pub use error::{LoomError, Result};
pub use event::{EventBus, RunEvent};
pub use graph::{Edge, Node, NodeKind, WorkflowDocument, WorkflowGraph};
pub use run::{ExecutionRun, NodeResult, RunOutcome, RunStatus, Variables};
pub use traits::{Completion, CompletionClient, CompletionRequest, PromptStore, RunStore};
