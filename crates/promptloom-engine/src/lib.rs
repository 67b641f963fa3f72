//! Workflow graph execution engine.
//!
//! The engine walks a [`WorkflowGraph`](promptloom_core::graph::WorkflowGraph)
//! depth-first, executing each typed node against shared collaborators (LLM
//! completion client, prompt store, HTTP client) and threading a mutable
//! variable context through the run. The [`coordinator::Coordinator`] wraps
//! the walk in the run lifecycle: status transitions, persistence snapshots
//! and terminal events.

pub mod condition;
pub mod context;
pub mod coordinator;
pub mod nodes;
pub mod persist;
pub mod template;
pub mod traversal;

pub use context::ExecutionContext;
pub use coordinator::Coordinator;
pub use nodes::{ExecOutcome, NextStep, NodeRunner};
pub use persist::{JsonlRunLog, MemoryRunStore};
pub use traversal::TraversalEngine;
