use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use futures::future::BoxFuture;
use tokio::io::AsyncWriteExt;

use promptloom_core::error::{LoomError, Result};
use promptloom_core::run::ExecutionRun;
use promptloom_core::traits::RunStore;

/// In-memory run store for embedding and tests.
#[derive(Default)]
pub struct MemoryRunStore {
    runs: Mutex<HashMap<String, ExecutionRun>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<ExecutionRun> {
        self.runs
            .lock()
            .expect("run store lock poisoned")
            .get(id)
            .cloned()
    }
}

impl RunStore for MemoryRunStore {
    fn save(&self, run: &ExecutionRun) -> BoxFuture<'_, Result<()>> {
        self.runs
            .lock()
            .expect("run store lock poisoned")
            .insert(run.id.clone(), run.clone());
        Box::pin(async { Ok(()) })
    }
}

/// Appends each run snapshot as one JSON line to a log file.
///
/// Every status transition writes a full snapshot, so the last line for a
/// given run id is its final state. The file is append-only; rotation is
/// left to the operator.
pub struct JsonlRunLog {
    path: PathBuf,
    // Serializes appends so concurrent runs never interleave lines
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlRunLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn append(&self, run: &ExecutionRun) -> Result<()> {
        let mut line = serde_json::to_string(run)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| LoomError::Store(format!("open run log {:?}: {}", self.path, e)))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| LoomError::Store(format!("append run log {:?}: {}", self.path, e)))?;
        Ok(())
    }
}

impl RunStore for JsonlRunLog {
    fn save(&self, run: &ExecutionRun) -> BoxFuture<'_, Result<()>> {
        let run = run.clone();
        Box::pin(async move { self.append(&run).await })
    }
}
