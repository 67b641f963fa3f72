use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::run::Variables;

/// Completion notification published when a run reaches a terminal state.
///
/// Delivery scoping (per-user, per-execution observers) is the subscriber's
/// concern; every subscriber receives every event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    WorkflowExecutionCompleted {
        execution_id: String,
        workflow_id: String,
        user_id: String,
        status: String,
        completed_at: DateTime<Utc>,
        output_data: Variables,
    },
    WorkflowExecutionFailed {
        execution_id: String,
        workflow_id: String,
        user_id: String,
        status: String,
        error: String,
        completed_at: DateTime<Utc>,
    },
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<RunEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: RunEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(RunEvent::WorkflowExecutionFailed {
            execution_id: "e1".into(),
            workflow_id: "w1".into(),
            user_id: "u1".into(),
            status: "failed".into(),
            error: "boom".into(),
            completed_at: Utc::now(),
        });

        match rx.recv().await.unwrap() {
            RunEvent::WorkflowExecutionFailed { execution_id, error, .. } => {
                assert_eq!(execution_id, "e1");
                assert_eq!(error, "boom");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::default();
        bus.publish(RunEvent::WorkflowExecutionCompleted {
            execution_id: "e1".into(),
            workflow_id: "w1".into(),
            user_id: "u1".into(),
            status: "completed".into(),
            completed_at: Utc::now(),
            output_data: Variables::new(),
        });
    }
}
