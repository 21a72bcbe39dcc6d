//! Notifications emitted by the worker pool, cost tracker, and orchestrator.
//!
//! Handlers are registered up front and called synchronously in registration
//! order. Callers that prefer polling register a [`ChannelEventHandler`] and
//! read from its receiver.

use anyhow::Result;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::task::ShardingStrategy;
use crate::worker::AssignmentResult;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    ProjectCreated {
        project_id: String,
        name: String,
    },
    ExecutionStarted {
        project_id: String,
    },
    StageCompleted {
        project_id: String,
        stage: String,
        duration_ms: u64,
    },
    ExecutionCompleted {
        project_id: String,
        duration_ms: u64,
    },
    ExecutionFailed {
        project_id: String,
        error: String,
    },
    ExecutionPaused {
        project_id: String,
    },
    ExecutionResumed {
        project_id: String,
    },
    ExecutionCancelled {
        project_id: String,
    },
    TaskSharded {
        task_id: String,
        strategy: ShardingStrategy,
        subtask_ids: Vec<String>,
    },
    /// Carries the full result so subscribers can read outputs and
    /// artifacts without querying the pool
    TaskCompleted {
        task_id: String,
        worker_ids: Vec<String>,
        result: Box<AssignmentResult>,
    },
    TaskFailed {
        task_id: String,
        worker_ids: Vec<String>,
        error: String,
    },
    TaskCancelled {
        task_id: String,
        worker_ids: Vec<String>,
    },
    SignificantSavings {
        operation: String,
        saved: f64,
    },
}

/// Handler for orchestrator events
pub trait EventHandler: Send + Sync {
    fn handle_event(&self, event: &OrchestratorEvent) -> Result<()>;
}

/// Fans events out to every registered handler
#[derive(Default)]
pub struct EventDispatcher {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("handlers", &self.handler_count())
            .finish()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handlers(handlers: Vec<Arc<dyn EventHandler>>) -> Self {
        Self {
            handlers: RwLock::new(handlers),
        }
    }

    pub fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = match self.handlers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers.push(handler);
    }

    pub fn handler_count(&self) -> usize {
        match self.handlers.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Handler failures are logged and never interrupt the caller
    pub fn emit(&self, event: OrchestratorEvent) {
        let handlers = match self.handlers.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for handler in handlers {
            if let Err(e) = handler.handle_event(&event) {
                warn!("Event handler failed: {}", e);
            }
        }
    }
}

/// Logs every event at info level
pub struct LoggingEventHandler;

impl EventHandler for LoggingEventHandler {
    fn handle_event(&self, event: &OrchestratorEvent) -> Result<()> {
        match event {
            OrchestratorEvent::ProjectCreated { project_id, name } => {
                info!("Project created: {} ({})", name, project_id);
            }
            OrchestratorEvent::ExecutionStarted { project_id } => {
                info!("Execution started for project {}", project_id);
            }
            OrchestratorEvent::StageCompleted {
                project_id,
                stage,
                duration_ms,
            } => {
                info!(
                    "Stage {} completed for project {} in {}ms",
                    stage, project_id, duration_ms
                );
            }
            OrchestratorEvent::ExecutionCompleted {
                project_id,
                duration_ms,
            } => {
                info!(
                    "Execution completed for project {} in {}ms",
                    project_id, duration_ms
                );
            }
            OrchestratorEvent::ExecutionFailed { project_id, error } => {
                info!("Execution failed for project {}: {}", project_id, error);
            }
            OrchestratorEvent::ExecutionPaused { project_id } => {
                info!("Execution paused for project {}", project_id);
            }
            OrchestratorEvent::ExecutionResumed { project_id } => {
                info!("Execution resumed for project {}", project_id);
            }
            OrchestratorEvent::ExecutionCancelled { project_id } => {
                info!("Execution cancelled for project {}", project_id);
            }
            OrchestratorEvent::TaskSharded {
                task_id,
                strategy,
                subtask_ids,
            } => {
                info!(
                    "Task {} sharded into {} sub-tasks ({})",
                    task_id,
                    subtask_ids.len(),
                    strategy
                );
            }
            OrchestratorEvent::TaskCompleted {
                task_id,
                worker_ids,
                result,
            } => {
                info!(
                    "Task {} completed by [{}] ({:?}, {} artifacts)",
                    task_id,
                    worker_ids.join(", "),
                    result.strategy,
                    result.artifacts.len()
                );
            }
            OrchestratorEvent::TaskFailed {
                task_id,
                worker_ids,
                error,
            } => {
                info!(
                    "Task {} failed for [{}]: {}",
                    task_id,
                    worker_ids.join(", "),
                    error
                );
            }
            OrchestratorEvent::TaskCancelled {
                task_id,
                worker_ids,
            } => {
                info!(
                    "Task {} cancelled for [{}]",
                    task_id,
                    worker_ids.join(", ")
                );
            }
            OrchestratorEvent::SignificantSavings { operation, saved } => {
                info!("Significant savings on {}: ${:.2}", operation, saved);
            }
        }
        Ok(())
    }
}

/// Forwards events to an unbounded channel for callers that poll
pub struct ChannelEventHandler {
    sender: mpsc::UnboundedSender<OrchestratorEvent>,
}

impl ChannelEventHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OrchestratorEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventHandler for ChannelEventHandler {
    fn handle_event(&self, event: &OrchestratorEvent) -> Result<()> {
        self.sender
            .send(event.clone())
            .map_err(|_| anyhow::anyhow!("event receiver dropped"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatcher_fans_out_to_channel() {
        let dispatcher = EventDispatcher::new();
        let (handler, mut receiver) = ChannelEventHandler::new();
        dispatcher.register(Arc::new(LoggingEventHandler));
        dispatcher.register(Arc::new(handler));
        assert_eq!(dispatcher.handler_count(), 2);

        dispatcher.emit(OrchestratorEvent::ExecutionStarted {
            project_id: "p1".to_string(),
        });

        match receiver.try_recv() {
            Ok(OrchestratorEvent::ExecutionStarted { project_id }) => assert_eq!(project_id, "p1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_dropped_receiver_does_not_break_emit() {
        let (handler, receiver) = ChannelEventHandler::new();
        drop(receiver);
        let dispatcher = EventDispatcher::with_handlers(vec![Arc::new(handler)]);
        dispatcher.emit(OrchestratorEvent::SignificantSavings {
            operation: "planning".to_string(),
            saved: 150.0,
        });
    }
}
