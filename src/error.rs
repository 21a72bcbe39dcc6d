//! Structured errors surfaced by the orchestration core.
//!
//! Every error carries a machine-readable [`ErrorKind`], a human message via
//! `Display`, and the id of the entity that caused it so callers can branch
//! programmatically instead of matching on strings.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Coarse classification of an [`OrchestratorError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    RoleUnavailable,
    ExecutionFailure,
    Cancelled,
    InvalidState,
}

/// Why a unit of work failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// The executor returned an error.
    WorkerError(String),
    /// The step exceeded its timeout.
    Timeout(Duration),
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureCause::WorkerError(message) => write!(f, "{}", message),
            FailureCause::Timeout(limit) => write!(f, "timed out after {:?}", limit),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    #[error("validation failed for '{entity_id}': {message}")]
    Validation { entity_id: String, message: String },

    #[error("no available worker with role '{role}' for '{entity_id}'")]
    RoleUnavailable { entity_id: String, role: String },

    #[error("execution of '{entity_id}' failed: {cause}")]
    ExecutionFailure {
        entity_id: String,
        cause: FailureCause,
    },

    #[error("'{entity_id}' was cancelled")]
    Cancelled { entity_id: String },

    #[error("invalid state for '{entity_id}': {message}")]
    InvalidState { entity_id: String, message: String },
}

impl OrchestratorError {
    pub fn validation(entity_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            entity_id: entity_id.into(),
            message: message.into(),
        }
    }

    pub fn role_unavailable(entity_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self::RoleUnavailable {
            entity_id: entity_id.into(),
            role: role.into(),
        }
    }

    pub fn worker_error(entity_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExecutionFailure {
            entity_id: entity_id.into(),
            cause: FailureCause::WorkerError(message.into()),
        }
    }

    pub fn timeout(entity_id: impl Into<String>, limit: Duration) -> Self {
        Self::ExecutionFailure {
            entity_id: entity_id.into(),
            cause: FailureCause::Timeout(limit),
        }
    }

    pub fn cancelled(entity_id: impl Into<String>) -> Self {
        Self::Cancelled {
            entity_id: entity_id.into(),
        }
    }

    pub fn invalid_state(entity_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidState {
            entity_id: entity_id.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::Validation { .. } => ErrorKind::Validation,
            OrchestratorError::RoleUnavailable { .. } => ErrorKind::RoleUnavailable,
            OrchestratorError::ExecutionFailure { .. } => ErrorKind::ExecutionFailure,
            OrchestratorError::Cancelled { .. } => ErrorKind::Cancelled,
            OrchestratorError::InvalidState { .. } => ErrorKind::InvalidState,
        }
    }

    /// Id of the task, worker, or project the error refers to.
    pub fn entity_id(&self) -> &str {
        match self {
            OrchestratorError::Validation { entity_id, .. }
            | OrchestratorError::RoleUnavailable { entity_id, .. }
            | OrchestratorError::ExecutionFailure { entity_id, .. }
            | OrchestratorError::Cancelled { entity_id }
            | OrchestratorError::InvalidState { entity_id, .. } => entity_id,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, OrchestratorError::Cancelled { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            OrchestratorError::ExecutionFailure {
                cause: FailureCause::Timeout(_),
                ..
            }
        )
    }
}
