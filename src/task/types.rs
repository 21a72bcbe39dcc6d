use crate::error::{OrchestratorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for tasks
///
/// Sub-task ids are derived from their parent's id, so ids are plain strings
/// rather than generated UUIDs.
pub type TaskId = String;

/// Core unit of work handed to the orchestration core
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub dependencies: Vec<TaskId>,
    pub effort: TaskEffort,
    #[serde(default)]
    pub artifacts: Vec<TaskArtifact>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub user_story: Option<UserStory>,
    /// Set on sharded sub-tasks; never part of `dependencies`
    #[serde(default)]
    pub parent_id: Option<TaskId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    #[serde(alias = "analysis")]
    RequirementsAnalysis,
    #[serde(alias = "design")]
    ArchitectureDesign,
    StoryCreation,
    Development,
    Testing,
    Deployment,
    Documentation,
    Review,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::RequirementsAnalysis => "requirements-analysis",
            TaskType::ArchitectureDesign => "architecture-design",
            TaskType::StoryCreation => "story-creation",
            TaskType::Development => "development",
            TaskType::Testing => "testing",
            TaskType::Deployment => "deployment",
            TaskType::Documentation => "documentation",
            TaskType::Review => "review",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum TaskPriority {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Backlog,
    InProgress,
    Review,
    Testing,
    Done,
    Blocked,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Effort estimate used for scoring and splitting work
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct TaskEffort {
    pub estimated_hours: f64,
    pub complexity: Complexity,
    pub risk_level: RiskLevel,
}

impl Default for TaskEffort {
    fn default() -> Self {
        Self {
            estimated_hours: 4.0,
            complexity: Complexity::Medium,
            risk_level: RiskLevel::Low,
        }
    }
}

/// Something a task produced or consumes (document, code, diagram, ...)
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TaskArtifact {
    pub name: String,
    pub kind: String,
    pub content: String,
}

/// Persona-oriented story attached to user-story sub-tasks
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserStory {
    pub persona: String,
    pub want: String,
    pub benefit: String,
}

impl Task {
    pub fn new(
        id: impl Into<TaskId>,
        title: impl Into<String>,
        description: impl Into<String>,
        task_type: TaskType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            task_type,
            priority: TaskPriority::Medium,
            status: TaskStatus::Backlog,
            dependencies: Vec::new(),
            effort: TaskEffort::default(),
            artifacts: Vec::new(),
            acceptance_criteria: Vec::new(),
            user_story: None,
            parent_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_effort(mut self, hours: f64, complexity: Complexity, risk_level: RiskLevel) -> Self {
        self.effort = TaskEffort {
            estimated_hours: hours,
            complexity,
            risk_level,
        };
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_acceptance_criteria(mut self, criteria: Vec<String>) -> Self {
        self.acceptance_criteria = criteria;
        self
    }

    /// Reject malformed tasks before they reach the sharder or the pool
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(OrchestratorError::validation(
                &self.id,
                "task id must not be empty",
            ));
        }
        if self.title.trim().is_empty() {
            return Err(OrchestratorError::validation(
                &self.id,
                "task title must not be empty",
            ));
        }
        if self.description.trim().is_empty() {
            return Err(OrchestratorError::validation(
                &self.id,
                "task description must not be empty",
            ));
        }
        self.check_dependencies()
    }

    /// Self-loops are the only structural defect checked here; cycles across
    /// tasks are caught when execution waves stop making progress.
    pub fn check_dependencies(&self) -> Result<()> {
        if self.dependencies.iter().any(|dep| dep == &self.id) {
            return Err(OrchestratorError::validation(
                &self.id,
                "task depends on itself",
            ));
        }
        if !self.effort.estimated_hours.is_finite() || self.effort.estimated_hours < 0.0 {
            return Err(OrchestratorError::validation(
                &self.id,
                "estimated hours must be a non-negative number",
            ));
        }
        Ok(())
    }

    pub fn word_count(&self) -> usize {
        self.description.split_whitespace().count()
    }

    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}
