use crate::task::{Task, TaskArtifact};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Unique identifier for workers
pub type WorkerId = String;

/// Closed set of worker specializations
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerRole {
    Analyst,
    ProductManager,
    Architect,
    Coordinator,
    Developer,
    Tester,
    Ops,
    Reviewer,
    Designer,
}

impl WorkerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerRole::Analyst => "analyst",
            WorkerRole::ProductManager => "product-manager",
            WorkerRole::Architect => "architect",
            WorkerRole::Coordinator => "coordinator",
            WorkerRole::Developer => "developer",
            WorkerRole::Tester => "tester",
            WorkerRole::Ops => "ops",
            WorkerRole::Reviewer => "reviewer",
            WorkerRole::Designer => "designer",
        }
    }

    /// Roles allowed to lead a hierarchical assignment
    pub fn can_lead(&self) -> bool {
        matches!(self, WorkerRole::Architect | WorkerRole::Coordinator)
    }
}

impl std::fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerStatus {
    Active,
    Busy,
    Idle,
    Offline,
}

impl WorkerStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, WorkerStatus::Active | WorkerStatus::Idle)
    }
}

/// Caller-supplied worker definition
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WorkerDefinition {
    pub id: WorkerId,
    pub name: String,
    pub role: WorkerRole,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl WorkerDefinition {
    pub fn new(id: impl Into<WorkerId>, name: impl Into<String>, role: WorkerRole) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
            capabilities: Vec::new(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: &[&str]) -> Self {
        self.capabilities = capabilities.iter().map(|c| c.to_string()).collect();
        self
    }
}

/// One worker per role
pub fn default_roster() -> Vec<WorkerDefinition> {
    vec![
        WorkerDefinition::new("analyst", "Business Analyst", WorkerRole::Analyst).with_capabilities(
            &[
                "requirements gathering",
                "stakeholder analysis",
                "user story creation",
            ],
        ),
        WorkerDefinition::new("product-manager", "Product Manager", WorkerRole::ProductManager)
            .with_capabilities(&["roadmap planning", "feature prioritization", "product strategy"]),
        WorkerDefinition::new("architect", "System Architect", WorkerRole::Architect)
            .with_capabilities(&[
                "system architecture design",
                "technology selection",
                "integration design",
            ]),
        WorkerDefinition::new("coordinator", "Scrum Master", WorkerRole::Coordinator)
            .with_capabilities(&["story preparation", "sprint planning", "task breakdown"]),
        WorkerDefinition::new("developer", "Developer", WorkerRole::Developer)
            .with_capabilities(&["implementation", "refactoring", "debugging"]),
        WorkerDefinition::new("tester", "QA Engineer", WorkerRole::Tester)
            .with_capabilities(&["test planning", "test automation", "regression testing"]),
        WorkerDefinition::new("ops", "DevOps Engineer", WorkerRole::Ops)
            .with_capabilities(&["deployment", "infrastructure", "monitoring"]),
        WorkerDefinition::new("reviewer", "Code Reviewer", WorkerRole::Reviewer)
            .with_capabilities(&["code review", "security review", "standards enforcement"]),
        WorkerDefinition::new("designer", "UX Designer", WorkerRole::Designer)
            .with_capabilities(&["interaction design", "prototyping", "accessibility"]),
    ]
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WorkerPerformance {
    pub tasks_completed: u64,
    pub average_duration_ms: f64,
    /// Percentage of successes over the recent outcome window
    pub success_rate: f64,
    /// 0 to 100
    pub quality_score: f64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Outcome {
    pub success: bool,
    pub duration_ms: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Worker {
    pub id: WorkerId,
    pub name: String,
    pub role: WorkerRole,
    pub capabilities: Vec<String>,
    pub status: WorkerStatus,
    pub performance: WorkerPerformance,
    /// Assignments created for this worker and not yet finished
    pub load: u32,
    pub recent_outcomes: VecDeque<Outcome>,
    pub last_active: Option<DateTime<Utc>>,
}

impl Worker {
    pub fn from_definition(definition: WorkerDefinition, initial_quality: f64) -> Self {
        Self {
            id: definition.id,
            name: definition.name,
            role: definition.role,
            capabilities: definition.capabilities,
            status: WorkerStatus::Idle,
            performance: WorkerPerformance {
                tasks_completed: 0,
                average_duration_ms: 0.0,
                success_rate: 100.0,
                quality_score: initial_quality,
            },
            load: 0,
            recent_outcomes: VecDeque::new(),
            last_active: None,
        }
    }

    /// Selection score: quality minus 10 points per pending assignment
    pub fn selection_score(&self) -> f64 {
        self.performance.quality_score - self.load as f64 * 10.0
    }
}

/// How assigned workers cooperate on one task
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CoordinationStrategy {
    Parallel,
    Sequential,
    Hierarchical { leader: WorkerId },
    Collaborative,
}

/// Strategy tag without payload, for reporting
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum CoordinationKind {
    Parallel,
    Sequential,
    Hierarchical,
    Collaborative,
}

impl CoordinationStrategy {
    pub fn kind(&self) -> CoordinationKind {
        match self {
            CoordinationStrategy::Parallel => CoordinationKind::Parallel,
            CoordinationStrategy::Sequential => CoordinationKind::Sequential,
            CoordinationStrategy::Hierarchical { .. } => CoordinationKind::Hierarchical,
            CoordinationStrategy::Collaborative => CoordinationKind::Collaborative,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum StepAction {
    Execute,
    Analyze,
    Coordinate,
    Synthesize,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WorkflowStep {
    pub worker_id: WorkerId,
    pub action: StepAction,
    /// Workers whose steps must finish first
    pub depends_on: Vec<WorkerId>,
    pub timeout: Duration,
}

/// Binds a task to workers under a strategy; consumed by execution
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Assignment {
    pub id: String,
    pub task: Task,
    pub worker_ids: Vec<WorkerId>,
    pub strategy: CoordinationStrategy,
    pub steps: Vec<WorkflowStep>,
    pub created_at: DateTime<Utc>,
}

impl Assignment {
    pub fn leader(&self) -> Option<&str> {
        match &self.strategy {
            CoordinationStrategy::Hierarchical { leader } => Some(leader),
            _ => None,
        }
    }

    pub fn step_timeout(&self, worker_id: &str) -> Option<Duration> {
        self.steps
            .iter()
            .find(|s| s.worker_id == worker_id)
            .map(|s| s.timeout)
    }
}

/// A teammate visible to a worker while it executes a step
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Collaborator {
    pub worker_id: WorkerId,
    pub name: String,
    pub role: WorkerRole,
}

/// Unit of work handed to a [`crate::worker::WorkerExecutor`]
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WorkRequest {
    pub assignment_id: String,
    pub task: Task,
    pub action: StepAction,
    pub instructions: String,
    pub collaborators: Vec<Collaborator>,
    /// Earlier results and any caller-provided context
    pub context: serde_json::Value,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct WorkOutput {
    pub content: String,
    pub findings: Vec<String>,
    pub artifacts: Vec<TaskArtifact>,
    pub tokens_used: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WorkerOutput {
    pub worker_id: WorkerId,
    pub role: WorkerRole,
    pub action: StepAction,
    pub output: WorkOutput,
    pub duration_ms: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConflictResolution {
    pub finding: String,
    pub raised_by: Vec<WorkerId>,
    pub decided_by: WorkerId,
    pub resolution: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Synthesis {
    pub synthesizer: WorkerId,
    pub consensus_points: Vec<String>,
    pub conflict_resolutions: Vec<ConflictResolution>,
    pub output: WorkOutput,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AssignmentResult {
    pub assignment_id: String,
    pub task_id: String,
    pub strategy: CoordinationKind,
    pub worker_ids: Vec<WorkerId>,
    pub outputs: Vec<WorkerOutput>,
    pub leader_plan: Option<WorkerOutput>,
    pub synthesis: Option<Synthesis>,
    pub artifacts: Vec<TaskArtifact>,
    pub summary: String,
    pub duration_ms: u64,
}

impl AssignmentResult {
    pub fn tokens_used(&self) -> u64 {
        let outputs: u64 = self.outputs.iter().map(|o| o.output.tokens_used).sum();
        let leader = self
            .leader_plan
            .as_ref()
            .map(|o| o.output.tokens_used)
            .unwrap_or(0);
        let synthesis = self
            .synthesis
            .as_ref()
            .map(|s| s.output.tokens_used)
            .unwrap_or(0);
        outputs + leader + synthesis
    }

    /// Findings across every output, in execution order
    pub fn findings(&self) -> Vec<String> {
        let mut findings = Vec::new();
        if let Some(plan) = &self.leader_plan {
            findings.extend(plan.output.findings.iter().cloned());
        }
        for output in &self.outputs {
            findings.extend(output.output.findings.iter().cloned());
        }
        if let Some(synthesis) = &self.synthesis {
            findings.extend(synthesis.output.findings.iter().cloned());
        }
        findings
    }
}

/// Tuning for the worker pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    pub task_timeout_minutes: f64,
    pub performance_window: usize,
    pub quality_increment: f64,
    pub quality_penalty: f64,
    pub initial_quality: f64,
    /// Upper bound on tasks the orchestrator runs at once
    pub max_concurrent_tasks: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            task_timeout_minutes: 30.0,
            performance_window: 100,
            quality_increment: 0.5,
            quality_penalty: 2.0,
            initial_quality: 85.0,
            max_concurrent_tasks: 3,
        }
    }
}

impl WorkerPoolConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::try_from_secs_f64((self.task_timeout_minutes * 60.0).max(0.0))
            .unwrap_or(Duration::MAX)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WorkerStatusView {
    pub id: WorkerId,
    pub name: String,
    pub role: WorkerRole,
    pub status: WorkerStatus,
    pub load: u32,
    pub performance: WorkerPerformance,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct WorkerSummary {
    pub total_workers: usize,
    pub active: usize,
    pub busy: usize,
    pub idle: usize,
    pub offline: usize,
    pub average_quality: f64,
    pub average_success_rate: f64,
    pub total_tasks_completed: u64,
}
