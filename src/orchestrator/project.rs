use crate::error::{OrchestratorError, Result};
use crate::task::TaskPriority;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ProjectId = String;

const MIN_NAME_LENGTH: usize = 3;
const MIN_DESCRIPTION_LENGTH: usize = 10;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FunctionalRequirement {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: TaskPriority,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    /// Ids of other functional requirements
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
}

fn default_priority() -> TaskPriority {
    TaskPriority::Medium
}

impl FunctionalRequirement {
    pub fn new(id: impl Into<String>, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            priority: TaskPriority::Medium,
            acceptance_criteria: Vec::new(),
            dependencies: Vec::new(),
            estimated_hours: None,
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependencies(mut self, dependencies: &[&str]) -> Self {
        self.dependencies = dependencies.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_acceptance_criteria(mut self, criteria: &[&str]) -> Self {
        self.acceptance_criteria = criteria.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_estimated_hours(mut self, hours: f64) -> Self {
        self.estimated_hours = Some(hours);
        self
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct ProjectRequirements {
    pub functional: Vec<FunctionalRequirement>,
    pub non_functional: Vec<String>,
    pub business_goals: Vec<String>,
    pub constraints: Vec<String>,
    pub stakeholders: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ArchitectureComponent {
    pub name: String,
    #[serde(default)]
    pub responsibility: String,
    #[serde(default)]
    pub technologies: Vec<String>,
}

impl ArchitectureComponent {
    pub fn new(name: impl Into<String>, responsibility: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            responsibility: responsibility.into(),
            technologies: Vec::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct ArchitectureSpec {
    pub patterns: Vec<String>,
    pub components: Vec<ArchitectureComponent>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectPhase {
    Planning,
    Execution,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for ProjectPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProjectPhase::Planning => "planning",
            ProjectPhase::Execution => "execution",
            ProjectPhase::Completed => "completed",
            ProjectPhase::Failed => "failed",
            ProjectPhase::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Caller input for [`crate::Orchestrator::create_project`]
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ProjectDraft {
    #[serde(default)]
    pub id: Option<ProjectId>,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub requirements: ProjectRequirements,
    #[serde(default)]
    pub architecture: ArchitectureSpec,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl ProjectDraft {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<ProjectId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_requirement(mut self, requirement: FunctionalRequirement) -> Self {
        self.requirements.functional.push(requirement);
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.requirements.constraints.push(constraint.into());
        self
    }

    pub fn with_component(mut self, component: ArchitectureComponent) -> Self {
        self.architecture.components.push(component);
        self
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub description: String,
    pub requirements: ProjectRequirements,
    pub architecture: ArchitectureSpec,
    pub phase: ProjectPhase,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

impl Project {
    pub fn from_draft(draft: ProjectDraft) -> Self {
        let now = Utc::now();
        Self {
            id: draft
                .id
                .unwrap_or_else(|| format!("project_{}", uuid::Uuid::new_v4().simple())),
            name: draft.name,
            description: draft.description,
            requirements: draft.requirements,
            architecture: draft.architecture,
            phase: ProjectPhase::Planning,
            created_at: now,
            updated_at: now,
            metadata: draft.metadata,
        }
    }

    pub fn set_phase(&mut self, phase: ProjectPhase) {
        self.phase = phase;
        self.updated_at = Utc::now();
    }

    /// Payload stored as the project's root context entry
    pub fn context_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "requirements": self.requirements,
            "architecture": self.architecture,
        })
    }
}

/// Which optional checks [`validate_project`] applies
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectChecks {
    pub require_functional_requirements: bool,
    pub require_components: bool,
}

/// Collects every issue and reports them together
pub fn validate_project(project: &Project, checks: ProjectChecks) -> Result<()> {
    let mut issues = Vec::new();

    if project.name.trim().chars().count() < MIN_NAME_LENGTH {
        issues.push(format!(
            "project name must be at least {} characters",
            MIN_NAME_LENGTH
        ));
    }
    if project.description.trim().chars().count() < MIN_DESCRIPTION_LENGTH {
        issues.push(format!(
            "project description must be at least {} characters",
            MIN_DESCRIPTION_LENGTH
        ));
    }
    if checks.require_functional_requirements && project.requirements.functional.is_empty() {
        issues.push("at least one functional requirement is required".to_string());
    }
    if checks.require_components && project.architecture.components.is_empty() {
        issues.push("at least one architecture component is required".to_string());
    }

    let mut ids = std::collections::HashSet::new();
    for requirement in &project.requirements.functional {
        if requirement.id.trim().is_empty() || requirement.title.trim().is_empty() {
            issues.push("functional requirements need an id and a title".to_string());
        } else if !ids.insert(requirement.id.as_str()) {
            issues.push(format!("duplicate functional requirement {}", requirement.id));
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(OrchestratorError::validation(&project.id, issues.join(", ")))
    }
}
