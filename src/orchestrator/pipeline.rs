//! Pure helpers behind the planning and execution stages: story generation,
//! role staffing, dependency waves, and context-preservation scoring.

use crate::error::{OrchestratorError, Result};
use crate::orchestrator::project::{FunctionalRequirement, Project};
use crate::task::{Complexity, RiskLevel, Task, TaskId, TaskType, UserStory};
use crate::worker::WorkerRole;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

const PERSONAS: [&str; 5] = [
    "registered user",
    "system administrator",
    "business analyst",
    "end user",
    "team member",
];

const BENEFITS: [&str; 5] = [
    "I can accomplish my tasks more efficiently",
    "I have better control over my data",
    "I can make informed decisions",
    "I can collaborate effectively with my team",
    "I can access the information I need quickly",
];

const STANDARD_CRITERIA: [&str; 3] = [
    "Feature functions as specified",
    "Error handling works correctly",
    "Performance meets requirements",
];

const MAX_STORY_HOURS: f64 = 21.0;

/// Tuning for the planning and execution stages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Usage a manual planning pass is estimated to cost
    pub planning_baseline_usage: u64,
    pub execution_baseline_usage: u64,
    pub require_functional_requirements: bool,
    pub require_components: bool,
    /// How long shutdown waits for a running project before cancelling it
    pub shutdown_grace_period_secs: u64,
    /// How long shutdown waits for a cancelled run to unwind
    pub shutdown_cancel_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            planning_baseline_usage: 15_000,
            execution_baseline_usage: 25_000,
            require_functional_requirements: false,
            require_components: false,
            shutdown_grace_period_secs: 5,
            shutdown_cancel_timeout_ms: 5_000,
        }
    }
}

pub fn story_id(requirement_id: &str) -> String {
    format!("US_{}", requirement_id)
}

/// One development task per functional requirement, phrased as a user story.
///
/// Requirement dependencies become task dependencies; references to unknown
/// requirements are dropped.
pub fn stories_from_requirements(project: &Project) -> Vec<Task> {
    let known: HashSet<&str> = project
        .requirements
        .functional
        .iter()
        .map(|r| r.id.as_str())
        .collect();

    project
        .requirements
        .functional
        .iter()
        .enumerate()
        .map(|(index, requirement)| {
            let persona = PERSONAS[index % PERSONAS.len()];
            let story = UserStory {
                persona: persona.to_string(),
                want: story_want(requirement),
                benefit: story_benefit(requirement, index),
            };
            let hours = requirement
                .estimated_hours
                .unwrap_or_else(|| estimate_story_hours(requirement));
            let dependencies = requirement
                .dependencies
                .iter()
                .filter(|d| known.contains(d.as_str()) && *d != &requirement.id)
                .map(|d| story_id(d));

            let mut task = Task::new(
                story_id(&requirement.id),
                format!("Implement: {}", requirement.title),
                format!(
                    "As a {}, I want {}, so that {}.",
                    story.persona, story.want, story.benefit
                ),
                TaskType::Development,
            )
            .with_priority(requirement.priority)
            .with_effort(
                hours,
                story_complexity(hours, requirement.dependencies.len()),
                story_risk(&requirement.title),
            )
            .with_dependencies(dependencies)
            .with_acceptance_criteria(story_criteria(requirement));
            task.user_story = Some(story);
            task
        })
        .collect()
}

fn story_want(requirement: &FunctionalRequirement) -> String {
    if requirement.description.trim().is_empty() {
        return format!("to {}", requirement.title.to_lowercase());
    }
    let description = requirement
        .description
        .trim()
        .trim_end_matches('.')
        .to_lowercase();
    for prefix in ["the system shall ", "system shall ", "the system should "] {
        if let Some(rest) = description.strip_prefix(prefix) {
            return format!("to {}", rest);
        }
    }
    description
}

fn story_benefit(requirement: &FunctionalRequirement, index: usize) -> String {
    let title = requirement.title.to_lowercase();
    let benefit = if title.contains("auth") {
        "I can securely access my account"
    } else if title.contains("data") {
        "I can manage my information effectively"
    } else if title.contains("report") {
        "I can analyze data and make informed decisions"
    } else {
        BENEFITS[index % BENEFITS.len()]
    };
    benefit.to_string()
}

/// Given criteria first, padded with standard ones up to three
fn story_criteria(requirement: &FunctionalRequirement) -> Vec<String> {
    let mut criteria = requirement.acceptance_criteria.clone();
    let missing = STANDARD_CRITERIA.len().saturating_sub(criteria.len());
    criteria.extend(STANDARD_CRITERIA.iter().take(missing).map(|c| c.to_string()));
    criteria
}

pub fn estimate_story_hours(requirement: &FunctionalRequirement) -> f64 {
    let title = requirement.title.to_lowercase();
    let mut hours: f64 = 5.0;
    if title.contains("auth") {
        hours += 3.0;
    }
    if title.contains("report") {
        hours += 5.0;
    }
    if title.contains("integration") {
        hours += 8.0;
    }
    if requirement.dependencies.len() > 2 {
        hours += 2.0;
    }
    hours.min(MAX_STORY_HOURS)
}

pub fn story_complexity(hours: f64, dependencies: usize) -> Complexity {
    if hours > 13.0 || dependencies > 3 {
        Complexity::Complex
    } else if hours > 8.0 || dependencies > 1 {
        Complexity::Medium
    } else {
        Complexity::Simple
    }
}

pub fn story_risk(title: &str) -> RiskLevel {
    let title = title.to_lowercase();
    if ["integration", "external", "migration"]
        .iter()
        .any(|k| title.contains(k))
    {
        RiskLevel::High
    } else if ["auth", "security", "performance"]
        .iter()
        .any(|k| title.contains(k))
    {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Roles staffed for a task; complex work always gets a leader
pub fn roles_for(task: &Task) -> Vec<WorkerRole> {
    let mut roles = match task.task_type {
        TaskType::RequirementsAnalysis => vec![WorkerRole::Analyst, WorkerRole::ProductManager],
        TaskType::ArchitectureDesign => vec![WorkerRole::Architect, WorkerRole::Designer],
        TaskType::StoryCreation => vec![WorkerRole::Coordinator],
        TaskType::Development => vec![WorkerRole::Developer, WorkerRole::Tester],
        TaskType::Testing => vec![WorkerRole::Tester],
        TaskType::Deployment => vec![WorkerRole::Ops],
        TaskType::Documentation => vec![WorkerRole::Analyst],
        TaskType::Review => vec![WorkerRole::Reviewer],
    };
    if task.effort.complexity == Complexity::Complex && !roles.iter().any(|r| r.can_lead()) {
        roles.insert(0, WorkerRole::Architect);
    }
    roles
}

/// Rewrite dependencies on sharded parents to point at all of their shards
pub fn replace_sharded_dependencies(tasks: &mut [Task], replacements: &HashMap<TaskId, Vec<TaskId>>) {
    if replacements.is_empty() {
        return;
    }
    for task in tasks.iter_mut() {
        let mut rewritten: Vec<TaskId> = Vec::with_capacity(task.dependencies.len());
        for dependency in &task.dependencies {
            match replacements.get(dependency) {
                Some(shards) => rewritten.extend(shards.iter().cloned()),
                None => rewritten.push(dependency.clone()),
            }
        }
        rewritten.retain(|d| d != &task.id);
        rewritten.dedup();
        task.dependencies = rewritten;
    }
}

/// Next batch of tasks whose in-set dependencies are all complete, in input
/// order and capped at `limit`. Dependencies outside the set are treated as
/// satisfied.
pub fn ready_wave<'a>(
    pending: &'a [Task],
    completed: &HashSet<TaskId>,
    all_ids: &HashSet<TaskId>,
    limit: usize,
) -> Vec<&'a Task> {
    pending
        .iter()
        .filter(|task| {
            task.dependencies
                .iter()
                .all(|d| completed.contains(d) || !all_ids.contains(d))
        })
        .take(limit.max(1))
        .collect()
}

/// Reject dependency cycles before any work starts
pub fn check_acyclic(tasks: &[Task]) -> Result<()> {
    let all_ids: HashSet<TaskId> = tasks.iter().map(|t| t.id.clone()).collect();
    let mut completed: HashSet<TaskId> = HashSet::new();
    let mut pending: Vec<Task> = tasks.to_vec();

    while !pending.is_empty() {
        let ready: Vec<TaskId> = ready_wave(&pending, &completed, &all_ids, usize::MAX)
            .into_iter()
            .map(|t| t.id.clone())
            .collect();
        if ready.is_empty() {
            let stuck: Vec<&str> = pending.iter().map(|t| t.id.as_str()).collect();
            return Err(OrchestratorError::validation(
                stuck.join(", "),
                "dependency cycle between tasks",
            ));
        }
        pending.retain(|t| !ready.contains(&t.id));
        completed.extend(ready);
    }
    Ok(())
}

/// Technical context attached to every story: the full architecture and the
/// project constraints
pub fn story_context_payload(task: &Task, project: &Project) -> serde_json::Value {
    let components: Vec<&str> = project
        .architecture
        .components
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    serde_json::json!({
        "id": task.id,
        "title": task.title,
        "description": task.description,
        "user_story": task.user_story,
        "acceptance_criteria": task.acceptance_criteria,
        "components": components,
        "patterns": project.architecture.patterns,
        "constraints": project.requirements.constraints,
    })
}

/// Percentage of project context elements (components, constraints and
/// requirement acceptance criteria) still present in the stored story
/// contexts. `stories` pairs each requirement id with its story payload as
/// read back from the context store.
pub fn context_preservation(
    project: &Project,
    stories: &HashMap<String, serde_json::Value>,
) -> f64 {
    let mut total = 0usize;
    let mut preserved = 0usize;

    let listed = |payload: &serde_json::Value, key: &str, wanted: &str| {
        payload
            .get(key)
            .and_then(|v| v.as_array())
            .is_some_and(|items| items.iter().any(|i| i.as_str() == Some(wanted)))
    };

    for component in &project.architecture.components {
        total += 1;
        if stories
            .values()
            .any(|p| listed(p, "components", &component.name))
        {
            preserved += 1;
        }
    }

    for constraint in &project.requirements.constraints {
        total += 1;
        if stories.values().any(|p| listed(p, "constraints", constraint)) {
            preserved += 1;
        }
    }

    for requirement in &project.requirements.functional {
        let payload = stories.get(&requirement.id);
        for criterion in &requirement.acceptance_criteria {
            total += 1;
            if payload.is_some_and(|p| listed(p, "acceptance_criteria", criterion)) {
                preserved += 1;
            }
        }
    }

    if total == 0 {
        return 100.0;
    }
    (preserved as f64 / total as f64 * 100.0).round()
}
