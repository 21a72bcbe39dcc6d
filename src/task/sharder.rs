use crate::error::{OrchestratorError, Result};
use crate::task::complexity;
use crate::task::types::*;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, info};

static LIST_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:[-*•]|\d+[.)])\s+(.+?)\s*$").expect("list item pattern is valid")
});

static USER_STORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bas an?\s+(?P<persona>[^,.\n]+?),?\s+I want(?:\s+to)?\s+(?P<want>[^.\n]+?)\s*,?\s+so that\s+(?P<benefit>[^.\n]+)",
    )
    .expect("user story pattern is valid")
});

static PREREQUISITE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:after|once|using|based on|builds on|extends|requires)\b")
        .expect("prerequisite pattern is valid")
});

const ARCHITECTURE_LAYERS: [(&str, &str); 4] = [
    ("Presentation Layer", "UI/UX design and user interfaces"),
    ("Business Logic Layer", "Core business rules and workflows"),
    ("Data Access Layer", "Database design and data management"),
    ("Integration Layer", "External APIs and service integrations"),
];

/// (name, description, weight, complexity); weights are also the fixed
/// hours used when the parent carries no estimate
const CONCERN_AREAS: [(&str, &str, f64, Complexity); 4] = [
    (
        "Core Logic",
        "Main functionality implementation",
        6.0,
        Complexity::Complex,
    ),
    (
        "Error Handling",
        "Exception and edge case handling",
        3.0,
        Complexity::Medium,
    ),
    ("Testing", "Unit and integration tests", 4.0, Complexity::Medium),
    (
        "Documentation",
        "Code documentation and usage notes",
        2.0,
        Complexity::Simple,
    ),
];

const CHUNK_FOCUS: [&str; 5] = [
    "initial setup and foundation",
    "core implementation",
    "advanced features",
    "testing and refinement",
    "optimization and cleanup",
];

/// Time-boxed splits stop here; larger estimates get longer boxes instead
pub const MAX_TIME_BOXES: usize = 20;

const DEFAULT_PERSONA: &str = "user";
const DEFAULT_BENEFIT: &str = "the stated requirement is satisfied";

/// How a task is decomposed
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ShardingStrategy {
    LayeredArchitecture,
    FeatureDecomposition,
    UserStoryBreakdown,
    ComplexityBased,
    TimeBoxed,
}

impl ShardingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShardingStrategy::LayeredArchitecture => "layered-architecture",
            ShardingStrategy::FeatureDecomposition => "feature-decomposition",
            ShardingStrategy::UserStoryBreakdown => "user-story-breakdown",
            ShardingStrategy::ComplexityBased => "complexity-based",
            ShardingStrategy::TimeBoxed => "time-boxed",
        }
    }
}

impl std::fmt::Display for ShardingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardingConfig {
    /// Chunk size for time-boxed sharding
    pub max_chunk_hours: f64,
}

impl Default for ShardingConfig {
    fn default() -> Self {
        Self {
            max_chunk_hours: 4.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ShardRecord {
    pub strategy: ShardingStrategy,
    pub subtasks: Vec<Task>,
    pub sharded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ShardingStats {
    pub total_tasks_sharded: usize,
    pub total_subtasks: usize,
    pub average_subtasks_per_task: f64,
    pub strategies_used: HashMap<ShardingStrategy, usize>,
}

/// Decomposes tasks into ordered, dependency-linked sub-tasks
#[derive(Debug, Default)]
pub struct TaskSharder {
    config: ShardingConfig,
    history: DashMap<TaskId, ShardRecord>,
}

#[derive(Debug, Clone)]
struct FeatureUnit {
    name: String,
    text: String,
    builds_on_previous: bool,
}

impl TaskSharder {
    pub fn new(config: ShardingConfig) -> Self {
        Self {
            config,
            history: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ShardingConfig {
        &self.config
    }

    /// First matching rule wins
    pub fn select_strategy(&self, task: &Task) -> ShardingStrategy {
        let score = complexity::score(task);

        if task.task_type == TaskType::ArchitectureDesign && score > 8 {
            ShardingStrategy::LayeredArchitecture
        } else if task.task_type == TaskType::Development && task.effort.estimated_hours > 10.0 {
            ShardingStrategy::FeatureDecomposition
        } else if task.task_type == TaskType::RequirementsAnalysis {
            ShardingStrategy::UserStoryBreakdown
        } else if score > 7 {
            ShardingStrategy::ComplexityBased
        } else {
            ShardingStrategy::TimeBoxed
        }
    }

    /// Split a task into sub-tasks and remember the result under its id.
    ///
    /// Sub-task ids are `{parent}_shard_{index}`, so sharding the same task
    /// twice yields the same ids and replaces the earlier history record.
    pub fn shard(&self, task: &Task) -> Result<Vec<Task>> {
        task.check_dependencies()?;
        if task.description.trim().is_empty() && task.effort.estimated_hours <= 0.0 {
            return Err(OrchestratorError::validation(
                &task.id,
                "task has no description and no effort estimate to shard",
            ));
        }

        let strategy = self.select_strategy(task);
        debug!("Sharding task {} with strategy {}", task.id, strategy);

        let subtasks = match strategy {
            ShardingStrategy::LayeredArchitecture => self.layered_shards(task),
            ShardingStrategy::FeatureDecomposition => self.feature_shards(task),
            ShardingStrategy::UserStoryBreakdown => self.user_story_shards(task),
            ShardingStrategy::ComplexityBased => self.complexity_shards(task),
            ShardingStrategy::TimeBoxed => self.time_boxed_shards(task),
        };

        self.history.insert(
            task.id.clone(),
            ShardRecord {
                strategy,
                subtasks: subtasks.clone(),
                sharded_at: Utc::now(),
            },
        );

        info!(
            "Task {} sharded into {} sub-tasks using {}",
            task.id,
            subtasks.len(),
            strategy
        );
        Ok(subtasks)
    }

    pub fn history(&self, task_id: &str) -> Option<ShardRecord> {
        self.history.get(task_id).map(|record| record.clone())
    }

    pub fn stats(&self) -> ShardingStats {
        let mut stats = ShardingStats::default();
        for record in self.history.iter() {
            stats.total_tasks_sharded += 1;
            stats.total_subtasks += record.subtasks.len();
            *stats.strategies_used.entry(record.strategy).or_insert(0) += 1;
        }
        if stats.total_tasks_sharded > 0 {
            let average = stats.total_subtasks as f64 / stats.total_tasks_sharded as f64;
            stats.average_subtasks_per_task = (average * 100.0).round() / 100.0;
        }
        stats
    }

    pub fn clear(&self) {
        self.history.clear();
    }

    fn layered_shards(&self, task: &Task) -> Vec<Task> {
        let hours = task.effort.estimated_hours / ARCHITECTURE_LAYERS.len() as f64;

        ARCHITECTURE_LAYERS
            .iter()
            .enumerate()
            .map(|(index, (layer, focus))| {
                let mut subtask = new_subtask(
                    task,
                    index,
                    format!("{} - {}", task.title, layer),
                    format!("{}\n\nLayer focus: {}", task.description, focus),
                );
                subtask.effort.estimated_hours = hours;
                subtask.dependencies = chained_dependencies(task, index);
                subtask
            })
            .collect()
    }

    fn feature_shards(&self, task: &Task) -> Vec<Task> {
        let features = extract_features(&task.description);
        let hours = task.effort.estimated_hours / features.len() as f64;

        features
            .iter()
            .enumerate()
            .map(|(index, feature)| {
                let criteria = vec![
                    format!("{} is implemented as described", feature.name),
                    format!("{} handles invalid input and error cases", feature.name),
                    format!("{} is covered by automated tests", feature.name),
                ];
                let criteria_text = criteria
                    .iter()
                    .map(|c| format!("- {}", c))
                    .collect::<Vec<_>>()
                    .join("\n");

                let mut subtask = new_subtask(
                    task,
                    index,
                    format!("Implement {}", feature.name),
                    format!("{}\n\nAcceptance Criteria:\n{}", feature.text, criteria_text),
                );
                subtask.effort.estimated_hours = hours;
                subtask.acceptance_criteria = criteria;
                subtask.dependencies = if index == 0 {
                    task.dependencies.clone()
                } else if feature.builds_on_previous {
                    vec![shard_id(&task.id, index - 1)]
                } else {
                    Vec::new()
                };
                subtask
            })
            .collect()
    }

    fn user_story_shards(&self, task: &Task) -> Vec<Task> {
        let stories = extract_user_stories(task);
        let hours = task.effort.estimated_hours / stories.len() as f64;

        stories
            .into_iter()
            .enumerate()
            .map(|(index, story)| {
                let mut subtask = new_subtask(
                    task,
                    index,
                    format!("User Story: {}", short_name(&story.want)),
                    format!(
                        "As a {}, I want {} so that {}.",
                        story.persona, story.want, story.benefit
                    ),
                );
                subtask.effort.estimated_hours = hours;
                subtask.dependencies = if index == 0 {
                    task.dependencies.clone()
                } else {
                    Vec::new()
                };
                subtask.user_story = Some(story);
                subtask
            })
            .collect()
    }

    fn complexity_shards(&self, task: &Task) -> Vec<Task> {
        let total_weight: f64 = CONCERN_AREAS.iter().map(|area| area.2).sum();
        let parent_hours = task.effort.estimated_hours;
        let core_id = shard_id(&task.id, 0);

        CONCERN_AREAS
            .iter()
            .enumerate()
            .map(|(index, (name, description, weight, level))| {
                let mut subtask = new_subtask(
                    task,
                    index,
                    format!("{} - {}", task.title, name),
                    format!("{}\n\nConcern: {}", description, task.description),
                );
                subtask.effort.estimated_hours = if parent_hours > 0.0 {
                    parent_hours * weight / total_weight
                } else {
                    *weight
                };
                subtask.effort.complexity = *level;
                subtask.dependencies = if index == 0 {
                    task.dependencies.clone()
                } else {
                    vec![core_id.clone()]
                };
                subtask
            })
            .collect()
    }

    fn time_boxed_shards(&self, task: &Task) -> Vec<Task> {
        let max_hours = if self.config.max_chunk_hours > 0.0 {
            self.config.max_chunk_hours
        } else {
            ShardingConfig::default().max_chunk_hours
        };
        let total = task.effort.estimated_hours;
        let wanted = (total / max_hours).ceil() as usize;
        let count = wanted.clamp(1, MAX_TIME_BOXES);
        let max_hours = if wanted > MAX_TIME_BOXES {
            debug!(
                "Task {} needs {} time boxes, capping at {}",
                task.id, wanted, MAX_TIME_BOXES
            );
            total / count as f64
        } else {
            max_hours
        };

        (0..count)
            .map(|index| {
                let remaining = total - index as f64 * max_hours;
                let focus = CHUNK_FOCUS[index.min(CHUNK_FOCUS.len() - 1)];

                let mut subtask = new_subtask(
                    task,
                    index,
                    format!("{} - Part {}/{}", task.title, index + 1, count),
                    format!(
                        "{}\n\nPart {}: focus on {}",
                        task.description,
                        index + 1,
                        focus
                    ),
                );
                subtask.effort.estimated_hours = max_hours.min(remaining).max(0.0);
                subtask.dependencies = chained_dependencies(task, index);
                subtask
            })
            .collect()
    }
}

pub fn shard_id(parent_id: &str, index: usize) -> TaskId {
    format!("{}_shard_{}", parent_id, index)
}

fn new_subtask(parent: &Task, index: usize, title: String, description: String) -> Task {
    let now = Utc::now();
    Task {
        id: shard_id(&parent.id, index),
        title,
        description,
        task_type: parent.task_type,
        priority: parent.priority,
        status: TaskStatus::Backlog,
        dependencies: Vec::new(),
        effort: parent.effort,
        artifacts: Vec::new(),
        acceptance_criteria: Vec::new(),
        user_story: None,
        parent_id: Some(parent.id.clone()),
        created_at: now,
        updated_at: now,
    }
}

/// First sub-task inherits the parent's dependencies, the rest chain
fn chained_dependencies(parent: &Task, index: usize) -> Vec<TaskId> {
    if index == 0 {
        parent.dependencies.clone()
    } else {
        vec![shard_id(&parent.id, index - 1)]
    }
}

fn sentences(text: &str) -> Vec<String> {
    text.split(['.', '!', '?', ';', '\n'])
        .map(str::trim)
        .filter(|s| s.split_whitespace().count() >= 3)
        .map(str::to_string)
        .collect()
}

fn list_items(text: &str) -> Vec<String> {
    LIST_ITEM_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Up to six words, without trailing punctuation
fn short_name(text: &str) -> String {
    let name = text
        .split_whitespace()
        .take(6)
        .collect::<Vec<_>>()
        .join(" ");
    let name = name.trim_end_matches([',', '.', ':', ';']);
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn extract_features(description: &str) -> Vec<FeatureUnit> {
    let mut items = list_items(description);
    if items.is_empty() {
        items = sentences(description);
    }
    if items.is_empty() {
        return vec![
            FeatureUnit {
                name: "Core functionality".to_string(),
                text: description.to_string(),
                builds_on_previous: false,
            },
            FeatureUnit {
                name: "Integration and polish".to_string(),
                text: "Integrate the core functionality and finish remaining details".to_string(),
                builds_on_previous: true,
            },
        ];
    }

    items
        .into_iter()
        .map(|text| FeatureUnit {
            name: short_name(&text),
            builds_on_previous: PREREQUISITE_RE.is_match(&text),
            text,
        })
        .collect()
}

fn extract_user_stories(task: &Task) -> Vec<UserStory> {
    let explicit: Vec<UserStory> = USER_STORY_RE
        .captures_iter(&task.description)
        .map(|caps| UserStory {
            persona: caps["persona"].trim().to_string(),
            want: caps["want"].trim().to_string(),
            benefit: caps["benefit"].trim().to_string(),
        })
        .collect();
    if !explicit.is_empty() {
        return explicit;
    }

    let mut wants = list_items(&task.description);
    if wants.is_empty() {
        wants = sentences(&task.description);
    }
    if wants.is_empty() {
        wants.push(task.title.to_lowercase());
    }

    wants
        .into_iter()
        .map(|want| UserStory {
            persona: DEFAULT_PERSONA.to_string(),
            want,
            benefit: DEFAULT_BENEFIT.to_string(),
        })
        .collect()
}
