//! Complexity scoring for tasks
//!
//! Pure functions: the same task always yields the same score, and nothing
//! here touches shared state.

use super::types::{Complexity, RiskLevel, Task, TaskPriority, TaskType};
use serde::Serialize;

const BASE_SCORE: f64 = 5.0;
const SCORE_SHARD_THRESHOLD: u32 = 7;
const HOURS_SHARD_THRESHOLD: f64 = 8.0;

/// Intermediate factors of a complexity score, kept for logging and tests
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComplexityBreakdown {
    pub base: f64,
    pub length_bonus: f64,
    pub dependency_bonus: f64,
    pub type_baseline: f64,
    pub priority_factor: f64,
    pub score: u32,
}

/// Per-type floor applied after the additive factors
pub fn type_baseline(task_type: TaskType) -> f64 {
    match task_type {
        TaskType::ArchitectureDesign => 8.0,
        TaskType::Development => 7.0,
        TaskType::RequirementsAnalysis => 6.0,
        TaskType::Deployment => 6.0,
        TaskType::Testing => 5.0,
        TaskType::StoryCreation => 4.0,
        TaskType::Review => 4.0,
        TaskType::Documentation => 3.0,
    }
}

pub fn priority_factor(priority: TaskPriority) -> f64 {
    match priority {
        TaskPriority::Critical => 1.3,
        TaskPriority::High => 1.1,
        TaskPriority::Medium => 1.0,
        TaskPriority::Low => 0.9,
    }
}

pub fn breakdown(task: &Task) -> ComplexityBreakdown {
    let words = task.word_count();
    let mut length_bonus = 0.0;
    if words > 100 {
        length_bonus += 2.0;
    }
    if words > 200 {
        length_bonus += 2.0;
    }

    let dependency_bonus = (task.dependencies.len() as f64 * 0.5).min(3.0);
    let baseline = type_baseline(task.task_type);
    let factor = priority_factor(task.priority);

    let additive = BASE_SCORE + length_bonus + dependency_bonus;
    let score = (additive.max(baseline) * factor).round() as u32;

    ComplexityBreakdown {
        base: BASE_SCORE,
        length_bonus,
        dependency_bonus,
        type_baseline: baseline,
        priority_factor: factor,
        score,
    }
}

/// Calculate complexity score for a task
pub fn score(task: &Task) -> u32 {
    breakdown(task).score
}

/// Whether a task is large, risky, or intricate enough to be sharded.
///
/// A task explicitly estimated as `simple` is never sharded on score alone;
/// effort and risk still apply.
pub fn should_shard(task: &Task) -> bool {
    let high_score =
        score(task) > SCORE_SHARD_THRESHOLD && task.effort.complexity != Complexity::Simple;

    high_score
        || task.effort.estimated_hours > HOURS_SHARD_THRESHOLD
        || task.effort.risk_level == RiskLevel::High
}
