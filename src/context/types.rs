use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ContextCategory {
    Project,
    Task,
    Story,
    Worker,
    System,
}

/// A cached unit of background information
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ContextEntry {
    pub id: String,
    pub category: ContextCategory,
    pub payload: serde_json::Value,
    /// Retention and ranking weight in `[0, 1]`
    pub importance: f64,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    /// Most recent access times, oldest first
    pub access_pattern: VecDeque<DateTime<Utc>>,
    /// Share of the serialized payload removed by compression (0 = untouched)
    pub compression_level: f64,
    pub original_size: usize,
}

impl ContextEntry {
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        let millis = (now - self.last_accessed).num_milliseconds().max(0);
        millis as f64 / MILLIS_PER_DAY
    }
}

pub(crate) const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Tuning for the context store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub capacity: usize,
    /// Serialized payload size (bytes) above which compression kicks in
    pub compression_size_threshold: usize,
    /// Redundancy (1 - unique/total words) above which compression kicks in
    pub redundancy_threshold: f64,
    pub max_description_length: usize,
    pub array_compression_threshold: usize,
    pub array_keep: usize,
    /// Multiplier on entry age (days) in the eviction rank.
    ///
    /// Positive values protect older entries; negative values make them decay.
    pub recency_weight: f64,
    pub max_dependencies_per_level: usize,
    pub access_history_len: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            compression_size_threshold: 10_000,
            redundancy_threshold: 0.7,
            max_description_length: 500,
            array_compression_threshold: 20,
            array_keep: 10,
            recency_weight: 1.0,
            max_dependencies_per_level: 5,
            access_history_len: 100,
        }
    }
}

/// Filters for [`crate::context::ContextStore::search`]; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct SearchCriteria {
    pub category: Option<ContextCategory>,
    /// Case-insensitive; an entry matches if any keyword occurs in its payload
    pub keywords: Vec<String>,
    pub accessed_after: Option<DateTime<Utc>>,
    pub accessed_before: Option<DateTime<Utc>>,
    pub min_importance: Option<f64>,
    pub max_importance: Option<f64>,
    pub limit: Option<usize>,
}

impl SearchCriteria {
    pub fn category(category: ContextCategory) -> Self {
        Self {
            category: Some(category),
            ..Default::default()
        }
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.push(keyword.into());
        self
    }

    pub fn with_importance(mut self, min: f64, max: f64) -> Self {
        self.min_importance = Some(min);
        self.max_importance = Some(max);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextMatch {
    pub entry: ContextEntry,
    pub dependencies: Vec<String>,
    pub score: f64,
}

/// Outcome of one worker execution, folded into worker continuity context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerExecutionSummary {
    pub worker_id: String,
    pub task_id: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextStats {
    pub total_entries: usize,
    pub total_edges: usize,
    pub capacity: usize,
    pub cache_utilization: f64,
    pub average_compression_ratio: f64,
    pub context_preservation: f64,
    pub entries_per_category: HashMap<ContextCategory, usize>,
}
