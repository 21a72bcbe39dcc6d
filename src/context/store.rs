use crate::context::compression;
use crate::context::graph::DependencyGraph;
use crate::context::types::*;
use crate::task::{Complexity, RiskLevel, Task, TaskPriority};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};

const PROJECT_IMPORTANCE: f64 = 1.0;
const STORY_IMPORTANCE: f64 = 0.8;
const WORKER_IMPORTANCE: f64 = 0.6;
const MAX_COMMON_ERRORS: usize = 5;

/// Dependency-aware, importance-weighted cache of context entries.
///
/// All graph mutation goes through one mutex, so concurrent stores and
/// evictions never interleave.
#[derive(Debug)]
pub struct ContextStore {
    config: ContextConfig,
    graph: Arc<Mutex<DependencyGraph<ContextEntry>>>,
    worker_sequence: AtomicU64,
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new(ContextConfig::default())
    }
}

impl ContextStore {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            config,
            graph: Arc::new(Mutex::new(DependencyGraph::new())),
            worker_sequence: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Insert or overwrite an entry, then evict if the store is over capacity.
    pub async fn store(
        &self,
        id: &str,
        category: ContextCategory,
        payload: Value,
        dependencies: Vec<String>,
        importance: f64,
    ) -> ContextEntry {
        let outcome = compression::compress(payload, &self.config);
        if outcome.applied {
            debug!(
                "Compressed context {} from {} to {} bytes",
                id, outcome.original_size, outcome.compressed_size
            );
        }

        let now = Utc::now();
        let mut graph = self.graph.lock().await;

        let (created_at, access_count, access_pattern) = match graph.get(id) {
            Some(existing) => (
                existing.created_at,
                existing.access_count,
                existing.access_pattern.clone(),
            ),
            None => (now, 0, VecDeque::new()),
        };

        let entry = ContextEntry {
            id: id.to_string(),
            category,
            compression_level: outcome.compression_level(),
            original_size: outcome.original_size,
            payload: outcome.payload,
            importance: importance.clamp(0.0, 1.0),
            created_at,
            last_accessed: now,
            access_count,
            access_pattern,
        };

        graph.add_node(id, entry.clone(), dependencies);
        debug!("Stored context {} ({:?})", id, category);

        self.evict_locked(&mut graph, now);
        entry
    }

    /// Payload of `id`, with dependency payloads nested under `_dependencies`
    /// up to `depth` levels.
    ///
    /// Depth 0 returns the stored payload as-is. Only the requested entry's
    /// access statistics are touched.
    pub async fn retrieve(&self, id: &str, depth: usize) -> Option<Value> {
        let now = Utc::now();
        let mut graph = self.graph.lock().await;

        let history_len = self.config.access_history_len;
        let entry = graph.get_mut(id)?;
        entry.last_accessed = now;
        entry.access_count += 1;
        entry.access_pattern.push_back(now);
        while entry.access_pattern.len() > history_len {
            entry.access_pattern.pop_front();
        }

        Some(self.expand(&graph, id, depth))
    }

    fn expand(&self, graph: &DependencyGraph<ContextEntry>, id: &str, depth: usize) -> Value {
        let Some(node) = graph.node(id) else {
            return Value::Null;
        };
        let entry = &node.weight;
        if depth == 0 {
            return entry.payload.clone();
        }

        let mut object = match &entry.payload {
            Value::Object(map) => map.clone(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other.clone());
                map
            }
        };
        object.insert(
            "_meta".to_string(),
            json!({
                "id": entry.id,
                "category": entry.category,
                "importance": entry.importance,
                "access_count": entry.access_count,
                "compression_level": entry.compression_level,
            }),
        );

        let mut dependencies = Map::new();
        for dep in node
            .dependencies()
            .iter()
            .filter(|dep| graph.contains(dep))
            .take(self.config.max_dependencies_per_level)
        {
            dependencies.insert(dep.clone(), self.expand(graph, dep, depth - 1));
        }
        if !dependencies.is_empty() {
            object.insert("_dependencies".to_string(), Value::Object(dependencies));
        }

        Value::Object(object)
    }

    /// Entry snapshot without touching access statistics
    pub async fn get(&self, id: &str) -> Option<ContextEntry> {
        self.graph.lock().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.graph.lock().await.contains(id)
    }

    pub async fn len(&self) -> usize {
        self.graph.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.graph.lock().await.is_empty()
    }

    pub async fn dependencies_of(&self, id: &str) -> Vec<String> {
        self.graph.lock().await.dependencies_of(id)
    }

    pub async fn dependents_of(&self, id: &str) -> Vec<String> {
        self.graph.lock().await.dependents_of(id)
    }

    pub async fn remove(&self, id: &str) -> Option<ContextEntry> {
        self.graph.lock().await.remove_node(id)
    }

    /// Evict the lowest-ranked entries if the store is over capacity.
    /// Returns the evicted ids.
    pub async fn evict_if_over_capacity(&self) -> Vec<String> {
        let mut graph = self.graph.lock().await;
        self.evict_locked(&mut graph, Utc::now())
    }

    fn evict_locked(
        &self,
        graph: &mut DependencyGraph<ContextEntry>,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        if graph.len() <= self.config.capacity {
            return Vec::new();
        }

        let mut ranked: Vec<(String, f64, DateTime<Utc>)> = graph
            .iter()
            .map(|(id, node)| {
                let entry = &node.weight;
                let rank = entry.importance + entry.age_days(now) * self.config.recency_weight;
                (id.clone(), rank, entry.created_at)
            })
            .collect();
        ranked.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.2.cmp(&b.2))
        });

        let count = ((graph.len() as f64 * 0.1).ceil() as usize).max(1);
        let evicted: Vec<String> = ranked.into_iter().take(count).map(|(id, ..)| id).collect();
        for id in &evicted {
            graph.remove_node(id);
        }

        info!(
            "Evicted {} context entries ({} remaining)",
            evicted.len(),
            graph.len()
        );
        evicted
    }

    /// Filter entries and order them by importance plus a recency bonus
    pub async fn search(&self, criteria: &SearchCriteria) -> Vec<ContextMatch> {
        let now = Utc::now();
        let graph = self.graph.lock().await;
        let keywords: Vec<String> = criteria.keywords.iter().map(|k| k.to_lowercase()).collect();

        let mut matches: Vec<ContextMatch> = graph
            .iter()
            .filter(|(_, node)| {
                let entry = &node.weight;
                if criteria.category.is_some_and(|c| c != entry.category) {
                    return false;
                }
                if criteria.accessed_after.is_some_and(|t| entry.last_accessed < t)
                    || criteria.accessed_before.is_some_and(|t| entry.last_accessed > t)
                {
                    return false;
                }
                if criteria.min_importance.is_some_and(|m| entry.importance < m)
                    || criteria.max_importance.is_some_and(|m| entry.importance > m)
                {
                    return false;
                }
                if keywords.is_empty() {
                    return true;
                }
                let text = entry.payload.to_string().to_lowercase();
                keywords.iter().any(|k| text.contains(k.as_str()))
            })
            .map(|(_, node)| {
                let entry = node.weight.clone();
                let score = entry.importance + 1.0 / (1.0 + entry.age_days(now));
                ContextMatch {
                    dependencies: node.dependencies().to_vec(),
                    entry,
                    score,
                }
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entry.id.cmp(&b.entry.id))
        });
        if let Some(limit) = criteria.limit {
            matches.truncate(limit);
        }
        matches
    }

    pub async fn store_project_context(&self, project_id: &str, payload: Value) -> String {
        let id = format!("project_{}", project_id);
        self.store(
            &id,
            ContextCategory::Project,
            payload,
            Vec::new(),
            PROJECT_IMPORTANCE,
        )
        .await;
        id
    }

    /// Store a task under `task_{id}`, linked to its project and to the
    /// contexts of the tasks it depends on
    pub async fn store_task_context(&self, task: &Task, project_id: Option<&str>) -> String {
        let id = format!("task_{}", task.id);
        let mut dependencies: Vec<String> = project_id
            .map(|p| format!("project_{}", p))
            .into_iter()
            .collect();
        dependencies.extend(task.dependencies.iter().map(|d| format!("task_{}", d)));

        let payload = json!({
            "id": task.id,
            "title": task.title,
            "description": task.description,
            "type": task.task_type,
            "priority": task.priority,
            "status": task.status,
            "effort": task.effort,
            "acceptance_criteria": task.acceptance_criteria,
            "parent_id": task.parent_id,
        });

        self.store(
            &id,
            ContextCategory::Task,
            payload,
            dependencies,
            task_importance(task),
        )
        .await;
        id
    }

    pub async fn store_story_context(
        &self,
        story_id: &str,
        payload: Value,
        dependencies: Vec<String>,
    ) -> String {
        let id = format!("story_{}", story_id);
        self.store(
            &id,
            ContextCategory::Story,
            payload,
            dependencies,
            STORY_IMPORTANCE,
        )
        .await;
        id
    }

    /// Record a worker execution together with continuity data gathered from
    /// that worker's earlier executions
    pub async fn store_worker_context(&self, execution: &WorkerExecutionSummary) -> String {
        let prefix = format!("worker_{}_", execution.worker_id);
        let previous: Vec<WorkerExecutionSummary> = {
            let graph = self.graph.lock().await;
            graph
                .iter()
                .filter(|(id, node)| {
                    node.weight.category == ContextCategory::Worker && id.starts_with(&prefix)
                })
                .filter_map(|(_, node)| {
                    serde_json::from_value(node.weight.payload.get("execution")?.clone()).ok()
                })
                .collect()
        };

        let previous_count = previous.len();
        let successes = previous.iter().filter(|e| e.success).count();
        let success_rate = if previous_count > 0 {
            successes as f64 / previous_count as f64 * 100.0
        } else {
            100.0
        };
        let average_execution_ms = if previous_count > 0 {
            previous.iter().map(|e| e.duration_ms).sum::<u64>() as f64 / previous_count as f64
        } else {
            0.0
        };
        let mut seen = HashSet::new();
        let common_errors: Vec<String> = previous
            .iter()
            .filter_map(|e| e.error.clone())
            .filter(|e| seen.insert(e.clone()))
            .take(MAX_COMMON_ERRORS)
            .collect();

        let sequence = self.worker_sequence.fetch_add(1, Ordering::SeqCst);
        let id = format!("{}{}", prefix, sequence);
        let payload = json!({
            "execution": execution,
            "continuity": {
                "previous_executions": previous_count,
                "success_rate": success_rate,
                "average_execution_ms": average_execution_ms,
                "common_errors": common_errors,
            },
        });

        self.store(
            &id,
            ContextCategory::Worker,
            payload,
            vec![format!("task_{}", execution.task_id)],
            WORKER_IMPORTANCE,
        )
        .await;
        id
    }

    pub async fn stats(&self) -> ContextStats {
        let graph = self.graph.lock().await;
        let total_entries = graph.len();

        let mut entries_per_category = HashMap::new();
        let mut compression_total = 0.0;
        for (_, node) in graph.iter() {
            *entries_per_category.entry(node.weight.category).or_insert(0) += 1;
            compression_total += node.weight.compression_level;
        }
        let average_compression_ratio = if total_entries > 0 {
            compression_total / total_entries as f64
        } else {
            0.0
        };
        let cache_utilization = if self.config.capacity > 0 {
            total_entries as f64 / self.config.capacity as f64 * 100.0
        } else {
            0.0
        };

        ContextStats {
            total_entries,
            total_edges: graph.edge_count(),
            capacity: self.config.capacity,
            cache_utilization,
            average_compression_ratio,
            context_preservation: (100.0 - average_compression_ratio * 100.0).max(0.0),
            entries_per_category,
        }
    }

    /// JSON snapshot of every entry with its edges
    pub async fn export(&self) -> Value {
        let graph = self.graph.lock().await;
        let mut entries: Vec<Value> = graph
            .iter()
            .map(|(id, node)| {
                json!({
                    "id": id,
                    "entry": node.weight,
                    "dependencies": node.dependencies(),
                    "dependents": node.dependents().collect::<Vec<_>>(),
                })
            })
            .collect();
        entries.sort_by(|a, b| a["id"].as_str().cmp(&b["id"].as_str()));

        json!({
            "exported_at": Utc::now(),
            "total_entries": graph.len(),
            "entries": entries,
        })
    }

    pub async fn clear(&self) {
        let mut graph = self.graph.lock().await;
        let removed = graph.len();
        graph.clear();
        info!("Cleared {} context entries", removed);
    }

    pub async fn check_consistency(&self) -> anyhow::Result<()> {
        self.graph.lock().await.check_consistency()
    }
}

/// Importance of a task context from its priority and effort
pub fn task_importance(task: &Task) -> f64 {
    let mut importance: f64 = match task.priority {
        TaskPriority::Critical => 1.0,
        TaskPriority::High => 0.8,
        TaskPriority::Medium => 0.5,
        TaskPriority::Low => 0.3,
    };
    if task.effort.complexity == Complexity::Complex {
        importance += 0.2;
    }
    if task.effort.risk_level == RiskLevel::High {
        importance += 0.1;
    }
    if !task.dependencies.is_empty() {
        importance += 0.1;
    }
    importance.min(1.0)
}
