use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Pricing, baselines and recommendation thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CostConfig {
    pub token_cost_per_thousand: f64,
    pub hourly_cost: f64,
    /// A single record saving more than this emits a significant-savings event
    pub alert_threshold: f64,
    pub default_baseline_hours: f64,
    pub utilization_window_days: i64,
    pub savings_window_days: i64,
    pub savings_floor: f64,
    pub reduction_target: f64,
    pub parallel_target: f64,
    /// Manual-effort estimate per operation label, in hours
    pub baseline_hours: BTreeMap<String, f64>,
}

impl Default for CostConfig {
    fn default() -> Self {
        let baseline_hours = [
            ("planning", 4.0),
            ("execution", 8.0),
            ("review", 2.0),
            ("build", 1.0),
        ]
        .into_iter()
        .map(|(op, hours)| (op.to_string(), hours))
        .collect();

        Self {
            token_cost_per_thousand: 0.02,
            hourly_cost: 75.0,
            alert_threshold: 100.0,
            default_baseline_hours: 2.0,
            utilization_window_days: 30,
            savings_window_days: 7,
            savings_floor: 50.0,
            reduction_target: 60.0,
            parallel_target: 40.0,
            baseline_hours,
        }
    }
}

impl CostConfig {
    pub fn baseline_ms(&self, operation: &str) -> f64 {
        self.baseline_hours
            .get(operation)
            .copied()
            .unwrap_or(self.default_baseline_hours)
            * MILLIS_PER_HOUR
    }
}

/// One recorded unit of work
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostRecord {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub duration_ms: u64,
    pub raw_usage: u64,
    pub optimized_usage: u64,
    pub workers_used: Vec<String>,
    pub usage_saved: f64,
    pub time_saved_hours: f64,
    /// Usage saving plus time saving at the hourly rate
    pub cost_saved: f64,
}

impl CostRecord {
    pub fn reduction_percentage(&self) -> f64 {
        if self.raw_usage == 0 {
            return 0.0;
        }
        (self.raw_usage as f64 - self.optimized_usage as f64) / self.raw_usage as f64 * 100.0
    }
}

/// Aggregate for one "YYYY-MM" month
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MonthlyStats {
    pub month: String,
    pub total_usage: u64,
    pub optimized_usage: u64,
    pub cost_saved: f64,
    pub reduction_percentage: f64,
    pub operation_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UsageStats {
    pub total_usage: u64,
    pub optimized_usage: u64,
    pub reduction_percentage: f64,
    pub cost_saved: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TimeEfficiencyStats {
    pub total_hours: f64,
    pub automated_hours: f64,
    pub manual_hours: f64,
    pub efficiency_percentage: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceUtilizationStats {
    /// Share of the busiest worker's usage, 0 to 100
    pub worker_utilization: BTreeMap<String, f64>,
    /// Percent of records that used more than one worker
    pub parallel_percentage: f64,
    pub average_workers_per_operation: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum RecommendationKind {
    TokenOptimization,
    ResourceAllocation,
    ProcessImprovement,
}

/// Ordered low to high
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Level {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub description: String,
    pub impact: Level,
    pub effort: Level,
    pub estimated_savings: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostReport {
    pub usage: UsageStats,
    pub time: TimeEfficiencyStats,
    pub utilization: ResourceUtilizationStats,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CurrentStats {
    pub total_operations: usize,
    pub total_savings: f64,
    pub average_reduction: f64,
    pub last_operation: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostExport {
    pub records: Vec<CostRecord>,
    pub monthly: BTreeMap<String, MonthlyStats>,
    pub summary: CurrentStats,
    pub exported_at: DateTime<Utc>,
}
