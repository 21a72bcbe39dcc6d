use crate::cost::types::*;
use crate::events::{EventDispatcher, OrchestratorEvent};
use chrono::{DateTime, Duration, Utc};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Usage and time accounting for orchestrated work
#[derive(Debug)]
pub struct CostTracker {
    config: CostConfig,
    data: Arc<Mutex<CostData>>,
    events: Arc<EventDispatcher>,
}

#[derive(Debug, Default)]
struct CostData {
    records: Vec<CostRecord>,
    monthly: BTreeMap<String, MonthlyStats>, // "YYYY-MM" -> aggregate
}

impl CostTracker {
    pub fn new(config: CostConfig, events: Arc<EventDispatcher>) -> Self {
        Self {
            config,
            data: Arc::new(Mutex::new(CostData::default())),
            events,
        }
    }

    pub fn config(&self) -> &CostConfig {
        &self.config
    }

    pub async fn record(
        &self,
        operation: &str,
        duration_ms: u64,
        raw_usage: u64,
        optimized_usage: u64,
        workers_used: &[String],
    ) -> CostRecord {
        self.record_at(
            Utc::now(),
            operation,
            duration_ms,
            raw_usage,
            optimized_usage,
            workers_used,
        )
        .await
    }

    /// Same as [`CostTracker::record`] with an explicit timestamp
    pub async fn record_at(
        &self,
        timestamp: DateTime<Utc>,
        operation: &str,
        duration_ms: u64,
        raw_usage: u64,
        optimized_usage: u64,
        workers_used: &[String],
    ) -> CostRecord {
        let usage_saved = self.usage_cost(raw_usage.saturating_sub(optimized_usage));
        let time_saved_hours =
            (self.config.baseline_ms(operation) - duration_ms as f64).max(0.0) / MILLIS_PER_HOUR;
        let record = CostRecord {
            timestamp,
            operation: operation.to_string(),
            duration_ms,
            raw_usage,
            optimized_usage,
            workers_used: workers_used.to_vec(),
            usage_saved,
            time_saved_hours,
            cost_saved: usage_saved + time_saved_hours * self.config.hourly_cost,
        };

        {
            let mut data = self.data.lock().await;
            let month = timestamp.format("%Y-%m").to_string();
            let stats = data
                .monthly
                .entry(month.clone())
                .or_insert_with(|| MonthlyStats {
                    month,
                    ..Default::default()
                });
            stats.total_usage += raw_usage;
            stats.optimized_usage += optimized_usage;
            stats.cost_saved += record.cost_saved;
            stats.operation_count += 1;
            stats.reduction_percentage = reduction(stats.total_usage, stats.optimized_usage);

            data.records.push(record.clone());
        }

        debug!(
            "Recorded {} ({}ms, {} -> {} usage): ${:.2} saved",
            operation, duration_ms, raw_usage, optimized_usage, record.cost_saved
        );

        if record.cost_saved > self.config.alert_threshold {
            info!(
                "Significant savings on {}: ${:.2}",
                operation, record.cost_saved
            );
            self.events.emit(OrchestratorEvent::SignificantSavings {
                operation: operation.to_string(),
                saved: record.cost_saved,
            });
        }

        record
    }

    pub async fn report(&self) -> CostReport {
        let data = self.data.lock().await;
        let now = Utc::now();

        let utilization_cutoff = now - Duration::days(self.config.utilization_window_days);
        let recent: Vec<&CostRecord> = data
            .records
            .iter()
            .filter(|r| r.timestamp >= utilization_cutoff)
            .collect();
        let utilization = self.utilization(&recent);

        let savings_cutoff = now - Duration::days(self.config.savings_window_days);
        let recent_savings: f64 = data
            .records
            .iter()
            .filter(|r| r.timestamp >= savings_cutoff)
            .map(|r| r.cost_saved)
            .sum();

        let recommendations = self.recommendations(
            average_reduction(&data.records),
            utilization.parallel_percentage,
            recent_savings,
        );

        CostReport {
            usage: self.usage_stats(&data.records),
            time: time_stats(&data.records),
            utilization,
            recommendations,
        }
    }

    fn usage_stats(&self, records: &[CostRecord]) -> UsageStats {
        let total_usage: u64 = records.iter().map(|r| r.raw_usage).sum();
        let optimized_usage: u64 = records.iter().map(|r| r.optimized_usage).sum();
        UsageStats {
            total_usage,
            optimized_usage,
            reduction_percentage: round2(reduction(total_usage, optimized_usage)),
            cost_saved: round2(self.usage_cost(total_usage.saturating_sub(optimized_usage))),
        }
    }

    fn utilization(&self, records: &[&CostRecord]) -> ResourceUtilizationStats {
        let mut counts: BTreeMap<String, f64> = BTreeMap::new();
        for record in records {
            for worker in &record.workers_used {
                *counts.entry(worker.clone()).or_default() += 1.0;
            }
        }

        let busiest = counts.values().copied().fold(0.0, f64::max);
        if busiest > 0.0 {
            for value in counts.values_mut() {
                *value = round2(*value / busiest * 100.0);
            }
        }

        let (parallel_percentage, average_workers_per_operation) = if records.is_empty() {
            (0.0, 0.0)
        } else {
            let count = records.len() as f64;
            let parallel = records.iter().filter(|r| r.workers_used.len() > 1).count() as f64;
            let workers: usize = records.iter().map(|r| r.workers_used.len()).sum();
            (
                round2(parallel / count * 100.0),
                round2(workers as f64 / count),
            )
        };

        ResourceUtilizationStats {
            worker_utilization: counts,
            parallel_percentage,
            average_workers_per_operation,
        }
    }

    /// Highest impact first, then largest estimated savings
    fn recommendations(
        &self,
        average_reduction: f64,
        parallel_percentage: f64,
        recent_savings: f64,
    ) -> Vec<Recommendation> {
        let mut recommendations = Vec::new();

        if average_reduction < self.config.reduction_target {
            recommendations.push(Recommendation {
                kind: RecommendationKind::TokenOptimization,
                description:
                    "Increase usage optimization aggressiveness to reach higher reduction rates"
                        .to_string(),
                impact: Level::High,
                effort: Level::Low,
                estimated_savings: 150.0,
            });
        }

        if parallel_percentage < self.config.parallel_target {
            recommendations.push(Recommendation {
                kind: RecommendationKind::ResourceAllocation,
                description: "Run more assignments with parallel worker coordination".to_string(),
                impact: Level::Medium,
                effort: Level::Medium,
                estimated_savings: 200.0,
            });
        }

        if recent_savings < self.config.savings_floor {
            recommendations.push(Recommendation {
                kind: RecommendationKind::ProcessImprovement,
                description: "Review workflow processes to reduce manual intervention".to_string(),
                impact: Level::High,
                effort: Level::High,
                estimated_savings: 300.0,
            });
        }

        recommendations.sort_by(|a, b| {
            Reverse(a.impact)
                .cmp(&Reverse(b.impact))
                .then(b.estimated_savings.total_cmp(&a.estimated_savings))
        });
        recommendations
    }

    /// Savings per month, keyed "YYYY-MM"
    pub async fn monthly_savings(&self) -> BTreeMap<String, f64> {
        let data = self.data.lock().await;
        data.monthly
            .iter()
            .map(|(month, stats)| (month.clone(), stats.cost_saved))
            .collect()
    }

    pub async fn monthly_stats(&self) -> BTreeMap<String, MonthlyStats> {
        self.data.lock().await.monthly.clone()
    }

    /// Percent of the operation baseline saved on average, floored at 0
    pub async fn time_efficiency_gains(&self) -> BTreeMap<String, f64> {
        let data = self.data.lock().await;
        let mut durations: HashMap<&str, Vec<u64>> = HashMap::new();
        for record in &data.records {
            durations
                .entry(record.operation.as_str())
                .or_default()
                .push(record.duration_ms);
        }

        durations
            .into_iter()
            .map(|(operation, samples)| {
                let average = samples.iter().sum::<u64>() as f64 / samples.len() as f64;
                let baseline = self.config.baseline_ms(operation);
                let gain = if baseline > 0.0 {
                    ((baseline - average) / baseline * 100.0).max(0.0)
                } else {
                    0.0
                };
                (operation.to_string(), round2(gain))
            })
            .collect()
    }

    /// Mean of the latest three monthly buckets, times twelve
    pub async fn projected_annual_savings(&self) -> f64 {
        let data = self.data.lock().await;
        let recent: Vec<f64> = data
            .monthly
            .values()
            .rev()
            .take(3)
            .map(|m| m.cost_saved)
            .collect();
        if recent.is_empty() {
            return 0.0;
        }
        round2(recent.iter().sum::<f64>() / recent.len() as f64 * 12.0)
    }

    pub async fn current_stats(&self) -> CurrentStats {
        let data = self.data.lock().await;
        current_stats(&data.records)
    }

    pub async fn records(&self) -> Vec<CostRecord> {
        self.data.lock().await.records.clone()
    }

    pub async fn export(&self) -> CostExport {
        let data = self.data.lock().await;
        CostExport {
            records: data.records.clone(),
            monthly: data.monthly.clone(),
            summary: current_stats(&data.records),
            exported_at: Utc::now(),
        }
    }

    pub async fn clear_history(&self) {
        let mut data = self.data.lock().await;
        data.records.clear();
        data.monthly.clear();
        info!("Cost history cleared");
    }

    fn usage_cost(&self, saved_usage: u64) -> f64 {
        saved_usage as f64 / 1000.0 * self.config.token_cost_per_thousand
    }
}

fn current_stats(records: &[CostRecord]) -> CurrentStats {
    CurrentStats {
        total_operations: records.len(),
        total_savings: round2(records.iter().map(|r| r.cost_saved).sum()),
        average_reduction: round2(average_reduction(records)),
        last_operation: records.last().map(|r| r.timestamp),
    }
}

/// Multi-worker records count as automated in proportion to team size,
/// saturating at three workers
fn time_stats(records: &[CostRecord]) -> TimeEfficiencyStats {
    let total_ms: f64 = records.iter().map(|r| r.duration_ms as f64).sum();
    let automated_ms: f64 = records
        .iter()
        .map(|r| r.duration_ms as f64 * (r.workers_used.len() as f64 / 3.0).min(1.0))
        .sum();
    let efficiency_percentage = if total_ms > 0.0 {
        round2(automated_ms / total_ms * 100.0)
    } else {
        0.0
    };

    TimeEfficiencyStats {
        total_hours: round2(total_ms / MILLIS_PER_HOUR),
        automated_hours: round2(automated_ms / MILLIS_PER_HOUR),
        manual_hours: round2((total_ms - automated_ms) / MILLIS_PER_HOUR),
        efficiency_percentage,
    }
}

fn average_reduction(records: &[CostRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    records.iter().map(|r| r.reduction_percentage()).sum::<f64>() / records.len() as f64
}

fn reduction(total: u64, optimized: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (total as f64 - optimized as f64) / total as f64 * 100.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
