use crate::task::TaskArtifact;
use crate::worker::types::*;
use anyhow::{Result, bail};
use rand::Rng;
use std::time::Duration;

/// Opaque collaborator that performs one unit of work for a worker.
///
/// Implementations wrap model providers or tools; the pool wraps every call
/// in a timeout and a cancellation boundary.
#[async_trait::async_trait]
pub trait WorkerExecutor: Send + Sync {
    async fn execute(&self, worker: &Worker, request: &WorkRequest) -> Result<WorkOutput>;
}

/// Role-aware stand-in for real providers with configurable latency and
/// failure rate
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    min_latency: Duration,
    max_latency: Duration,
    failure_rate: f64,
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self {
            min_latency: Duration::from_millis(5),
            max_latency: Duration::from_millis(20),
            failure_rate: 0.0,
        }
    }
}

impl SimulatedExecutor {
    pub fn new(min_latency: Duration, max_latency: Duration) -> Self {
        Self {
            min_latency,
            max_latency: max_latency.max(min_latency),
            failure_rate: 0.0,
        }
    }

    /// No latency and no failures
    pub fn instant() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate.clamp(0.0, 1.0);
        self
    }

    fn sample(&self) -> (Duration, bool) {
        let mut rng = rand::rng();
        let min = self.min_latency.as_millis() as u64;
        let max = self.max_latency.as_millis() as u64;
        let latency = if max > min {
            rng.random_range(min..=max)
        } else {
            min
        };
        let fail = self.failure_rate > 0.0 && rng.random_bool(self.failure_rate);
        (Duration::from_millis(latency), fail)
    }
}

#[async_trait::async_trait]
impl WorkerExecutor for SimulatedExecutor {
    async fn execute(&self, worker: &Worker, request: &WorkRequest) -> Result<WorkOutput> {
        let (latency, fail) = self.sample();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if fail {
            bail!(
                "{} could not complete '{}'",
                worker.name,
                request.task.title
            );
        }

        let title = &request.task.title;
        let findings = match request.action {
            StepAction::Coordinate => request
                .collaborators
                .iter()
                .map(|c| format!("{} ({}): deliver {} work for '{}'", c.name, c.role, c.role, title))
                .collect(),
            StepAction::Synthesize => vec![format!(
                "Integrated recommendation for '{}' based on all analyses",
                title
            )],
            StepAction::Analyze | StepAction::Execute => {
                let mut findings = role_findings(worker.role, title);
                if request.action == StepAction::Analyze {
                    findings.push(format!("Scope of '{}' is well defined", title));
                }
                findings
            }
        };

        let content = format!(
            "{} ({}) completed {:?} for '{}': {}",
            worker.name,
            worker.role,
            request.action,
            title,
            request.instructions
        );
        let kind = match worker.role {
            WorkerRole::Developer => "code",
            WorkerRole::Designer | WorkerRole::Architect => "diagram",
            _ => "document",
        };
        let tokens_used = 400
            + 10 * request.task.word_count() as u64
            + 100 * findings.len() as u64;

        Ok(WorkOutput {
            artifacts: vec![TaskArtifact {
                name: format!("{} {} output", worker.role, title),
                kind: kind.to_string(),
                content: content.clone(),
            }],
            content,
            findings,
            tokens_used,
        })
    }
}

fn role_findings(role: WorkerRole, title: &str) -> Vec<String> {
    match role {
        WorkerRole::Analyst => vec![
            format!("Functional requirements captured for '{}'", title),
            "Stakeholders identified".to_string(),
            "Performance requirement: responses under 2s".to_string(),
        ],
        WorkerRole::ProductManager => vec![
            "Features prioritized by business value".to_string(),
            format!("Roadmap milestone defined for '{}'", title),
        ],
        WorkerRole::Architect => vec![
            "Layered architecture with clear service boundaries".to_string(),
            "Technology stack selected".to_string(),
            format!("Integration points defined for '{}'", title),
        ],
        WorkerRole::Coordinator => vec![
            format!("Stories prepared with full context for '{}'", title),
            "Acceptance criteria clarified".to_string(),
        ],
        WorkerRole::Developer => vec![
            format!("Implementation completed for '{}'", title),
            "Unit tests added".to_string(),
        ],
        WorkerRole::Tester => vec![
            format!("Test plan covers acceptance criteria of '{}'", title),
            "Regression suite updated".to_string(),
        ],
        WorkerRole::Ops => vec![
            "Deployment pipeline configured".to_string(),
            "Monitoring alerts defined".to_string(),
        ],
        WorkerRole::Reviewer => vec![
            "Code reviewed against standards".to_string(),
            "Security concerns checked".to_string(),
        ],
        WorkerRole::Designer => vec![
            format!("User flows designed for '{}'", title),
            "Accessibility reviewed".to_string(),
        ],
    }
}
