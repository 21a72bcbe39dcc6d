//! Strategy selection, workflow layout, and synthesis of collaborative results.

use crate::error::{OrchestratorError, Result};
use crate::task::{Complexity, Task, TaskType};
use crate::worker::types::*;
use std::collections::HashMap;
use std::time::Duration;

/// Pick how `workers` cooperate on `task`. First matching rule wins.
///
/// A complex multi-worker task needs an architect or coordinator to lead;
/// without one the assignment fails with `RoleUnavailable`.
pub fn choose_strategy(task: &Task, workers: &[Worker]) -> Result<CoordinationStrategy> {
    if workers.len() == 1 {
        return Ok(CoordinationStrategy::Sequential);
    }

    if matches!(
        task.task_type,
        TaskType::RequirementsAnalysis | TaskType::ArchitectureDesign
    ) {
        return Ok(CoordinationStrategy::Collaborative);
    }

    if task.effort.complexity == Complexity::Complex {
        let leader = workers
            .iter()
            .find(|w| w.role.can_lead())
            .ok_or_else(|| OrchestratorError::role_unavailable(&task.id, "architect or coordinator"))?;
        return Ok(CoordinationStrategy::Hierarchical {
            leader: leader.id.clone(),
        });
    }

    Ok(CoordinationStrategy::Parallel)
}

/// Highest quality wins; ties keep assignment order
pub fn pick_synthesizer(workers: &[Worker]) -> Option<&Worker> {
    workers.iter().fold(None, |best: Option<&Worker>, worker| match best {
        Some(current)
            if current.performance.quality_score >= worker.performance.quality_score =>
        {
            Some(current)
        }
        _ => Some(worker),
    })
}

pub fn build_steps(
    strategy: &CoordinationStrategy,
    workers: &[Worker],
    timeout: Duration,
) -> Vec<WorkflowStep> {
    let step = |worker_id: &str, action: StepAction, depends_on: Vec<WorkerId>| WorkflowStep {
        worker_id: worker_id.to_string(),
        action,
        depends_on,
        timeout,
    };

    match strategy {
        CoordinationStrategy::Parallel => workers
            .iter()
            .map(|w| step(&w.id, StepAction::Execute, Vec::new()))
            .collect(),
        CoordinationStrategy::Sequential => workers
            .iter()
            .enumerate()
            .map(|(index, w)| {
                let depends_on = if index == 0 {
                    Vec::new()
                } else {
                    vec![workers[index - 1].id.clone()]
                };
                step(&w.id, StepAction::Execute, depends_on)
            })
            .collect(),
        CoordinationStrategy::Hierarchical { leader } => workers
            .iter()
            .map(|w| {
                if &w.id == leader {
                    step(&w.id, StepAction::Coordinate, Vec::new())
                } else {
                    step(&w.id, StepAction::Execute, vec![leader.clone()])
                }
            })
            .collect(),
        CoordinationStrategy::Collaborative => {
            let mut steps: Vec<WorkflowStep> = workers
                .iter()
                .map(|w| step(&w.id, StepAction::Analyze, Vec::new()))
                .collect();
            if let Some(synthesizer) = pick_synthesizer(workers) {
                let everyone = workers.iter().map(|w| w.id.clone()).collect();
                steps.push(step(&synthesizer.id, StepAction::Synthesize, everyone));
            }
            steps
        }
    }
}

/// Split analysis findings into consensus points (raised by a strict
/// majority of analysts) and resolutions for the rest.
///
/// A minority finding is decided by the highest-quality worker that raised
/// it; `quality` maps worker id to quality score.
pub fn reconcile_findings(
    analyses: &[WorkerOutput],
    quality: &HashMap<WorkerId, f64>,
) -> (Vec<String>, Vec<ConflictResolution>) {
    let mut order: Vec<String> = Vec::new();
    let mut raisers: HashMap<String, Vec<WorkerId>> = HashMap::new();

    for analysis in analyses {
        for finding in &analysis.output.findings {
            let entry = raisers.entry(finding.clone()).or_insert_with(|| {
                order.push(finding.clone());
                Vec::new()
            });
            if !entry.contains(&analysis.worker_id) {
                entry.push(analysis.worker_id.clone());
            }
        }
    }

    let total = analyses.len();
    let mut consensus = Vec::new();
    let mut conflicts = Vec::new();

    for finding in order {
        let Some(raised_by) = raisers.remove(&finding) else {
            continue;
        };
        if raised_by.len() * 2 > total {
            consensus.push(finding);
            continue;
        }

        let score = |id: &WorkerId| quality.get(id).copied().unwrap_or(0.0);
        let decided_by = raised_by
            .iter()
            .fold(None, |best: Option<&WorkerId>, id| match best {
                Some(current) if score(current) >= score(id) => Some(current),
                _ => Some(id),
            })
            .cloned()
            .unwrap_or_default();

        conflicts.push(ConflictResolution {
            resolution: format!("Adopted on the judgement of {}", decided_by),
            finding,
            raised_by,
            decided_by,
        });
    }

    (consensus, conflicts)
}
