use crate::error::{OrchestratorError, Result};
use crate::events::{EventDispatcher, OrchestratorEvent};
use crate::task::Task;
use crate::worker::coordination;
use crate::worker::executor::{SimulatedExecutor, WorkerExecutor};
use crate::worker::types::*;
use chrono::Utc;
use futures::future::try_join_all;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Registry of workers plus the coordinator that runs assignments on them.
///
/// Worker state (status, load, performance) lives behind one mutex. Each
/// worker also owns a single-permit semaphore: holding it is what "busy"
/// means, so a worker queued by several assignments runs them one at a time.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    workers: Arc<Mutex<Vec<Worker>>>,
    permits: Arc<HashMap<WorkerId, Arc<Semaphore>>>,
    assignments: Arc<Mutex<HashMap<String, Vec<WorkerId>>>>,
    executor: Arc<dyn WorkerExecutor>,
    events: Arc<EventDispatcher>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    pub fn new(
        config: WorkerPoolConfig,
        roster: Vec<WorkerDefinition>,
        executor: Arc<dyn WorkerExecutor>,
        events: Arc<EventDispatcher>,
    ) -> Self {
        let mut workers: Vec<Worker> = Vec::with_capacity(roster.len());
        let mut permits = HashMap::new();

        for definition in roster {
            if permits.contains_key(&definition.id) {
                warn!("Ignoring duplicate worker id {}", definition.id);
                continue;
            }
            permits.insert(definition.id.clone(), Arc::new(Semaphore::new(1)));
            workers.push(Worker::from_definition(definition, config.initial_quality));
        }

        info!("Worker pool initialized with {} workers", workers.len());

        Self {
            config,
            workers: Arc::new(Mutex::new(workers)),
            permits: Arc::new(permits),
            assignments: Arc::new(Mutex::new(HashMap::new())),
            executor,
            events,
            shutdown: CancellationToken::new(),
        }
    }

    /// Default roster backed by the simulated executor
    pub fn simulated(config: WorkerPoolConfig) -> Self {
        Self::new(
            config,
            default_roster(),
            Arc::new(SimulatedExecutor::default()),
            Arc::new(EventDispatcher::new()),
        )
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// For each role, the available worker with the best
    /// `quality - 10 * load`. Roles without a candidate are skipped.
    pub async fn select_for_roles(&self, roles: &[WorkerRole]) -> Vec<Worker> {
        let workers = self.workers.lock().await;
        let mut selected: Vec<Worker> = Vec::new();

        for role in roles {
            let mut best: Option<&Worker> = None;
            for candidate in workers.iter().filter(|w| {
                w.role == *role
                    && w.status.is_available()
                    && !selected.iter().any(|s| s.id == w.id)
            }) {
                match best {
                    Some(current) if current.selection_score() >= candidate.selection_score() => {}
                    _ => best = Some(candidate),
                }
            }

            match best {
                Some(worker) => {
                    debug!("Selected {} for role {}", worker.id, role);
                    selected.push(worker.clone());
                }
                None => warn!("No available worker for role {}", role),
            }
        }

        selected
    }

    /// Bind `workers` to `task`, choose the coordination strategy, and bump
    /// each worker's load.
    pub async fn assign(&self, task: &Task, workers: &[Worker]) -> Result<Assignment> {
        task.validate()?;
        if workers.is_empty() {
            return Err(OrchestratorError::validation(
                &task.id,
                "assignment needs at least one worker",
            ));
        }

        let mut registry = self.workers.lock().await;
        let mut seen = HashSet::new();
        let mut current: Vec<Worker> = Vec::with_capacity(workers.len());
        for requested in workers {
            if !seen.insert(requested.id.clone()) {
                continue;
            }
            let worker = registry
                .iter()
                .find(|w| w.id == requested.id)
                .ok_or_else(|| {
                    OrchestratorError::validation(&requested.id, "worker is not registered")
                })?;
            if worker.status == WorkerStatus::Offline {
                return Err(OrchestratorError::invalid_state(
                    &worker.id,
                    "worker is offline",
                ));
            }
            current.push(worker.clone());
        }

        let strategy = coordination::choose_strategy(task, &current)?;
        let steps = coordination::build_steps(&strategy, &current, self.config.step_timeout());
        let worker_ids: Vec<WorkerId> = current.iter().map(|w| w.id.clone()).collect();

        for worker in registry.iter_mut().filter(|w| worker_ids.contains(&w.id)) {
            worker.load += 1;
        }
        drop(registry);

        let assignment = Assignment {
            id: uuid::Uuid::new_v4().to_string(),
            task: task.clone(),
            worker_ids: worker_ids.clone(),
            strategy,
            steps,
            created_at: Utc::now(),
        };
        self.assignments
            .lock()
            .await
            .insert(assignment.id.clone(), worker_ids);

        info!(
            "Assigned {} workers to task {} ({:?})",
            assignment.worker_ids.len(),
            task.id,
            assignment.strategy.kind()
        );
        Ok(assignment)
    }

    /// Drop an assignment that will not be executed
    pub async fn release(&self, assignment: &Assignment) {
        if self
            .slots()
            .release(&assignment.id, &assignment.worker_ids, &mut Vec::new(), None)
            .await
        {
            debug!("Released assignment {}", assignment.id);
        }
    }

    fn slots(&self) -> WorkerSlots {
        WorkerSlots {
            workers: self.workers.clone(),
            assignments: self.assignments.clone(),
            permits: self.permits.clone(),
        }
    }

    pub async fn execute(&self, assignment: Assignment) -> Result<AssignmentResult> {
        self.execute_with_cancel(assignment, &CancellationToken::new())
            .await
    }

    /// Run an assignment under its strategy.
    ///
    /// Workers are busy while the strategy runs and return to active
    /// afterwards. Successes and failures (including timeouts) update each
    /// worker's rolling stats; cancellation leaves them untouched. Dropping
    /// the returned future releases the assignment's load and permits.
    pub async fn execute_with_cancel(
        &self,
        assignment: Assignment,
        cancel: &CancellationToken,
    ) -> Result<AssignmentResult> {
        let cancel = CombinedCancel {
            caller: cancel.clone(),
            pool: self.shutdown.clone(),
        };
        let mut guard = ExecutionGuard::new(self, &assignment);

        match self.acquire_permits(&assignment, &cancel).await {
            Ok(permits) => guard.held = permits,
            Err(e) => {
                guard.settle(None, &self.config).await;
                self.emit_outcome(&assignment, Err(&e));
                return Err(e);
            }
        }

        let started = Instant::now();
        let mut outcome = match self.mark_busy(&assignment).await {
            Ok(workers) => self.run_strategy(&assignment, &workers, &cancel).await,
            Err(e) => Err(e),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let record = match &mut outcome {
            Ok(result) => {
                result.duration_ms = elapsed_ms;
                Some((true, elapsed_ms))
            }
            Err(e) if e.is_cancelled() => None,
            Err(_) => Some((false, elapsed_ms)),
        };
        guard.settle(record, &self.config).await;

        self.emit_outcome(&assignment, outcome.as_ref());
        outcome
    }

    async fn acquire_permits(
        &self,
        assignment: &Assignment,
        cancel: &CombinedCancel,
    ) -> Result<Vec<OwnedSemaphorePermit>> {
        let mut ids = assignment.worker_ids.clone();
        ids.sort();

        let mut permits = Vec::with_capacity(ids.len());
        for id in ids {
            let semaphore = self.permits.get(&id).cloned().ok_or_else(|| {
                OrchestratorError::validation(&id, "worker is not registered")
            })?;
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(OrchestratorError::cancelled(&assignment.task.id));
                }
                permit = semaphore.acquire_owned() => permit,
            };
            permits.push(permit.map_err(|_| {
                OrchestratorError::cancelled(&assignment.task.id)
            })?);
        }
        Ok(permits)
    }

    /// Mark assigned workers busy and return their snapshots in assignment order
    async fn mark_busy(&self, assignment: &Assignment) -> Result<Vec<Worker>> {
        let mut registry = self.workers.lock().await;
        let mut snapshot = Vec::with_capacity(assignment.worker_ids.len());

        for id in &assignment.worker_ids {
            let worker = registry
                .iter_mut()
                .find(|w| &w.id == id)
                .ok_or_else(|| OrchestratorError::validation(id, "worker is not registered"))?;
            if worker.status == WorkerStatus::Offline {
                return Err(OrchestratorError::cancelled(&assignment.task.id));
            }
            worker.status = WorkerStatus::Busy;
            worker.last_active = Some(Utc::now());
            snapshot.push(worker.clone());
        }
        Ok(snapshot)
    }

    fn emit_outcome(
        &self,
        assignment: &Assignment,
        result: std::result::Result<&AssignmentResult, &OrchestratorError>,
    ) {
        let task_id = assignment.task.id.clone();
        let worker_ids = assignment.worker_ids.clone();
        let event = match result {
            Ok(result) => OrchestratorEvent::TaskCompleted {
                task_id,
                worker_ids,
                result: Box::new(result.clone()),
            },
            Err(e) if e.is_cancelled() => OrchestratorEvent::TaskCancelled {
                task_id,
                worker_ids,
            },
            Err(e) => {
                error!("Task {} failed: {}", task_id, e);
                OrchestratorEvent::TaskFailed {
                    task_id,
                    worker_ids,
                    error: e.to_string(),
                }
            }
        };
        self.events.emit(event);
    }

    async fn run_strategy(
        &self,
        assignment: &Assignment,
        workers: &[Worker],
        cancel: &CombinedCancel,
    ) -> Result<AssignmentResult> {
        info!(
            "Executing task {} with {:?} coordination",
            assignment.task.id,
            assignment.strategy.kind()
        );

        let mut result = AssignmentResult {
            assignment_id: assignment.id.clone(),
            task_id: assignment.task.id.clone(),
            strategy: assignment.strategy.kind(),
            worker_ids: assignment.worker_ids.clone(),
            outputs: Vec::new(),
            leader_plan: None,
            synthesis: None,
            artifacts: Vec::new(),
            summary: String::new(),
            duration_ms: 0,
        };
        let names = workers
            .iter()
            .map(|w| w.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        match &assignment.strategy {
            CoordinationStrategy::Parallel => {
                let steps = workers.iter().map(|worker| {
                    let request = self.request(assignment, worker, StepAction::Execute, None, json!({}));
                    self.run_step(assignment, worker, request, cancel)
                });
                result.outputs = try_join_all(steps).await?;
                result.summary = format!(
                    "Parallel effort by {} produced {} results",
                    names,
                    result.outputs.len()
                );
            }
            CoordinationStrategy::Sequential => {
                let mut previous: Vec<serde_json::Value> = Vec::new();
                for worker in workers {
                    let context = json!({ "previous_results": previous });
                    let request = self.request(assignment, worker, StepAction::Execute, None, context);
                    let output = self.run_step(assignment, worker, request, cancel).await?;
                    previous.push(json!({
                        "worker_id": output.worker_id,
                        "content": output.output.content,
                        "findings": output.output.findings,
                    }));
                    result.outputs.push(output);
                }
                result.summary = format!(
                    "Sequential effort by {} produced {} results",
                    names,
                    result.outputs.len()
                );
            }
            CoordinationStrategy::Hierarchical { leader } => {
                let leader_worker = workers.iter().find(|w| &w.id == leader).ok_or_else(|| {
                    OrchestratorError::role_unavailable(&assignment.task.id, "architect or coordinator")
                })?;
                let subordinates: Vec<&Worker> = workers.iter().filter(|w| &w.id != leader).collect();

                let instructions = format!(
                    "Coordinate the following workers: {}",
                    subordinates
                        .iter()
                        .map(|w| w.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                let mut request = self.request(
                    assignment,
                    leader_worker,
                    StepAction::Coordinate,
                    Some(instructions),
                    json!({}),
                );
                request.collaborators = subordinates
                    .iter()
                    .map(|w| Collaborator {
                        worker_id: w.id.clone(),
                        name: w.name.clone(),
                        role: w.role,
                    })
                    .collect();
                let plan = self.run_step(assignment, leader_worker, request, cancel).await?;

                let steps = subordinates.iter().enumerate().map(|(index, worker)| {
                    let delegation = plan
                        .output
                        .findings
                        .get(index)
                        .cloned()
                        .unwrap_or_else(|| format!("Execute {} responsibilities", worker.role));
                    let context = json!({
                        "leader": leader_worker.id,
                        "leader_plan": plan.output.content,
                    });
                    let request = self.request(assignment, worker, StepAction::Execute, Some(delegation), context);
                    self.run_step(assignment, worker, request, cancel)
                });
                result.outputs = try_join_all(steps).await?;
                result.summary = format!(
                    "{} coordinated {} team members",
                    leader_worker.name,
                    result.outputs.len()
                );
                result.leader_plan = Some(plan);
            }
            CoordinationStrategy::Collaborative => {
                let steps = workers.iter().map(|worker| {
                    let instructions = format!(
                        "Provide your expert analysis from a {} perspective",
                        worker.role
                    );
                    let request = self.request(assignment, worker, StepAction::Analyze, Some(instructions), json!({}));
                    self.run_step(assignment, worker, request, cancel)
                });
                result.outputs = try_join_all(steps).await?;

                let quality: HashMap<WorkerId, f64> = workers
                    .iter()
                    .map(|w| (w.id.clone(), w.performance.quality_score))
                    .collect();
                let (consensus_points, conflict_resolutions) =
                    coordination::reconcile_findings(&result.outputs, &quality);

                if let Some(synthesizer) = coordination::pick_synthesizer(workers) {
                    let analyses: Vec<serde_json::Value> = result
                        .outputs
                        .iter()
                        .map(|o| {
                            json!({
                                "worker_id": o.worker_id,
                                "role": o.role,
                                "findings": o.output.findings,
                            })
                        })
                        .collect();
                    let context = json!({
                        "analyses": analyses,
                        "consensus_points": consensus_points,
                    });
                    let request = self.request(
                        assignment,
                        synthesizer,
                        StepAction::Synthesize,
                        Some("Merge the analyses into one recommendation".to_string()),
                        context,
                    );
                    let output = self.run_step(assignment, synthesizer, request, cancel).await?;
                    result.synthesis = Some(Synthesis {
                        synthesizer: synthesizer.id.clone(),
                        consensus_points,
                        conflict_resolutions,
                        output: output.output,
                    });
                }
                result.summary = format!(
                    "Collaborative effort by {} produced {} integrated results",
                    names,
                    result.outputs.len() + usize::from(result.synthesis.is_some())
                );
            }
        }

        result.artifacts = result
            .leader_plan
            .iter()
            .chain(result.outputs.iter())
            .flat_map(|o| o.output.artifacts.iter().cloned())
            .chain(
                result
                    .synthesis
                    .iter()
                    .flat_map(|s| s.output.artifacts.iter().cloned()),
            )
            .collect();

        Ok(result)
    }

    fn request(
        &self,
        assignment: &Assignment,
        worker: &Worker,
        action: StepAction,
        instructions: Option<String>,
        context: serde_json::Value,
    ) -> WorkRequest {
        WorkRequest {
            assignment_id: assignment.id.clone(),
            task: assignment.task.clone(),
            action,
            instructions: instructions
                .unwrap_or_else(|| format!("Apply {} expertise to the task", worker.role)),
            collaborators: Vec::new(),
            context,
        }
    }

    /// One executor call behind a timeout and the cancellation boundary
    async fn run_step(
        &self,
        assignment: &Assignment,
        worker: &Worker,
        request: WorkRequest,
        cancel: &CombinedCancel,
    ) -> Result<WorkerOutput> {
        let task_id = &assignment.task.id;
        let timeout = assignment
            .step_timeout(&worker.id)
            .unwrap_or_else(|| self.config.step_timeout());
        let action = request.action;
        let started = Instant::now();
        debug!("{} starting {:?} on {}", worker.id, action, task_id);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(OrchestratorError::cancelled(task_id));
            }
            outcome = tokio::time::timeout(timeout, self.executor.execute(worker, &request)) => outcome,
        };

        match outcome {
            Ok(Ok(output)) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                debug!("{} finished {:?} on {} in {}ms", worker.id, action, task_id, duration_ms);
                Ok(WorkerOutput {
                    worker_id: worker.id.clone(),
                    role: worker.role,
                    action,
                    output,
                    duration_ms,
                })
            }
            Ok(Err(e)) => {
                warn!("{} failed on {}: {}", worker.id, task_id, e);
                Err(OrchestratorError::worker_error(
                    task_id,
                    format!("{}: {}", worker.id, e),
                ))
            }
            Err(_) => {
                warn!("{} timed out on {} after {:?}", worker.id, task_id, timeout);
                Err(OrchestratorError::timeout(task_id, timeout))
            }
        }
    }

    pub async fn all_workers(&self) -> Vec<Worker> {
        self.workers.lock().await.clone()
    }

    pub async fn worker(&self, id: &str) -> Option<Worker> {
        self.workers.lock().await.iter().find(|w| w.id == id).cloned()
    }

    pub async fn pending_assignments(&self) -> usize {
        self.assignments.lock().await.len()
    }

    pub async fn status_overview(&self) -> Vec<WorkerStatusView> {
        self.workers
            .lock()
            .await
            .iter()
            .map(|w| WorkerStatusView {
                id: w.id.clone(),
                name: w.name.clone(),
                role: w.role,
                status: w.status,
                load: w.load,
                performance: w.performance.clone(),
            })
            .collect()
    }

    pub async fn summary(&self) -> WorkerSummary {
        let workers = self.workers.lock().await;
        let mut summary = WorkerSummary {
            total_workers: workers.len(),
            ..Default::default()
        };

        for worker in workers.iter() {
            match worker.status {
                WorkerStatus::Active => summary.active += 1,
                WorkerStatus::Busy => summary.busy += 1,
                WorkerStatus::Idle => summary.idle += 1,
                WorkerStatus::Offline => summary.offline += 1,
            }
            summary.total_tasks_completed += worker.performance.tasks_completed;
        }

        if !workers.is_empty() {
            let count = workers.len() as f64;
            let quality: f64 = workers.iter().map(|w| w.performance.quality_score).sum();
            let success: f64 = workers.iter().map(|w| w.performance.success_rate).sum();
            summary.average_quality = round2(quality / count);
            summary.average_success_rate = round2(success / count);
        }
        summary
    }

    /// Every worker goes offline, in-flight executions are cancelled, and
    /// pending assignments are dropped
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        for semaphore in self.permits.values() {
            semaphore.close();
        }

        let dropped = {
            let mut assignments = self.assignments.lock().await;
            let count = assignments.len();
            assignments.clear();
            count
        };

        let mut workers = self.workers.lock().await;
        for worker in workers.iter_mut() {
            worker.status = WorkerStatus::Offline;
            worker.load = 0;
        }
        info!(
            "Worker pool shut down ({} workers offline, {} assignments dropped)",
            workers.len(),
            dropped
        );
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Shared handles needed to hand an assignment's workers back
#[derive(Clone)]
struct WorkerSlots {
    workers: Arc<Mutex<Vec<Worker>>>,
    assignments: Arc<Mutex<HashMap<String, Vec<WorkerId>>>>,
    permits: Arc<HashMap<WorkerId, Arc<Semaphore>>>,
}

impl WorkerSlots {
    /// Drop the assignment record and its load, record `outcome`, then give
    /// back `held`. A busy worker goes back to active only once nobody holds
    /// or waits for its permit. Returns whether the record was still present.
    ///
    /// Nothing changes until both locks are held, so a caller dropped while
    /// waiting still owns `held`.
    async fn release(
        &self,
        assignment_id: &str,
        worker_ids: &[WorkerId],
        held: &mut Vec<OwnedSemaphorePermit>,
        outcome: Option<((bool, u64), &WorkerPoolConfig)>,
    ) -> bool {
        let mut registry = self.workers.lock().await;
        let recorded = self.assignments.lock().await.remove(assignment_id).is_some();

        for worker in registry.iter_mut().filter(|w| worker_ids.contains(&w.id)) {
            if recorded {
                worker.load = worker.load.saturating_sub(1);
            }
            if let Some(((success, duration_ms), config)) = outcome {
                record_outcome(worker, success, duration_ms, config);
            }
        }

        // a queued assignment takes the permit over directly, so the worker
        // stays busy across the handoff
        held.clear();
        for worker in registry.iter_mut().filter(|w| worker_ids.contains(&w.id)) {
            let free = self
                .permits
                .get(&worker.id)
                .is_some_and(|s| s.available_permits() > 0);
            if worker.status == WorkerStatus::Busy && free {
                worker.status = WorkerStatus::Active;
            }
        }
        recorded
    }
}

/// Releases an execution's workers exactly once, even when the future
/// running it is dropped
struct ExecutionGuard {
    slots: WorkerSlots,
    assignment_id: String,
    worker_ids: Vec<WorkerId>,
    held: Vec<OwnedSemaphorePermit>,
    settled: bool,
}

impl ExecutionGuard {
    fn new(pool: &WorkerPool, assignment: &Assignment) -> Self {
        Self {
            slots: pool.slots(),
            assignment_id: assignment.id.clone(),
            worker_ids: assignment.worker_ids.clone(),
            held: Vec::new(),
            settled: false,
        }
    }

    /// `outcome` is `(success, duration_ms)` when the run counts toward
    /// performance stats
    async fn settle(mut self, outcome: Option<(bool, u64)>, config: &WorkerPoolConfig) {
        self.slots
            .release(
                &self.assignment_id,
                &self.worker_ids,
                &mut self.held,
                outcome.map(|o| (o, config)),
            )
            .await;
        self.settled = true;
    }
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!(
            "Execution of assignment {} abandoned, releasing its workers",
            self.assignment_id
        );

        let mut held = std::mem::take(&mut self.held);
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let slots = self.slots.clone();
        let assignment_id = std::mem::take(&mut self.assignment_id);
        let worker_ids = std::mem::take(&mut self.worker_ids);
        runtime.spawn(async move {
            slots
                .release(&assignment_id, &worker_ids, &mut held, None)
                .await;
        });
    }
}

/// Caller token plus the pool's own shutdown token
struct CombinedCancel {
    caller: CancellationToken,
    pool: CancellationToken,
}

impl CombinedCancel {
    async fn cancelled(&self) {
        tokio::select! {
            _ = self.caller.cancelled() => {}
            _ = self.pool.cancelled() => {}
        }
    }
}

fn record_outcome(worker: &mut Worker, success: bool, duration_ms: u64, config: &WorkerPoolConfig) {
    worker.recent_outcomes.push_back(Outcome {
        success,
        duration_ms,
    });
    while worker.recent_outcomes.len() > config.performance_window.max(1) {
        worker.recent_outcomes.pop_front();
    }

    let window = worker.recent_outcomes.len() as f64;
    let successes = worker.recent_outcomes.iter().filter(|o| o.success).count() as f64;
    let total_ms: u64 = worker.recent_outcomes.iter().map(|o| o.duration_ms).sum();

    let performance = &mut worker.performance;
    performance.tasks_completed += 1;
    performance.success_rate = successes / window * 100.0;
    performance.average_duration_ms = total_ms as f64 / window;
    performance.quality_score = if success {
        (performance.quality_score + config.quality_increment).min(100.0)
    } else {
        (performance.quality_score - config.quality_penalty).max(0.0)
    };
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

