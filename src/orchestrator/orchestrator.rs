use crate::config::OrchestratorConfig;
use crate::context::{ContextStats, ContextStore, WorkerExecutionSummary};
use crate::cost::{CostReport, CostTracker, CurrentStats};
use crate::error::{OrchestratorError, Result};
use crate::events::{EventDispatcher, OrchestratorEvent};
use crate::orchestrator::pipeline::{self, PipelineConfig};
use crate::orchestrator::project::{Project, ProjectChecks, ProjectDraft, ProjectId, ProjectPhase, validate_project};
use crate::task::{self, ShardingStats, Task, TaskId, TaskPriority, TaskSharder, TaskStatus, TaskType};
use crate::worker::{
    Assignment, AssignmentResult, SimulatedExecutor, Worker, WorkerExecutor, WorkerPool, WorkerRole,
    WorkerStatus, WorkerStatusView, WorkerSummary, default_roster,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where a running project currently is
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub project_id: ProjectId,
    pub project_name: String,
    pub phase: ProjectPhase,
    pub stage: Option<String>,
    pub current_tasks: Vec<TaskId>,
    pub paused: bool,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub running: bool,
    pub current: Option<RunStatus>,
    pub workers: WorkerSummary,
    pub cost: CurrentStats,
    pub context: ContextStats,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RunMetrics {
    pub total_runs: usize,
    pub successful_runs: usize,
    pub success_rate: f64,
    pub average_duration_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorMetrics {
    pub workers: WorkerSummary,
    pub worker_details: Vec<WorkerStatusView>,
    pub cost: CostReport,
    pub context: ContextStats,
    pub sharding: ShardingStats,
    pub runs: RunMetrics,
}

/// Liveness per component
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthReport {
    pub running: bool,
    pub uptime_secs: u64,
    pub worker_pool: bool,
    pub context_store: bool,
    pub cost_tracker: bool,
    pub task_sharder: bool,
    pub total_workers: usize,
    pub available_workers: usize,
    pub context_entries: usize,
    pub cache_utilization: f64,
    pub cost_operations: usize,
    pub tasks_sharded: usize,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.worker_pool && self.context_store && self.cost_tracker && self.task_sharder
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: String,
    pub duration_ms: u64,
    pub results: Vec<AssignmentResult>,
    pub usage: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub project: Project,
    pub planning: StageReport,
    pub execution: StageReport,
    /// Tasks after sharding, in completion order
    pub tasks: Vec<Task>,
    pub context_preservation: f64,
    pub duration_ms: u64,
    pub cost: CostReport,
}

#[derive(Debug, Default)]
struct RunState {
    current: Option<RunStatus>,
    cancel: Option<CancellationToken>,
}

#[derive(Debug, Clone, Copy)]
struct RunOutcome {
    success: bool,
    duration_ms: u64,
}

/// Holds the run slot for one `start` call. Dropping it unfinished, as when
/// the caller drops the `start` future, cancels the run and frees the slot.
struct ActiveRun<'a> {
    orchestrator: &'a Orchestrator,
    project_id: ProjectId,
    started: Instant,
    finished: bool,
}

impl ActiveRun<'_> {
    /// Returns the run duration in milliseconds
    fn finish(mut self, success: bool) -> u64 {
        self.finished = true;
        let duration_ms = self.started.elapsed().as_millis() as u64;
        self.orchestrator.end_run(success, duration_ms);
        duration_ms
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!("Run of project {} dropped before it finished", self.project_id);
        self.orchestrator
            .end_run(false, self.started.elapsed().as_millis() as u64);
        self.orchestrator
            .events
            .emit(OrchestratorEvent::ExecutionCancelled {
                project_id: self.project_id.clone(),
            });
    }
}

/// Owns one instance of every subsystem and drives projects through
/// planning and execution.
///
/// Only one project runs at a time. `pause` takes effect between steps;
/// `cancel` reaches in-flight worker executions.
pub struct Orchestrator {
    config: OrchestratorConfig,
    context: Arc<ContextStore>,
    sharder: Arc<TaskSharder>,
    workers: Arc<WorkerPool>,
    costs: Arc<CostTracker>,
    events: Arc<EventDispatcher>,
    state: Mutex<RunState>,
    paused: watch::Sender<bool>,
    running: watch::Sender<bool>,
    history: Mutex<Vec<RunOutcome>>,
    shut_down: AtomicBool,
    started: Instant,
}

impl Orchestrator {
    /// Wire every subsystem with the simulated executor
    pub fn new(config: OrchestratorConfig) -> Self {
        Self::with_executor(config, Arc::new(SimulatedExecutor::default()))
    }

    pub fn with_executor(config: OrchestratorConfig, executor: Arc<dyn WorkerExecutor>) -> Self {
        let events = Arc::new(EventDispatcher::new());
        let roster = if config.roster.is_empty() {
            default_roster()
        } else {
            config.roster.clone()
        };

        let context = Arc::new(ContextStore::new(config.context.clone()));
        let sharder = Arc::new(TaskSharder::new(config.sharding.clone()));
        let workers = Arc::new(WorkerPool::new(
            config.workers.clone(),
            roster,
            executor,
            events.clone(),
        ));
        let costs = Arc::new(CostTracker::new(config.cost.clone(), events.clone()));

        info!("Orchestrator initialized");

        Self {
            config,
            context,
            sharder,
            workers,
            costs,
            events,
            state: Mutex::new(RunState::default()),
            paused: watch::Sender::new(false),
            running: watch::Sender::new(false),
            history: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
            started: Instant::now(),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Register handlers here to receive [`OrchestratorEvent`]s
    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    pub fn context(&self) -> &Arc<ContextStore> {
        &self.context
    }

    pub fn sharder(&self) -> &Arc<TaskSharder> {
        &self.sharder
    }

    pub fn workers(&self) -> &Arc<WorkerPool> {
        &self.workers
    }

    pub fn costs(&self) -> &Arc<CostTracker> {
        &self.costs
    }

    fn pipeline(&self) -> &PipelineConfig {
        &self.config.pipeline
    }

    pub fn create_project(&self, draft: ProjectDraft) -> Result<Project> {
        let project = Project::from_draft(draft);
        validate_project(
            &project,
            ProjectChecks {
                require_functional_requirements: self.pipeline().require_functional_requirements,
                require_components: self.pipeline().require_components,
            },
        )?;

        info!("Created project {} ({})", project.name, project.id);
        self.events.emit(OrchestratorEvent::ProjectCreated {
            project_id: project.id.clone(),
            name: project.name.clone(),
        });
        Ok(project)
    }

    /// Run planning then execution for `project`.
    ///
    /// Fails with `InvalidState` if another project is running or the
    /// orchestrator was shut down, and with `Cancelled` when [`Self::cancel`]
    /// interrupts the run.
    pub async fn start(&self, mut project: Project) -> Result<ExecutionReport> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(OrchestratorError::invalid_state(
                &project.id,
                "orchestrator has been shut down",
            ));
        }

        let cancel = {
            let mut state = self.run_state();
            if let Some(current) = &state.current {
                return Err(OrchestratorError::invalid_state(
                    &project.id,
                    format!("project {} is already running", current.project_id),
                ));
            }
            let cancel = CancellationToken::new();
            state.current = Some(RunStatus {
                project_id: project.id.clone(),
                project_name: project.name.clone(),
                phase: ProjectPhase::Planning,
                stage: None,
                current_tasks: Vec::new(),
                paused: false,
                started_at: Utc::now(),
            });
            state.cancel = Some(cancel.clone());
            cancel
        };
        let active = ActiveRun {
            orchestrator: self,
            project_id: project.id.clone(),
            started: Instant::now(),
            finished: false,
        };
        self.paused.send_replace(false);
        self.running.send_replace(true);

        info!("Starting project {} ({})", project.name, project.id);
        self.events.emit(OrchestratorEvent::ExecutionStarted {
            project_id: project.id.clone(),
        });

        let outcome = self.run(&mut project, &cancel).await;
        let duration_ms = active.finish(outcome.is_ok());

        let event = match &outcome {
            Ok(_) => OrchestratorEvent::ExecutionCompleted {
                project_id: project.id.clone(),
                duration_ms,
            },
            Err(e) if e.is_cancelled() => {
                project.set_phase(ProjectPhase::Cancelled);
                warn!("Project {} cancelled", project.id);
                OrchestratorEvent::ExecutionCancelled {
                    project_id: project.id.clone(),
                }
            }
            Err(e) => {
                project.set_phase(ProjectPhase::Failed);
                error!("Project {} failed: {}", project.id, e);
                OrchestratorEvent::ExecutionFailed {
                    project_id: project.id.clone(),
                    error: e.to_string(),
                }
            }
        };
        self.events.emit(event);

        let (planning, execution, tasks, context_preservation) = outcome?;
        info!(
            "Project {} completed in {}ms ({} tasks, {}% context preserved)",
            project.id,
            duration_ms,
            tasks.len(),
            context_preservation
        );

        Ok(ExecutionReport {
            cost: self.costs.report().await,
            project,
            planning,
            execution,
            tasks,
            context_preservation,
            duration_ms,
        })
    }

    async fn run(
        &self,
        project: &mut Project,
        cancel: &CancellationToken,
    ) -> Result<(StageReport, StageReport, Vec<Task>, f64)> {
        let planning = self.plan(project, cancel).await?;

        project.set_phase(ProjectPhase::Execution);
        self.update_status(|s| s.phase = ProjectPhase::Execution).await;
        let (execution, tasks, preservation) = self.develop(project, cancel).await?;

        project.set_phase(ProjectPhase::Completed);
        Ok((planning, execution, tasks, preservation))
    }

    /// Project context, requirements analysis, then architecture design
    async fn plan(&self, project: &Project, cancel: &CancellationToken) -> Result<StageReport> {
        let started = Instant::now();
        self.enter_stage("planning").await;

        self.context
            .store_project_context(&project.id, project.context_payload())
            .await;

        let analysis = Task::new(
            format!("requirements_analysis_{}", project.id),
            "Analyze requirements",
            format!(
                "Analyze the requirements and product strategy of {}: {}",
                project.name, project.description
            ),
            TaskType::RequirementsAnalysis,
        )
        .with_priority(TaskPriority::High);

        let design = Task::new(
            format!("architecture_design_{}", project.id),
            "Design architecture",
            format!(
                "Design the system architecture of {}: {}",
                project.name, project.description
            ),
            TaskType::ArchitectureDesign,
        )
        .with_priority(TaskPriority::High)
        .with_dependencies([analysis.id.clone()]);

        let mut results = Vec::new();
        for (task, required) in [
            (analysis, WorkerRole::Analyst),
            (design, WorkerRole::Architect),
        ] {
            self.wait_while_paused(&project.id, cancel).await?;
            let workers = self.staff(&task, Some(required)).await?;
            self.context.store_task_context(&task, Some(&project.id)).await;
            results.push(self.run_task(task, workers, cancel).await?);
        }

        let usage: u64 = results.iter().map(|r| r.tokens_used()).sum();
        let duration_ms = started.elapsed().as_millis() as u64;
        self.costs
            .record(
                "planning",
                duration_ms,
                self.pipeline().planning_baseline_usage,
                usage,
                &participants(&results),
            )
            .await;
        self.events.emit(OrchestratorEvent::StageCompleted {
            project_id: project.id.clone(),
            stage: "planning".to_string(),
            duration_ms,
        });

        Ok(StageReport {
            stage: "planning".to_string(),
            duration_ms,
            results,
            usage,
        })
    }

    /// Story conversion, story contexts, sharding, then dependency-ordered
    /// execution in waves
    async fn develop(
        &self,
        project: &Project,
        cancel: &CancellationToken,
    ) -> Result<(StageReport, Vec<Task>, f64)> {
        let started = Instant::now();
        self.enter_stage("execution").await;
        self.wait_while_paused(&project.id, cancel).await?;

        let conversion = Task::new(
            format!("story_conversion_{}", project.id),
            "Convert requirements to user stories",
            format!(
                "Convert the product requirements of {} into user stories with full context",
                project.name
            ),
            TaskType::StoryCreation,
        )
        .with_priority(TaskPriority::High)
        .with_dependencies([format!("architecture_design_{}", project.id)]);
        let workers = self.staff(&conversion, Some(WorkerRole::Coordinator)).await?;
        self.context
            .store_task_context(&conversion, Some(&project.id))
            .await;
        let mut results = vec![self.run_task(conversion, workers, cancel).await?];

        let project_context = format!("project_{}", project.id);
        let stories = pipeline::stories_from_requirements(project);
        for story in &stories {
            self.context
                .store_story_context(
                    &story.id,
                    pipeline::story_context_payload(story, project),
                    vec![project_context.clone()],
                )
                .await;
        }

        let mut tasks = Vec::with_capacity(stories.len());
        let mut replacements: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for story in stories {
            if !task::should_shard(&story) {
                tasks.push(story);
                continue;
            }
            let shards = self.sharder.shard(&story)?;
            let subtask_ids: Vec<TaskId> = shards.iter().map(|t| t.id.clone()).collect();
            if let Some(record) = self.sharder.history(&story.id) {
                self.events.emit(OrchestratorEvent::TaskSharded {
                    task_id: story.id.clone(),
                    strategy: record.strategy,
                    subtask_ids: subtask_ids.clone(),
                });
            }
            replacements.insert(story.id.clone(), subtask_ids);
            tasks.extend(shards);
        }
        pipeline::replace_sharded_dependencies(&mut tasks, &replacements);
        pipeline::check_acyclic(&tasks)?;

        for task in &tasks {
            self.context.store_task_context(task, Some(&project.id)).await;
        }

        let (completed, wave_results) = self.run_waves(project, tasks, cancel).await?;
        results.extend(wave_results);

        let mut story_payloads = HashMap::new();
        for requirement in &project.requirements.functional {
            let id = format!("story_{}", pipeline::story_id(&requirement.id));
            if let Some(payload) = self.context.retrieve(&id, 0).await {
                story_payloads.insert(requirement.id.clone(), payload);
            }
        }
        let preservation = pipeline::context_preservation(project, &story_payloads);

        let usage: u64 = results.iter().map(|r| r.tokens_used()).sum();
        let duration_ms = started.elapsed().as_millis() as u64;
        self.costs
            .record(
                "execution",
                duration_ms,
                self.pipeline().execution_baseline_usage,
                usage,
                &participants(&results),
            )
            .await;
        self.events.emit(OrchestratorEvent::StageCompleted {
            project_id: project.id.clone(),
            stage: "execution".to_string(),
            duration_ms,
        });

        Ok((
            StageReport {
                stage: "execution".to_string(),
                duration_ms,
                results,
                usage,
            },
            completed,
            preservation,
        ))
    }

    /// Each wave is staffed and assigned as a whole before any of it runs,
    /// so pending load spreads selection across workers of the same role
    async fn run_waves(
        &self,
        project: &Project,
        tasks: Vec<Task>,
        cancel: &CancellationToken,
    ) -> Result<(Vec<Task>, Vec<AssignmentResult>)> {
        let all_ids: HashSet<TaskId> = tasks.iter().map(|t| t.id.clone()).collect();
        let limit = self.config.workers.max_concurrent_tasks.max(1);
        let mut pending = tasks;
        let mut finished: HashSet<TaskId> = HashSet::new();
        let mut completed: Vec<Task> = Vec::with_capacity(pending.len());
        let mut results = Vec::new();

        while !pending.is_empty() {
            self.wait_while_paused(&project.id, cancel).await?;

            let wave: Vec<Task> = pipeline::ready_wave(&pending, &finished, &all_ids, limit)
                .into_iter()
                .cloned()
                .collect();
            if wave.is_empty() {
                return Err(OrchestratorError::validation(
                    &project.id,
                    "no task is ready to run",
                ));
            }
            debug!("Running wave of {} tasks", wave.len());

            let mut assignments = Vec::with_capacity(wave.len());
            for task in &wave {
                let staffed = match self.staff(task, None).await {
                    Ok(workers) => self.workers.assign(task, &workers).await,
                    Err(e) => Err(e),
                };
                match staffed {
                    Ok(assignment) => assignments.push(assignment),
                    Err(e) => {
                        for assignment in &assignments {
                            self.workers.release(assignment).await;
                        }
                        return Err(e);
                    }
                }
            }

            let ids: Vec<TaskId> = wave.iter().map(|t| t.id.clone()).collect();
            self.update_status(|s| s.current_tasks = ids.clone()).await;

            let outcomes = join_all(
                assignments
                    .into_iter()
                    .map(|assignment| self.execute_assignment(assignment, cancel)),
            )
            .await;

            let mut failure = None;
            for (mut task, outcome) in wave.into_iter().zip(outcomes) {
                match outcome {
                    Ok(result) => {
                        task.set_status(TaskStatus::Done);
                        task.artifacts.extend(result.artifacts.iter().cloned());
                        self.context.store_task_context(&task, Some(&project.id)).await;
                        finished.insert(task.id.clone());
                        pending.retain(|t| t.id != task.id);
                        completed.push(task);
                        results.push(result);
                    }
                    Err(e) => {
                        // cancellation wins over ordinary failures
                        if failure.as_ref().is_none_or(|f: &OrchestratorError| !f.is_cancelled()) {
                            failure = Some(e);
                        }
                    }
                }
            }
            if let Some(e) = failure {
                return Err(e);
            }
        }

        self.update_status(|s| s.current_tasks.clear()).await;
        Ok((completed, results))
    }

    /// Select workers for the task's roles. `required` must be among them.
    async fn staff(&self, task: &Task, required: Option<WorkerRole>) -> Result<Vec<Worker>> {
        let roles = pipeline::roles_for(task);
        let workers = self.workers.select_for_roles(&roles).await;

        if let Some(role) = required
            && !workers.iter().any(|w| w.role == role)
        {
            return Err(OrchestratorError::role_unavailable(&task.id, role.as_str()));
        }
        if workers.is_empty() {
            let names: Vec<&str> = roles.iter().map(|r| r.as_str()).collect();
            return Err(OrchestratorError::role_unavailable(&task.id, names.join(", ")));
        }
        if workers.len() < roles.len() {
            warn!(
                "Task {} staffed with {} of {} roles",
                task.id,
                workers.len(),
                roles.len()
            );
        }
        Ok(workers)
    }

    async fn run_task(
        &self,
        task: Task,
        workers: Vec<Worker>,
        cancel: &CancellationToken,
    ) -> Result<AssignmentResult> {
        let assignment = self.workers.assign(&task, &workers).await?;
        self.update_status(|s| s.current_tasks = vec![task.id.clone()]).await;
        let result = self.execute_assignment(assignment, cancel).await;
        self.update_status(|s| s.current_tasks.clear()).await;
        result
    }

    /// Execute and leave a worker-context trail for every participant
    async fn execute_assignment(
        &self,
        assignment: Assignment,
        cancel: &CancellationToken,
    ) -> Result<AssignmentResult> {
        let task_id = assignment.task.id.clone();
        let worker_ids = assignment.worker_ids.clone();
        let started = Instant::now();
        let outcome = self.workers.execute_with_cancel(assignment, cancel).await;

        if matches!(&outcome, Err(e) if e.is_cancelled()) {
            return outcome;
        }
        let error = outcome.as_ref().err().map(|e| e.to_string());
        let duration_ms = match &outcome {
            Ok(result) => result.duration_ms,
            Err(_) => started.elapsed().as_millis() as u64,
        };
        for worker_id in worker_ids {
            self.context
                .store_worker_context(&WorkerExecutionSummary {
                    worker_id,
                    task_id: task_id.clone(),
                    success: error.is_none(),
                    duration_ms,
                    error: error.clone(),
                })
                .await;
        }
        outcome
    }

    async fn enter_stage(&self, stage: &str) {
        info!("Entering {} stage", stage);
        let stage = stage.to_string();
        self.update_status(|s| s.stage = Some(stage)).await;
    }

    async fn update_status(&self, update: impl FnOnce(&mut RunStatus)) {
        if let Some(current) = self.run_state().current.as_mut() {
            update(current);
        }
    }

    fn run_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the run and free the slot for the next one
    fn end_run(&self, success: bool, duration_ms: u64) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RunOutcome {
                success,
                duration_ms,
            });
        {
            let mut state = self.run_state();
            if let Some(cancel) = state.cancel.take() {
                cancel.cancel();
            }
            state.current = None;
        }
        self.paused.send_replace(false);
        self.running.send_replace(false);
    }

    /// Block while paused; cancellation ends the wait with `Cancelled`
    async fn wait_while_paused(&self, project_id: &str, cancel: &CancellationToken) -> Result<()> {
        let mut paused = self.paused.subscribe();
        loop {
            if cancel.is_cancelled() {
                return Err(OrchestratorError::cancelled(project_id));
            }
            if !*paused.borrow_and_update() {
                return Ok(());
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(OrchestratorError::cancelled(project_id)),
                changed = paused.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Returns false when nothing is running or the run is already paused
    pub async fn pause(&self) -> bool {
        let project_id = {
            let mut state = self.run_state();
            match state.current.as_mut() {
                Some(current) if !current.paused => {
                    current.paused = true;
                    current.project_id.clone()
                }
                _ => return false,
            }
        };
        self.paused.send_replace(true);
        info!("Paused project {}", project_id);
        self.events
            .emit(OrchestratorEvent::ExecutionPaused { project_id });
        true
    }

    pub async fn resume(&self) -> bool {
        let project_id = {
            let mut state = self.run_state();
            match state.current.as_mut() {
                Some(current) if current.paused => {
                    current.paused = false;
                    current.project_id.clone()
                }
                _ => return false,
            }
        };
        self.paused.send_replace(false);
        info!("Resumed project {}", project_id);
        self.events
            .emit(OrchestratorEvent::ExecutionResumed { project_id });
        true
    }

    /// Cancel the running project, including in-flight worker executions
    pub async fn cancel(&self) -> bool {
        let state = self.run_state();
        match (&state.current, &state.cancel) {
            (Some(current), Some(token)) => {
                info!("Cancelling project {}", current.project_id);
                token.cancel();
                true
            }
            _ => false,
        }
    }

    pub async fn get_status(&self) -> OrchestratorStatus {
        let current = self.run_state().current.clone();
        OrchestratorStatus {
            running: current.is_some(),
            current,
            workers: self.workers.summary().await,
            cost: self.costs.current_stats().await,
            context: self.context.stats().await,
        }
    }

    pub async fn get_metrics(&self) -> OrchestratorMetrics {
        let runs = {
            let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            let total_runs = history.len();
            let successful_runs = history.iter().filter(|r| r.success).count();
            if total_runs == 0 {
                RunMetrics::default()
            } else {
                RunMetrics {
                    total_runs,
                    successful_runs,
                    success_rate: round2(successful_runs as f64 / total_runs as f64 * 100.0),
                    average_duration_ms: round2(
                        history.iter().map(|r| r.duration_ms as f64).sum::<f64>()
                            / total_runs as f64,
                    ),
                }
            }
        };

        OrchestratorMetrics {
            workers: self.workers.summary().await,
            worker_details: self.workers.status_overview().await,
            cost: self.costs.report().await,
            context: self.context.stats().await,
            sharding: self.sharder.stats(),
            runs,
        }
    }

    pub async fn health_check(&self) -> HealthReport {
        let workers = self.workers.all_workers().await;
        let available_workers = workers
            .iter()
            .filter(|w| w.status != WorkerStatus::Offline)
            .count();
        let context_store = match self.context.check_consistency().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Context store inconsistent: {}", e);
                false
            }
        };
        let context = self.context.stats().await;
        let cost = self.costs.current_stats().await;
        let running = self.run_state().current.is_some();

        HealthReport {
            running,
            uptime_secs: self.started.elapsed().as_secs(),
            worker_pool: !self.workers.is_shut_down() && available_workers > 0,
            context_store,
            cost_tracker: cost.total_savings.is_finite(),
            task_sharder: self.sharder.stats().average_subtasks_per_task.is_finite(),
            total_workers: workers.len(),
            available_workers,
            context_entries: context.total_entries,
            cache_utilization: context.cache_utilization,
            cost_operations: cost.total_operations,
            tasks_sharded: self.sharder.stats().total_tasks_sharded,
        }
    }

    /// Wait up to the grace period for a running project, cancel it if it
    /// is still going, then take every worker offline and clear caches
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down orchestrator");

        let grace = Duration::from_secs(self.pipeline().shutdown_grace_period_secs);
        let mut running = self.running.subscribe();
        let drained = tokio::time::timeout(grace, running.wait_for(|r| !*r))
            .await
            .is_ok();
        if !drained {
            warn!("Project still running after {:?}, cancelling", grace);
            self.cancel().await;
            let limit = Duration::from_millis(self.pipeline().shutdown_cancel_timeout_ms);
            match tokio::time::timeout(limit, running.wait_for(|r| !*r)).await {
                Ok(Ok(_)) => {}
                Ok(Err(_)) => debug!("Run state channel closed during shutdown"),
                Err(_) => warn!(
                    "Cancelled project did not stop within {:?}, shutting down anyway",
                    limit
                ),
            }
        }

        self.workers.shutdown().await;
        self.context.clear().await;
        self.costs.clear_history().await;
        self.sharder.clear();
        info!("Orchestrator shutdown complete");
    }
}

fn participants(results: &[AssignmentResult]) -> Vec<String> {
    let mut seen = HashSet::new();
    results
        .iter()
        .flat_map(|r| r.worker_ids.iter())
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
