use super::*;
use crate::error::ErrorKind;
use crate::events::{ChannelEventHandler, EventDispatcher, OrchestratorEvent};
use crate::task::{Complexity, RiskLevel, Task, TaskType};
use anyhow::bail;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct FailingExecutor;

#[async_trait::async_trait]
impl WorkerExecutor for FailingExecutor {
    async fn execute(&self, worker: &Worker, _request: &WorkRequest) -> anyhow::Result<WorkOutput> {
        bail!("{} crashed", worker.id)
    }
}

struct SlowExecutor(Duration);

#[async_trait::async_trait]
impl WorkerExecutor for SlowExecutor {
    async fn execute(&self, _worker: &Worker, _request: &WorkRequest) -> anyhow::Result<WorkOutput> {
        tokio::time::sleep(self.0).await;
        Ok(WorkOutput::default())
    }
}

#[derive(Default)]
struct RecordingExecutor {
    requests: StdMutex<Vec<(WorkerId, serde_json::Value)>>,
}

#[async_trait::async_trait]
impl WorkerExecutor for RecordingExecutor {
    async fn execute(&self, worker: &Worker, request: &WorkRequest) -> anyhow::Result<WorkOutput> {
        self.requests
            .lock()
            .map_err(|_| anyhow::anyhow!("poisoned"))?
            .push((worker.id.clone(), request.context.clone()));
        Ok(WorkOutput {
            content: format!("{} done", worker.id),
            findings: vec![format!("{} finding", worker.id)],
            ..Default::default()
        })
    }
}

/// Sleeps for a fixed time and tracks the most calls seen in flight at once
struct OverlapExecutor {
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl OverlapExecutor {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl WorkerExecutor for OverlapExecutor {
    async fn execute(&self, _worker: &Worker, _request: &WorkRequest) -> anyhow::Result<WorkOutput> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(WorkOutput::default())
    }
}

fn pool_with(executor: Arc<dyn WorkerExecutor>) -> WorkerPool {
    WorkerPool::new(
        WorkerPoolConfig::default(),
        default_roster(),
        executor,
        Arc::new(EventDispatcher::new()),
    )
}

fn dev_task(id: &str) -> Task {
    Task::new(id, "Build login form", "Implement the login form with validation", TaskType::Development)
}

async fn workers(pool: &WorkerPool, ids: &[&str]) -> Vec<Worker> {
    let mut found = Vec::new();
    for id in ids {
        found.push(pool.worker(id).await.expect("worker exists"));
    }
    found
}

#[tokio::test]
async fn test_select_prefers_score_and_skips_busy_roles() {
    let roster = vec![
        WorkerDefinition::new("dev-a", "Dev A", WorkerRole::Developer),
        WorkerDefinition::new("dev-b", "Dev B", WorkerRole::Developer),
    ];
    let pool = WorkerPool::new(
        WorkerPoolConfig::default(),
        roster,
        Arc::new(FailingExecutor),
        Arc::new(EventDispatcher::new()),
    );

    // equal scores keep registry order
    let picked = pool.select_for_roles(&[WorkerRole::Developer]).await;
    assert_eq!(picked[0].id, "dev-a");

    // a failure drops dev-a to 83 quality
    let assignment = pool.assign(&dev_task("t1"), &picked).await.unwrap();
    assert!(pool.execute(assignment).await.is_err());
    assert_eq!(pool.worker("dev-a").await.unwrap().performance.quality_score, 83.0);

    let picked = pool.select_for_roles(&[WorkerRole::Developer]).await;
    assert_eq!(picked[0].id, "dev-b");

    // both developers requested: each picked once
    let picked = pool
        .select_for_roles(&[WorkerRole::Developer, WorkerRole::Developer, WorkerRole::Tester])
        .await;
    let ids: Vec<_> = picked.iter().map(|w| w.id.as_str()).collect();
    assert_eq!(ids, vec!["dev-b", "dev-a"]);
}

#[tokio::test]
async fn test_pending_load_lowers_selection_score() {
    let roster = vec![
        WorkerDefinition::new("dev-a", "Dev A", WorkerRole::Developer),
        WorkerDefinition::new("dev-b", "Dev B", WorkerRole::Developer),
    ];
    let pool = WorkerPool::new(
        WorkerPoolConfig::default(),
        roster,
        Arc::new(SimulatedExecutor::instant()),
        Arc::new(EventDispatcher::new()),
    );

    let first = pool.select_for_roles(&[WorkerRole::Developer]).await;
    let assignment = pool.assign(&dev_task("t1"), &first).await.unwrap();
    assert_eq!(pool.worker("dev-a").await.unwrap().load, 1);
    assert_eq!(pool.pending_assignments().await, 1);

    let second = pool.select_for_roles(&[WorkerRole::Developer]).await;
    assert_eq!(second[0].id, "dev-b");

    pool.release(&assignment).await;
    assert_eq!(pool.worker("dev-a").await.unwrap().load, 0);
    assert_eq!(pool.pending_assignments().await, 0);
}

#[tokio::test]
async fn test_assign_validation() {
    let pool = pool_with(Arc::new(SimulatedExecutor::instant()));

    let err = pool.assign(&dev_task("t1"), &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let stranger = Worker::from_definition(
        WorkerDefinition::new("ghost", "Ghost", WorkerRole::Developer),
        85.0,
    );
    let err = pool.assign(&dev_task("t1"), &[stranger]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.entity_id(), "ghost");

    let mut invalid = dev_task("t2");
    invalid.description.clear();
    let team = workers(&pool, &["developer"]).await;
    assert_eq!(
        pool.assign(&invalid, &team).await.unwrap_err().kind(),
        ErrorKind::Validation
    );
}

#[tokio::test]
async fn test_strategy_selection() {
    let pool = pool_with(Arc::new(SimulatedExecutor::instant()));

    let single = workers(&pool, &["developer"]).await;
    let assignment = pool.assign(&dev_task("t1"), &single).await.unwrap();
    assert_eq!(assignment.strategy, CoordinationStrategy::Sequential);
    pool.release(&assignment).await;

    let design = Task::new(
        "t2",
        "Design platform",
        "Design the platform architecture",
        TaskType::ArchitectureDesign,
    );
    let team = workers(&pool, &["analyst", "architect", "product-manager"]).await;
    let assignment = pool.assign(&design, &team).await.unwrap();
    assert_eq!(assignment.strategy, CoordinationStrategy::Collaborative);
    // one analysis per worker plus the synthesis step
    assert_eq!(assignment.steps.len(), 4);
    pool.release(&assignment).await;

    let complex = dev_task("t3").with_effort(6.0, Complexity::Complex, RiskLevel::Medium);
    let team = workers(&pool, &["developer", "tester"]).await;
    let err = pool.assign(&complex, &team).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RoleUnavailable);
    assert_eq!(pool.worker("developer").await.unwrap().load, 0);

    let team = workers(&pool, &["developer", "architect", "tester"]).await;
    let assignment = pool.assign(&complex, &team).await.unwrap();
    assert_eq!(assignment.leader(), Some("architect"));
    pool.release(&assignment).await;

    let team = workers(&pool, &["developer", "tester"]).await;
    let assignment = pool.assign(&dev_task("t4"), &team).await.unwrap();
    assert_eq!(assignment.strategy, CoordinationStrategy::Parallel);
    assert!(assignment.steps.iter().all(|s| s.depends_on.is_empty()));
}

#[tokio::test]
async fn test_successful_execution_updates_performance() {
    let dispatcher = Arc::new(EventDispatcher::new());
    let (handler, mut receiver) = ChannelEventHandler::new();
    dispatcher.register(Arc::new(handler));
    let pool = WorkerPool::new(
        WorkerPoolConfig::default(),
        default_roster(),
        Arc::new(SimulatedExecutor::instant()),
        dispatcher,
    );

    let team = workers(&pool, &["developer"]).await;
    let assignment = pool.assign(&dev_task("t1"), &team).await.unwrap();
    let result = pool.execute(assignment).await.unwrap();

    assert_eq!(result.strategy, CoordinationKind::Sequential);
    assert_eq!(result.outputs.len(), 1);
    assert!(!result.artifacts.is_empty());
    assert!(result.tokens_used() > 0);

    let developer = pool.worker("developer").await.unwrap();
    assert_eq!(developer.status, WorkerStatus::Active);
    assert_eq!(developer.load, 0);
    assert_eq!(developer.performance.tasks_completed, 1);
    assert_eq!(developer.performance.success_rate, 100.0);
    assert_eq!(developer.performance.quality_score, 85.5);

    match receiver.try_recv() {
        Ok(OrchestratorEvent::TaskCompleted {
            task_id,
            worker_ids,
            result: completed,
        }) => {
            assert_eq!(task_id, "t1");
            assert_eq!(worker_ids, vec!["developer".to_string()]);
            assert_eq!(completed.assignment_id, result.assignment_id);
            assert_eq!(completed.artifacts.len(), result.artifacts.len());
            assert_eq!(completed.outputs.len(), 1);
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_sequential_passes_previous_results() {
    let executor = Arc::new(RecordingExecutor::default());
    let pool = pool_with(executor.clone());

    let team = workers(&pool, &["developer", "reviewer"]).await;
    let mut assignment = pool.assign(&dev_task("t2"), &team).await.unwrap();
    assignment.strategy = CoordinationStrategy::Sequential;
    let result = pool.execute(assignment).await.unwrap();
    assert_eq!(result.outputs.len(), 2);

    let requests = executor.requests.lock().unwrap();
    let (last_worker, last_context) = requests.last().unwrap();
    assert_eq!(last_worker, "reviewer");
    let previous = last_context["previous_results"].as_array().unwrap();
    assert_eq!(previous.len(), 1);
    assert_eq!(previous[0]["worker_id"], "developer");
}

#[tokio::test]
async fn test_hierarchical_execution_runs_leader_first() {
    let pool = pool_with(Arc::new(SimulatedExecutor::instant()));
    let complex = dev_task("t1").with_effort(6.0, Complexity::Complex, RiskLevel::Medium);
    let team = workers(&pool, &["architect", "developer", "tester"]).await;

    let assignment = pool.assign(&complex, &team).await.unwrap();
    let result = pool.execute(assignment).await.unwrap();

    let plan = result.leader_plan.as_ref().unwrap();
    assert_eq!(plan.worker_id, "architect");
    assert_eq!(plan.action, StepAction::Coordinate);
    // one delegation per subordinate
    assert_eq!(plan.output.findings.len(), 2);
    assert_eq!(result.outputs.len(), 2);
    assert!(result.outputs.iter().all(|o| o.worker_id != "architect"));
    assert_eq!(result.summary, "System Architect coordinated 2 team members");
}

#[tokio::test]
async fn test_collaborative_execution_synthesizes() {
    let pool = pool_with(Arc::new(SimulatedExecutor::instant()));
    let design = Task::new(
        "t1",
        "Checkout",
        "Design the checkout architecture",
        TaskType::ArchitectureDesign,
    );
    let team = workers(&pool, &["analyst", "architect", "product-manager"]).await;
    let assignment = pool.assign(&design, &team).await.unwrap();
    let result = pool.execute(assignment).await.unwrap();

    assert_eq!(result.outputs.len(), 3);
    let synthesis = result.synthesis.as_ref().unwrap();
    // equal quality keeps assignment order
    assert_eq!(synthesis.synthesizer, "analyst");
    assert_eq!(
        synthesis.consensus_points,
        vec!["Scope of 'Checkout' is well defined".to_string()]
    );
    assert!(!synthesis.conflict_resolutions.is_empty());
    assert!(result.summary.contains("4 integrated results"));
}

#[tokio::test]
async fn test_timeout_counts_as_failure() {
    let config = WorkerPoolConfig {
        task_timeout_minutes: 0.0005,
        ..Default::default()
    };
    let pool = WorkerPool::new(
        config,
        default_roster(),
        Arc::new(SlowExecutor(Duration::from_secs(5))),
        Arc::new(EventDispatcher::new()),
    );

    let team = workers(&pool, &["developer"]).await;
    let assignment = pool.assign(&dev_task("t1"), &team).await.unwrap();
    let err = pool.execute(assignment).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExecutionFailure);
    assert!(err.is_timeout());

    let developer = pool.worker("developer").await.unwrap();
    assert_eq!(developer.status, WorkerStatus::Active);
    assert_eq!(developer.performance.tasks_completed, 1);
    assert_eq!(developer.performance.success_rate, 0.0);
    assert_eq!(developer.performance.quality_score, 83.0);
}

#[tokio::test]
async fn test_worker_error_emits_task_failed() {
    let dispatcher = Arc::new(EventDispatcher::new());
    let (handler, mut receiver) = ChannelEventHandler::new();
    dispatcher.register(Arc::new(handler));
    let pool = WorkerPool::new(
        WorkerPoolConfig::default(),
        default_roster(),
        Arc::new(FailingExecutor),
        dispatcher,
    );

    let team = workers(&pool, &["developer", "tester"]).await;
    let assignment = pool.assign(&dev_task("t1"), &team).await.unwrap();
    let err = pool.execute(assignment).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExecutionFailure);
    assert!(!err.is_timeout());

    match receiver.try_recv() {
        Ok(OrchestratorEvent::TaskFailed { task_id, worker_ids, .. }) => {
            assert_eq!(task_id, "t1");
            assert_eq!(worker_ids.len(), 2);
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_cancellation_leaves_performance_untouched() {
    let pool = pool_with(Arc::new(SlowExecutor(Duration::from_secs(5))));
    let team = workers(&pool, &["developer", "tester"]).await;
    let assignment = pool.assign(&dev_task("t1"), &team).await.unwrap();
    assert_eq!(assignment.strategy, CoordinationStrategy::Parallel);

    let token = CancellationToken::new();
    let (result, _) = tokio::join!(pool.execute_with_cancel(assignment, &token), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    let err = result.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    for id in ["developer", "tester"] {
        let worker = pool.worker(id).await.unwrap();
        assert_eq!(worker.status, WorkerStatus::Active);
        assert_eq!(worker.load, 0);
        assert_eq!(worker.performance.tasks_completed, 0);
        assert_eq!(worker.performance.quality_score, 85.0);
    }
}

#[tokio::test]
async fn test_shared_worker_runs_assignments_one_at_a_time() {
    let executor = Arc::new(OverlapExecutor::new(Duration::from_millis(100)));
    let pool = pool_with(executor.clone());
    let team = workers(&pool, &["developer"]).await;

    let first = pool.assign(&dev_task("t1"), &team).await.unwrap();
    let second = pool.assign(&dev_task("t2"), &team).await.unwrap();
    assert_eq!(pool.worker("developer").await.unwrap().load, 2);

    let (first, second, _) = tokio::join!(pool.execute(first), pool.execute(second), async {
        // first assignment running, second queued behind it
        tokio::time::sleep(Duration::from_millis(50)).await;
        let developer = pool.worker("developer").await.unwrap();
        assert_eq!(developer.status, WorkerStatus::Busy);
        assert_eq!(developer.load, 2);

        // second assignment running after the handoff
        tokio::time::sleep(Duration::from_millis(100)).await;
        let developer = pool.worker("developer").await.unwrap();
        assert_eq!(developer.status, WorkerStatus::Busy);
        assert_eq!(developer.load, 1);
        assert!(pool.select_for_roles(&[WorkerRole::Developer]).await.is_empty());
    });
    first.unwrap();
    second.unwrap();

    assert_eq!(executor.peak.load(Ordering::SeqCst), 1);
    let developer = pool.worker("developer").await.unwrap();
    assert_eq!(developer.status, WorkerStatus::Active);
    assert_eq!(developer.load, 0);
    assert_eq!(developer.performance.tasks_completed, 2);
    assert_eq!(pool.pending_assignments().await, 0);
}

#[tokio::test]
async fn test_cancelling_queued_assignment_keeps_running_worker_busy() {
    let pool = pool_with(Arc::new(SlowExecutor(Duration::from_millis(150))));
    let team = workers(&pool, &["developer"]).await;
    let running = pool.assign(&dev_task("t1"), &team).await.unwrap();
    let queued = pool.assign(&dev_task("t2"), &team).await.unwrap();

    let token = CancellationToken::new();
    let (running, queued, _) = tokio::join!(
        pool.execute(running),
        pool.execute_with_cancel(queued, &token),
        async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            token.cancel();
            tokio::time::sleep(Duration::from_millis(30)).await;

            let developer = pool.worker("developer").await.unwrap();
            assert_eq!(developer.status, WorkerStatus::Busy);
            assert_eq!(developer.load, 1);
            assert!(pool.select_for_roles(&[WorkerRole::Developer]).await.is_empty());
            assert_eq!(pool.pending_assignments().await, 1);
        }
    );

    assert!(queued.unwrap_err().is_cancelled());
    running.unwrap();

    let developer = pool.worker("developer").await.unwrap();
    assert_eq!(developer.status, WorkerStatus::Active);
    assert_eq!(developer.load, 0);
    assert_eq!(developer.performance.tasks_completed, 1);
}

#[tokio::test]
async fn test_dropped_execution_releases_workers() {
    let pool = pool_with(Arc::new(SlowExecutor(Duration::from_millis(100))));
    let team = workers(&pool, &["developer", "tester"]).await;

    let assignment = pool.assign(&dev_task("t1"), &team).await.unwrap();
    let outcome = tokio::time::timeout(Duration::from_millis(20), pool.execute(assignment)).await;
    assert!(outcome.is_err());

    // release runs on a spawned task
    tokio::time::sleep(Duration::from_millis(20)).await;
    for id in ["developer", "tester"] {
        let worker = pool.worker(id).await.unwrap();
        assert_eq!(worker.status, WorkerStatus::Active);
        assert_eq!(worker.load, 0);
        assert_eq!(worker.performance.tasks_completed, 0);
    }
    assert_eq!(pool.pending_assignments().await, 0);

    // permits came back, so the same workers run the next assignment
    let next = pool.assign(&dev_task("t2"), &team).await.unwrap();
    let result = tokio::time::timeout(Duration::from_secs(1), pool.execute(next)).await;
    assert!(result.unwrap().is_ok());

    // dropping an assignment that is still queued only gives back its load
    let running = pool.assign(&dev_task("t3"), &team).await.unwrap();
    let queued = pool.assign(&dev_task("t4"), &team).await.unwrap();
    let (running, dropped) = tokio::join!(
        pool.execute(running),
        tokio::time::timeout(Duration::from_millis(20), pool.execute(queued)),
    );
    assert!(dropped.is_err());
    running.unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    let developer = pool.worker("developer").await.unwrap();
    assert_eq!(developer.status, WorkerStatus::Active);
    assert_eq!(developer.load, 0);
    assert_eq!(developer.performance.tasks_completed, 2);
}

#[tokio::test]
async fn test_shutdown_takes_workers_offline() {
    let pool = pool_with(Arc::new(SimulatedExecutor::instant()));
    let team = workers(&pool, &["developer"]).await;

    pool.shutdown().await;
    assert!(pool.is_shut_down());

    let summary = pool.summary().await;
    assert_eq!(summary.total_workers, 9);
    assert_eq!(summary.offline, 9);
    assert!(pool.select_for_roles(&[WorkerRole::Developer]).await.is_empty());

    let err = pool.assign(&dev_task("t1"), &team).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn test_summary_averages() {
    let pool = pool_with(Arc::new(SimulatedExecutor::instant()));
    let summary = pool.summary().await;
    assert_eq!(summary.idle, 9);
    assert_eq!(summary.average_quality, 85.0);
    assert_eq!(summary.average_success_rate, 100.0);

    let team = workers(&pool, &["developer"]).await;
    let assignment = pool.assign(&dev_task("t1"), &team).await.unwrap();
    pool.execute(assignment).await.unwrap();

    let summary = pool.summary().await;
    assert_eq!(summary.active, 1);
    assert_eq!(summary.idle, 8);
    assert_eq!(summary.total_tasks_completed, 1);
    // (8 * 85 + 85.5) / 9
    assert_eq!(summary.average_quality, 85.06);
    assert_eq!(pool.status_overview().await.len(), 9);
}

#[tokio::test]
async fn test_duplicate_roster_ids_are_skipped() {
    let roster = vec![
        WorkerDefinition::new("dev", "Dev", WorkerRole::Developer),
        WorkerDefinition::new("dev", "Dev Again", WorkerRole::Tester),
    ];
    let pool = WorkerPool::new(
        WorkerPoolConfig::default(),
        roster,
        Arc::new(SimulatedExecutor::instant()),
        Arc::new(EventDispatcher::new()),
    );
    let all = pool.all_workers().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].name, "Dev");
}

#[test]
fn test_reconcile_findings_majority_and_quality() {
    let output = |worker_id: &str, findings: &[&str]| WorkerOutput {
        worker_id: worker_id.to_string(),
        role: WorkerRole::Analyst,
        action: StepAction::Analyze,
        output: WorkOutput {
            findings: findings.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        },
        duration_ms: 0,
    };
    let analyses = vec![
        output("a", &["shared", "cache"]),
        output("b", &["shared", "cache"]),
        output("c", &["shared", "queue"]),
        output("d", &["queue"]),
    ];
    let quality = HashMap::from([
        ("a".to_string(), 80.0),
        ("b".to_string(), 90.0),
        ("c".to_string(), 70.0),
        ("d".to_string(), 95.0),
    ]);

    let (consensus, conflicts) = coordination::reconcile_findings(&analyses, &quality);
    // 3 of 4 is a majority, 2 of 4 is not
    assert_eq!(consensus, vec!["shared".to_string()]);
    assert_eq!(conflicts.len(), 2);
    assert_eq!(conflicts[0].finding, "cache");
    assert_eq!(conflicts[0].decided_by, "b");
    assert_eq!(conflicts[1].finding, "queue");
    assert_eq!(conflicts[1].decided_by, "d");
}
