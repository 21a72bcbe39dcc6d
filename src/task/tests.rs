use super::*;
use crate::error::ErrorKind;

fn task(id: &str, task_type: TaskType) -> Task {
    Task::new(id, format!("Task {}", id), "Implement a small piece of work", task_type)
}

fn words(count: usize) -> String {
    vec!["word"; count].join(" ")
}

#[test]
fn test_score_uses_type_baseline() {
    let dev = task("dev", TaskType::Development);
    assert_eq!(score(&dev), 7);

    let arch = task("arch", TaskType::ArchitectureDesign).with_priority(TaskPriority::Critical);
    assert_eq!(score(&arch), 10);

    let docs = task("docs", TaskType::Documentation);
    // base 5 beats the documentation baseline of 3
    assert_eq!(score(&docs), 5);
}

#[test]
fn test_score_description_and_dependency_factors() {
    let mut review = task("review", TaskType::Review).with_priority(TaskPriority::High);
    review.description = words(150);
    let parts = complexity::breakdown(&review);
    assert_eq!(parts.length_bonus, 2.0);
    assert_eq!(parts.score, 8);

    review.description = words(250);
    assert_eq!(complexity::breakdown(&review).length_bonus, 4.0);

    let deps: Vec<String> = (0..10).map(|i| format!("dep-{}", i)).collect();
    let docs = task("docs", TaskType::Documentation)
        .with_priority(TaskPriority::Low)
        .with_dependencies(deps);
    let parts = complexity::breakdown(&docs);
    assert_eq!(parts.dependency_bonus, 3.0);
    assert_eq!(parts.score, 7);
}

#[test]
fn test_simple_low_risk_small_tasks_never_shard() {
    let types = [
        TaskType::RequirementsAnalysis,
        TaskType::ArchitectureDesign,
        TaskType::StoryCreation,
        TaskType::Development,
        TaskType::Testing,
        TaskType::Deployment,
        TaskType::Documentation,
        TaskType::Review,
    ];
    let priorities = [
        TaskPriority::Critical,
        TaskPriority::High,
        TaskPriority::Medium,
        TaskPriority::Low,
    ];

    for task_type in types {
        for priority in priorities {
            for hours in [0.0, 2.5, 8.0] {
                let t = task("t", task_type)
                    .with_priority(priority)
                    .with_effort(hours, Complexity::Simple, RiskLevel::Low);
                assert!(
                    !should_shard(&t),
                    "{:?}/{:?}/{} should not shard",
                    task_type,
                    priority,
                    hours
                );
            }
        }
    }
}

#[test]
fn test_should_shard_triggers() {
    let big = task("big", TaskType::Testing).with_effort(9.0, Complexity::Simple, RiskLevel::Low);
    assert!(should_shard(&big));

    let risky = task("risky", TaskType::Testing).with_effort(1.0, Complexity::Simple, RiskLevel::High);
    assert!(should_shard(&risky));

    let intricate = task("arch", TaskType::ArchitectureDesign)
        .with_effort(2.0, Complexity::Complex, RiskLevel::Low);
    assert!(should_shard(&intricate));

    let plain = task("dev", TaskType::Development).with_effort(4.0, Complexity::Medium, RiskLevel::Low);
    assert!(!should_shard(&plain));
}

#[test]
fn test_strategy_selection_precedence() {
    let sharder = TaskSharder::default();

    let arch_critical = task("a", TaskType::ArchitectureDesign).with_priority(TaskPriority::Critical);
    assert_eq!(
        sharder.select_strategy(&arch_critical),
        ShardingStrategy::LayeredArchitecture
    );

    // score 8 is not above the layered threshold but still above 7
    let arch_medium = task("b", TaskType::ArchitectureDesign);
    assert_eq!(
        sharder.select_strategy(&arch_medium),
        ShardingStrategy::ComplexityBased
    );

    let dev_large = task("c", TaskType::Development).with_effort(12.0, Complexity::Medium, RiskLevel::Low);
    assert_eq!(
        sharder.select_strategy(&dev_large),
        ShardingStrategy::FeatureDecomposition
    );

    let analysis = task("d", TaskType::RequirementsAnalysis);
    assert_eq!(
        sharder.select_strategy(&analysis),
        ShardingStrategy::UserStoryBreakdown
    );

    let testing = task("e", TaskType::Testing);
    assert_eq!(sharder.select_strategy(&testing), ShardingStrategy::TimeBoxed);
}

#[test]
fn test_time_boxed_sharding_splits_hours() {
    let sharder = TaskSharder::default();
    let parent = task("qa", TaskType::Testing)
        .with_effort(10.0, Complexity::Medium, RiskLevel::Low)
        .with_dependencies(["setup"]);

    let shards = sharder.shard(&parent).unwrap();
    assert_eq!(shards.len(), 3);

    let hours: Vec<f64> = shards.iter().map(|s| s.effort.estimated_hours).collect();
    assert_eq!(hours, vec![4.0, 4.0, 2.0]);

    assert_eq!(shards[0].id, "qa_shard_0");
    assert_eq!(shards[0].dependencies, vec!["setup".to_string()]);
    assert_eq!(shards[1].dependencies, vec!["qa_shard_0".to_string()]);
    assert_eq!(shards[2].dependencies, vec!["qa_shard_1".to_string()]);
    assert_eq!(shards[2].title, "Task qa - Part 3/3");

    for shard in &shards {
        assert_eq!(shard.parent_id.as_deref(), Some("qa"));
        assert_eq!(shard.status, TaskStatus::Backlog);
        assert!(!shard.dependencies.contains(&shard.id));
    }
}

#[test]
fn test_time_boxed_sharding_caps_box_count() {
    let sharder = TaskSharder::default();
    let parent = task("soak", TaskType::Testing).with_effort(1.0e9, Complexity::Medium, RiskLevel::Low);

    let shards = sharder.shard(&parent).unwrap();
    assert_eq!(shards.len(), MAX_TIME_BOXES);
    assert!(shards.iter().all(|s| s.effort.estimated_hours == 5.0e7));
    assert_eq!(shards[19].title, "Task soak - Part 20/20");
    assert_eq!(shards[19].dependencies, vec!["soak_shard_18".to_string()]);

    // just under the cap keeps the configured box length
    let parent = task("long", TaskType::Testing).with_effort(78.0, Complexity::Medium, RiskLevel::Low);
    let shards = sharder.shard(&parent).unwrap();
    assert_eq!(shards.len(), 20);
    assert_eq!(shards[0].effort.estimated_hours, 4.0);
    assert_eq!(shards[19].effort.estimated_hours, 2.0);
}

#[test]
fn test_sharding_is_idempotent_on_ids() {
    let sharder = TaskSharder::default();
    let parent = task("arch", TaskType::ArchitectureDesign).with_priority(TaskPriority::Critical);

    let first: Vec<TaskId> = sharder.shard(&parent).unwrap().into_iter().map(|t| t.id).collect();
    let second: Vec<TaskId> = sharder.shard(&parent).unwrap().into_iter().map(|t| t.id).collect();

    assert_eq!(first, second);
    assert_eq!(
        first,
        vec!["arch_shard_0", "arch_shard_1", "arch_shard_2", "arch_shard_3"]
    );
    assert_eq!(sharder.stats().total_tasks_sharded, 1);
}

#[test]
fn test_layered_sharding_chains_layers() {
    let sharder = TaskSharder::default();
    let parent = task("sys", TaskType::ArchitectureDesign)
        .with_priority(TaskPriority::Critical)
        .with_effort(8.0, Complexity::Complex, RiskLevel::Medium);

    let shards = sharder.shard(&parent).unwrap();
    assert_eq!(shards.len(), 4);
    assert!(shards[0].title.ends_with("Presentation Layer"));
    assert!(shards[3].title.ends_with("Integration Layer"));
    assert!(shards.iter().all(|s| s.effort.estimated_hours == 2.0));
    assert!(shards[0].dependencies.is_empty());
    assert_eq!(shards[2].dependencies, vec!["sys_shard_1".to_string()]);

    let record = sharder.history("sys").unwrap();
    assert_eq!(record.strategy, ShardingStrategy::LayeredArchitecture);
    assert_eq!(record.subtasks.len(), 4);
}

#[test]
fn test_feature_decomposition_uses_list_items() {
    let sharder = TaskSharder::default();
    let mut parent = task("web", TaskType::Development).with_effort(12.0, Complexity::Complex, RiskLevel::Medium);
    parent.description = "Build the following:\n\
        - User login form with validation\n\
        - Session storage using the login tokens\n\
        - Profile page for users"
        .to_string();

    let shards = sharder.shard(&parent).unwrap();
    assert_eq!(shards.len(), 3);
    assert_eq!(shards[0].title, "Implement User login form with validation");
    assert!(shards.iter().all(|s| s.effort.estimated_hours == 4.0));
    assert!(shards.iter().all(|s| s.acceptance_criteria.len() == 3));

    // "using" marks a prerequisite on the previous feature
    assert_eq!(shards[1].dependencies, vec!["web_shard_0".to_string()]);
    assert!(shards[2].dependencies.is_empty());
}

#[test]
fn test_user_story_breakdown_parses_stories() {
    let sharder = TaskSharder::default();
    let mut parent = task("req", TaskType::RequirementsAnalysis)
        .with_effort(6.0, Complexity::Medium, RiskLevel::Low)
        .with_dependencies(["project"]);
    parent.description = "As a registered user, I want to log in so that I can see my dashboard. \
        As an admin, I want to manage accounts so that access stays controlled."
        .to_string();

    let shards = sharder.shard(&parent).unwrap();
    assert_eq!(shards.len(), 2);

    let story = shards[0].user_story.as_ref().unwrap();
    assert_eq!(story.persona, "registered user");
    assert_eq!(story.want, "log in");
    assert_eq!(story.benefit, "I can see my dashboard");
    assert_eq!(shards[1].user_story.as_ref().unwrap().persona, "admin");

    assert!(shards.iter().all(|s| s.effort.estimated_hours == 3.0));
    assert_eq!(shards[0].dependencies, vec!["project".to_string()]);
    assert!(shards[1].dependencies.is_empty());
}

#[test]
fn test_user_story_breakdown_falls_back_to_sentences() {
    let sharder = TaskSharder::default();
    let mut parent = task("req", TaskType::RequirementsAnalysis);
    parent.description = "Customers browse the product catalog. Customers pay with a card.".to_string();

    let shards = sharder.shard(&parent).unwrap();
    assert_eq!(shards.len(), 2);
    let story = shards[1].user_story.as_ref().unwrap();
    assert_eq!(story.persona, "user");
    assert_eq!(story.want, "Customers pay with a card");
}

#[test]
fn test_complexity_based_sharding_weights_hours() {
    let sharder = TaskSharder::default();
    let parent = task("svc", TaskType::ArchitectureDesign).with_effort(15.0, Complexity::Complex, RiskLevel::Medium);

    let shards = sharder.shard(&parent).unwrap();
    assert_eq!(
        sharder.history("svc").unwrap().strategy,
        ShardingStrategy::ComplexityBased
    );
    let hours: Vec<f64> = shards.iter().map(|s| s.effort.estimated_hours).collect();
    assert_eq!(hours, vec![6.0, 3.0, 4.0, 2.0]);
    assert_eq!(shards[0].effort.complexity, Complexity::Complex);
    assert_eq!(shards[3].effort.complexity, Complexity::Simple);
    for shard in &shards[1..] {
        assert_eq!(shard.dependencies, vec!["svc_shard_0".to_string()]);
    }
}

#[test]
fn test_shard_rejects_malformed_tasks() {
    let sharder = TaskSharder::default();

    let looped = task("loop", TaskType::Testing).with_dependencies(["loop"]);
    let err = sharder.shard(&looped).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.entity_id(), "loop");

    let mut empty = task("empty", TaskType::Testing).with_effort(0.0, Complexity::Simple, RiskLevel::Low);
    empty.description = String::new();
    assert_eq!(sharder.shard(&empty).unwrap_err().kind(), ErrorKind::Validation);
    assert!(sharder.history("empty").is_none());
}

#[test]
fn test_sharding_stats() {
    let sharder = TaskSharder::default();
    assert_eq!(sharder.stats().average_subtasks_per_task, 0.0);

    let arch = task("arch", TaskType::ArchitectureDesign).with_priority(TaskPriority::Critical);
    let qa = task("qa", TaskType::Testing).with_effort(10.0, Complexity::Medium, RiskLevel::Low);
    sharder.shard(&arch).unwrap();
    sharder.shard(&qa).unwrap();

    let stats = sharder.stats();
    assert_eq!(stats.total_tasks_sharded, 2);
    assert_eq!(stats.total_subtasks, 7);
    assert_eq!(stats.average_subtasks_per_task, 3.5);
    assert_eq!(
        stats.strategies_used.get(&ShardingStrategy::TimeBoxed),
        Some(&1)
    );
}

#[test]
fn test_task_validation() {
    let mut t = task("v", TaskType::Review);
    assert!(t.validate().is_ok());

    t.title = "  ".to_string();
    assert_eq!(t.validate().unwrap_err().kind(), ErrorKind::Validation);
}

#[test]
fn test_task_enums_serialize_kebab_case() {
    assert_eq!(
        serde_json::to_value(TaskType::RequirementsAnalysis).unwrap(),
        serde_json::json!("requirements-analysis")
    );
    assert_eq!(
        serde_json::to_value(TaskStatus::InProgress).unwrap(),
        serde_json::json!("in-progress")
    );
    let parsed: TaskType = serde_json::from_value(serde_json::json!("design")).unwrap();
    assert_eq!(parsed, TaskType::ArchitectureDesign);

    let t = task("ser", TaskType::StoryCreation);
    let value = serde_json::to_value(&t).unwrap();
    assert_eq!(value["type"], "story-creation");
}
