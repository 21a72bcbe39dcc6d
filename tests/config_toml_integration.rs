use task_orchestrator::OrchestratorConfig;
use task_orchestrator::worker::{WorkerDefinition, WorkerRole};
use tempfile::NamedTempFile;

#[test]
fn test_config_serialization_roundtrip() {
    let mut original_config = OrchestratorConfig::default();
    original_config.roster = vec![
        WorkerDefinition::new("lead", "Tech Lead", WorkerRole::Architect)
            .with_capabilities(&["system design"]),
    ];

    let toml_str = original_config
        .to_toml_string()
        .expect("Should be able to serialize config to TOML");
    assert!(!toml_str.is_empty(), "TOML string should not be empty");

    let deserialized_config = OrchestratorConfig::from_toml_str(&toml_str)
        .expect("Should be able to deserialize TOML string");

    assert_eq!(original_config.roster, deserialized_config.roster);
    assert_eq!(original_config.cost, deserialized_config.cost);
    assert_eq!(original_config.pipeline, deserialized_config.pipeline);
    assert_eq!(
        original_config.workers.max_concurrent_tasks,
        deserialized_config.workers.max_concurrent_tasks
    );
    assert_eq!(
        original_config.context.capacity,
        deserialized_config.context.capacity
    );
}

#[test]
fn test_config_file_operations() {
    let mut original_config = OrchestratorConfig::default();
    original_config.log_level = Some("debug".to_string());
    original_config.workers.task_timeout_minutes = 2.5;

    let temp_file = NamedTempFile::new().expect("Should be able to create temporary file");
    let temp_path = temp_file.path();

    original_config
        .to_toml_file(temp_path)
        .expect("Should be able to save config to file");

    let loaded_config =
        OrchestratorConfig::from_toml_file(temp_path).expect("Should be able to load config from file");

    assert_eq!(loaded_config.log_level(), "debug");
    assert_eq!(loaded_config.workers.task_timeout_minutes, 2.5);
    assert_eq!(
        loaded_config.sharding.max_chunk_hours,
        original_config.sharding.max_chunk_hours
    );
}

#[test]
fn test_config_toml_structure() {
    let config = OrchestratorConfig::default();
    let toml_str = config.to_toml_string().expect("Should be able to serialize config");

    for section in ["[context]", "[sharding]", "[workers]", "[cost]", "[pipeline]"] {
        assert!(toml_str.contains(section), "Should contain {} section", section);
    }
    assert!(toml_str.contains("max_concurrent_tasks"));
    assert!(toml_str.contains("shutdown_grace_period_secs"));
    assert!(!toml_str.contains("log_level"), "Unset log level is omitted");
    assert!(!toml_str.contains("[[roster]]"), "Empty roster is omitted");
}

#[test]
fn test_config_error_handling() {
    let missing = OrchestratorConfig::from_toml_file("/nonexistent/orchestrator.toml");
    let error = missing.expect_err("Missing file should fail");
    assert!(error.to_string().contains("Failed to read config file"));

    let invalid = OrchestratorConfig::from_toml_str("[context\ncapacity = 10");
    let error = invalid.expect_err("Malformed TOML should fail");
    assert!(error.to_string().contains("Failed to parse TOML configuration"));

    let unknown_role = OrchestratorConfig::from_toml_str(
        r#"
        [[roster]]
        id = "x"
        name = "X"
        role = "astronaut"
        "#,
    );
    assert!(unknown_role.is_err(), "Unknown worker role should be rejected");
}

#[test]
fn test_empty_config_uses_defaults() {
    let config = OrchestratorConfig::from_toml_str("").expect("Empty TOML is valid");
    let defaults = OrchestratorConfig::default();

    assert_eq!(config.cost, defaults.cost);
    assert_eq!(config.pipeline, defaults.pipeline);
    assert_eq!(config.context.capacity, defaults.context.capacity);
    assert!(config.roster.is_empty());
}
