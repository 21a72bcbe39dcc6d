//! Orchestrator configuration and discovery.
//!
//! Every section has defaults, so a config file only needs the keys it
//! changes:
//!
//! ```toml
//! log_level = "debug"
//!
//! [workers]
//! task_timeout_minutes = 10.0
//! max_concurrent_tasks = 4
//!
//! [cost]
//! hourly_cost = 90.0
//! ```

use crate::context::ContextConfig;
use crate::cost::CostConfig;
use crate::env;
use crate::orchestrator::PipelineConfig;
use crate::task::ShardingConfig;
use crate::worker::{WorkerDefinition, WorkerPoolConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env as std_env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Log filter passed to [`crate::telemetry::init_tracing`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    pub context: ContextConfig,
    pub sharding: ShardingConfig,
    pub workers: WorkerPoolConfig,
    pub cost: CostConfig,
    pub pipeline: PipelineConfig,
    /// Fixed worker roster; empty means one worker per role
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub roster: Vec<WorkerDefinition>,
}

impl OrchestratorConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    /// Save configuration to a TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = self.to_toml_string()?;
        std::fs::write(path, content).context("Failed to write config file")
    }

    /// Convert configuration to a TOML string
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(env::DEFAULT_LOG_LEVEL)
    }

    /// Load the first configuration file found in the discovery order, or
    /// defaults when there is none
    pub fn discover() -> Result<Self> {
        match Self::find_config_file() {
            Some(path) => {
                info!("Loading configuration from: {:?}", path);
                Self::from_toml_file(path)
            }
            None => {
                info!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn find_config_file() -> Option<PathBuf> {
        let current_dir = std_env::current_dir().ok();
        let home_dir = std_env::var(env::HOME_ENV_VAR).ok().map(PathBuf::from);
        first_existing(config_candidates(current_dir.as_deref(), home_dir.as_deref()))
    }
}

/// Candidate paths in priority order:
/// `./orchestrator.toml`, `./.orchestrator/config.toml`,
/// `$HOME/.orchestrator/config.toml`
pub fn config_candidates(current_dir: Option<&Path>, home_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(current_dir) = current_dir {
        candidates.push(env::local_config_file_path(current_dir));
        candidates.push(env::project_config_file_path(current_dir));
    }
    if let Some(home_dir) = home_dir {
        candidates.push(env::user_config_file_path(home_dir));
    }
    candidates
}

fn first_existing(candidates: Vec<PathBuf>) -> Option<PathBuf> {
    for candidate in candidates {
        debug!("Checking for config file: {:?}", candidate);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    debug!("No config file found in discovery hierarchy");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::WorkerRole;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.context.capacity, 1000);
        assert_eq!(config.sharding.max_chunk_hours, 4.0);
        assert_eq!(config.workers.task_timeout_minutes, 30.0);
        assert_eq!(config.cost.alert_threshold, 100.0);
        assert_eq!(config.pipeline.planning_baseline_usage, 15_000);
        assert_eq!(config.log_level(), "info");
        assert!(config.roster.is_empty());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = OrchestratorConfig::from_toml_str(
            r#"
            log_level = "debug"

            [workers]
            task_timeout_minutes = 10.0

            [cost.baseline_hours]
            deploy = 3.0

            [[roster]]
            id = "dev-1"
            name = "Dev One"
            role = "developer"
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level(), "debug");
        assert_eq!(config.workers.task_timeout_minutes, 10.0);
        assert_eq!(config.workers.max_concurrent_tasks, 3);
        assert_eq!(config.cost.baseline_hours.get("deploy"), Some(&3.0));
        assert_eq!(config.context.capacity, 1000);
        assert_eq!(config.roster.len(), 1);
        assert_eq!(config.roster[0].role, WorkerRole::Developer);
        assert!(config.roster[0].capabilities.is_empty());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(OrchestratorConfig::from_toml_str("[workers]\ntask_timeout_minutes = \"soon\"").is_err());
    }

    #[test]
    fn test_toml_file_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("orchestrator.toml");

        let mut config = OrchestratorConfig::default();
        config.context.capacity = 50;
        config.cost.hourly_cost = 90.0;
        config.to_toml_file(&path).unwrap();

        let loaded = OrchestratorConfig::from_toml_file(&path).unwrap();
        assert_eq!(loaded.context.capacity, 50);
        assert_eq!(loaded.cost, config.cost);
        assert_eq!(loaded.pipeline, config.pipeline);
    }

    #[test]
    fn test_config_candidates_order() {
        let candidates = config_candidates(Some(Path::new("/work")), Some(Path::new("/home/me")));
        assert_eq!(
            candidates,
            vec![
                PathBuf::from("/work/orchestrator.toml"),
                PathBuf::from("/work/.orchestrator/config.toml"),
                PathBuf::from("/home/me/.orchestrator/config.toml"),
            ]
        );
        assert!(config_candidates(None, None).is_empty());
    }

    #[test]
    fn test_first_existing_candidate_wins() {
        let temp_dir = TempDir::new().unwrap();
        let project_config = env::project_config_file_path(temp_dir.path());
        std::fs::create_dir_all(project_config.parent().unwrap()).unwrap();
        OrchestratorConfig::default()
            .to_toml_file(&project_config)
            .unwrap();

        let found = first_existing(config_candidates(Some(temp_dir.path()), None));
        assert_eq!(found, Some(project_config));
    }
}
