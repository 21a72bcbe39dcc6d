//! # Task Orchestrator
//!
//! Coordination core for teams of specialized agent workers. Large tasks are
//! scored and split into shards, shared context lives in a dependency-aware
//! cache, workers cooperate under a strategy picked per task, and every
//! stage is metered against a manual baseline.
//!
//! ## Architecture Overview
//!
//! - **[`task`]**: Task model, complexity scoring and sharding strategies
//! - **[`context`]**: Dependency-aware context cache with compression and eviction
//! - **[`worker`]**: Worker roster, coordination strategies and the execution pool
//! - **[`cost`]**: Usage and time-savings tracking with recommendations
//! - **[`orchestrator`]**: Project lifecycle from planning through execution
//! - **[`events`]**: Notifications emitted by every subsystem
//!
//! ## Features
//!
//! ### Task Sharding
//! - **Complexity Scoring**: Description length and dependency count, floored at a per-type
//!   baseline and scaled by priority. Effort and risk decide sharding separately
//! - **Five Strategies**: Layered, feature, user-story, complexity and time-boxed splits
//! - **Stable Ids**: Shards are named after their parent so dependencies can be rewritten
//!
//! ### Worker Coordination
//! - **Role-Aware Selection**: The available worker with the best quality score less ten
//!   points per pending assignment gets the work
//! - **Cooperation Modes**: Parallel, sequential, hierarchical and collaborative workflows
//! - **Timeouts and Cancellation**: Every step is bounded and can be interrupted
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use task_orchestrator::{FunctionalRequirement, Orchestrator, OrchestratorConfig, ProjectDraft};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = OrchestratorConfig::discover()?;
//!     task_orchestrator::telemetry::init_tracing(config.log_level());
//!
//!     let orchestrator = Orchestrator::new(config);
//!     let project = orchestrator.create_project(
//!         ProjectDraft::new("Web Shop", "An online shop with accounts and payments")
//!             .with_requirement(FunctionalRequirement::new(
//!                 "R1",
//!                 "User authentication",
//!                 "The system shall let users sign in",
//!             )),
//!     )?;
//!
//!     let report = orchestrator.start(project).await?;
//!     println!("{} tasks completed", report.tasks.len());
//!
//!     orchestrator.shutdown().await;
//!     Ok(())
//! }
//! ```

/// Orchestrator configuration and file discovery.
pub mod config;

/// Dependency-aware context cache.
///
/// Stores project, story, task and worker context with dependency edges,
/// compresses large payloads and evicts by importance and access history.
pub mod context;

/// Usage and savings accounting.
pub mod cost;

/// Environment constants and path utilities.
pub mod env;

/// Structured error type shared by every subsystem.
pub mod error;

/// Event types and handler fan-out.
pub mod events;

/// Project lifecycle orchestration.
///
/// Validates projects, runs planning, converts requirements to stories,
/// shards oversized work and executes tasks in dependency order.
pub mod orchestrator;

/// Task model, complexity scoring and sharding.
pub mod task;

/// Tracing subscriber setup.
pub mod telemetry;

/// Worker roster and execution pool.
///
/// Selects workers by role and performance, lays out the cooperation
/// workflow for each assignment and runs it with timeouts and cancellation.
pub mod worker;

pub use config::OrchestratorConfig;
pub use context::{ContextConfig, ContextStore};
pub use cost::{CostConfig, CostReport, CostTracker};
pub use error::{ErrorKind, OrchestratorError, Result};
pub use events::{EventDispatcher, EventHandler, OrchestratorEvent};
pub use orchestrator::{
    ExecutionReport, FunctionalRequirement, Orchestrator, PipelineConfig, Project, ProjectDraft,
};
pub use task::{Task, TaskPriority, TaskSharder, TaskStatus, TaskType};
pub use worker::{SimulatedExecutor, WorkerExecutor, WorkerPool, WorkerRole};
