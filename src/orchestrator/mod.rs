//! Project lifecycle: validation, planning, story conversion, sharding and
//! dependency-ordered execution across the worker pool.

#[allow(clippy::module_inception)]
pub mod orchestrator;
pub mod pipeline;
pub mod project;


pub use orchestrator::{
    ExecutionReport, HealthReport, Orchestrator, OrchestratorMetrics, OrchestratorStatus,
    RunMetrics, RunStatus, StageReport,
};
pub use pipeline::PipelineConfig;
pub use project::*;
