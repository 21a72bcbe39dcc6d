pub mod compression;
pub mod graph;
pub mod store;
pub mod types;


pub use graph::DependencyGraph;
pub use store::{ContextStore, task_importance};
pub use types::*;
