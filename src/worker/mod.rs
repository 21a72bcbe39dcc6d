pub mod coordination;
pub mod executor;
pub mod pool;
pub mod types;

#[cfg(test)]
mod tests;

pub use executor::{SimulatedExecutor, WorkerExecutor};
pub use pool::WorkerPool;
pub use types::*;
