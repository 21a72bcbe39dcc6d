pub mod complexity;
pub mod sharder;
pub mod types;

#[cfg(test)]
mod tests;

pub use complexity::{ComplexityBreakdown, score, should_shard};
pub use sharder::*;
pub use types::*;
