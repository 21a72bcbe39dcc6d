pub mod tracker;
pub mod types;


pub use tracker::CostTracker;
pub use types::*;
