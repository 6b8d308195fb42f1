mod cache;
pub mod consolidate;
pub mod repair;

pub use cache::*;
pub use consolidate::{ConsolidatedDataset, Consolidation, Consolidator, Error, Reading};
