//! Developer tooling: read-only inspection of a running level.
//!
//! # Invariants
//! - Tools never mutate the level they inspect.

pub mod inspector;

pub use inspector::{LevelInspector, LevelSummary, PlacementInfo};
