//! Streaming: spiral level generation, spatial grid, enemy spawning and
//! the per-tick streaming policy.
//!
//! # Invariants
//! - The grid and the active placement list change together; no caller
//!   ever observes one without the other.
//! - Live placements never exceed `max_blocks_in_memory`; overflow
//!   relocates the farthest placement instead of acquiring a new block.
//! - Streaming work scales with agent movement, not tick count.
//! - Validation failures and pool exhaustion are routine and never abort
//!   a tick.

mod config;
mod events;
mod generator;
mod grid;
mod policy;
mod spawner;
pub mod spiral;

pub use config::{
    ConfigError, EnemyConfig, GridConfig, LevelConfig, PoolConfig, RowConfig, SpiralConfig,
    StreamingConfig,
};
pub use events::{EventHub, ListenerId, StreamEvent};
pub use generator::{
    GenerationTotals, Generator, GeneratorError, GeneratorState, Placement, SectionReport,
    VisibilityDelta,
};
pub use grid::{CellCoord, GridEntry, GridError, SpatialGrid};
pub use policy::{StreamStats, StreamingPolicy, TickTimer};
pub use spawner::{EnemySlot, SpawnRejection, Spawner};
pub use spiral::SpiralCursor;
