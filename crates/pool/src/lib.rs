//! Object pools: bounded, recycling storage for streamed instances.
//!
//! # Invariants
//! - `idle + active <= capacity` for every pool at all times.
//! - An instance is handed out to at most one owner at a time.
//! - Invalid releases (foreign, stale, double) are logged and ignored.

mod instances;
mod pool;

pub use instances::{Block, Enemy, Projectile};
pub use pool::{EntryState, ObjectPool, PoolError, PoolStats, Poolable};
