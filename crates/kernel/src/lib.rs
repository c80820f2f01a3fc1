//! Level kernel: owns one streamed level and steps it tick by tick.
//!
//! # Invariants
//! - Every mutation flows through an explicit operation on [`Level`].
//! - Given the same seed, configuration and agent path, a level produces
//!   identical state.
//! - Deferred actions never touch an instance that is no longer active.

pub mod level;
pub mod schedule;

pub use level::{Level, LevelError};
pub use schedule::{Deferred, DeferredAction, DeferredQueue, TimerId};
