use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Kind of pooled instance. Each kind is backed by its own pool with an
/// independent capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PoolKind {
    Block,
    Enemy,
    Projectile,
}

impl PoolKind {
    pub fn label(self) -> &'static str {
        match self {
            PoolKind::Block => "block",
            PoolKind::Enemy => "enemy",
            PoolKind::Projectile => "projectile",
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

static POOL_COUNTER: AtomicU32 = AtomicU32::new(1);

/// Process-unique identity of one pool.
///
/// Zero is never allocated and marks a handle no pool issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolId(u32);

impl PoolId {
    pub const UNOWNED: PoolId = PoolId(0);

    /// Allocate a fresh id. Thread-safe.
    pub fn next() -> Self {
        Self(POOL_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one pooled instance.
///
/// `pool` names the issuing pool, so two pools of the same kind never hand
/// out equal handles. `slot` addresses the instance inside its pool;
/// `generation` is bumped on every acquire, so a handle kept past a release
/// no longer matches the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId {
    pub pool: PoolId,
    pub kind: PoolKind,
    pub slot: u32,
    pub generation: u32,
}

impl InstanceId {
    pub fn new(pool: PoolId, kind: PoolKind, slot: u32, generation: u32) -> Self {
        Self {
            pool,
            kind,
            slot,
            generation,
        }
    }

    /// A handle with no issuing pool, for lookups and fixtures.
    pub fn unowned(kind: PoolKind, slot: u32, generation: u32) -> Self {
        Self::new(PoolId::UNOWNED, kind, slot, generation)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}#{}.{}", self.kind, self.pool, self.slot, self.generation)
    }
}

/// Spatial transform: position, rotation, scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    /// Identity transform translated to `position`.
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}
