use glam::{Quat, Vec3};
use rand::Rng;
use spiralstream_common::{InstanceId, PoolKind, Transform};
use spiralstream_pool::{Enemy, ObjectPool};

use crate::config::{ConfigError, EnemyConfig, LevelConfig};
use crate::events::{EventHub, StreamEvent};
use crate::generator::Placement;
use crate::grid::SpatialGrid;

/// A live enemy and the placement it stands on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnemySlot {
    pub id: InstanceId,
    pub position: Vec3,
    pub foothold: Vec3,
    pub spawned_tick: u64,
}

/// Why a spawn attempt was turned down. All of these are routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SpawnRejection {
    #[error("geometry overhead leaves too little clearance")]
    Obstructed,
    #[error("another enemy is closer than the minimum separation")]
    TooClose,
    #[error("enemy pool exhausted")]
    PoolExhausted,
}

#[derive(Debug)]
pub struct Spawner {
    config: EnemyConfig,
    enemies: ObjectPool<Enemy>,
    slots: Vec<EnemySlot>,
}

impl Spawner {
    pub fn new(config: &LevelConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut enemies =
            ObjectPool::new(PoolKind::Enemy, config.pools.enemy_capacity, Enemy::default)?;
        enemies.prewarm(config.pools.prewarm);
        Ok(Self {
            config: config.enemies.clone(),
            enemies,
            slots: Vec::new(),
        })
    }

    /// Place an enemy standing on `foothold`.
    ///
    /// Checks run in order: overhead clearance, separation from live
    /// enemies, pool availability. A rejection leaves no side effects.
    pub fn try_spawn_enemy(
        &mut self,
        foothold: Vec3,
        grid: &SpatialGrid,
        tick: u64,
        events: &mut EventHub,
    ) -> Result<InstanceId, SpawnRejection> {
        let position = self.check(foothold, grid)?;
        let Some(id) = self.enemies.acquire() else {
            tracing::debug!("enemy pool exhausted, spawn skipped");
            return Err(SpawnRejection::PoolExhausted);
        };

        if let Some(enemy) = self.enemies.get_mut(id) {
            enemy.transform = Transform {
                rotation: facing_axis(position),
                ..Transform::at(position)
            };
            enemy.enabled = true;
        }
        self.slots.push(EnemySlot {
            id,
            position,
            foothold,
            spawned_tick: tick,
        });
        events.emit(StreamEvent::EnemySpawned { id, position });
        tracing::debug!(%id, ?position, "enemy spawned");
        Ok(id)
    }

    /// Pick a foothold among `candidates` within `spawn_radius` of
    /// `reference` that would pass the clearance and separation checks.
    ///
    /// The scan starts at a random candidate and wraps around.
    pub fn safe_spawn_position<R: Rng + ?Sized>(
        &self,
        reference: Vec3,
        candidates: &[Placement],
        grid: &SpatialGrid,
        rng: &mut R,
    ) -> Option<Vec3> {
        if candidates.is_empty() {
            return None;
        }
        let start = rng.gen_range(0..candidates.len());
        candidates
            .iter()
            .cycle()
            .skip(start)
            .take(candidates.len())
            .map(|p| p.position)
            .find(|&foothold| {
                foothold.distance(reference) <= self.config.spawn_radius
                    && self.check(foothold, grid).is_ok()
            })
    }

    /// Return an enemy to its pool. `None` if it was not live.
    pub fn remove_enemy(&mut self, id: InstanceId, events: &mut EventHub) -> Option<EnemySlot> {
        let index = self.slots.iter().position(|s| s.id == id)?;
        let slot = self.slots.swap_remove(index);
        self.enemies.release(id);
        events.emit(StreamEvent::EnemyRemoved { id });
        Some(slot)
    }

    /// Remove every enemy whose foothold lies farther than `distance` from
    /// `reference`, the same test placements are reclaimed by. Returns the
    /// removed ids.
    pub fn despawn_beyond(
        &mut self,
        reference: Vec3,
        distance: f32,
        events: &mut EventHub,
    ) -> Vec<InstanceId> {
        let (far, near): (Vec<EnemySlot>, Vec<EnemySlot>) = self
            .slots
            .drain(..)
            .partition(|s| s.foothold.distance(reference) > distance);
        self.slots = near;
        for slot in &far {
            self.enemies.release(slot.id);
            events.emit(StreamEvent::EnemyRemoved { id: slot.id });
        }
        if !far.is_empty() {
            tracing::debug!(count = far.len(), distance, "enemies despawned behind agent");
        }
        far.into_iter().map(|s| s.id).collect()
    }

    pub fn release_all(&mut self, events: &mut EventHub) -> Vec<InstanceId> {
        let ids: Vec<InstanceId> = self.slots.drain(..).map(|s| s.id).collect();
        for &id in &ids {
            self.enemies.release(id);
            events.emit(StreamEvent::EnemyRemoved { id });
        }
        ids
    }

    pub fn is_live(&self, id: InstanceId) -> bool {
        self.slots.iter().any(|s| s.id == id)
    }

    pub fn slot(&self, id: InstanceId) -> Option<&EnemySlot> {
        self.slots.iter().find(|s| s.id == id)
    }

    pub fn slots(&self) -> &[EnemySlot] {
        &self.slots
    }

    pub fn live_count(&self) -> usize {
        self.slots.len()
    }

    pub fn pool(&self) -> &ObjectPool<Enemy> {
        &self.enemies
    }

    pub fn config(&self) -> &EnemyConfig {
        &self.config
    }

    /// Validate a foothold without touching the pool. Returns the enemy's
    /// position on success.
    fn check(&self, foothold: Vec3, grid: &SpatialGrid) -> Result<Vec3, SpawnRejection> {
        let position = foothold + Vec3::Y * self.config.spawn_height;
        let ceiling = position.y + self.config.min_vertical_clearance;
        // Only geometry within half a cell horizontally counts as overhead.
        let footprint = grid.cell_size() * 0.5;
        let base = grid.position_to_cell(foothold);
        let obstructed = grid
            .column_above(
                base,
                self.config.clearance_scan_radius,
                self.config.clearance_scan_height,
            )
            .any(|e| {
                let dx = e.position.x - position.x;
                let dz = e.position.z - position.z;
                e.position.y > foothold.y
                    && e.position.y < ceiling
                    && (dx * dx + dz * dz).sqrt() < footprint
            });
        if obstructed {
            return Err(SpawnRejection::Obstructed);
        }

        if self
            .slots
            .iter()
            .any(|s| s.position.distance(position) < self.config.min_separation)
        {
            return Err(SpawnRejection::TooClose);
        }
        Ok(position)
    }
}

/// Rotation turning an enemy at `position` to face the spiral axis.
fn facing_axis(position: Vec3) -> Quat {
    let dir = Vec3::new(-position.x, 0.0, -position.z).normalize_or_zero();
    if dir == Vec3::ZERO {
        Quat::IDENTITY
    } else {
        Quat::from_rotation_arc(Vec3::NEG_Z, dir)
    }
}
