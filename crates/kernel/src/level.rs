use std::time::Instant;

use glam::Vec3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use spiralstream_common::{InstanceId, PoolKind, Transform};
use spiralstream_pool::{ObjectPool, Projectile};
use spiralstream_stream::{
    ConfigError, EventHub, Generator, GeneratorError, LevelConfig, ListenerId, Placement,
    SectionReport, SpawnRejection, Spawner, StreamEvent, StreamStats, StreamingPolicy, TickTimer,
};

use crate::schedule::{DeferredAction, DeferredQueue};

const TICK_HISTORY: usize = 120;

#[derive(Debug, thiserror::Error)]
pub enum LevelError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Generator(#[from] GeneratorError),
}

/// One streamed level: generator, spawner, policy and projectile pool wired
/// together and driven one tick at a time.
///
/// Levels share nothing. Two levels built from the same configuration and
/// seed and fed the same agent path produce identical state and events.
#[derive(Debug)]
pub struct Level {
    config: LevelConfig,
    seed: u64,
    tick: u64,
    rng: ChaCha8Rng,
    generator: Generator,
    spawner: Spawner,
    policy: StreamingPolicy,
    projectiles: ObjectPool<Projectile>,
    deferred: DeferredQueue,
    events: EventHub,
    timer: TickTimer,
}

impl Level {
    /// Build every component from `config`. Fails on invalid configuration.
    pub fn new(config: LevelConfig, seed: u64) -> Result<Self, LevelError> {
        let generator = Generator::new(&config)?;
        let spawner = Spawner::new(&config)?;
        let policy = StreamingPolicy::new(&config);
        let mut projectiles = ObjectPool::new(
            PoolKind::Projectile,
            config.pools.projectile_capacity,
            Projectile::default,
        )
        .map_err(ConfigError::from)?;
        projectiles.prewarm(config.pools.prewarm);

        tracing::info!(seed, radius = generator.radius(), "level created");
        Ok(Self {
            config,
            seed,
            tick: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            generator,
            spawner,
            policy,
            projectiles,
            deferred: DeferredQueue::new(),
            events: EventHub::new(),
            timer: TickTimer::new(TICK_HISTORY),
        })
    }

    /// Seed the level. Returns where the agent should start.
    pub fn generate_initial(&mut self) -> Result<Option<Vec3>, LevelError> {
        Ok(self.generator.generate_initial(&mut self.rng, &mut self.events)?)
    }

    pub fn generate_next_section(&mut self) -> Result<SectionReport, LevelError> {
        Ok(self
            .generator
            .generate_next_section(&mut self.rng, &mut self.events)?)
    }

    pub fn cleanup_old_blocks(&mut self, reference: Vec3, distance: f32) -> usize {
        self.generator
            .cleanup_old_blocks(reference, distance, &mut self.events)
    }

    /// Advance one tick with the agent at `agent`: fire due timers, run the
    /// streaming policy, then drop projectiles of enemies it despawned.
    pub fn step(&mut self, agent: Vec3) -> StreamStats {
        let start = Instant::now();
        self.tick += 1;
        self.run_deferred();
        let stats = self
            .policy
            .update(
                self.tick,
                agent,
                &mut self.generator,
                &mut self.spawner,
                &mut self.rng,
                &mut self.events,
            )
            .clone();
        for enemy in self.policy.despawned().to_vec() {
            self.release_owned_by(enemy);
        }
        self.timer.record(start.elapsed());
        stats
    }

    /// Attempt to place an enemy standing on `foothold`. Failure is routine.
    pub fn try_spawn_enemy(&mut self, foothold: Vec3) -> bool {
        match self.spawn_enemy(foothold) {
            Ok(_) => true,
            Err(reason) => {
                tracing::debug!(%reason, ?foothold, "enemy spawn rejected");
                false
            }
        }
    }

    /// Like [`Level::try_spawn_enemy`] but reports the new id or the reason.
    pub fn spawn_enemy(&mut self, foothold: Vec3) -> Result<InstanceId, SpawnRejection> {
        self.spawner.try_spawn_enemy(
            foothold,
            self.generator.grid(),
            self.tick,
            &mut self.events,
        )
    }

    /// A foothold among the newer placements near `reference` where an enemy
    /// could spawn right now.
    pub fn safe_spawn_position(&mut self, reference: Vec3) -> Option<Vec3> {
        self.spawner.safe_spawn_position(
            reference,
            self.generator.newer_half(),
            self.generator.grid(),
            &mut self.rng,
        )
    }

    /// Return an enemy to its pool, cancelling its timers and releasing its
    /// projectiles.
    pub fn remove_enemy(&mut self, id: InstanceId) -> bool {
        if self.spawner.remove_enemy(id, &mut self.events).is_none() {
            tracing::warn!(%id, "remove_enemy on an enemy that is not live");
            return false;
        }
        self.release_owned_by(id);
        true
    }

    /// Launch a projectile from a live enemy. It is released automatically
    /// after `projectile_lifetime_ticks`.
    pub fn fire_projectile(&mut self, owner: InstanceId, velocity: Vec3) -> Option<InstanceId> {
        let origin = self.spawner.slot(owner)?.position;
        let Some(id) = self.projectiles.acquire() else {
            tracing::debug!(%owner, "projectile pool exhausted");
            return None;
        };
        if let Some(shot) = self.projectiles.get_mut(id) {
            shot.transform = Transform::at(origin);
            shot.velocity = velocity;
            shot.owner = Some(owner);
            shot.enabled = true;
        }
        let due = self.tick + self.config.enemies.projectile_lifetime_ticks;
        self.deferred
            .schedule(due, owner, DeferredAction::ReleaseProjectile(id));
        self.events.emit(StreamEvent::ProjectileFired { id, owner });
        Some(id)
    }

    /// Release a projectile early, cancelling its timer.
    pub fn release_projectile(&mut self, id: InstanceId) -> bool {
        self.deferred.cancel_target(id);
        self.release_projectile_now(id)
    }

    /// Return everything to the pools and rewind. Call
    /// [`Level::generate_initial`] to start again.
    pub fn reset(&mut self) {
        self.generator.reset(&mut self.events);
        self.spawner.release_all(&mut self.events);
        for id in self.projectiles.release_all() {
            self.events.emit(StreamEvent::ProjectileReleased { id });
        }
        self.deferred.clear();
        self.policy.reset();
        self.rng = ChaCha8Rng::seed_from_u64(self.seed);
        self.tick = 0;
        tracing::info!(seed = self.seed, "level reset");
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&StreamEvent) + 'static) -> ListenerId {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.events.set_recording(recording);
    }

    pub fn drain_events(&mut self) -> Vec<StreamEvent> {
        self.events.drain_events()
    }

    pub fn events(&self) -> &[StreamEvent] {
        self.events.events()
    }

    /// Active placements, oldest first.
    pub fn active_geometry(&self) -> &[Placement] {
        self.generator.placements()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn config(&self) -> &LevelConfig {
        &self.config
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    pub fn spawner(&self) -> &Spawner {
        &self.spawner
    }

    pub fn policy(&self) -> &StreamingPolicy {
        &self.policy
    }

    pub fn projectile_pool(&self) -> &ObjectPool<Projectile> {
        &self.projectiles
    }

    pub fn pending_timers(&self) -> usize {
        self.deferred.len()
    }

    pub fn tick_timer(&self) -> &TickTimer {
        &self.timer
    }

    /// Deterministic hash of the streamed state for replay comparison.
    ///
    /// Pool ids are process-unique, so only the pool-local part of each
    /// instance id is hashed.
    pub fn state_hash(&self) -> u64 {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325; // FNV offset basis
        let mix = |h: &mut u64, bytes: &[u8]| {
            for &b in bytes {
                *h ^= b as u64;
                *h = h.wrapping_mul(0x0100_0000_01b3);
            }
        };
        let mix_id = |h: &mut u64, id: InstanceId| {
            mix(h, &[id.kind as u8]);
            mix(h, &id.slot.to_le_bytes());
            mix(h, &id.generation.to_le_bytes());
        };
        let mix_vec = |h: &mut u64, v: Vec3| {
            mix(h, &v.x.to_le_bytes());
            mix(h, &v.y.to_le_bytes());
            mix(h, &v.z.to_le_bytes());
        };

        mix(&mut h, &self.tick.to_le_bytes());
        mix(&mut h, &self.generator.current_angle().to_le_bytes());
        mix(&mut h, &self.generator.current_height().to_le_bytes());
        for p in self.generator.placements() {
            mix_id(&mut h, p.id);
            mix_vec(&mut h, p.position);
            mix(&mut h, &p.row.to_le_bytes());
            mix(&mut h, &[p.connector as u8, p.visible as u8]);
        }
        for slot in self.spawner.slots() {
            mix_id(&mut h, slot.id);
            mix_vec(&mut h, slot.position);
        }
        for (id, shot) in self.projectiles.iter_active() {
            mix_id(&mut h, id);
            mix_vec(&mut h, shot.transform.position);
        }
        h
    }

    fn run_deferred(&mut self) {
        for deferred in self.deferred.pop_due(self.tick) {
            match deferred.action {
                DeferredAction::ReleaseProjectile(id) => {
                    // The projectile may have been released and its slot reused.
                    if self.projectiles.is_active(id) {
                        self.release_projectile_now(id);
                    } else {
                        tracing::trace!(%id, "deferred release skipped, projectile inactive");
                    }
                }
            }
        }
    }

    /// Cancel every timer `owner` scheduled, releasing what they guarded.
    fn release_owned_by(&mut self, owner: InstanceId) {
        for deferred in self.deferred.cancel_owned_by(owner) {
            match deferred.action {
                DeferredAction::ReleaseProjectile(shot) => {
                    self.release_projectile_now(shot);
                }
            }
        }
    }

    fn release_projectile_now(&mut self, id: InstanceId) -> bool {
        if !self.projectiles.release(id) {
            return false;
        }
        self.events.emit(StreamEvent::ProjectileReleased { id });
        true
    }
}
