use std::collections::VecDeque;
use std::time::{Duration, Instant};

use glam::Vec3;
use rand::Rng;
use spiralstream_common::InstanceId;

use crate::config::{EnemyConfig, LevelConfig, StreamingConfig};
use crate::events::EventHub;
use crate::generator::{Generator, GeneratorState};
use crate::grid::CellCoord;
use crate::spawner::Spawner;

/// Per-tick streaming statistics for instrumentation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamStats {
    /// The agent entered a new cell this tick.
    pub moved: bool,
    pub sections_generated: usize,
    pub placements_enabled: usize,
    pub placements_disabled: usize,
    pub placements_reclaimed: usize,
    pub enemies_despawned: usize,
    pub spawn_attempts: usize,
    pub enemies_spawned: usize,
    pub live_placements: usize,
    pub live_enemies: usize,
    pub tick_time: Duration,
}

/// Per-tick decision function keeping a moving window of content around
/// the agent.
///
/// Generation, cleanup, visibility and enemy despawning run only when the
/// agent changes cell; enemy spawning runs on its own randomized cadence.
/// The live enemy count is always read from the [`Spawner`].
#[derive(Debug, Clone)]
pub struct StreamingPolicy {
    streaming: StreamingConfig,
    enemies: EnemyConfig,
    last_cell: Option<CellCoord>,
    next_spawn_tick: Option<u64>,
    despawned: Vec<InstanceId>,
    stats: StreamStats,
}

impl StreamingPolicy {
    pub fn new(config: &LevelConfig) -> Self {
        Self {
            streaming: config.streaming.clone(),
            enemies: config.enemies.clone(),
            last_cell: None,
            next_spawn_tick: None,
            despawned: Vec::new(),
            stats: StreamStats::default(),
        }
    }

    /// Run one tick of the policy for an agent at `agent`.
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        tick: u64,
        agent: Vec3,
        generator: &mut Generator,
        spawner: &mut Spawner,
        rng: &mut R,
        events: &mut EventHub,
    ) -> &StreamStats {
        let _span = tracing::info_span!("stream_update", tick).entered();
        let start = Instant::now();
        let mut stats = StreamStats::default();
        self.despawned.clear();

        generator.set_agent_position(agent);
        let steady = generator.state() == GeneratorState::Steady;
        let cell = generator.grid().position_to_cell(agent);

        if steady && self.last_cell != Some(cell) {
            self.last_cell = Some(cell);
            stats.moved = true;

            let needs_more = generator
                .frontier_distance(agent)
                .is_none_or(|d| d < self.streaming.generation_distance);
            if needs_more {
                for _ in 0..self.streaming.generation_batch {
                    if let Err(err) = generator.generate_next_section(rng, events) {
                        tracing::warn!(%err, "generation batch interrupted");
                        break;
                    }
                    stats.sections_generated += 1;
                }
            }

            stats.placements_reclaimed =
                generator.cleanup_old_blocks(agent, self.streaming.cleanup_distance, events);
            let delta = generator.apply_visibility(agent, self.streaming.visible_distance, events);
            stats.placements_enabled = delta.enabled;
            stats.placements_disabled = delta.disabled;

            self.despawned =
                spawner.despawn_beyond(agent, self.streaming.cleanup_distance, events);
            stats.enemies_despawned = self.despawned.len();
        }

        if steady {
            self.spawn_cycle(tick, generator, spawner, rng, events, &mut stats);
        }

        stats.live_placements = generator.live_count();
        stats.live_enemies = spawner.live_count();
        stats.tick_time = start.elapsed();

        tracing::trace!(
            moved = stats.moved,
            generated = stats.sections_generated,
            reclaimed = stats.placements_reclaimed,
            despawned = stats.enemies_despawned,
            live = stats.live_placements,
            "stream update complete"
        );
        self.stats = stats;
        &self.stats
    }

    fn spawn_cycle<R: Rng + ?Sized>(
        &mut self,
        tick: u64,
        generator: &Generator,
        spawner: &mut Spawner,
        rng: &mut R,
        events: &mut EventHub,
        stats: &mut StreamStats,
    ) {
        let interval = self.enemies.spawn_interval_min_ticks..=self.enemies.spawn_interval_max_ticks;
        let Some(due) = self.next_spawn_tick else {
            self.next_spawn_tick = Some(tick + rng.gen_range(interval));
            return;
        };
        if tick < due {
            return;
        }
        self.next_spawn_tick = Some(tick + rng.gen_range(interval));

        if spawner.live_count() >= self.enemies.max_alive {
            return;
        }
        let candidates = generator.newer_half();
        if candidates.is_empty() {
            return;
        }
        for _ in 0..self.enemies.attempts_per_cycle {
            stats.spawn_attempts += 1;
            let foothold = candidates[rng.gen_range(0..candidates.len())].position;
            match spawner.try_spawn_enemy(foothold, generator.grid(), tick, events) {
                Ok(_) => {
                    stats.enemies_spawned += 1;
                    break;
                }
                Err(reason) => tracing::trace!(%reason, "spawn attempt rejected"),
            }
        }
    }

    /// Enemies returned to the pool by the last update. The owner still has
    /// to drop anything those enemies left behind.
    pub fn despawned(&self) -> &[InstanceId] {
        &self.despawned
    }

    pub fn next_spawn_tick(&self) -> Option<u64> {
        self.next_spawn_tick
    }

    /// Statistics from the last update.
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    pub fn reset(&mut self) {
        self.last_cell = None;
        self.next_spawn_tick = None;
        self.despawned.clear();
        self.stats = StreamStats::default();
    }
}

/// Rolling window of tick durations.
#[derive(Debug, Clone)]
pub struct TickTimer {
    history: VecDeque<Duration>,
    capacity: usize,
}

impl TickTimer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, dt: Duration) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(dt);
    }

    pub fn average(&self) -> Duration {
        if self.history.is_empty() {
            return Duration::ZERO;
        }
        self.history.iter().sum::<Duration>() / self.history.len() as u32
    }

    pub fn max(&self) -> Duration {
        self.history.iter().copied().max().unwrap_or(Duration::ZERO)
    }

    pub fn min(&self) -> Duration {
        self.history.iter().copied().min().unwrap_or(Duration::ZERO)
    }

    pub fn last(&self) -> Option<Duration> {
        self.history.back().copied()
    }

    pub fn count(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::StreamEvent;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    struct Fixture {
        config: LevelConfig,
        generator: Generator,
        spawner: Spawner,
        policy: StreamingPolicy,
        rng: ChaCha8Rng,
        events: EventHub,
        spawn: Vec3,
    }

    fn fixture(config: LevelConfig) -> Fixture {
        let mut generator = Generator::new(&config).unwrap();
        let spawner = Spawner::new(&config).unwrap();
        let policy = StreamingPolicy::new(&config);
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let mut events = EventHub::new();
        let spawn = generator
            .generate_initial(&mut rng, &mut events)
            .unwrap()
            .unwrap();
        Fixture {
            config,
            generator,
            spawner,
            policy,
            rng,
            events,
            spawn,
        }
    }

    impl Fixture {
        fn update(&mut self, tick: u64, agent: Vec3) -> StreamStats {
            self.policy
                .update(
                    tick,
                    agent,
                    &mut self.generator,
                    &mut self.spawner,
                    &mut self.rng,
                    &mut self.events,
                )
                .clone()
        }
    }

    #[test]
    fn unchanged_cell_skips_streaming_work() {
        let mut f = fixture(LevelConfig::default());
        let first = f.update(1, f.spawn);
        assert!(first.moved);

        let sections = f.generator.totals().sections;
        let second = f.update(2, f.spawn);
        assert!(!second.moved);
        assert_eq!(second.sections_generated, 0);
        assert_eq!(f.generator.totals().sections, sections);
    }

    #[test]
    fn near_frontier_generates_one_batch() {
        let mut f = fixture(LevelConfig::default());
        let frontier = f.generator.frontier().unwrap();
        let stats = f.update(1, frontier);
        assert_eq!(stats.sections_generated, f.config.streaming.generation_batch);
    }

    #[test]
    fn far_frontier_generates_nothing() {
        let mut config = LevelConfig::default();
        config.streaming.generation_distance = 1.0;
        config.streaming.cleanup_distance = 1000.0;
        let mut f = fixture(config);
        let stats = f.update(1, f.spawn);
        assert!(stats.moved);
        assert_eq!(stats.sections_generated, 0);
    }

    #[test]
    fn moving_away_reclaims_and_hides() {
        let mut config = LevelConfig::default();
        config.streaming.visible_distance = 10.0;
        config.streaming.generation_distance = 1.0;
        config.streaming.cleanup_distance = 30.0;
        let mut f = fixture(config);
        let live = f.generator.live_count();

        let stats = f.update(1, f.spawn);
        assert!(stats.placements_reclaimed > 0);
        assert!(stats.placements_disabled > 0);
        assert_eq!(stats.live_placements, live - stats.placements_reclaimed);
        for p in f.generator.placements() {
            assert!(p.position.distance(f.spawn) <= 30.0);
        }
    }

    #[test]
    fn spawning_waits_for_cadence_and_respects_cap() {
        let mut config = LevelConfig::default();
        config.enemies.spawn_interval_min_ticks = 5;
        config.enemies.spawn_interval_max_ticks = 5;
        config.enemies.max_alive = 1;
        config.enemies.min_separation = 1.0;
        config.enemies.attempts_per_cycle = 50;
        let mut f = fixture(config);

        // First tick only schedules the cadence.
        assert_eq!(f.update(0, f.spawn).spawn_attempts, 0);
        assert_eq!(f.policy.next_spawn_tick(), Some(5));
        assert_eq!(f.update(4, f.spawn).spawn_attempts, 0);

        let stats = f.update(5, f.spawn);
        assert!(stats.spawn_attempts > 0);
        assert_eq!(stats.enemies_spawned, 1);
        assert_eq!(stats.live_enemies, 1);
        assert_eq!(f.spawner.live_count(), 1);

        let capped = f.update(10, f.spawn);
        assert_eq!(capped.spawn_attempts, 0);
        assert_eq!(f.spawner.live_count(), 1);
    }

    #[test]
    fn policy_idles_until_generator_is_steady() {
        let config = LevelConfig::default();
        let mut generator = Generator::new(&config).unwrap();
        let mut spawner = Spawner::new(&config).unwrap();
        let mut policy = StreamingPolicy::new(&config);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut events = EventHub::new();

        let stats = policy.update(0, Vec3::ZERO, &mut generator, &mut spawner, &mut rng, &mut events);
        assert!(!stats.moved);
        assert_eq!(generator.live_count(), 0);
        assert_eq!(policy.next_spawn_tick(), None);
    }

    #[test]
    fn enemies_left_behind_are_despawned() {
        let mut config = LevelConfig::default();
        config.streaming.generation_distance = 1.0;
        config.streaming.cleanup_distance = 30.0;
        let mut f = fixture(config);
        let far = f.spawn + Vec3::new(0.0, 0.0, 60.0);
        let stale = f
            .spawner
            .try_spawn_enemy(far, f.generator.grid(), 0, &mut f.events)
            .unwrap();
        let kept = f
            .spawner
            .try_spawn_enemy(f.spawn, f.generator.grid(), 0, &mut f.events)
            .unwrap();

        let stats = f.update(1, f.spawn);
        assert_eq!(stats.enemies_despawned, 1);
        assert_eq!(f.policy.despawned(), &[stale]);
        assert!(!f.spawner.is_live(stale));
        assert!(f.spawner.is_live(kept));
        assert_eq!(stats.live_enemies, 1);
        assert!(f.events.events().contains(&StreamEvent::EnemyRemoved { id: stale }));

        // Same cell: nothing further to despawn, the list is cleared.
        let again = f.update(2, f.spawn);
        assert_eq!(again.enemies_despawned, 0);
        assert!(f.policy.despawned().is_empty());
    }

    #[test]
    fn tick_timer_tracks_history() {
        let mut timer = TickTimer::new(3);
        timer.record(Duration::from_millis(10));
        timer.record(Duration::from_millis(20));
        timer.record(Duration::from_millis(30));

        assert_eq!(timer.count(), 3);
        assert_eq!(timer.average(), Duration::from_millis(20));
        assert_eq!(timer.max(), Duration::from_millis(30));
        assert_eq!(timer.min(), Duration::from_millis(10));
        assert_eq!(timer.last(), Some(Duration::from_millis(30)));
    }

    #[test]
    fn tick_timer_drops_oldest() {
        let mut timer = TickTimer::new(2);
        timer.record(Duration::from_millis(10));
        timer.record(Duration::from_millis(20));
        timer.record(Duration::from_millis(30));

        assert_eq!(timer.count(), 2);
        assert_eq!(timer.average(), Duration::from_millis(25));
        assert_eq!(TickTimer::new(0).average(), Duration::ZERO);
    }
}
