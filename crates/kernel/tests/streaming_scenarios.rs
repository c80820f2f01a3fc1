//! End-to-end streaming scenarios driven through `Level`.

use glam::Vec3;
use proptest::prelude::*;
use spiralstream_common::{InstanceId, PoolKind};
use spiralstream_kernel::Level;
use spiralstream_pool::{Block, ObjectPool};
use spiralstream_stream::{LevelConfig, Placement, SpiralCursor, StreamEvent};

fn seeded(config: LevelConfig, seed: u64) -> (Level, Vec3) {
    let mut level = Level::new(config, seed).unwrap();
    let spawn = level.generate_initial().unwrap().unwrap();
    (level, spawn)
}

/// Walk an agent one section per tick along the primary spiral.
fn walk(level: &mut Level, ticks: usize) {
    walk_from(level, &mut SpiralCursor::new(), ticks);
}

fn walk_from(level: &mut Level, cursor: &mut SpiralCursor, ticks: usize) {
    let spiral_config = level.config().spiral.clone();
    let radius = level.generator().radius();
    let lift = Vec3::Y * level.config().streaming.agent_spawn_height;
    for _ in 0..ticks {
        cursor.advance(&spiral_config, radius);
        let agent = cursor.position(radius) + lift;
        level.step(agent);
    }
}

/// Events with pool ids cleared. Pool ids are unique per process, so two
/// levels never share them even when everything else replays.
fn pool_local(events: Vec<StreamEvent>) -> Vec<StreamEvent> {
    let local = |id: InstanceId| InstanceId::unowned(id.kind, id.slot, id.generation);
    events
        .into_iter()
        .map(|event| match event {
            StreamEvent::PlacementSpawned(p) => {
                StreamEvent::PlacementSpawned(Placement { id: local(p.id), ..p })
            }
            StreamEvent::PlacementRemoved(p) => {
                StreamEvent::PlacementRemoved(Placement { id: local(p.id), ..p })
            }
            StreamEvent::PlacementVisibility { id, visible } => {
                StreamEvent::PlacementVisibility { id: local(id), visible }
            }
            StreamEvent::EnemySpawned { id, position } => {
                StreamEvent::EnemySpawned { id: local(id), position }
            }
            StreamEvent::EnemyRemoved { id } => StreamEvent::EnemyRemoved { id: local(id) },
            StreamEvent::ProjectileFired { id, owner } => StreamEvent::ProjectileFired {
                id: local(id),
                owner: local(owner),
            },
            StreamEvent::ProjectileReleased { id } => {
                StreamEvent::ProjectileReleased { id: local(id) }
            }
        })
        .collect()
}

fn assert_invariants(level: &Level) {
    let generator = level.generator();
    let grid = generator.grid();
    let placements = level.active_geometry();

    assert_eq!(grid.len(), placements.len());
    for p in placements {
        assert_eq!(grid.query(p.cell).map(|e| e.id), Some(p.id));
    }
    for (i, a) in placements.iter().enumerate() {
        for b in &placements[i + 1..] {
            assert!(a.position.distance(b.position) >= generator.min_spacing());
        }
    }
    assert!(placements.len() <= level.config().streaming.max_blocks_in_memory);
    let pool = generator.block_pool();
    assert_eq!(pool.active_count(), placements.len());
    assert!(pool.active_count() + pool.idle_count() <= pool.capacity());
}

#[test]
fn pool_of_three_exhausts_then_recovers() {
    let mut pool = ObjectPool::new(PoolKind::Block, 3, Block::default).unwrap();
    let a = pool.acquire().unwrap();
    assert!(pool.acquire().is_some());
    assert!(pool.acquire().is_some());
    assert!(pool.acquire().is_none());

    assert!(pool.release(a));
    assert!(pool.acquire().is_some());
    assert_eq!(pool.constructed_count(), 3);
}

#[test]
fn initial_generation_of_ten_sections() {
    let mut config = LevelConfig::default();
    config.streaming.initial_blocks = 10;
    let (level, _) = seeded(config, 1);

    let primary = level
        .active_geometry()
        .iter()
        .filter(|p| p.row == 0 && !p.connector)
        .count();
    assert!(primary <= 10);
    assert!(level.generator().current_angle() > 0.0);
    assert!(level.generator().current_height() > 0.0);
    assert_invariants(&level);
}

#[test]
fn cleanup_removes_only_distant_placement() {
    let mut config = LevelConfig::default();
    config.streaming.initial_blocks = 2;
    config.rows.count = 1;
    config.spiral.radius = 6.0;
    config.spiral.height_step = 50.0;
    config.spiral.tightness = 1.0;
    let (mut level, _) = seeded(config, 2);
    let near = level.active_geometry()[1].id;
    let idle = level.generator().block_pool().idle_count();

    // ~58 units from the first block, 10 from the second.
    let removed = level.cleanup_old_blocks(Vec3::new(0.0, 108.0, 0.0), 50.0);

    assert_eq!(removed, 1);
    assert_eq!(level.active_geometry().len(), 1);
    assert_eq!(level.active_geometry()[0].id, near);
    assert_eq!(level.generator().block_pool().idle_count(), idle + 1);
    assert!(matches!(
        level.events().last(),
        Some(StreamEvent::PlacementRemoved(p)) if !p.active
    ));
}

#[test]
fn enemy_too_close_is_rejected_without_acquiring() {
    let (mut level, spawn) = seeded(LevelConfig::default(), 3);
    assert!(level.try_spawn_enemy(spawn));
    let acquired = level.spawner().pool().stats().acquired;

    let nearby = spawn + Vec3::new(3.0, 0.0, 4.0);
    assert!(!level.try_spawn_enemy(nearby));
    assert_eq!(level.spawner().pool().stats().acquired, acquired);
    assert_eq!(level.spawner().live_count(), 1);
}

#[test]
fn generation_at_ceiling_relocates() {
    let mut config = LevelConfig::default();
    config.streaming.initial_blocks = 5;
    config.streaming.max_blocks_in_memory = 12;
    let (mut level, _) = seeded(config, 4);
    while level.active_geometry().len() < 12 {
        level.generate_next_section().unwrap();
    }
    let active = level.generator().block_pool().active_count();

    let report = level.generate_next_section().unwrap();

    assert_eq!(report.placed, 0);
    assert_eq!(level.active_geometry().len(), 12);
    assert_eq!(level.generator().block_pool().active_count(), active);
    assert_invariants(&level);
}

#[test]
fn safe_spawn_position_finds_foothold_near_agent() {
    let (mut level, spawn) = seeded(LevelConfig::default(), 5);
    let foothold = level.safe_spawn_position(spawn);
    if let Some(foothold) = foothold {
        assert!(foothold.distance(spawn) <= level.config().enemies.spawn_radius);
        assert!(level.try_spawn_enemy(foothold));
    }
}

#[test]
fn walking_agent_streams_and_reclaims() {
    // Ceiling above the steady-state window so cleanup, not relocation,
    // bounds the live set.
    let mut config = LevelConfig::default();
    config.streaming.max_blocks_in_memory = 2000;
    let (mut level, _) = seeded(config, 6);
    walk(&mut level, 600);

    let totals = level.generator().totals();
    assert!(totals.sections > 40);
    assert!(totals.reclaimed > 0);
    assert!(level.spawner().live_count() <= level.config().enemies.max_alive);
    assert_eq!(level.spawner().pool().active_count(), level.spawner().live_count());
    assert_invariants(&level);
}

#[test]
fn enemies_keep_spawning_as_the_agent_climbs() {
    let mut config = LevelConfig::default();
    config.streaming.max_blocks_in_memory = 2000;
    config.enemies.spawn_interval_min_ticks = 5;
    config.enemies.spawn_interval_max_ticks = 5;
    let (mut level, _) = seeded(config, 12);
    let mut cursor = SpiralCursor::new();

    walk_from(&mut level, &mut cursor, 1500);
    level.drain_events();
    walk_from(&mut level, &mut cursor, 1500);
    let late = level.drain_events();

    let spawned = late
        .iter()
        .filter(|e| matches!(e, StreamEvent::EnemySpawned { .. }))
        .count();
    let removed = late
        .iter()
        .filter(|e| matches!(e, StreamEvent::EnemyRemoved { .. }))
        .count();
    assert!(spawned > 0);
    assert!(removed > 0);
    assert!(level.spawner().live_count() <= level.config().enemies.max_alive);
}

#[test]
fn independent_levels_do_not_share_events() {
    let (mut a, _) = seeded(LevelConfig::default(), 7);
    let b = Level::new(LevelConfig::default(), 7).unwrap();
    assert!(!a.drain_events().is_empty());
    assert!(b.events().is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn streaming_keeps_invariants(
        seed in any::<u64>(),
        rows in 1u32..4,
        max_blocks in 10usize..200,
        ticks in 1usize..300,
    ) {
        let mut config = LevelConfig::default();
        config.rows.count = rows;
        config.streaming.max_blocks_in_memory = max_blocks;
        config.streaming.initial_blocks = 20;
        let (mut level, _) = seeded(config, seed);

        let mut angle = level.generator().current_angle();
        let mut height = level.generator().current_height();
        walk(&mut level, ticks);
        prop_assert!(level.generator().current_angle() >= angle);
        prop_assert!(level.generator().current_height() >= height);
        angle = level.generator().current_angle();
        height = level.generator().current_height();
        level.generate_next_section().unwrap();
        prop_assert!(level.generator().current_angle() > angle);
        prop_assert!(level.generator().current_height() > height);
        assert_invariants(&level);
    }

    #[test]
    fn same_seed_replays_identically(seed in any::<u64>(), ticks in 1usize..200) {
        let (mut a, _) = seeded(LevelConfig::default(), seed);
        let (mut b, _) = seeded(LevelConfig::default(), seed);
        walk(&mut a, ticks);
        walk(&mut b, ticks);
        prop_assert_eq!(a.state_hash(), b.state_hash());
        prop_assert_eq!(pool_local(a.drain_events()), pool_local(b.drain_events()));
    }
}
