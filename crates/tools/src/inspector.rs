use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use spiralstream_common::InstanceId;
use spiralstream_kernel::Level;

/// Level inspector for developer tooling.
///
/// Read-only queries against a level for debugging, profiling, and the CLI.
pub struct LevelInspector;

impl LevelInspector {
    /// Produce a summary of the level state.
    pub fn summary(level: &Level) -> LevelSummary {
        let generator = level.generator();
        let blocks = generator.block_pool();
        let totals = generator.totals();
        let visible = level.active_geometry().iter().filter(|p| p.visible).count();

        LevelSummary {
            tick: level.tick(),
            seed: level.seed(),
            angle: generator.current_angle(),
            height: generator.current_height(),
            sections: totals.sections,
            live_placements: generator.live_count(),
            visible_placements: visible,
            blocks_idle: blocks.idle_count(),
            blocks_constructed: blocks.constructed_count(),
            relocated: totals.relocated,
            reclaimed: totals.reclaimed,
            rejected: totals.rejected,
            live_enemies: level.spawner().live_count(),
            live_projectiles: level.projectile_pool().active_count(),
            pending_timers: level.pending_timers(),
            avg_tick_micros: level.tick_timer().average().as_micros() as u64,
            state_hash: level.state_hash(),
        }
    }

    pub fn inspect_placement(level: &Level, id: InstanceId) -> Option<PlacementInfo> {
        level.generator().placement(id).map(|p| PlacementInfo {
            id,
            position: p.position.to_array(),
            cell: [p.cell.x, p.cell.y, p.cell.z],
            row: p.row,
            connector: p.connector,
            visible: p.visible,
        })
    }

    /// Live placements per row, connectors counted under their row.
    pub fn row_histogram(level: &Level) -> BTreeMap<u32, usize> {
        let mut rows = BTreeMap::new();
        for p in level.active_geometry() {
            *rows.entry(p.row).or_insert(0) += 1;
        }
        rows
    }
}

/// Summary of level state for the inspector.
#[derive(Debug, Clone, Serialize)]
pub struct LevelSummary {
    pub tick: u64,
    pub seed: u64,
    pub angle: f32,
    pub height: f32,
    pub sections: u64,
    pub live_placements: usize,
    pub visible_placements: usize,
    pub blocks_idle: usize,
    pub blocks_constructed: usize,
    pub relocated: u64,
    pub reclaimed: u64,
    pub rejected: u64,
    pub live_enemies: usize,
    pub live_projectiles: usize,
    pub pending_timers: usize,
    pub avg_tick_micros: u64,
    pub state_hash: u64,
}

impl fmt::Display for LevelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Level: tick={} seed={} angle={:.2} height={:.2} sections={}",
            self.tick, self.seed, self.angle, self.height, self.sections
        )?;
        writeln!(
            f,
            "  placements: live={} visible={} relocated={} reclaimed={} rejected={}",
            self.live_placements,
            self.visible_placements,
            self.relocated,
            self.reclaimed,
            self.rejected
        )?;
        writeln!(
            f,
            "  pools: blocks idle={} constructed={} enemies={} projectiles={} timers={}",
            self.blocks_idle,
            self.blocks_constructed,
            self.live_enemies,
            self.live_projectiles,
            self.pending_timers
        )?;
        write!(
            f,
            "  avg tick={}us hash={:#018x}",
            self.avg_tick_micros, self.state_hash
        )
    }
}

/// Detailed info about a single placement.
#[derive(Debug, Clone, Serialize)]
pub struct PlacementInfo {
    pub id: InstanceId,
    pub position: [f32; 3],
    pub cell: [i32; 3],
    pub row: u32,
    pub connector: bool,
    pub visible: bool,
}

impl fmt::Display for PlacementInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Placement [{}] pos=({:.2}, {:.2}, {:.2}) row={}{}{}",
            self.id,
            self.position[0],
            self.position[1],
            self.position[2],
            self.row,
            if self.connector { " connector" } else { "" },
            if self.visible { "" } else { " hidden" },
        )
    }
}
