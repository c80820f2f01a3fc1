//! Spiral generator: lays sections of geometry along the rising spiral,
//! keeps the active placement list and the spatial grid paired, and
//! recycles blocks through the block pool.
//!
//! # Invariants
//! - Every active placement occupies exactly one grid cell and every grid
//!   cell belongs to exactly one active placement.
//! - No two active placements are closer than the configured minimum spacing.
//! - The live placement count never exceeds `max_blocks_in_memory`.
//! - Angle and height only move forward between resets.

use glam::Vec3;
use rand::Rng;
use spiralstream_common::{InstanceId, PoolKind, Transform};
use spiralstream_pool::{Block, ObjectPool};

use crate::config::{ConfigError, LevelConfig, RowConfig, SpiralConfig};
use crate::events::{EventHub, StreamEvent};
use crate::grid::{CellCoord, GridEntry, SpatialGrid};
use crate::spiral::{self, SpiralCursor};

/// One instantiated unit of geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub id: InstanceId,
    pub position: Vec3,
    pub cell: CellCoord,
    /// 0 is the primary spiral, outer rows count up from 1.
    pub row: u32,
    /// Interpolated between row 0 and `row`.
    pub connector: bool,
    /// False only in removal notifications.
    pub active: bool,
    /// Render and collider enabled.
    pub visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Uninitialized,
    Seeding,
    Steady,
    Resetting,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeneratorError {
    #[error("operation not valid while the generator is {0:?}")]
    InvalidState(GeneratorState),
}

/// Outcome of one `generate_next_section` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionReport {
    pub placed: usize,
    pub relocated: usize,
    pub rejected: usize,
}

/// Running totals since the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationTotals {
    pub sections: u64,
    pub placed: u64,
    pub relocated: u64,
    pub rejected: u64,
    pub reclaimed: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisibilityDelta {
    pub enabled: usize,
    pub disabled: usize,
}

#[derive(Debug)]
pub struct Generator {
    spiral: SpiralConfig,
    rows: RowConfig,
    radius: f32,
    min_spacing: f32,
    neighbor_radius: i32,
    initial_blocks: usize,
    max_blocks: usize,
    agent_spawn_height: f32,
    state: GeneratorState,
    cursor: SpiralCursor,
    frontier: Option<Vec3>,
    agent: Vec3,
    grid: SpatialGrid,
    blocks: ObjectPool<Block>,
    placements: Vec<Placement>,
    totals: GenerationTotals,
}

impl Generator {
    /// Build a generator with its own grid and block pool.
    pub fn new(config: &LevelConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let radius = config.spiral.effective_radius();
        if radius != config.spiral.radius {
            tracing::warn!(requested = config.spiral.radius, radius, "spiral radius clamped");
        }

        let mut blocks =
            ObjectPool::new(PoolKind::Block, config.pools.block_capacity, Block::default)?;
        blocks.prewarm(config.pools.prewarm);

        Ok(Self {
            spiral: config.spiral.clone(),
            rows: config.rows.clone(),
            radius,
            min_spacing: config.min_spacing(),
            neighbor_radius: config.grid.neighbor_radius,
            initial_blocks: config.streaming.initial_blocks,
            max_blocks: config.streaming.max_blocks_in_memory,
            agent_spawn_height: config.streaming.agent_spawn_height,
            state: GeneratorState::Uninitialized,
            cursor: SpiralCursor::new(),
            frontier: None,
            agent: spiral::position_at(radius, 0.0, 0.0),
            grid: SpatialGrid::new(config.grid.cell_size),
            blocks,
            placements: Vec::new(),
            totals: GenerationTotals::default(),
        })
    }

    /// Seed the level with `initial_blocks` sections.
    ///
    /// Returns the agent's start point: the first primary placement raised
    /// by `agent_spawn_height`.
    pub fn generate_initial<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        events: &mut EventHub,
    ) -> Result<Option<Vec3>, GeneratorError> {
        match self.state {
            GeneratorState::Uninitialized | GeneratorState::Resetting => {}
            other => return Err(GeneratorError::InvalidState(other)),
        }
        self.state = GeneratorState::Seeding;
        for _ in 0..self.initial_blocks {
            self.generate_next_section(rng, events)?;
        }
        self.state = GeneratorState::Steady;

        let spawn = self
            .placements
            .iter()
            .find(|p| p.row == 0 && !p.connector)
            .map(|p| p.position + Vec3::Y * self.agent_spawn_height);
        if let Some(spawn) = spawn {
            self.agent = spawn;
        }
        tracing::info!(
            placements = self.placements.len(),
            angle = self.cursor.angle(),
            height = self.cursor.height(),
            "initial generation complete"
        );
        Ok(spawn)
    }

    /// Advance the spiral by one section and place its primary block, the
    /// outer row blocks, and any connectors.
    ///
    /// Candidates that fail validation are skipped; the spiral still
    /// advances.
    pub fn generate_next_section<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        events: &mut EventHub,
    ) -> Result<SectionReport, GeneratorError> {
        if !matches!(self.state, GeneratorState::Seeding | GeneratorState::Steady) {
            return Err(GeneratorError::InvalidState(self.state));
        }

        self.cursor.advance(&self.spiral, self.radius);
        let angle = self.cursor.phase();
        let height = self.cursor.height();
        let mut report = SectionReport::default();

        let main = spiral::position_at(self.radius, angle, height);
        self.frontier = Some(main);
        let main_placed = self.try_place(main, 0, false, &mut report, events);

        for row in 1..self.rows.count {
            let row_radius = self.radius + self.rows.spacing * row as f32;
            let row_pos = spiral::position_at(row_radius, angle, height);
            let row_placed = self.try_place(row_pos, row, false, &mut report, events);

            if main_placed && row_placed && rng.gen_bool(self.rows.side_block_chance) {
                let connectors = rng.gen_range(1..=2u32);
                for i in 0..connectors {
                    let t = (i + 1) as f32 / (connectors + 1) as f32;
                    let radius = self.radius + (row_radius - self.radius) * t;
                    let a = angle + jitter(rng, self.rows.connector_angle_jitter);
                    let h = height + jitter(rng, self.rows.connector_height_jitter);
                    let pos = spiral::position_at(radius, a, h);
                    self.try_place(pos, row, true, &mut report, events);
                }
            }
        }

        self.totals.sections += 1;
        self.totals.placed += report.placed as u64;
        self.totals.relocated += report.relocated as u64;
        self.totals.rejected += report.rejected as u64;
        Ok(report)
    }

    /// Reclaim every placement farther than `distance` from `reference`.
    /// Returns how many were released to the block pool.
    pub fn cleanup_old_blocks(
        &mut self,
        reference: Vec3,
        distance: f32,
        events: &mut EventHub,
    ) -> usize {
        let mut removed = Vec::new();
        self.placements.retain(|p| {
            if p.position.distance(reference) > distance {
                removed.push(*p);
                false
            } else {
                true
            }
        });

        for p in &removed {
            self.grid.remove(p.cell);
            self.blocks.release(p.id);
            events.emit(StreamEvent::PlacementRemoved(Placement { active: false, ..*p }));
        }
        self.totals.reclaimed += removed.len() as u64;
        if !removed.is_empty() {
            tracing::debug!(reclaimed = removed.len(), live = self.placements.len(), "old blocks cleaned up");
        }
        removed.len()
    }

    /// Enable placements nearer than `visible_distance` to `reference` and
    /// disable the rest. Disabled placements keep their grid cell.
    pub fn apply_visibility(
        &mut self,
        reference: Vec3,
        visible_distance: f32,
        events: &mut EventHub,
    ) -> VisibilityDelta {
        let mut delta = VisibilityDelta::default();
        for p in &mut self.placements {
            let visible = p.position.distance(reference) < visible_distance;
            if p.visible == visible {
                continue;
            }
            p.visible = visible;
            if let Some(block) = self.blocks.get_mut(p.id) {
                block.set_enabled(visible);
            }
            if visible {
                delta.enabled += 1;
            } else {
                delta.disabled += 1;
            }
            events.emit(StreamEvent::PlacementVisibility { id: p.id, visible });
        }
        delta
    }

    /// Return every placement to the pool and rewind the spiral. The next
    /// call must be `generate_initial`.
    pub fn reset(&mut self, events: &mut EventHub) {
        self.state = GeneratorState::Resetting;
        for p in self.placements.drain(..) {
            self.grid.remove(p.cell);
            self.blocks.release(p.id);
            events.emit(StreamEvent::PlacementRemoved(Placement { active: false, ..p }));
        }
        self.grid.clear();
        self.cursor.reset();
        self.frontier = None;
        self.totals = GenerationTotals::default();
        self.agent = spiral::position_at(self.radius, 0.0, 0.0);
        tracing::info!("generator reset");
    }

    /// Record where the agent is; relocation picks the placement farthest
    /// from this point.
    pub fn set_agent_position(&mut self, position: Vec3) {
        self.agent = position;
    }

    pub fn agent_position(&self) -> Vec3 {
        self.agent
    }

    /// Distance from `from` to the most recently generated spiral point.
    pub fn frontier_distance(&self, from: Vec3) -> Option<f32> {
        self.frontier.map(|f| f.distance(from))
    }

    pub fn frontier(&self) -> Option<Vec3> {
        self.frontier
    }

    /// Active placements, oldest first.
    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    /// The more recently generated half of the active placements.
    pub fn newer_half(&self) -> &[Placement] {
        &self.placements[self.placements.len() / 2..]
    }

    pub fn placement(&self, id: InstanceId) -> Option<&Placement> {
        self.placements.iter().find(|p| p.id == id)
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    pub fn block_pool(&self) -> &ObjectPool<Block> {
        &self.blocks
    }

    pub fn state(&self) -> GeneratorState {
        self.state
    }

    pub fn current_angle(&self) -> f32 {
        self.cursor.angle()
    }

    pub fn current_height(&self) -> f32 {
        self.cursor.height()
    }

    pub fn live_count(&self) -> usize {
        self.placements.len()
    }

    pub fn min_spacing(&self) -> f32 {
        self.min_spacing
    }

    /// Radius of row 0 after clamping.
    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn totals(&self) -> GenerationTotals {
        self.totals
    }

    fn try_place(
        &mut self,
        position: Vec3,
        row: u32,
        connector: bool,
        report: &mut SectionReport,
        events: &mut EventHub,
    ) -> bool {
        if !self.grid.is_clear(position, self.min_spacing, self.neighbor_radius) {
            report.rejected += 1;
            tracing::trace!(?position, row, connector, "placement rejected: too close");
            return false;
        }

        if self.placements.len() >= self.max_blocks {
            let relocated = self.relocate_farthest(position, row, connector, events);
            if relocated {
                report.relocated += 1;
            } else {
                report.rejected += 1;
            }
            return relocated;
        }

        let Some(id) = self.blocks.acquire() else {
            report.rejected += 1;
            tracing::debug!(row, "block pool exhausted, placement skipped");
            return false;
        };
        let cell = self.grid.position_to_cell(position);
        if let Err(err) = self.grid.insert(cell, GridEntry { id, position }) {
            // is_clear saw this cell empty; undo the acquire.
            tracing::warn!(%err, "grid insert failed, placement dropped");
            self.blocks.release(id);
            report.rejected += 1;
            return false;
        }
        if let Some(block) = self.blocks.get_mut(id) {
            block.transform = Transform::at(position);
            block.set_enabled(true);
        }

        let placement = Placement {
            id,
            position,
            cell,
            row,
            connector,
            active: true,
            visible: true,
        };
        self.placements.push(placement);
        report.placed += 1;
        events.emit(StreamEvent::PlacementSpawned(placement));
        true
    }

    /// Move the placement farthest from the agent to `position`, reusing its
    /// block instance. The moved placement becomes the newest in the list.
    fn relocate_farthest(
        &mut self,
        position: Vec3,
        row: u32,
        connector: bool,
        events: &mut EventHub,
    ) -> bool {
        let agent = self.agent;
        let Some(index) = self
            .placements
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                a.position
                    .distance_squared(agent)
                    .total_cmp(&b.position.distance_squared(agent))
            })
            .map(|(i, _)| i)
        else {
            return false;
        };

        let old = self.placements.remove(index);
        self.grid.remove(old.cell);
        events.emit(StreamEvent::PlacementRemoved(Placement { active: false, ..old }));

        let cell = self.grid.position_to_cell(position);
        if let Err(err) = self.grid.insert(cell, GridEntry { id: old.id, position }) {
            tracing::warn!(%err, "grid insert failed during relocation, block returned to pool");
            self.blocks.release(old.id);
            return false;
        }
        if let Some(block) = self.blocks.get_mut(old.id) {
            block.transform = Transform::at(position);
            block.set_enabled(true);
        }

        let moved = Placement {
            id: old.id,
            position,
            cell,
            row,
            connector,
            active: true,
            visible: true,
        };
        self.placements.push(moved);
        events.emit(StreamEvent::PlacementSpawned(moved));
        tracing::trace!(id = %old.id, "farthest placement relocated to the frontier");
        true
    }
}

fn jitter<R: Rng + ?Sized>(rng: &mut R, bound: f32) -> f32 {
    if bound > 0.0 {
        rng.gen_range(-bound..=bound)
    } else {
        0.0
    }
}
