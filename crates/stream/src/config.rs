//! Level configuration. Every tunable is injected here; nothing in the
//! generator, spawner or policy is hard-coded.

use std::path::Path;

use serde::{Deserialize, Serialize};
use spiralstream_pool::PoolError;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("pool construction failed: {0}")]
    Pool(#[from] PoolError),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be positive, got {value}")))
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be non-negative, got {value}")))
    }
}

fn at_least_one(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value >= 1 {
        Ok(())
    } else {
        Err(invalid(field, "must be at least 1"))
    }
}

/// Shape of the primary spiral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpiralConfig {
    /// Radius of row 0. Clamped into `[min_radius, max_radius]`.
    pub radius: f32,
    pub min_radius: f32,
    pub max_radius: f32,
    /// Arc length between consecutive sections.
    pub block_spacing: f32,
    /// Extra arc length added every 100 sections.
    pub spacing_growth: f32,
    /// Upper bound for the grown arc length.
    pub max_block_spacing: f32,
    pub height_step: f32,
    /// Multiplier on `height_step`.
    pub tightness: f32,
}

impl Default for SpiralConfig {
    fn default() -> Self {
        Self {
            radius: 12.0,
            min_radius: 5.0,
            max_radius: 20.0,
            block_spacing: 3.6,
            spacing_growth: 0.0,
            max_block_spacing: 6.0,
            height_step: 1.0,
            tightness: 0.5,
        }
    }
}

impl SpiralConfig {
    /// Radius after clamping into the allowed range.
    pub fn effective_radius(&self) -> f32 {
        self.radius.clamp(self.min_radius, self.max_radius)
    }
}

/// Outer parallel rows and the connectors between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RowConfig {
    /// Total rows including the primary spiral.
    pub count: u32,
    /// Radial distance between adjacent rows.
    pub spacing: f32,
    /// Probability of adding connectors between row 0 and an outer row.
    pub side_block_chance: f64,
    /// Connector angular jitter bound, radians.
    pub connector_angle_jitter: f32,
    /// Connector height jitter bound, world units.
    pub connector_height_jitter: f32,
}

impl Default for RowConfig {
    fn default() -> Self {
        Self {
            count: 3,
            spacing: 6.0,
            side_block_chance: 0.7,
            connector_angle_jitter: 0.05,
            connector_height_jitter: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    pub cell_size: f32,
    /// Cells scanned in each axis around a candidate during validation.
    pub neighbor_radius: i32,
    /// Minimum spacing as a fraction of `spiral.block_spacing`.
    pub min_spacing_factor: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cell_size: 3.0,
            neighbor_radius: 2,
            min_spacing_factor: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamingConfig {
    /// Sections generated by `generate_initial`.
    pub initial_blocks: usize,
    /// Placements farther than this are disabled (render and collider off).
    pub visible_distance: f32,
    /// Generate more while the frontier is closer than this.
    pub generation_distance: f32,
    /// Sections generated per triggered extension.
    pub generation_batch: usize,
    /// Placements farther than this are reclaimed.
    pub cleanup_distance: f32,
    /// Ceiling on live placements; beyond it the farthest is relocated.
    pub max_blocks_in_memory: usize,
    /// Height of the agent's start point above the first placement.
    pub agent_spawn_height: f32,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            initial_blocks: 40,
            visible_distance: 80.0,
            generation_distance: 60.0,
            generation_batch: 10,
            cleanup_distance: 100.0,
            max_blocks_in_memory: 1000,
            agent_spawn_height: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    pub block_capacity: usize,
    pub enemy_capacity: usize,
    pub projectile_capacity: usize,
    /// Idle instances built per pool at construction (capped by capacity).
    pub prewarm: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            block_capacity: 2000,
            enemy_capacity: 10,
            projectile_capacity: 100,
            prewarm: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnemyConfig {
    /// Search radius for `safe_spawn_position`.
    pub spawn_radius: f32,
    /// Minimum distance between live enemies.
    pub min_separation: f32,
    pub max_alive: usize,
    pub spawn_interval_min_ticks: u64,
    pub spawn_interval_max_ticks: u64,
    pub attempts_per_cycle: usize,
    /// Height of an enemy above its foothold.
    pub spawn_height: f32,
    pub min_vertical_clearance: f32,
    /// Horizontal cells scanned for overhead geometry.
    pub clearance_scan_radius: i32,
    /// Vertical cells scanned for overhead geometry.
    pub clearance_scan_height: i32,
    pub projectile_lifetime_ticks: u64,
}

impl Default for EnemyConfig {
    fn default() -> Self {
        Self {
            spawn_radius: 20.0,
            min_separation: 20.0,
            max_alive: 5,
            spawn_interval_min_ticks: 300,
            spawn_interval_max_ticks: 600,
            attempts_per_cycle: 3,
            spawn_height: 1.5,
            min_vertical_clearance: 1.5,
            clearance_scan_radius: 1,
            clearance_scan_height: 1,
            projectile_lifetime_ticks: 300,
        }
    }
}

/// Complete configuration of one streamed level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LevelConfig {
    pub spiral: SpiralConfig,
    pub rows: RowConfig,
    pub grid: GridConfig,
    pub streaming: StreamingConfig,
    pub pools: PoolConfig,
    pub enemies: EnemyConfig,
}

impl LevelConfig {
    /// Parse YAML (missing fields take defaults) and validate.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Minimum distance between any two placements.
    pub fn min_spacing(&self) -> f32 {
        self.grid.min_spacing_factor * self.spiral.block_spacing
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.spiral;
        positive("spiral.radius", s.radius)?;
        positive("spiral.min_radius", s.min_radius)?;
        positive("spiral.max_radius", s.max_radius)?;
        if s.min_radius > s.max_radius {
            return Err(invalid("spiral.min_radius", "must not exceed spiral.max_radius"));
        }
        positive("spiral.block_spacing", s.block_spacing)?;
        non_negative("spiral.spacing_growth", s.spacing_growth)?;
        if !(s.max_block_spacing >= s.block_spacing) {
            return Err(invalid(
                "spiral.max_block_spacing",
                "must be at least spiral.block_spacing",
            ));
        }
        non_negative("spiral.height_step", s.height_step)?;
        non_negative("spiral.tightness", s.tightness)?;

        let r = &self.rows;
        if r.count == 0 {
            return Err(invalid("rows.count", "must be at least 1"));
        }
        if r.count > 1 {
            positive("rows.spacing", r.spacing)?;
        }
        if !(0.0..=1.0).contains(&r.side_block_chance) {
            return Err(invalid("rows.side_block_chance", "must be within [0, 1]"));
        }
        non_negative("rows.connector_angle_jitter", r.connector_angle_jitter)?;
        non_negative("rows.connector_height_jitter", r.connector_height_jitter)?;

        let g = &self.grid;
        positive("grid.cell_size", g.cell_size)?;
        positive("grid.min_spacing_factor", g.min_spacing_factor)?;
        if g.neighbor_radius < 0 {
            return Err(invalid("grid.neighbor_radius", "must be non-negative"));
        }
        let reach = g.neighbor_radius as f32 * g.cell_size;
        if reach < self.min_spacing() {
            return Err(invalid(
                "grid.neighbor_radius",
                format!(
                    "scan reach {reach} is shorter than the minimum spacing {}",
                    self.min_spacing()
                ),
            ));
        }

        let st = &self.streaming;
        at_least_one("streaming.initial_blocks", st.initial_blocks)?;
        positive("streaming.visible_distance", st.visible_distance)?;
        positive("streaming.generation_distance", st.generation_distance)?;
        at_least_one("streaming.generation_batch", st.generation_batch)?;
        positive("streaming.cleanup_distance", st.cleanup_distance)?;
        if st.cleanup_distance <= st.generation_distance {
            return Err(invalid(
                "streaming.cleanup_distance",
                "must exceed streaming.generation_distance",
            ));
        }
        at_least_one("streaming.max_blocks_in_memory", st.max_blocks_in_memory)?;
        non_negative("streaming.agent_spawn_height", st.agent_spawn_height)?;

        let p = &self.pools;
        at_least_one("pools.block_capacity", p.block_capacity)?;
        at_least_one("pools.enemy_capacity", p.enemy_capacity)?;
        at_least_one("pools.projectile_capacity", p.projectile_capacity)?;

        let e = &self.enemies;
        positive("enemies.spawn_radius", e.spawn_radius)?;
        non_negative("enemies.min_separation", e.min_separation)?;
        if e.spawn_interval_min_ticks == 0 {
            return Err(invalid("enemies.spawn_interval_min_ticks", "must be at least 1"));
        }
        if e.spawn_interval_min_ticks > e.spawn_interval_max_ticks {
            return Err(invalid(
                "enemies.spawn_interval_min_ticks",
                "must not exceed enemies.spawn_interval_max_ticks",
            ));
        }
        at_least_one("enemies.attempts_per_cycle", e.attempts_per_cycle)?;
        non_negative("enemies.spawn_height", e.spawn_height)?;
        non_negative("enemies.min_vertical_clearance", e.min_vertical_clearance)?;
        if e.clearance_scan_radius < 0 || e.clearance_scan_height < 0 {
            return Err(invalid("enemies.clearance_scan_radius", "scan extents must be non-negative"));
        }
        if e.projectile_lifetime_ticks == 0 {
            return Err(invalid("enemies.projectile_lifetime_ticks", "must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn field_of(err: ConfigError) -> &'static str {
        match err {
            ConfigError::Invalid { field, .. } => field,
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn defaults_are_valid() {
        LevelConfig::default().validate().unwrap();
    }

    #[test]
    fn default_min_spacing_follows_block_spacing() {
        let config = LevelConfig::default();
        assert!((config.min_spacing() - 2.88).abs() < 1e-5);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut config = LevelConfig::default();
        config.pools.enemy_capacity = 0;
        assert_eq!(field_of(config.validate().unwrap_err()), "pools.enemy_capacity");
    }

    #[test]
    fn negative_height_step_is_rejected() {
        let mut config = LevelConfig::default();
        config.spiral.height_step = -0.1;
        assert_eq!(field_of(config.validate().unwrap_err()), "spiral.height_step");
    }

    #[test]
    fn short_scan_reach_is_rejected() {
        let mut config = LevelConfig::default();
        config.grid.neighbor_radius = 0;
        assert_eq!(field_of(config.validate().unwrap_err()), "grid.neighbor_radius");
    }

    #[test]
    fn cleanup_must_exceed_generation_distance() {
        let mut config = LevelConfig::default();
        config.streaming.cleanup_distance = config.streaming.generation_distance;
        assert_eq!(
            field_of(config.validate().unwrap_err()),
            "streaming.cleanup_distance"
        );
    }

    #[test]
    fn probability_out_of_range_is_rejected() {
        let mut config = LevelConfig::default();
        config.rows.side_block_chance = 1.5;
        assert_eq!(field_of(config.validate().unwrap_err()), "rows.side_block_chance");
    }

    #[test]
    fn radius_is_clamped() {
        let spiral = SpiralConfig {
            radius: 40.0,
            ..SpiralConfig::default()
        };
        assert_eq!(spiral.effective_radius(), 20.0);
    }

    #[test]
    fn partial_yaml_takes_defaults() {
        let config = LevelConfig::from_yaml_str("spiral:\n  radius: 10.0\nrows:\n  count: 1\n")
            .unwrap();
        assert_eq!(config.spiral.radius, 10.0);
        assert_eq!(config.rows.count, 1);
        assert_eq!(config.streaming, StreamingConfig::default());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = LevelConfig::from_yaml_str("spiral:\n  raduis: 10.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn yaml_round_trips_through_file() {
        let config = LevelConfig::default();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_yaml().unwrap().as_bytes()).unwrap();

        let loaded = LevelConfig::load(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LevelConfig::load(dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
