//! Spiral math: the rising curve that every placement is laid along.

use std::f64::consts::TAU;

use glam::Vec3;

use crate::config::SpiralConfig;

/// Point on a spiral of the given radius at `angle` (radians) and `height`.
pub fn position_at(radius: f32, angle: f32, height: f32) -> Vec3 {
    Vec3::new(radius * angle.cos(), height, radius * angle.sin())
}

/// Arc length between sections once `section` sections have been laid.
///
/// Grows by `spacing_growth` every 100 sections, capped at
/// `max_block_spacing`.
pub fn spacing_for(config: &SpiralConfig, section: u64) -> f32 {
    let grown = config.block_spacing + (section / 100) as f32 * config.spacing_growth;
    grown.min(config.max_block_spacing)
}

/// Progress along the spiral. Angle and height only ever move forward.
///
/// Both accumulate in `f64`; positions are built from the angle reduced to
/// one turn, so per-section steps stay representable however long the
/// climb.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpiralCursor {
    angle: f64,
    height: f64,
    sections: u64,
}

impl SpiralCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Step one section forward on a spiral of `radius`.
    ///
    /// The angle grows by `spacing / radius`, which keeps the arc length
    /// between sections constant whatever the radius.
    pub fn advance(&mut self, config: &SpiralConfig, radius: f32) {
        self.angle += f64::from(spacing_for(config, self.sections)) / f64::from(radius);
        self.height += f64::from(config.height_step) * f64::from(config.tightness);
        self.sections += 1;
    }

    /// Total angle travelled, radians.
    pub fn angle(&self) -> f32 {
        self.angle as f32
    }

    /// Current angle within one turn, `[0, TAU)`.
    pub fn phase(&self) -> f32 {
        self.angle.rem_euclid(TAU) as f32
    }

    pub fn height(&self) -> f32 {
        self.height as f32
    }

    /// Point under the cursor on a spiral of `radius`.
    pub fn position(&self, radius: f32) -> Vec3 {
        position_at(radius, self.phase(), self.height())
    }

    pub fn sections(&self) -> u64 {
        self.sections
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
