use glam::Vec3;
use spiralstream_common::{InstanceId, Transform};

use crate::pool::Poolable;

/// One unit of walkable geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block {
    pub transform: Transform,
    pub velocity: Vec3,
    /// Render toggle. Cleared by visibility culling while the block keeps
    /// its grid cell.
    pub render_enabled: bool,
    pub collider_enabled: bool,
}

impl Default for Block {
    fn default() -> Self {
        Self {
            transform: Transform::default(),
            velocity: Vec3::ZERO,
            render_enabled: true,
            collider_enabled: true,
        }
    }
}

impl Block {
    pub fn set_enabled(&mut self, enabled: bool) {
        self.render_enabled = enabled;
        self.collider_enabled = enabled;
    }
}

impl Poolable for Block {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Enemy {
    pub transform: Transform,
    pub velocity: Vec3,
    pub enabled: bool,
}

impl Default for Enemy {
    fn default() -> Self {
        Self {
            transform: Transform::default(),
            velocity: Vec3::ZERO,
            enabled: true,
        }
    }
}

impl Poolable for Enemy {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projectile {
    pub transform: Transform,
    pub velocity: Vec3,
    pub enabled: bool,
    /// Enemy that fired this projectile.
    pub owner: Option<InstanceId>,
}

impl Default for Projectile {
    fn default() -> Self {
        Self {
            transform: Transform::default(),
            velocity: Vec3::ZERO,
            enabled: true,
            owner: None,
        }
    }
}

impl Poolable for Projectile {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spiralstream_common::PoolKind;

    #[test]
    fn block_reset_restores_origin_and_flags() {
        let mut b = Block::default();
        b.transform.position = Vec3::new(4.0, 5.0, 6.0);
        b.velocity = Vec3::Y;
        b.set_enabled(false);

        b.reset();
        assert_eq!(b, Block::default());
        assert!(b.render_enabled && b.collider_enabled);
    }

    #[test]
    fn projectile_reset_clears_owner() {
        let mut p = Projectile {
            owner: Some(InstanceId::unowned(PoolKind::Enemy, 0, 1)),
            velocity: Vec3::X * 10.0,
            ..Projectile::default()
        };
        p.reset();
        assert!(p.owner.is_none());
        assert_eq!(p.velocity, Vec3::ZERO);
    }
}
