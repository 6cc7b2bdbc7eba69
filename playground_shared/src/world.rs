//! Static world geometry.
//!
//! Platforms are immutable once the world is built and are shared read-only
//! between physics and any presentation layer. They are never networked.

use std::sync::Arc;

use crate::config::WorldConfig;
use crate::math::{Rect, Vec2};
use crate::physics::PhysicsBackend;

/// Platform tiers as `(centre x, centre y, width, height)`, measured from the
/// top-left corner of a 2400 x 1200 arena.
const ARENA_TIERS: &[(f32, f32, f32, f32)] = &[
    // Tier 1
    (200.0, 1000.0, 220.0, 22.0),
    (550.0, 960.0, 180.0, 22.0),
    (950.0, 1000.0, 280.0, 22.0),
    (1400.0, 960.0, 200.0, 22.0),
    (1800.0, 1000.0, 240.0, 22.0),
    (2200.0, 960.0, 180.0, 22.0),
    // Tier 2
    (120.0, 810.0, 180.0, 22.0),
    (450.0, 760.0, 220.0, 22.0),
    (850.0, 800.0, 200.0, 22.0),
    (1200.0, 740.0, 260.0, 22.0),
    (1600.0, 780.0, 200.0, 22.0),
    (2000.0, 800.0, 220.0, 22.0),
    (2350.0, 740.0, 160.0, 22.0),
    // Tier 3
    (280.0, 580.0, 200.0, 22.0),
    (650.0, 530.0, 180.0, 22.0),
    (1050.0, 560.0, 200.0, 22.0),
    (1400.0, 500.0, 240.0, 22.0),
    (1780.0, 540.0, 200.0, 22.0),
    (2150.0, 520.0, 200.0, 22.0),
    // Tier 4
    (150.0, 380.0, 160.0, 22.0),
    (500.0, 340.0, 200.0, 22.0),
    (900.0, 300.0, 160.0, 22.0),
    (1250.0, 340.0, 200.0, 22.0),
    (1600.0, 310.0, 180.0, 22.0),
    (2000.0, 360.0, 180.0, 22.0),
    // Tier 5
    (350.0, 170.0, 150.0, 22.0),
    (750.0, 130.0, 180.0, 22.0),
    (1150.0, 110.0, 160.0, 22.0),
    (1550.0, 140.0, 180.0, 22.0),
    (1950.0, 170.0, 150.0, 22.0),
];

/// A static rectangle.
pub type Platform = Rect;

/// Immutable world description.
#[derive(Debug, Clone)]
pub struct WorldMap {
    pub width: f32,
    pub height: f32,
    pub spawn: Vec2,
    pub respawn_margin: f32,
    platforms: Arc<[Platform]>,
}

impl WorldMap {
    /// Builds the map described by `cfg`: the tiered arena, or just its extents.
    pub fn from_config(cfg: &WorldConfig) -> Self {
        let platforms: Vec<Platform> = if cfg.arena {
            Self::arena_platforms(cfg.width, cfg.height)
        } else {
            Vec::new()
        };
        Self {
            width: cfg.width,
            height: cfg.height,
            spawn: cfg.spawn_point(),
            respawn_margin: cfg.respawn_margin,
            platforms: platforms.into(),
        }
    }

    /// Floor, walls, ceiling and five tiers of ledges.
    fn arena_platforms(w: f32, h: f32) -> Vec<Platform> {
        let mut out = vec![
            Rect::new(w / 2.0, h - 20.0, w + 100.0, 40.0),
            Rect::new(-20.0, h / 2.0, 40.0, h + 100.0),
            Rect::new(w + 20.0, h / 2.0, 40.0, h + 100.0),
            Rect::new(w / 2.0, -20.0, w + 100.0, 40.0),
        ];
        // Tier coordinates are authored for a 2400 x 1200 arena.
        let (sx, sy) = (w / 2400.0, h / 1200.0);
        out.extend(
            ARENA_TIERS
                .iter()
                .map(|&(x, y, pw, ph)| Rect::new(x * sx, y * sy, pw * sx, ph)),
        );
        out
    }

    pub fn platforms(&self) -> &[Platform] {
        &self.platforms
    }

    /// Shared handle to the platform list.
    pub fn platforms_shared(&self) -> Arc<[Platform]> {
        Arc::clone(&self.platforms)
    }

    /// Registers every platform with the physics backend.
    pub fn build_into<P: PhysicsBackend + ?Sized>(&self, physics: &mut P) {
        for p in self.platforms.iter() {
            physics.add_static(*p);
        }
    }

    /// True once `p` has left the world past the left, right or bottom edge.
    pub fn is_out_of_bounds(&self, p: Vec2) -> bool {
        let m = self.respawn_margin;
        p.y > self.height + m || p.x < -m || p.x > self.width + m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{BodyDesc, ContactOther};
    use crate::rapier_world::RapierPhysics;

    #[test]
    fn arena_has_walls_and_tiers() {
        let map = WorldMap::from_config(&WorldConfig::default());
        assert_eq!(map.platforms().len(), 4 + ARENA_TIERS.len());
    }

    #[test]
    fn built_arena_catches_a_falling_body() {
        let cfg = WorldConfig::default();
        let map = WorldMap::from_config(&cfg);
        let mut physics = RapierPhysics::new(Vec2::new(0.0, cfg.gravity));
        map.build_into(&mut physics);
        let body = physics.create_body(BodyDesc::dynamic(map.spawn, 16.0, 1.0));

        let mut supported = false;
        for _ in 0..120 {
            supported |= physics.step(1.0 / 60.0).iter().any(|c| {
                c.body == body && matches!(c.other, ContactOther::Static(_)) && c.is_support(0.5)
            });
        }
        assert!(supported);
        assert!(!map.is_out_of_bounds(physics.position(body).unwrap()));
    }

    #[test]
    fn empty_world_has_no_platforms() {
        let cfg = WorldConfig {
            arena: false,
            ..WorldConfig::default()
        };
        assert!(WorldMap::from_config(&cfg).platforms().is_empty());
    }

    #[test]
    fn out_of_bounds_edges() {
        let map = WorldMap::from_config(&WorldConfig::default());
        assert!(!map.is_out_of_bounds(map.spawn));
        assert!(map.is_out_of_bounds(Vec2::new(-150.0, 500.0)));
        assert!(map.is_out_of_bounds(Vec2::new(500.0, map.height + 150.0)));
        // Above the ceiling is not a respawn condition.
        assert!(!map.is_out_of_bounds(Vec2::new(500.0, -500.0)));
    }
}
