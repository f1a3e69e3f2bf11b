// src/core/world_query.rs - Geometry queries consumed by the AI core
//
// The AI never talks to a physics engine directly. Everything it needs to
// know about level geometry goes through this trait: obstruction raycasts
// and point validity checks. The game binary plugs its own adapter in;
// `StaticWorld` below is the implementation the sandbox and tests use.

use bevy::math::Vec2;
use bevy::prelude::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObstacleId(pub u32);

#[derive(Debug, Clone, Copy)]
pub struct RayHit {
    pub point: Vec2,
    pub normal: Vec2,
    pub obstacle: ObstacleId,
}

pub trait WorldQuery: Send + Sync {
    /// Closest obstacle intersection on the segment `from..to`, if any.
    fn raycast(&self, from: Vec2, to: Vec2) -> Option<RayHit>;

    /// True when `point` is not inside any obstacle.
    fn point_is_free(&self, point: Vec2) -> bool;
}

#[derive(Resource)]
pub struct WorldGeometry(pub Box<dyn WorldQuery>);

impl Default for WorldGeometry {
    fn default() -> Self {
        Self(Box::new(StaticWorld::default()))
    }
}

// === STATIC OBSTACLE WORLD ===
// Axis-aligned rectangles with exact segment intersection. Enough geometry
// for firefights in the sandbox and for every cover/LOS test.

#[derive(Debug, Clone)]
pub struct Obstacle {
    pub id: ObstacleId,
    pub min: Vec2,
    pub max: Vec2,
}

#[derive(Default)]
pub struct StaticWorld {
    obstacles: Vec<Obstacle>,
}

impl StaticWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rect(&mut self, center: Vec2, half_extents: Vec2) -> ObstacleId {
        let id = ObstacleId(self.obstacles.len() as u32);
        self.obstacles.push(Obstacle {
            id,
            min: center - half_extents,
            max: center + half_extents,
        });
        id
    }
}

impl WorldQuery for StaticWorld {
    fn raycast(&self, from: Vec2, to: Vec2) -> Option<RayHit> {
        let mut best: Option<(f32, RayHit)> = None;
        for obstacle in &self.obstacles {
            if let Some((t, normal)) = segment_vs_aabb(from, to, obstacle.min, obstacle.max) {
                let closer = best.map(|(bt, _)| t < bt).unwrap_or(true);
                if closer {
                    best = Some((
                        t,
                        RayHit {
                            point: from + (to - from) * t,
                            normal,
                            obstacle: obstacle.id,
                        },
                    ));
                }
            }
        }
        best.map(|(_, hit)| hit)
    }

    fn point_is_free(&self, point: Vec2) -> bool {
        !self.obstacles.iter().any(|o| {
            point.x >= o.min.x && point.x <= o.max.x && point.y >= o.min.y && point.y <= o.max.y
        })
    }
}

/// Slab test for a segment against an AABB. Returns the entry parameter
/// t in (0, 1] and the surface normal at the entry face.
fn segment_vs_aabb(from: Vec2, to: Vec2, min: Vec2, max: Vec2) -> Option<(f32, Vec2)> {
    let delta = to - from;
    let mut t_enter = 0.0_f32;
    let mut t_exit = 1.0_f32;
    let mut normal = Vec2::ZERO;

    for axis in 0..2 {
        let (origin, dir, lo, hi) = if axis == 0 {
            (from.x, delta.x, min.x, max.x)
        } else {
            (from.y, delta.y, min.y, max.y)
        };

        if dir.abs() < 1e-6 {
            if origin < lo || origin > hi {
                return None;
            }
            continue;
        }

        let inv = 1.0 / dir;
        let mut t1 = (lo - origin) * inv;
        let mut t2 = (hi - origin) * inv;
        let mut face_normal = if axis == 0 { -Vec2::X } else { -Vec2::Y };
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
            face_normal = -face_normal;
        }
        if t1 > t_enter {
            t_enter = t1;
            normal = face_normal;
        }
        t_exit = t_exit.min(t2);
        if t_enter > t_exit {
            return None;
        }
    }

    // Zero normal means the segment started inside the box.
    if normal == Vec2::ZERO || t_enter <= 0.0 || t_enter > 1.0 {
        return None;
    }
    Some((t_enter, normal))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world_with_wall() -> (StaticWorld, ObstacleId) {
        let mut world = StaticWorld::new();
        let id = world.add_rect(Vec2::new(100.0, 0.0), Vec2::new(10.0, 50.0));
        (world, id)
    }

    #[test]
    fn raycast_hits_facing_wall() {
        let (world, id) = world_with_wall();
        let hit = world.raycast(Vec2::ZERO, Vec2::new(200.0, 0.0)).unwrap();
        assert_eq!(hit.obstacle, id);
        assert!((hit.point.x - 90.0).abs() < 1e-3);
        assert_eq!(hit.normal, -Vec2::X);
    }

    #[test]
    fn raycast_misses_parallel_segment() {
        let (world, _) = world_with_wall();
        assert!(world.raycast(Vec2::new(0.0, 80.0), Vec2::new(200.0, 80.0)).is_none());
    }

    #[test]
    fn raycast_from_far_side_reports_far_normal() {
        let (world, _) = world_with_wall();
        let hit = world.raycast(Vec2::new(200.0, 0.0), Vec2::ZERO).unwrap();
        assert!((hit.point.x - 110.0).abs() < 1e-3);
        assert_eq!(hit.normal, Vec2::X);
    }

    #[test]
    fn closest_of_several_obstacles_wins() {
        let mut world = StaticWorld::new();
        let near = world.add_rect(Vec2::new(50.0, 0.0), Vec2::new(5.0, 20.0));
        let _far = world.add_rect(Vec2::new(150.0, 0.0), Vec2::new(5.0, 20.0));
        let hit = world.raycast(Vec2::ZERO, Vec2::new(300.0, 0.0)).unwrap();
        assert_eq!(hit.obstacle, near);
    }

    #[test]
    fn point_validity() {
        let (world, _) = world_with_wall();
        assert!(world.point_is_free(Vec2::ZERO));
        assert!(!world.point_is_free(Vec2::new(100.0, 0.0)));
    }
}
