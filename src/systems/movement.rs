// src/systems/movement.rs - Velocity integration (no physics)
use bevy::prelude::*;

use crate::core::world_query::WorldQuery;
use crate::core::*;

/// Applies the AI's desired velocity directly to the transform and feeds
/// the stall watchdog. The shipped game routes desired velocity through
/// its physics layer instead; this integration is what the sandbox and
/// tests run on.
pub fn movement_system(
    mut query: Query<(&mut Transform, &DesiredVelocity, &mut StuckDetector), Without<Dead>>,
    config: Res<AiConfig>,
    time: Res<Time>,
    game_mode: Res<GameMode>,
) {
    if game_mode.paused {
        return;
    }
    let now = time.elapsed_secs();
    let dt = time.delta_secs();

    for (mut transform, velocity, mut stuck) in query.iter_mut() {
        let moving_intent = velocity.0.length_squared() > 1.0;
        if moving_intent {
            transform.translation += (velocity.0 * dt).extend(0.0);
        }
        let position = transform.translation.truncate();
        stuck.update(
            position,
            moving_intent,
            now,
            config.combat.stuck_displacement,
            config.combat.stuck_timeout,
        );
    }
}

/// Steering with obstacle avoidance: when the straight line is blocked
/// close ahead, slide along the obstacle surface instead of pressing into
/// it. Returns the velocity and the blocking hit, if any.
pub fn steer(
    world: &dyn WorldQuery,
    from: Vec2,
    to: Vec2,
    speed: f32,
    avoid_probe: f32,
) -> (Vec2, Option<RayHit>) {
    let direction = (to - from).normalize_or_zero();
    if direction == Vec2::ZERO {
        return (Vec2::ZERO, None);
    }
    if let Some(hit) = world.raycast(from, from + direction * avoid_probe) {
        let tangent = Vec2::new(-hit.normal.y, hit.normal.x);
        let along = if tangent.dot(direction) >= 0.0 {
            tangent
        } else {
            -tangent
        };
        return (along * speed, Some(hit));
    }
    (direction * speed, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StaticWorld;

    #[test]
    fn steer_slides_along_blocking_wall() {
        let mut world = StaticWorld::new();
        world.add_rect(Vec2::new(30.0, 0.0), Vec2::new(5.0, 100.0));

        let (velocity, hit) = steer(&world, Vec2::ZERO, Vec2::new(200.0, 40.0), 100.0, 48.0);
        assert!(hit.is_some());
        // Sliding along the wall face: vertical, toward the goal side.
        assert!(velocity.x.abs() < 1e-3);
        assert!(velocity.y > 0.0);
    }

    #[test]
    fn steer_goes_straight_in_the_open() {
        let world = StaticWorld::new();
        let (velocity, hit) = steer(&world, Vec2::ZERO, Vec2::new(100.0, 0.0), 80.0, 48.0);
        assert!(hit.is_none());
        assert!((velocity - Vec2::new(80.0, 0.0)).length() < 1e-3);
    }
}
