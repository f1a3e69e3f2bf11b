// src/systems/rotation.rs - The single rotation authority
//
// Exactly one target angle per enemy per tick, picked by strict priority:
// engaged-state aim point, then an active corner probe, then movement
// direction, then the idle scan sweep. Nothing else may issue a facing
// command, and the sprite flip is decided from this tick's target angle,
// never from the still-interpolating current angle.

use bevy::prelude::*;
use std::f32::consts::{PI, TAU};

use crate::core::*;
use crate::systems::ai::AIState;

pub fn rotation_system(
    mut query: Query<
        (
            Entity,
            &Transform,
            &mut Facing,
            &mut Vision,
            &AIState,
            &DesiredVelocity,
        ),
        (With<Enemy>, Without<Dead>),
    >,
    config: Res<AiConfig>,
    time: Res<Time>,
    game_mode: Res<GameMode>,
) {
    if game_mode.paused {
        return;
    }
    let now = time.elapsed_secs();
    let dt = time.delta_secs();

    for (entity, transform, mut facing, mut vision, ai, velocity) in query.iter_mut() {
        let position = transform.translation.truncate();

        let probe_angle = ai
            .corner_probe
            .filter(|probe| now < probe.until)
            .map(|probe| probe.angle);

        let target_angle = if ai.mode.actively_engaged() && ai.aim_point.is_some() {
            let aim = ai.aim_point.unwrap();
            let to_aim = aim - position;
            to_aim.y.atan2(to_aim.x)
        } else if let Some(angle) = probe_angle {
            angle
        } else if velocity.0.length_squared() > 1.0 {
            velocity.0.y.atan2(velocity.0.x)
        } else {
            // Idle scan: a slow sweep, phase-staggered per entity so a
            // group does not metronome in unison.
            let phase = entity.index() as f32 * 1.7;
            (now * 0.5 + phase).sin() * PI
        };

        facing.target_angle = target_angle;
        let diff = wrap_angle(target_angle - facing.angle);
        let max_step = config.combat.turn_rate * dt;
        facing.angle = wrap_angle(facing.angle + diff.clamp(-max_step, max_step));
        facing.flip_x = facing.target_angle.cos() < 0.0;

        vision.direction = Vec2::from_angle(facing.angle);
    }
}

pub fn wrap_angle(angle: f32) -> f32 {
    (angle + PI).rem_euclid(TAU) - PI
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_keeps_angles_in_signed_half_turn() {
        assert!((wrap_angle(3.0 * PI) - PI).abs() < 1e-4 || (wrap_angle(3.0 * PI) + PI).abs() < 1e-4);
        assert!((wrap_angle(0.5) - 0.5).abs() < 1e-6);
        assert!((wrap_angle(-TAU - 0.25) + 0.25).abs() < 1e-4);
    }
}
