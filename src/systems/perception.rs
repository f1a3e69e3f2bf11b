// src/systems/perception.rs - Vision, hearing and incoming-fire awareness
use bevy::prelude::*;

use crate::core::*;
use crate::systems::ai::AIState;

/// Line-of-sight pass. The field-of-view cone only gates the first
/// detection of an encounter: once an enemy has genuinely seen its target,
/// its own smooth rotation must not be able to flicker the contact away,
/// so only the obstruction raycast keeps applying.
pub fn perception_system(
    mut enemy_query: Query<
        (Entity, &Transform, &Vision, &mut AIState, &mut TargetMemory),
        (With<Enemy>, Without<Dead>),
    >,
    agent_query: Query<(Entity, &Transform), (With<Agent>, Without<Dead>)>,
    geometry: Res<WorldGeometry>,
    config: Res<AiConfig>,
    time: Res<Time>,
    game_mode: Res<GameMode>,
) {
    if game_mode.paused {
        return;
    }
    let now = time.elapsed_secs();
    let dt = time.delta_secs();

    for (entity, transform, vision, mut ai, mut memory) in enemy_query.iter_mut() {
        let enemy_pos = transform.translation.truncate();
        ai.visible_target = None;

        let mut best: Option<(Entity, Vec2, f32)> = None;
        for (agent_entity, agent_transform) in agent_query.iter() {
            let agent_pos = agent_transform.translation.truncate();
            let distance = enemy_pos.distance(agent_pos);
            if distance > vision.range || distance <= 1.0 {
                continue;
            }
            if !ai.engaged && !in_vision_cone(enemy_pos, agent_pos, vision) {
                continue;
            }
            if geometry.0.raycast(enemy_pos, agent_pos).is_some() {
                continue;
            }
            let closer = best.map(|(_, _, d)| distance < d).unwrap_or(true);
            if closer {
                best = Some((agent_entity, agent_pos, distance));
            }
        }

        if let Some((agent_entity, agent_pos, _)) = best {
            ai.visible_target = Some((agent_entity, agent_pos));
            // Direct sight is a continuous re-assertion at full confidence,
            // never decayed under it.
            memory.update(agent_pos, 1.0, now);
            if !ai.engaged {
                info!("Enemy {} spotted a hostile", entity.index());
            }
            ai.engaged = true;
        } else {
            memory.decay(dt, config.perception.memory_decay_rate);
            if !memory.has_target() {
                // Encounter over: the next detection is cone-gated again.
                ai.engaged = false;
            }
        }
    }
}

pub fn in_vision_cone(observer_pos: Vec2, target_pos: Vec2, vision: &Vision) -> bool {
    let to_target = target_pos - observer_pos;
    let distance = to_target.length();

    if distance <= vision.range && distance > 1.0 {
        let target_direction = to_target.normalize();
        let dot_product = vision.direction.dot(target_direction);
        let angle_cos = (vision.angle / 2.0).cos();
        dot_product >= angle_cos
    } else {
        false
    }
}

/// Hearing and getting shot at. Sounds feed the memory at kind-specific
/// confidence; hits and near misses stamp the under-fire clock and build
/// suppression pressure.
pub fn stimulus_system(
    mut enemy_query: Query<
        (Entity, &Transform, &mut AIState, &mut TargetMemory),
        (With<Enemy>, Without<Dead>),
    >,
    mut sound_events: EventReader<SoundEvent>,
    mut fire_events: EventReader<FireEvent>,
    mut damage_events: EventReader<DamageEvent>,
    config: Res<AiConfig>,
    time: Res<Time>,
    game_mode: Res<GameMode>,
) {
    if game_mode.paused {
        return;
    }
    let now = time.elapsed_secs();

    for event in sound_events.read() {
        // A squadmate's own gunfire is not evidence of the target.
        let friendly = event
            .source
            .map(|source| enemy_query.contains(source))
            .unwrap_or(false);
        if friendly {
            continue;
        }
        for (entity, transform, _, mut memory) in enemy_query.iter_mut() {
            if event.source == Some(entity) {
                continue;
            }
            let enemy_pos = transform.translation.truncate();
            if enemy_pos.distance(event.position) <= event.kind.audible_range() {
                memory.update(event.position, event.kind.confidence(), now);
            }
        }
    }

    for event in fire_events.read() {
        let friendly = enemy_query.contains(event.shooter);
        if friendly {
            continue;
        }
        let ray_end = event.origin + event.direction.normalize_or_zero() * 400.0;
        for (entity, transform, mut ai, _) in enemy_query.iter_mut() {
            if event.shooter == entity {
                continue;
            }
            let enemy_pos = transform.translation.truncate();
            let miss_distance = point_segment_distance(enemy_pos, event.origin, ray_end);
            if miss_distance <= config.perception.near_miss_distance {
                ai.last_incoming_fire = now;
                ai.suppression += 1.0;
            }
        }
    }

    for event in damage_events.read() {
        if let Ok((_, _, mut ai, mut memory)) = enemy_query.get_mut(event.target) {
            ai.last_incoming_fire = now;
            ai.suppression += 1.5;
            // Taking a hit tells you roughly where it came from.
            memory.update(event.source_position, SoundKind::Gunshot.confidence(), now);
        }
    }
}

fn point_segment_distance(point: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ab = b - a;
    let length_sq = ab.length_squared();
    if length_sq < 1e-6 {
        return point.distance(a);
    }
    let t = ((point - a).dot(ab) / length_sq).clamp(0.0, 1.0);
    point.distance(a + ab * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cone_check_respects_angle_and_range() {
        let vision = Vision::new(300.0, 90.0);
        assert!(in_vision_cone(Vec2::ZERO, Vec2::new(200.0, 50.0), &vision));
        assert!(!in_vision_cone(Vec2::ZERO, Vec2::new(0.0, 200.0), &vision));
        assert!(!in_vision_cone(Vec2::ZERO, Vec2::new(400.0, 0.0), &vision));
    }

    #[test]
    fn segment_distance_clamps_to_endpoints() {
        let a = Vec2::ZERO;
        let b = Vec2::new(100.0, 0.0);
        assert!((point_segment_distance(Vec2::new(50.0, 20.0), a, b) - 20.0).abs() < 1e-4);
        assert!((point_segment_distance(Vec2::new(-30.0, 0.0), a, b) - 30.0).abs() < 1e-4);
    }
}
