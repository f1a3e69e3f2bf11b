// src/systems/morale.rs
use bevy::prelude::*;

use crate::core::*;

/// Hits drain morale hard, witnessed hits drain it a little, being locally
/// outnumbered grinds it down. The state machine reads `is_panicked` and
/// forces a retreat regardless of what the planner wants.
pub fn morale_system(
    mut enemy_query: Query<(Entity, &Transform, &mut Morale), (With<Enemy>, Without<Dead>)>,
    mut damage_events: EventReader<DamageEvent>,
    agent_query: Query<&Transform, (With<Agent>, Without<Dead>)>,
    ally_query: Query<&Transform, (With<Enemy>, Without<Dead>)>,
    time: Res<Time>,
    game_mode: Res<GameMode>,
) {
    if game_mode.paused {
        return;
    }

    for damage_event in damage_events.read() {
        let target_pos = enemy_query
            .get(damage_event.target)
            .map(|(_, transform, _)| transform.translation.truncate())
            .ok();

        if let Some(target_pos) = target_pos {
            for (entity, enemy_transform, mut morale) in enemy_query.iter_mut() {
                let distance = enemy_transform.translation.truncate().distance(target_pos);
                if distance <= 100.0 {
                    let damage_factor = if entity == damage_event.target {
                        20.0
                    } else {
                        5.0
                    };
                    morale.reduce(damage_factor);
                }
            }
        }
    }

    for (_, enemy_transform, mut morale) in enemy_query.iter_mut() {
        let enemy_pos = enemy_transform.translation.truncate();

        let nearby_agents = agent_query
            .iter()
            .filter(|agent_transform| {
                enemy_pos.distance(agent_transform.translation.truncate()) <= 150.0
            })
            .count();

        let nearby_allies = ally_query
            .iter()
            .filter(|ally_transform| {
                let ally_pos = ally_transform.translation.truncate();
                ally_pos != enemy_pos && enemy_pos.distance(ally_pos) <= 150.0
            })
            .count();

        if nearby_agents > nearby_allies + 1 {
            morale.reduce(10.0 * time.delta_secs());
        } else {
            morale.recover(time.delta_secs());
        }
    }
}
