// src/systems/death.rs - Damage resolution and death handling
use bevy::prelude::*;

use crate::core::*;
use crate::systems::ai::AIState;
use crate::systems::squad::SquadCoordination;

pub fn apply_damage_system(
    mut damage_events: EventReader<DamageEvent>,
    mut health_query: Query<&mut Health, Without<Dead>>,
    game_mode: Res<GameMode>,
) {
    if game_mode.paused {
        return;
    }
    for event in damage_events.read() {
        if let Ok(mut health) = health_query.get_mut(event.target) {
            health.0 -= event.amount;
        }
    }
}

/// Runs before any squad or AI work in the tick: a dying agent must be out
/// of squad membership and search assignments before anyone else plans, so
/// no plan references a removed agent.
pub fn death_system(
    mut commands: Commands,
    mut squads: ResMut<SquadCoordination>,
    query: Query<(Entity, &Health, Option<&Enemy>), Without<Dead>>,
) {
    for (entity, health, enemy) in query.iter() {
        if health.0 > 0.0 {
            continue;
        }

        if enemy.is_some() {
            squads.remove_member(entity);
            commands
                .entity(entity)
                .remove::<AIState>()
                .remove::<GoapAgent>()
                .remove::<TargetMemory>()
                .remove::<Vision>()
                .remove::<Patrol>()
                .remove::<Morale>()
                .remove::<WeaponState>()
                .remove::<SquadMember>()
                .remove::<DesiredVelocity>()
                .remove::<FireIntent>()
                .remove::<StuckDetector>();
            info!("Enemy {} down", entity.index());
        }
        commands.entity(entity).insert(Dead);
    }
}
