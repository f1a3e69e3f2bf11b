// src/core/entities.rs - Spawn helpers shared by the sandbox and tests
use bevy::prelude::*;

use crate::core::*;
use crate::systems::ai::AIState;

pub fn spawn_enemy(world: &mut World, position: Vec2, patrol_points: Vec<Vec2>) -> Entity {
    world
        .spawn((
            (
                Enemy,
                Transform::from_translation(position.extend(0.0)),
                Health(100.0),
                MovementSpeed(90.0),
                Vision::new(320.0, 110.0),
                Patrol::new(patrol_points),
                Morale::default(),
                WeaponState::default(),
            ),
            (
                AIState::default(),
                GoapAgent::default(),
                TargetMemory::default(),
                DesiredVelocity::default(),
                Facing::default(),
                FireIntent::default(),
                StuckDetector::default(),
            ),
        ))
        .id()
}

/// A player-squad stand-in: the AI only needs its transform, aim and
/// velocity.
pub fn spawn_hostile(world: &mut World, position: Vec2) -> Entity {
    world
        .spawn((
            Agent::default(),
            Transform::from_translation(position.extend(0.0)),
            Health(300.0),
        ))
        .id()
}
