// src/core/events.rs - Inbound stimuli and outbound notifications
use bevy::prelude::*;

/// Audible stimulus. Confidence and audible radius depend on what made the
/// noise; the gameplay layer emits these, and so do enemy weapons.
#[derive(Event)]
pub struct SoundEvent {
    pub position: Vec2,
    pub kind: SoundKind,
    pub source: Option<Entity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundKind {
    Gunshot,
    Reload,
    EmptyClick,
}

impl SoundKind {
    pub fn confidence(self) -> f32 {
        match self {
            SoundKind::Gunshot => 0.7,
            SoundKind::Reload | SoundKind::EmptyClick => 0.6,
        }
    }

    pub fn audible_range(self) -> f32 {
        match self {
            SoundKind::Gunshot => 400.0,
            SoundKind::Reload => 150.0,
            SoundKind::EmptyClick => 100.0,
        }
    }
}

#[derive(Event)]
pub struct DamageEvent {
    pub target: Entity,
    pub amount: f32,
    pub source_position: Vec2,
}

/// A weapon discharged. The gameplay layer resolves ballistics; the AI core
/// uses these for near-miss suppression and as gunshot sound sources.
#[derive(Event)]
pub struct FireEvent {
    pub shooter: Entity,
    pub origin: Vec2,
    pub direction: Vec2,
}

/// Informational only - not part of the behavioral contract.
#[derive(Event, Debug, Clone)]
pub struct StateChangeEvent {
    pub entity: Entity,
    pub from: &'static str,
    pub to: &'static str,
    pub at: f32,
}

/// Rolling capture of state transitions, for the sandbox printout and the
/// determinism tests.
#[derive(Resource, Default)]
pub struct TransitionLog(pub Vec<String>);

pub fn record_transitions(
    mut events: EventReader<StateChangeEvent>,
    mut log: ResMut<TransitionLog>,
) {
    for event in events.read() {
        log.0.push(format!(
            "{:.2} enemy{} {} -> {}",
            event.at,
            event.entity.index(),
            event.from,
            event.to
        ));
    }
}
