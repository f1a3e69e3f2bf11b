pub mod core;
pub mod systems;

pub use crate::core::*;
pub use crate::systems::*;

use bevy::prelude::*;

/// Registers every AI resource, event and system. Ordering matters and is
/// fixed: deaths resolve first so nobody plans around a removed agent,
/// squad recomputation precedes any agent reading squad-derived facts, and
/// movement integrates only after every decision is made.
pub struct AiCorePlugin;

impl Plugin for AiCorePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<Time>()
            .init_resource::<GameMode>()
            .init_resource::<AiRng>()
            .init_resource::<SquadCoordination>()
            .init_resource::<WorldGeometry>()
            .init_resource::<TransitionLog>()
            .insert_resource(AiConfig::load())
            .add_event::<SoundEvent>()
            .add_event::<DamageEvent>()
            .add_event::<FireEvent>()
            .add_event::<StateChangeEvent>()
            .add_systems(
                Update,
                (
                    apply_damage_system,
                    death_system,
                    squad_coordination_system,
                    perception_system,
                    stimulus_system,
                    morale_system,
                    enemy_ai_system,
                    rotation_system,
                    movement_system,
                    record_transitions,
                )
                    .chain(),
            );
    }
}

/// Minimal app for the sandbox and tests: no windowing, no real clock.
/// Ticks are driven by hand through [`tick`], which makes every run exactly
/// reproducible for a given seed and scenario.
pub fn build_headless_app(seed: u64) -> App {
    let mut app = App::new();
    app.add_plugins(AiCorePlugin);
    app.insert_resource(AiRng::new(seed));
    app
}

/// Advances simulated time by `dt` and runs one frame.
pub fn tick(app: &mut App, dt: f32) {
    {
        let mut time = app.world_mut().resource_mut::<Time>();
        time.advance_by(std::time::Duration::from_secs_f32(dt));
    }
    app.update();
}
