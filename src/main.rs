// src/main.rs - Headless firefight sandbox
//
// Runs a scripted encounter against the AI core and prints the state
// transitions it produced. No rendering, no real clock: the same binary
// prints the same firefight every time.

use bevy::prelude::*;
use std::f32::consts::PI;

use opfor::*;

#[derive(Resource)]
struct HostileScript {
    next_shot: f32,
}

fn main() {
    let mut app = build_headless_app(1234);

    let mut level = StaticWorld::new();
    level.add_rect(Vec2::new(220.0, 40.0), Vec2::new(16.0, 90.0));
    level.add_rect(Vec2::new(-60.0, 260.0), Vec2::new(120.0, 14.0));
    level.add_rect(Vec2::new(420.0, 300.0), Vec2::new(30.0, 30.0));
    level.add_rect(Vec2::new(520.0, -80.0), Vec2::new(20.0, 60.0));
    app.insert_resource(WorldGeometry(Box::new(level)));
    app.insert_resource(HostileScript { next_shot: 1.0 });
    app.add_systems(Update, hostile_script_system);

    spawn_hostile(app.world_mut(), Vec2::new(620.0, 80.0));

    let spawns = [
        Vec2::new(0.0, 0.0),
        Vec2::new(40.0, 70.0),
        Vec2::new(-50.0, 130.0),
        Vec2::new(30.0, 190.0),
    ];
    for (i, &spawn) in spawns.iter().enumerate() {
        let offset = Vec2::new(0.0, 60.0 + i as f32 * 10.0);
        spawn_enemy(app.world_mut(), spawn, vec![spawn, spawn + offset]);
    }

    for _ in 0..2400 {
        tick(&mut app, 1.0 / 60.0);
    }

    println!("--- state transitions ---");
    let log = app.world().resource::<TransitionLog>();
    for line in &log.0 {
        println!("{line}");
    }

    println!("--- after 40s ---");
    let mut survivors = app
        .world_mut()
        .query_filtered::<(Entity, &Health), (With<Enemy>, Without<Dead>)>();
    for (entity, health) in survivors.iter(app.world()) {
        println!("enemy{} alive at {:.0} hp", entity.index(), health.0);
    }
}

/// The player-squad stand-in: drifts toward the enemy spawns, sweeps its
/// aim (periodically exposing its back, which the distraction override
/// punishes), and takes a potshot at the nearest enemy every two seconds.
fn hostile_script_system(
    mut agent_query: Query<(Entity, &mut Transform, &mut Agent), Without<Enemy>>,
    enemy_query: Query<(Entity, &Transform), (With<Enemy>, Without<Dead>)>,
    mut script: ResMut<HostileScript>,
    mut damage_events: EventWriter<DamageEvent>,
    mut fire_events: EventWriter<FireEvent>,
    mut sound_events: EventWriter<SoundEvent>,
    time: Res<Time>,
) {
    let now = time.elapsed_secs();
    let dt = time.delta_secs();

    for (agent_entity, mut transform, mut agent) in agent_query.iter_mut() {
        let drift = Vec2::new(-14.0, 4.0);
        transform.translation += (drift * dt).extend(0.0);
        agent.velocity = drift;
        agent.aim_direction = Vec2::from_angle((now * 0.4).sin() * PI);

        if now >= script.next_shot {
            script.next_shot = now + 2.0;
            let origin = transform.translation.truncate();
            let nearest = enemy_query.iter().min_by(|(_, a), (_, b)| {
                let da = origin.distance(a.translation.truncate());
                let db = origin.distance(b.translation.truncate());
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            });
            if let Some((target, target_transform)) = nearest {
                let direction =
                    (target_transform.translation.truncate() - origin).normalize_or_zero();
                fire_events.write(FireEvent {
                    shooter: agent_entity,
                    origin,
                    direction,
                });
                sound_events.write(SoundEvent {
                    position: origin,
                    kind: SoundKind::Gunshot,
                    source: Some(agent_entity),
                });
                damage_events.write(DamageEvent {
                    target,
                    amount: 12.0,
                    source_position: origin,
                });
            }
        }
    }
}
