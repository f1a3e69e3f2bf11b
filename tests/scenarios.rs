//! End-to-end behavior scenarios driven through the headless app, one tick
//! at a time.

use bevy::prelude::*;
use std::collections::HashSet;
use std::f32::consts::TAU;

use opfor::*;

const DT: f32 = 1.0 / 60.0;

fn open_world_app() -> App {
    let mut app = build_headless_app(5);
    app.insert_resource(WorldGeometry(Box::new(StaticWorld::new())));
    app
}

#[test]
fn sighting_then_losing_the_target_decays_belief_through_the_bands() {
    let mut app = open_world_app();
    let enemy = spawn_enemy(app.world_mut(), Vec2::ZERO, Vec::new());
    let agent = spawn_hostile(app.world_mut(), Vec2::new(100.0, 0.0));

    tick(&mut app, DT);
    {
        let memory = app.world().get::<TargetMemory>(enemy).unwrap();
        assert_eq!(memory.confidence, 1.0);
        assert_eq!(memory.suspected_position, Vec2::new(100.0, 0.0));
        assert_eq!(memory.pursuit_mode(), PursuitMode::DirectPursuit);
    }

    // Target destroyed mid-encounter: treated as lost, belief decays, no
    // crash anywhere downstream.
    app.world_mut().despawn(agent);

    for _ in 0..180 {
        tick(&mut app, DT);
    }
    {
        let memory = app.world().get::<TargetMemory>(enemy).unwrap();
        assert!((memory.confidence - 0.7).abs() < 0.02, "{}", memory.confidence);
        assert!(memory.has_target());
        assert_eq!(memory.pursuit_mode(), PursuitMode::CautiousApproach);
    }

    for _ in 0..121 {
        tick(&mut app, DT);
    }
    {
        let memory = app.world().get::<TargetMemory>(enemy).unwrap();
        assert!(memory.confidence < 0.5);
        assert!(memory.confidence > 0.3);
        assert_eq!(memory.pursuit_mode(), PursuitMode::Search);
    }
}

#[test]
fn distraction_override_fires_from_a_retreat() {
    let mut app = open_world_app();
    let enemy = spawn_enemy(app.world_mut(), Vec2::ZERO, Vec::new());
    let agent = spawn_hostile(app.world_mut(), Vec2::new(150.0, 0.0));

    // Target looking 90 degrees away from the enemy.
    app.world_mut().get_mut::<Agent>(agent).unwrap().aim_direction = Vec2::Y;
    // Enemy mid-retreat: the override must still win.
    app.world_mut().get_mut::<AIState>(enemy).unwrap().mode = AIMode::Retreating {
        rally: Vec2::new(-300.0, 0.0),
    };

    tick(&mut app, DT);

    let intent = app.world().get::<FireIntent>(enemy).unwrap();
    assert!(intent.trigger);
    assert!(intent.direction.x > 0.99, "fired {:?}", intent.direction);

    let ai = app.world().get::<AIState>(enemy).unwrap();
    assert_eq!(ai.mode.label(), "retreating");
}

#[test]
fn no_cover_anywhere_still_produces_movement_on_the_first_tick() {
    let mut app = open_world_app();
    let enemy = spawn_enemy(app.world_mut(), Vec2::ZERO, Vec::new());
    spawn_hostile(app.world_mut(), Vec2::new(250.0, 10.0));

    tick(&mut app, DT);

    let ai = app.world().get::<AIState>(enemy).unwrap();
    assert_eq!(ai.mode.label(), "combat");
    let velocity = app.world().get::<DesiredVelocity>(enemy).unwrap();
    assert!(
        velocity.0.length() > 1.0,
        "enemy stalled with a visible target and no cover"
    );
}

#[test]
fn engaged_facing_tracks_the_threat_never_the_velocity() {
    let mut app = open_world_app();
    let enemy = spawn_enemy(app.world_mut(), Vec2::ZERO, Vec::new());
    let agent = spawn_hostile(app.world_mut(), Vec2::new(60.0, 0.0));

    for _ in 0..5 {
        tick(&mut app, DT);

        let ai = app.world().get::<AIState>(enemy).unwrap();
        if !ai.mode.actively_engaged() {
            continue;
        }
        assert!(ai.aim_point.is_some());

        let enemy_pos = app
            .world()
            .get::<Transform>(enemy)
            .unwrap()
            .translation
            .truncate();
        let agent_pos = app
            .world()
            .get::<Transform>(agent)
            .unwrap()
            .translation
            .truncate();
        let to_agent = agent_pos - enemy_pos;
        let expected = to_agent.y.atan2(to_agent.x);

        let facing = app.world().get::<Facing>(enemy).unwrap();
        assert!(
            (facing.target_angle - expected).abs() < 0.1,
            "facing {} expected {}",
            facing.target_angle,
            expected
        );

        // The enemy is backing away (too close for comfort) while aiming
        // forward: velocity direction and aim direction disagree.
        let velocity = app.world().get::<DesiredVelocity>(enemy).unwrap();
        if velocity.0.length() > 1.0 {
            let velocity_angle = velocity.0.y.atan2(velocity.0.x);
            assert!((facing.target_angle - velocity_angle).abs() > 1.0);
        }
    }
}

#[test]
fn squads_elect_exactly_one_leader_and_hand_out_roles() {
    let mut app = open_world_app();
    let spawns = [
        Vec2::new(0.0, 0.0),
        Vec2::new(80.0, 20.0),
        Vec2::new(-40.0, 60.0),
        Vec2::new(40.0, 100.0),
    ];
    let enemies: Vec<Entity> = spawns
        .iter()
        .map(|&p| spawn_enemy(app.world_mut(), p, Vec::new()))
        .collect();
    spawn_hostile(app.world_mut(), Vec2::new(300.0, 0.0));

    for _ in 0..3 {
        tick(&mut app, DT);
    }

    let mut leaders = 0;
    let mut roled = 0;
    for &enemy in &enemies {
        let member = app.world().get::<SquadMember>(enemy).unwrap();
        if member.role == SquadRole::Leader {
            leaders += 1;
        }
        if member.role != SquadRole::None {
            roled += 1;
        }
    }
    assert_eq!(leaders, 1);
    assert_eq!(roled, 4);
}

#[test]
fn two_searchers_split_the_area_and_share_no_zone() {
    let mut app = open_world_app();
    let first = spawn_enemy(app.world_mut(), Vec2::new(0.0, 0.0), Vec::new());
    let second = spawn_enemy(app.world_mut(), Vec2::new(60.0, 0.0), Vec::new());

    let lost_at = Vec2::new(400.0, 300.0);
    for &enemy in &[first, second] {
        let mut memory = app.world_mut().get_mut::<TargetMemory>(enemy).unwrap();
        memory.update(lost_at, 0.45, 0.0);
    }

    for _ in 0..2 {
        tick(&mut app, DT);
    }

    let zone_size = app.world().resource::<AiConfig>().cover.zone_size;
    let mut zone_sets: Vec<HashSet<IVec2>> = Vec::new();
    for &enemy in &[first, second] {
        let ai = app.world().get::<AIState>(enemy).unwrap();
        match &ai.mode {
            AIMode::Searching { route, .. } => {
                assert!(!route.is_empty());
                zone_sets.push(route.iter().map(|&p| zone_key(zone_size, p)).collect());
            }
            other => panic!("expected searching, got {}", other.label()),
        }
    }
    assert!(zone_sets[0].is_disjoint(&zone_sets[1]));

    // The assigned sectors tile the full disk.
    let squads = app.world().resource::<SquadCoordination>();
    let squad = squads.squads.values().next().expect("one squad");
    let search = squad.search.as_ref().expect("a coordinated search");
    assert_eq!(search.sectors.len(), 2);
    let total_span: f32 = search.sectors.iter().map(|&(_, _, span)| span).sum();
    assert!((total_span - TAU).abs() < 1e-4);
    let mut starts: Vec<f32> = search.sectors.iter().map(|&(_, start, _)| start).collect();
    starts.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert!((starts[0] - 0.0).abs() < 1e-4);
    assert!((starts[1] - TAU / 2.0).abs() < 1e-4);
}

#[test]
fn gunfire_out_of_sight_pulls_an_idle_enemy_into_a_search() {
    let mut app = build_headless_app(11);
    let mut level = StaticWorld::new();
    // A wall fully between the enemy and the noise.
    level.add_rect(Vec2::new(150.0, 0.0), Vec2::new(10.0, 400.0));
    app.insert_resource(WorldGeometry(Box::new(level)));

    let enemy = spawn_enemy(app.world_mut(), Vec2::ZERO, Vec::new());
    let shooter = spawn_hostile(app.world_mut(), Vec2::new(300.0, 0.0));

    app.world_mut().send_event(SoundEvent {
        position: Vec2::new(300.0, 0.0),
        kind: SoundKind::Gunshot,
        source: Some(shooter),
    });

    tick(&mut app, DT);

    let memory = app.world().get::<TargetMemory>(enemy).unwrap();
    assert!((memory.confidence - 0.7).abs() < 0.01);
    assert_eq!(memory.suspected_position, Vec2::new(300.0, 0.0));

    // Heard-only contact: combat family entered, but no cover-exit
    // tracking without a confirmed sighting.
    let ai = app.world().get::<AIState>(enemy).unwrap();
    assert!(!ai.engaged);
    assert_ne!(ai.mode.label(), "idle");
}
