//! Replay determinism: the whole core runs on accumulated tick deltas, so
//! identical seeds, spawns and deltas must reproduce the exact same
//! firefight - transition for transition, position for position.

use bevy::prelude::*;
use opfor::*;

fn build_scenario(seed: u64) -> App {
    let mut app = build_headless_app(seed);

    let mut level = StaticWorld::new();
    level.add_rect(Vec2::new(160.0, 20.0), Vec2::new(14.0, 70.0));
    level.add_rect(Vec2::new(-40.0, 220.0), Vec2::new(90.0, 12.0));
    app.insert_resource(WorldGeometry(Box::new(level)));

    spawn_hostile(app.world_mut(), Vec2::new(240.0, 180.0));
    spawn_enemy(
        app.world_mut(),
        Vec2::new(0.0, 0.0),
        vec![Vec2::new(0.0, 0.0), Vec2::new(0.0, 80.0)],
    );
    spawn_enemy(app.world_mut(), Vec2::new(50.0, 60.0), vec![Vec2::new(50.0, 60.0)]);
    spawn_enemy(app.world_mut(), Vec2::new(-60.0, 40.0), vec![Vec2::new(-60.0, 40.0)]);
    app
}

fn run_scenario(seed: u64, ticks: usize) -> (Vec<String>, Vec<String>) {
    let mut app = build_scenario(seed);
    for _ in 0..ticks {
        tick(&mut app, 1.0 / 60.0);
    }

    let log = app.world().resource::<TransitionLog>().0.clone();

    let mut query = app.world_mut().query::<(Entity, &Transform)>();
    let mut rows: Vec<(u32, Vec3)> = query
        .iter(app.world())
        .map(|(entity, transform)| (entity.index(), transform.translation))
        .collect();
    rows.sort_by_key(|(index, _)| *index);
    let snapshot = rows
        .into_iter()
        .map(|(index, translation)| format!("{index} {translation:?}"))
        .collect();

    (log, snapshot)
}

#[test]
fn same_seed_reproduces_the_same_firefight() {
    let first = run_scenario(9, 900);
    let second = run_scenario(9, 900);
    assert_eq!(first.0, second.0, "transition logs diverged");
    assert_eq!(first.1, second.1, "final positions diverged");
}

#[test]
fn repeated_runs_stay_identical() {
    let runs: Vec<_> = (0..3).map(|_| run_scenario(42, 600)).collect();
    for run in &runs[1..] {
        assert_eq!(runs[0].0, run.0);
        assert_eq!(runs[0].1, run.1);
    }
}

#[test]
fn the_scenario_is_not_trivially_empty() {
    // A determinism test over a firefight where nothing happens proves
    // nothing; make sure enemies actually engaged.
    let (log, _) = run_scenario(7, 900);
    assert!(
        log.iter().any(|line| line.contains("idle -> combat")),
        "no enemy ever engaged: {log:?}"
    );
}
