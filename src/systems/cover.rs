// src/systems/cover.rs - Cover, flank and search position selection
//
// Everything here is pure geometry over the WorldQuery service: probe the
// surroundings with rays, turn obstacle hits into candidate positions,
// score them, filter the degenerate ones. "No candidate" is a normal
// result; callers must fall back to an approach phase, never to standing
// still.

use bevy::prelude::*;
use std::collections::HashSet;
use std::f32::consts::TAU;

use crate::core::{CoverConfig, ObstacleId, WorldQuery};

#[derive(Debug, Clone)]
pub struct CoverCandidate {
    pub position: Vec2,
    pub is_hidden_from_target: bool,
    pub distance_from_agent: f32,
    pub distance_from_target: f32,
    pub obstacle: ObstacleId,
    pub score: f32,
}

/// Best scored cover position between the agent and the threat, or None
/// when every probe comes up empty or filtered.
pub fn find_cover(
    world: &dyn WorldQuery,
    cfg: &CoverConfig,
    agent_pos: Vec2,
    target_pos: Vec2,
    current_obstacle: Option<ObstacleId>,
) -> Option<CoverCandidate> {
    let mut best: Option<CoverCandidate> = None;
    for i in 0..cfg.probe_directions {
        let angle = i as f32 / cfg.probe_directions as f32 * TAU;
        let dir = Vec2::from_angle(angle);
        if let Some(candidate) =
            evaluate_probe(world, cfg, agent_pos, target_pos, current_obstacle, dir)
        {
            let better = best
                .as_ref()
                .map(|b| candidate.score > b.score)
                .unwrap_or(true);
            if better {
                best = Some(candidate);
            }
        }
    }
    best
}

/// One probe direction: obstacle hit -> candidate point offset along the
/// surface normal -> progress filter -> path verification -> score.
pub fn evaluate_probe(
    world: &dyn WorldQuery,
    cfg: &CoverConfig,
    agent_pos: Vec2,
    target_pos: Vec2,
    current_obstacle: Option<ObstacleId>,
    dir: Vec2,
) -> Option<CoverCandidate> {
    let hit = world.raycast(agent_pos, agent_pos + dir * cfg.probe_distance)?;
    let position = hit.point + hit.normal * cfg.surface_clearance;
    if !world.point_is_free(position) {
        return None;
    }

    let agent_to_target = agent_pos.distance(target_pos);
    let distance_from_target = position.distance(target_pos);

    // Shuffling sideways along the same range band is not progress.
    if distance_from_target > agent_to_target * (1.0 - cfg.min_progress) {
        return None;
    }

    // The straight path may only be blocked by the candidate's own cover.
    if let Some(block) = world.raycast(agent_pos, position) {
        if block.obstacle != hit.obstacle {
            return None;
        }
    }

    let distance_from_agent = agent_pos.distance(position);
    let is_hidden_from_target = world.raycast(position, target_pos).is_some();

    let approach = (agent_to_target - distance_from_target) / agent_to_target.max(1.0);
    let mut score = cfg.approach_weight * approach - distance_from_agent / cfg.probe_distance;
    if is_hidden_from_target {
        score += cfg.hidden_bonus;
    }
    if current_obstacle == Some(hit.obstacle) {
        score -= cfg.same_obstacle_penalty;
    }

    Some(CoverCandidate {
        position,
        is_hidden_from_target,
        distance_from_agent,
        distance_from_target,
        obstacle: hit.obstacle,
        score,
    })
}

/// Side with clear lateral room wins; +1.0 is the target's left.
pub fn pick_flank_side(
    world: &dyn WorldQuery,
    cfg: &CoverConfig,
    agent_pos: Vec2,
    target_pos: Vec2,
) -> Option<f32> {
    let to_target = (target_pos - agent_pos).normalize_or_zero();
    let perp = Vec2::new(-to_target.y, to_target.x);
    let lateral = cfg.probe_distance * 0.5;
    let left_clear = world.raycast(agent_pos, agent_pos + perp * lateral).is_none();
    let right_clear = world.raycast(agent_pos, agent_pos - perp * lateral).is_none();
    match (left_clear, right_clear) {
        (true, false) => Some(1.0),
        (false, true) => Some(-1.0),
        (true, true) => None, // genuine tie, caller breaks it
        (false, false) => None,
    }
}

/// Lateral waypoint off-axis from where the target is looking, biased
/// slightly behind it.
pub fn flank_waypoint(target_pos: Vec2, target_aim: Vec2, fallback_axis: Vec2, side: f32, radius: f32) -> Vec2 {
    let aim = if target_aim.length_squared() > 1e-6 {
        target_aim.normalize()
    } else {
        fallback_axis
    };
    let perp = Vec2::new(-aim.y, aim.x);
    let offset = (perp * side - aim * 0.4).normalize_or_zero();
    target_pos + offset * radius
}

/// Expanding ring route around a lost-contact point, for a lone searcher.
pub fn spiral_route(cfg: &CoverConfig, center: Vec2) -> Vec<Vec2> {
    let rings = (cfg.search_radius / cfg.search_ring_step) as usize;
    let mut route = Vec::new();
    for ring in 1..=rings {
        let radius = ring as f32 * cfg.search_ring_step;
        let points = 4 + ring * 2;
        for i in 0..points {
            let angle = i as f32 / points as f32 * TAU + ring as f32 * 0.5;
            route.push(center + Vec2::from_angle(angle) * radius);
        }
    }
    route
}

/// Ring route restricted to one angular sector of a shared search area,
/// skipping zones another searcher has already walked.
pub fn sector_route(
    cfg: &CoverConfig,
    center: Vec2,
    sector_start: f32,
    sector_span: f32,
    visited: &HashSet<IVec2>,
) -> Vec<Vec2> {
    let rings = (cfg.search_radius / cfg.search_ring_step).ceil() as usize;
    let mut route = Vec::new();
    for ring in 1..=rings {
        let radius = ring as f32 * cfg.search_ring_step;
        let steps = ((radius * sector_span / cfg.search_ring_step).ceil() as usize).max(1);
        for i in 0..steps {
            // Offset half a step keeps waypoints off the sector boundary.
            let angle = sector_start + sector_span * (i as f32 + 0.5) / steps as f32;
            let point = center + Vec2::from_angle(angle) * radius;
            if visited.contains(&zone_key(cfg.zone_size, point)) {
                continue;
            }
            let duplicate = route
                .last()
                .map(|&prev: &Vec2| zone_key(cfg.zone_size, prev) == zone_key(cfg.zone_size, point))
                .unwrap_or(false);
            if !duplicate {
                route.push(point);
            }
        }
    }
    route
}

pub fn zone_key(zone_size: f32, position: Vec2) -> IVec2 {
    IVec2::new(
        (position.x / zone_size).floor() as i32,
        (position.y / zone_size).floor() as i32,
    )
}

/// The two points the target can emerge from, perpendicular to the
/// obstacle blocking the line to its suspected position. Both the visual
/// aim and the fire direction use these while the target stays hidden.
pub fn cover_exit_points(
    world: &dyn WorldQuery,
    cfg: &CoverConfig,
    agent_pos: Vec2,
    suspected: Vec2,
) -> Option<(Vec2, Vec2, ObstacleId)> {
    let hit = world.raycast(agent_pos, suspected)?;
    let dir = (suspected - agent_pos).normalize_or_zero();
    let perp = Vec2::new(-dir.y, dir.x);
    Some((
        hit.point + perp * cfg.exit_offset,
        hit.point - perp * cfg.exit_offset,
        hit.obstacle,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StaticWorld;

    fn config() -> CoverConfig {
        crate::core::AiConfig::default().cover
    }

    #[test]
    fn prefers_cover_on_a_different_obstacle() {
        let cfg = config();
        let mut world = StaticWorld::new();
        let left = world.add_rect(Vec2::new(-120.0, 150.0), Vec2::new(20.0, 40.0));
        let right = world.add_rect(Vec2::new(120.0, 150.0), Vec2::new(20.0, 40.0));

        let agent = Vec2::ZERO;
        let target = Vec2::new(0.0, 300.0);

        // Symmetric geometry: without the penalty both sides tie. The agent
        // already hugs the left wall, so the right wall must win.
        let chosen = find_cover(&world, &cfg, agent, target, Some(left)).unwrap();
        assert_eq!(chosen.obstacle, right);

        let chosen = find_cover(&world, &cfg, agent, target, Some(right)).unwrap();
        assert_eq!(chosen.obstacle, left);
    }

    #[test]
    fn rejects_candidate_behind_unrelated_blocker() {
        let cfg = config();
        let agent = Vec2::ZERO;
        let target = Vec2::new(300.0, 25.0);
        let dir = Vec2::new(0.981, -0.195).normalize();

        let mut open = StaticWorld::new();
        open.add_rect(Vec2::new(150.0, -20.0), Vec2::new(100.0, 10.0));
        assert!(evaluate_probe(&open, &cfg, agent, target, None, dir).is_some());

        // Same probe, but a post now blocks the straight path to the
        // candidate point (without blocking the probe ray itself).
        let mut blocked = StaticWorld::new();
        blocked.add_rect(Vec2::new(150.0, -20.0), Vec2::new(100.0, 10.0));
        blocked.add_rect(Vec2::new(25.0, 15.0), Vec2::new(5.0, 5.0));
        assert!(evaluate_probe(&blocked, &cfg, agent, target, None, dir).is_none());
    }

    #[test]
    fn rejects_candidate_without_progress() {
        let cfg = config();
        let mut world = StaticWorld::new();
        // Wall behind the agent, away from the target.
        world.add_rect(Vec2::new(0.0, -60.0), Vec2::new(50.0, 10.0));

        let agent = Vec2::ZERO;
        let target = Vec2::new(0.0, 100.0);
        assert!(find_cover(&world, &cfg, agent, target, None).is_none());
    }

    #[test]
    fn open_field_yields_no_candidate() {
        let cfg = config();
        let world = StaticWorld::new();
        assert!(find_cover(&world, &cfg, Vec2::ZERO, Vec2::new(200.0, 0.0), None).is_none());
    }

    #[test]
    fn hidden_candidate_outscores_exposed_one() {
        let cfg = config();
        let mut world = StaticWorld::new();
        // A wall between the candidate side and the target hides one flank.
        world.add_rect(Vec2::new(60.0, 120.0), Vec2::new(40.0, 15.0));
        let agent = Vec2::ZERO;
        let target = Vec2::new(60.0, 300.0);

        let chosen = find_cover(&world, &cfg, agent, target, None).unwrap();
        assert!(chosen.is_hidden_from_target);
    }

    #[test]
    fn sector_routes_do_not_share_zones() {
        let cfg = config();
        let center = Vec2::new(500.0, 500.0);
        let visited = HashSet::new();
        let half = TAU / 2.0;

        let first = sector_route(&cfg, center, 0.0, half, &visited);
        let second = sector_route(&cfg, center, half, half, &visited);
        assert!(!first.is_empty());
        assert!(!second.is_empty());

        let zones_a: HashSet<IVec2> = first.iter().map(|&p| zone_key(cfg.zone_size, p)).collect();
        let zones_b: HashSet<IVec2> = second.iter().map(|&p| zone_key(cfg.zone_size, p)).collect();
        assert!(zones_a.is_disjoint(&zones_b));
    }

    #[test]
    fn sector_route_skips_visited_zones() {
        let cfg = config();
        let center = Vec2::ZERO;
        let empty = HashSet::new();
        let full_route = sector_route(&cfg, center, 0.0, TAU / 4.0, &empty);

        let mut visited = HashSet::new();
        visited.insert(zone_key(cfg.zone_size, full_route[0]));
        let pruned = sector_route(&cfg, center, 0.0, TAU / 4.0, &visited);
        assert!(pruned.len() < full_route.len());
        assert!(!pruned
            .iter()
            .any(|&p| zone_key(cfg.zone_size, p) == zone_key(cfg.zone_size, full_route[0])));
    }

    #[test]
    fn exit_points_straddle_the_blocking_obstacle() {
        let cfg = config();
        let mut world = StaticWorld::new();
        let wall = world.add_rect(Vec2::new(100.0, 0.0), Vec2::new(10.0, 60.0));

        let (a, b, obstacle) =
            cover_exit_points(&world, &cfg, Vec2::ZERO, Vec2::new(200.0, 0.0)).unwrap();
        assert_eq!(obstacle, wall);
        assert!((a.y - cfg.exit_offset).abs() < 1e-3);
        assert!((b.y + cfg.exit_offset).abs() < 1e-3);

        // Open line: nothing to track exits around.
        let open = StaticWorld::new();
        assert!(cover_exit_points(&open, &cfg, Vec2::ZERO, Vec2::new(200.0, 0.0)).is_none());
    }

    #[test]
    fn flank_side_prefers_the_unobstructed_lateral() {
        let cfg = config();
        let mut world = StaticWorld::new();
        // Wall on the agent's left flank (positive perp side).
        world.add_rect(Vec2::new(0.0, 80.0), Vec2::new(60.0, 10.0));

        let side = pick_flank_side(&world, &cfg, Vec2::ZERO, Vec2::new(200.0, 0.0));
        assert_eq!(side, Some(-1.0));

        let open = StaticWorld::new();
        assert_eq!(pick_flank_side(&open, &cfg, Vec2::ZERO, Vec2::new(200.0, 0.0)), None);
    }
}
