// src/systems/squad.rs - Proximity squads, roles and coordinated search
//
// Squads are not persisted entities. Every half second the roster is
// reclustered from scratch by mutual proximity; each cluster of two or
// more elects a leader and hands out roles by angular offset from the
// target's aim. Messages are synchronous flag updates on the squad record,
// delivered within the tick they are sent.

use bevy::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::f32::consts::TAU;

use crate::core::*;
use crate::systems::ai::AIState;

const MESSAGE_TTL: f32 = 0.6;
const SEARCH_RECENTER_DISTANCE: f32 = 64.0;

#[derive(Debug, Clone, Copy)]
pub enum SquadMessage {
    SuppressionStarted,
    FlankerInPosition,
    PlayerPosition(Vec2, f32),
    RetreatCalled,
}

/// One angular slice of a shared search area plus the zones any member has
/// already walked. The visited set is shared: ground covered by one
/// searcher is never walked again by another.
pub struct CoordinatedSearch {
    pub center: Vec2,
    pub sectors: Vec<(Entity, f32, f32)>,
    pub visited: HashSet<IVec2>,
}

impl CoordinatedSearch {
    pub fn sector_for(&self, entity: Entity) -> Option<(f32, f32)> {
        self.sectors
            .iter()
            .find(|(e, _, _)| *e == entity)
            .map(|&(_, start, span)| (start, span))
    }
}

#[derive(Default)]
pub struct SquadData {
    pub members: Vec<Entity>,
    pub leader: Option<Entity>,
    pub shared_target: Option<(Vec2, f32)>,
    pub search: Option<CoordinatedSearch>,
    suppressing_until: f32,
    flanker_ready_until: f32,
    retreat_called_until: f32,
}

impl SquadData {
    pub fn suppressing(&self, now: f32) -> bool {
        now < self.suppressing_until
    }

    pub fn flanker_in_position(&self, now: f32) -> bool {
        now < self.flanker_ready_until
    }

    pub fn retreat_called(&self, now: f32) -> bool {
        now < self.retreat_called_until
    }
}

// BTreeMap: squad iteration order is part of the replay contract.
#[derive(Resource, Default)]
pub struct SquadCoordination {
    pub squads: BTreeMap<u32, SquadData>,
    pub recompute_timer: f32,
    next_id: u32,
}

impl SquadCoordination {
    pub fn squad(&self, id: u32) -> Option<&SquadData> {
        self.squads.get(&id)
    }

    pub fn squad_mut(&mut self, id: u32) -> Option<&mut SquadData> {
        self.squads.get_mut(&id)
    }

    /// Same-tick delivery to the whole squad, at most once per call.
    pub fn broadcast(&mut self, squad_id: u32, sender: Entity, message: SquadMessage, now: f32) {
        let Some(squad) = self.squads.get_mut(&squad_id) else {
            return;
        };
        match message {
            SquadMessage::SuppressionStarted => squad.suppressing_until = now + MESSAGE_TTL,
            SquadMessage::FlankerInPosition => squad.flanker_ready_until = now + MESSAGE_TTL,
            SquadMessage::RetreatCalled => {
                squad.retreat_called_until = now + MESSAGE_TTL;
                info!("Enemy {} called the squad back", sender.index());
            }
            SquadMessage::PlayerPosition(position, confidence) => {
                let better = squad
                    .shared_target
                    .map(|(_, held)| confidence >= held)
                    .unwrap_or(true);
                if better {
                    squad.shared_target = Some((position, confidence));
                }
            }
        }
    }

    /// Death and despawn path: the agent must be gone from membership and
    /// search assignments before any other agent plans this tick.
    pub fn remove_member(&mut self, entity: Entity) {
        for squad in self.squads.values_mut() {
            squad.members.retain(|&e| e != entity);
            if squad.leader == Some(entity) {
                squad.leader = None;
            }
            if let Some(search) = &mut squad.search {
                search.sectors.retain(|(e, _, _)| *e != entity);
            }
        }
        self.squads.retain(|_, squad| !squad.members.is_empty());
    }

    pub fn mark_zone_visited(&mut self, squad_id: u32, zone: IVec2) {
        if let Some(squad) = self.squads.get_mut(&squad_id) {
            if let Some(search) = &mut squad.search {
                search.visited.insert(zone);
            }
        }
    }
}

// === CLUSTERING AND ROLES (pure, unit-tested) ===

pub(crate) struct SquadCandidate {
    pub entity: Entity,
    pub position: Vec2,
    pub health: f32,
}

/// Connected components over the mutual-proximity graph, in roster order,
/// split into chunks no larger than `max_size`.
pub(crate) fn cluster_members(
    roster: &[SquadCandidate],
    range: f32,
    max_size: usize,
) -> Vec<Vec<usize>> {
    let n = roster.len();
    let mut assigned = vec![false; n];
    let mut clusters = Vec::new();

    for start in 0..n {
        if assigned[start] {
            continue;
        }
        let mut component = vec![start];
        assigned[start] = true;
        let mut cursor = 0;
        while cursor < component.len() {
            let current = component[cursor];
            cursor += 1;
            for other in 0..n {
                if assigned[other] {
                    continue;
                }
                if roster[current].position.distance(roster[other].position) <= range {
                    assigned[other] = true;
                    component.push(other);
                }
            }
        }
        component.sort();
        for chunk in component.chunks(max_size) {
            clusters.push(chunk.to_vec());
        }
    }
    clusters
}

/// Closest to the target wins; health acts as a negative cost so a
/// healthier agent beats an equally close wounded one.
pub(crate) fn elect_leader(
    roster: &[SquadCandidate],
    cluster: &[usize],
    target_pos: Vec2,
    health_weight: f32,
) -> usize {
    let mut best = cluster[0];
    let mut best_score = f32::MAX;
    for &index in cluster {
        let candidate = &roster[index];
        let score = candidate.position.distance(target_pos) - candidate.health * health_weight;
        if score < best_score {
            best_score = score;
            best = index;
        }
    }
    best
}

/// Roles by angular offset from the target's aim: the member the target is
/// least looking at flanks, the one it stares at suppresses, the next
/// assaults, the rest guard the rear.
pub(crate) fn assign_roles(
    roster: &[SquadCandidate],
    cluster: &[usize],
    leader: usize,
    target_pos: Vec2,
    target_aim: Vec2,
) -> Vec<(usize, SquadRole)> {
    let aim = target_aim.normalize_or_zero();
    let mut others: Vec<(usize, f32)> = cluster
        .iter()
        .copied()
        .filter(|&i| i != leader)
        .map(|i| {
            let dir = (roster[i].position - target_pos).normalize_or_zero();
            let off_axis = 1.0 - aim.dot(dir);
            (i, off_axis)
        })
        .collect();
    // Most off-axis first; index tiebreak keeps the ordering stable.
    others.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    let mut assignments = vec![(leader, SquadRole::Leader)];
    let mut iter = others.into_iter();
    if let Some((flanker, _)) = iter.next() {
        assignments.push((flanker, SquadRole::Flanker));
    }
    let rest: Vec<(usize, f32)> = iter.collect();
    // Remaining are ordered most-off-axis first, so the suppressor is the
    // last entry and the assault the one before it.
    for (position_from_end, &(index, _)) in rest.iter().rev().enumerate() {
        let role = match position_from_end {
            0 => SquadRole::Suppressor,
            1 => SquadRole::Assault,
            _ => SquadRole::RearGuard,
        };
        assignments.push((index, role));
    }
    assignments
}

// === SYSTEM ===

pub fn squad_coordination_system(
    mut commands: Commands,
    mut squads: ResMut<SquadCoordination>,
    mut enemy_query: Query<
        (Entity, &Transform, &Health, &mut TargetMemory, &AIState),
        (With<Enemy>, Without<Dead>),
    >,
    agent_query: Query<(&Transform, &Agent), Without<Dead>>,
    config: Res<AiConfig>,
    time: Res<Time>,
    game_mode: Res<GameMode>,
) {
    if game_mode.paused {
        return;
    }

    squads.recompute_timer -= time.delta_secs();
    if squads.recompute_timer > 0.0 {
        return;
    }
    squads.recompute_timer = config.squad.recompute_interval;
    let now = time.elapsed_secs();

    let mut roster: Vec<SquadCandidate> = enemy_query
        .iter()
        .map(|(entity, transform, health, _, _)| SquadCandidate {
            entity,
            position: transform.translation.truncate(),
            health: health.0,
        })
        .collect();
    roster.sort_by_key(|candidate| candidate.entity.index());

    let clusters = cluster_members(
        &roster,
        config.squad.communication_range,
        config.squad.max_squad_size,
    );

    let old_squads = std::mem::take(&mut squads.squads);
    let mut new_squads = BTreeMap::new();

    for cluster in clusters {
        if cluster.len() < config.squad.min_squad_size {
            for &index in &cluster {
                commands.entity(roster[index].entity).remove::<SquadMember>();
            }
            continue;
        }

        let centroid = cluster
            .iter()
            .map(|&i| roster[i].position)
            .sum::<Vec2>()
            / cluster.len() as f32;

        // Reference target: the nearest live hostile to the cluster. The
        // members' pooled memory stands in when nobody is left alive.
        let nearest_agent = agent_query.iter().min_by(|(a, _), (b, _)| {
            let da = centroid.distance(a.translation.truncate());
            let db = centroid.distance(b.translation.truncate());
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        });

        let (target_pos, target_aim) = match nearest_agent {
            Some((transform, agent)) => (transform.translation.truncate(), agent.aim_direction),
            None => (centroid + Vec2::X, Vec2::X),
        };

        let leader = elect_leader(
            &roster,
            &cluster,
            target_pos,
            config.squad.leader_health_weight,
        );
        let assignments = assign_roles(&roster, &cluster, leader, target_pos, target_aim);

        let squad_id = squads.next_id;
        squads.next_id = squads.next_id.wrapping_add(1);

        for &(index, role) in &assignments {
            commands
                .entity(roster[index].entity)
                .insert(SquadMember { squad_id, role });
        }

        let members: Vec<Entity> = cluster.iter().map(|&i| roster[i].entity).collect();

        // Pool memory: the most confident member pushes its belief to the
        // rest, degraded by the relay factor.
        let best = cluster
            .iter()
            .filter_map(|&i| {
                enemy_query
                    .get(roster[i].entity)
                    .ok()
                    .map(|(_, _, _, memory, _)| (roster[i].entity, memory.clone()))
            })
            .max_by(|(ea, a), (eb, b)| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| eb.index().cmp(&ea.index()))
            });

        let mut shared_target = None;
        let mut any_contact = false;
        if let Some((source_entity, source_memory)) = best {
            if source_memory.has_target() {
                shared_target = Some((source_memory.suspected_position, source_memory.confidence));
                for &member in &members {
                    if member == source_entity {
                        continue;
                    }
                    if let Ok((_, _, _, mut memory, _)) = enemy_query.get_mut(member) {
                        memory.receive_intel(&source_memory, now);
                    }
                }
            }
        }
        for &member in &members {
            if let Ok((_, _, _, _, state)) = enemy_query.get(member) {
                if state.visible_target.is_some() {
                    any_contact = true;
                }
            }
        }

        // Contact lost with a workable last-known point: carve the search
        // disk into one sector per member so nobody circles the same
        // ground. An ongoing search survives recompute as long as the
        // center holds still.
        let wants_search = !any_contact
            && shared_target
                .map(|(_, confidence)| confidence < 0.5)
                .unwrap_or(false);

        let search = if wants_search {
            let center = shared_target.map(|(p, _)| p).unwrap_or(centroid);
            let carried = old_squads.values().find_map(|old| {
                let overlap = old.members.iter().any(|m| members.contains(m));
                match (&old.search, overlap) {
                    (Some(search), true)
                        if search.center.distance(center) < SEARCH_RECENTER_DISTANCE =>
                    {
                        Some((search.center, search.visited.clone()))
                    }
                    _ => None,
                }
            });
            let (center, visited) = carried.unwrap_or((center, HashSet::new()));
            let span = TAU / members.len() as f32;
            let sectors = members
                .iter()
                .enumerate()
                .map(|(i, &entity)| (entity, i as f32 * span, span))
                .collect();
            Some(CoordinatedSearch {
                center,
                sectors,
                visited,
            })
        } else {
            None
        };

        // Message flags carry over so a suppression call does not blink
        // out just because the roster was rebuilt underneath it.
        let carried_flags = old_squads
            .values()
            .find(|old| old.members.iter().any(|m| members.contains(m)));
        let (suppressing_until, flanker_ready_until, retreat_called_until) = carried_flags
            .map(|old| {
                (
                    old.suppressing_until,
                    old.flanker_ready_until,
                    old.retreat_called_until,
                )
            })
            .unwrap_or((0.0, 0.0, 0.0));

        new_squads.insert(
            squad_id,
            SquadData {
                members,
                leader: Some(roster[leader].entity),
                shared_target,
                search,
                suppressing_until,
                flanker_ready_until,
                retreat_called_until,
            },
        );
    }

    squads.squads = new_squads;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(raw_index: u32, position: Vec2, health: f32) -> SquadCandidate {
        SquadCandidate {
            entity: Entity::from_raw(raw_index),
            position,
            health,
        }
    }

    #[test]
    fn distant_stragglers_form_their_own_cluster() {
        let roster = vec![
            candidate(0, Vec2::new(0.0, 0.0), 100.0),
            candidate(1, Vec2::new(100.0, 0.0), 100.0),
            candidate(2, Vec2::new(0.0, 100.0), 100.0),
            candidate(3, Vec2::new(2000.0, 0.0), 100.0),
        ];
        let clusters = cluster_members(&roster, 360.0, 5);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0], vec![0, 1, 2]);
        assert_eq!(clusters[1], vec![3]);
    }

    #[test]
    fn oversized_cluster_splits_at_the_cap() {
        let roster: Vec<SquadCandidate> = (0..7)
            .map(|i| candidate(i, Vec2::new(i as f32 * 30.0, 0.0), 100.0))
            .collect();
        let clusters = cluster_members(&roster, 360.0, 5);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].len(), 5);
        assert_eq!(clusters[1].len(), 2);
    }

    #[test]
    fn leader_is_closest_with_health_as_tiebreak() {
        let roster = vec![
            candidate(0, Vec2::new(100.0, 0.0), 100.0),
            candidate(1, Vec2::new(50.0, 0.0), 100.0),
            candidate(2, Vec2::new(100.0, 1.0), 40.0),
        ];
        let cluster = vec![0, 1, 2];
        assert_eq!(elect_leader(&roster, &cluster, Vec2::ZERO, 0.5), 1);

        // Equal distance: the healthier agent takes it.
        let roster = vec![
            candidate(0, Vec2::new(100.0, 0.0), 40.0),
            candidate(1, Vec2::new(-100.0, 0.0), 90.0),
        ];
        assert_eq!(elect_leader(&roster, &[0, 1], Vec2::ZERO, 0.5), 1);
    }

    #[test]
    fn roles_follow_angular_offset_from_target_aim() {
        // Target at origin aiming +X. Member 1 sits dead ahead (stared
        // at), member 2 off to the side, member 3 behind the target.
        let roster = vec![
            candidate(0, Vec2::new(180.0, 20.0), 100.0),
            candidate(1, Vec2::new(200.0, 0.0), 100.0),
            candidate(2, Vec2::new(0.0, 200.0), 100.0),
            candidate(3, Vec2::new(-200.0, 0.0), 100.0),
        ];
        let cluster = vec![0, 1, 2, 3];
        let assignments = assign_roles(&roster, &cluster, 0, Vec2::ZERO, Vec2::X);
        let role_of = |i: usize| {
            assignments
                .iter()
                .find(|(index, _)| *index == i)
                .map(|(_, role)| *role)
                .unwrap()
        };
        assert_eq!(role_of(0), SquadRole::Leader);
        assert_eq!(role_of(3), SquadRole::Flanker);
        assert_eq!(role_of(1), SquadRole::Suppressor);
        assert_eq!(role_of(2), SquadRole::Assault);
    }

    #[test]
    fn exactly_one_leader_per_assignment() {
        let roster: Vec<SquadCandidate> = (0..5)
            .map(|i| candidate(i, Vec2::new(i as f32 * 40.0, 10.0), 80.0))
            .collect();
        let cluster: Vec<usize> = (0..5).collect();
        let leader = elect_leader(&roster, &cluster, Vec2::new(300.0, 0.0), 0.5);
        let assignments = assign_roles(&roster, &cluster, leader, Vec2::new(300.0, 0.0), -Vec2::X);
        let leaders = assignments
            .iter()
            .filter(|(_, role)| *role == SquadRole::Leader)
            .count();
        assert_eq!(leaders, 1);
        assert_eq!(assignments.len(), 5);
    }

    #[test]
    fn broadcast_flags_expire() {
        let mut coordination = SquadCoordination::default();
        coordination.squads.insert(
            7,
            SquadData {
                members: vec![Entity::from_raw(1)],
                ..Default::default()
            },
        );
        coordination.broadcast(7, Entity::from_raw(1), SquadMessage::SuppressionStarted, 10.0);
        let squad = coordination.squad(7).unwrap();
        assert!(squad.suppressing(10.1));
        assert!(!squad.suppressing(10.0 + MESSAGE_TTL + 0.01));
    }

    #[test]
    fn weaker_position_report_does_not_clobber_shared_target() {
        let mut coordination = SquadCoordination::default();
        coordination
            .squads
            .insert(1, SquadData::default());
        coordination.broadcast(
            1,
            Entity::from_raw(1),
            SquadMessage::PlayerPosition(Vec2::new(10.0, 0.0), 0.9),
            0.0,
        );
        coordination.broadcast(
            1,
            Entity::from_raw(2),
            SquadMessage::PlayerPosition(Vec2::new(99.0, 0.0), 0.4),
            0.0,
        );
        let squad = coordination.squad(1).unwrap();
        assert_eq!(squad.shared_target.unwrap().0, Vec2::new(10.0, 0.0));
    }

    #[test]
    fn removed_member_leaves_sectors_too() {
        let mut coordination = SquadCoordination::default();
        let a = Entity::from_raw(1);
        let b = Entity::from_raw(2);
        coordination.squads.insert(
            3,
            SquadData {
                members: vec![a, b],
                leader: Some(a),
                search: Some(CoordinatedSearch {
                    center: Vec2::ZERO,
                    sectors: vec![(a, 0.0, TAU / 2.0), (b, TAU / 2.0, TAU / 2.0)],
                    visited: HashSet::new(),
                }),
                ..Default::default()
            },
        );
        coordination.remove_member(a);
        let squad = coordination.squad(3).unwrap();
        assert_eq!(squad.members, vec![b]);
        assert_eq!(squad.leader, None);
        assert_eq!(squad.search.as_ref().unwrap().sectors.len(), 1);
    }
}
