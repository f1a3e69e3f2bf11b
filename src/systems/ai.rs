// src/systems/ai.rs - Per-enemy tactical state machine
//
// One pass per enemy per tick: perceive (done upstream), maybe fire the
// distraction override, rebuild planner facts, run transitions, resolve the
// single aim point, fire, then compute movement for whatever mode the
// enemy ended the tick in. Movement is always computed after transitions so
// a freshly-entered mode can never leave the agent standing in a no-op
// state for even one tick.

use bevy::prelude::*;
use rand::Rng;

use crate::core::world_query::WorldQuery;
use crate::core::*;
use crate::systems::cover::{self, CoverCandidate};
use crate::systems::movement::steer;
use crate::systems::squad::{SquadCoordination, SquadMessage};

// === COMPONENTS ===

#[derive(Debug, Clone)]
pub enum AIMode {
    Idle,
    Combat,
    SeekingCover {
        cover: CoverCandidate,
    },
    InCover,
    Flanking {
        side: f32,
        waypoint: Vec2,
    },
    Suppressed,
    Retreating {
        rally: Vec2,
    },
    Pursuing {
        cover: Option<CoverCandidate>,
        approach_until: Option<f32>,
    },
    Assault,
    Searching {
        route: Vec<Vec2>,
        next_index: usize,
    },
}

impl AIMode {
    pub fn label(&self) -> &'static str {
        match self {
            AIMode::Idle => "idle",
            AIMode::Combat => "combat",
            AIMode::SeekingCover { .. } => "seeking_cover",
            AIMode::InCover => "in_cover",
            AIMode::Flanking { .. } => "flanking",
            AIMode::Suppressed => "suppressed",
            AIMode::Retreating { .. } => "retreating",
            AIMode::Pursuing { .. } => "pursuing",
            AIMode::Assault => "assault",
            AIMode::Searching { .. } => "searching",
        }
    }

    /// States where facing must track the threat and never the velocity.
    pub fn actively_engaged(&self) -> bool {
        matches!(
            self,
            AIMode::Combat
                | AIMode::SeekingCover { .. }
                | AIMode::InCover
                | AIMode::Flanking { .. }
                | AIMode::Suppressed
                | AIMode::Retreating { .. }
                | AIMode::Assault
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CornerProbe {
    pub angle: f32,
    pub until: f32,
}

/// Alternating cover-exit aim state. The target hides behind known
/// geometry; we watch the two points it can emerge from, swapping sides on
/// a fixed cadence, and fire at the watched point - not at the hidden
/// true position.
#[derive(Debug, Clone, Copy)]
pub struct ExitAim {
    pub side: bool,
    pub last_swap: f32,
}

impl Default for ExitAim {
    fn default() -> Self {
        Self {
            side: false,
            last_swap: -1.0e6,
        }
    }
}

#[derive(Component)]
pub struct AIState {
    pub mode: AIMode,
    pub mode_entered_at: f32,
    /// Genuine direct sighting happened this encounter. Gates both the
    /// dropped field-of-view check and cover-exit tracking: an enemy that
    /// only heard gunfire must not stalk phantom cover.
    pub engaged: bool,
    pub visible_target: Option<(Entity, Vec2)>,
    pub aim_point: Option<Vec2>,
    pub current_cover_obstacle: Option<ObstacleId>,
    pub cached_cover: Option<CoverCandidate>,
    pub cover_checked_at: f32,
    pub last_incoming_fire: f32,
    pub suppression: f32,
    pub contact_lost: ConditionTimer,
    pub behind_cover: ConditionTimer,
    pub corner_probe: Option<CornerProbe>,
    pub exit_aim: ExitAim,
    pub flank_retry_used: bool,
    pub area_searched: bool,
}

impl Default for AIState {
    fn default() -> Self {
        Self {
            mode: AIMode::Idle,
            mode_entered_at: 0.0,
            engaged: false,
            visible_target: None,
            aim_point: None,
            current_cover_obstacle: None,
            cached_cover: None,
            cover_checked_at: -1.0e6,
            last_incoming_fire: -1.0e6,
            suppression: 0.0,
            contact_lost: ConditionTimer::default(),
            behind_cover: ConditionTimer::default(),
            corner_probe: None,
            exit_aim: ExitAim::default(),
            flank_retry_used: false,
            area_searched: false,
        }
    }
}

// === MAIN SYSTEM ===

pub fn enemy_ai_system(
    mut enemy_query: Query<
        (
            Entity,
            &Transform,
            &mut AIState,
            &mut GoapAgent,
            &mut TargetMemory,
            &mut WeaponState,
            &Morale,
            &Health,
            &MovementSpeed,
            &mut Patrol,
            &mut DesiredVelocity,
            &mut FireIntent,
            &mut StuckDetector,
            Option<&SquadMember>,
        ),
        (With<Enemy>, Without<Dead>),
    >,
    agent_query: Query<(Entity, &Transform, &Agent), Without<Dead>>,
    mut squads: ResMut<SquadCoordination>,
    geometry: Res<WorldGeometry>,
    config: Res<AiConfig>,
    mut rng: ResMut<AiRng>,
    mut sound_events: EventWriter<SoundEvent>,
    mut fire_events: EventWriter<FireEvent>,
    mut transitions: EventWriter<StateChangeEvent>,
    time: Res<Time>,
    game_mode: Res<GameMode>,
) {
    if game_mode.paused {
        return;
    }
    let now = time.elapsed_secs();
    let dt = time.delta_secs();

    let enemy_positions: Vec<(Entity, Vec2)> = enemy_query
        .iter()
        .map(|item| (item.0, item.1.translation.truncate()))
        .collect();

    for (
        entity,
        transform,
        mut ai,
        mut goap,
        mut memory,
        mut weapon,
        morale,
        health,
        speed,
        mut patrol,
        mut velocity,
        mut intent,
        mut stuck,
        member,
    ) in enemy_query.iter_mut()
    {
        let enemy_pos = transform.translation.truncate();
        intent.trigger = false;

        if weapon.tick(dt) {
            sound_events.write(SoundEvent {
                position: enemy_pos,
                kind: SoundKind::Reload,
                source: Some(entity),
            });
        }
        ai.suppression = (ai.suppression - config.combat.suppression_decay * dt).max(0.0);
        if let Some(probe) = ai.corner_probe {
            if now >= probe.until {
                ai.corner_probe = None;
            }
        }

        // --- situational picture ---
        let sees = ai.visible_target.is_some();
        let visible_pos = ai.visible_target.map(|(_, p)| p);
        let memory_point = memory.has_target().then(|| memory.suspected_position);

        let nearest_agent = agent_query.iter().min_by(|(_, a, _), (_, b, _)| {
            let da = enemy_pos.distance(a.translation.truncate());
            let db = enemy_pos.distance(b.translation.truncate());
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        });
        let nearest_pos = nearest_agent.map(|(_, t, _)| t.translation.truncate());

        // The one point the enemy believes the threat to be at.
        let threat_point = visible_pos.or(memory_point).or(nearest_pos);

        let distance_to_threat = threat_point
            .map(|p| enemy_pos.distance(p))
            .unwrap_or(f32::MAX);

        // Can-see and can-hit are deliberately different questions, and
        // can-hit has exactly one definition for every call site.
        let can_hit_visible = sees && distance_to_threat <= config.combat.fire_range;
        let can_hit_memory = memory_point
            .map(|p| {
                enemy_pos.distance(p) <= config.combat.fire_range
                    && geometry.0.raycast(enemy_pos, p).is_none()
            })
            .unwrap_or(false);

        let under_fire = now - ai.last_incoming_fire <= config.combat.under_fire_window;
        let calm = now - ai.last_incoming_fire >= config.combat.calm_window;
        let suppressed_now = ai.suppression >= config.combat.suppression_threshold;
        let injured = health.0 < 50.0;
        let low_health = health.0 <= config.combat.retreat_health;
        let panicked = morale.is_panicked();

        let nearby_hostiles = agent_query
            .iter()
            .filter(|(_, t, _)| enemy_pos.distance(t.translation.truncate()) <= 200.0)
            .count();
        let nearby_allies = enemy_positions
            .iter()
            .filter(|(e, p)| *e != entity && enemy_pos.distance(*p) <= 200.0)
            .count();
        let outnumbered = nearby_hostiles > nearby_allies + 1;

        // --- cover candidate cache (re-probed on a short cadence) ---
        if now - ai.cover_checked_at >= 0.4 {
            ai.cached_cover = threat_point.and_then(|target| {
                cover::find_cover(
                    geometry.0.as_ref(),
                    &config.cover,
                    enemy_pos,
                    target,
                    ai.current_cover_obstacle,
                )
            });
            ai.cover_checked_at = now;
        }

        // --- squad facts ---
        let role = member.map(|m| m.role).unwrap_or(SquadRole::None);
        let squad_id = member.map(|m| m.squad_id);
        let (squad_suppressing, flanker_ready, retreat_called) = squad_id
            .and_then(|id| squads.squad(id))
            .map(|squad| {
                (
                    squad.suppressing(now),
                    squad.flanker_in_position(now),
                    squad.retreat_called(now),
                )
            })
            .unwrap_or((false, false, false));

        // --- distraction override ---
        // Target visible but looking sharply away: fire now, from any
        // state. Only the weapon itself can refuse.
        let mut overrode = false;
        if let Some((target_entity, target_pos)) = ai.visible_target {
            if let Ok((_, _, agent)) = agent_query.get(target_entity) {
                let to_enemy = (enemy_pos - target_pos).normalize_or_zero();
                let aim_dir = agent.aim_direction.normalize_or_zero();
                if to_enemy != Vec2::ZERO && aim_dir != Vec2::ZERO {
                    let divergence = aim_dir.dot(to_enemy).clamp(-1.0, 1.0).acos();
                    if divergence > config.combat.distraction_angle_degrees.to_radians() {
                        let direction = -to_enemy;
                        if try_fire(
                            entity,
                            enemy_pos,
                            direction,
                            &mut weapon,
                            &mut intent,
                            &mut fire_events,
                            &mut sound_events,
                        ) {
                            ai.aim_point = Some(target_pos);
                            overrode = true;
                        }
                    }
                }
            }
        }

        // --- planner facts and replanning ---
        let in_cover_now = matches!(ai.mode, AIMode::InCover | AIMode::Suppressed);
        goap.update_multiple([
            (WorldKey::HasTarget, sees || memory.has_target()),
            (WorldKey::TargetVisible, sees),
            (WorldKey::CanHitTarget, can_hit_visible || can_hit_memory),
            (
                WorldKey::InWeaponRange,
                distance_to_threat <= config.combat.fire_range,
            ),
            (
                WorldKey::WeaponLoaded,
                weapon.current_ammo > 0 && !weapon.is_reloading,
            ),
            (WorldKey::InCover, in_cover_now),
            (WorldKey::CoverAvailable, ai.cached_cover.is_some()),
            (WorldKey::UnderFire, under_fire),
            (WorldKey::IsInjured, injured),
            (WorldKey::Outnumbered, outnumbered),
            (
                WorldKey::AtSafeDistance,
                distance_to_threat >= config.combat.safe_distance,
            ),
            (
                WorldKey::IsRetreating,
                matches!(ai.mode, AIMode::Retreating { .. }),
            ),
            (WorldKey::AreaSearched, ai.area_searched),
            (
                WorldKey::FlankingPosition,
                matches!(ai.mode, AIMode::Flanking { .. }),
            ),
            (WorldKey::HasSquad, squad_id.is_some()),
            (WorldKey::SquadSuppressing, squad_suppressing),
            (WorldKey::FlankerInPosition, flanker_ready),
            (WorldKey::TargetSuppressed, squad_suppressing),
            (
                WorldKey::TacticalAdvantage,
                squad_suppressing && flanker_ready,
            ),
        ]);

        goap.planning_cooldown -= dt;
        let goal_name = goap.current_goal.as_ref().map(|g| g.name);
        let invalidated = (low_health || panicked) && goal_name != Some("stay_alive");
        if goap.current_plan.is_empty() || goap.planning_cooldown <= 0.0 || invalidated {
            let ctx = CostCtx {
                role,
                health_frac: (health.0 / 100.0).clamp(0.0, 1.0),
                distance_to_target: distance_to_threat,
                has_squad: squad_id.is_some(),
            };
            goap.plan(&ctx);
            goap.planning_cooldown = match (injured, sees || memory.has_target()) {
                (true, _) => 0.3,
                (_, true) => 0.5,
                _ => 2.0,
            };
        }
        let directive = goap.directive();

        // --- transitions ---
        let threat_context = sees || memory.has_target() || under_fire;

        // Broken agents leave the fight no matter what the plan says; a
        // squad-wide retreat call pulls wounded members out early too.
        let wants_retreat = low_health || panicked || (retreat_called && injured && !sees);
        if wants_retreat && threat_context && !matches!(ai.mode, AIMode::Retreating { .. }) {
            let threat = threat_point.unwrap_or(enemy_pos + Vec2::X);
            let mut away = (enemy_pos - threat).normalize_or_zero();
            if away == Vec2::ZERO {
                away = Vec2::X;
            }
            let rally = enemy_pos + away * 300.0;
            if let Some(id) = squad_id {
                squads.broadcast(id, entity, SquadMessage::RetreatCalled, now);
            }
            enter_mode(entity, &mut ai, AIMode::Retreating { rally }, now, &mut transitions);
        } else {
            match ai.mode.clone() {
                AIMode::Idle => {
                    if sees {
                        enter_mode(entity, &mut ai, AIMode::Combat, now, &mut transitions);
                    } else if under_fire && ai.cached_cover.is_some() {
                        let cover = ai.cached_cover.clone().unwrap();
                        enter_mode(
                            entity,
                            &mut ai,
                            AIMode::SeekingCover { cover },
                            now,
                            &mut transitions,
                        );
                    } else if memory.has_target() {
                        match memory.pursuit_mode() {
                            PursuitMode::DirectPursuit | PursuitMode::CautiousApproach => {
                                let target = memory.suspected_position;
                                let next = begin_pursuit(
                                    geometry.0.as_ref(),
                                    &config,
                                    enemy_pos,
                                    target,
                                    ai.current_cover_obstacle,
                                    now,
                                );
                                enter_mode(entity, &mut ai, next, now, &mut transitions);
                            }
                            PursuitMode::Search => {
                                let next = begin_search(
                                    &config,
                                    &squads,
                                    entity,
                                    squad_id,
                                    memory.suspected_position,
                                );
                                enter_mode(entity, &mut ai, next, now, &mut transitions);
                            }
                            PursuitMode::Patrol => {}
                        }
                    }
                }

                AIMode::Combat => {
                    if suppressed_now && ai.current_cover_obstacle.is_some() {
                        enter_mode(entity, &mut ai, AIMode::Suppressed, now, &mut transitions);
                    } else if sees
                        && squad_suppressing
                        && matches!(role, SquadRole::Assault | SquadRole::Leader)
                    {
                        enter_mode(entity, &mut ai, AIMode::Assault, now, &mut transitions);
                    } else if under_fire && !sees && ai.cached_cover.is_some() {
                        let cover = ai.cached_cover.clone().unwrap();
                        enter_mode(
                            entity,
                            &mut ai,
                            AIMode::SeekingCover { cover },
                            now,
                            &mut transitions,
                        );
                    } else if under_fire
                        && sees
                        && injured
                        && ai.cached_cover.is_some()
                        && directive == Some(ActionKind::TakeCover)
                    {
                        let cover = ai.cached_cover.clone().unwrap();
                        enter_mode(
                            entity,
                            &mut ai,
                            AIMode::SeekingCover { cover },
                            now,
                            &mut transitions,
                        );
                    } else {
                        // Contact lost: raycast flicker at geometry edges
                        // must not bounce us out, hence the held timer.
                        let lost = !sees && !can_hit_memory;
                        if ai
                            .contact_lost
                            .update(lost, dt, config.combat.contact_lost_duration)
                        {
                            if directive == Some(ActionKind::Flank) && memory.has_target() {
                                let next = begin_flank(
                                    geometry.0.as_ref(),
                                    &config,
                                    &mut rng,
                                    enemy_pos,
                                    memory.suspected_position,
                                    nearest_agent.map(|(_, _, a)| a.aim_direction),
                                );
                                ai.flank_retry_used = false;
                                enter_mode(entity, &mut ai, next, now, &mut transitions);
                            } else if memory.has_target() {
                                let target = memory.suspected_position;
                                let next = begin_pursuit(
                                    geometry.0.as_ref(),
                                    &config,
                                    enemy_pos,
                                    target,
                                    ai.current_cover_obstacle,
                                    now,
                                );
                                enter_mode(entity, &mut ai, next, now, &mut transitions);
                            } else {
                                enter_mode(entity, &mut ai, AIMode::Idle, now, &mut transitions);
                            }
                        }
                    }
                }

                AIMode::SeekingCover { cover } => {
                    if enemy_pos.distance(cover.position) <= 10.0 {
                        ai.current_cover_obstacle = Some(cover.obstacle);
                        goap.advance_if(ActionKind::TakeCover);
                        enter_mode(entity, &mut ai, AIMode::InCover, now, &mut transitions);
                    } else if stuck.stalled {
                        // This spot is unreachable; probe again without it.
                        ai.cached_cover = None;
                        ai.cover_checked_at = -1.0e6;
                        stuck.reset(enemy_pos, now);
                        enter_mode(entity, &mut ai, AIMode::Combat, now, &mut transitions);
                    }
                }

                AIMode::InCover => {
                    if suppressed_now {
                        enter_mode(entity, &mut ai, AIMode::Suppressed, now, &mut transitions);
                    } else if calm {
                        if sees {
                            enter_mode(entity, &mut ai, AIMode::Combat, now, &mut transitions);
                        } else if memory.has_target() {
                            let target = memory.suspected_position;
                            let next = begin_pursuit(
                                geometry.0.as_ref(),
                                &config,
                                enemy_pos,
                                target,
                                ai.current_cover_obstacle,
                                now,
                            );
                            enter_mode(entity, &mut ai, next, now, &mut transitions);
                        } else {
                            ai.current_cover_obstacle = None;
                            enter_mode(entity, &mut ai, AIMode::Idle, now, &mut transitions);
                        }
                    }
                }

                AIMode::Suppressed => {
                    if !suppressed_now && calm {
                        enter_mode(entity, &mut ai, AIMode::InCover, now, &mut transitions);
                    }
                }

                AIMode::Flanking { side, waypoint } => {
                    // Exit needs a shot that will actually connect, not
                    // just a sightline.
                    if sees && can_hit_visible {
                        goap.advance_if(ActionKind::Flank);
                        if let Some(id) = squad_id {
                            squads.broadcast(id, entity, SquadMessage::FlankerInPosition, now);
                        }
                        enter_mode(entity, &mut ai, AIMode::Combat, now, &mut transitions);
                    } else if stuck.stalled {
                        if !ai.flank_retry_used {
                            // One retry on the mirrored side, then give up
                            // and fight directly.
                            ai.flank_retry_used = true;
                            stuck.reset(enemy_pos, now);
                            if let Some(target) = threat_point {
                                let waypoint = cover::flank_waypoint(
                                    target,
                                    nearest_agent
                                        .map(|(_, _, a)| a.aim_direction)
                                        .unwrap_or(Vec2::ZERO),
                                    (enemy_pos - target).normalize_or_zero(),
                                    -side,
                                    config.combat.preferred_range,
                                );
                                enter_mode(
                                    entity,
                                    &mut ai,
                                    AIMode::Flanking {
                                        side: -side,
                                        waypoint,
                                    },
                                    now,
                                    &mut transitions,
                                );
                            }
                        } else {
                            enter_mode(entity, &mut ai, AIMode::Combat, now, &mut transitions);
                        }
                    } else if enemy_pos.distance(waypoint) <= 12.0 {
                        // Keep circling the same side until the shot opens.
                        if let Some(target) = threat_point {
                            let waypoint = cover::flank_waypoint(
                                target,
                                nearest_agent
                                    .map(|(_, _, a)| a.aim_direction)
                                    .unwrap_or(Vec2::ZERO),
                                (enemy_pos - target).normalize_or_zero(),
                                side,
                                config.combat.preferred_range * 0.8,
                            );
                            ai.mode = AIMode::Flanking { side, waypoint };
                        }
                    } else if !memory.has_target() && !sees {
                        enter_mode(entity, &mut ai, AIMode::Idle, now, &mut transitions);
                    }
                }

                AIMode::Retreating { rally } => {
                    let safe = distance_to_threat >= config.combat.safe_distance;
                    if enemy_pos.distance(rally) <= 12.0 || safe {
                        goap.advance_if(ActionKind::Retreat);
                        if sees && !low_health && !panicked {
                            enter_mode(entity, &mut ai, AIMode::Combat, now, &mut transitions);
                        } else {
                            enter_mode(entity, &mut ai, AIMode::Idle, now, &mut transitions);
                        }
                    }
                }

                AIMode::Pursuing {
                    cover: hop,
                    approach_until,
                } => {
                    if sees && can_hit_visible {
                        goap.advance_if(ActionKind::CloseDistance);
                        enter_mode(entity, &mut ai, AIMode::Combat, now, &mut transitions);
                    } else if can_hit_memory && threat_point.is_some() {
                        enter_mode(entity, &mut ai, AIMode::Combat, now, &mut transitions);
                    } else if !memory.has_target() && !sees {
                        enter_mode(entity, &mut ai, AIMode::Idle, now, &mut transitions);
                    } else if memory.pursuit_mode() == PursuitMode::Search && !sees {
                        let next = begin_search(
                            &config,
                            &squads,
                            entity,
                            squad_id,
                            memory.suspected_position,
                        );
                        enter_mode(entity, &mut ai, next, now, &mut transitions);
                    } else if let Some(cover_target) = hop {
                        if enemy_pos.distance(cover_target.position) <= 10.0 {
                            ai.current_cover_obstacle = Some(cover_target.obstacle);
                            // Hop complete: look for the next piece of
                            // cover closer in, or switch to approach.
                            let target = memory.suspected_position;
                            let next = begin_pursuit(
                                geometry.0.as_ref(),
                                &config,
                                enemy_pos,
                                target,
                                ai.current_cover_obstacle,
                                now,
                            );
                            enter_mode(entity, &mut ai, next, now, &mut transitions);
                        } else if stuck.stalled {
                            stuck.reset(enemy_pos, now);
                            ai.mode = AIMode::Pursuing {
                                cover: None,
                                approach_until: Some(now + config.combat.approach_timeout),
                            };
                        }
                    } else if let Some(deadline) = approach_until {
                        if now >= deadline {
                            enter_mode(entity, &mut ai, AIMode::Combat, now, &mut transitions);
                        }
                    }
                }

                AIMode::Assault => {
                    if !sees && !memory.has_target() {
                        enter_mode(entity, &mut ai, AIMode::Idle, now, &mut transitions);
                    } else if sees && distance_to_threat <= config.combat.preferred_range {
                        goap.advance_if(ActionKind::AssaultPush);
                        enter_mode(entity, &mut ai, AIMode::Combat, now, &mut transitions);
                    } else if !squad_suppressing && under_fire && !sees {
                        enter_mode(entity, &mut ai, AIMode::Combat, now, &mut transitions);
                    }
                }

                AIMode::Searching { route, next_index } => {
                    if sees {
                        enter_mode(entity, &mut ai, AIMode::Combat, now, &mut transitions);
                    } else if next_index >= route.len() {
                        // Route exhausted, nothing found. Let the belief go
                        // rather than orbiting the same cold trail.
                        ai.area_searched = true;
                        memory.forget();
                        goap.advance_if(ActionKind::Search);
                        enter_mode(entity, &mut ai, AIMode::Idle, now, &mut transitions);
                    } else if stuck.stalled {
                        // Unreachable waypoint: abandon it, not the search.
                        stuck.reset(enemy_pos, now);
                        ai.mode = AIMode::Searching {
                            route,
                            next_index: next_index + 1,
                        };
                    } else if enemy_pos.distance(route[next_index]) <= 14.0 {
                        if let Some(id) = squad_id {
                            let zone = cover::zone_key(config.cover.zone_size, route[next_index]);
                            squads.mark_zone_visited(id, zone);
                        }
                        ai.mode = AIMode::Searching {
                            route,
                            next_index: next_index + 1,
                        };
                    }
                }
            }
        }

        if memory.has_target() {
            ai.area_searched = false;
        }

        // --- aim resolution (one authority, strict priority) ---
        // Actively-engaged facing is the visible target, else the
        // remembered position, else the real position as last resort. The
        // velocity vector is never an aim source here.
        if ai.mode.actively_engaged() {
            let mut aim = visible_pos.or(memory_point).or(nearest_pos);

            // Cover-exit tracking: only with a confirmed sighting this
            // encounter, and only once the hidden condition has held
            // long enough to not be raycast flicker.
            if ai.engaged && !sees {
                if let Some(suspected) = memory_point {
                    let hidden = geometry.0.raycast(enemy_pos, suspected).is_some();
                    if ai
                        .behind_cover
                        .update(hidden, dt, config.combat.hysteresis)
                    {
                        if let Some((exit_a, exit_b, _)) = cover::cover_exit_points(
                            geometry.0.as_ref(),
                            &config.cover,
                            enemy_pos,
                            suspected,
                        ) {
                            if now - ai.exit_aim.last_swap >= config.cover.exit_swap_interval {
                                ai.exit_aim.side = !ai.exit_aim.side;
                                ai.exit_aim.last_swap = now;
                            }
                            aim = Some(if ai.exit_aim.side { exit_a } else { exit_b });
                        }
                    }
                } else {
                    ai.behind_cover.reset();
                }
            } else {
                ai.behind_cover.reset();
            }

            if !overrode {
                ai.aim_point = aim;
            }
        } else if !overrode {
            ai.aim_point = None;
        }

        // --- fire decision ---
        // Fire direction and aim direction are the same vector by
        // construction; a hidden target is shot at through its watched
        // exit point, never at its unseen true position.
        if !overrode {
            let wants_fire = match ai.mode {
                AIMode::Combat | AIMode::Assault | AIMode::Retreating { .. } => can_hit_visible,
                AIMode::InCover | AIMode::Suppressed => {
                    can_hit_visible
                        || (role == SquadRole::Suppressor
                            && directive == Some(ActionKind::Suppress)
                            && ai.engaged
                            && ai.aim_point.is_some())
                }
                _ => false,
            };
            if wants_fire {
                if let Some(aim) = ai.aim_point {
                    let direction = (aim - enemy_pos).normalize_or_zero();
                    if try_fire(
                        entity,
                        enemy_pos,
                        direction,
                        &mut weapon,
                        &mut intent,
                        &mut fire_events,
                        &mut sound_events,
                    ) && !can_hit_visible
                    {
                        // Blind suppression on the exit point.
                        if let Some(id) = squad_id {
                            squads.broadcast(id, entity, SquadMessage::SuppressionStarted, now);
                        }
                    }
                }
            }
        }

        // Fresh first-hand contact is worth telling the squad about.
        if sees {
            if let (Some(id), Some(position)) = (squad_id, visible_pos) {
                squads.broadcast(
                    id,
                    entity,
                    SquadMessage::PlayerPosition(position, memory.confidence),
                    now,
                );
            }
        }

        // --- movement for the mode we ended the tick in ---
        let mode_now = ai.mode.clone();
        let desired = match &mode_now {
            AIMode::Idle => {
                let mut v = Vec2::ZERO;
                if let Some(target) = patrol.current_target() {
                    if enemy_pos.distance(target) <= 16.0 {
                        patrol.advance();
                    } else {
                        let (vel, hit) = steer(
                            geometry.0.as_ref(),
                            enemy_pos,
                            target,
                            speed.0,
                            config.combat.avoid_probe_distance,
                        );
                        v = vel;
                        maybe_probe_corner(&mut ai, enemy_pos, hit, now, &config);
                    }
                }
                v
            }
            AIMode::Combat => {
                if let Some(target) = threat_point {
                    if sees && distance_to_threat < config.combat.preferred_range * 0.5 {
                        // Too close for comfort; open the range back up.
                        (enemy_pos - target).normalize_or_zero() * speed.0 * 0.6
                    } else if distance_to_threat > config.combat.preferred_range {
                        let (vel, hit) = steer(
                            geometry.0.as_ref(),
                            enemy_pos,
                            target,
                            speed.0,
                            config.combat.avoid_probe_distance,
                        );
                        maybe_probe_corner(&mut ai, enemy_pos, hit, now, &config);
                        vel
                    } else {
                        Vec2::ZERO
                    }
                } else {
                    Vec2::ZERO
                }
            }
            AIMode::SeekingCover { cover } => {
                let (vel, hit) = steer(
                    geometry.0.as_ref(),
                    enemy_pos,
                    cover.position,
                    speed.0,
                    config.combat.avoid_probe_distance,
                );
                maybe_probe_corner(&mut ai, enemy_pos, hit, now, &config);
                vel
            }
            AIMode::InCover | AIMode::Suppressed => Vec2::ZERO,
            AIMode::Flanking { waypoint, .. } => {
                let (vel, hit) = steer(
                    geometry.0.as_ref(),
                    enemy_pos,
                    *waypoint,
                    speed.0,
                    config.combat.avoid_probe_distance,
                );
                maybe_probe_corner(&mut ai, enemy_pos, hit, now, &config);
                vel
            }
            AIMode::Retreating { rally } => {
                let (vel, _) = steer(
                    geometry.0.as_ref(),
                    enemy_pos,
                    *rally,
                    speed.0 * 1.2,
                    config.combat.avoid_probe_distance,
                );
                vel
            }
            AIMode::Pursuing { cover: hop, .. } => {
                let goal = hop.as_ref().map(|c| c.position).or(threat_point);
                match goal {
                    Some(goal) => {
                        let (vel, hit) = steer(
                            geometry.0.as_ref(),
                            enemy_pos,
                            goal,
                            speed.0,
                            config.combat.avoid_probe_distance,
                        );
                        maybe_probe_corner(&mut ai, enemy_pos, hit, now, &config);
                        vel
                    }
                    None => Vec2::ZERO,
                }
            }
            AIMode::Assault => match threat_point {
                Some(target) => {
                    let (vel, hit) = steer(
                        geometry.0.as_ref(),
                        enemy_pos,
                        target,
                        speed.0,
                        config.combat.avoid_probe_distance,
                    );
                    maybe_probe_corner(&mut ai, enemy_pos, hit, now, &config);
                    vel
                }
                None => Vec2::ZERO,
            },
            AIMode::Searching { route, next_index } => {
                if let Some(&waypoint) = route.get(*next_index) {
                    let (vel, hit) = steer(
                        geometry.0.as_ref(),
                        enemy_pos,
                        waypoint,
                        speed.0 * 0.8,
                        config.combat.avoid_probe_distance,
                    );
                    maybe_probe_corner(&mut ai, enemy_pos, hit, now, &config);
                    vel
                } else {
                    Vec2::ZERO
                }
            }
        };
        velocity.0 = desired;
    }
}

// === HELPERS ===

fn enter_mode(
    entity: Entity,
    ai: &mut AIState,
    next: AIMode,
    now: f32,
    transitions: &mut EventWriter<StateChangeEvent>,
) {
    let from = ai.mode.label();
    let to = next.label();
    if from != to {
        transitions.write(StateChangeEvent {
            entity,
            from,
            to,
            at: now,
        });
        info!("Enemy {} {} -> {}", entity.index(), from, to);
    }
    ai.mode = next;
    ai.mode_entered_at = now;
    ai.contact_lost.reset();
    ai.behind_cover.reset();
    ai.corner_probe = None;
}

/// Pursue by cover hops when any cover exists, otherwise go straight to a
/// time-boxed approach phase - explicitly never a do-nothing state.
fn begin_pursuit(
    world: &dyn WorldQuery,
    config: &AiConfig,
    enemy_pos: Vec2,
    target: Vec2,
    current_obstacle: Option<ObstacleId>,
    now: f32,
) -> AIMode {
    match cover::find_cover(world, &config.cover, enemy_pos, target, current_obstacle) {
        Some(candidate) => AIMode::Pursuing {
            cover: Some(candidate),
            approach_until: None,
        },
        None => AIMode::Pursuing {
            cover: None,
            approach_until: Some(now + config.combat.approach_timeout),
        },
    }
}

/// The flank side is chosen once, preferring the laterally-clear side, and
/// stays fixed for the whole maneuver.
fn begin_flank(
    world: &dyn WorldQuery,
    config: &AiConfig,
    rng: &mut AiRng,
    enemy_pos: Vec2,
    target: Vec2,
    target_aim: Option<Vec2>,
) -> AIMode {
    let side = cover::pick_flank_side(world, &config.cover, enemy_pos, target)
        .unwrap_or_else(|| if rng.rng.gen_bool(0.5) { 1.0 } else { -1.0 });
    let waypoint = cover::flank_waypoint(
        target,
        target_aim.unwrap_or(Vec2::ZERO),
        (enemy_pos - target).normalize_or_zero(),
        side,
        config.combat.preferred_range,
    );
    AIMode::Flanking { side, waypoint }
}

/// Search route: the assigned sector of a coordinated squad search when one
/// exists, a lone expanding ring otherwise.
fn begin_search(
    config: &AiConfig,
    squads: &SquadCoordination,
    entity: Entity,
    squad_id: Option<u32>,
    center: Vec2,
) -> AIMode {
    let route = squad_id
        .and_then(|id| squads.squad(id))
        .and_then(|squad| squad.search.as_ref())
        .and_then(|search| {
            search.sector_for(entity).map(|(start, span)| {
                cover::sector_route(&config.cover, search.center, start, span, &search.visited)
            })
        })
        .unwrap_or_else(|| cover::spiral_route(&config.cover, center));
    AIMode::Searching {
        route,
        next_index: 0,
    }
}

fn maybe_probe_corner(
    ai: &mut AIState,
    enemy_pos: Vec2,
    hit: Option<RayHit>,
    now: f32,
    config: &AiConfig,
) {
    // Corner peeks matter only while facing is velocity-driven; in an
    // engaged state the threat owns the rotation authority outright.
    if ai.mode.actively_engaged() || ai.corner_probe.is_some() {
        return;
    }
    if let Some(hit) = hit {
        let to_corner = hit.point - enemy_pos;
        ai.corner_probe = Some(CornerProbe {
            angle: to_corner.y.atan2(to_corner.x),
            until: now + config.combat.corner_probe_duration,
        });
    }
}

fn try_fire(
    entity: Entity,
    origin: Vec2,
    direction: Vec2,
    weapon: &mut WeaponState,
    intent: &mut FireIntent,
    fire_events: &mut EventWriter<FireEvent>,
    sound_events: &mut EventWriter<SoundEvent>,
) -> bool {
    if direction == Vec2::ZERO {
        return false;
    }
    if weapon.ready() {
        weapon.discharge();
        intent.direction = direction;
        intent.trigger = true;
        fire_events.write(FireEvent {
            shooter: entity,
            origin,
            direction,
        });
        sound_events.write(SoundEvent {
            position: origin,
            kind: SoundKind::Gunshot,
            source: Some(entity),
        });
        true
    } else {
        if weapon.current_ammo == 0 && !weapon.is_reloading {
            weapon.start_reload();
            sound_events.write(SoundEvent {
                position: origin,
                kind: SoundKind::EmptyClick,
                source: Some(entity),
            });
        }
        false
    }
}
