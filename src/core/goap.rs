// src/core/goap.rs - Goal-oriented action planning over boolean world facts
use bevy::prelude::*;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};

use crate::core::components::SquadRole;

macro_rules! world_state {
    ( $( $key:expr => $value:expr ),* $(,)? ) => {{
        let mut map = HashMap::new();
        $( map.insert($key, $value); )*
        map
    }};
}

// === CORE TYPES ===
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WorldKey {
    // Knowledge & Awareness
    HasTarget, TargetVisible, AreaSearched,
    // Combat
    CanHitTarget, InWeaponRange, WeaponLoaded, UnderFire, IsInjured, Outnumbered,
    // Positioning
    InCover, CoverAvailable, AtSafeDistance, IsRetreating, FlankingPosition,
    // Squad
    HasSquad, SquadSuppressing, FlankerInPosition, TargetSuppressed, TacticalAdvantage,
}

pub type WorldState = HashMap<WorldKey, bool>;

/// What the planner knows about the agent when pricing actions. Role-based
/// costs are how squad tactics emerge from independent per-agent planning.
#[derive(Debug, Clone, Copy)]
pub struct CostCtx {
    pub role: SquadRole,
    pub health_frac: f32,
    pub distance_to_target: f32,
    pub has_squad: bool,
}

impl Default for CostCtx {
    fn default() -> Self {
        Self {
            role: SquadRole::None,
            health_frac: 1.0,
            distance_to_target: 0.0,
            has_squad: false,
        }
    }
}

/// How the state machine should act on a planned step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Engage,
    CloseDistance,
    Flank,
    Suppress,
    AssaultPush,
    TakeCover,
    Retreat,
    Search,
}

#[derive(Debug, Clone)]
pub struct TacticalAction {
    pub name: &'static str,
    pub base_cost: f32,
    pub cost_fn: Option<fn(&CostCtx) -> f32>,
    pub preconditions: WorldState,
    pub effects: WorldState,
    pub kind: ActionKind,
}

impl TacticalAction {
    pub fn cost(&self, ctx: &CostCtx) -> f32 {
        match self.cost_fn {
            Some(f) => f(ctx),
            None => self.base_cost,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Goal {
    pub name: &'static str,
    pub priority: f32,
    pub desired_state: WorldState,
}

// === PLANNER ===
pub const MAX_PLAN_DEPTH: usize = 10;
pub const MAX_ITERATIONS: usize = 1000;

#[derive(Component)]
pub struct GoapAgent {
    pub current_plan: VecDeque<TacticalAction>,
    pub current_goal: Option<Goal>,
    pub world_state: WorldState,
    pub available_actions: Vec<TacticalAction>,
    pub goals: Vec<Goal>,
    pub planning_cooldown: f32,
}

impl Default for GoapAgent {
    fn default() -> Self {
        let mut agent = Self {
            current_plan: VecDeque::new(),
            current_goal: None,
            world_state: WorldState::new(),
            available_actions: create_action_library(),
            goals: create_goal_library(),
            planning_cooldown: 0.0,
        };
        agent.setup_initial_world_state();
        agent
    }
}

impl GoapAgent {
    fn setup_initial_world_state(&mut self) {
        self.world_state = world_state![
            WorldKey::HasTarget => false, WorldKey::TargetVisible => false, WorldKey::AreaSearched => false,
            WorldKey::CanHitTarget => false, WorldKey::InWeaponRange => false, WorldKey::WeaponLoaded => true,
            WorldKey::UnderFire => false, WorldKey::IsInjured => false, WorldKey::Outnumbered => false,
            WorldKey::InCover => false, WorldKey::CoverAvailable => false, WorldKey::AtSafeDistance => true,
            WorldKey::IsRetreating => false, WorldKey::FlankingPosition => false, WorldKey::HasSquad => false,
            WorldKey::SquadSuppressing => false, WorldKey::FlankerInPosition => false,
            WorldKey::TargetSuppressed => false, WorldKey::TacticalAdvantage => false,
        ];
    }

    pub fn update_world_state(&mut self, key: WorldKey, value: bool) {
        self.world_state.insert(key, value);
    }

    pub fn update_multiple(&mut self, updates: impl IntoIterator<Item = (WorldKey, bool)>) {
        for (key, value) in updates {
            self.update_world_state(key, value);
        }
    }

    /// Plans for the highest-priority unsatisfied goal that admits a plan.
    /// Returns false when no goal needs work or none can be planned for.
    pub fn plan(&mut self, ctx: &CostCtx) -> bool {
        let mut order: Vec<usize> = (0..self.goals.len()).collect();
        order.sort_by(|&a, &b| {
            self.goals[b]
                .priority
                .partial_cmp(&self.goals[a].priority)
                .unwrap_or(Ordering::Equal)
        });

        for goal_index in order {
            let goal = &self.goals[goal_index];
            if is_satisfied(&self.world_state, &goal.desired_state) {
                continue;
            }
            let (steps, _) = find_plan(
                &self.world_state,
                &goal.desired_state,
                &self.available_actions,
                ctx,
            );
            if !steps.is_empty() {
                self.current_goal = Some(goal.clone());
                self.current_plan = steps
                    .into_iter()
                    .map(|i| self.available_actions[i].clone())
                    .collect();
                return true;
            }
        }

        self.current_goal = None;
        self.current_plan.clear();
        false
    }

    /// The step the state machine should be working on right now.
    pub fn directive(&self) -> Option<ActionKind> {
        self.current_plan.front().map(|a| a.kind)
    }

    /// Pops the front step once the state machine has carried it out.
    pub fn advance_if(&mut self, kind: ActionKind) {
        if self.directive() == Some(kind) {
            self.current_plan.pop_front();
        }
    }

    pub fn abort_plan(&mut self) {
        self.current_plan.clear();
        self.current_goal = None;
    }
}

pub fn is_satisfied(state: &WorldState, desired: &WorldState) -> bool {
    desired
        .iter()
        .all(|(key, &value)| *state.get(key).unwrap_or(&false) == value)
}

fn preconditions_met(preconditions: &WorldState, state: &WorldState) -> bool {
    preconditions
        .iter()
        .all(|(key, &value)| *state.get(key).unwrap_or(&false) == value)
}

fn unsatisfied_count(state: &WorldState, desired: &WorldState) -> usize {
    desired
        .iter()
        .filter(|(key, &value)| *state.get(key).unwrap_or(&false) != value)
        .count()
}

/// Sorted key/value fingerprint so equivalent states dedupe regardless of
/// map iteration order.
fn fingerprint(state: &WorldState) -> Vec<(WorldKey, bool)> {
    let mut pairs: Vec<(WorldKey, bool)> = state.iter().map(|(&k, &v)| (k, v)).collect();
    pairs.sort();
    pairs
}

struct PlanNode {
    state: WorldState,
    steps: Vec<usize>,
    g: f32,
    f: f32,
    seq: u64,
}

impl PartialEq for PlanNode {
    fn eq(&self, other: &Self) -> bool {
        self.f == other.f && self.seq == other.seq
    }
}

impl Eq for PlanNode {}

impl PartialOrd for PlanNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PlanNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse for min-heap; ties resolve to the earlier-pushed node so
        // identical inputs always reproduce the same plan.
        other
            .f
            .partial_cmp(&self.f)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A* over world states. Returns the action indices of the cheapest plan,
/// plus the number of expanded nodes. Empty plan covers both "goal already
/// holds" and "no plan exists" — the caller falls back either way.
pub fn find_plan(
    start: &WorldState,
    goal: &WorldState,
    actions: &[TacticalAction],
    ctx: &CostCtx,
) -> (Vec<usize>, usize) {
    if is_satisfied(start, goal) {
        return (Vec::new(), 0);
    }

    let costs: Vec<f32> = actions.iter().map(|a| a.cost(ctx)).collect();

    let mut frontier = BinaryHeap::new();
    let mut best_cost: HashMap<Vec<(WorldKey, bool)>, f32> = HashMap::new();
    let mut seq: u64 = 0;
    let mut expanded = 0;

    best_cost.insert(fingerprint(start), 0.0);
    frontier.push(PlanNode {
        state: start.clone(),
        steps: Vec::new(),
        g: 0.0,
        f: unsatisfied_count(start, goal) as f32,
        seq,
    });

    while let Some(node) = frontier.pop() {
        expanded += 1;
        if expanded > MAX_ITERATIONS {
            break;
        }
        if is_satisfied(&node.state, goal) {
            return (node.steps, expanded);
        }
        if node.steps.len() >= MAX_PLAN_DEPTH {
            continue;
        }

        for (index, action) in actions.iter().enumerate() {
            if !preconditions_met(&action.preconditions, &node.state) {
                continue;
            }

            let mut next = node.state.clone();
            for (&key, &value) in &action.effects {
                next.insert(key, value);
            }
            if next == node.state {
                continue;
            }

            let g = node.g + costs[index];
            let key = fingerprint(&next);
            if best_cost.get(&key).map_or(false, |&c| c <= g) {
                continue;
            }
            best_cost.insert(key, g);

            let mut steps = node.steps.clone();
            steps.push(index);
            seq += 1;
            frontier.push(PlanNode {
                f: g + unsatisfied_count(&next, goal) as f32,
                state: next,
                steps,
                g,
                seq,
            });
        }
    }

    (Vec::new(), expanded)
}

// === EXTERNAL DATA ===
fn create_action_library() -> Vec<TacticalAction> {
    include!("../data/actions.rs")
}

fn create_goal_library() -> Vec<Goal> {
    include!("../data/goals.rs")
}
