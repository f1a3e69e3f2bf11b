// src/data/actions.rs
vec![
    // Direct engagement
    TacticalAction {
        name: "engage_target",
        base_cost: 1.0,
        cost_fn: Some(|ctx| match ctx.role {
            SquadRole::Assault | SquadRole::Leader => 0.8,
            _ => 1.0,
        }),
        preconditions: world_state![WorldKey::HasTarget => true, WorldKey::TargetVisible => true, WorldKey::WeaponLoaded => true, WorldKey::CanHitTarget => true],
        effects: world_state![WorldKey::HasTarget => false],
        kind: ActionKind::Engage,
    },
    TacticalAction {
        name: "close_distance",
        base_cost: 2.0,
        cost_fn: Some(|ctx| match ctx.role {
            // Walking straight in is the wrong job for support roles.
            SquadRole::Suppressor | SquadRole::Flanker | SquadRole::RearGuard if ctx.has_squad => 5.0,
            _ => 2.0,
        }),
        preconditions: world_state![WorldKey::HasTarget => true, WorldKey::CanHitTarget => false],
        effects: world_state![WorldKey::CanHitTarget => true, WorldKey::InWeaponRange => true],
        kind: ActionKind::CloseDistance,
    },
    TacticalAction {
        name: "flank_target",
        base_cost: 6.0,
        cost_fn: Some(|ctx| match ctx.role {
            SquadRole::Flanker => 0.5,
            _ => 6.0,
        }),
        preconditions: world_state![WorldKey::HasTarget => true, WorldKey::CanHitTarget => false],
        effects: world_state![WorldKey::FlankingPosition => true, WorldKey::TacticalAdvantage => true, WorldKey::CanHitTarget => true],
        kind: ActionKind::Flank,
    },

    // Squad fire-and-movement
    TacticalAction {
        name: "provide_suppression",
        base_cost: 10.0,
        cost_fn: Some(|ctx| match ctx.role {
            SquadRole::Suppressor => 0.3,
            _ => 10.0,
        }),
        preconditions: world_state![WorldKey::HasTarget => true, WorldKey::WeaponLoaded => true, WorldKey::InCover => true],
        effects: world_state![WorldKey::TargetSuppressed => true, WorldKey::SquadSuppressing => true],
        kind: ActionKind::Suppress,
    },
    TacticalAction {
        name: "assault_under_suppression",
        base_cost: 4.0,
        cost_fn: Some(|ctx| match ctx.role {
            SquadRole::Assault | SquadRole::Leader => 0.6,
            _ => 4.0,
        }),
        preconditions: world_state![WorldKey::HasTarget => true, WorldKey::SquadSuppressing => true],
        effects: world_state![WorldKey::CanHitTarget => true, WorldKey::TacticalAdvantage => true],
        kind: ActionKind::AssaultPush,
    },

    // Defensive
    TacticalAction {
        name: "take_cover",
        base_cost: 2.0,
        cost_fn: Some(|ctx| 0.8 + ctx.health_frac),
        preconditions: world_state![WorldKey::HasTarget => true, WorldKey::InCover => false, WorldKey::CoverAvailable => true, WorldKey::UnderFire => true],
        effects: world_state![WorldKey::InCover => true, WorldKey::UnderFire => false],
        kind: ActionKind::TakeCover,
    },
    TacticalAction {
        name: "retreat",
        base_cost: 1.5,
        cost_fn: Some(|ctx| 0.5 + 3.0 * ctx.health_frac),
        preconditions: world_state![WorldKey::IsInjured => true, WorldKey::IsRetreating => false],
        effects: world_state![WorldKey::AtSafeDistance => true, WorldKey::IsRetreating => true],
        kind: ActionKind::Retreat,
    },
    TacticalAction {
        name: "fighting_withdrawal",
        base_cost: 2.5,
        cost_fn: None,
        preconditions: world_state![WorldKey::Outnumbered => true, WorldKey::UnderFire => true, WorldKey::IsRetreating => false],
        effects: world_state![WorldKey::AtSafeDistance => true, WorldKey::IsRetreating => true],
        kind: ActionKind::Retreat,
    },

    // Lost contact
    TacticalAction {
        name: "search_area",
        base_cost: 2.5,
        cost_fn: None,
        preconditions: world_state![WorldKey::HasTarget => true, WorldKey::TargetVisible => false, WorldKey::AreaSearched => false],
        effects: world_state![WorldKey::AreaSearched => true, WorldKey::TargetVisible => true],
        kind: ActionKind::Search,
    },
]
