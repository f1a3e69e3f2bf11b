// src/data/goals.rs
vec![
    Goal {
        name: "stay_alive",
        priority: 12.0,
        desired_state: world_state![WorldKey::AtSafeDistance => true],
    },
    Goal {
        name: "eliminate_threat",
        priority: 10.0,
        desired_state: world_state![WorldKey::HasTarget => false],
    },
    Goal {
        name: "regain_contact",
        priority: 6.0,
        desired_state: world_state![WorldKey::TargetVisible => true],
    },
]
