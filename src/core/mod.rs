// src/core/mod.rs
use bevy::prelude::*;
use rand_chacha::rand_core::SeedableRng;

pub mod components;
pub mod config;
pub mod entities;
pub mod events;
pub mod goap;
pub mod memory;
pub mod world_query;

pub use components::*;
pub use config::*;
pub use entities::*;
pub use events::*;
pub use goap::*;
pub use memory::*;
pub use world_query::*;

// === RESOURCES ===
#[derive(Resource)]
pub struct GameMode {
    pub paused: bool,
}

impl Default for GameMode {
    fn default() -> Self {
        Self { paused: false }
    }
}

/// Seeded RNG so a whole run replays identically. Decision logic stays
/// deterministic; the RNG only breaks genuine ties and staggers idle scans.
#[derive(Resource)]
pub struct AiRng {
    pub rng: rand_chacha::ChaCha8Rng,
    pub seed: u64,
}

impl AiRng {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: rand_chacha::ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }
}

impl Default for AiRng {
    fn default() -> Self {
        Self::new(0)
    }
}
