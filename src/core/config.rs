// src/core/config.rs - AI tuning and balancing
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Resource, Serialize, Deserialize, Clone)]
pub struct AiConfig {
    pub perception: PerceptionConfig,
    pub cover: CoverConfig,
    pub squad: SquadConfig,
    pub combat: CombatConfig,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct PerceptionConfig {
    pub vision_range: f32,
    pub vision_angle_degrees: f32,
    pub memory_decay_rate: f32,
    pub near_miss_distance: f32,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct CoverConfig {
    pub probe_directions: usize,
    pub probe_distance: f32,
    pub surface_clearance: f32,
    pub hidden_bonus: f32,
    pub approach_weight: f32,
    pub same_obstacle_penalty: f32,
    pub min_progress: f32,
    pub exit_swap_interval: f32,
    pub exit_offset: f32,
    pub search_radius: f32,
    pub search_ring_step: f32,
    pub zone_size: f32,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct SquadConfig {
    pub communication_range: f32,
    pub max_squad_size: usize,
    pub min_squad_size: usize,
    pub recompute_interval: f32,
    pub leader_health_weight: f32,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct CombatConfig {
    pub fire_range: f32,
    pub preferred_range: f32,
    pub distraction_angle_degrees: f32,
    pub hysteresis: f32,
    pub contact_lost_duration: f32,
    pub under_fire_window: f32,
    pub calm_window: f32,
    pub suppression_threshold: f32,
    pub suppression_decay: f32,
    pub approach_timeout: f32,
    pub stuck_timeout: f32,
    pub stuck_displacement: f32,
    pub turn_rate: f32,
    pub safe_distance: f32,
    pub retreat_health: f32,
    pub corner_probe_duration: f32,
    pub avoid_probe_distance: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            perception: PerceptionConfig {
                vision_range: 320.0,
                vision_angle_degrees: 110.0,
                memory_decay_rate: 0.1,
                near_miss_distance: 30.0,
            },
            cover: CoverConfig {
                probe_directions: 16,
                probe_distance: 280.0,
                surface_clearance: 35.0,
                hidden_bonus: 5.0,
                approach_weight: 2.0,
                same_obstacle_penalty: 3.0,
                min_progress: 0.15,
                exit_swap_interval: 1.5,
                exit_offset: 40.0,
                search_radius: 240.0,
                search_ring_step: 60.0,
                zone_size: 48.0,
            },
            squad: SquadConfig {
                // A quarter of the viewport diagonal.
                communication_range: 360.0,
                max_squad_size: 5,
                min_squad_size: 2,
                recompute_interval: 0.5,
                leader_health_weight: 0.5,
            },
            combat: CombatConfig {
                fire_range: 260.0,
                preferred_range: 170.0,
                distraction_angle_degrees: 23.0,
                hysteresis: 0.3,
                contact_lost_duration: 0.75,
                under_fire_window: 1.0,
                calm_window: 2.0,
                suppression_threshold: 2.0,
                suppression_decay: 0.8,
                approach_timeout: 3.0,
                stuck_timeout: 1.5,
                stuck_displacement: 12.0,
                turn_rate: 6.0,
                safe_distance: 420.0,
                retreat_health: 25.0,
                corner_probe_duration: 0.4,
                avoid_probe_distance: 48.0,
            },
        }
    }
}

impl AiConfig {
    pub fn load() -> Self {
        match std::fs::read_to_string("data/config/ai.json") {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| error!("Failed to parse AI config: {}", e))
                .unwrap_or_else(|_| Self::default()),
            Err(_) => Self::default(),
        }
    }
}
