// src/core/components.rs - Core entity components
use bevy::prelude::*;

// === BASIC ENTITY COMPONENTS ===

/// Hostile player-squad unit the enemies hunt. Position comes from the
/// transform; aim and velocity are fed in by the gameplay layer per tick.
#[derive(Component)]
pub struct Agent {
    pub aim_direction: Vec2,
    pub velocity: Vec2,
}

impl Default for Agent {
    fn default() -> Self {
        Self {
            aim_direction: Vec2::X,
            velocity: Vec2::ZERO,
        }
    }
}

#[derive(Component)]
pub struct Enemy;

#[derive(Component)]
pub struct Health(pub f32);

#[derive(Component)]
pub struct Dead;

#[derive(Component)]
pub struct MovementSpeed(pub f32);

// === OUTBOUND CONTRACT ===
// What the gameplay layer reads back from the AI every tick.

#[derive(Component, Default)]
pub struct DesiredVelocity(pub Vec2);

#[derive(Component)]
pub struct Facing {
    pub angle: f32,
    pub target_angle: f32,
    /// Sprite mirroring, decided from the target angle of this tick's
    /// rotation command, never the still-interpolating current angle.
    pub flip_x: bool,
}

impl Default for Facing {
    fn default() -> Self {
        Self {
            angle: 0.0,
            target_angle: 0.0,
            flip_x: false,
        }
    }
}

#[derive(Component, Default)]
pub struct FireIntent {
    pub direction: Vec2,
    pub trigger: bool,
}

// === COMPLEX COMPONENTS ===
#[derive(Component)]
pub struct Vision {
    pub range: f32,
    pub angle: f32,
    pub direction: Vec2,
}

impl Vision {
    pub fn new(range: f32, angle_degrees: f32) -> Self {
        Self {
            range,
            angle: angle_degrees.to_radians(),
            direction: Vec2::X,
        }
    }
}

#[derive(Component)]
pub struct Patrol {
    pub points: Vec<Vec2>,
    pub current_index: usize,
}

impl Patrol {
    pub fn new(points: Vec<Vec2>) -> Self {
        Self {
            points,
            current_index: 0,
        }
    }

    pub fn current_target(&self) -> Option<Vec2> {
        self.points.get(self.current_index).copied()
    }

    pub fn advance(&mut self) {
        if !self.points.is_empty() {
            self.current_index = (self.current_index + 1) % self.points.len();
        }
    }
}

#[derive(Component)]
pub struct WeaponState {
    pub current_ammo: u32,
    pub max_ammo: u32,
    pub fire_interval: f32,
    pub fire_cooldown: f32,
    pub reload_time: f32,
    pub is_reloading: bool,
    pub reload_timer: f32,
}

impl Default for WeaponState {
    fn default() -> Self {
        Self {
            current_ammo: 30,
            max_ammo: 30,
            fire_interval: 0.4,
            fire_cooldown: 0.0,
            reload_time: 2.0,
            is_reloading: false,
            reload_timer: 0.0,
        }
    }
}

impl WeaponState {
    pub fn ready(&self) -> bool {
        self.fire_cooldown <= 0.0 && self.current_ammo > 0 && !self.is_reloading
    }

    /// Consumes one round and arms the cooldown. Caller checks `ready()`.
    pub fn discharge(&mut self) {
        self.current_ammo = self.current_ammo.saturating_sub(1);
        self.fire_cooldown = self.fire_interval;
    }

    pub fn start_reload(&mut self) {
        if !self.is_reloading {
            self.is_reloading = true;
            self.reload_timer = self.reload_time;
        }
    }

    /// Advances timers. Returns true on the tick a reload completes.
    pub fn tick(&mut self, dt: f32) -> bool {
        self.fire_cooldown = (self.fire_cooldown - dt).max(0.0);
        if self.is_reloading {
            self.reload_timer -= dt;
            if self.reload_timer <= 0.0 {
                self.is_reloading = false;
                self.current_ammo = self.max_ammo;
                return true;
            }
        }
        false
    }
}

// === MORALE SYSTEM ===
#[derive(Component)]
pub struct Morale {
    pub current: f32,
    pub max: f32,
    pub panic_threshold: f32,
    pub recovery_rate: f32,
}

impl Default for Morale {
    fn default() -> Self {
        Self {
            current: 100.0,
            max: 100.0,
            panic_threshold: 30.0,
            recovery_rate: 5.0,
        }
    }
}

impl Morale {
    pub fn is_panicked(&self) -> bool {
        self.current <= self.panic_threshold
    }

    pub fn reduce(&mut self, amount: f32) {
        self.current = (self.current - amount).max(0.0);
    }

    pub fn recover(&mut self, delta_time: f32) {
        if !self.is_panicked() {
            self.current = (self.current + self.recovery_rate * delta_time).min(self.max);
        }
    }
}

// === SQUAD ===
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SquadRole {
    None,
    Leader,
    Suppressor,
    Flanker,
    Assault,
    RearGuard,
}

#[derive(Component, Debug, Clone, Copy)]
pub struct SquadMember {
    pub squad_id: u32,
    pub role: SquadRole,
}

// === DECISION HELPERS ===

/// Requires a raycast-derived condition to hold continuously before a
/// transition commits, damping edge-of-geometry flicker.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionTimer {
    held_for: f32,
}

impl ConditionTimer {
    /// Feed the per-tick condition; true once it has held for `threshold`.
    pub fn update(&mut self, condition: bool, dt: f32, threshold: f32) -> bool {
        if condition {
            self.held_for += dt;
        } else {
            self.held_for = 0.0;
        }
        self.held_for >= threshold
    }

    pub fn reset(&mut self) {
        self.held_for = 0.0;
    }
}

/// Rolling displacement watchdog for movement-seeking states. An agent that
/// wants to move but has not covered ground within the timeout is stalled
/// and must abandon its current sub-goal.
#[derive(Component)]
pub struct StuckDetector {
    anchor: Vec2,
    anchor_time: f32,
    pub stalled: bool,
}

impl Default for StuckDetector {
    fn default() -> Self {
        Self {
            anchor: Vec2::ZERO,
            anchor_time: 0.0,
            stalled: false,
        }
    }
}

impl StuckDetector {
    pub fn update(
        &mut self,
        position: Vec2,
        moving_intent: bool,
        now: f32,
        min_displacement: f32,
        timeout: f32,
    ) {
        if !moving_intent || position.distance(self.anchor) > min_displacement {
            self.anchor = position;
            self.anchor_time = now;
            self.stalled = false;
            return;
        }
        if now - self.anchor_time > timeout {
            self.stalled = true;
        }
    }

    pub fn reset(&mut self, position: Vec2, now: f32) {
        self.anchor = position;
        self.anchor_time = now;
        self.stalled = false;
    }
}
