// src/core/memory.rs - Confidence-decaying target memory
//
// Each enemy keeps one belief about where its target is and how much to
// trust it. Direct sight pins confidence at 1.0, sounds land lower, and
// everything fades over time. A weak signal cannot overwrite a strong
// recent one unless the strong one has gone stale.

use bevy::prelude::*;

pub const DECAY_RATE: f32 = 0.1;
pub const OVERRIDE_COOLDOWN: f32 = 5.0;
pub const INTEL_DEGRADATION: f32 = 0.9;
pub const LOST_THRESHOLD: f32 = 0.05;

/// Behavior band derived from confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PursuitMode {
    DirectPursuit,
    CautiousApproach,
    Search,
    Patrol,
}

#[derive(Component, Debug, Clone)]
pub struct TargetMemory {
    pub suspected_position: Vec2,
    pub confidence: f32,
    pub last_updated: f32,
}

impl Default for TargetMemory {
    fn default() -> Self {
        Self {
            suspected_position: Vec2::ZERO,
            confidence: 0.0,
            last_updated: -1.0e6,
        }
    }
}

impl TargetMemory {
    /// Accepts the new sighting iff it is at least as confident as what we
    /// hold, or the held belief is older than the override cooldown.
    pub fn update(&mut self, position: Vec2, confidence: f32, now: f32) -> bool {
        let stale = now - self.last_updated > OVERRIDE_COOLDOWN;
        if confidence >= self.confidence || stale {
            self.suspected_position = position;
            self.confidence = confidence.clamp(0.0, 1.0);
            self.last_updated = now;
            return true;
        }
        false
    }

    pub fn decay(&mut self, dt: f32, rate: f32) {
        self.confidence = (self.confidence - rate * dt).max(0.0);
    }

    /// Second-hand position report from a squadmate, degraded by relay.
    pub fn receive_intel(&mut self, other: &TargetMemory, now: f32) -> bool {
        if !other.has_target() {
            return false;
        }
        self.update(
            other.suspected_position,
            other.confidence * INTEL_DEGRADATION,
            now,
        )
    }

    pub fn has_target(&self) -> bool {
        self.confidence > LOST_THRESHOLD
    }

    pub fn pursuit_mode(&self) -> PursuitMode {
        if self.confidence >= 0.8 {
            PursuitMode::DirectPursuit
        } else if self.confidence >= 0.5 {
            PursuitMode::CautiousApproach
        } else if self.confidence >= 0.3 {
            PursuitMode::Search
        } else {
            PursuitMode::Patrol
        }
    }

    pub fn forget(&mut self) {
        self.confidence = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weaker_update_rejected_while_fresh() {
        let mut memory = TargetMemory::default();
        assert!(memory.update(Vec2::new(100.0, 0.0), 1.0, 10.0));
        assert!(!memory.update(Vec2::new(50.0, 50.0), 0.3, 10.1));
        assert_eq!(memory.suspected_position, Vec2::new(100.0, 0.0));
        assert_eq!(memory.confidence, 1.0);
    }

    #[test]
    fn weaker_update_accepted_after_cooldown() {
        let mut memory = TargetMemory::default();
        memory.update(Vec2::new(100.0, 0.0), 1.0, 10.0);
        assert!(memory.update(Vec2::new(50.0, 50.0), 0.3, 15.1));
        assert_eq!(memory.suspected_position, Vec2::new(50.0, 50.0));
        assert!((memory.confidence - 0.3).abs() < 1e-6);
    }

    #[test]
    fn equal_confidence_refreshes_position() {
        let mut memory = TargetMemory::default();
        memory.update(Vec2::new(100.0, 0.0), 0.7, 1.0);
        assert!(memory.update(Vec2::new(120.0, 0.0), 0.7, 1.5));
        assert_eq!(memory.suspected_position, Vec2::new(120.0, 0.0));
    }

    #[test]
    fn zero_dt_decay_changes_nothing() {
        let mut memory = TargetMemory::default();
        memory.update(Vec2::ZERO, 0.6, 0.0);
        memory.decay(0.0, DECAY_RATE);
        assert_eq!(memory.confidence, 0.6);
    }

    #[test]
    fn decay_clamps_at_zero() {
        let mut memory = TargetMemory::default();
        memory.update(Vec2::ZERO, 0.2, 0.0);
        memory.decay(60.0, DECAY_RATE);
        assert_eq!(memory.confidence, 0.0);
        assert!(!memory.has_target());
    }

    #[test]
    fn confidence_bands() {
        let mut memory = TargetMemory::default();
        memory.update(Vec2::ZERO, 1.0, 0.0);
        assert_eq!(memory.pursuit_mode(), PursuitMode::DirectPursuit);
        memory.decay(3.0, DECAY_RATE);
        assert!((memory.confidence - 0.7).abs() < 1e-4);
        assert_eq!(memory.pursuit_mode(), PursuitMode::CautiousApproach);
        assert!(memory.has_target());
        memory.decay(2.0, DECAY_RATE);
        assert!((memory.confidence - 0.5).abs() < 1e-4);
        assert_eq!(memory.pursuit_mode(), PursuitMode::CautiousApproach);
        memory.decay(0.01, DECAY_RATE);
        assert_eq!(memory.pursuit_mode(), PursuitMode::Search);
    }

    #[test]
    fn intel_degrades_by_relay_factor() {
        let mut scout = TargetMemory::default();
        scout.update(Vec2::new(300.0, 40.0), 1.0, 2.0);

        let mut listener = TargetMemory::default();
        assert!(listener.receive_intel(&scout, 2.0));
        assert!((listener.confidence - 0.9).abs() < 1e-6);
        assert_eq!(listener.suspected_position, Vec2::new(300.0, 40.0));
    }

    #[test]
    fn intel_from_empty_memory_is_noop() {
        let scout = TargetMemory::default();
        let mut listener = TargetMemory::default();
        listener.update(Vec2::new(10.0, 0.0), 0.4, 0.0);
        assert!(!listener.receive_intel(&scout, 1.0));
        assert!((listener.confidence - 0.4).abs() < 1e-6);
    }
}
