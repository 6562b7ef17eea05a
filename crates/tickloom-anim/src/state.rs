//! Per-tick animation state: the output side of the engine.
//!
//! An [`AnimationState`] is what `state_at(tick)` returns — a snapshot
//! of one animation's properties at one tick. States are plain data:
//! produced, handed to widgets, never mutated in place.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::def::{AnimId, Tick};
use crate::easing::Rgb;

/// One animation's computed properties at one tick.
///
/// Equality is structural. When two states are compared for cross-run
/// determinism, the comparison goes through [`AnimationState::same_values`]
/// which ignores `tick` — two runs at the same logical phase must agree
/// on every value even if their absolute tick counters differ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationState {
    pub animation_id: AnimId,
    pub tick: Tick,
    /// Eased progress in `[0, 1]`.
    pub progress: f64,
    pub active: bool,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub position: Option<(i32, i32)>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub opacity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rotation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub color: Option<Rgb>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub visible_chars: Option<u32>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub custom: BTreeMap<String, f64>,
}

impl AnimationState {
    /// Structural equality excluding `tick`.
    ///
    /// This is the determinism-hash notion of equality: states computed
    /// by different workers (or runs) at the same logical phase must
    /// match under this comparison bit for bit.
    pub fn same_values(&self, other: &Self) -> bool {
        self.animation_id == other.animation_id
            && self.progress == other.progress
            && self.active == other.active
            && self.completed == other.completed
            && self.position == other.position
            && self.opacity == other.opacity
            && self.scale == other.scale
            && self.rotation == other.rotation
            && self.color == other.color
            && self.visible_chars == other.visible_chars
            && self.custom == other.custom
    }

    /// Canonical serialization with `tick` zeroed, for determinism
    /// hashing. Field order is fixed by the struct definition and
    /// `custom` is a `BTreeMap`, so the bytes are stable.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut copy = self.clone();
        copy.tick = 0;
        serde_json::to_vec(&copy)
            .unwrap_or_else(|_| self.animation_id.as_str().as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(tick: Tick, progress: f64) -> AnimationState {
        AnimationState {
            animation_id: AnimId::new("a"),
            tick,
            progress,
            active: true,
            completed: false,
            position: None,
            opacity: Some(progress),
            scale: None,
            rotation: None,
            color: None,
            visible_chars: None,
            custom: BTreeMap::new(),
        }
    }

    #[test]
    fn test_same_values_ignores_tick() {
        let a = state(10, 0.5);
        let b = state(99, 0.5);
        assert!(a.same_values(&b));
        assert_ne!(a, b); // plain equality still sees the tick
    }

    #[test]
    fn test_same_values_detects_value_drift() {
        let a = state(10, 0.5);
        let b = state(10, 0.5000001);
        assert!(!a.same_values(&b));
    }

    #[test]
    fn test_canonical_bytes_are_tick_independent() {
        let a = state(10, 0.5);
        let b = state(2000, 0.5);
        assert_eq!(a.canonical_bytes(), b.canonical_bytes());
    }

    #[test]
    fn test_unset_properties_are_omitted_from_json() {
        let json = String::from_utf8(state(1, 0.25).canonical_bytes()).unwrap();
        assert!(json.contains("opacity"));
        assert!(!json.contains("rotation"));
        assert!(!json.contains("custom"));
    }
}
