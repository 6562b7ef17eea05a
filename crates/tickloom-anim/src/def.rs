//! Animation definitions: the immutable "recipes" the engine evaluates.
//!
//! A definition says *what* an animation does (fade opacity 0 → 1 over
//! 60 ticks with quadratic easing); it never says *when* — start ticks
//! live in the engine's runtime table so definitions stay shareable
//! across threads and worker processes without copying.
//!
//! Definitions can only be built through [`AnimationDefBuilder`], which
//! validates every field. A definition that exists is a definition the
//! engine can evaluate without failing.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::easing::{Easing, Rgb};
use crate::AnimError;

/// Discrete frame counter. The engine's only notion of time.
pub type Tick = u64;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A unique identifier for an animation.
///
/// Names are application-chosen strings ("title_fade", "cpu_bar").
/// String ids (rather than numeric handles) matter here: coordination
/// events are totally ordered by `(tick, kind_rank, primitive_id)` with
/// a lexicographic tiebreak, and frame-state maps iterate in id order,
/// so the id's `Ord` is part of the determinism contract.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AnimId(pub String);

impl AnimId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AnimId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AnimId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Kind & interpolation mode
// ---------------------------------------------------------------------------

/// What an animation animates.
///
/// Realized as a tagged variant with per-kind pure evaluators rather than
/// a trait hierarchy; adding a kind means extending this enum and the
/// property check in the builder.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AnimKind {
    /// Opacity 0..1.
    Fade,
    /// Integer pixel position.
    Slide,
    /// Uniform scale factor.
    Scale,
    /// Rotation in degrees.
    Rotate,
    /// RGB color.
    Color,
    /// A bare progress value (for progress-bar widgets).
    Progress,
    /// Character-by-character text reveal.
    Typewriter,
    /// Application-defined named scalars.
    Custom,
}

impl fmt::Display for AnimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fade => "fade",
            Self::Slide => "slide",
            Self::Scale => "scale",
            Self::Rotate => "rotate",
            Self::Color => "color",
            Self::Progress => "progress",
            Self::Typewriter => "typewriter",
            Self::Custom => "custom",
        };
        f.write_str(s)
    }
}

/// How eased progress maps onto property values.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum InterpolationMode {
    /// Continuous interpolation at full progress resolution.
    #[default]
    Smooth,
    /// Progress snaps to the start of the current tick step before
    /// interpolation, producing hard per-tick jumps.
    Stepped,
    /// A named pure interpolator registered with the engine.
    /// The function itself is not serialized; snapshots carry the name
    /// and restore requires the same registrations.
    Custom { interpolator: String },
}

// ---------------------------------------------------------------------------
// Property sets
// ---------------------------------------------------------------------------

/// The animatable properties, all optional.
///
/// Start and end values are both a `PropertySet`; the builder enforces
/// that the two sets animate exactly the same properties. `custom` keys
/// live in a `BTreeMap` so serialization order is fixed — `HashMap`
/// iteration order would leak into snapshots and break bit-identical
/// worker output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PropertySet {
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
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub visible_chars: Option<u32>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub custom: BTreeMap<String, f64>,
}

impl PropertySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_opacity(mut self, v: f64) -> Self {
        self.opacity = Some(v);
        self
    }

    pub fn with_position(mut self, x: i32, y: i32) -> Self {
        self.position = Some((x, y));
        self
    }

    pub fn with_scale(mut self, v: f64) -> Self {
        self.scale = Some(v);
        self
    }

    pub fn with_rotation(mut self, deg: f64) -> Self {
        self.rotation = Some(deg);
        self
    }

    pub fn with_color(mut self, c: Rgb) -> Self {
        self.color = Some(c);
        self
    }

    pub fn with_progress(mut self, v: f64) -> Self {
        self.progress = Some(v);
        self
    }

    pub fn with_visible_chars(mut self, n: u32) -> Self {
        self.visible_chars = Some(n);
        self
    }

    pub fn with_custom(mut self, key: impl Into<String>, v: f64) -> Self {
        self.custom.insert(key.into(), v);
        self
    }

    /// `true` if no property is set.
    pub fn is_empty(&self) -> bool {
        self.position.is_none()
            && self.opacity.is_none()
            && self.scale.is_none()
            && self.rotation.is_none()
            && self.color.is_none()
            && self.progress.is_none()
            && self.visible_chars.is_none()
            && self.custom.is_empty()
    }

    /// `true` if both sets animate exactly the same properties.
    pub(crate) fn same_shape(&self, other: &Self) -> bool {
        self.position.is_some() == other.position.is_some()
            && self.opacity.is_some() == other.opacity.is_some()
            && self.scale.is_some() == other.scale.is_some()
            && self.rotation.is_some() == other.rotation.is_some()
            && self.color.is_some() == other.color.is_some()
            && self.progress.is_some() == other.progress.is_some()
            && self.visible_chars.is_some() == other.visible_chars.is_some()
            && self.custom.keys().eq(other.custom.keys())
    }
}

/// What `state_at` returns for ticks before `start + delay`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum PreStartBehavior {
    /// The animation simply does not exist yet (`state_at` → `None`).
    #[default]
    Hidden,
    /// A frozen, inactive state equal to the start values.
    HoldStartValues,
}

// ---------------------------------------------------------------------------
// AnimationDef
// ---------------------------------------------------------------------------

/// An immutable, validated animation definition.
///
/// Construct through [`AnimationDef::builder`]; all fields are read-only
/// afterwards. The struct derives `Serialize`/`Deserialize` with a fixed
/// field order so snapshots are deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationDef {
    id: AnimId,
    kind: AnimKind,
    duration_ticks: Tick,
    delay_ticks: Tick,
    /// 0 means repeat forever.
    repeat_count: u32,
    reverse_on_repeat: bool,
    easing: Easing,
    start_values: PropertySet,
    end_values: PropertySet,
    interpolation: InterpolationMode,
    pre_start: PreStartBehavior,
}

impl AnimationDef {
    /// Starts building a definition of the given kind.
    pub fn builder(id: impl Into<AnimId>, kind: AnimKind) -> AnimationDefBuilder {
        AnimationDefBuilder::new(id.into(), kind)
    }

    pub fn id(&self) -> &AnimId {
        &self.id
    }

    pub fn kind(&self) -> AnimKind {
        self.kind
    }

    pub fn duration_ticks(&self) -> Tick {
        self.duration_ticks
    }

    pub fn delay_ticks(&self) -> Tick {
        self.delay_ticks
    }

    /// Number of cycles; 0 means infinite.
    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }

    pub fn reverse_on_repeat(&self) -> bool {
        self.reverse_on_repeat
    }

    pub fn easing(&self) -> Easing {
        self.easing
    }

    pub fn start_values(&self) -> &PropertySet {
        &self.start_values
    }

    pub fn end_values(&self) -> &PropertySet {
        &self.end_values
    }

    pub fn interpolation(&self) -> &InterpolationMode {
        &self.interpolation
    }

    pub fn pre_start(&self) -> PreStartBehavior {
        self.pre_start
    }

    /// Total ticks from origin to completion, `None` when repeating
    /// forever.
    pub fn total_ticks(&self) -> Option<Tick> {
        if self.repeat_count == 0 {
            None
        } else {
            Some(self.duration_ticks * Tick::from(self.repeat_count))
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Validating builder for [`AnimationDef`].
///
/// `build()` is the single gate: it checks ranges, the easing name, and
/// that start/end values agree with each other and with the kind.
#[derive(Debug, Clone)]
pub struct AnimationDefBuilder {
    id: AnimId,
    kind: AnimKind,
    duration_ticks: Tick,
    delay_ticks: Tick,
    repeat_count: u32,
    reverse_on_repeat: bool,
    easing_name: String,
    start_values: PropertySet,
    end_values: PropertySet,
    interpolation: InterpolationMode,
    pre_start: PreStartBehavior,
}

impl AnimationDefBuilder {
    fn new(id: AnimId, kind: AnimKind) -> Self {
        Self {
            id,
            kind,
            duration_ticks: 1,
            delay_ticks: 0,
            repeat_count: 1,
            reverse_on_repeat: false,
            easing_name: "linear".to_string(),
            start_values: PropertySet::default(),
            end_values: PropertySet::default(),
            interpolation: InterpolationMode::Smooth,
            pre_start: PreStartBehavior::Hidden,
        }
    }

    pub fn duration_ticks(mut self, ticks: Tick) -> Self {
        self.duration_ticks = ticks;
        self
    }

    pub fn delay_ticks(mut self, ticks: Tick) -> Self {
        self.delay_ticks = ticks;
        self
    }

    /// Number of cycles to play; 0 repeats forever.
    pub fn repeat_count(mut self, count: u32) -> Self {
        self.repeat_count = count;
        self
    }

    pub fn reverse_on_repeat(mut self, reverse: bool) -> Self {
        self.reverse_on_repeat = reverse;
        self
    }

    /// Easing curve by registry name. Validated in `build()`.
    pub fn easing(mut self, name: impl Into<String>) -> Self {
        self.easing_name = name.into();
        self
    }

    pub fn start_values(mut self, values: PropertySet) -> Self {
        self.start_values = values;
        self
    }

    pub fn end_values(mut self, values: PropertySet) -> Self {
        self.end_values = values;
        self
    }

    pub fn interpolation(mut self, mode: InterpolationMode) -> Self {
        self.interpolation = mode;
        self
    }

    pub fn pre_start(mut self, behavior: PreStartBehavior) -> Self {
        self.pre_start = behavior;
        self
    }

    /// Validates and seals the definition.
    ///
    /// # Errors
    /// - [`AnimError::InvalidDefinition`] for a zero duration, empty or
    ///   mismatched value sets, or a kind whose required property is
    ///   missing.
    /// - [`AnimError::UnknownEasing`] for an easing name outside the
    ///   registry.
    pub fn build(self) -> Result<AnimationDef, AnimError> {
        if self.duration_ticks == 0 {
            return Err(AnimError::InvalidDefinition {
                id: self.id.clone(),
                reason: "duration_ticks must be >= 1".to_string(),
            });
        }
        let easing = Easing::from_name(&self.easing_name)?;
        if self.start_values.is_empty() {
            return Err(AnimError::InvalidDefinition {
                id: self.id.clone(),
                reason: "start_values must animate at least one property"
                    .to_string(),
            });
        }
        if !self.start_values.same_shape(&self.end_values) {
            return Err(AnimError::InvalidDefinition {
                id: self.id.clone(),
                reason: "start_values and end_values must animate the same \
                         properties"
                    .to_string(),
            });
        }
        self.check_kind_property()?;
        if let Some(v) = self.start_values.opacity {
            if !(0.0..=1.0).contains(&v) {
                return Err(AnimError::InvalidDefinition {
                    id: self.id.clone(),
                    reason: format!("start opacity {v} outside [0, 1]"),
                });
            }
        }
        if let Some(v) = self.end_values.opacity {
            if !(0.0..=1.0).contains(&v) {
                return Err(AnimError::InvalidDefinition {
                    id: self.id.clone(),
                    reason: format!("end opacity {v} outside [0, 1]"),
                });
            }
        }

        Ok(AnimationDef {
            id: self.id,
            kind: self.kind,
            duration_ticks: self.duration_ticks,
            delay_ticks: self.delay_ticks,
            repeat_count: self.repeat_count,
            reverse_on_repeat: self.reverse_on_repeat,
            easing,
            start_values: self.start_values,
            end_values: self.end_values,
            interpolation: self.interpolation,
            pre_start: self.pre_start,
        })
    }

    /// Each kind animates at least its namesake property.
    fn check_kind_property(&self) -> Result<(), AnimError> {
        let sv = &self.start_values;
        let present = match self.kind {
            AnimKind::Fade => sv.opacity.is_some(),
            AnimKind::Slide => sv.position.is_some(),
            AnimKind::Scale => sv.scale.is_some(),
            AnimKind::Rotate => sv.rotation.is_some(),
            AnimKind::Color => sv.color.is_some(),
            AnimKind::Progress => sv.progress.is_some(),
            AnimKind::Typewriter => sv.visible_chars.is_some(),
            AnimKind::Custom => !sv.custom.is_empty(),
        };
        if present {
            Ok(())
        } else {
            Err(AnimError::InvalidDefinition {
                id: self.id.clone(),
                reason: format!(
                    "kind `{}` requires its namesake property in start_values",
                    self.kind
                ),
            })
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn fade_builder() -> AnimationDefBuilder {
        AnimationDef::builder("fade1", AnimKind::Fade)
            .duration_ticks(60)
            .start_values(PropertySet::new().with_opacity(0.0))
            .end_values(PropertySet::new().with_opacity(1.0))
    }

    #[test]
    fn test_builder_accepts_minimal_fade() {
        let def = fade_builder().build().unwrap();
        assert_eq!(def.id().as_str(), "fade1");
        assert_eq!(def.duration_ticks(), 60);
        assert_eq!(def.repeat_count(), 1);
        assert_eq!(def.easing(), Easing::Linear);
        assert_eq!(def.total_ticks(), Some(60));
    }

    #[test]
    fn test_builder_rejects_zero_duration() {
        let err = fade_builder().duration_ticks(0).build().unwrap_err();
        assert!(matches!(err, AnimError::InvalidDefinition { .. }));
        assert!(err.to_string().contains("duration_ticks"));
    }

    #[test]
    fn test_builder_rejects_unknown_easing() {
        let err = fade_builder().easing("zigzag").build().unwrap_err();
        assert!(matches!(err, AnimError::UnknownEasing(_)));
    }

    #[test]
    fn test_builder_rejects_empty_values() {
        let err = AnimationDef::builder("empty", AnimKind::Fade)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("at least one property"));
    }

    #[test]
    fn test_builder_rejects_shape_mismatch() {
        let err = AnimationDef::builder("mismatch", AnimKind::Fade)
            .start_values(PropertySet::new().with_opacity(0.0))
            .end_values(
                PropertySet::new().with_opacity(1.0).with_scale(2.0),
            )
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("same properties"));
    }

    #[test]
    fn test_builder_rejects_missing_namesake_property() {
        // A slide that never sets a position is malformed even though
        // both value sets agree with each other.
        let err = AnimationDef::builder("slide1", AnimKind::Slide)
            .start_values(PropertySet::new().with_opacity(0.0))
            .end_values(PropertySet::new().with_opacity(1.0))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("namesake"));
    }

    #[test]
    fn test_builder_rejects_out_of_range_opacity() {
        let err = fade_builder()
            .end_values(PropertySet::new().with_opacity(1.5))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("outside"));
    }

    #[test]
    fn test_infinite_repeat_has_no_total() {
        let def = fade_builder().repeat_count(0).build().unwrap();
        assert_eq!(def.total_ticks(), None);
    }

    #[test]
    fn test_def_json_round_trip_is_lossless() {
        let def = fade_builder()
            .delay_ticks(5)
            .repeat_count(3)
            .reverse_on_repeat(true)
            .easing("ease_out_bounce")
            .build()
            .unwrap();
        let json = serde_json::to_string(&def).unwrap();
        let back: AnimationDef = serde_json::from_str(&json).unwrap();
        assert_eq!(def, back);
    }

    #[test]
    fn test_anim_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&AnimId::new("spinner")).unwrap();
        assert_eq!(json, "\"spinner\"");
    }

    #[test]
    fn test_custom_keys_are_ordered() {
        let set = PropertySet::new()
            .with_custom("zeta", 1.0)
            .with_custom("alpha", 2.0);
        let keys: Vec<&String> = set.custom.keys().collect();
        assert_eq!(keys, ["alpha", "zeta"]);
    }
}
