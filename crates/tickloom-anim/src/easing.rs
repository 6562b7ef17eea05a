//! Easing curves and interpolation primitives.
//!
//! Everything in this module is a pure function: same inputs, same
//! outputs, no hidden state. That property is what lets worker threads
//! compute future frames and get bit-identical results — an easing
//! curve that consulted a clock or a global would break the whole
//! pre-computation scheme.
//!
//! Progress values are clamped to `[0, 1]` on the way in, and `elastic`
//! (which overshoots by design) is clamped on the way out, so downstream
//! interpolation never sees out-of-range progress.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::AnimError;

// ---------------------------------------------------------------------------
// Easing
// ---------------------------------------------------------------------------

/// The closed set of easing curves.
///
/// The registry is this enum — it is fixed at compile time and validated
/// at definition-build time, so by the time an animation is evaluated,
/// [`Easing::apply`] is total. Unknown names fail early with
/// [`AnimError::UnknownEasing`], never mid-frame.
///
/// Serialized as the snake_case curve name (`"ease_in_quad"`), which is
/// also what [`Easing::from_name`] parses.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    /// Constant speed. The default.
    #[default]
    Linear,
    EaseInQuad,
    EaseOutQuad,
    EaseInOutQuad,
    EaseInCubic,
    EaseOutCubic,
    EaseInOutCubic,
    EaseInSine,
    EaseOutSine,
    EaseInOutSine,
    /// Decaying bounce at the end of the curve.
    EaseOutBounce,
    /// Spring overshoot. Output is clamped back to `[0, 1]`.
    Elastic,
}

impl Easing {
    /// All curve names, in registry order. Useful for diagnostics.
    pub const NAMES: [&'static str; 12] = [
        "linear",
        "ease_in_quad",
        "ease_out_quad",
        "ease_in_out_quad",
        "ease_in_cubic",
        "ease_out_cubic",
        "ease_in_out_cubic",
        "ease_in_sine",
        "ease_out_sine",
        "ease_in_out_sine",
        "ease_out_bounce",
        "elastic",
    ];

    /// Looks up a curve by name.
    ///
    /// # Errors
    /// Returns [`AnimError::UnknownEasing`] if the name is not in the
    /// registry. This is the only failure point — evaluation can't fail.
    pub fn from_name(name: &str) -> Result<Self, AnimError> {
        match name {
            "linear" => Ok(Self::Linear),
            "ease_in_quad" => Ok(Self::EaseInQuad),
            "ease_out_quad" => Ok(Self::EaseOutQuad),
            "ease_in_out_quad" => Ok(Self::EaseInOutQuad),
            "ease_in_cubic" => Ok(Self::EaseInCubic),
            "ease_out_cubic" => Ok(Self::EaseOutCubic),
            "ease_in_out_cubic" => Ok(Self::EaseInOutCubic),
            "ease_in_sine" => Ok(Self::EaseInSine),
            "ease_out_sine" => Ok(Self::EaseOutSine),
            "ease_in_out_sine" => Ok(Self::EaseInOutSine),
            "ease_out_bounce" => Ok(Self::EaseOutBounce),
            "elastic" => Ok(Self::Elastic),
            other => Err(AnimError::UnknownEasing(other.to_string())),
        }
    }

    /// The curve's registry name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::EaseInQuad => "ease_in_quad",
            Self::EaseOutQuad => "ease_out_quad",
            Self::EaseInOutQuad => "ease_in_out_quad",
            Self::EaseInCubic => "ease_in_cubic",
            Self::EaseOutCubic => "ease_out_cubic",
            Self::EaseInOutCubic => "ease_in_out_cubic",
            Self::EaseInSine => "ease_in_sine",
            Self::EaseOutSine => "ease_out_sine",
            Self::EaseInOutSine => "ease_in_out_sine",
            Self::EaseOutBounce => "ease_out_bounce",
            Self::Elastic => "elastic",
        }
    }

    /// Maps linear progress to eased progress.
    ///
    /// Input is clamped to `[0, 1]` before any formula runs; the result
    /// is clamped to `[0, 1]` after, so overshooting curves stay in range.
    pub fn apply(&self, p: f64) -> f64 {
        let p = p.clamp(0.0, 1.0);
        let eased = match self {
            Self::Linear => p,
            Self::EaseInQuad => p * p,
            Self::EaseOutQuad => p * (2.0 - p),
            Self::EaseInOutQuad => {
                if p < 0.5 {
                    2.0 * p * p
                } else {
                    -1.0 + (4.0 - 2.0 * p) * p
                }
            }
            Self::EaseInCubic => p * p * p,
            Self::EaseOutCubic => {
                let q = p - 1.0;
                q * q * q + 1.0
            }
            Self::EaseInOutCubic => {
                if p < 0.5 {
                    4.0 * p * p * p
                } else {
                    let q = 2.0 * p - 2.0;
                    0.5 * q * q * q + 1.0
                }
            }
            Self::EaseInSine => 1.0 - (p * PI / 2.0).cos(),
            Self::EaseOutSine => (p * PI / 2.0).sin(),
            Self::EaseInOutSine => -((PI * p).cos() - 1.0) / 2.0,
            Self::EaseOutBounce => bounce_out(p),
            Self::Elastic => elastic_out(p),
        };
        eased.clamp(0.0, 1.0)
    }
}

impl std::fmt::Display for Easing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Piecewise decaying-bounce curve.
fn bounce_out(p: f64) -> f64 {
    const N1: f64 = 7.5625;
    const D1: f64 = 2.75;
    if p < 1.0 / D1 {
        N1 * p * p
    } else if p < 2.0 / D1 {
        let q = p - 1.5 / D1;
        N1 * q * q + 0.75
    } else if p < 2.5 / D1 {
        let q = p - 2.25 / D1;
        N1 * q * q + 0.9375
    } else {
        let q = p - 2.625 / D1;
        N1 * q * q + 0.984375
    }
}

/// Exponentially decaying spring. Overshoots past 1.0 before settling;
/// the caller clamps.
fn elastic_out(p: f64) -> f64 {
    const C4: f64 = (2.0 * PI) / 3.0;
    if p == 0.0 {
        0.0
    } else if p == 1.0 {
        1.0
    } else {
        2.0_f64.powf(-10.0 * p) * ((p * 10.0 - 0.75) * C4).sin() + 1.0
    }
}

// ---------------------------------------------------------------------------
// Interpolation
// ---------------------------------------------------------------------------

/// Linear interpolation between two floats.
pub fn lerp_f(a: f64, b: f64, p: f64) -> f64 {
    let p = p.clamp(0.0, 1.0);
    a + (b - a) * p
}

/// Linear interpolation producing an integer.
///
/// Truncates toward the nearest integer (`round`, half away from zero).
/// Banker's rounding is deliberately not used — every platform rounds
/// `round()` identically, which keeps worker output bit-identical.
pub fn lerp_i(a: i32, b: i32, p: f64) -> i32 {
    lerp_f(f64::from(a), f64::from(b), p).round() as i32
}

/// Linear interpolation between two integer positions.
pub fn lerp_pos(a: (i32, i32), b: (i32, i32), p: f64) -> (i32, i32) {
    (lerp_i(a.0, b.0, p), lerp_i(a.1, b.1, p))
}

/// An RGB color, one byte per channel.
///
/// Newtype-style struct rather than a tuple so color fields read as
/// `color.r` in widget code and serialize as `{"r":..,"g":..,"b":..}`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default,
)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Per-channel linear interpolation between two colors.
pub fn lerp_rgb(a: Rgb, b: Rgb, p: f64) -> Rgb {
    let ch = |x: u8, y: u8| -> u8 {
        lerp_f(f64::from(x), f64::from(y), p).round().clamp(0.0, 255.0) as u8
    };
    Rgb::new(ch(a.r, b.r), ch(a.g, b.g), ch(a.b, b.b))
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_round_trips_every_registry_entry() {
        for name in Easing::NAMES {
            let easing = Easing::from_name(name).unwrap();
            assert_eq!(easing.name(), name);
        }
    }

    #[test]
    fn test_from_name_rejects_unknown() {
        let err = Easing::from_name("ease_in_out_wobble").unwrap_err();
        assert!(matches!(err, AnimError::UnknownEasing(_)));
        assert!(err.to_string().contains("wobble"));
    }

    #[test]
    fn test_all_curves_are_anchored_at_endpoints() {
        // Every curve must map 0 → 0 and 1 → 1 exactly. A curve that
        // doesn't would make animations start or end off their declared
        // values.
        for name in Easing::NAMES {
            let e = Easing::from_name(name).unwrap();
            assert_eq!(e.apply(0.0), 0.0, "{name} at 0");
            assert_eq!(e.apply(1.0), 1.0, "{name} at 1");
        }
    }

    #[test]
    fn test_all_curves_stay_in_unit_range() {
        for name in Easing::NAMES {
            let e = Easing::from_name(name).unwrap();
            for i in 0..=1000 {
                let p = f64::from(i) / 1000.0;
                let v = e.apply(p);
                assert!((0.0..=1.0).contains(&v), "{name} at {p} gave {v}");
            }
        }
    }

    #[test]
    fn test_input_outside_range_is_clamped_first() {
        assert_eq!(Easing::Linear.apply(-3.0), 0.0);
        assert_eq!(Easing::Linear.apply(7.5), 1.0);
        assert_eq!(Easing::EaseInQuad.apply(2.0), 1.0);
    }

    #[test]
    fn test_elastic_output_is_clamped() {
        // The raw elastic formula overshoots 1.0 around p ≈ 0.85.
        // Downstream interpolation relies on the clamp.
        let v = Easing::Elastic.apply(0.85);
        assert!(v <= 1.0);
    }

    #[test]
    fn test_linear_is_identity_on_unit_interval() {
        assert_eq!(Easing::Linear.apply(0.25), 0.25);
        assert_eq!(Easing::Linear.apply(0.5), 0.5);
    }

    #[test]
    fn test_ease_in_quad_is_slow_then_fast() {
        assert!(Easing::EaseInQuad.apply(0.25) < 0.25);
        assert!(Easing::EaseOutQuad.apply(0.25) > 0.25);
    }

    #[test]
    fn test_lerp_f_endpoints_and_midpoint() {
        assert_eq!(lerp_f(0.0, 10.0, 0.0), 0.0);
        assert_eq!(lerp_f(0.0, 10.0, 1.0), 10.0);
        assert_eq!(lerp_f(0.0, 10.0, 0.5), 5.0);
        // Out-of-range progress is clamped, never extrapolated.
        assert_eq!(lerp_f(0.0, 10.0, 2.0), 10.0);
    }

    #[test]
    fn test_lerp_i_rounds_to_nearest() {
        assert_eq!(lerp_i(0, 10, 0.44), 4);
        assert_eq!(lerp_i(0, 10, 0.45), 5);
        assert_eq!(lerp_i(0, 3, 0.5), 2); // 1.5 rounds away from zero
        assert_eq!(lerp_i(10, 0, 1.0), 0);
    }

    #[test]
    fn test_lerp_pos_interpolates_both_axes() {
        assert_eq!(lerp_pos((0, 0), (100, -50), 0.5), (50, -25));
    }

    #[test]
    fn test_lerp_rgb_midpoint() {
        let a = Rgb::new(0, 0, 0);
        let b = Rgb::new(255, 100, 0);
        let mid = lerp_rgb(a, b, 0.5);
        assert_eq!(mid, Rgb::new(128, 50, 0));
    }

    #[test]
    fn test_rgb_display_is_hex() {
        assert_eq!(Rgb::new(255, 0, 16).to_string(), "#ff0010");
    }

    #[test]
    fn test_easing_serializes_as_snake_case_name() {
        let json = serde_json::to_string(&Easing::EaseInOutQuad).unwrap();
        assert_eq!(json, "\"ease_in_out_quad\"");
        let back: Easing = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Easing::EaseInOutQuad);
    }
}
