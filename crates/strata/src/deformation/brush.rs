//! Brush tools and weights.

use serde::{Deserialize, Serialize};
use strata_core::{Vec2, Vec3};

/// Active editing tool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrushTool {
    /// No editing.
    #[default]
    None,
    /// Uniform raise inside the radius.
    Raise,
    /// Raise with a Gaussian falloff.
    RaiseGaussian,
    /// Uniform lower inside the radius.
    Lower,
    /// Lower with a Gaussian falloff.
    LowerGaussian,
    /// Pull heights toward their mean.
    Smooth,
}

impl BrushTool {
    /// Whether the tool applies a Gaussian falloff.
    #[must_use]
    pub const fn is_gaussian(self) -> bool {
        matches!(self, Self::RaiseGaussian | Self::LowerGaussian)
    }

    /// Sign the brush strength takes under this tool, if it moves heights.
    #[must_use]
    pub const fn direction(self) -> Option<f32> {
        match self {
            Self::Raise | Self::RaiseGaussian => Some(1.0),
            Self::Lower | Self::LowerGaussian => Some(-1.0),
            Self::None | Self::Smooth => None,
        }
    }
}

/// Brush shape and rates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushSettings {
    /// World-space radius; vertices strictly inside are edited.
    pub radius: f32,
    /// Height change per second. Positive raises, negative lowers.
    pub strength: f32,
    /// Fraction of the way to the mean height per second.
    pub smoothing_rate: f32,
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self {
            radius: 10.0,
            strength: 5.0,
            smoothing_rate: 2.0,
        }
    }
}

impl BrushSettings {
    /// Returns a copy with every field clamped into its valid range.
    #[must_use]
    pub fn validated(&self) -> Self {
        let finite_or = |value: f32, fallback: f32| if value.is_finite() { value } else { fallback };
        let defaults = Self::default();
        Self {
            radius: finite_or(self.radius, defaults.radius).max(0.0),
            strength: finite_or(self.strength, defaults.strength),
            smoothing_rate: finite_or(self.smoothing_rate, defaults.smoothing_rate).max(0.0),
        }
    }
}

/// Weight of a Gaussian brush at `distance`, with `σ = radius / 2`.
///
/// 1 at the center; 0 for a degenerate radius.
#[inline]
#[must_use]
pub fn gaussian_weight(distance: f32, radius: f32) -> f32 {
    if radius <= 0.0 {
        return 0.0;
    }
    let sigma = radius * 0.5;
    (-(distance * distance) / (2.0 * sigma * sigma)).exp()
}

/// Result of casting a ray from the screen into the scene.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    /// World-space hit position.
    pub point: Vec3,
    /// Whether the hit object is terrain.
    pub is_terrain: bool,
}

/// Screen-to-world picking, supplied by the host engine.
pub trait Raycaster {
    /// Casts a ray through `screen`. `None` on a miss.
    fn cast(&self, screen: Vec2) -> Option<RayHit>;
}

impl<F> Raycaster for F
where
    F: Fn(Vec2) -> Option<RayHit>,
{
    fn cast(&self, screen: Vec2) -> Option<RayHit> {
        self(screen)
    }
}

/// Pointer state for one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerInput {
    /// Pointer position in screen space.
    pub screen: Vec2,
    /// Whether the primary button is held.
    pub pressed: bool,
}
