//! # Height Maps
//!
//! Bordered height grids for one chunk.
//!
//! ## Pipeline
//!
//! ```text
//! NoiseField ──► (− FalloffField, clamped) ──► HeightCurve ──► × multiplier
//!                                                                   │
//!                                                    HeightMap { values, min, max }
//! ```
//!
//! The grid is `verts_per_line + 2` wide: one extra ring on every side,
//! sampled only so the mesher can compute seam-correct normals.

use serde::{Deserialize, Serialize};
use strata_core::{inverse_lerp, lerp, Vec2};

use crate::falloff::FalloffField;
use crate::grid::Grid;
use crate::noise::{NoiseField, NoiseSettings};

/// One keyframe of a `HeightCurve`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurveKey {
    /// Input position, usually in [0, 1].
    pub time: f32,
    /// Output value at `time`.
    pub value: f32,
}

impl CurveKey {
    /// Creates a keyframe.
    #[must_use]
    pub const fn new(time: f32, value: f32) -> Self {
        Self { time, value }
    }
}

/// Piecewise-linear remapping curve.
///
/// Keys are kept sorted by time. Inputs outside the key range evaluate
/// to the first or last value. An empty curve is the identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<CurveKey>", into = "Vec<CurveKey>")]
pub struct HeightCurve {
    keys: Vec<CurveKey>,
}

impl HeightCurve {
    /// Creates a curve from keyframes in any order.
    #[must_use]
    pub fn new(mut keys: Vec<CurveKey>) -> Self {
        keys.retain(|key| key.time.is_finite() && key.value.is_finite());
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { keys }
    }

    /// The identity mapping on [0, 1].
    #[must_use]
    pub fn linear() -> Self {
        Self::new(vec![CurveKey::new(0.0, 0.0), CurveKey::new(1.0, 1.0)])
    }

    /// Keyframes, sorted by time.
    #[must_use]
    pub fn keys(&self) -> &[CurveKey] {
        &self.keys
    }

    /// Evaluates the curve at `t`.
    #[must_use]
    pub fn evaluate(&self, t: f32) -> f32 {
        let (Some(first), Some(last)) = (self.keys.first(), self.keys.last()) else {
            return t;
        };
        if t <= first.time {
            return first.value;
        }
        if t >= last.time {
            return last.value;
        }

        let upper = self.keys.partition_point(|key| key.time <= t);
        let a = self.keys[upper - 1];
        let b = self.keys[upper];
        lerp(a.value, b.value, inverse_lerp(a.time, b.time, t))
    }
}

impl Default for HeightCurve {
    /// Flattens the low range into shallow plains.
    fn default() -> Self {
        Self::new(vec![
            CurveKey::new(0.0, 0.0),
            CurveKey::new(0.35, 0.08),
            CurveKey::new(1.0, 1.0),
        ])
    }
}

impl From<Vec<CurveKey>> for HeightCurve {
    fn from(keys: Vec<CurveKey>) -> Self {
        Self::new(keys)
    }
}

impl From<HeightCurve> for Vec<CurveKey> {
    fn from(curve: HeightCurve) -> Self {
        curve.keys
    }
}

/// Parameters of the height pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeightMapSettings {
    /// Fractal noise parameters.
    pub noise: NoiseSettings,
    /// Subtract the island falloff mask.
    pub use_falloff: bool,
    /// Vertical scale applied after the curve.
    pub height_multiplier: f32,
    /// Remaps normalized noise before scaling.
    pub height_curve: HeightCurve,
}

impl Default for HeightMapSettings {
    fn default() -> Self {
        Self {
            noise: NoiseSettings::default(),
            use_falloff: false,
            height_multiplier: 40.0,
            height_curve: HeightCurve::default(),
        }
    }
}

impl HeightMapSettings {
    /// Returns a copy with the noise settings clamped.
    #[must_use]
    pub fn validated(&self) -> Self {
        Self {
            noise: self.noise.validated(),
            ..self.clone()
        }
    }

    /// Lowest height the curve can produce.
    #[must_use]
    pub fn min_height(&self) -> f32 {
        self.height_multiplier * self.height_curve.evaluate(0.0)
    }

    /// Highest height the curve can produce.
    #[must_use]
    pub fn max_height(&self) -> f32 {
        self.height_multiplier * self.height_curve.evaluate(1.0)
    }
}

/// Immutable bordered height grid with its realized range.
#[derive(Clone, Debug, PartialEq)]
pub struct HeightMap {
    values: Grid<f32>,
    min_value: f32,
    max_value: f32,
}

impl HeightMap {
    /// Wraps a grid, computing its realized range.
    #[must_use]
    pub fn from_grid(values: Grid<f32>) -> Self {
        let (min_value, max_value) = values
            .as_slice()
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        Self {
            values,
            min_value,
            max_value,
        }
    }

    /// The height values, border ring included.
    #[must_use]
    pub const fn values(&self) -> &Grid<f32> {
        &self.values
    }

    /// Smallest realized height.
    #[must_use]
    pub const fn min_value(&self) -> f32 {
        self.min_value
    }

    /// Largest realized height.
    #[must_use]
    pub const fn max_value(&self) -> f32 {
        self.max_value
    }

    /// Grayscale preview, one byte per cell, row-major.
    ///
    /// Black is `min_value`, white is `max_value`.
    #[must_use]
    pub fn to_luma8(&self) -> Vec<u8> {
        self.values
            .as_slice()
            .iter()
            .map(|&v| (inverse_lerp(self.min_value, self.max_value, v) * 255.0).round() as u8)
            .collect()
    }
}

/// Builds height maps for chunks.
pub struct HeightMapBuilder;

impl HeightMapBuilder {
    /// Builds the bordered height map for one chunk.
    ///
    /// The result is `(verts_per_line + 2)²`. Each call owns its noise
    /// lattice and buffers, so calls for different chunks may run
    /// concurrently.
    #[must_use]
    pub fn build(verts_per_line: usize, settings: &HeightMapSettings, sample_center: Vec2) -> HeightMap {
        let size = verts_per_line + 2;
        let mut values = NoiseField::generate(size, size, &settings.noise, sample_center);

        let falloff = settings.use_falloff.then(|| FalloffField::generate(size));

        for y in 0..size {
            for x in 0..size {
                let mut value = values.get(x, y);
                if let Some(mask) = &falloff {
                    value = (value - mask.get(x, y)).clamp(0.0, 1.0);
                }
                values.set(x, y, settings.height_curve.evaluate(value) * settings.height_multiplier);
            }
        }

        HeightMap::from_grid(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curve_interpolates_and_clamps() {
        let curve = HeightCurve::new(vec![
            CurveKey::new(1.0, 10.0),
            CurveKey::new(0.0, 0.0),
            CurveKey::new(0.5, 2.0),
        ]);

        assert_eq!(curve.evaluate(-1.0), 0.0);
        assert_eq!(curve.evaluate(0.25), 1.0);
        assert_eq!(curve.evaluate(0.75), 6.0);
        assert_eq!(curve.evaluate(2.0), 10.0);
    }

    #[test]
    fn test_empty_curve_is_identity() {
        let curve = HeightCurve::new(Vec::new());
        assert_eq!(curve.evaluate(0.42), 0.42);
    }

    #[test]
    fn test_bordered_size() {
        let map = HeightMapBuilder::build(25, &HeightMapSettings::default(), Vec2::ZERO);
        assert_eq!(map.values().width(), 27);
        assert_eq!(map.values().height(), 27);
    }

    #[test]
    fn test_min_max_tracked() {
        let map = HeightMapBuilder::build(49, &HeightMapSettings::default(), Vec2::ZERO);
        for &v in map.values().as_slice() {
            assert!(v >= map.min_value() && v <= map.max_value());
        }
        assert!(map.min_value() < map.max_value());
    }

    #[test]
    fn test_falloff_only_lowers_terrain() {
        let plain = HeightMapSettings {
            height_curve: HeightCurve::linear(),
            ..HeightMapSettings::default()
        };
        let island = HeightMapSettings {
            use_falloff: true,
            ..plain.clone()
        };
        let without = HeightMapBuilder::build(49, &plain, Vec2::ZERO);
        let with = HeightMapBuilder::build(49, &island, Vec2::ZERO);

        for (a, b) in with.values().as_slice().iter().zip(without.values().as_slice()) {
            assert!(a <= b, "falloff raised a cell: {a} > {b}");
            assert!((0.0..=plain.height_multiplier).contains(a));
        }
    }

    #[test]
    fn test_height_range_from_curve() {
        let settings = HeightMapSettings {
            height_multiplier: 20.0,
            height_curve: HeightCurve::linear(),
            ..HeightMapSettings::default()
        };
        assert_eq!(settings.min_height(), 0.0);
        assert_eq!(settings.max_height(), 20.0);
    }

    #[test]
    fn test_luma_preview() {
        let grid = Grid::from_fn(2, 1, |x, _| x as f32 * 4.0);
        let map = HeightMap::from_grid(grid);
        assert_eq!(map.to_luma8(), vec![0, 255]);
    }
}
