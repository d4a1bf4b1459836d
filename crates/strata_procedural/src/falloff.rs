//! # Falloff Mask
//!
//! Radial attenuation for island-shaped terrain.
//!
//! ```text
//!   1 ┤██                      ██
//!     │ ██                    ██
//!     │   ██                ██
//!   0 ┤     ████████████████
//!     └──────────────────────────
//!      edge      center      edge
//! ```
//!
//! The mask uses the Chebyshev distance `max(|x|, |y|)` so the flat
//! region is square, matching the chunk grid.

use crate::grid::Grid;

/// Steepness of the transition.
const STEEPNESS: f32 = 3.0;

/// Spread of the flat center region.
const SPREAD: f32 = 2.2;

/// Generator for the square falloff mask.
pub struct FalloffField;

impl FalloffField {
    /// Generates a `size × size` mask with values in [0, 1].
    ///
    /// Near 0 at the center, rising to 1 at the edge.
    #[must_use]
    pub fn generate(size: usize) -> Grid<f32> {
        let extent = size.max(1) as f32;
        Grid::from_fn(size, size, |i, j| {
            let x = i as f32 / extent * 2.0 - 1.0;
            let y = j as f32 / extent * 2.0 - 1.0;
            Self::evaluate(x.abs().max(y.abs()))
        })
    }

    /// Shapes a normalized distance `v ∈ [0, 1]` into a mask value.
    #[inline]
    #[must_use]
    pub fn evaluate(v: f32) -> f32 {
        let v = v.clamp(0.0, 1.0);
        let rise = v.powf(STEEPNESS);
        let fall = (SPREAD - SPREAD * v).powf(STEEPNESS);
        rise / (rise + fall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_endpoints() {
        assert_eq!(FalloffField::evaluate(0.0), 0.0);
        assert_eq!(FalloffField::evaluate(1.0), 1.0);
        assert!(FalloffField::evaluate(0.3) < 0.05);
    }

    #[test]
    fn test_values_in_unit_range() {
        let mask = FalloffField::generate(65);
        for &value in mask.as_slice() {
            assert!((0.0..=1.0).contains(&value), "mask value {value} out of range");
        }
    }

    #[test]
    fn test_mask_is_symmetric_about_axes() {
        let mask = FalloffField::generate(32);
        assert_eq!(mask.get(5, 16), mask.get(16, 5));
    }

    #[test]
    fn test_empty_size() {
        let mask = FalloffField::generate(0);
        assert!(mask.as_slice().is_empty());
    }
}
