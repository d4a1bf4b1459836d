//! # Value Noise Implementation
//!
//! Deterministic fractal noise for height fields.
//!
//! ## Layers
//!
//! ```text
//! WorldSeed ──► PermutationTable ──► ValueNoise::sample(x, y) ∈ [0, 1]
//!                                          │
//! NoiseSettings.seed ──► ChaCha8 ──► per-octave offsets (±100000)
//!                                          │
//!                                          ▼
//!                     NoiseField::generate(width, height, settings, center)
//!                                          │
//!                          NormalizeMode::Global | NormalizeMode::Local
//! ```
//!
//! ## Determinism Guarantee
//!
//! Given the same settings and sample center, `NoiseField::generate`
//! produces **bit-identical** grids on every call. Each call builds its
//! own lattice and offset RNG, so calls never share mutable state.
//!
//! ## Normalization
//!
//! `Global` divides by the theoretical amplitude sum. It is stable across
//! chunks and is the only mode that produces seamless streamed terrain.
//! `Local` remaps this grid's realized min/max into [0, 1]; adjacent
//! chunks get different scales.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use strata_core::Vec2;

use crate::grid::Grid;

/// Smallest scale accepted by `NoiseSettings::validated`.
pub const MIN_SCALE: f32 = 0.01;

/// Substitute for a non-positive scale at the point of use.
const SCALE_EPSILON: f32 = 0.0001;

/// Upper bound on octave count.
pub const MAX_OCTAVES: u32 = 10;

/// Range of the per-octave random offsets.
const OCTAVE_OFFSET_RANGE: i32 = 100_000;

/// Purpose tag for deriving the lattice seed.
const LATTICE_PURPOSE: u64 = 0x4C41_5454_4943_4521;

/// World seed for deterministic generation.
///
/// All lattice generation derives from this seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorldSeed(u64);

impl WorldSeed {
    /// Creates a new world seed.
    #[inline]
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Returns the raw seed value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Derives a sub-seed for a specific purpose.
    ///
    /// Uses a hash function to create independent streams from one seed.
    #[inline]
    #[must_use]
    pub const fn derive(self, purpose: u64) -> Self {
        let mut hash = self.0;
        hash ^= purpose;
        hash = hash.wrapping_mul(0x517c_c1b7_2722_0a95);
        hash ^= hash >> 32;
        Self(hash)
    }
}

impl Default for WorldSeed {
    fn default() -> Self {
        Self(0xDEAD_BEEF_CAFE_BABE)
    }
}

impl From<i32> for WorldSeed {
    fn from(seed: i32) -> Self {
        Self::new(i64::from(seed) as u64).derive(LATTICE_PURPOSE)
    }
}

/// Pre-computed lattice for value noise.
///
/// A shuffled permutation hashes integer coordinates to one of 256
/// random lattice values.
struct PermutationTable {
    /// 512-entry permutation table (256 entries, doubled for overflow handling).
    perm: [u8; 512],
    /// Random value per lattice hash, in [0, 1).
    values: [f64; 256],
}

impl PermutationTable {
    fn new(seed: WorldSeed) -> Self {
        let mut perm = [0u8; 512];
        for (i, slot) in perm.iter_mut().take(256).enumerate() {
            *slot = i as u8;
        }

        // xorshift64 is stuck at zero
        let mut rng_state = match seed.value() {
            0 => WorldSeed::default().value(),
            state => state,
        };
        let mut next = move || {
            rng_state ^= rng_state << 13;
            rng_state ^= rng_state >> 7;
            rng_state ^= rng_state << 17;
            rng_state
        };

        // Fisher-Yates shuffle
        for i in (1..256).rev() {
            let j = (next() as usize) % (i + 1);
            perm.swap(i, j);
        }
        perm.copy_within(0..256, 256);

        let mut values = [0.0; 256];
        for value in &mut values {
            *value = (next() >> 11) as f64 / (1u64 << 53) as f64;
        }

        Self { perm, values }
    }

    #[inline]
    fn get(&self, index: usize) -> u8 {
        self.perm[index & 511]
    }

    /// Lattice value at integer coordinate `(i, j)`.
    #[inline]
    fn value_at(&self, i: i64, j: i64) -> f64 {
        let ii = (i & 255) as usize;
        let jj = (j & 255) as usize;
        let hash = self.get(self.get(ii) as usize + jj);
        self.values[hash as usize]
    }
}

/// 2D value noise generator.
///
/// Produces smooth, continuous values in the range [0, 1].
pub struct ValueNoise {
    table: PermutationTable,
}

impl ValueNoise {
    /// Creates a new value noise generator from a seed.
    #[must_use]
    pub fn new(seed: WorldSeed) -> Self {
        Self {
            table: PermutationTable::new(seed),
        }
    }

    /// Samples noise at the given coordinates.
    ///
    /// # Returns
    ///
    /// A value in the range [0, 1].
    #[must_use]
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let x0 = x.floor();
        let y0 = y.floor();
        let u = smoothstep(x - x0);
        let v = smoothstep(y - y0);
        let (i, j) = (x0 as i64, y0 as i64);

        let bottom = lerp64(self.table.value_at(i, j), self.table.value_at(i + 1, j), u);
        let top = lerp64(
            self.table.value_at(i, j + 1),
            self.table.value_at(i + 1, j + 1),
            u,
        );
        lerp64(bottom, top, v)
    }
}

#[inline]
fn smoothstep(t: f64) -> f64 {
    t * t * (3.0 - 2.0 * t)
}

#[inline]
fn lerp64(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// How raw octave sums are mapped into height values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeMode {
    /// Divide by the theoretical amplitude sum. Consistent across chunks.
    #[default]
    Global,
    /// Remap this grid's realized min/max into [0, 1]. Seams between chunks.
    Local,
}

/// Parameters of the fractal noise.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseSettings {
    /// Feature size in grid cells. Larger is smoother.
    pub scale: f32,
    /// Number of layered octaves.
    pub octaves: u32,
    /// Amplitude multiplier per octave.
    pub persistence: f32,
    /// Frequency multiplier per octave.
    pub lacunarity: f32,
    /// Seed for the lattice and the octave offsets.
    pub seed: i32,
    /// Constant offset added to every sample position.
    pub offset: Vec2,
    /// Normalization policy.
    pub normalize_mode: NormalizeMode,
}

impl Default for NoiseSettings {
    fn default() -> Self {
        Self {
            scale: 50.0,
            octaves: 6,
            persistence: 0.6,
            lacunarity: 2.0,
            seed: 0,
            offset: Vec2::ZERO,
            normalize_mode: NormalizeMode::Global,
        }
    }
}

impl NoiseSettings {
    /// Returns a copy with every field clamped into its valid range.
    #[must_use]
    pub fn validated(&self) -> Self {
        Self {
            scale: self.scale.max(MIN_SCALE),
            octaves: self.octaves.clamp(1, MAX_OCTAVES),
            persistence: self.persistence.clamp(0.0, 1.0),
            lacunarity: self.lacunarity.max(1.0),
            ..self.clone()
        }
    }

    /// Scale as used by sampling: never zero or negative.
    #[inline]
    #[must_use]
    pub fn effective_scale(&self) -> f32 {
        if self.scale <= 0.0 {
            SCALE_EPSILON
        } else {
            self.scale
        }
    }

    /// Sum of all octave amplitudes, `Σ persistence^i`.
    #[must_use]
    pub fn max_possible_height(&self) -> f64 {
        let persistence = f64::from(self.persistence.clamp(0.0, 1.0));
        let mut amplitude = 1.0;
        let mut total = 0.0;
        for _ in 0..self.octaves.clamp(1, MAX_OCTAVES) {
            total += amplitude;
            amplitude *= persistence;
        }
        total
    }
}

/// Fractal noise grid generator.
pub struct NoiseField;

impl NoiseField {
    /// Generates a `width × height` grid of fractal noise.
    ///
    /// `sample_center` shifts the sampled window; adjacent chunks pass
    /// centers one chunk apart so their borders line up.
    ///
    /// Out-of-range settings are clamped, never rejected.
    #[must_use]
    pub fn generate(
        width: usize,
        height: usize,
        settings: &NoiseSettings,
        sample_center: Vec2,
    ) -> Grid<f32> {
        let octaves = settings.octaves.clamp(1, MAX_OCTAVES);
        let persistence = f64::from(settings.persistence.clamp(0.0, 1.0));
        let lacunarity = f64::from(settings.lacunarity.max(1.0));
        let scale = f64::from(settings.effective_scale());

        let noise = ValueNoise::new(WorldSeed::from(settings.seed));
        let mut rng = ChaCha8Rng::seed_from_u64(u64::from(settings.seed as u32));
        let offsets: Vec<(f64, f64)> = (0..octaves)
            .map(|_| {
                let ox = rng.gen_range(-OCTAVE_OFFSET_RANGE..OCTAVE_OFFSET_RANGE);
                let oy = rng.gen_range(-OCTAVE_OFFSET_RANGE..OCTAVE_OFFSET_RANGE);
                (
                    f64::from(ox) + f64::from(settings.offset.x) + f64::from(sample_center.x),
                    f64::from(oy) + f64::from(settings.offset.y) + f64::from(sample_center.y),
                )
            })
            .collect();

        let half_width = width as f64 / 2.0;
        let half_height = height as f64 / 2.0;
        let max_possible = settings.max_possible_height();

        let mut local_min = f32::MAX;
        let mut local_max = f32::MIN;

        let mut grid = Grid::from_fn(width, height, |x, y| {
            let mut amplitude = 1.0;
            let mut frequency = 1.0;
            let mut total = 0.0;

            for &(ox, oy) in &offsets {
                let sample_x = (x as f64 - half_width + ox) / scale * frequency;
                let sample_y = (y as f64 - half_height + oy) / scale * frequency;
                total += (noise.sample(sample_x, sample_y) * 2.0 - 1.0) * amplitude;

                amplitude *= persistence;
                frequency *= lacunarity;
            }

            let raw = total as f32;
            local_min = local_min.min(raw);
            local_max = local_max.max(raw);

            match settings.normalize_mode {
                NormalizeMode::Global => (((total + 1.0) / max_possible) as f32).max(0.0),
                NormalizeMode::Local => raw,
            }
        });

        if settings.normalize_mode == NormalizeMode::Local {
            for value in grid.as_mut_slice() {
                *value = strata_core::inverse_lerp(local_min, local_max, *value);
            }
        }

        grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determinism() {
        let seed = WorldSeed::new(12345);
        let noise1 = ValueNoise::new(seed);
        let noise2 = ValueNoise::new(seed);

        for i in 0..100 {
            let x = f64::from(i) * 0.1;
            let y = f64::from(i) * 0.17;
            assert_eq!(
                noise1.sample(x, y).to_bits(),
                noise2.sample(x, y).to_bits(),
                "Noise should be deterministic"
            );
        }
    }

    #[test]
    fn test_different_seeds_different_fields() {
        let a = NoiseSettings { seed: 1, ..NoiseSettings::default() };
        let b = NoiseSettings { seed: 2, ..NoiseSettings::default() };

        let grid_a = NoiseField::generate(16, 16, &a, Vec2::ZERO);
        let grid_b = NoiseField::generate(16, 16, &b, Vec2::ZERO);

        assert_ne!(grid_a, grid_b, "Different seeds should produce different grids");
    }

    #[test]
    fn test_range() {
        let noise = ValueNoise::new(WorldSeed::new(42));

        for i in 0..10_000 {
            let x = f64::from(i) * 0.1 - 500.0;
            let y = f64::from(i) * 0.13 - 650.0;
            let value = noise.sample(x, y);

            assert!(
                (0.0..=1.0).contains(&value),
                "Value {value} out of range at ({x}, {y})"
            );
        }
    }

    #[test]
    fn test_lattice_points_are_table_values() {
        let noise = ValueNoise::new(WorldSeed::new(7));
        let a = noise.sample(3.0, 4.0);
        let b = noise.sample(3.0 + 256.0, 4.0 - 256.0);
        assert_eq!(a, b, "Lattice should tile every 256 cells");
    }

    #[test]
    fn test_continuity() {
        let noise = ValueNoise::new(WorldSeed::new(42));

        let v1 = noise.sample(100.3, 100.7);
        let v2 = noise.sample(100.301, 100.7);
        let v3 = noise.sample(100.3, 100.701);

        assert!((v1 - v2).abs() < 0.01, "Noise should be continuous");
        assert!((v1 - v3).abs() < 0.01, "Noise should be continuous");
    }

    #[test]
    fn test_seed_derivation() {
        let base = WorldSeed::new(42);
        let derived1 = base.derive(1);
        let derived2 = base.derive(2);

        assert_ne!(derived1, derived2, "Different purposes should give different seeds");
        assert_eq!(derived1, base.derive(1), "Same purpose should give same seed");
        assert_ne!(derived1, base, "Derived seed should differ from base");
    }

    #[test]
    fn test_generate_is_bit_identical() {
        let settings = NoiseSettings {
            seed: 99,
            offset: Vec2::new(12.5, -3.0),
            ..NoiseSettings::default()
        };
        let center = Vec2::new(240.0, -480.0);

        let first = NoiseField::generate(33, 33, &settings, center);
        let second = NoiseField::generate(33, 33, &settings, center);

        let bits = |grid: &Grid<f32>| grid.as_slice().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&first), bits(&second));
    }

    #[test]
    fn test_zero_scale_is_finite() {
        let settings = NoiseSettings {
            scale: 0.0,
            ..NoiseSettings::default()
        };
        let grid = NoiseField::generate(8, 8, &settings, Vec2::ZERO);
        assert!(grid.as_slice().iter().all(|v| v.is_finite()));

        let negative = NoiseSettings {
            scale: -4.0,
            ..NoiseSettings::default()
        };
        let grid = NoiseField::generate(8, 8, &negative, Vec2::ZERO);
        assert!(grid.as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_global_normalization_is_non_negative() {
        let grid = NoiseField::generate(64, 64, &NoiseSettings::default(), Vec2::ZERO);
        assert!(grid.as_slice().iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_local_normalization_spans_unit_range() {
        let settings = NoiseSettings {
            normalize_mode: NormalizeMode::Local,
            ..NoiseSettings::default()
        };
        let grid = NoiseField::generate(64, 64, &settings, Vec2::ZERO);

        let min = grid.as_slice().iter().copied().fold(f32::MAX, f32::min);
        let max = grid.as_slice().iter().copied().fold(f32::MIN, f32::max);
        assert_eq!(min, 0.0);
        assert_eq!(max, 1.0);
    }

    #[test]
    fn test_adjacent_windows_share_columns() {
        let settings = NoiseSettings::default();
        // A window shifted by 10 cells sees the same samples 10 columns later.
        let a = NoiseField::generate(20, 4, &settings, Vec2::ZERO);
        let b = NoiseField::generate(20, 4, &settings, Vec2::new(10.0, 0.0));

        for y in 0..4 {
            for x in 0..10 {
                assert_eq!(a.get(x + 10, y), b.get(x, y));
            }
        }
    }

    #[test]
    fn test_validated_clamps() {
        let settings = NoiseSettings {
            scale: -1.0,
            octaves: 0,
            persistence: 1.5,
            lacunarity: 0.5,
            ..NoiseSettings::default()
        }
        .validated();

        assert_eq!(settings.scale, MIN_SCALE);
        assert_eq!(settings.octaves, 1);
        assert_eq!(settings.persistence, 1.0);
        assert_eq!(settings.lacunarity, 1.0);
    }

    #[test]
    fn test_max_possible_height() {
        let settings = NoiseSettings {
            octaves: 3,
            persistence: 0.5,
            ..NoiseSettings::default()
        };
        assert!((settings.max_possible_height() - 1.75).abs() < 1e-12);
    }
}
