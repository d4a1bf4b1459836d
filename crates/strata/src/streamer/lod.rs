//! Distance to level-of-detail mapping.

use serde::{Deserialize, Serialize};
use strata_procedural::MAX_LOD;

use crate::error::{ConfigError, ConfigResult};

/// One detail tier: mesh LOD used up to a viewer distance.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LodInfo {
    /// Mesh level of detail, 0 = full resolution.
    pub lod: u8,
    /// Distance from the chunk bounds up to which this tier applies.
    pub visible_distance: f32,
}

impl LodInfo {
    /// Creates a tier.
    #[must_use]
    pub const fn new(lod: u8, visible_distance: f32) -> Self {
        Self {
            lod,
            visible_distance,
        }
    }

    /// Squared threshold, for comparisons against squared distances.
    #[must_use]
    pub fn sqr_visible_distance(&self) -> f32 {
        self.visible_distance * self.visible_distance
    }
}

/// Ordered detail tiers.
///
/// Never empty, sorted by increasing distance. The last distance is the
/// maximum view distance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<LodInfo>", into = "Vec<LodInfo>")]
pub struct LodTable {
    levels: Vec<LodInfo>,
}

impl LodTable {
    /// Builds a table from tiers in any order.
    ///
    /// LODs above the supported maximum are clamped.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if `levels` is empty or a distance is not
    /// a positive finite number.
    pub fn new(mut levels: Vec<LodInfo>) -> ConfigResult<Self> {
        if levels.is_empty() {
            return Err(ConfigError::Invalid("LOD table must have at least one level".into()));
        }
        if let Some(bad) = levels
            .iter()
            .find(|level| !level.visible_distance.is_finite() || level.visible_distance <= 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "LOD {} has invalid visible distance {}",
                bad.lod, bad.visible_distance
            )));
        }

        for level in &mut levels {
            level.lod = level.lod.min(MAX_LOD);
        }
        levels.sort_by(|a, b| a.visible_distance.total_cmp(&b.visible_distance));
        Ok(Self { levels })
    }

    /// Tier index for a viewer distance.
    ///
    /// Walks the thresholds in order and moves to the next tier while the
    /// distance is strictly greater. A distance exactly on a threshold
    /// keeps the finer tier; the last threshold only gates visibility.
    #[must_use]
    pub fn select(&self, distance: f32) -> usize {
        let mut index = 0;
        for i in 0..self.levels.len() - 1 {
            if distance > self.levels[i].visible_distance {
                index = i + 1;
            } else {
                break;
            }
        }
        index
    }

    /// Mesh LOD of the tier at `index`, clamped to the last tier.
    #[must_use]
    pub fn lod_at(&self, index: usize) -> u8 {
        self.levels[index.min(self.levels.len() - 1)].lod
    }

    /// Tier at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&LodInfo> {
        self.levels.get(index)
    }

    /// All tiers, nearest first.
    #[must_use]
    pub fn levels(&self) -> &[LodInfo] {
        &self.levels
    }

    /// Number of tiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Always false; kept for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Distance beyond which chunks are hidden.
    #[must_use]
    pub fn max_view_distance(&self) -> f32 {
        self.levels[self.levels.len() - 1].visible_distance
    }
}

impl Default for LodTable {
    fn default() -> Self {
        Self {
            levels: vec![
                LodInfo::new(0, 200.0),
                LodInfo::new(1, 400.0),
                LodInfo::new(2, 600.0),
            ],
        }
    }
}

impl TryFrom<Vec<LodInfo>> for LodTable {
    type Error = ConfigError;

    fn try_from(levels: Vec<LodInfo>) -> ConfigResult<Self> {
        Self::new(levels)
    }
}

impl From<LodTable> for Vec<LodInfo> {
    fn from(table: LodTable) -> Self {
        table.levels
    }
}
