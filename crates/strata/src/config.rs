//! # Terrain Configuration
//!
//! Everything the pipeline needs, loaded once from TOML.
//!
//! ```toml
//! [height_map]
//! use_falloff = true
//! height_multiplier = 35.0
//!
//! [height_map.noise]
//! seed = 1234
//! scale = 60.0
//!
//! [mesh]
//! chunk_size_index = 2
//!
//! [streaming]
//! lods = [
//!     { lod = 0, visible_distance = 150.0 },
//!     { lod = 2, visible_distance = 450.0 },
//! ]
//! policy = { mode = "unload", distance = 900.0 }
//! ```
//!
//! Missing fields take their defaults. Out-of-range numbers are clamped
//! by [`TerrainConfig::validated`]; only structural problems fail.

use std::path::Path;

use serde::{Deserialize, Serialize};
use strata_core::WorkQueueConfig;
use strata_procedural::{HeightMapSettings, MeshSettings, NormalizeMode};

use crate::deformation::BrushSettings;
use crate::error::{ConfigError, ConfigResult};
use crate::streamer::LodTable;

/// What happens to chunks that leave the view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StreamingPolicy {
    /// Hidden chunks are kept forever and reused on return.
    #[default]
    HideOnly,
    /// Chunks farther than `distance` from the viewer are dropped.
    Unload {
        /// Bounds distance beyond which a chunk is dropped.
        distance: f32,
    },
}

/// Chunk streaming parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Detail tiers by distance.
    pub lods: LodTable,
    /// Tier whose mesh becomes the collider.
    pub collider_lod_index: usize,
    /// Bounds distance under which the collider is installed.
    pub collider_generation_distance: f32,
    /// Viewer travel that triggers a full visibility pass.
    pub viewer_move_threshold: f32,
    /// Hidden chunk retention.
    pub policy: StreamingPolicy,
    /// Fixed map extent in chunks around the origin, if finite.
    pub map_radius: Option<i32>,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            lods: LodTable::default(),
            collider_lod_index: 0,
            collider_generation_distance: 5.0,
            viewer_move_threshold: 25.0,
            policy: StreamingPolicy::HideOnly,
            map_radius: None,
        }
    }
}

/// Worker pool sizing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker threads. `None` picks one less than the core count.
    pub threads: Option<usize>,
    /// Maximum queued jobs before submissions are rejected.
    pub capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: None,
            capacity: WorkQueueConfig::DEFAULT_CAPACITY,
        }
    }
}

/// One material layer, blended by height.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureLayer {
    /// Label for tools.
    pub name: String,
    /// RGB tint.
    pub tint: [f32; 3],
    /// How much of the tint is mixed in.
    pub tint_strength: f32,
    /// Normalized height where the layer starts.
    pub start_height: f32,
    /// Width of the blend into the layer below.
    pub blend_strength: f32,
    /// Texture tiling.
    pub texture_scale: f32,
}

impl Default for TextureLayer {
    fn default() -> Self {
        Self {
            name: String::new(),
            tint: [1.0, 1.0, 1.0],
            tint_strength: 0.0,
            start_height: 0.0,
            blend_strength: 0.0,
            texture_scale: 1.0,
        }
    }
}

impl TextureLayer {
    fn validated(&self) -> Self {
        Self {
            name: self.name.clone(),
            tint: self.tint.map(|c| c.clamp(0.0, 1.0)),
            tint_strength: self.tint_strength.clamp(0.0, 1.0),
            start_height: self.start_height.clamp(0.0, 1.0),
            blend_strength: self.blend_strength.clamp(0.0, 1.0),
            texture_scale: self.texture_scale.max(0.01),
        }
    }
}

/// Complete terrain configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Height pipeline.
    pub height_map: HeightMapSettings,
    /// Chunk sizing and shading.
    pub mesh: MeshSettings,
    /// Streaming and LOD.
    pub streaming: StreamingConfig,
    /// Deformation brush defaults.
    pub brush: BrushSettings,
    /// Material layers, bottom first.
    pub textures: Vec<TextureLayer>,
    /// Background generation pool.
    pub workers: WorkerConfig,
}

impl TerrainConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed TOML, [`ConfigError::Invalid`]
    /// for structural problems.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validated()
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "loading terrain config");
        Self::from_toml_str(&text)
    }

    /// Serializes to pretty TOML.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Serialize`] if a value has no TOML representation.
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Clamps numeric fields and checks structure.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if the collider tier does not exist or the
    /// worker count is zero.
    pub fn validated(self) -> ConfigResult<Self> {
        let lod_count = self.streaming.lods.len();
        if self.streaming.collider_lod_index >= lod_count {
            return Err(ConfigError::Invalid(format!(
                "collider_lod_index {} out of range for {} LOD levels",
                self.streaming.collider_lod_index, lod_count
            )));
        }
        if self.workers.threads == Some(0) {
            return Err(ConfigError::Invalid("worker pool needs at least one thread".into()));
        }

        if self.height_map.noise.normalize_mode == NormalizeMode::Local {
            tracing::warn!("local noise normalization produces seams between streamed chunks");
        }

        let max_view = self.streaming.lods.max_view_distance();
        let policy = match self.streaming.policy {
            StreamingPolicy::Unload { distance } if !(distance >= max_view) => {
                tracing::warn!(distance, max_view, "unload distance raised to the view distance");
                StreamingPolicy::Unload { distance: max_view }
            }
            policy => policy,
        };

        let non_negative = |value: f32, fallback: f32| {
            if value.is_finite() {
                value.max(0.0)
            } else {
                fallback
            }
        };
        let defaults = StreamingConfig::default();

        Ok(Self {
            height_map: self.height_map.validated(),
            mesh: self.mesh.validated(),
            streaming: StreamingConfig {
                collider_generation_distance: non_negative(
                    self.streaming.collider_generation_distance,
                    defaults.collider_generation_distance,
                ),
                viewer_move_threshold: non_negative(
                    self.streaming.viewer_move_threshold,
                    defaults.viewer_move_threshold,
                ),
                policy,
                map_radius: self.streaming.map_radius.map(|radius| radius.max(0)),
                ..self.streaming
            },
            brush: self.brush.validated(),
            textures: self.textures.iter().map(TextureLayer::validated).collect(),
            workers: WorkerConfig {
                threads: self.workers.threads,
                capacity: self.workers.capacity.max(1),
            },
        })
    }

    /// Worker pool settings for the generation queue.
    #[must_use]
    pub fn work_queue_config(&self) -> WorkQueueConfig {
        let mut config = WorkQueueConfig::default();
        if let Some(threads) = self.workers.threads {
            config.workers = threads;
        }
        config.capacity = self.workers.capacity;
        config
    }

    /// Height range the material should map its layers across.
    #[must_use]
    pub fn material_height_range(&self) -> (f32, f32) {
        (self.height_map.min_height(), self.height_map.max_height())
    }
}
