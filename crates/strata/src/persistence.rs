//! # Terrain Persistence
//!
//! Saves installed chunk meshes, edits included, and writes them back
//! onto a streamer that has regenerated the same chunks.
//!
//! ## Format
//!
//! ```text
//! TerrainSnapshot (JSON)
//! ├── version
//! ├── config            full TerrainConfig
//! └── chunks[]          sorted by coordinate
//!     ├── coord, lod
//!     └── vertices, triangles, uvs, normals
//! ```
//!
//! The compressed form is the same JSON in an LZ4 block with the
//! uncompressed size prepended.
//!
//! Records are keyed by coordinate. Loading never creates chunks: a
//! record is applied only when its chunk is loaded at the same LOD with
//! the same buffer sizes.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use strata_core::{Vec2, Vec3};
use tracing::{info, warn};

use crate::config::TerrainConfig;
use crate::error::{PersistenceError, PersistenceResult};
use crate::streamer::{ChunkCoord, ChunkStreamer};

/// Current document version.
pub const FORMAT_VERSION: u32 = 1;

/// Saved render mesh of one chunk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Chunk coordinate.
    pub coord: ChunkCoord,
    /// LOD of the saved mesh.
    pub lod: u8,
    /// Local-space positions.
    pub vertices: Vec<Vec3>,
    /// Triangle list.
    pub triangles: Vec<u32>,
    /// Texture coordinates.
    pub uvs: Vec<Vec2>,
    /// Vertex normals.
    pub normals: Vec<Vec3>,
}

/// Everything needed to restore a terrain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerrainSnapshot {
    /// Format version.
    pub version: u32,
    /// Configuration the terrain was generated with.
    pub config: TerrainConfig,
    /// Installed meshes.
    pub chunks: Vec<ChunkRecord>,
}

impl TerrainSnapshot {
    /// Records every chunk with an installed mesh, in coordinate order.
    #[must_use]
    pub fn capture(streamer: &ChunkStreamer) -> Self {
        let chunks = streamer
            .coords()
            .into_iter()
            .filter_map(|coord| {
                let mesh = streamer.chunk(coord)?.mesh()?;
                Some(ChunkRecord {
                    coord,
                    lod: mesh.lod(),
                    vertices: mesh.positions().to_vec(),
                    triangles: mesh.indices().to_vec(),
                    uvs: mesh.uvs().to_vec(),
                    normals: mesh.normals().to_vec(),
                })
            })
            .collect();

        Self {
            version: FORMAT_VERSION,
            config: streamer.config().clone(),
            chunks,
        }
    }

    /// Writes saved positions back onto loaded chunks.
    ///
    /// Records whose chunk is missing, at another LOD or sized
    /// differently are skipped with a warning. Chunks whose positions
    /// differ are republished and pinned like any edit, and their shared
    /// edge normals restitched. Returns the number of records applied.
    pub fn apply(&self, streamer: &mut ChunkStreamer) -> usize {
        if &self.config != streamer.config() {
            warn!("terrain snapshot was saved with a different configuration");
        }

        let mut applied = 0;
        let mut edited = Vec::new();
        for record in &self.chunks {
            let coord = record.coord;
            let Some(mesh) = streamer.chunk_mut(coord).and_then(|chunk| chunk.installed_mesh_mut()) else {
                warn!("Chunk {coord}: not loaded, saved mesh skipped");
                continue;
            };
            if mesh.lod() != record.lod
                || mesh.vertex_count() != record.vertices.len()
                || mesh.indices() != record.triangles.as_slice()
            {
                warn!("Chunk {coord}: saved mesh does not match the loaded one, skipped");
                continue;
            }

            applied += 1;
            if mesh.positions() == record.vertices.as_slice() {
                continue;
            }
            mesh.restore_positions(&record.vertices);
            mesh.recalculate_normals();
            streamer.publish_edit(coord);
            edited.push(coord);
        }
        streamer.stitch_seams(&edited);

        info!(applied, records = self.chunks.len(), "terrain snapshot applied");
        applied
    }

    /// Serializes to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> PersistenceResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses JSON.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON, an unknown version, or a
    /// structurally invalid stored config.
    pub fn from_json(text: &str) -> PersistenceResult<Self> {
        let snapshot: Self = serde_json::from_str(text)?;
        snapshot.checked()
    }

    /// Serializes to LZ4-compressed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_compressed(&self) -> PersistenceResult<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        Ok(lz4_flex::compress_prepend_size(&json))
    }

    /// Parses LZ4-compressed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error for a corrupt block or as [`from_json`](Self::from_json).
    pub fn from_compressed(bytes: &[u8]) -> PersistenceResult<Self> {
        let json = lz4_flex::decompress_size_prepended(bytes)?;
        let snapshot: Self = serde_json::from_slice(&json)?;
        snapshot.checked()
    }

    /// Writes pretty JSON to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save_json(&self, path: impl AsRef<Path>) -> PersistenceResult<()> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?)?;
        info!(path = %path.display(), chunks = self.chunks.len(), "terrain saved");
        Ok(())
    }

    /// Reads JSON from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read or parse fails.
    pub fn load_json(path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let path = path.as_ref();
        let snapshot = Self::from_json(&fs::read_to_string(path)?)?;
        info!(path = %path.display(), chunks = snapshot.chunks.len(), "terrain loaded");
        Ok(snapshot)
    }

    /// Writes compressed JSON to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save_compressed(&self, path: impl AsRef<Path>) -> PersistenceResult<()> {
        let path = path.as_ref();
        let bytes = self.to_compressed()?;
        fs::write(path, &bytes)?;
        info!(path = %path.display(), bytes = bytes.len(), "terrain saved (compressed)");
        Ok(())
    }

    /// Reads compressed JSON from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read, decompression or parse fails.
    pub fn load_compressed(path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let path = path.as_ref();
        let snapshot = Self::from_compressed(&fs::read(path)?)?;
        info!(path = %path.display(), chunks = snapshot.chunks.len(), "terrain loaded (compressed)");
        Ok(snapshot)
    }

    fn checked(self) -> PersistenceResult<Self> {
        if self.version != FORMAT_VERSION {
            return Err(PersistenceError::Version {
                found: self.version,
                expected: FORMAT_VERSION,
            });
        }
        Ok(Self {
            config: self.config.validated()?,
            ..self
        })
    }
}
