//! # Terrain World
//!
//! The explicit context object. Owns the streamer and the editor; the
//! host holds one of these and passes input in every frame.
//!
//! ```rust,ignore
//! let mut world = TerrainWorld::new(TerrainConfig::from_path("terrain.toml")?)?;
//! loop {
//!     world.tick(camera_position, dt, pointer, &picker);
//!     for event in world.drain_events() {
//!         scene.apply(event, &world);
//!     }
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use strata_core::Vec3;
use tracing::info;

use crate::config::TerrainConfig;
use crate::deformation::{BrushTool, DeformationEngine, PointerInput, Raycaster};
use crate::error::{ConfigResult, PersistenceResult};
use crate::events::StreamerEvent;
use crate::persistence::TerrainSnapshot;
use crate::streamer::{ChunkStreamer, StreamerStats};

/// Streaming terrain with runtime editing.
pub struct TerrainWorld {
    streamer: ChunkStreamer,
    editor: DeformationEngine,
}

impl TerrainWorld {
    /// Validates `config` and starts streaming.
    ///
    /// # Errors
    ///
    /// Returns the validation error if the config is structurally invalid.
    pub fn new(config: TerrainConfig) -> ConfigResult<Self> {
        let editor = DeformationEngine::new(config.brush.clone());
        let streamer = ChunkStreamer::new(config)?;
        info!(
            chunk_world_size = streamer.mesh_world_size(),
            view_chunks = streamer.chunks_visible_in_view(),
            "terrain world ready"
        );
        Ok(Self { streamer, editor })
    }

    /// One frame: stream around `viewer`, then apply the brush.
    ///
    /// Returns the number of vertices the brush moved.
    pub fn tick(&mut self, viewer: Vec3, dt: f32, pointer: Option<PointerInput>, raycaster: &dyn Raycaster) -> usize {
        self.streamer.update(viewer.xz());
        self.editor.apply(&mut self.streamer, pointer, raycaster, dt)
    }

    /// Blocks until outstanding generation work is delivered.
    pub fn flush(&mut self, timeout: Duration) -> usize {
        self.streamer.flush(timeout)
    }

    /// Events since the last call.
    pub fn drain_events(&mut self) -> Vec<StreamerEvent> {
        self.streamer.drain_events()
    }

    /// Selects the brush tool.
    pub fn set_tool(&mut self, tool: BrushTool) {
        self.editor.set_tool(tool);
    }

    /// Reverts the last stroke.
    pub fn undo(&mut self) -> bool {
        self.editor.undo(&mut self.streamer)
    }

    /// Re-applies the last undone stroke.
    pub fn redo(&mut self) -> bool {
        self.editor.redo(&mut self.streamer)
    }

    /// Captures every installed mesh.
    #[must_use]
    pub fn snapshot(&self) -> TerrainSnapshot {
        TerrainSnapshot::capture(&self.streamer)
    }

    /// Writes a snapshot back onto loaded chunks. Returns records applied.
    pub fn restore(&mut self, snapshot: &TerrainSnapshot) -> usize {
        snapshot.apply(&mut self.streamer)
    }

    /// Saves installed meshes to a compressed file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> PersistenceResult<()> {
        self.snapshot().save_compressed(path)
    }

    /// Loads a compressed file and applies it. Returns records applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the read, decompression or parse fails.
    pub fn load(&mut self, path: impl AsRef<Path>) -> PersistenceResult<usize> {
        let snapshot = TerrainSnapshot::load_compressed(path)?;
        Ok(self.restore(&snapshot))
    }

    /// The streamer.
    #[must_use]
    pub const fn streamer(&self) -> &ChunkStreamer {
        &self.streamer
    }

    /// The streamer, mutably.
    pub fn streamer_mut(&mut self) -> &mut ChunkStreamer {
        &mut self.streamer
    }

    /// The editor.
    #[must_use]
    pub const fn editor(&self) -> &DeformationEngine {
        &self.editor
    }

    /// The editor, mutably.
    pub fn editor_mut(&mut self) -> &mut DeformationEngine {
        &mut self.editor
    }

    /// The validated configuration.
    #[must_use]
    pub const fn config(&self) -> &TerrainConfig {
        self.streamer.config()
    }

    /// Streaming counters.
    #[must_use]
    pub fn stats(&self) -> StreamerStats {
        self.streamer.stats()
    }
}
