//! # Terrain Deformation
//!
//! Runtime brush editing of installed chunk meshes.
//!
//! ## Stroke Flow
//!
//! ```text
//! pointer down ──► begin_stroke
//!                      │
//!     every tick ──► continue_stroke(hit) ──► first touch of a chunk? snapshot it
//!                      │                       mutate positions
//!                      │                       patch normals around edited vertices
//!                      │                       publish (collider views the edit)
//!                      │                       restitch shared edge normals
//!  pointer up ──► end_stroke ──► snapshots become one undo entry
//! ```
//!
//! A hit touches the chunk under it (floored) and its 8 neighbours, so
//! brushes straddling a seam edit both sides. Only chunks with an
//! installed mesh are editable; editing pins a chunk to its current LOD.
//!
//! ## Tools
//!
//! | Tool            | Effect per tick                                        |
//! |-----------------|--------------------------------------------------------|
//! | `Raise`/`Lower` | `y += strength * dt` inside the radius                 |
//! | `*Gaussian`     | same, weighted by `exp(-d² / 2σ²)`, `σ = radius / 2`   |
//! | `Smooth`        | `y = lerp(y, mean, rate * dt)` over all chunks in reach |
//!
//! Distances are 3D, from vertex to hit point, and strictly less than
//! the radius. An edge vertex shared by two chunks counts once toward
//! the smoothing mean.

mod brush;
mod history;

use std::collections::HashSet;

use strata_core::{lerp, Vec3};
use tracing::{debug, info, warn};

pub use brush::{gaussian_weight, BrushSettings, BrushTool, PointerInput, RayHit, Raycaster};
pub use history::{ChunkSnapshot, History, TerrainState, DEFAULT_HISTORY_DEPTH};

use crate::streamer::{ChunkCoord, ChunkStreamer, TerrainChunk};

/// Brush editor with undo/redo.
#[derive(Debug, Default)]
pub struct DeformationEngine {
    tool: BrushTool,
    brush: BrushSettings,
    history: History,
    stroke: Option<TerrainState>,
}

impl DeformationEngine {
    /// Creates an engine with the given brush and no active tool.
    #[must_use]
    pub fn new(brush: BrushSettings) -> Self {
        Self::with_history_depth(brush, DEFAULT_HISTORY_DEPTH)
    }

    /// Creates an engine keeping at most `depth` undo entries.
    #[must_use]
    pub fn with_history_depth(brush: BrushSettings, depth: usize) -> Self {
        Self {
            tool: BrushTool::None,
            brush: brush.validated(),
            history: History::new(depth),
            stroke: None,
        }
    }

    /// Active tool.
    #[must_use]
    pub const fn tool(&self) -> BrushTool {
        self.tool
    }

    /// Current brush.
    #[must_use]
    pub const fn brush(&self) -> &BrushSettings {
        &self.brush
    }

    /// Selects a tool. Raising tools make the strength positive, lowering
    /// tools negative.
    pub fn set_tool(&mut self, tool: BrushTool) {
        if self.tool != tool {
            self.end_stroke();
        }
        self.tool = tool;
        self.apply_direction();
    }

    /// Replaces the brush; the strength sign follows the active tool.
    pub fn set_brush(&mut self, brush: BrushSettings) {
        self.brush = brush.validated();
        self.apply_direction();
    }

    /// Sets the brush radius.
    pub fn set_radius(&mut self, radius: f32) {
        self.set_brush(BrushSettings {
            radius,
            ..self.brush.clone()
        });
    }

    fn apply_direction(&mut self) {
        if let Some(sign) = self.tool.direction() {
            self.brush.strength = self.brush.strength.abs() * sign;
        }
    }

    /// Whether a stroke is open.
    #[must_use]
    pub const fn is_stroking(&self) -> bool {
        self.stroke.is_some()
    }

    /// Opens a stroke. No-op while one is already open.
    pub fn begin_stroke(&mut self) {
        if self.stroke.is_none() {
            self.stroke = Some(TerrainState::new());
        }
    }

    /// Applies the active tool at `hit` for `dt` seconds.
    ///
    /// Opens a stroke if none is open. Returns the number of vertices
    /// moved.
    pub fn continue_stroke(&mut self, streamer: &mut ChunkStreamer, hit: Vec3, dt: f32) -> usize {
        if self.tool == BrushTool::None {
            return 0;
        }
        self.begin_stroke();

        let center = ChunkCoord::floor(hit.xz(), streamer.mesh_world_size());
        let candidates: Vec<ChunkCoord> = std::iter::once(center)
            .chain(center.neighbors())
            .filter(|&coord| streamer.chunk(coord).is_some_and(|chunk| chunk.mesh().is_some()))
            .collect();

        if self.tool == BrushTool::Smooth {
            self.smooth(streamer, &candidates, hit, dt)
        } else {
            self.displace(streamer, &candidates, hit, dt)
        }
    }

    /// Closes the stroke, recording it for undo if it changed anything.
    ///
    /// Returns whether a history entry was created.
    pub fn end_stroke(&mut self) -> bool {
        let Some(stroke) = self.stroke.take() else {
            return false;
        };
        if stroke.is_empty() {
            return false;
        }
        info!(chunks = stroke.len(), "terrain stroke committed");
        self.history.commit(stroke);
        true
    }

    /// Drives strokes from pointer state.
    ///
    /// Pressed and over terrain: the stroke continues at the hit. Pressed
    /// over nothing: this tick is skipped, the stroke stays open.
    /// Released or absent: the stroke ends. Returns vertices moved.
    pub fn apply(
        &mut self,
        streamer: &mut ChunkStreamer,
        input: Option<PointerInput>,
        raycaster: &dyn Raycaster,
        dt: f32,
    ) -> usize {
        match input {
            Some(pointer) if pointer.pressed && self.tool != BrushTool::None => {
                match raycaster.cast(pointer.screen).filter(|hit| hit.is_terrain) {
                    Some(hit) => self.continue_stroke(streamer, hit.point, dt),
                    None => 0,
                }
            }
            _ => {
                self.end_stroke();
                0
            }
        }
    }

    fn displace(&mut self, streamer: &mut ChunkStreamer, candidates: &[ChunkCoord], hit: Vec3, dt: f32) -> usize {
        let radius = self.brush.radius;
        let gaussian = self.tool.is_gaussian();
        let delta = self.brush.strength * dt;
        let mut moved = 0;
        let mut edited = Vec::new();

        for &coord in candidates {
            let reached = match streamer.chunk(coord) {
                Some(chunk) => vertices_in_reach(chunk, hit, radius),
                None => continue,
            };
            if reached.is_empty() {
                continue;
            }
            self.snapshot_once(streamer, coord);

            let Some(mesh) = streamer.chunk_mut(coord).and_then(TerrainChunk::installed_mesh_mut) else {
                continue;
            };
            let positions = mesh.positions_mut();
            for &(vertex, distance) in &reached {
                let weight = if gaussian { gaussian_weight(distance, radius) } else { 1.0 };
                positions[vertex as usize].y += delta * weight;
            }

            let dirty: HashSet<u32> = reached.iter().map(|&(vertex, _)| vertex).collect();
            mesh.recalculate_normals_for(&dirty);
            streamer.publish_edit(coord);
            edited.push(coord);
            moved += reached.len();
        }
        streamer.stitch_seams(&edited);
        moved
    }

    fn smooth(&mut self, streamer: &mut ChunkStreamer, candidates: &[ChunkCoord], hit: Vec3, dt: f32) -> usize {
        let radius = self.brush.radius;
        let scale = streamer.config().mesh.mesh_scale;

        // Gather across every chunk before touching any of them.
        let mut gathered: Vec<(ChunkCoord, f32, Vec<u32>)> = Vec::new();
        let mut sampled: HashSet<(i64, i64)> = HashSet::new();
        let mut sum = 0.0f64;
        let mut count = 0usize;
        for &coord in candidates {
            let Some(chunk) = streamer.chunk(coord) else {
                continue;
            };
            let Some(mesh) = chunk.mesh() else {
                continue;
            };
            let base = chunk.origin().y;
            let vertices: Vec<u32> = vertices_in_reach(chunk, hit, radius)
                .into_iter()
                .map(|(vertex, _)| vertex)
                .collect();
            if vertices.is_empty() {
                continue;
            }
            let origin = chunk.origin();
            for &vertex in &vertices {
                let position = mesh.positions()[vertex as usize] + origin;
                let cell = ((position.x / scale).round() as i64, (position.z / scale).round() as i64);
                if sampled.insert(cell) {
                    sum += f64::from(position.y);
                    count += 1;
                }
            }
            gathered.push((coord, base, vertices));
        }

        if count == 0 {
            return 0;
        }
        let mean = (sum / count as f64) as f32;
        let t = self.brush.smoothing_rate * dt;
        let mut moved = 0;

        for (coord, base, vertices) in &gathered {
            self.snapshot_once(streamer, *coord);
            let Some(mesh) = streamer.chunk_mut(*coord).and_then(TerrainChunk::installed_mesh_mut) else {
                continue;
            };
            let positions = mesh.positions_mut();
            for &vertex in vertices {
                let position = &mut positions[vertex as usize];
                position.y = lerp(position.y + base, mean, t) - base;
            }

            let dirty: HashSet<u32> = vertices.iter().copied().collect();
            mesh.recalculate_normals_for(&dirty);
            streamer.publish_edit(*coord);
            moved += vertices.len();
        }

        let edited: Vec<ChunkCoord> = gathered.iter().map(|(coord, _, _)| *coord).collect();
        streamer.stitch_seams(&edited);
        debug!(vertices = moved, samples = count, mean, "smoothed");
        moved
    }

    fn snapshot_once(&mut self, streamer: &ChunkStreamer, coord: ChunkCoord) {
        let Some(stroke) = self.stroke.as_mut() else {
            return;
        };
        if stroke.contains(coord) {
            return;
        }
        if let Some(snapshot) = streamer.chunk(coord).and_then(snapshot_of) {
            stroke.push(snapshot);
        }
    }

    /// Reverts the most recent stroke. Returns whether anything was undone.
    ///
    /// An open stroke is committed first.
    pub fn undo(&mut self, streamer: &mut ChunkStreamer) -> bool {
        self.end_stroke();
        let Some(state) = self.history.pop_undo() else {
            return false;
        };
        let current = capture_current(streamer, &state);
        let restored = restore(streamer, &state);
        self.history.push_redo(current);
        info!(chunks = restored, "undo");
        true
    }

    /// Re-applies the most recently undone stroke. Returns whether
    /// anything was redone.
    pub fn redo(&mut self, streamer: &mut ChunkStreamer) -> bool {
        self.end_stroke();
        let Some(state) = self.history.pop_redo() else {
            return false;
        };
        let current = capture_current(streamer, &state);
        let restored = restore(streamer, &state);
        self.history.push_undo(current);
        info!(chunks = restored, "redo");
        true
    }

    /// Whether [`undo`](Self::undo) would do anything.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.history.can_undo() || self.stroke.as_ref().is_some_and(|stroke| !stroke.is_empty())
    }

    /// Whether [`redo`](Self::redo) would do anything.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Undo/redo storage.
    #[must_use]
    pub const fn history(&self) -> &History {
        &self.history
    }
}

/// Installed-mesh vertices strictly within `radius` of `hit`, with their
/// distances.
fn vertices_in_reach(chunk: &TerrainChunk, hit: Vec3, radius: f32) -> Vec<(u32, f32)> {
    let Some(mesh) = chunk.mesh() else {
        return Vec::new();
    };
    let origin = chunk.origin();
    mesh.positions()
        .iter()
        .enumerate()
        .filter_map(|(index, &position)| {
            let distance = (position + origin).distance(hit);
            (distance < radius).then_some((index as u32, distance))
        })
        .collect()
}

fn snapshot_of(chunk: &TerrainChunk) -> Option<ChunkSnapshot> {
    let mesh = chunk.mesh()?;
    Some(ChunkSnapshot {
        coord: chunk.coord(),
        generation: chunk.generation(),
        lod: mesh.lod(),
        positions: mesh.positions().to_vec(),
    })
}

/// Current positions of the chunks `state` covers.
fn capture_current(streamer: &ChunkStreamer, state: &TerrainState) -> TerrainState {
    let mut current = TerrainState::new();
    for snapshot in state.chunks() {
        let live = streamer
            .chunk(snapshot.coord)
            .filter(|chunk| chunk.generation() == snapshot.generation)
            .and_then(snapshot_of);
        if let Some(live) = live {
            current.push(live);
        }
    }
    current
}

/// Writes snapshots back, recomputes normals and republishes colliders.
fn restore(streamer: &mut ChunkStreamer, state: &TerrainState) -> usize {
    let mut restored = Vec::new();
    for snapshot in state.chunks() {
        let coord = snapshot.coord;
        let Some(chunk) = streamer
            .chunk_mut(coord)
            .filter(|chunk| chunk.generation() == snapshot.generation)
        else {
            warn!("Chunk {coord}: no longer loaded, edit history skipped");
            continue;
        };
        let Some(mesh) = chunk.installed_mesh_mut().filter(|mesh| mesh.lod() == snapshot.lod) else {
            warn!("Chunk {coord}: mesh changed since snapshot, edit history skipped");
            continue;
        };
        if !mesh.restore_positions(&snapshot.positions) {
            warn!("Chunk {coord}: snapshot size mismatch, edit history skipped");
            continue;
        }
        mesh.recalculate_normals();
        streamer.publish_edit(coord);
        restored.push(coord);
    }
    streamer.stitch_seams(&restored);
    restored.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_forces_strength_sign() {
        let mut engine = DeformationEngine::new(BrushSettings::default());
        assert_eq!(engine.tool(), BrushTool::None);

        engine.set_tool(BrushTool::Lower);
        assert_eq!(engine.brush().strength, -5.0);

        engine.set_tool(BrushTool::RaiseGaussian);
        assert_eq!(engine.brush().strength, 5.0);

        engine.set_tool(BrushTool::LowerGaussian);
        engine.set_brush(BrushSettings {
            strength: 3.0,
            ..BrushSettings::default()
        });
        assert_eq!(engine.brush().strength, -3.0);

        engine.set_tool(BrushTool::Smooth);
        assert_eq!(engine.brush().strength, -3.0, "smoothing leaves strength alone");
    }

    #[test]
    fn test_empty_stroke_leaves_no_history() {
        let mut engine = DeformationEngine::new(BrushSettings::default());
        engine.begin_stroke();
        assert!(engine.is_stroking());
        assert!(!engine.end_stroke());
        assert!(!engine.can_undo());
        assert!(!engine.is_stroking());
    }
}
