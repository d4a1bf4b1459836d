//! # Chunk Streaming
//!
//! Decides which chunks exist around the viewer, at what detail, and
//! when their colliders appear.
//!
//! ## Per-Chunk Lifecycle
//!
//! ```text
//! Unrequested ──► HeightMapPending ──► HeightMapReady ──► MeshPending(lod)
//!      ▲                                                       │
//!      │ (queue full: retried next tick)                       ▼
//!      └───────────────────────────────────────────────  MeshReady(lod)
//!                                                         Visible | Hidden
//! ```
//!
//! Each chunk caches one mesh per LOD and swaps between them without
//! re-requesting. Meshes are requested lazily, at most once per LOD.
//!
//! ## Threading
//!
//! All state lives on the thread calling [`ChunkStreamer::update`].
//! Workers only see settings snapshots (`Arc`) and the chunk's height
//! map; their results come back as completions that run against the
//! [`ChunkTable`] and are checked against the chunk's generation
//! before use.
//!
//! ## Deformed Chunks
//!
//! Once a chunk's mesh has been edited it is pinned to its installed
//! LOD: no LOD swaps, no new mesh requests.
//!
//! Edge vertices are shared with neighbouring chunks. After an edit the
//! normals of every copy are rebuilt from the live faces of all chunks
//! sharing the vertex, so the copies stay identical.

mod chunk;
mod lod;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use strata_core::{Vec2, Vec3, WorkQueue};
use strata_procedural::{HeightMap, HeightMapBuilder, HeightMapSettings, Mesh, MeshBuilder, MeshSettings};
use tracing::{debug, warn};

pub use chunk::{ChunkCoord, ChunkPhase, TerrainChunk};
pub use lod::{LodInfo, LodTable};

use crate::config::{StreamingPolicy, TerrainConfig};
use crate::error::ConfigResult;
use crate::events::StreamerEvent;

/// What a background job produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Bordered height map.
    HeightMap,
    /// Sealed mesh at a LOD.
    Mesh(u8),
}

/// Identity of a background job, used to coalesce duplicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JobKey {
    /// Target chunk.
    pub coord: ChunkCoord,
    /// Target chunk instance.
    pub generation: u64,
    /// Product.
    pub kind: JobKind,
}

/// Streaming counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamerStats {
    /// Chunks currently tracked.
    pub chunks: usize,
    /// Chunks currently visible.
    pub visible: usize,
    /// Jobs submitted and not yet delivered.
    pub pending_jobs: usize,
    /// Height maps accepted.
    pub height_maps_received: u64,
    /// Meshes accepted.
    pub meshes_received: u64,
    /// Results discarded because their chunk was gone or replaced.
    pub stale_results: u64,
    /// Submissions the queue refused.
    pub rejected_submissions: u64,
    /// Chunks dropped under the unload policy.
    pub chunks_unloaded: u64,
}

/// Chunk state that background completions mutate.
#[derive(Debug, Default)]
pub struct ChunkTable {
    chunks: HashMap<ChunkCoord, TerrainChunk>,
    dirty: BTreeSet<ChunkCoord>,
    events: Vec<StreamerEvent>,
    stats: StreamerStats,
}

impl ChunkTable {
    fn receive_height_map(&mut self, coord: ChunkCoord, generation: u64, map: HeightMap) {
        match self.chunks.get_mut(&coord) {
            Some(chunk) if chunk.generation() == generation => {
                chunk.height_map = Some(Arc::new(map));
                self.stats.height_maps_received += 1;
                self.dirty.insert(coord);
                debug!("Chunk {coord}: height map received");
            }
            _ => {
                self.stats.stale_results += 1;
                warn!("Chunk {coord}: discarding stale height map (generation {generation})");
            }
        }
    }

    fn receive_mesh(&mut self, coord: ChunkCoord, generation: u64, lod: u8, mesh: Mesh) {
        match self.chunks.get_mut(&coord) {
            Some(chunk) if chunk.generation() == generation => {
                debug!("Chunk {coord}: LOD {lod} mesh received, {} vertices", mesh.vertex_count());
                chunk.slot_mut(lod).mesh = Some(mesh);
                self.stats.meshes_received += 1;
                self.dirty.insert(coord);
            }
            _ => {
                self.stats.stale_results += 1;
                warn!("Chunk {coord}: discarding stale LOD {lod} mesh (generation {generation})");
            }
        }
    }
}

/// Owns every chunk and drives generation around a moving viewer.
pub struct ChunkStreamer {
    config: TerrainConfig,
    height_settings: Arc<HeightMapSettings>,
    mesh_settings: Arc<MeshSettings>,
    table: ChunkTable,
    queue: WorkQueue<ChunkTable, JobKey>,
    visible: Vec<ChunkCoord>,
    viewer: Vec2,
    last_viewer: Option<Vec2>,
    viewer_at_last_pass: Option<Vec2>,
    next_generation: u64,
    mesh_world_size: f32,
    chunks_visible_in_view: i32,
}

impl ChunkStreamer {
    /// Validates `config` and starts the worker pool.
    ///
    /// # Errors
    ///
    /// Returns the validation error if the config is structurally invalid.
    pub fn new(config: TerrainConfig) -> ConfigResult<Self> {
        let config = config.validated()?;
        let mesh_world_size = config.mesh.mesh_world_size();
        let max_view = config.streaming.lods.max_view_distance();
        let chunks_visible_in_view = (max_view / mesh_world_size).round() as i32;

        debug!(
            mesh_world_size,
            max_view, chunks_visible_in_view, "chunk streamer configured"
        );

        Ok(Self {
            height_settings: Arc::new(config.height_map.clone()),
            mesh_settings: Arc::new(config.mesh.clone()),
            queue: WorkQueue::new(config.work_queue_config()),
            config,
            table: ChunkTable::default(),
            visible: Vec::new(),
            viewer: Vec2::ZERO,
            last_viewer: None,
            viewer_at_last_pass: None,
            next_generation: 0,
            mesh_world_size,
            chunks_visible_in_view,
        })
    }

    /// One streaming tick.
    ///
    /// Delivers finished jobs, re-evaluates the chunks they touched,
    /// refreshes colliders if the viewer moved, and runs a full
    /// visibility pass once the viewer has travelled far enough.
    pub fn update(&mut self, viewer: Vec2) {
        self.pump();

        let moved = self.last_viewer != Some(viewer);
        self.last_viewer = Some(viewer);
        self.viewer = viewer;

        if moved {
            for coord in self.visible.clone() {
                self.update_collision(coord);
            }
        }

        let threshold = self.config.streaming.viewer_move_threshold;
        let needs_pass = self
            .viewer_at_last_pass
            .map_or(true, |old| old.distance_squared(viewer) > threshold * threshold);
        if needs_pass {
            self.viewer_at_last_pass = Some(viewer);
            self.update_visible_chunks();
        }
    }

    /// Pumps until no work is outstanding or `timeout` elapses.
    ///
    /// Blocking; for loading screens, tools and tests. Returns the number
    /// of results delivered.
    pub fn flush(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut delivered = 0;
        loop {
            delivered += self.pump();
            if self.queue.pending() == 0 && self.table.dirty.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                warn!(pending = self.queue.pending(), "flush timed out with work outstanding");
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        delivered
    }

    /// Takes every event recorded since the last call, oldest first.
    pub fn drain_events(&mut self) -> Vec<StreamerEvent> {
        std::mem::take(&mut self.table.events)
    }

    fn pump(&mut self) -> usize {
        let completed = self.queue.take_completed();
        let delivered = completed.len();
        for run in completed {
            run(&mut self.table);
        }

        let dirty = std::mem::take(&mut self.table.dirty);
        for coord in dirty {
            self.update_chunk(coord);
            self.update_collision(coord);
        }
        delivered
    }

    fn update_visible_chunks(&mut self) {
        let mut updated: HashSet<ChunkCoord> = HashSet::new();
        for coord in self.visible.clone().into_iter().rev() {
            updated.insert(coord);
            self.update_chunk(coord);
        }

        let current = ChunkCoord::nearest(self.viewer, self.mesh_world_size);
        let reach = self.chunks_visible_in_view;
        let map_radius = self.config.streaming.map_radius;

        let mut window: HashSet<ChunkCoord> = HashSet::new();
        for dz in -reach..=reach {
            for dx in -reach..=reach {
                let mut coord = current.offset(dx, dz);
                if let Some(radius) = map_radius {
                    coord = ChunkCoord::new(coord.x.clamp(-radius, radius), coord.z.clamp(-radius, radius));
                }
                window.insert(coord);
                if !updated.insert(coord) {
                    continue;
                }
                if self.table.chunks.contains_key(&coord) {
                    self.update_chunk(coord);
                } else {
                    self.create_chunk(coord);
                }
            }
        }

        if let StreamingPolicy::Unload { distance } = self.config.streaming.policy {
            self.unload_beyond(distance, &window);
        }
    }

    fn create_chunk(&mut self, coord: ChunkCoord) {
        let generation = self.next_generation;
        self.next_generation += 1;

        self.table
            .chunks
            .insert(coord, TerrainChunk::new(coord, generation, &self.mesh_settings));
        self.table.events.push(StreamerEvent::ChunkCreated { coord });
        debug!("Chunk {coord}: created (generation {generation})");

        self.request_height_map(coord);
    }

    fn update_chunk(&mut self, coord: ChunkCoord) {
        let viewer = self.viewer;
        let lods = &self.config.streaming.lods;
        let mut request = None;

        {
            let Some(chunk) = self.table.chunks.get_mut(&coord) else {
                return;
            };

            if chunk.height_map.is_none() {
                if !chunk.height_map_requested {
                    request = Some(JobKind::HeightMap);
                }
            } else {
                let distance = chunk.distance_to(viewer);
                let was_visible = chunk.visible;
                let visible = distance <= lods.max_view_distance();

                if visible && !chunk.deformed {
                    let index = lods.select(distance);
                    if chunk.lod_index != Some(index) {
                        let lod = lods.lod_at(index);
                        if chunk.mesh_at(lod).is_some() {
                            chunk.lod_index = Some(index);
                            chunk.installed_lod = Some(lod);
                            self.table.events.push(StreamerEvent::MeshInstalled { coord, lod });
                            debug!("Chunk {coord}: installed LOD {lod}");
                        } else if !chunk.has_requested_mesh(lod) {
                            request = Some(JobKind::Mesh(lod));
                        }
                    }
                }

                if was_visible != visible {
                    chunk.visible = visible;
                    self.table
                        .events
                        .push(StreamerEvent::VisibilityChanged { coord, visible });
                    if visible {
                        self.visible.push(coord);
                    } else {
                        self.visible.retain(|c| *c != coord);
                    }
                }
            }
        }

        match request {
            Some(JobKind::HeightMap) => self.request_height_map(coord),
            Some(JobKind::Mesh(lod)) => self.request_mesh(coord, lod),
            None => {}
        }
    }

    fn update_collision(&mut self, coord: ChunkCoord) {
        let viewer = self.viewer;
        let streaming = &self.config.streaming;
        let Some(level) = streaming.lods.get(streaming.collider_lod_index).copied() else {
            return;
        };
        let threshold = streaming.collider_generation_distance;
        let mut request = None;

        {
            let Some(chunk) = self.table.chunks.get_mut(&coord) else {
                return;
            };
            if chunk.has_collider() || chunk.height_map.is_none() {
                return;
            }

            let sqr_distance = chunk.bounds().sqr_distance(viewer);
            if sqr_distance < level.sqr_visible_distance() && !chunk.has_requested_mesh(level.lod) {
                request = Some(level.lod);
            }

            if sqr_distance < threshold * threshold && chunk.mesh_at(level.lod).is_some() {
                chunk.collider_lod = Some(level.lod);
                chunk.collider_revision += 1;
                self.table
                    .events
                    .push(StreamerEvent::ColliderInstalled { coord, lod: level.lod });
                debug!("Chunk {coord}: collider installed at LOD {}", level.lod);
            }
        }

        if let Some(lod) = request {
            self.request_mesh(coord, lod);
        }
    }

    fn request_height_map(&mut self, coord: ChunkCoord) {
        let Some(chunk) = self.table.chunks.get_mut(&coord) else {
            return;
        };
        let generation = chunk.generation();
        let center = chunk.sample_center();
        let verts_per_line = self.mesh_settings.verts_per_line();
        let settings = Arc::clone(&self.height_settings);

        let key = JobKey {
            coord,
            generation,
            kind: JobKind::HeightMap,
        };
        let submitted = self.queue.submit_keyed(
            key,
            move || HeightMapBuilder::build(verts_per_line, &settings, center),
            move |map, table: &mut ChunkTable| table.receive_height_map(coord, generation, map),
        );

        match submitted {
            Ok(()) => chunk.height_map_requested = true,
            Err(err) => {
                self.table.stats.rejected_submissions += 1;
                self.table.dirty.insert(coord);
                warn!("Chunk {coord}: height map request rejected ({err}), retrying");
            }
        }
    }

    fn request_mesh(&mut self, coord: ChunkCoord, lod: u8) {
        let Some(chunk) = self.table.chunks.get_mut(&coord) else {
            return;
        };
        let Some(height_map) = chunk.height_map.clone() else {
            return;
        };
        let generation = chunk.generation();
        let settings = Arc::clone(&self.mesh_settings);

        let key = JobKey {
            coord,
            generation,
            kind: JobKind::Mesh(lod),
        };
        let submitted = self.queue.submit_keyed(
            key,
            move || MeshBuilder::build(height_map.values(), &settings, lod).seal(),
            move |mesh, table: &mut ChunkTable| table.receive_mesh(coord, generation, lod, mesh),
        );

        match submitted {
            Ok(()) => {
                chunk.slot_mut(lod).requested = true;
                debug!("Chunk {coord}: LOD {lod} mesh requested");
            }
            Err(err) => {
                self.table.stats.rejected_submissions += 1;
                self.table.dirty.insert(coord);
                warn!("Chunk {coord}: LOD {lod} mesh request rejected ({err}), retrying");
            }
        }
    }

    /// Drops chunks farther than `distance` that the current window no
    /// longer covers.
    fn unload_beyond(&mut self, distance: f32, window: &HashSet<ChunkCoord>) {
        let viewer = self.viewer;
        let mut doomed: Vec<ChunkCoord> = self
            .table
            .chunks
            .values()
            .filter(|chunk| !window.contains(&chunk.coord()) && chunk.distance_to(viewer) > distance)
            .map(TerrainChunk::coord)
            .collect();
        doomed.sort_unstable();

        for coord in doomed {
            self.table.chunks.remove(&coord);
            self.table.dirty.remove(&coord);
            self.visible.retain(|c| *c != coord);
            self.table.stats.chunks_unloaded += 1;
            self.table.events.push(StreamerEvent::ChunkUnloaded { coord });
            debug!("Chunk {coord}: unloaded");
        }
    }

    /// Marks a chunk's render mesh as edited and points its collider at it.
    pub(crate) fn publish_edit(&mut self, coord: ChunkCoord) {
        let Some(chunk) = self.table.chunks.get_mut(&coord) else {
            return;
        };
        chunk.deformed = true;
        let previous = chunk.collider_lod;
        if let Some(lod) = chunk.publish_collider() {
            self.table.events.push(StreamerEvent::MeshEdited { coord });
            if previous != Some(lod) {
                self.table.events.push(StreamerEvent::ColliderInstalled { coord, lod });
            }
        }
    }

    /// Rebuilds the normals of edge vertices of `edited` chunks from the
    /// live faces of every chunk sharing them.
    ///
    /// A vertex is restitched only when each chunk sharing it has an
    /// installed mesh with a vertex on the same grid cell; across a LOD
    /// change the baked contribution stays. Neighbours whose shading
    /// changed report `MeshEdited` but are not pinned. Returns the number
    /// of normals rewritten.
    pub(crate) fn stitch_seams(&mut self, edited: &[ChunkCoord]) -> usize {
        let cells = self.mesh_settings.chunk_size();
        let mut seams: BTreeMap<ChunkCoord, Vec<(u32, Vec3)>> = BTreeMap::new();

        for &coord in edited {
            let Some(mesh) = self.chunk(coord).and_then(TerrainChunk::mesh) else {
                continue;
            };
            'vertex: for (vertex, gx, gy) in mesh.edge_vertices() {
                let mut members = vec![(coord, vertex, mesh.face_normal_sum(vertex))];
                for (dx, dz) in sharing_offsets(gx, gy, cells) {
                    let neighbor = coord.offset(dx, dz);
                    let shared = self.chunk(neighbor).and_then(TerrainChunk::mesh).and_then(|other| {
                        let nx = gx.checked_add_signed(-(dx as isize) * cells as isize)?;
                        let nz = gy.checked_add_signed(-(dz as isize) * cells as isize)?;
                        let index = other.lattice_vertex(nx, nz)?;
                        Some((neighbor, index, other.face_normal_sum(index)))
                    });
                    match shared {
                        Some(member) => members.push(member),
                        None => continue 'vertex,
                    }
                }
                if members.len() < 2 {
                    continue;
                }
                let total = members.iter().fold(Vec3::ZERO, |sum, member| sum + member.2);
                for (owner, index, own) in members {
                    seams.entry(owner).or_default().push((index, total - own));
                }
            }
        }

        let mut rewritten = 0;
        for (coord, updates) in seams {
            let Some(mesh) = self.table.chunks.get_mut(&coord).and_then(TerrainChunk::installed_mesh_mut) else {
                continue;
            };
            for (vertex, seam) in updates {
                if mesh.set_seam_normal(vertex, seam) {
                    rewritten += 1;
                }
            }
            if !edited.contains(&coord) {
                self.table.events.push(StreamerEvent::MeshEdited { coord });
            }
        }
        rewritten
    }

    pub(crate) fn chunk_mut(&mut self, coord: ChunkCoord) -> Option<&mut TerrainChunk> {
        self.table.chunks.get_mut(&coord)
    }

    /// The validated configuration.
    #[must_use]
    pub const fn config(&self) -> &TerrainConfig {
        &self.config
    }

    /// Chunk at a coordinate.
    #[must_use]
    pub fn chunk(&self, coord: ChunkCoord) -> Option<&TerrainChunk> {
        self.table.chunks.get(&coord)
    }

    /// All tracked chunks, in no particular order.
    pub fn chunks(&self) -> impl Iterator<Item = &TerrainChunk> {
        self.table.chunks.values()
    }

    /// All tracked coordinates, sorted.
    #[must_use]
    pub fn coords(&self) -> Vec<ChunkCoord> {
        let mut coords: Vec<ChunkCoord> = self.table.chunks.keys().copied().collect();
        coords.sort_unstable();
        coords
    }

    /// Number of tracked chunks.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.table.chunks.len()
    }

    /// Currently visible chunks, in the order they became visible.
    #[must_use]
    pub fn visible_chunks(&self) -> &[ChunkCoord] {
        &self.visible
    }

    /// Viewer position from the last update.
    #[must_use]
    pub const fn viewer(&self) -> Vec2 {
        self.viewer
    }

    /// Chunk the viewer is standing in.
    #[must_use]
    pub fn viewer_chunk(&self) -> ChunkCoord {
        ChunkCoord::nearest(self.viewer, self.mesh_world_size)
    }

    /// Side length of one chunk in world units.
    #[must_use]
    pub const fn mesh_world_size(&self) -> f32 {
        self.mesh_world_size
    }

    /// Chunk rings generated around the viewer.
    #[must_use]
    pub const fn chunks_visible_in_view(&self) -> i32 {
        self.chunks_visible_in_view
    }

    /// Terrain height under a world position, from the nearest vertex of
    /// the installed mesh.
    #[must_use]
    pub fn height_at(&self, point: Vec2) -> Option<f32> {
        let chunk = self.chunk(ChunkCoord::nearest(point, self.mesh_world_size))?;
        let mesh = chunk.mesh()?;
        let vertex = mesh.nearest_vertex(point - chunk.origin().xz())?;
        Some(mesh.positions()[vertex as usize].y + chunk.origin().y)
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> StreamerStats {
        StreamerStats {
            chunks: self.table.chunks.len(),
            visible: self.visible.len(),
            pending_jobs: self.queue.pending(),
            ..self.table.stats
        }
    }
}

/// Chunk offsets that share the edge vertex at bordered-grid cell
/// `(gx, gy)`, for chunks `cells` quads wide.
fn sharing_offsets(gx: usize, gy: usize, cells: usize) -> Vec<(i32, i32)> {
    let sides = |g: usize| -> Vec<i32> {
        let mut sides = vec![0];
        if g == 1 {
            sides.push(-1);
        }
        if g == cells + 1 {
            sides.push(1);
        }
        sides
    };
    let (xs, zs) = (sides(gx), sides(gy));
    xs.iter()
        .flat_map(|&dx| zs.iter().map(move |&dz| (dx, dz)))
        .filter(|&offset| offset != (0, 0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_procedural::Grid;

    #[test]
    fn test_sharing_offsets() {
        assert!(sharing_offsets(10, 10, 48).is_empty());
        assert_eq!(sharing_offsets(1, 10, 48), vec![(-1, 0)]);
        assert_eq!(sharing_offsets(10, 49, 48), vec![(0, 1)]);
        let mut corner = sharing_offsets(49, 1, 48);
        corner.sort_unstable();
        assert_eq!(corner, vec![(0, -1), (1, -1), (1, 0)]);
    }

    fn tiny_mesh() -> Mesh {
        let grid = Grid::new(5, 5, 0.0f32);
        MeshBuilder::build(&grid, &MeshSettings::default(), 0).seal()
    }

    #[test]
    fn test_stale_results_are_discarded() {
        let settings = MeshSettings::default();
        let coord = ChunkCoord::new(0, 0);
        let mut table = ChunkTable::default();
        table.chunks.insert(coord, TerrainChunk::new(coord, 5, &settings));

        let map = HeightMap::from_grid(Grid::new(3, 3, 1.0));
        table.receive_height_map(coord, 4, map.clone());
        table.receive_mesh(ChunkCoord::new(9, 9), 0, 0, tiny_mesh());

        assert_eq!(table.stats.stale_results, 2);
        assert!(table.chunks[&coord].height_map().is_none());
        assert!(table.dirty.is_empty());

        table.receive_height_map(coord, 5, map);
        assert!(table.chunks[&coord].height_map().is_some());
        assert!(table.dirty.contains(&coord));
    }

    #[test]
    fn test_mesh_results_are_cached_per_lod() {
        let settings = MeshSettings::default();
        let coord = ChunkCoord::new(1, 1);
        let mut table = ChunkTable::default();
        table.chunks.insert(coord, TerrainChunk::new(coord, 0, &settings));

        table.receive_mesh(coord, 0, 2, tiny_mesh());
        let chunk = &table.chunks[&coord];
        assert!(chunk.mesh_at(2).is_some());
        assert!(chunk.mesh_at(0).is_none());
        assert!(chunk.mesh().is_none(), "received meshes are cached, not installed");
        assert_eq!(chunk.cached_lods().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_view_reach() {
        let config = TerrainConfig::default();
        let streamer = ChunkStreamer::new(config).expect("default config");
        // 600 / (144 * 2.5) rounds to 2
        assert_eq!(streamer.chunks_visible_in_view(), 2);
        assert_eq!(streamer.viewer_chunk(), ChunkCoord::new(0, 0));
        assert_eq!(streamer.stats(), StreamerStats::default());
        assert!(streamer.height_at(Vec2::ZERO).is_none());
    }
}
