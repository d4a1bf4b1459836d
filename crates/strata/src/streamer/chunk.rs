//! Per-chunk streaming state.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_core::{Bounds2, Vec2, Vec3};
use strata_procedural::{HeightMap, Mesh, MeshSettings};

/// Integer chunk grid position.
///
/// Chunk `(x, z)` is centered at `(x, z) * mesh_world_size` in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    /// Chunk X coordinate.
    pub x: i32,
    /// Chunk Z coordinate.
    pub z: i32,
}

impl ChunkCoord {
    /// Creates a new chunk coordinate.
    #[must_use]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Offsets by whole chunks.
    #[must_use]
    pub const fn offset(self, dx: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.z + dz)
    }

    /// Chunk whose center is nearest to a world position.
    #[must_use]
    pub fn nearest(world: Vec2, mesh_world_size: f32) -> Self {
        Self::new(
            (world.x / mesh_world_size).round() as i32,
            (world.y / mesh_world_size).round() as i32,
        )
    }

    /// Chunk index by flooring a world position.
    #[must_use]
    pub fn floor(world: Vec2, mesh_world_size: f32) -> Self {
        Self::new(
            (world.x / mesh_world_size).floor() as i32,
            (world.y / mesh_world_size).floor() as i32,
        )
    }

    /// The eight surrounding coordinates.
    #[must_use]
    pub fn neighbors(self) -> [Self; 8] {
        [
            self.offset(-1, 0),
            self.offset(1, 0),
            self.offset(0, -1),
            self.offset(0, 1),
            self.offset(-1, -1),
            self.offset(1, 1),
            self.offset(-1, 1),
            self.offset(1, -1),
        ]
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.x, self.z)
    }
}

/// Where a chunk is in its generation lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkPhase {
    /// Nothing requested yet (or the request was rejected).
    Unrequested,
    /// Height map job in flight.
    HeightMapPending,
    /// Height map received, no mesh requested.
    HeightMapReady,
    /// Mesh job in flight for this LOD, nothing installed.
    MeshPending(u8),
    /// Mesh at this LOD is installed.
    MeshReady(u8),
}

/// Mesh cache slot for one LOD.
#[derive(Debug, Default)]
pub(crate) struct LodMesh {
    pub(crate) mesh: Option<Mesh>,
    pub(crate) requested: bool,
}

/// One terrain chunk, owned by the streamer.
#[derive(Debug)]
pub struct TerrainChunk {
    coord: ChunkCoord,
    generation: u64,
    origin: Vec3,
    sample_center: Vec2,
    bounds: Bounds2,
    pub(crate) height_map: Option<Arc<HeightMap>>,
    pub(crate) height_map_requested: bool,
    pub(crate) lod_meshes: BTreeMap<u8, LodMesh>,
    pub(crate) visible: bool,
    pub(crate) installed_lod: Option<u8>,
    pub(crate) lod_index: Option<usize>,
    pub(crate) collider_lod: Option<u8>,
    pub(crate) collider_revision: u64,
    pub(crate) deformed: bool,
}

impl TerrainChunk {
    pub(crate) fn new(coord: ChunkCoord, generation: u64, settings: &MeshSettings) -> Self {
        let mesh_world_size = settings.mesh_world_size();
        let position = Vec2::new(coord.x as f32, coord.z as f32) * mesh_world_size;
        // Whole grid cells, so neighbouring samples line up exactly.
        let cells = settings.chunk_size() as f32;
        Self {
            coord,
            generation,
            origin: Vec3::new(position.x, 0.0, position.y),
            sample_center: Vec2::new(coord.x as f32 * cells, coord.z as f32 * cells),
            bounds: Bounds2::from_center_size(position, Vec2::new(mesh_world_size, mesh_world_size)),
            height_map: None,
            height_map_requested: false,
            lod_meshes: BTreeMap::new(),
            visible: false,
            installed_lod: None,
            lod_index: None,
            collider_lod: None,
            collider_revision: 0,
            deformed: false,
        }
    }

    /// Grid coordinate.
    #[must_use]
    pub const fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Identity of this chunk instance; a re-created chunk gets a new one.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// World-space anchor of the mesh.
    #[must_use]
    pub const fn origin(&self) -> Vec3 {
        self.origin
    }

    /// Noise sample offset for this chunk's height map.
    #[must_use]
    pub const fn sample_center(&self) -> Vec2 {
        self.sample_center
    }

    /// Horizontal footprint.
    #[must_use]
    pub const fn bounds(&self) -> Bounds2 {
        self.bounds
    }

    /// Distance from a viewer to the nearest point of the footprint.
    #[must_use]
    pub fn distance_to(&self, viewer: Vec2) -> f32 {
        self.bounds.sqr_distance(viewer).sqrt()
    }

    /// Received height map, if any.
    #[must_use]
    pub fn height_map(&self) -> Option<&HeightMap> {
        self.height_map.as_deref()
    }

    /// Whether the chunk is currently shown.
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        self.visible
    }

    /// LOD of the installed render mesh.
    #[must_use]
    pub const fn installed_lod(&self) -> Option<u8> {
        self.installed_lod
    }

    /// The installed render mesh.
    #[must_use]
    pub fn mesh(&self) -> Option<&Mesh> {
        self.installed_lod.and_then(|lod| self.mesh_at(lod))
    }

    /// Cached mesh for a LOD, installed or not.
    #[must_use]
    pub fn mesh_at(&self, lod: u8) -> Option<&Mesh> {
        self.lod_meshes.get(&lod).and_then(|slot| slot.mesh.as_ref())
    }

    /// Whether a mesh for `lod` was ever requested.
    #[must_use]
    pub fn has_requested_mesh(&self, lod: u8) -> bool {
        self.lod_meshes.get(&lod).is_some_and(|slot| slot.requested)
    }

    /// LODs with a realized mesh.
    pub fn cached_lods(&self) -> impl Iterator<Item = u8> + '_ {
        self.lod_meshes
            .iter()
            .filter(|(_, slot)| slot.mesh.is_some())
            .map(|(&lod, _)| lod)
    }

    /// The collision mesh: a view of one of the cached meshes.
    #[must_use]
    pub fn collider(&self) -> Option<&Mesh> {
        self.collider_lod.and_then(|lod| self.mesh_at(lod))
    }

    /// Whether a collider has been installed. Latches.
    #[must_use]
    pub const fn has_collider(&self) -> bool {
        self.collider_lod.is_some()
    }

    /// Bumped every time the collider is (re)published.
    #[must_use]
    pub const fn collider_revision(&self) -> u64 {
        self.collider_revision
    }

    /// Whether the mesh has been edited and is pinned to its LOD.
    #[must_use]
    pub const fn is_deformed(&self) -> bool {
        self.deformed
    }

    /// Lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> ChunkPhase {
        if self.height_map.is_none() {
            return if self.height_map_requested {
                ChunkPhase::HeightMapPending
            } else {
                ChunkPhase::Unrequested
            };
        }
        if let Some(lod) = self.installed_lod {
            return ChunkPhase::MeshReady(lod);
        }
        self.lod_meshes
            .iter()
            .find(|(_, slot)| slot.requested && slot.mesh.is_none())
            .map_or(ChunkPhase::HeightMapReady, |(&lod, _)| ChunkPhase::MeshPending(lod))
    }

    pub(crate) fn slot_mut(&mut self, lod: u8) -> &mut LodMesh {
        self.lod_meshes.entry(lod).or_default()
    }

    /// The installed mesh, for editing in place.
    pub(crate) fn installed_mesh_mut(&mut self) -> Option<&mut Mesh> {
        let lod = self.installed_lod?;
        self.lod_meshes.get_mut(&lod).and_then(|slot| slot.mesh.as_mut())
    }

    /// Points the collider at the installed mesh and bumps its revision.
    ///
    /// Returns the LOD the collider now views.
    pub(crate) fn publish_collider(&mut self) -> Option<u8> {
        let lod = self.installed_lod?;
        self.collider_lod = Some(lod);
        self.collider_revision += 1;
        Some(lod)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coord_lookup() {
        let size = 100.0;
        assert_eq!(ChunkCoord::nearest(Vec2::new(49.0, -51.0), size), ChunkCoord::new(0, -1));
        assert_eq!(ChunkCoord::floor(Vec2::new(49.0, -51.0), size), ChunkCoord::new(0, -1));
        assert_eq!(ChunkCoord::floor(Vec2::new(-1.0, 1.0), size), ChunkCoord::new(-1, 0));
        assert_eq!(ChunkCoord::new(2, 3).to_string(), "[2,3]");
    }

    #[test]
    fn test_neighbors_are_distinct() {
        let center = ChunkCoord::new(0, 0);
        let neighbors = center.neighbors();
        for (i, a) in neighbors.iter().enumerate() {
            assert_ne!(*a, center);
            for b in &neighbors[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_new_chunk_geometry() {
        let settings = MeshSettings {
            mesh_scale: 2.0,
            chunk_size_index: 0,
            flat_shading: false,
        };
        let chunk = TerrainChunk::new(ChunkCoord::new(1, -2), 7, &settings);
        assert_eq!(chunk.origin(), Vec3::new(96.0, 0.0, -192.0));
        assert_eq!(chunk.sample_center(), Vec2::new(48.0, -96.0));
        assert_eq!(chunk.distance_to(Vec2::new(96.0, -192.0)), 0.0);
        assert_eq!(chunk.distance_to(Vec2::new(96.0 + 48.0 + 10.0, -192.0)), 10.0);
        assert_eq!(chunk.phase(), ChunkPhase::Unrequested);
        assert!(!chunk.has_collider());
        assert!(chunk.mesh().is_none());
    }
}
