//! # Terrain Meshing
//!
//! Triangulates a bordered height grid at a level of detail.
//!
//! ## Border Ring
//!
//! ```text
//!   B B B B B B B      B = border vertex (normals only, never rendered)
//!   B I I I I I B      I = interior vertex (rendered)
//!   B I I I I I B
//!   B I I I I I B      Border triangles contribute their face normals to
//!   B I I I I I B      the interior vertices they touch, so the seam
//!   B I I I I I B      normals match the neighbouring chunk exactly.
//!   B B B B B B B
//! ```
//!
//! ## LOD Lattice
//!
//! Step is 1 at LOD 0 and `2 * lod` above. Along each axis the sampled
//! indices are `0` (border), `1, 1 + s, 1 + 2s, …`, then always the last
//! interior index `N - 2`, then `N - 1` (border). The chunk edge is
//! therefore sampled at every LOD and the border ring is one cell wide.
//!
//! ## Lifecycle
//!
//! `MeshBuilder::build` returns a `MeshData` with baked normals. `seal`
//! drops the border data and produces a `Mesh` that owns its buffers
//! and can be edited in place with incremental normal patching.
//!
//! Once a neighbour is edited the border ring no longer describes its
//! real surface. Owners that hold both meshes replace the baked seam
//! contribution of a shared edge vertex with the neighbour's live face
//! normals via [`Mesh::set_seam_normal`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use strata_core::{Vec2, Vec3};

use crate::grid::Grid;

/// Chunk sizes (quads per side) the mesher supports.
///
/// All are divisible by the LOD 1-4 steps; coarser steps leave one
/// short row against the chunk edge.
pub const SUPPORTED_CHUNK_SIZES: [usize; 9] = [48, 72, 96, 120, 144, 168, 192, 216, 240];

/// Coarsest supported level of detail.
pub const MAX_LOD: u8 = 6;

/// Vertex stride between samples at a level of detail.
#[inline]
#[must_use]
pub const fn lod_step(lod: u8) -> usize {
    let lod = if lod > MAX_LOD { MAX_LOD } else { lod };
    if lod == 0 {
        1
    } else {
        lod as usize * 2
    }
}

/// Mesh sizing and shading.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshSettings {
    /// World units per grid cell.
    pub mesh_scale: f32,
    /// Index into `SUPPORTED_CHUNK_SIZES`.
    pub chunk_size_index: usize,
    /// Unshared vertices per triangle for hard edges.
    pub flat_shading: bool,
}

impl Default for MeshSettings {
    fn default() -> Self {
        Self {
            mesh_scale: 2.5,
            chunk_size_index: 4,
            flat_shading: false,
        }
    }
}

impl MeshSettings {
    /// Smallest accepted mesh scale.
    pub const MIN_SCALE: f32 = 0.01;

    /// Returns a copy with every field clamped into its valid range.
    #[must_use]
    pub fn validated(&self) -> Self {
        Self {
            mesh_scale: if self.mesh_scale.is_finite() {
                self.mesh_scale.max(Self::MIN_SCALE)
            } else {
                Self::default().mesh_scale
            },
            chunk_size_index: self.chunk_size_index.min(SUPPORTED_CHUNK_SIZES.len() - 1),
            flat_shading: self.flat_shading,
        }
    }

    /// Quads per side at LOD 0.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        SUPPORTED_CHUNK_SIZES[self.chunk_size_index.min(SUPPORTED_CHUNK_SIZES.len() - 1)]
    }

    /// Rendered vertices per side at LOD 0.
    #[must_use]
    pub fn verts_per_line(&self) -> usize {
        self.chunk_size() + 1
    }

    /// Height grid side length, border ring included.
    #[must_use]
    pub fn bordered_size(&self) -> usize {
        self.verts_per_line() + 2
    }

    /// Side length of one chunk in world units.
    #[must_use]
    pub fn mesh_world_size(&self) -> f32 {
        (self.verts_per_line() - 1) as f32 * self.mesh_scale
    }
}

/// Reference to a vertex while building.
///
/// Border vertices live in a separate buffer and never reach the
/// sealed mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexRef {
    /// Index into the rendered vertex buffer.
    Interior(u32),
    /// Index into the border vertex buffer.
    Border(u32),
}

/// Normalized face normal of a counter-clockwise triangle seen from above.
#[inline]
fn face_normal(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    (b - a).cross(c - a).normalize_or_zero()
}

/// Mesh under construction.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    positions: Vec<Vec3>,
    uvs: Vec<Vec2>,
    indices: Vec<u32>,
    normals: Vec<Vec3>,
    seam_normals: Vec<Vec3>,
    border_positions: Vec<Vec3>,
    border_triangles: Vec<[VertexRef; 3]>,
    lattice: Option<Lattice>,
    flat_shading: bool,
    lod: u8,
}

/// Where rendered vertices sit on the bordered height grid.
#[derive(Clone, Debug, PartialEq)]
struct Lattice {
    /// Sampled interior column indices, ascending.
    columns: Vec<u32>,
    /// Sampled interior row indices, ascending.
    rows: Vec<u32>,
    scale: f32,
    half_width: f32,
    half_height: f32,
}

impl Lattice {
    fn vertex(&self, gx: usize, gy: usize) -> Option<u32> {
        let column = self.columns.binary_search(&u32::try_from(gx).ok()?).ok()?;
        let row = self.rows.binary_search(&u32::try_from(gy).ok()?).ok()?;
        Some((row * self.columns.len() + column) as u32)
    }

    fn nearest(&self, local: Vec2) -> Option<u32> {
        let gx = local.x / self.scale + 1.0 + self.half_width;
        let gy = local.y / self.scale + 1.0 + self.half_height;
        let column = nearest_index(&self.columns, gx)?;
        let row = nearest_index(&self.rows, gy)?;
        Some((row * self.columns.len() + column) as u32)
    }
}

/// Position in `axis` of the sample closest to `value`.
fn nearest_index(axis: &[u32], value: f32) -> Option<usize> {
    if axis.is_empty() {
        return None;
    }
    let upper = axis.partition_point(|&sample| (sample as f32) < value);
    if upper == 0 {
        return Some(0);
    }
    if upper == axis.len() {
        return Some(axis.len() - 1);
    }
    let below = value - axis[upper - 1] as f32;
    let above = axis[upper] as f32 - value;
    Some(if below <= above { upper - 1 } else { upper })
}

impl MeshData {
    fn new(lod: u8, flat_shading: bool) -> Self {
        Self {
            lod,
            flat_shading,
            ..Self::default()
        }
    }

    fn add_vertex(&mut self, position: Vec3, uv: Vec2, is_border: bool) -> VertexRef {
        if is_border {
            self.border_positions.push(position);
            VertexRef::Border(self.border_positions.len() as u32 - 1)
        } else {
            self.positions.push(position);
            self.uvs.push(uv);
            VertexRef::Interior(self.positions.len() as u32 - 1)
        }
    }

    fn add_triangle(&mut self, a: VertexRef, b: VertexRef, c: VertexRef) {
        match (a, b, c) {
            (VertexRef::Interior(a), VertexRef::Interior(b), VertexRef::Interior(c)) => {
                self.indices.extend_from_slice(&[a, b, c]);
            }
            _ => self.border_triangles.push([a, b, c]),
        }
    }

    fn position_of(&self, vertex: VertexRef) -> Vec3 {
        match vertex {
            VertexRef::Interior(i) => self.positions[i as usize],
            VertexRef::Border(i) => self.border_positions[i as usize],
        }
    }

    fn process(&mut self) {
        if self.flat_shading {
            self.flat_shade();
        } else {
            self.bake_normals();
        }
    }

    fn bake_normals(&mut self) {
        let mut seam = vec![Vec3::ZERO; self.positions.len()];
        for triangle in &self.border_triangles {
            let normal = face_normal(
                self.position_of(triangle[0]),
                self.position_of(triangle[1]),
                self.position_of(triangle[2]),
            );
            for vertex in triangle {
                if let VertexRef::Interior(i) = *vertex {
                    seam[i as usize] += normal;
                }
            }
        }

        let mut normals = seam.clone();
        for triangle in self.indices.chunks_exact(3) {
            let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
            let normal = face_normal(self.positions[a], self.positions[b], self.positions[c]);
            normals[a] += normal;
            normals[b] += normal;
            normals[c] += normal;
        }
        for normal in &mut normals {
            *normal = normal.normalize_or_zero();
        }

        self.normals = normals;
        self.seam_normals = seam;
    }

    fn flat_shade(&mut self) {
        let mut positions = Vec::with_capacity(self.indices.len());
        let mut uvs = Vec::with_capacity(self.indices.len());
        let mut normals = Vec::with_capacity(self.indices.len());

        for triangle in self.indices.chunks_exact(3) {
            let corners = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
            let normal = face_normal(
                self.positions[corners[0]],
                self.positions[corners[1]],
                self.positions[corners[2]],
            );
            for corner in corners {
                positions.push(self.positions[corner]);
                uvs.push(self.uvs[corner]);
                normals.push(normal);
            }
        }

        self.indices = (0..positions.len() as u32).collect();
        self.seam_normals = vec![Vec3::ZERO; positions.len()];
        self.lattice = None;
        self.positions = positions;
        self.uvs = uvs;
        self.normals = normals;
    }

    /// Rendered vertex positions.
    #[must_use]
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    /// Texture coordinates, one per rendered vertex.
    #[must_use]
    pub fn uvs(&self) -> &[Vec2] {
        &self.uvs
    }

    /// Triangle list over rendered vertices.
    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Baked per-vertex normals.
    #[must_use]
    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    /// Number of rendered vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of rendered triangles.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Number of border vertices.
    #[must_use]
    pub fn border_vertex_count(&self) -> usize {
        self.border_positions.len()
    }

    /// Number of triangles touching the border ring.
    #[must_use]
    pub fn border_triangle_count(&self) -> usize {
        self.border_triangles.len()
    }

    /// Level of detail this mesh was built at.
    #[must_use]
    pub const fn lod(&self) -> u8 {
        self.lod
    }

    /// Discards the border data and produces an editable mesh.
    #[must_use]
    pub fn seal(self) -> Mesh {
        let vertex_count = self.positions.len();
        let mut offsets = vec![0u32; vertex_count + 1];
        for &index in &self.indices {
            offsets[index as usize + 1] += 1;
        }
        for i in 0..vertex_count {
            offsets[i + 1] += offsets[i];
        }

        let mut cursor = offsets.clone();
        let mut vertex_triangles = vec![0u32; self.indices.len()];
        for (triangle, corners) in self.indices.chunks_exact(3).enumerate() {
            for &vertex in corners {
                let slot = &mut cursor[vertex as usize];
                vertex_triangles[*slot as usize] = triangle as u32;
                *slot += 1;
            }
        }

        Mesh {
            positions: self.positions,
            normals: self.normals,
            uvs: self.uvs,
            indices: self.indices,
            seam_normals: self.seam_normals,
            lattice: self.lattice,
            triangle_offsets: offsets,
            vertex_triangles,
            lod: self.lod,
            flat_shaded: self.flat_shading,
        }
    }
}

/// Editable terrain mesh.
///
/// Topology is fixed after sealing; positions may be edited in place
/// and normals patched with `recalculate_normals_for`.
#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    uvs: Vec<Vec2>,
    indices: Vec<u32>,
    /// Face normals of geometry beyond the chunk edge, per vertex.
    seam_normals: Vec<Vec3>,
    /// `None` for flat-shaded meshes.
    lattice: Option<Lattice>,
    /// CSR offsets into `vertex_triangles`, `vertex_count + 1` entries.
    triangle_offsets: Vec<u32>,
    vertex_triangles: Vec<u32>,
    lod: u8,
    flat_shaded: bool,
}

impl Mesh {
    /// Vertex positions.
    #[must_use]
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    /// Mutable vertex positions. Normals are stale until recalculated.
    pub fn positions_mut(&mut self) -> &mut [Vec3] {
        &mut self.positions
    }

    /// Per-vertex normals.
    #[must_use]
    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    /// Texture coordinates.
    #[must_use]
    pub fn uvs(&self) -> &[Vec2] {
        &self.uvs
    }

    /// Triangle list.
    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Number of vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Level of detail this mesh was built at.
    #[must_use]
    pub const fn lod(&self) -> u8 {
        self.lod
    }

    /// Whether vertices are unshared per triangle.
    #[must_use]
    pub const fn is_flat_shaded(&self) -> bool {
        self.flat_shaded
    }

    /// Triangles that use `vertex`.
    #[must_use]
    pub fn triangles_of(&self, vertex: u32) -> &[u32] {
        let vertex = vertex as usize;
        if vertex >= self.positions.len() {
            return &[];
        }
        let start = self.triangle_offsets[vertex] as usize;
        let end = self.triangle_offsets[vertex + 1] as usize;
        &self.vertex_triangles[start..end]
    }

    /// Replaces all positions with a buffer of the same length.
    ///
    /// Returns `false` and leaves the mesh untouched on a length mismatch.
    /// Normals are stale until recalculated.
    pub fn restore_positions(&mut self, positions: &[Vec3]) -> bool {
        if positions.len() != self.positions.len() {
            return false;
        }
        self.positions.copy_from_slice(positions);
        true
    }

    /// Position bytes for upload.
    #[must_use]
    pub fn position_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    /// Index bytes for upload.
    #[must_use]
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    fn triangle_normal(&self, triangle: u32) -> Vec3 {
        let base = triangle as usize * 3;
        face_normal(
            self.positions[self.indices[base] as usize],
            self.positions[self.indices[base + 1] as usize],
            self.positions[self.indices[base + 2] as usize],
        )
    }

    fn vertex_normal(&self, vertex: u32) -> Vec3 {
        (self.seam_normals[vertex as usize] + self.face_normal_sum(vertex)).normalize_or_zero()
    }

    /// Unnormalized sum of the face normals of this mesh's triangles
    /// using `vertex`.
    #[must_use]
    pub fn face_normal_sum(&self, vertex: u32) -> Vec3 {
        self.triangles_of(vertex)
            .iter()
            .fold(Vec3::ZERO, |sum, &triangle| sum + self.triangle_normal(triangle))
    }

    /// Replaces what geometry beyond the chunk edge contributes to
    /// `vertex` and recomputes its normal.
    ///
    /// Returns `false` for an out-of-range vertex.
    pub fn set_seam_normal(&mut self, vertex: u32, seam: Vec3) -> bool {
        let index = vertex as usize;
        if index >= self.positions.len() {
            return false;
        }
        self.seam_normals[index] = seam;
        self.normals[index] = self.vertex_normal(vertex);
        true
    }

    /// Rendered vertex sampled from bordered-grid cell `(gx, gy)`.
    ///
    /// `None` when the cell is not on this LOD's lattice or the mesh is
    /// flat shaded.
    #[must_use]
    pub fn lattice_vertex(&self, gx: usize, gy: usize) -> Option<u32> {
        self.lattice.as_ref()?.vertex(gx, gy)
    }

    /// Vertices on the outer ring of the lattice, with their
    /// bordered-grid cells.
    #[must_use]
    pub fn edge_vertices(&self) -> Vec<(u32, usize, usize)> {
        let Some(lattice) = &self.lattice else {
            return Vec::new();
        };
        let (last_column, last_row) = (lattice.columns.len() - 1, lattice.rows.len() - 1);
        let mut edge = Vec::new();
        for (row, &gy) in lattice.rows.iter().enumerate() {
            for (column, &gx) in lattice.columns.iter().enumerate() {
                if row == 0 || column == 0 || row == last_row || column == last_column {
                    edge.push(((row * lattice.columns.len() + column) as u32, gx as usize, gy as usize));
                }
            }
        }
        edge
    }

    /// Vertex nearest to a local horizontal position.
    ///
    /// Indexes the lattice directly; flat-shaded meshes fall back to a
    /// scan.
    #[must_use]
    pub fn nearest_vertex(&self, local: Vec2) -> Option<u32> {
        if let Some(lattice) = &self.lattice {
            return lattice.nearest(local);
        }
        self.positions
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.xz()
                    .distance_squared(local)
                    .total_cmp(&b.xz().distance_squared(local))
            })
            .map(|(index, _)| index as u32)
    }

    /// Recomputes every normal.
    pub fn recalculate_normals(&mut self) {
        for vertex in 0..self.positions.len() as u32 {
            let normal = self.vertex_normal(vertex);
            self.normals[vertex as usize] = normal;
        }
    }

    /// Recomputes normals around edited vertices.
    ///
    /// Only triangles incident to a dirty vertex are re-evaluated, and
    /// only their corners get new normals. Returns the number of normals
    /// rewritten.
    pub fn recalculate_normals_for(&mut self, dirty: &HashSet<u32>) -> usize {
        let mut affected: HashSet<u32> = HashSet::new();
        for &vertex in dirty {
            for &triangle in self.triangles_of(vertex) {
                let base = triangle as usize * 3;
                affected.extend(&self.indices[base..base + 3]);
            }
        }

        for &vertex in &affected {
            let normal = self.vertex_normal(vertex);
            self.normals[vertex as usize] = normal;
        }
        affected.len()
    }
}

/// Builds terrain meshes from height grids.
pub struct MeshBuilder;

impl MeshBuilder {
    /// Triangulates a bordered height grid at `lod`.
    ///
    /// Positions are centered on the chunk origin and scaled by
    /// `settings.mesh_scale` horizontally; heights are used as-is.
    /// Grids smaller than 3×3 have no interior and yield an empty mesh.
    #[must_use]
    pub fn build(heights: &Grid<f32>, settings: &MeshSettings, lod: u8) -> MeshData {
        let lod = lod.min(MAX_LOD);
        let mut data = MeshData::new(lod, settings.flat_shading);

        let (width, height) = (heights.width(), heights.height());
        if width < 3 || height < 3 {
            return data;
        }

        let step = lod_step(lod);
        let columns = sample_axis(width, step);
        let rows = sample_axis(height, step);

        let scale = settings.mesh_scale;
        let half_width = (width - 3) as f32 / 2.0;
        let half_height = (height - 3) as f32 / 2.0;
        let uv_width = (width - 3).max(1) as f32;
        let uv_height = (height - 3).max(1) as f32;

        let mut refs = Vec::with_capacity(columns.len() * rows.len());
        for &gy in &rows {
            for &gx in &columns {
                let is_border = gx == 0 || gy == 0 || gx == width - 1 || gy == height - 1;
                let position = Vec3::new(
                    (gx as f32 - 1.0 - half_width) * scale,
                    heights.get(gx, gy),
                    (gy as f32 - 1.0 - half_height) * scale,
                );
                let uv = Vec2::new(
                    (gx as f32 - 1.0) / uv_width,
                    (gy as f32 - 1.0) / uv_height,
                );
                refs.push(data.add_vertex(position, uv, is_border));
            }
        }

        data.lattice = Some(Lattice {
            columns: columns[1..columns.len() - 1].iter().map(|&gx| gx as u32).collect(),
            rows: rows[1..rows.len() - 1].iter().map(|&gy| gy as u32).collect(),
            scale,
            half_width,
            half_height,
        });

        let line = columns.len();
        for row in 0..rows.len() - 1 {
            for column in 0..line - 1 {
                let a = refs[row * line + column];
                let b = refs[row * line + column + 1];
                let c = refs[(row + 1) * line + column];
                let d = refs[(row + 1) * line + column + 1];
                data.add_triangle(a, c, d);
                data.add_triangle(d, b, a);
            }
        }

        data.process();
        data
    }
}

/// Grid indices sampled along one axis of a bordered grid of `size`.
fn sample_axis(size: usize, step: usize) -> Vec<usize> {
    let last_interior = size - 2;
    let mut axis = vec![0];
    let mut i = 1;
    while i < last_interior {
        axis.push(i);
        i += step;
    }
    axis.push(last_interior);
    axis.push(size - 1);
    axis
}
