//! # STRATA Procedural Generation
//!
//! Deterministic terrain synthesis for streamed, chunked worlds.
//!
//! ## Design Principles
//!
//! 1. **Deterministic**: Same settings always produce the same terrain
//! 2. **Chunked**: Each chunk's height map is sampled independently
//! 3. **Seamless**: A one-cell border ring makes normals agree across seams
//! 4. **Thread-agnostic**: Every builder call owns its buffers
//!
//! ## Core Components
//!
//! - `NoiseField`: fractal value noise grids
//! - `FalloffField`: island mask
//! - `HeightMapBuilder`: noise + falloff + curve into a bordered `HeightMap`
//! - `MeshBuilder`: LOD triangulation into `MeshData`, sealed into `Mesh`
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_procedural::{HeightMapBuilder, HeightMapSettings, MeshBuilder, MeshSettings};
//! use strata_core::Vec2;
//!
//! let mesh_settings = MeshSettings::default();
//! let height_map = HeightMapBuilder::build(
//!     mesh_settings.verts_per_line(),
//!     &HeightMapSettings::default(),
//!     Vec2::ZERO,
//! );
//!
//! let mesh = MeshBuilder::build(height_map.values(), &mesh_settings, 0).seal();
//! assert_eq!(mesh.vertex_count(), 145 * 145);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod falloff;
pub mod grid;
pub mod height_map;
pub mod mesh;
pub mod noise;

pub use falloff::FalloffField;
pub use grid::Grid;
pub use height_map::{CurveKey, HeightCurve, HeightMap, HeightMapBuilder, HeightMapSettings};
pub use mesh::{
    lod_step, Mesh, MeshBuilder, MeshData, MeshSettings, VertexRef, MAX_LOD, SUPPORTED_CHUNK_SIZES,
};
pub use noise::{NoiseField, NoiseSettings, NormalizeMode, ValueNoise, WorldSeed};
