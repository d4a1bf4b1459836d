//! # STRATA
//!
//! Streaming procedural terrain with runtime editing.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                             TerrainWorld                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐  jobs   ┌─────────────────┐                        │
//! │  │  ChunkStreamer  │────────>│    WorkQueue    │  height maps, meshes   │
//! │  │                 │<────────│  (strata_core)  │  (strata_procedural)   │
//! │  │  • visibility   │ results └─────────────────┘                        │
//! │  │  • LOD cache    │                                                    │
//! │  │  • colliders    │<─────── DeformationEngine (brush, undo/redo)       │
//! │  └────────┬────────┘                                                    │
//! │           │ drain_events()                                              │
//! │           ▼                                                             │
//! │     host renderer / physics                                             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: TOML configuration
//! - `streamer`: chunk lifecycle around the viewer
//! - `deformation`: brush tools and edit history
//! - `persistence`: saving and restoring edited meshes
//! - `events`: the outbox the host drains each frame
//! - `world`: the context object tying it together

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod deformation;
pub mod error;
pub mod events;
pub mod persistence;
pub mod streamer;
pub mod world;

pub use strata_core as core;
pub use strata_procedural as procedural;

pub use config::{StreamingConfig, StreamingPolicy, TerrainConfig, TextureLayer, WorkerConfig};
pub use deformation::{BrushSettings, BrushTool, DeformationEngine, PointerInput, RayHit, Raycaster};
pub use error::{ConfigError, ConfigResult, PersistenceError, PersistenceResult};
pub use events::StreamerEvent;
pub use persistence::{ChunkRecord, TerrainSnapshot};
pub use streamer::{ChunkCoord, ChunkPhase, ChunkStreamer, LodInfo, LodTable, StreamerStats, TerrainChunk};
pub use world::TerrainWorld;
