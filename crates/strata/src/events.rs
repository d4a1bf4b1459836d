//! # Streamer Events
//!
//! Explicit outbox between the streamer and its owner.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  push   ┌─────────────┐  drain_events()  ┌─────────────┐
//! │  Streamer   │────────>│   Outbox    │─────────────────>│    Host     │
//! │ Deformation │         │ Vec<Event>  │   once per tick  │ (renderer,  │
//! └─────────────┘         └─────────────┘                  │  physics)   │
//!                                                          └─────────────┘
//! ```
//!
//! Events are recorded in the order the state changed. Nothing is
//! broadcast; the single owner decides what to forward.

use crate::streamer::ChunkCoord;

/// State changes the host engine mirrors into its scene.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamerEvent {
    // =========================================================================
    // Lifecycle
    // =========================================================================
    /// A chunk entered the streaming window for the first time.
    ChunkCreated {
        /// Chunk coordinate.
        coord: ChunkCoord,
    },

    /// A chunk was dropped under the unload policy.
    ChunkUnloaded {
        /// Chunk coordinate.
        coord: ChunkCoord,
    },

    // =========================================================================
    // Rendering
    // =========================================================================
    /// A chunk was shown or hidden.
    VisibilityChanged {
        /// Chunk coordinate.
        coord: ChunkCoord,
        /// New visibility.
        visible: bool,
    },

    /// A cached mesh became the chunk's render mesh.
    MeshInstalled {
        /// Chunk coordinate.
        coord: ChunkCoord,
        /// Installed level of detail.
        lod: u8,
    },

    /// The render mesh was edited in place; re-upload positions and normals.
    MeshEdited {
        /// Chunk coordinate.
        coord: ChunkCoord,
    },

    // =========================================================================
    // Physics
    // =========================================================================
    /// The collider now views the mesh at `lod`; rebuild the physics shape.
    ColliderInstalled {
        /// Chunk coordinate.
        coord: ChunkCoord,
        /// Level of detail the collider views.
        lod: u8,
    },
}

impl StreamerEvent {
    /// Chunk the event concerns.
    #[must_use]
    pub const fn coord(&self) -> ChunkCoord {
        match self {
            Self::ChunkCreated { coord }
            | Self::ChunkUnloaded { coord }
            | Self::VisibilityChanged { coord, .. }
            | Self::MeshInstalled { coord, .. }
            | Self::MeshEdited { coord }
            | Self::ColliderInstalled { coord, .. } => *coord,
        }
    }
}
