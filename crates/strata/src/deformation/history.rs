//! Undo/redo storage for terrain edits.
//!
//! Snapshots are raw clones of vertex positions, so restoring one is
//! float-exact. Normals are not stored; they are recomputed on restore.

use std::collections::VecDeque;

use strata_core::Vec3;

use crate::streamer::ChunkCoord;

/// Default number of strokes kept for undo.
pub const DEFAULT_HISTORY_DEPTH: usize = 32;

/// Vertex positions of one chunk's render mesh at a point in time.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkSnapshot {
    /// Chunk coordinate.
    pub coord: ChunkCoord,
    /// Chunk instance the positions belong to.
    pub generation: u64,
    /// LOD of the mesh the positions belong to.
    pub lod: u8,
    /// Local-space vertex positions.
    pub positions: Vec<Vec3>,
}

/// Positions of every chunk one stroke touched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TerrainState {
    chunks: Vec<ChunkSnapshot>,
}

impl TerrainState {
    /// Empty state.
    #[must_use]
    pub const fn new() -> Self {
        Self { chunks: Vec::new() }
    }

    /// Adds a chunk snapshot.
    pub fn push(&mut self, snapshot: ChunkSnapshot) {
        self.chunks.push(snapshot);
    }

    /// Whether a chunk is already recorded.
    #[must_use]
    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.chunks.iter().any(|snapshot| snapshot.coord == coord)
    }

    /// Recorded chunks, in the order they were first touched.
    #[must_use]
    pub fn chunks(&self) -> &[ChunkSnapshot] {
        &self.chunks
    }

    /// Number of recorded chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Bounded undo stack plus redo stack.
///
/// When the undo stack is full the oldest entry is evicted.
#[derive(Debug)]
pub struct History {
    undo: VecDeque<TerrainState>,
    redo: Vec<TerrainState>,
    depth: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_DEPTH)
    }
}

impl History {
    /// Creates a history keeping at most `depth` undo entries (at least 1).
    #[must_use]
    pub fn new(depth: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            depth: depth.max(1),
        }
    }

    /// Records a finished edit. Clears the redo stack.
    pub fn commit(&mut self, state: TerrainState) {
        self.redo.clear();
        self.push_undo(state);
    }

    /// Pushes onto the undo stack without touching redo.
    pub fn push_undo(&mut self, state: TerrainState) {
        if self.undo.len() == self.depth {
            self.undo.pop_front();
        }
        self.undo.push_back(state);
    }

    /// Pops the most recent undo entry.
    pub fn pop_undo(&mut self) -> Option<TerrainState> {
        self.undo.pop_back()
    }

    /// Pushes onto the redo stack.
    pub fn push_redo(&mut self, state: TerrainState) {
        self.redo.push(state);
    }

    /// Pops the most recent redo entry.
    pub fn pop_redo(&mut self) -> Option<TerrainState> {
        self.redo.pop()
    }

    /// Whether an undo is available.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Whether a redo is available.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Undo entries held.
    #[must_use]
    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    /// Redo entries held.
    #[must_use]
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Maximum undo entries.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(tag: i32) -> TerrainState {
        let mut state = TerrainState::new();
        state.push(ChunkSnapshot {
            coord: ChunkCoord::new(tag, 0),
            generation: 0,
            lod: 0,
            positions: vec![Vec3::new(tag as f32, 0.0, 0.0)],
        });
        state
    }

    #[test]
    fn test_depth_evicts_oldest() {
        let mut history = History::new(2);
        history.commit(state(1));
        history.commit(state(2));
        history.commit(state(3));

        assert_eq!(history.undo_len(), 2);
        assert_eq!(history.pop_undo(), Some(state(3)));
        assert_eq!(history.pop_undo(), Some(state(2)));
        assert_eq!(history.pop_undo(), None);
    }

    #[test]
    fn test_commit_clears_redo() {
        let mut history = History::default();
        history.commit(state(1));
        let undone = history.pop_undo().expect("entry");
        history.push_redo(undone);
        assert!(history.can_redo());

        history.commit(state(2));
        assert!(!history.can_redo());
        assert!(history.can_undo());
    }

    #[test]
    fn test_state_contains() {
        let state = state(4);
        assert!(state.contains(ChunkCoord::new(4, 0)));
        assert!(!state.contains(ChunkCoord::new(0, 4)));
        assert_eq!(state.len(), 1);
        assert_eq!(History::new(0).depth(), 1);
    }
}
