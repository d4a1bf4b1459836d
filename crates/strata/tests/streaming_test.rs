//! # Streaming Tests
//!
//! Drives a real `ChunkStreamer` with worker threads on small chunks
//! (48 quads, 1 unit per quad, 48-unit chunks).
//!
//! Run with: cargo test --package strata --test streaming_test -- --nocapture

use std::collections::HashSet;
use std::time::Duration;

use strata::core::Vec2;
use strata::{
    ChunkCoord, ChunkPhase, ChunkStreamer, LodInfo, LodTable, StreamerEvent, StreamingPolicy, TerrainConfig,
};

const SETTLE: Duration = Duration::from_secs(30);

fn small_config() -> TerrainConfig {
    let mut config = TerrainConfig::default();
    config.mesh.chunk_size_index = 0;
    config.mesh.mesh_scale = 1.0;
    config.streaming.lods =
        LodTable::new(vec![LodInfo::new(0, 60.0), LodInfo::new(1, 120.0)]).expect("valid lod table");
    config.workers.threads = Some(2);
    config
}

fn settled_at(config: TerrainConfig, viewer: Vec2) -> ChunkStreamer {
    let mut streamer = ChunkStreamer::new(config).expect("valid config");
    streamer.update(viewer);
    streamer.flush(SETTLE);
    streamer
}

#[test]
fn test_lod_step_function() {
    let table = LodTable::new(vec![
        LodInfo::new(0, 100.0),
        LodInfo::new(1, 200.0),
        LodInfo::new(2, 300.0),
    ])
    .expect("valid lod table");

    assert_eq!(table.select(250.0), 2);
    assert_eq!(table.select(200.0), 1, "a distance on a threshold stays on the finer tier");
    assert_eq!(table.select(100.0), 0);
    assert_eq!(table.select(150.0), 1);
    assert_eq!(table.max_view_distance(), 300.0);
}

#[test]
fn test_initial_load_installs_meshes_by_distance() {
    let mut streamer = settled_at(small_config(), Vec2::ZERO);

    // round(120 / 48) = 3 rings
    assert_eq!(streamer.chunks_visible_in_view(), 3);
    assert_eq!(streamer.chunk_count(), 49);

    let center = streamer.chunk(ChunkCoord::new(0, 0)).expect("center chunk");
    assert!(center.is_visible());
    assert_eq!(center.installed_lod(), Some(0));
    assert_eq!(center.phase(), ChunkPhase::MeshReady(0));
    assert_eq!(center.mesh().map(|mesh| mesh.vertex_count()), Some(49 * 49));

    // Nearest edge 72 units away: second tier.
    let far = streamer.chunk(ChunkCoord::new(2, 0)).expect("ring-2 chunk");
    assert!(far.is_visible());
    assert_eq!(far.installed_lod(), Some(1));

    // Past the view distance: height map only.
    let hidden = streamer.chunk(ChunkCoord::new(3, 1)).expect("ring-3 chunk");
    assert!(!hidden.is_visible());
    assert_eq!(hidden.phase(), ChunkPhase::HeightMapReady);
    assert!(!hidden.has_requested_mesh(0));

    let stats = streamer.stats();
    println!("Initial load: {stats:?}");
    assert_eq!(stats.pending_jobs, 0);
    assert_eq!(stats.height_maps_received, 49);
    assert_eq!(stats.visible, streamer.visible_chunks().len());
    assert_eq!(stats.stale_results, 0);

    let events = streamer.drain_events();
    let created = events
        .iter()
        .filter(|event| matches!(event, StreamerEvent::ChunkCreated { .. }))
        .count();
    assert_eq!(created, 49);
    assert!(events.contains(&StreamerEvent::MeshInstalled {
        coord: ChunkCoord::new(0, 0),
        lod: 0
    }));
    assert!(streamer.drain_events().is_empty(), "draining empties the outbox");
}

#[test]
fn test_collider_only_near_viewer() {
    let streamer = settled_at(small_config(), Vec2::ZERO);

    let center = streamer.chunk(ChunkCoord::new(0, 0)).expect("center chunk");
    assert!(center.has_collider(), "viewer stands inside the center chunk");
    assert_eq!(center.collider(), center.mesh_at(0));
    assert_eq!(center.collider_revision(), 1);

    // 24 units away: outside the 5-unit collider distance.
    let neighbor = streamer.chunk(ChunkCoord::new(1, 0)).expect("neighbor");
    assert!(neighbor.mesh().is_some());
    assert!(!neighbor.has_collider());
}

#[test]
fn test_collider_latches() {
    let mut streamer = settled_at(small_config(), Vec2::ZERO);
    streamer.update(Vec2::new(30.0, 0.0));
    streamer.flush(SETTLE);

    let center = streamer.chunk(ChunkCoord::new(0, 0)).expect("center chunk");
    assert!(center.has_collider());
    assert_eq!(center.collider_revision(), 1, "an installed collider is never rebuilt");

    let neighbor = streamer.chunk(ChunkCoord::new(1, 0)).expect("neighbor");
    assert!(neighbor.has_collider(), "viewer is now inside the neighbor");
}

#[test]
fn test_hidden_chunks_are_reused() {
    let mut streamer = settled_at(small_config(), Vec2::ZERO);
    let origin = ChunkCoord::new(0, 0);
    let generation = streamer.chunk(origin).expect("origin chunk").generation();
    streamer.drain_events();

    streamer.update(Vec2::new(1000.0, 0.0));
    streamer.flush(SETTLE);
    assert!(!streamer.chunk(origin).expect("kept while hidden").is_visible());
    assert!(streamer.drain_events().contains(&StreamerEvent::VisibilityChanged {
        coord: origin,
        visible: false
    }));

    let meshes_before = streamer.stats().meshes_received;
    streamer.update(Vec2::ZERO);

    let chunk = streamer.chunk(origin).expect("origin chunk");
    assert!(chunk.is_visible(), "cached mesh shows without waiting for workers");
    assert_eq!(chunk.generation(), generation);
    assert_eq!(chunk.installed_lod(), Some(0));

    streamer.flush(SETTLE);
    let events = streamer.drain_events();
    assert!(!events.contains(&StreamerEvent::ChunkCreated { coord: origin }));
    assert!(events.contains(&StreamerEvent::VisibilityChanged {
        coord: origin,
        visible: true
    }));
    println!(
        "Meshes built on return: {}",
        streamer.stats().meshes_received - meshes_before
    );
    assert_eq!(
        streamer.chunk(origin).expect("origin chunk").cached_lods().collect::<Vec<_>>(),
        vec![0]
    );
}

#[test]
fn test_lod_swaps_between_cached_meshes() {
    let mut streamer = settled_at(small_config(), Vec2::ZERO);
    let coord = ChunkCoord::new(1, 0);
    assert_eq!(streamer.chunk(coord).expect("chunk").installed_lod(), Some(0));

    // Nearest edge of [1,0] is 66 units away.
    streamer.update(Vec2::new(-42.0, 0.0));
    streamer.flush(SETTLE);
    let chunk = streamer.chunk(coord).expect("chunk");
    assert_eq!(chunk.installed_lod(), Some(1));
    assert_eq!(chunk.cached_lods().collect::<Vec<_>>(), vec![0, 1]);

    let meshes = streamer.stats().meshes_received;
    streamer.update(Vec2::ZERO);
    assert_eq!(streamer.chunk(coord).expect("chunk").installed_lod(), Some(0));
    streamer.flush(SETTLE);
    assert_eq!(
        streamer.stats().meshes_received,
        meshes,
        "every tier needed at the origin is already cached"
    );
    assert_eq!(streamer.chunk(coord).expect("chunk").installed_lod(), Some(0));
}

#[test]
fn test_unloaded_chunks_discard_late_results() {
    let mut config = small_config();
    config.streaming.policy = StreamingPolicy::Unload { distance: 200.0 };
    let mut streamer = ChunkStreamer::new(config).expect("valid config");

    let origin = ChunkCoord::new(0, 0);
    streamer.update(Vec2::ZERO);
    let first_generation = streamer.chunk(origin).expect("origin chunk").generation();

    // Leave before anything could finish.
    streamer.update(Vec2::new(5000.0, 0.0));
    assert!(streamer.chunk(origin).is_none());
    streamer.flush(SETTLE);

    let stats = streamer.stats();
    println!("After unload: {stats:?}");
    assert!(stats.stale_results > 0, "results for unloaded chunks are dropped");
    assert!(stats.chunks_unloaded >= 49);
    assert!(streamer.chunk(origin).is_none(), "late results never resurrect a chunk");
    assert!(streamer
        .drain_events()
        .contains(&StreamerEvent::ChunkUnloaded { coord: origin }));

    streamer.update(Vec2::ZERO);
    streamer.flush(SETTLE);
    let recreated = streamer.chunk(origin).expect("recreated");
    assert_ne!(recreated.generation(), first_generation);
    assert_eq!(recreated.installed_lod(), Some(0));
}

#[test]
fn test_unload_spares_the_current_window() {
    let mut config = TerrainConfig::default();
    config.streaming.policy = StreamingPolicy::Unload { distance: 600.0 };
    config.workers.threads = Some(2);
    let mut streamer = ChunkStreamer::new(config).expect("valid config");

    // Window corners sit past 600 units; they must not be dropped while
    // the window still covers them.
    for viewer in [Vec2::ZERO, Vec2::new(30.0, 0.0), Vec2::new(60.0, 0.0)] {
        streamer.update(viewer);
        let events = streamer.drain_events();
        let created: HashSet<ChunkCoord> = events
            .iter()
            .filter_map(|event| match event {
                StreamerEvent::ChunkCreated { coord } => Some(*coord),
                _ => None,
            })
            .collect();
        let churned: Vec<ChunkCoord> = events
            .iter()
            .filter_map(|event| match event {
                StreamerEvent::ChunkUnloaded { coord } => Some(*coord),
                _ => None,
            })
            .collect();
        assert!(churned.is_empty(), "unloaded inside the window at {viewer:?}: {churned:?}");
        if viewer == Vec2::ZERO {
            assert_eq!(created.len(), 25);
        }
    }

    streamer.flush(SETTLE);
    let stats = streamer.stats();
    println!("After small moves: {stats:?}");
    assert_eq!(streamer.chunk_count(), 25);
    assert_eq!(stats.chunks_unloaded, 0);
    assert_eq!(stats.stale_results, 0);
}

#[test]
fn test_height_at_reads_nearest_vertex() {
    let streamer = settled_at(small_config(), Vec2::ZERO);

    // The last point lands on a LOD 1 chunk.
    for point in [
        Vec2::ZERO,
        Vec2::new(10.4, -3.6),
        Vec2::new(-30.2, 47.9),
        Vec2::new(70.0, 5.0),
        Vec2::new(100.3, 3.2),
    ] {
        let chunk = streamer
            .chunk(ChunkCoord::nearest(point, streamer.mesh_world_size()))
            .expect("chunk");
        let mesh = chunk.mesh().expect("mesh");
        let local = point - chunk.origin().xz();
        let expected = mesh
            .positions()
            .iter()
            .min_by(|a, b| {
                a.xz()
                    .distance_squared(local)
                    .total_cmp(&b.xz().distance_squared(local))
            })
            .map(|vertex| vertex.y + chunk.origin().y);
        assert_eq!(streamer.height_at(point), expected, "at {point:?}");
    }
    assert_eq!(
        streamer.chunk(ChunkCoord::new(2, 0)).and_then(|chunk| chunk.installed_lod()),
        Some(1)
    );
}

#[test]
fn test_map_radius_limits_extent() {
    let mut config = small_config();
    config.streaming.map_radius = Some(1);
    let streamer = settled_at(config, Vec2::ZERO);

    assert_eq!(streamer.chunk_count(), 9);
    assert!(streamer
        .coords()
        .iter()
        .all(|coord| coord.x.abs() <= 1 && coord.z.abs() <= 1));
}

#[test]
fn test_seed_changes_terrain() {
    let mut config = small_config();
    config.streaming.map_radius = Some(0);
    let a = settled_at(config.clone(), Vec2::ZERO);
    config.height_map.noise.seed = 99;
    let b = settled_at(config, Vec2::ZERO);

    let origin = ChunkCoord::new(0, 0);
    let heights = |streamer: &ChunkStreamer| {
        streamer
            .chunk(origin)
            .and_then(|chunk| chunk.height_map())
            .map(|map| map.values().clone())
    };
    assert!(heights(&a).is_some());
    assert_ne!(heights(&a), heights(&b));
    assert!(a.height_at(Vec2::ZERO).is_some());
}
