//! # Terrain World Tests
//!
//! The context object end to end: config text in, streamed and edited
//! terrain out, saved to disk and loaded back.
//!
//! Run with: cargo test --package strata --test world_test -- --nocapture

use std::time::Duration;

use strata::core::{Vec2, Vec3};
use strata::{BrushTool, ChunkCoord, PointerInput, RayHit, StreamerEvent, TerrainConfig, TerrainWorld};

const SETTLE: Duration = Duration::from_secs(30);

const CONFIG: &str = r#"
[height_map]
height_multiplier = 12.0

[height_map.noise]
seed = 7
scale = 30.0
octaves = 4

[mesh]
chunk_size_index = 0
mesh_scale = 1.0

[streaming]
lods = [
    { lod = 0, visible_distance = 60.0 },
    { lod = 1, visible_distance = 100.0 },
]
map_radius = 2

[brush]
radius = 6.0
strength = 4.0

[workers]
threads = 2
"#;

fn world() -> TerrainWorld {
    let config = TerrainConfig::from_toml_str(CONFIG).expect("config parses");
    let mut world = TerrainWorld::new(config).expect("config is valid");
    let no_hit = |_: Vec2| None::<RayHit>;
    world.tick(Vec3::ZERO, 0.016, None, &no_hit);
    world.flush(SETTLE);
    world
}

fn raise_at_origin(world: &mut TerrainWorld, frames: usize) -> usize {
    let height = world.streamer().height_at(Vec2::ZERO).expect("terrain under origin");
    let hit = RayHit {
        point: Vec3::new(0.0, height, 0.0),
        is_terrain: true,
    };
    let pointer = Some(PointerInput {
        screen: Vec2::ZERO,
        pressed: true,
    });

    world.set_tool(BrushTool::Raise);
    let mut moved = 0;
    for _ in 0..frames {
        moved += world.tick(Vec3::ZERO, 0.1, pointer, &move |_: Vec2| Some(hit));
    }
    world.tick(Vec3::ZERO, 0.1, None, &move |_: Vec2| Some(hit));
    moved
}

#[test]
fn test_config_reaches_the_streamer() {
    let world = world();
    assert_eq!(world.config().brush.radius, 6.0);
    assert_eq!(world.config().height_map.noise.seed, 7);
    assert_eq!(world.streamer().mesh_world_size(), 48.0);
    assert_eq!(world.stats().chunks, 25, "map radius 2 keeps a 5x5 block");
}

#[test]
fn test_stroke_through_world() {
    let mut world = world();
    world.drain_events();
    let before = world.streamer().height_at(Vec2::ZERO).expect("height");

    let moved = raise_at_origin(&mut world, 5);
    assert!(moved > 0);
    assert!(!world.editor().is_stroking(), "releasing the pointer ends the stroke");

    let raised = world.streamer().height_at(Vec2::ZERO).expect("height");
    println!("Height at origin: {before} -> {raised}");
    assert!(raised > before);
    assert!(world
        .drain_events()
        .contains(&StreamerEvent::MeshEdited { coord: ChunkCoord::new(0, 0) }));

    assert!(world.undo());
    assert_eq!(world.streamer().height_at(Vec2::ZERO), Some(before));
    assert!(world.redo());
    assert_eq!(world.streamer().height_at(Vec2::ZERO), Some(raised));
}

#[test]
fn test_save_and_load_file() {
    let mut world = world();
    raise_at_origin(&mut world, 3);
    let raised = world.streamer().height_at(Vec2::ZERO);

    let path = std::env::temp_dir().join(format!("strata-world-test-{}.terrain", std::process::id()));
    world.save(&path).expect("save");

    let mut restored = self::world();
    assert_ne!(restored.streamer().height_at(Vec2::ZERO), raised);
    let applied = restored.load(&path).expect("load");
    let _ = std::fs::remove_file(&path);

    assert_eq!(applied, world.snapshot().chunks.len());
    assert_eq!(restored.streamer().height_at(Vec2::ZERO), raised);
    assert!(restored
        .streamer()
        .chunk(ChunkCoord::new(0, 0))
        .expect("chunk")
        .is_deformed());
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = TerrainConfig::from_toml_str(CONFIG).expect("config parses");
    config.streaming.collider_lod_index = 5;
    assert!(TerrainWorld::new(config).is_err());
}
