//! # STRATA Flythrough
//!
//! Headless demo of the whole pipeline.
//!
//! 1. Streams terrain around a viewer flying along +X
//! 2. Raises a hill under the viewer with one brush stroke
//! 3. Undoes the stroke and checks the ground came back
//! 4. Optionally writes the viewer chunk's height map as a PGM
//!
//! ```bash
//! strata-flythrough [config.toml] [preview.pgm]
//! RUST_LOG=strata=debug strata-flythrough
//! ```

use std::env;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use strata::core::{Vec2, Vec3};
use strata::{BrushTool, PointerInput, RayHit, StreamerEvent, TerrainConfig, TerrainWorld};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Simulated frame time.
const DT: f32 = 1.0 / 60.0;
/// Viewer speed in world units per second.
const FLY_SPEED: f32 = 120.0;
/// Frames spent flying.
const FLY_FRAMES: u32 = 600;
/// Frames the brush is held down.
const STROKE_FRAMES: u32 = 30;
/// How long to wait for generation after flying.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("flythrough failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let mut args = env::args().skip(1);
    let config = match args.next() {
        Some(path) => TerrainConfig::from_path(path)?,
        None => TerrainConfig::default(),
    };
    let preview: Option<PathBuf> = args.next().map(PathBuf::from);

    let mut world = TerrainWorld::new(config)?;
    let no_hit = |_: Vec2| None::<RayHit>;

    // =========================================================================
    // Fly
    // =========================================================================
    let mut viewer = Vec3::ZERO;
    let mut tally = EventTally::default();
    for frame in 0..FLY_FRAMES {
        viewer.x = frame as f32 * FLY_SPEED * DT;
        world.tick(viewer, DT, None, &no_hit);
        tally.count(world.drain_events());
    }
    world.flush(SETTLE_TIMEOUT);
    world.tick(viewer, DT, None, &no_hit);
    tally.count(world.drain_events());

    info!(x = viewer.x, stats = ?world.stats(), "flight finished");
    tally.log();

    // =========================================================================
    // Edit
    // =========================================================================
    let target = viewer.xz();
    let Some(before) = world.streamer().height_at(target) else {
        warn!("no terrain under the viewer, skipping the brush demo");
        return write_preview(&world, preview.as_deref());
    };

    world.set_tool(BrushTool::RaiseGaussian);
    let pressed = Some(PointerInput {
        screen: Vec2::ZERO,
        pressed: true,
    });
    let mut moved = 0;
    for _ in 0..STROKE_FRAMES {
        // Height-field pick: straight down onto the current surface.
        let Some(height) = world.streamer().height_at(target) else {
            break;
        };
        let hit = RayHit {
            point: Vec3::new(target.x, height, target.y),
            is_terrain: true,
        };
        moved += world.tick(viewer, DT, pressed, &move |_: Vec2| Some(hit));
    }
    world.tick(viewer, DT, None, &no_hit);

    let raised = world.streamer().height_at(target).unwrap_or(before);
    info!(before, raised, moved, "stroke applied");

    world.undo();
    let restored = world.streamer().height_at(target).unwrap_or(raised);
    if restored == before {
        info!(restored, "undo restored the pre-stroke surface");
    } else {
        warn!(before, restored, "undo left the surface changed");
    }

    let edits = world.drain_events().iter().filter(|e| matches!(e, StreamerEvent::MeshEdited { .. })).count();
    info!(edits, stats = ?world.stats(), "done");

    write_preview(&world, preview.as_deref())
}

/// Writes the viewer chunk's height map as a binary PGM.
fn write_preview(world: &TerrainWorld, path: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let Some(path) = path else {
        return Ok(());
    };
    let streamer = world.streamer();
    let Some(map) = streamer.chunk(streamer.viewer_chunk()).and_then(|chunk| chunk.height_map()) else {
        warn!("viewer chunk has no height map, preview skipped");
        return Ok(());
    };

    let mut bytes = format!("P5\n{} {}\n255\n", map.values().width(), map.values().height()).into_bytes();
    bytes.extend(map.to_luma8());
    fs::write(path, bytes)?;
    info!(path = %path.display(), min = map.min_value(), max = map.max_value(), "height preview written");
    Ok(())
}

#[derive(Default)]
struct EventTally {
    created: usize,
    unloaded: usize,
    shown: usize,
    hidden: usize,
    installed: usize,
    colliders: usize,
}

impl EventTally {
    fn count(&mut self, events: Vec<StreamerEvent>) {
        for event in events {
            match event {
                StreamerEvent::ChunkCreated { .. } => self.created += 1,
                StreamerEvent::ChunkUnloaded { .. } => self.unloaded += 1,
                StreamerEvent::VisibilityChanged { visible: true, .. } => self.shown += 1,
                StreamerEvent::VisibilityChanged { visible: false, .. } => self.hidden += 1,
                StreamerEvent::MeshInstalled { .. } => self.installed += 1,
                StreamerEvent::ColliderInstalled { .. } => self.colliders += 1,
                StreamerEvent::MeshEdited { .. } => {}
            }
        }
    }

    fn log(&self) {
        info!(
            created = self.created,
            unloaded = self.unloaded,
            shown = self.shown,
            hidden = self.hidden,
            installed = self.installed,
            colliders = self.colliders,
            "streaming events"
        );
    }
}
