//! Headless Tessera demo: flies a camera down onto a synthetic quadtree
//! tileset and logs what the selection does each frame.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p tessera-demo -- --depth 8 --frames 600`.

mod procedural;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use glam::{DVec2, DVec3};
use tessera_config::{CliArgs, Config, DemoConfig};
use tessera_selection::{AsyncSystem, Tileset, TilesetExternals, ViewState};
use tracing::info;

use procedural::{NoopPreparer, ProceduralQuadtree};

const VIEWPORT: DVec2 = DVec2::new(1920.0, 1080.0);
const FRAME_SECONDS: f32 = 1.0 / 60.0;

/// Camera `height` metres above the ground, tilted to look ahead.
fn camera_at(height: f64) -> ViewState {
    let position = DVec3::new(0.0, -0.5 * height, height);
    ViewState::look_at(position, DVec3::ZERO, DVec3::Z, VIEWPORT, 60f64.to_radians())
        .with_height(height)
}

/// Height at `t` in `[0, 1]`, interpolated geometrically so every octave of
/// distance gets the same number of frames.
fn flight_height(demo: &DemoConfig, t: f64) -> f64 {
    let start = demo.start_distance_m.max(1.0);
    let end = demo.end_distance_m.max(1.0);
    start * (end / start).powf(t)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config_dir = args
        .config
        .clone()
        .or_else(Config::default_dir)
        .unwrap_or_else(|| PathBuf::from(".tessera"));

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config
        .debug
        .log_dir
        .clone()
        .unwrap_or_else(|| config_dir.join("logs"));
    tessera_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    let async_system = match config.demo.worker_threads {
        0 => AsyncSystem::with_defaults()?,
        threads => AsyncSystem::new(threads)?,
    };
    info!(workers = async_system.worker_count(), "async system started");

    let demo = config.demo.clone();
    let loader = ProceduralQuadtree::new(
        demo.tree_depth,
        Duration::from_millis(demo.simulated_latency_ms),
    );
    let root = loader.root(demo.root_size_m, demo.root_geometric_error);
    let externals = TilesetExternals {
        loader: Arc::new(loader),
        preparer: Arc::new(NoopPreparer),
        async_system,
    };
    let mut tileset = Tileset::new(externals, root, config.tileset.clone())?;

    let frames = demo.frames.max(1);
    let started = Instant::now();
    for frame in 0..frames {
        let t = f64::from(frame) / f64::from(frames.saturating_sub(1).max(1));
        let height = flight_height(&demo, t);
        let result = tileset.update_view(&[camera_at(height)], FRAME_SECONDS);

        if frame % 30 == 0 || frame + 1 == frames {
            info!(
                frame = result.frame_number,
                height_m = height.round(),
                rendered = result.tiles_to_render_this_frame.len(),
                waiting = result.not_yet_renderable_count,
                loading = result.tiles_loading,
                fading = result.tiles_fading_out.len(),
                "flight"
            );
        }
        std::thread::sleep(Duration::from_secs_f32(FRAME_SECONDS));
    }
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "flight finished");

    let settle = Instant::now();
    let result = tileset.update_view_offline(&[camera_at(flight_height(&demo, 1.0))]);
    info!(
        rendered = result.tiles_to_render_this_frame.len(),
        newly_rendered = result.tiles_newly_rendered.len(),
        visited = result.tiles_visited,
        max_depth = result.max_depth_visited,
        elapsed_ms = settle.elapsed().as_millis() as u64,
        "settled"
    );
    info!(
        tiles = tileset.tiles().len(),
        loaded = tileset.loaded_tile_count(),
        bytes = tileset.total_data_bytes(),
        "cache"
    );

    let teardown = tileset.destruction_complete();
    drop(tileset);
    if !teardown.wait_timeout(Duration::from_secs(5)) {
        tracing::warn!("loads still running at exit");
    }
    Ok(())
}
