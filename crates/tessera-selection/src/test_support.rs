//! In-crate fixtures for traversal scenarios: a mock loader and preparer,
//! tree builders, and cameras.

use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use glam::{DVec2, DVec3};
use rustc_hash::FxHashSet;
use tessera_config::TilesetOptions;

use crate::async_system::AsyncSystem;
use crate::bounds::BoundingVolume;
use crate::error::TileLoadError;
use crate::loader::{
    ChildrenDiscovery, PrepareRendererResources, RendererResources, TileLoadInput,
    TileLoadResult, TilesetContentLoader,
};
use crate::tile::{Tile, TileDescription, TileId};
use crate::tileset::{Tileset, TilesetExternals};
use crate::view_state::ViewState;

pub const TILE_BYTES: u64 = 1_000;

/// Loader that succeeds instantly unless the URI is marked as failing.
#[derive(Default)]
pub struct MockLoader {
    pub failing_uris: FxHashSet<String>,
    pub latency: Duration,
    /// Answer for tiles with pending children.
    pub discovery: Option<ChildrenDiscovery>,
    pub loads_started: AtomicUsize,
}

impl TilesetContentLoader for MockLoader {
    fn load_tile_content(&self, input: &TileLoadInput) -> Result<TileLoadResult, TileLoadError> {
        self.loads_started.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        if self.failing_uris.contains(&input.content.uri) {
            return Err(TileLoadError::Network {
                uri: input.content.uri.clone(),
                message: "404".to_string(),
            });
        }
        Ok(TileLoadResult::with_payload(
            Box::new(input.content.uri.clone()),
            TILE_BYTES,
        ))
    }

    fn create_tile_children(&self, _tile: &Tile) -> ChildrenDiscovery {
        self.discovery
            .clone()
            .unwrap_or(ChildrenDiscovery::Children(Vec::new()))
    }
}

/// Preparer that hands out the tile id as its resource and records frees.
#[derive(Default)]
pub struct MockPreparer {
    /// Time spent in each main-thread preparation.
    pub main_thread_latency: Duration,
    /// Time spent in each free.
    pub free_latency: Duration,
    pub main_thread_prepared: AtomicUsize,
    pub freed: Mutex<Vec<TileId>>,
}

impl MockPreparer {
    pub fn freed(&self) -> Vec<TileId> {
        self.freed.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

impl PrepareRendererResources for MockPreparer {
    fn prepare_in_load_thread(
        &self,
        input: &TileLoadInput,
        _result: &TileLoadResult,
    ) -> Option<RendererResources> {
        Some(Box::new(input.tile))
    }

    fn prepare_in_main_thread(
        &self,
        tile: &Tile,
        load_thread_resources: Option<RendererResources>,
    ) -> Option<RendererResources> {
        if !self.main_thread_latency.is_zero() {
            std::thread::sleep(self.main_thread_latency);
        }
        self.main_thread_prepared.fetch_add(1, Ordering::SeqCst);
        assert!(load_thread_resources.is_some(), "{} skipped load-thread preparation", tile.id());
        Some(Box::new(tile.id()))
    }

    fn free(
        &self,
        tile: TileId,
        _load_thread_resources: Option<RendererResources>,
        _main_thread_resources: Option<RendererResources>,
    ) {
        if !self.free_latency.is_zero() {
            std::thread::sleep(self.free_latency);
        }
        if let Ok(mut freed) = self.freed.lock() {
            freed.push(tile);
        }
    }
}

pub struct Fixture {
    pub tileset: Tileset,
    pub loader: Arc<MockLoader>,
    pub preparer: Arc<MockPreparer>,
}

pub fn fixture(root: TileDescription, options: TilesetOptions) -> Fixture {
    fixture_with_loader(root, options, MockLoader::default())
}

pub fn fixture_with_loader(
    root: TileDescription,
    options: TilesetOptions,
    loader: MockLoader,
) -> Fixture {
    fixture_with_parts(root, options, loader, MockPreparer::default())
}

pub fn fixture_with_preparer(
    root: TileDescription,
    options: TilesetOptions,
    preparer: MockPreparer,
) -> Fixture {
    fixture_with_parts(root, options, MockLoader::default(), preparer)
}

fn fixture_with_parts(
    root: TileDescription,
    options: TilesetOptions,
    loader: MockLoader,
    preparer: MockPreparer,
) -> Fixture {
    let loader = Arc::new(loader);
    let preparer = Arc::new(preparer);
    let externals = TilesetExternals {
        loader: loader.clone(),
        preparer: preparer.clone(),
        async_system: AsyncSystem::new(2).unwrap(),
    };
    let tileset = Tileset::new(externals, root, options).unwrap();
    Fixture {
        tileset,
        loader,
        preparer,
    }
}

/// Wait until no load is in flight. Completions are applied to the tileset.
pub fn finish_loads(tileset: &mut Tileset) {
    let deadline = Instant::now() + Duration::from_secs(30);
    while tileset.loads_in_flight() > 0 {
        assert!(Instant::now() < deadline, "loads did not finish");
        tileset.wait_for_load_completions(Duration::from_millis(100));
    }
}

/// Run frames with loads settling in between until nothing is waiting or
/// in flight.
pub fn converge(tileset: &mut Tileset, views: &[ViewState]) {
    for _ in 0..64 {
        tileset.update_view(views, 0.0);
        let result = tileset.last_update_result();
        let settled = result.not_yet_renderable_count == 0 && result.tiles_loading == 0;
        finish_loads(tileset);
        if settled
            && tileset.worker_thread_load_queue().is_empty()
            && tileset.main_thread_load_queue().is_empty()
        {
            return;
        }
    }
    panic!("selection did not converge");
}

fn flat_box(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> BoundingVolume {
    BoundingVolume::aabb(DVec3::new(min_x, min_y, -1.0), DVec3::new(max_x, max_y, 0.0))
}

/// A root over `[-10, 10]^2` with geometric error 10 and four leaf
/// quadrants, in the order (-x,-y), (+x,-y), (-x,+y), (+x,+y).
pub fn quadtree() -> TileDescription {
    let quadrants = [
        (-10.0, -10.0, 0.0, 0.0),
        (0.0, -10.0, 10.0, 0.0),
        (-10.0, 0.0, 0.0, 10.0),
        (0.0, 0.0, 10.0, 10.0),
    ];
    let children = quadrants
        .iter()
        .enumerate()
        .map(|(i, &(a, b, c, d))| {
            TileDescription::new(flat_box(a, b, c, d), 0.0).with_content(format!("quad/{i}"))
        })
        .collect();
    TileDescription::new(flat_box(-10.0, -10.0, 10.0, 10.0), 10.0)
        .with_content("root")
        .with_children(children)
}

/// A quadtree of the given depth over `[-size/2, size/2]^2`, with the
/// geometric error halving at each level.
pub fn deep_quadtree(depth: u32, size: f64, geometric_error: f64) -> TileDescription {
    fn build(min: DVec2, size: f64, error: f64, depth: u32, path: String) -> TileDescription {
        let mut tile = TileDescription::new(
            flat_box(min.x, min.y, min.x + size, min.y + size),
            if depth == 0 { 0.0 } else { error },
        )
        .with_content(path.clone());
        if depth > 0 {
            let half = size * 0.5;
            tile.children = (0..4)
                .map(|q| {
                    let offset = DVec2::new(f64::from(q % 2) * half, f64::from(q / 2) * half);
                    build(min + offset, half, error * 0.5, depth - 1, format!("{path}/{q}"))
                })
                .collect();
        }
        tile
    }
    build(DVec2::splat(-size * 0.5), size, geometric_error, depth, "r".to_string())
}

/// `count` leaf tiles in a row along +x, each 10 m wide, under one root.
pub fn row_of_children(count: u32, root_error: f64) -> TileDescription {
    let children = (0..count)
        .map(|i| {
            let x = f64::from(i) * 10.0;
            TileDescription::new(flat_box(x, 0.0, x + 10.0, 10.0), 0.0)
                .with_content(format!("row/{i}"))
        })
        .collect();
    TileDescription::new(flat_box(0.0, 0.0, f64::from(count) * 10.0, 10.0), root_error)
        .with_content("row")
        .with_children(children)
}

/// Camera at `(x, y, height)` looking straight down, 100 px viewport,
/// 90 degree fields of view, so `sse = error * 50 / distance`.
pub fn looking_down(x: f64, y: f64, height: f64) -> ViewState {
    ViewState::new(
        DVec3::new(x, y, height),
        DVec3::NEG_Z,
        DVec3::Y,
        DVec2::new(100.0, 100.0),
        FRAC_PI_2,
        FRAC_PI_2,
    )
}

pub fn ids(values: &[u32]) -> Vec<TileId> {
    values.iter().map(|&v| TileId(v)).collect()
}
