//! The tileset: owns the tree and drives selection, loading, and eviction
//! once per frame.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use rustc_hash::FxHashSet;
use tessera_config::TilesetOptions;

use crate::async_system::AsyncSystem;
use crate::error::{TileLoadError, TileLoadFailureDetails, TilesetError};
use crate::load_queue::{LoadQueue, TileLoadTask};
use crate::loaded_tiles::LoadedTiles;
use crate::loader::{
    ContentPayload, OcclusionProxyProvider, PrepareRendererResources, RendererResources,
    TileExcluder, TileLoadInput, TilesetContentLoader,
};
use crate::tile::{ContentDescriptor, Tile, TileDescription, TileId, TileLoadState, TileTree};
use crate::transition::LodTransitions;
use crate::traversal::{FrameState, Traversal};
use crate::view_state::ViewState;
use crate::view_update_result::ViewUpdateResult;

/// How long `update_view_offline` blocks per wait before re-checking.
const OFFLINE_WAIT: Duration = Duration::from_millis(50);

/// Host-provided collaborators.
#[derive(Clone)]
pub struct TilesetExternals {
    pub loader: Arc<dyn TilesetContentLoader>,
    pub preparer: Arc<dyn PrepareRendererResources>,
    pub async_system: AsyncSystem,
}

/// Called on the client thread for every failed load.
pub type LoadFailureCallback = Box<dyn Fn(&TileLoadFailureDetails)>;

/// Load-thread renderer resources on their way to the client thread.
/// Freed through the preparer if dropped without being claimed, e.g. when
/// the tileset is gone by the time the load finishes.
struct PreparedResources {
    tile: TileId,
    resources: Option<RendererResources>,
    preparer: Arc<dyn PrepareRendererResources>,
}

impl PreparedResources {
    fn claim(mut self) -> Option<RendererResources> {
        self.resources.take()
    }
}

impl Drop for PreparedResources {
    fn drop(&mut self) {
        if let Some(resources) = self.resources.take() {
            self.preparer.free(self.tile, Some(resources), None);
        }
    }
}

struct LoadedContent {
    byte_size: u64,
    payload: Option<ContentPayload>,
    resources: PreparedResources,
}

/// Message from a worker back to the client thread.
struct LoadCompletion {
    tile: TileId,
    outcome: Result<LoadedContent, TileLoadError>,
    /// Keeps the destruction signal pending while the message exists.
    _alive: Sender<()>,
}

/// Completes once a dropped tileset has no load left in flight.
#[derive(Debug, Clone)]
pub struct DestructionSignal {
    receiver: Receiver<()>,
}

impl DestructionSignal {
    /// Block until teardown is complete.
    pub fn wait(&self) {
        // Nothing is ever sent; this returns once every sender is gone.
        let _ = self.receiver.recv();
    }

    /// Block up to `timeout`; returns whether teardown completed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        matches!(
            self.receiver.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.receiver.try_recv(), Err(TryRecvError::Disconnected))
    }
}

/// A streamed tile hierarchy and its per-frame selection state.
///
/// `update_view` must be called from a single client thread. Content loads
/// run on the [`AsyncSystem`] workers and are picked up at the start of the
/// next `update_view`.
pub struct Tileset {
    externals: TilesetExternals,
    options: TilesetOptions,
    tree: TileTree,
    loaded_tiles: LoadedTiles,
    load_queue: LoadQueue,
    transitions: LodTransitions,
    update_result: ViewUpdateResult,
    previous_frame_number: u64,
    loads_in_flight: u32,
    total_data_bytes: u64,

    excluders: Vec<Box<dyn TileExcluder>>,
    occlusion: Option<Box<dyn OcclusionProxyProvider>>,
    failure_callback: Option<LoadFailureCallback>,

    completion_sender: Sender<LoadCompletion>,
    completion_receiver: Receiver<LoadCompletion>,
    alive_sender: Sender<()>,
    alive_receiver: Receiver<()>,

    distance_pool: Vec<Vec<f64>>,
    child_order_pool: Vec<Vec<(f64, TileId)>>,
}

impl Tileset {
    /// Create a tileset from a root description. Nothing is loaded until the
    /// first `update_view`.
    pub fn new(
        externals: TilesetExternals,
        root: TileDescription,
        options: TilesetOptions,
    ) -> Result<Self, TilesetError> {
        options.validate()?;
        let (completion_sender, completion_receiver) = unbounded();
        let (alive_sender, alive_receiver) = unbounded();
        let tree = TileTree::from_description(root);
        tracing::debug!(tiles = tree.len(), "tileset created");

        Ok(Self {
            externals,
            options,
            tree,
            loaded_tiles: LoadedTiles::new(),
            load_queue: LoadQueue::new(),
            transitions: LodTransitions::default(),
            update_result: ViewUpdateResult::default(),
            previous_frame_number: 0,
            loads_in_flight: 0,
            total_data_bytes: 0,
            excluders: Vec::new(),
            occlusion: None,
            failure_callback: None,
            completion_sender,
            completion_receiver,
            alive_sender,
            alive_receiver,
            distance_pool: Vec::new(),
            child_order_pool: Vec::new(),
        })
    }

    pub fn options(&self) -> &TilesetOptions {
        &self.options
    }

    /// Replace the options between frames.
    pub fn set_options(&mut self, options: TilesetOptions) -> Result<(), TilesetError> {
        options.validate()?;
        self.options = options;
        Ok(())
    }

    pub fn set_occlusion_provider(&mut self, provider: Box<dyn OcclusionProxyProvider>) {
        self.occlusion = Some(provider);
    }

    pub fn add_excluder(&mut self, excluder: Box<dyn TileExcluder>) {
        self.excluders.push(excluder);
    }

    pub fn set_load_failure_callback(&mut self, callback: LoadFailureCallback) {
        self.failure_callback = Some(callback);
    }

    pub fn root(&self) -> TileId {
        self.tree.root()
    }

    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        self.tree.get(id)
    }

    pub fn tiles(&self) -> &TileTree {
        &self.tree
    }

    /// Result of the most recent `update_view`.
    pub fn last_update_result(&self) -> &ViewUpdateResult {
        &self.update_result
    }

    pub fn loads_in_flight(&self) -> u32 {
        self.loads_in_flight
    }

    /// Bytes of content currently held by loaded tiles.
    pub fn total_data_bytes(&self) -> u64 {
        self.total_data_bytes
    }

    /// Tiles in the `ContentLoaded` or `Done` state.
    pub fn loaded_tile_count(&self) -> usize {
        self.loaded_tiles.len()
    }

    /// Loaded tiles, least recently touched first.
    pub fn loaded_tiles(&self) -> impl Iterator<Item = TileId> + '_ {
        self.loaded_tiles.iter(&self.tree)
    }

    /// Worker-thread tasks gathered by the last traversal, in service order.
    pub fn worker_thread_load_queue(&self) -> &[TileLoadTask] {
        self.load_queue.worker()
    }

    /// Main-thread tasks gathered by the last traversal, in service order.
    pub fn main_thread_load_queue(&self) -> &[TileLoadTask] {
        self.load_queue.main()
    }

    /// A signal that completes after this tileset is dropped and every load
    /// it started has settled.
    pub fn destruction_complete(&self) -> DestructionSignal {
        DestructionSignal {
            receiver: self.alive_receiver.clone(),
        }
    }

    /// Select the tiles to render for `views`, then start and finish loads,
    /// evict cold tiles, and advance fades by `delta_time` seconds.
    pub fn update_view(&mut self, views: &[ViewState], delta_time: f32) -> &ViewUpdateResult {
        self.externals.async_system.dispatch_main_thread_tasks();
        self.process_completed_loads();

        let previous_render = std::mem::take(&mut self.update_result.tiles_to_render_this_frame);
        let frame = FrameState::new(views, &self.options, self.previous_frame_number);
        self.update_result.begin_frame(frame.current_frame_number);
        self.load_queue.clear();

        if !views.is_empty() {
            let root = self.tree.root();
            let mut traversal = Traversal {
                tree: &mut self.tree,
                loaded_tiles: &mut self.loaded_tiles,
                load_queue: &mut self.load_queue,
                result: &mut self.update_result,
                distance_pool: &mut self.distance_pool,
                child_order_pool: &mut self.child_order_pool,
                frame: &frame,
                options: &self.options,
                loader: self.externals.loader.as_ref(),
                excluders: &self.excluders,
                occlusion: self.occlusion.as_deref(),
            };
            let details = traversal.visit_tile_if_needed(root, 0, false);
            self.update_result.not_yet_renderable_count = details.not_yet_renderable_count;
        }

        self.load_queue.sort();
        self.update_result.worker_thread_tile_load_queue_length =
            self.load_queue.worker().len() as u32;
        self.update_result.main_thread_tile_load_queue_length = self.load_queue.main().len() as u32;

        self.process_worker_thread_load_queue();
        self.process_main_thread_load_queue();
        // Fades first, so tiles that just left the render set are protected
        // from eviction while they fade out.
        self.transitions.update(
            &mut self.tree,
            &self.options,
            delta_time,
            &previous_render,
            &mut self.update_result,
        );
        self.unload_cached_tiles(frame.current_frame_number);

        self.update_result.tiles_loading = self.loads_in_flight;
        self.previous_frame_number = frame.current_frame_number;

        let result = &self.update_result;
        tracing::debug!(
            frame = result.frame_number,
            rendered = result.tiles_to_render_this_frame.len(),
            visited = result.tiles_visited,
            culled = result.tiles_culled,
            waiting = result.not_yet_renderable_count,
            loading = result.tiles_loading,
            "view updated"
        );
        result
    }

    /// Repeat `update_view` until every selected tile is renderable, blocking
    /// on loads in between. For offline capture only.
    pub fn update_view_offline(&mut self, views: &[ViewState]) -> &ViewUpdateResult {
        let rendered_before = self.update_result.tiles_to_render_this_frame.clone();

        loop {
            self.update_view(views, 0.0);
            if self.loads_in_flight > 0 {
                self.wait_for_load_completions(OFFLINE_WAIT);
                continue;
            }
            // Nothing left to start means nothing left to wait for.
            if self.update_result.not_yet_renderable_count == 0 || self.load_queue.is_empty() {
                break;
            }
        }

        let before: FxHashSet<TileId> = rendered_before.iter().copied().collect();
        let after: FxHashSet<TileId> = self
            .update_result
            .tiles_to_render_this_frame
            .iter()
            .copied()
            .collect();
        self.update_result.tiles_newly_rendered = self
            .update_result
            .tiles_to_render_this_frame
            .iter()
            .copied()
            .filter(|id| !before.contains(id))
            .collect();
        self.update_result.tiles_to_no_longer_render_this_frame = rendered_before
            .into_iter()
            .filter(|id| !after.contains(id))
            .collect();

        &self.update_result
    }

    /// Block up to `timeout` for at least one load to finish, then apply
    /// every finished load. Returns how many were applied.
    pub fn wait_for_load_completions(&mut self, timeout: Duration) -> usize {
        if self.loads_in_flight == 0 {
            return 0;
        }
        match self.completion_receiver.recv_timeout(timeout) {
            Ok(completion) => {
                self.apply_completion(completion);
                1 + self.process_completed_loads()
            }
            Err(_) => 0,
        }
    }

    fn process_completed_loads(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.completion_receiver.try_recv() {
            self.apply_completion(completion);
            applied += 1;
        }
        applied
    }

    fn apply_completion(&mut self, completion: LoadCompletion) {
        let LoadCompletion { tile: id, outcome, .. } = completion;
        self.loads_in_flight = self.loads_in_flight.saturating_sub(1);

        match outcome {
            Ok(content) => {
                let tile = &mut self.tree[id];
                tile.load_state = TileLoadState::ContentLoaded;
                tile.byte_size = content.byte_size;
                tile.payload = content.payload;
                tile.load_resources = content.resources.claim();
                self.total_data_bytes += content.byte_size;
                self.loaded_tiles.insert_at_tail(&mut self.tree, id);
                tracing::trace!(tile = %id, bytes = content.byte_size, "tile content loaded");
            }
            Err(error) => self.fail_tile(id, error),
        }
    }

    fn fail_tile(&mut self, id: TileId, error: TileLoadError) {
        self.tree[id].load_state = TileLoadState::Failed;
        tracing::warn!(tile = %id, %error, "tile load failed");
        if let Some(callback) = &self.failure_callback {
            callback(&TileLoadFailureDetails { tile: id, error });
        }
    }

    /// Start worker loads in queue order until the in-flight cap is reached.
    fn process_worker_thread_load_queue(&mut self) {
        let max_loads = self.options.maximum_simultaneous_tile_loads;
        for index in 0..self.load_queue.worker().len() {
            if self.loads_in_flight >= max_loads {
                break;
            }
            let id = self.load_queue.worker()[index].tile;
            let tile = &self.tree[id];
            if tile.load_state != TileLoadState::Unloaded {
                continue;
            }
            let content = tile.content().cloned();
            match content {
                Some(content) => self.start_load(id, content),
                None => self.finish_empty_tile(id),
            }
        }
    }

    fn start_load(&mut self, id: TileId, content: ContentDescriptor) {
        let tile = &mut self.tree[id];
        tile.load_state = TileLoadState::ContentLoading;
        let input = TileLoadInput {
            tile: id,
            content,
            bounding_volume: *tile.bounding_volume(),
            geometric_error: tile.geometric_error(),
        };

        let loader = Arc::clone(&self.externals.loader);
        let preparer = Arc::clone(&self.externals.preparer);
        let completions = self.completion_sender.clone();
        let alive = self.alive_sender.clone();

        let job = move || {
            let outcome = loader.load_tile_content(&input).map(|result| {
                let resources = preparer.prepare_in_load_thread(&input, &result);
                LoadedContent {
                    byte_size: result.byte_size,
                    payload: result.payload,
                    resources: PreparedResources {
                        tile: input.tile,
                        resources,
                        preparer: Arc::clone(&preparer),
                    },
                }
            });
            // A closed channel means the tileset is gone; dropping the
            // message frees its resources.
            let _ = completions.send(LoadCompletion {
                tile: input.tile,
                outcome,
                _alive: alive,
            });
        };

        match self.externals.async_system.run_in_worker_thread(job) {
            Ok(()) => {
                self.loads_in_flight += 1;
                tracing::trace!(tile = %id, "tile load started");
            }
            Err(_) => self.fail_tile(id, TileLoadError::Cancelled(id)),
        }
    }

    /// Tiles without content are ready as soon as they are needed.
    fn finish_empty_tile(&mut self, id: TileId) {
        let tile = &mut self.tree[id];
        tile.load_state = TileLoadState::Done;
        tile.byte_size = 0;
        self.loaded_tiles.insert_at_tail(&mut self.tree, id);
    }

    /// Finalize fetched content on this thread, within the time limit.
    fn process_main_thread_load_queue(&mut self) {
        let limit_ms = self.options.main_thread_loading_time_limit_ms;
        let start = Instant::now();
        for index in 0..self.load_queue.main().len() {
            let id = self.load_queue.main()[index].tile;
            if self.tree[id].load_state != TileLoadState::ContentLoaded {
                continue;
            }
            let load_resources = self.tree[id].load_resources.take();
            let resources = self
                .externals
                .preparer
                .prepare_in_main_thread(&self.tree[id], load_resources);
            let tile = &mut self.tree[id];
            tile.render_resources = resources;
            tile.load_state = TileLoadState::Done;

            if limit_ms > 0.0 && start.elapsed().as_secs_f64() * 1000.0 >= limit_ms {
                break;
            }
        }
    }

    fn over_cache_budget(&self) -> bool {
        self.total_data_bytes > self.options.maximum_cached_bytes
            || self
                .options
                .maximum_cached_tiles
                .is_some_and(|max| self.loaded_tiles.len() > max)
    }

    /// Unload least recently touched tiles while over budget. Stops at the
    /// first tile touched this frame; everything after it is in use.
    fn unload_cached_tiles(&mut self, current_frame_number: u64) {
        if !self.over_cache_budget() {
            return;
        }
        let budget = self.options.unload_time_budget_ms / 1000.0;
        let start = Instant::now();
        let in_use: FxHashSet<TileId> = self
            .update_result
            .tiles_to_render_this_frame
            .iter()
            .chain(self.transitions.fading_out())
            .copied()
            .collect();

        let mut cursor = self.loaded_tiles.head();
        let mut unloaded = 0_usize;
        while self.over_cache_budget() {
            let Some(id) = cursor else { break };
            if self.tree[id].last_visited_frame == current_frame_number {
                break;
            }
            // Always make some progress, then respect the budget.
            if unloaded > 0 && start.elapsed().as_secs_f64() >= budget {
                break;
            }
            cursor = self.loaded_tiles.next(&self.tree, id);
            if in_use.contains(&id) || self.tree[id].load_state == TileLoadState::ContentLoading {
                continue;
            }
            self.unload_tile(id);
            unloaded += 1;
        }

        if unloaded > 0 {
            tracing::debug!(
                unloaded,
                remaining = self.loaded_tiles.len(),
                bytes = self.total_data_bytes,
                "unloaded cached tiles"
            );
        }
    }

    fn unload_tile(&mut self, id: TileId) {
        let tile = &mut self.tree[id];
        let load_resources = tile.load_resources.take();
        let render_resources = tile.render_resources.take();
        tile.payload = None;
        tile.load_state = TileLoadState::Unloaded;
        tile.fade = 0.0;
        let bytes = std::mem::take(&mut tile.byte_size);

        self.total_data_bytes = self.total_data_bytes.saturating_sub(bytes);
        self.loaded_tiles.remove(&mut self.tree, id);
        if load_resources.is_some() || render_resources.is_some() {
            self.externals
                .preparer
                .free(id, load_resources, render_resources);
        }
    }
}

impl Drop for Tileset {
    fn drop(&mut self) {
        // Loads already delivered are unloaded with everything else below.
        self.process_completed_loads();
        let loaded: Vec<TileId> = self.loaded_tiles.iter(&self.tree).collect();
        for id in loaded {
            self.unload_tile(id);
        }
        if self.loads_in_flight > 0 {
            tracing::debug!(
                in_flight = self.loads_in_flight,
                "tileset dropped with loads in flight"
            );
        }
    }
}

impl std::fmt::Debug for Tileset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tileset")
            .field("tiles", &self.tree.len())
            .field("loaded", &self.loaded_tiles.len())
            .field("loads_in_flight", &self.loads_in_flight)
            .field("total_data_bytes", &self.total_data_bytes)
            .field("frame", &self.previous_frame_number)
            .finish_non_exhaustive()
    }
}
