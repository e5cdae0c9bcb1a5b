//! The per-frame recursive tile selection.
//!
//! [`Traversal`] walks the tree from the root, deciding for each tile whether
//! to render it, refine into its children, or skip it, and aggregates
//! [`TraversalDetails`] bottom-up so a parent can fall back to itself when its
//! children are not ready. Load requests are collected into the
//! [`LoadQueue`]; nothing is loaded or unloaded here.

use tessera_config::TilesetOptions;

use crate::bounds::BoundingVolume;
use crate::cull::{self, CullResult};
use crate::load_queue::{LoadQueue, PriorityGroup, TileLoadTask};
use crate::loaded_tiles::LoadedTiles;
use crate::loader::{
    ChildrenDiscovery, OcclusionProxyProvider, TileExcluder, TileOcclusionState,
    TilesetContentLoader,
};
use crate::tile::{
    ChildrenState, SelectionResult, TileId, TileLoadState, TileRefine, TileSelectionState,
    TileTree,
};
use crate::view_state::ViewState;
use crate::view_update_result::ViewUpdateResult;

/// Inputs shared by every tile visited in one frame.
#[derive(Debug, Clone)]
pub struct FrameState<'a> {
    pub views: &'a [ViewState],
    /// Fog density per view, in view order.
    pub fog_densities: Vec<f64>,
    pub last_frame_number: u64,
    pub current_frame_number: u64,
}

impl<'a> FrameState<'a> {
    /// Build the frame state, looking up each view's fog density.
    #[must_use]
    pub fn new(views: &'a [ViewState], options: &TilesetOptions, last_frame_number: u64) -> Self {
        let fog_densities = views
            .iter()
            .map(|view| cull::compute_fog_density(&options.fog_density_table, view))
            .collect();
        Self {
            views,
            fog_densities,
            last_frame_number,
            current_frame_number: last_frame_number + 1,
        }
    }
}

/// Summary of a visited subtree, returned to the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalDetails {
    /// Every tile selected in the subtree can be drawn now.
    pub all_are_renderable: bool,
    /// Some tile in the subtree was rendered last frame.
    pub any_were_rendered_last_frame: bool,
    /// Selected tiles in the subtree still waiting for content.
    pub not_yet_renderable_count: u32,
}

impl Default for TraversalDetails {
    fn default() -> Self {
        Self {
            all_are_renderable: true,
            any_were_rendered_last_frame: false,
            not_yet_renderable_count: 0,
        }
    }
}

impl TraversalDetails {
    /// Fold a child's details into this aggregate.
    pub fn merge(&mut self, other: TraversalDetails) {
        self.all_are_renderable &= other.all_are_renderable;
        self.any_were_rendered_last_frame |= other.any_were_rendered_last_frame;
        self.not_yet_renderable_count += other.not_yet_renderable_count;
    }
}

/// Whether a tile that is where refinement should stop may be drawn now.
///
/// True if it was rendered (or kicked) last frame, if neither it nor its
/// subtree was on screen last frame, or if its content is ready. Otherwise
/// drawing it would hide detail that was visible last frame.
fn should_render_this_tile(
    renderable: bool,
    last_frame_state: TileSelectionState,
    last_frame_number: u64,
) -> bool {
    match last_frame_state.original_result(last_frame_number) {
        SelectionResult::Rendered | SelectionResult::Culled | SelectionResult::None => true,
        _ => renderable,
    }
}

/// Mutable state borrowed from the tileset for one traversal.
pub(crate) struct Traversal<'a> {
    pub tree: &'a mut TileTree,
    pub loaded_tiles: &'a mut LoadedTiles,
    pub load_queue: &'a mut LoadQueue,
    pub result: &'a mut ViewUpdateResult,
    pub distance_pool: &'a mut Vec<Vec<f64>>,
    pub child_order_pool: &'a mut Vec<Vec<(f64, TileId)>>,
    pub frame: &'a FrameState<'a>,
    pub options: &'a TilesetOptions,
    pub loader: &'a dyn TilesetContentLoader,
    pub excluders: &'a [Box<dyn TileExcluder>],
    pub occlusion: Option<&'a dyn OcclusionProxyProvider>,
}

impl Traversal<'_> {
    /// Visit a tile whose visibility is not known yet.
    pub fn visit_tile_if_needed(
        &mut self,
        id: TileId,
        depth: u32,
        ancestor_meets_sse: bool,
    ) -> TraversalDetails {
        self.discover_children(id);
        self.mark_tile_visited(id);

        let mut cull_result = CullResult::default();
        if self
            .excluders
            .iter()
            .any(|excluder| excluder.should_exclude(&self.tree[id]))
        {
            cull_result = CullResult {
                should_visit: false,
                culled: true,
            };
        }

        let volume = self.culling_volume(id);
        cull::frustum_cull(
            self.frame,
            &volume,
            self.options.enable_frustum_culling,
            &mut cull_result,
        );

        let mut distances = self.distance_pool.pop().unwrap_or_default();
        distances.clear();
        let tile_volume = *self.tree[id].bounding_volume();
        distances.extend(self.frame.views.iter().map(|view| {
            view.compute_distance_squared_to_bounding_volume(&tile_volume)
                .max(0.0)
                .sqrt()
        }));

        cull::fog_cull(
            self.frame,
            &distances,
            self.options.enable_fog_culling,
            &mut cull_result,
        );

        let details = if !cull_result.should_visit {
            self.tree[id].selection =
                TileSelectionState::new(self.frame.current_frame_number, SelectionResult::Culled);
            self.result.tiles_culled += 1;
            TraversalDetails::default()
        } else if cull::check_occlusion(
            self.occlusion,
            self.options.enable_occlusion_culling,
            id,
            &tile_volume,
        ) == TileOcclusionState::Occluded
        {
            // Hidden behind other content: keep it warm for when it reappears.
            self.tree[id].selection =
                TileSelectionState::new(self.frame.current_frame_number, SelectionResult::Culled);
            self.result.tiles_occluded += 1;
            self.queue_load(id, PriorityGroup::Preload, &distances);
            TraversalDetails::default()
        } else {
            self.visit_tile(id, depth, ancestor_meets_sse, &distances, cull_result.culled)
        };

        self.distance_pool.push(distances);
        details
    }

    /// Visit a tile already known to be worth visiting.
    fn visit_tile(
        &mut self,
        id: TileId,
        depth: u32,
        mut ancestor_meets_sse: bool,
        distances: &[f64],
        culled: bool,
    ) -> TraversalDetails {
        self.result.tiles_visited += 1;
        self.result.max_depth_visited = self.result.max_depth_visited.max(depth);
        if culled {
            self.result.culled_tiles_visited += 1;
        }

        if self.tree[id].load_state == TileLoadState::Failed {
            self.result.tiles_failed += 1;
            return TraversalDetails::default();
        }

        if self.tree[id].is_leaf() {
            return self.render_leaf(id, distances);
        }

        let meets_sse = cull::meets_sse(
            self.frame,
            id,
            self.tree[id].geometric_error(),
            distances,
            culled,
            self.options,
        );

        if self.tree[id].refine() == TileRefine::Add {
            return self.visit_additive_tile(id, depth, ancestor_meets_sse, meets_sse, distances);
        }

        let blocked = self.tree[id]
            .children()
            .iter()
            .any(|&child| self.tree[child].load_state == TileLoadState::Failed);
        let want_to_refine = !blocked && !meets_sse && !ancestor_meets_sse;
        let mut queued_for_load = false;

        if !want_to_refine {
            let tile = &self.tree[id];
            if blocked
                || should_render_this_tile(
                    tile.is_renderable(),
                    tile.selection,
                    self.frame.last_frame_number,
                )
            {
                // Only load this tile if it, not just an ancestor, is the
                // level we want.
                if blocked || (meets_sse && !ancestor_meets_sse) {
                    self.queue_load(id, PriorityGroup::Normal, distances);
                }
                return self.render_tile(id);
            }

            // Rendering this tile would hide detail drawn last frame. Keep
            // drawing whatever descendants were rendered, and load this one
            // first.
            ancestor_meets_sse = true;
            if meets_sse {
                self.queue_load(id, PriorityGroup::Urgent, distances);
                queued_for_load = true;
            }
        }

        let first_rendered_descendant = self.result.tiles_to_render_this_frame.len();
        let children_details = self.visit_children_near_to_far(id, depth, ancestor_meets_sse);
        let descendants_added =
            self.result.tiles_to_render_this_frame.len() != first_rendered_descendant;

        let details = if descendants_added && self.should_kick(&children_details) {
            if !queued_for_load {
                self.queue_load(id, PriorityGroup::Normal, distances);
                queued_for_load = true;
            }
            self.kick_descendants(id, first_rendered_descendant);
            self.render_tile(id)
        } else {
            self.tree[id].selection =
                TileSelectionState::new(self.frame.current_frame_number, SelectionResult::Refined);
            children_details
        };

        if self.options.preload_ancestors && !queued_for_load {
            self.queue_load(id, PriorityGroup::Preload, distances);
        }

        details
    }

    /// Additive tiles are always drawn, and their children add to them.
    fn visit_additive_tile(
        &mut self,
        id: TileId,
        depth: u32,
        ancestor_meets_sse: bool,
        meets_sse: bool,
        distances: &[f64],
    ) -> TraversalDetails {
        let own = self.render_leaf(id, distances);
        if meets_sse || ancestor_meets_sse {
            return own;
        }

        let first_rendered_descendant = self.result.tiles_to_render_this_frame.len();
        let children_details = self.visit_children_near_to_far(id, depth, ancestor_meets_sse);
        if self.result.tiles_to_render_this_frame.len() == first_rendered_descendant {
            return own;
        }

        let mut merged = own;
        merged.merge(children_details);
        if self.should_kick(&merged) {
            // Already in the list, ahead of its descendants.
            self.kick_descendants(id, first_rendered_descendant);
            own
        } else {
            merged
        }
    }

    fn visit_children_near_to_far(
        &mut self,
        id: TileId,
        depth: u32,
        ancestor_meets_sse: bool,
    ) -> TraversalDetails {
        let mut order = self.child_order_pool.pop().unwrap_or_default();
        order.clear();
        for &child in self.tree[id].children() {
            let volume = self.tree[child].bounding_volume();
            let nearest = self
                .frame
                .views
                .iter()
                .map(|view| view.compute_distance_squared_to_bounding_volume(volume))
                .fold(f64::INFINITY, f64::min);
            order.push((nearest, child));
        }
        order.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut details = TraversalDetails::default();
        for &(_, child) in &order {
            details.merge(self.visit_tile_if_needed(child, depth + 1, ancestor_meets_sse));
        }

        self.child_order_pool.push(order);
        details
    }

    fn should_kick(&self, details: &TraversalDetails) -> bool {
        !details.all_are_renderable
            && !details.any_were_rendered_last_frame
            && details.not_yet_renderable_count > self.options.loading_descendant_limit
    }

    /// Remove every descendant added to the render list since
    /// `first_rendered_descendant`, marking them and their ancestors up to
    /// `id` as kicked. The descendants keep their place in the load queue.
    fn kick_descendants(&mut self, id: TileId, first_rendered_descendant: usize) {
        let current = self.frame.current_frame_number;
        for index in first_rendered_descendant..self.result.tiles_to_render_this_frame.len() {
            let mut work = Some(self.result.tiles_to_render_this_frame[index]);
            while let Some(work_id) = work {
                let tile = &mut self.tree[work_id];
                if work_id == id || tile.selection.was_kicked(current) {
                    break;
                }
                tile.selection.kick();
                work = tile.parent();
            }
        }
        let kicked = self.result.tiles_to_render_this_frame.len() - first_rendered_descendant;
        self.result
            .tiles_to_render_this_frame
            .truncate(first_rendered_descendant);
        tracing::trace!(tile = %id, kicked, "rendering ancestor in place of loading descendants");
    }

    /// Render a tile with nothing below it to descend into.
    fn render_leaf(&mut self, id: TileId, distances: &[f64]) -> TraversalDetails {
        self.queue_load(id, PriorityGroup::Normal, distances);
        self.render_tile(id)
    }

    /// Add the tile to the render list and describe it as a one-tile subtree.
    fn render_tile(&mut self, id: TileId) -> TraversalDetails {
        let last_frame_state = self.tree[id].selection;
        self.tree[id].selection =
            TileSelectionState::new(self.frame.current_frame_number, SelectionResult::Rendered);
        self.result.tiles_to_render_this_frame.push(id);
        self.leaf_details(id, last_frame_state)
    }

    fn leaf_details(&self, id: TileId, last_frame_state: TileSelectionState) -> TraversalDetails {
        let renderable = self.tree[id].is_renderable();
        TraversalDetails {
            all_are_renderable: renderable,
            any_were_rendered_last_frame: last_frame_state.result(self.frame.last_frame_number)
                == SelectionResult::Rendered,
            not_yet_renderable_count: u32::from(!renderable),
        }
    }

    /// Queue the tile's content if it still needs any work. The priority is
    /// the distance to the nearest view.
    fn queue_load(&mut self, id: TileId, group: PriorityGroup, distances: &[f64]) {
        let priority = distances.iter().copied().fold(f64::INFINITY, f64::min);
        let task = TileLoadTask {
            tile: id,
            group,
            priority,
        };
        match self.tree[id].load_state {
            TileLoadState::Unloaded => self.load_queue.push_worker(task),
            TileLoadState::ContentLoaded => self.load_queue.push_main(task),
            TileLoadState::ContentLoading | TileLoadState::Done | TileLoadState::Failed => {}
        }
    }

    fn mark_tile_visited(&mut self, id: TileId) {
        self.loaded_tiles.touch(self.tree, id);
        self.tree[id].last_visited_frame = self.frame.current_frame_number;
    }

    fn discover_children(&mut self, id: TileId) {
        if self.tree[id].children_state != ChildrenState::Pending {
            return;
        }
        match self.loader.create_tile_children(&self.tree[id]) {
            ChildrenDiscovery::Children(children) => {
                tracing::trace!(tile = %id, count = children.len(), "children discovered");
                self.tree.attach_children(id, children);
            }
            ChildrenDiscovery::RetryLater => {}
            ChildrenDiscovery::Failed(reason) => {
                tracing::warn!(tile = %id, %reason, "child discovery failed");
                self.tree[id].children_state = ChildrenState::Failed;
            }
        }
    }

    /// The volume tested against the frustums: the tile's own, or the union
    /// of its children's when `cull_with_children_bounds` is set.
    fn culling_volume(&self, id: TileId) -> BoundingVolume {
        let tile = &self.tree[id];
        if self.options.cull_with_children_bounds && !tile.is_leaf() {
            let children = tile
                .children()
                .iter()
                .map(|&child| self.tree[child].bounding_volume());
            if let Some(union) = BoundingVolume::union_all(children) {
                return union;
            }
        }
        *tile.bounding_volume()
    }
}
