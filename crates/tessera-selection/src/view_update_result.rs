//! Per-frame output of [`Tileset::update_view`](crate::Tileset::update_view).

use crate::tile::TileId;

/// What to draw this frame, what changed since the last one, and counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewUpdateResult {
    /// Tiles to draw, in traversal order. No tile is an ancestor of another
    /// unless the ancestor is additively refined.
    pub tiles_to_render_this_frame: Vec<TileId>,
    /// Rendered this frame but not last frame.
    pub tiles_newly_rendered: Vec<TileId>,
    /// Rendered last frame but not this frame.
    pub tiles_to_no_longer_render_this_frame: Vec<TileId>,
    /// Left the render set and still fading toward zero opacity. Hosts keep
    /// drawing these at [`Tile::fade_percentage`](crate::Tile::fade_percentage).
    pub tiles_fading_out: Vec<TileId>,

    pub worker_thread_tile_load_queue_length: u32,
    pub main_thread_tile_load_queue_length: u32,
    /// Loads in flight on worker threads after this frame's dispatch.
    pub tiles_loading: u32,

    pub tiles_visited: u32,
    pub culled_tiles_visited: u32,
    pub tiles_culled: u32,
    pub tiles_occluded: u32,
    /// Tiles reached this frame whose content failed to load.
    pub tiles_failed: u32,
    pub max_depth_visited: u32,
    /// Outstanding load debt aggregated at the root.
    pub not_yet_renderable_count: u32,

    pub frame_number: u64,
}

impl ViewUpdateResult {
    /// Reset the per-frame fields. Fading state carries over.
    pub(crate) fn begin_frame(&mut self, frame_number: u64) {
        self.tiles_to_render_this_frame.clear();
        self.tiles_newly_rendered.clear();
        self.tiles_to_no_longer_render_this_frame.clear();
        self.worker_thread_tile_load_queue_length = 0;
        self.main_thread_tile_load_queue_length = 0;
        self.tiles_visited = 0;
        self.culled_tiles_visited = 0;
        self.tiles_culled = 0;
        self.tiles_occluded = 0;
        self.tiles_failed = 0;
        self.max_depth_visited = 0;
        self.not_yet_renderable_count = 0;
        self.frame_number = frame_number;
    }
}
