//! A synthetic quadtree tileset whose children are discovered lazily.

use std::time::Duration;

use glam::DVec3;
use tessera_selection::{
    BoundingVolume, ChildrenDiscovery, PrepareRendererResources, RendererResources, Tile,
    TileDescription, TileId, TileLoadError, TileLoadInput, TileLoadResult,
    TilesetContentLoader,
};

/// Bytes of one 256x256 float heightfield.
const TILE_BYTES: u64 = 256 * 256 * 4;

/// Generates a flat quadtree of `depth` levels, sleeping `latency` per load.
pub struct ProceduralQuadtree {
    depth: u32,
    latency: Duration,
}

impl ProceduralQuadtree {
    pub fn new(depth: u32, latency: Duration) -> Self {
        Self { depth, latency }
    }

    /// Root tile over `[-size/2, size/2]^2`. Its children are created on
    /// first visit.
    pub fn root(&self, size: f64, geometric_error: f64) -> TileDescription {
        let half = size * 0.5;
        let volume =
            BoundingVolume::aabb(DVec3::new(-half, -half, -50.0), DVec3::new(half, half, 0.0));
        let root = TileDescription::new(volume, geometric_error).with_content("tile");
        if self.depth > 0 {
            root.with_pending_children()
        } else {
            root
        }
    }
}

impl TilesetContentLoader for ProceduralQuadtree {
    fn load_tile_content(&self, input: &TileLoadInput) -> Result<TileLoadResult, TileLoadError> {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        tracing::trace!(uri = %input.content.uri, "generated tile");
        Ok(TileLoadResult::sized(TILE_BYTES))
    }

    fn create_tile_children(&self, tile: &Tile) -> ChildrenDiscovery {
        let level = tile.depth() + 1;
        if level > self.depth {
            return ChildrenDiscovery::Children(Vec::new());
        }
        let Some(parent_uri) = tile.content().map(|content| content.uri.as_str()) else {
            return ChildrenDiscovery::Failed(format!("{} has no content uri", tile.id()));
        };

        let bounds = tile.bounding_volume().to_aabb();
        let mid = bounds.center();
        let error = if level == self.depth {
            0.0
        } else {
            tile.geometric_error() * 0.5
        };
        let children = (0..4)
            .map(|quadrant| {
                let (min_x, max_x) = if quadrant % 2 == 0 {
                    (bounds.min.x, mid.x)
                } else {
                    (mid.x, bounds.max.x)
                };
                let (min_y, max_y) = if quadrant < 2 {
                    (bounds.min.y, mid.y)
                } else {
                    (mid.y, bounds.max.y)
                };
                let volume = BoundingVolume::aabb(
                    DVec3::new(min_x, min_y, bounds.min.z),
                    DVec3::new(max_x, max_y, bounds.max.z),
                );
                let child = TileDescription::new(volume, error)
                    .with_content(format!("{parent_uri}/{quadrant}"));
                if level < self.depth {
                    child.with_pending_children()
                } else {
                    child
                }
            })
            .collect();
        ChildrenDiscovery::Children(children)
    }
}

/// The demo has no renderer, so there is nothing to prepare.
pub struct NoopPreparer;

impl PrepareRendererResources for NoopPreparer {
    fn prepare_in_load_thread(
        &self,
        _input: &TileLoadInput,
        _result: &TileLoadResult,
    ) -> Option<RendererResources> {
        None
    }

    fn prepare_in_main_thread(
        &self,
        _tile: &Tile,
        _load_thread_resources: Option<RendererResources>,
    ) -> Option<RendererResources> {
        None
    }

    fn free(
        &self,
        _tile: TileId,
        _load_thread_resources: Option<RendererResources>,
        _main_thread_resources: Option<RendererResources>,
    ) {
    }
}
