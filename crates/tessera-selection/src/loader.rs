//! Collaborator interfaces implemented by the host.

use std::any::Any;
use std::fmt;

use crate::bounds::BoundingVolume;
use crate::error::TileLoadError;
use crate::tile::{ContentDescriptor, Tile, TileDescription, TileId};

/// Decoded tile content. Opaque to the selection engine.
pub type ContentPayload = Box<dyn Any + Send + Sync>;

/// Renderer-side handles produced by a [`PrepareRendererResources`].
pub type RendererResources = Box<dyn Any + Send>;

/// Everything a worker needs to load one tile, copied off the tree so the
/// load never borrows it.
#[derive(Debug, Clone)]
pub struct TileLoadInput {
    pub tile: TileId,
    pub content: ContentDescriptor,
    pub bounding_volume: BoundingVolume,
    pub geometric_error: f64,
}

/// Content returned by a successful load.
pub struct TileLoadResult {
    pub payload: Option<ContentPayload>,
    /// Bytes charged against the cache budget while the tile stays loaded.
    pub byte_size: u64,
}

impl TileLoadResult {
    /// A result carrying only a size, for loaders that keep content elsewhere.
    #[must_use]
    pub fn sized(byte_size: u64) -> Self {
        Self {
            payload: None,
            byte_size,
        }
    }

    #[must_use]
    pub fn with_payload(payload: ContentPayload, byte_size: u64) -> Self {
        Self {
            payload: Some(payload),
            byte_size,
        }
    }
}

impl fmt::Debug for TileLoadResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileLoadResult")
            .field("has_payload", &self.payload.is_some())
            .field("byte_size", &self.byte_size)
            .finish()
    }
}

/// Answer to a child discovery request.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildrenDiscovery {
    Children(Vec<TileDescription>),
    /// Not known yet (e.g. availability still loading); ask again next frame.
    RetryLater,
    /// The tree data is malformed; do not descend below this tile.
    Failed(String),
}

/// Fetches and decodes tile content and discovers children on demand.
///
/// `load_tile_content` runs on a worker thread; `create_tile_children` runs
/// on the client thread during traversal.
pub trait TilesetContentLoader: Send + Sync {
    fn load_tile_content(&self, input: &TileLoadInput) -> Result<TileLoadResult, TileLoadError>;

    /// Called for tiles whose children are pending. The default has none.
    fn create_tile_children(&self, _tile: &Tile) -> ChildrenDiscovery {
        ChildrenDiscovery::Children(Vec::new())
    }
}

/// Turns loaded content into renderer resources.
pub trait PrepareRendererResources: Send + Sync {
    /// Worker thread, right after a successful load.
    fn prepare_in_load_thread(
        &self,
        input: &TileLoadInput,
        result: &TileLoadResult,
    ) -> Option<RendererResources>;

    /// Client thread, while draining the main-thread load queue.
    fn prepare_in_main_thread(
        &self,
        tile: &Tile,
        load_thread_resources: Option<RendererResources>,
    ) -> Option<RendererResources>;

    /// Release whatever resources a tile holds. Either side may be `None`.
    fn free(
        &self,
        tile: TileId,
        load_thread_resources: Option<RendererResources>,
        main_thread_resources: Option<RendererResources>,
    );
}

/// Last-known occlusion test result for a bounding volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileOcclusionState {
    #[default]
    Unknown,
    Occluded,
    NotOccluded,
}

/// Supplies occlusion results gathered by the renderer.
pub trait OcclusionProxyProvider {
    fn occlusion_state(&self, tile: TileId, volume: &BoundingVolume) -> TileOcclusionState;
}

/// Host predicate that removes tiles from selection entirely.
pub trait TileExcluder {
    fn should_exclude(&self, tile: &Tile) -> bool;
}
