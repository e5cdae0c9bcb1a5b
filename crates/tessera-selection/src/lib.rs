//! Level-of-detail selection for streamed tile hierarchies: per-frame
//! screen-space-error traversal, prioritized content loading, LRU eviction
//! and LOD fade transitions.

mod async_system;
mod bounds;
mod cull;
mod error;
mod load_queue;
mod loaded_tiles;
mod loader;
mod tile;
mod tileset;
mod transition;
mod traversal;
mod view_state;
mod view_update_result;

#[cfg(test)]
mod test_support;

pub use async_system::{AsyncSystem, WorkerPoolClosed};
pub use bounds::{Aabb, BoundingSphere, BoundingVolume, CullingResult, OrientedBoundingBox, Plane};
pub use cull::{CullResult, compute_fog_density, is_visible_in_fog};
pub use error::{TileLoadError, TileLoadFailureDetails, TilesetError};
pub use load_queue::{PriorityGroup, TileLoadTask};
pub use loader::{
    ChildrenDiscovery, ContentPayload, OcclusionProxyProvider, PrepareRendererResources,
    RendererResources, TileExcluder, TileLoadInput, TileLoadResult, TileOcclusionState,
    TilesetContentLoader,
};
pub use tessera_config::{FogDensityAtHeight, TilesetOptions};
pub use tile::{
    ChildrenState, ContentDescriptor, SelectionResult, Tile, TileDescription, TileId,
    TileLoadState, TileRefine, TileSelectionState, TileTree,
};
pub use tileset::{DestructionSignal, LoadFailureCallback, Tileset, TilesetExternals};
pub use traversal::{FrameState, TraversalDetails};
pub use view_state::{CullingVolume, ViewState};
pub use view_update_result::ViewUpdateResult;
