//! Tile nodes and the arena that owns them.
//!
//! Tiles live in a flat `Vec` indexed by [`TileId`]. A tile's children are a
//! list of ids and its parent is a plain back-index, so upward walks never
//! touch ownership. Nodes are never removed: unloading a tile frees its
//! content, not its place in the tree.

use std::fmt;
use std::ops::{Index, IndexMut};

use crate::bounds::BoundingVolume;
use crate::loader::{ContentPayload, RendererResources};

/// Index of a tile in its [`TileTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(pub(crate) u32);

impl TileId {
    /// Position of the tile in the arena.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tile#{}", self.0)
    }
}

/// How a tile's content relates to its children's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileRefine {
    /// Children are drawn in addition to this tile.
    Add,
    /// Children are drawn instead of this tile.
    #[default]
    Replace,
}

/// Content lifecycle of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileLoadState {
    #[default]
    Unloaded,
    /// A worker-thread load is in flight.
    ContentLoading,
    /// Worker-side loading finished; main-thread finalization is pending.
    ContentLoaded,
    /// Fully loaded and renderable.
    Done,
    /// The load failed. Not retried.
    Failed,
}

/// Whether a tile's children are known yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChildrenState {
    /// `children` is authoritative.
    #[default]
    Ready,
    /// Children must be requested from the content loader before recursing.
    Pending,
    /// The loader could not produce children; the branch ends here.
    Failed,
}

/// Outcome of selecting a tile in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionResult {
    /// Not visited in that frame.
    #[default]
    None,
    /// Visited but outside every view.
    Culled,
    /// Added to the render list.
    Rendered,
    /// Refined to its children.
    Refined,
    /// Was rendered, then removed because an ancestor took its place.
    RenderedAndKicked,
    /// Was refined, then an ancestor took its place.
    RefinedAndKicked,
}

/// The selection outcome stamped with the frame it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileSelectionState {
    frame_number: u64,
    result: SelectionResult,
}

impl TileSelectionState {
    #[must_use]
    pub fn new(frame_number: u64, result: SelectionResult) -> Self {
        Self {
            frame_number,
            result,
        }
    }

    /// Frame the stored result was recorded in.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Result in `frame_number`, or `None` if the tile was not selected then.
    #[must_use]
    pub fn result(&self, frame_number: u64) -> SelectionResult {
        if self.frame_number == frame_number {
            self.result
        } else {
            SelectionResult::None
        }
    }

    /// Result in `frame_number` with kicking undone.
    #[must_use]
    pub fn original_result(&self, frame_number: u64) -> SelectionResult {
        match self.result(frame_number) {
            SelectionResult::RenderedAndKicked => SelectionResult::Rendered,
            SelectionResult::RefinedAndKicked => SelectionResult::Refined,
            other => other,
        }
    }

    #[must_use]
    pub fn was_kicked(&self, frame_number: u64) -> bool {
        matches!(
            self.result(frame_number),
            SelectionResult::RenderedAndKicked | SelectionResult::RefinedAndKicked
        )
    }

    /// Mark a rendered or refined tile as displaced by an ancestor.
    pub fn kick(&mut self) {
        self.result = match self.result {
            SelectionResult::Rendered => SelectionResult::RenderedAndKicked,
            SelectionResult::Refined => SelectionResult::RefinedAndKicked,
            other => other,
        };
    }
}

/// Where a tile's content comes from. Interpreted only by the content loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDescriptor {
    pub uri: String,
}

impl ContentDescriptor {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

/// Host-side description of a tile and its subtree, used to build the tree
/// and to answer child discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct TileDescription {
    pub bounding_volume: BoundingVolume,
    pub geometric_error: f64,
    pub refine: TileRefine,
    pub content: Option<ContentDescriptor>,
    pub children: Vec<TileDescription>,
    /// Ask the loader for children the first time the tile is visited.
    pub children_pending: bool,
}

impl TileDescription {
    /// A replace-refined tile with no content and no children.
    #[must_use]
    pub fn new(bounding_volume: BoundingVolume, geometric_error: f64) -> Self {
        Self {
            bounding_volume,
            geometric_error,
            refine: TileRefine::Replace,
            content: None,
            children: Vec::new(),
            children_pending: false,
        }
    }

    #[must_use]
    pub fn with_content(mut self, uri: impl Into<String>) -> Self {
        self.content = Some(ContentDescriptor::new(uri));
        self
    }

    #[must_use]
    pub fn with_refine(mut self, refine: TileRefine) -> Self {
        self.refine = refine;
        self
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<TileDescription>) -> Self {
        self.children = children;
        self
    }

    #[must_use]
    pub fn with_pending_children(mut self) -> Self {
        self.children_pending = true;
        self
    }
}

/// Intrusive links of the loaded-tiles list.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LruLink {
    pub prev: Option<TileId>,
    pub next: Option<TileId>,
    pub linked: bool,
}

/// A node of the tile tree.
pub struct Tile {
    id: TileId,
    parent: Option<TileId>,
    pub(crate) children: Vec<TileId>,
    depth: u32,
    bounding_volume: BoundingVolume,
    geometric_error: f64,
    refine: TileRefine,
    content: Option<ContentDescriptor>,
    pub(crate) children_state: ChildrenState,

    pub(crate) load_state: TileLoadState,
    pub(crate) selection: TileSelectionState,
    pub(crate) last_visited_frame: u64,
    pub(crate) byte_size: u64,
    pub(crate) payload: Option<ContentPayload>,
    pub(crate) load_resources: Option<RendererResources>,
    pub(crate) render_resources: Option<RendererResources>,
    pub(crate) fade: f32,
    pub(crate) lru: LruLink,
}

impl Tile {
    pub fn id(&self) -> TileId {
        self.id
    }

    pub fn parent(&self) -> Option<TileId> {
        self.parent
    }

    pub fn children(&self) -> &[TileId] {
        &self.children
    }

    /// Distance from the root; the root is depth 0.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn bounding_volume(&self) -> &BoundingVolume {
        &self.bounding_volume
    }

    pub fn geometric_error(&self) -> f64 {
        self.geometric_error
    }

    pub fn refine(&self) -> TileRefine {
        self.refine
    }

    pub fn content(&self) -> Option<&ContentDescriptor> {
        self.content.as_ref()
    }

    pub fn children_state(&self) -> ChildrenState {
        self.children_state
    }

    pub fn load_state(&self) -> TileLoadState {
        self.load_state
    }

    pub fn selection_state(&self) -> TileSelectionState {
        self.selection
    }

    /// Bytes of loaded content accounted against the cache budget.
    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    /// Decoded content, present from `ContentLoaded` until unload.
    pub fn payload(&self) -> Option<&ContentPayload> {
        self.payload.as_ref()
    }

    /// Main-thread renderer resources, present once the tile is `Done`.
    pub fn render_resources(&self) -> Option<&RendererResources> {
        self.render_resources.as_ref()
    }

    /// Current fade opacity in `[0, 1]`.
    pub fn fade_percentage(&self) -> f32 {
        self.fade
    }

    /// Content is fully loaded and can be drawn this frame.
    pub fn is_renderable(&self) -> bool {
        self.load_state == TileLoadState::Done
    }

    /// A tile counts as a leaf when it has no children to descend into.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty() || self.children_state != ChildrenState::Ready
    }

    /// Content occupies a slot in the loaded-tiles list.
    pub fn is_loaded(&self) -> bool {
        matches!(
            self.load_state,
            TileLoadState::ContentLoaded | TileLoadState::Done
        )
    }
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tile")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("depth", &self.depth)
            .field("geometric_error", &self.geometric_error)
            .field("refine", &self.refine)
            .field("load_state", &self.load_state)
            .field("byte_size", &self.byte_size)
            .finish_non_exhaustive()
    }
}

/// Arena of tiles. The root is always [`TileTree::root`].
#[derive(Debug)]
pub struct TileTree {
    tiles: Vec<Tile>,
}

impl TileTree {
    /// Build the tree from a root description, depth-first.
    #[must_use]
    pub fn from_description(root: TileDescription) -> Self {
        let mut tree = Self { tiles: Vec::new() };
        tree.insert(root, None, 0);
        tree
    }

    pub fn root(&self) -> TileId {
        TileId(0)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn get(&self, id: TileId) -> Option<&Tile> {
        self.tiles.get(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Tile> {
        self.tiles.iter_mut()
    }

    /// Attach discovered children to a tile that had none.
    pub(crate) fn attach_children(&mut self, parent: TileId, children: Vec<TileDescription>) {
        let depth = self[parent].depth + 1;
        let ids = children
            .into_iter()
            .map(|child| self.insert(child, Some(parent), depth))
            .collect();
        let tile = &mut self[parent];
        tile.children = ids;
        tile.children_state = ChildrenState::Ready;
    }

    fn insert(&mut self, desc: TileDescription, parent: Option<TileId>, depth: u32) -> TileId {
        let id = TileId(self.tiles.len() as u32);
        let children_state = if desc.children_pending && desc.children.is_empty() {
            ChildrenState::Pending
        } else {
            ChildrenState::Ready
        };
        self.tiles.push(Tile {
            id,
            parent,
            children: Vec::new(),
            depth,
            bounding_volume: desc.bounding_volume,
            geometric_error: desc.geometric_error,
            refine: desc.refine,
            content: desc.content,
            children_state,
            load_state: TileLoadState::Unloaded,
            selection: TileSelectionState::default(),
            last_visited_frame: 0,
            byte_size: 0,
            payload: None,
            load_resources: None,
            render_resources: None,
            fade: 0.0,
            lru: LruLink::default(),
        });
        let children: Vec<TileId> = desc
            .children
            .into_iter()
            .map(|child| self.insert(child, Some(id), depth + 1))
            .collect();
        self[id].children = children;
        id
    }

    /// Iterate the strict ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: TileId) -> impl Iterator<Item = TileId> + '_ {
        std::iter::successors(self.get(id).and_then(Tile::parent), move |&current| {
            self.get(current).and_then(Tile::parent)
        })
    }

    /// Whether `ancestor` is a strict ancestor of `descendant`.
    pub fn is_ancestor(&self, ancestor: TileId, descendant: TileId) -> bool {
        self.ancestors(descendant).any(|id| id == ancestor)
    }
}

impl Index<TileId> for TileTree {
    type Output = Tile;

    fn index(&self, id: TileId) -> &Tile {
        &self.tiles[id.index()]
    }
}

impl IndexMut<TileId> for TileTree {
    fn index_mut(&mut self, id: TileId) -> &mut Tile {
        &mut self.tiles[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    fn unit_box() -> BoundingVolume {
        BoundingVolume::aabb(DVec3::ZERO, DVec3::ONE)
    }

    fn small_tree() -> TileTree {
        let leaf = TileDescription::new(unit_box(), 0.0);
        let mid = TileDescription::new(unit_box(), 1.0).with_children(vec![leaf.clone(), leaf]);
        TileTree::from_description(TileDescription::new(unit_box(), 2.0).with_children(vec![mid]))
    }

    #[test]
    fn test_tree_links_parents_and_depths() {
        let tree = small_tree();
        assert_eq!(tree.len(), 4);
        let root = tree.root();
        let mid = tree[root].children()[0];
        assert_eq!(tree[mid].parent(), Some(root));
        assert_eq!(tree[mid].depth(), 1);
        for &leaf in tree[mid].children() {
            assert_eq!(tree[leaf].depth(), 2);
            assert!(tree[leaf].is_leaf());
        }
    }

    #[test]
    fn test_is_ancestor_is_strict() {
        let tree = small_tree();
        let root = tree.root();
        let mid = tree[root].children()[0];
        let leaf = tree[mid].children()[1];
        assert!(tree.is_ancestor(root, leaf));
        assert!(tree.is_ancestor(mid, leaf));
        assert!(!tree.is_ancestor(leaf, leaf), "a tile is not its own ancestor");
        assert!(!tree.is_ancestor(leaf, root));
        assert_eq!(tree.ancestors(leaf).collect::<Vec<_>>(), vec![mid, root]);
    }

    #[test]
    fn test_attach_children_resolves_pending_state() {
        let mut tree =
            TileTree::from_description(TileDescription::new(unit_box(), 1.0).with_pending_children());
        let root = tree.root();
        assert_eq!(tree[root].children_state(), ChildrenState::Pending);
        assert!(tree[root].is_leaf(), "pending children are not traversable");

        tree.attach_children(root, vec![TileDescription::new(unit_box(), 0.0)]);
        assert_eq!(tree[root].children_state(), ChildrenState::Ready);
        assert_eq!(tree[root].children().len(), 1);
        assert!(!tree[root].is_leaf());
    }

    #[test]
    fn test_selection_state_is_frame_scoped() {
        let state = TileSelectionState::new(5, SelectionResult::Rendered);
        assert_eq!(state.result(5), SelectionResult::Rendered);
        assert_eq!(state.result(6), SelectionResult::None);
    }

    #[test]
    fn test_kick_preserves_original_result() {
        let mut rendered = TileSelectionState::new(3, SelectionResult::Rendered);
        rendered.kick();
        assert_eq!(rendered.result(3), SelectionResult::RenderedAndKicked);
        assert_eq!(rendered.original_result(3), SelectionResult::Rendered);
        assert!(rendered.was_kicked(3));

        let mut culled = TileSelectionState::new(3, SelectionResult::Culled);
        culled.kick();
        assert_eq!(culled.result(3), SelectionResult::Culled, "only selected tiles are kicked");
    }
}
