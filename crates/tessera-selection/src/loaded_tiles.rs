//! Intrusive recency list of tiles holding content.
//!
//! The links live in each [`Tile`](crate::tile::Tile); this struct only keeps
//! the ends and the length. Head is the least recently touched tile.

use crate::tile::{TileId, TileTree};

#[derive(Debug, Default)]
pub struct LoadedTiles {
    head: Option<TileId>,
    tail: Option<TileId>,
    len: usize,
}

impl LoadedTiles {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn head(&self) -> Option<TileId> {
        self.head
    }

    #[cfg(test)]
    pub fn tail(&self) -> Option<TileId> {
        self.tail
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[cfg(test)]
    pub fn contains(&self, tree: &TileTree, id: TileId) -> bool {
        tree[id].lru.linked
    }

    /// Successor of a linked tile, toward the tail.
    pub fn next(&self, tree: &TileTree, id: TileId) -> Option<TileId> {
        tree[id].lru.next
    }

    /// Append a tile at the tail, unlinking it first if already present.
    pub fn insert_at_tail(&mut self, tree: &mut TileTree, id: TileId) {
        if tree[id].lru.linked {
            if self.tail == Some(id) {
                return;
            }
            self.remove(tree, id);
        }

        let link = &mut tree[id].lru;
        link.prev = self.tail;
        link.next = None;
        link.linked = true;

        match self.tail {
            Some(tail) => tree[tail].lru.next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
    }

    /// Move a linked tile to the tail. Unlinked tiles are left alone.
    pub fn touch(&mut self, tree: &mut TileTree, id: TileId) {
        if tree[id].lru.linked {
            self.insert_at_tail(tree, id);
        }
    }

    /// Unlink a tile. No-op if it is not in the list.
    pub fn remove(&mut self, tree: &mut TileTree, id: TileId) {
        let link = tree[id].lru;
        if !link.linked {
            return;
        }

        match link.prev {
            Some(prev) => tree[prev].lru.next = link.next,
            None => self.head = link.next,
        }
        match link.next {
            Some(next) => tree[next].lru.prev = link.prev,
            None => self.tail = link.prev,
        }

        let link = &mut tree[id].lru;
        link.prev = None;
        link.next = None;
        link.linked = false;
        self.len -= 1;
    }

    /// Iterate from head to tail.
    pub fn iter<'a>(&self, tree: &'a TileTree) -> impl Iterator<Item = TileId> + 'a {
        std::iter::successors(self.head, move |&id| tree[id].lru.next)
    }
}
