//! Per-frame load queues, ordered by priority group then by priority value.

use std::cmp::Ordering;

use crate::tile::TileId;

/// Coarse load priority. Higher groups are serviced first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorityGroup {
    /// Not needed this frame; loaded so zooming or panning is instant.
    Preload,
    /// Needed to render this frame.
    Normal,
    /// Blocks a coarser tile the camera is waiting for.
    Urgent,
}

/// A request to load one tile's content.
#[derive(Debug, Clone, Copy)]
pub struct TileLoadTask {
    pub tile: TileId,
    pub group: PriorityGroup,
    /// Lower values load sooner within a group.
    pub priority: f64,
}

impl PartialEq for TileLoadTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TileLoadTask {}

impl PartialOrd for TileLoadTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Service order: `Less` loads first.
impl Ord for TileLoadTask {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .group
            .cmp(&self.group)
            .then_with(|| self.priority.total_cmp(&other.priority))
            .then_with(|| self.tile.cmp(&other.tile))
    }
}

/// The two queues filled by one traversal.
///
/// Tasks in the worker queue still need a worker-thread fetch; tasks in the
/// main queue only need main-thread finalization of content already fetched.
#[derive(Debug, Default)]
pub struct LoadQueue {
    worker: Vec<TileLoadTask>,
    main: Vec<TileLoadTask>,
}

impl LoadQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget last frame's tasks.
    pub fn clear(&mut self) {
        self.worker.clear();
        self.main.clear();
    }

    pub fn push_worker(&mut self, task: TileLoadTask) {
        self.worker.push(task);
    }

    pub fn push_main(&mut self, task: TileLoadTask) {
        self.main.push(task);
    }

    /// Put both queues in service order.
    pub fn sort(&mut self) {
        self.worker.sort_unstable();
        self.main.sort_unstable();
    }

    /// Worker-thread tasks, in service order once [`LoadQueue::sort`] ran.
    pub fn worker(&self) -> &[TileLoadTask] {
        &self.worker
    }

    /// Main-thread tasks, in service order once [`LoadQueue::sort`] ran.
    pub fn main(&self) -> &[TileLoadTask] {
        &self.main
    }

    pub fn is_empty(&self) -> bool {
        self.worker.is_empty() && self.main.is_empty()
    }

    /// Number of tasks in `group` across both queues.
    #[cfg(test)]
    pub fn count_in_group(&self, group: PriorityGroup) -> usize {
        self.worker
            .iter()
            .chain(&self.main)
            .filter(|task| task.group == group)
            .count()
    }
}
