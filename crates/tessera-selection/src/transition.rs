//! LOD fade transitions layered over the selection result.
//!
//! Selection decides what to draw; this module only ramps opacity. Newly
//! rendered tiles fade in from zero, and tiles that leave the render set keep
//! fading out for `lod_transition_length` seconds unless their content is
//! unloaded or they are selected again.

use rustc_hash::FxHashSet;
use tessera_config::TilesetOptions;

use crate::tile::{TileId, TileTree};
use crate::view_update_result::ViewUpdateResult;

#[derive(Debug, Default)]
pub(crate) struct LodTransitions {
    fading_out: Vec<TileId>,
}

impl LodTransitions {
    pub fn fading_out(&self) -> &[TileId] {
        &self.fading_out
    }

    /// Classify this frame's render set against `previous` and advance fades.
    pub fn update(
        &mut self,
        tree: &mut TileTree,
        options: &TilesetOptions,
        delta_time: f32,
        previous: &[TileId],
        result: &mut ViewUpdateResult,
    ) {
        let current: FxHashSet<TileId> =
            result.tiles_to_render_this_frame.iter().copied().collect();
        let before: FxHashSet<TileId> = previous.iter().copied().collect();

        result.tiles_newly_rendered = result
            .tiles_to_render_this_frame
            .iter()
            .copied()
            .filter(|id| !before.contains(id))
            .collect();
        result.tiles_to_no_longer_render_this_frame = previous
            .iter()
            .copied()
            .filter(|id| !current.contains(id))
            .collect();

        if !options.enable_lod_transition_period {
            for &id in &self.fading_out {
                tree[id].fade = 0.0;
            }
            self.fading_out.clear();
            for &id in &result.tiles_to_no_longer_render_this_frame {
                tree[id].fade = 0.0;
            }
            for &id in &result.tiles_to_render_this_frame {
                tree[id].fade = 1.0;
            }
            result.tiles_fading_out.clear();
            return;
        }

        let delta = delta_time / options.lod_transition_length;

        let mut already_fading: FxHashSet<TileId> = self.fading_out.iter().copied().collect();
        for &id in &result.tiles_to_no_longer_render_this_frame {
            if tree[id].fade > 0.0 && already_fading.insert(id) {
                self.fading_out.push(id);
            }
        }

        self.fading_out.retain(|&id| {
            if current.contains(&id) {
                return false;
            }
            let tile = &mut tree[id];
            if !tile.is_renderable() {
                tile.fade = 0.0;
                return false;
            }
            tile.fade = (tile.fade - delta).max(0.0);
            tile.fade > 0.0
        });

        for &id in &result.tiles_to_render_this_frame {
            let tile = &mut tree[id];
            if tile.is_renderable() {
                tile.fade = (tile.fade + delta).min(1.0);
            }
        }

        result.tiles_fading_out.clone_from(&self.fading_out);
    }
}
