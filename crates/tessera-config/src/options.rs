//! Per-tileset selection options.
//!
//! A [`TilesetOptions`] value is handed to the tileset at construction and read
//! (never mutated) by every `update_view` call.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Fog density to apply at a given camera height.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FogDensityAtHeight {
    /// Camera height above the surface, in meters.
    pub camera_height: f64,
    /// Fog density at that height. Zero disables fog culling.
    pub fog_density: f64,
}

/// The fog density table used by default: denser near the ground, fading to
/// nothing at one thousand kilometers.
#[must_use]
pub fn default_fog_density_table() -> Vec<FogDensityAtHeight> {
    const TABLE: [(f64, f64); 21] = [
        (359.393, 2.0e-5),
        (800.749, 2.0e-4),
        (1275.6501, 1.0e-4),
        (2151.1192, 7.0e-5),
        (3141.7763, 5.0e-5),
        (4777.5198, 4.0e-5),
        (6281.2493, 3.0e-5),
        (12364.307, 1.9e-5),
        (15900.765, 1.0e-5),
        (49889.0549, 8.5e-6),
        (78026.8259, 6.2e-6),
        (99260.7344, 5.8e-6),
        (120036.3873, 5.3e-6),
        (151011.0158, 5.2e-6),
        (156091.1953, 5.1e-6),
        (203849.3112, 4.2e-6),
        (274866.9803, 4.0e-6),
        (319916.3149, 3.4e-6),
        (493552.0528, 2.6e-6),
        (628733.5874, 2.2e-6),
        (1000000.0, 0.0),
    ];
    TABLE
        .iter()
        .map(|&(camera_height, fog_density)| FogDensityAtHeight {
            camera_height,
            fog_density,
        })
        .collect()
}

/// Options controlling tile selection, loading, caching, and fading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TilesetOptions {
    /// Maximum screen-space error, in pixels, a rendered tile may have.
    pub maximum_screen_space_error: f64,
    /// Maximum number of worker-thread tile loads in flight at once.
    pub maximum_simultaneous_tile_loads: u32,
    /// Number of not-yet-renderable descendants above which an ancestor is
    /// rendered in their place.
    pub loading_descendant_limit: u32,
    /// Queue refined (not rendered) tiles at preload priority so zooming out is fast.
    pub preload_ancestors: bool,
    /// Skip tiles outside every view frustum.
    pub enable_frustum_culling: bool,
    /// Skip tiles hidden by fog.
    pub enable_fog_culling: bool,
    /// Refine culled-but-visited tiles against `culled_screen_space_error`.
    pub enforce_culled_screen_space_error: bool,
    /// Screen-space error used for culled tiles when frustum or fog culling is off.
    pub culled_screen_space_error: f64,
    /// Cache size, in bytes, above which unused tiles are unloaded.
    pub maximum_cached_bytes: u64,
    /// Optional cap on the number of loaded tiles.
    pub maximum_cached_tiles: Option<usize>,
    /// Wall-clock budget for the per-frame unload pass, in milliseconds.
    pub unload_time_budget_ms: f64,
    /// Wall-clock budget for main-thread load finalization, in milliseconds.
    /// Zero means no limit.
    pub main_thread_loading_time_limit_ms: f64,
    /// Test visibility against the union of a tile's children bounds.
    pub cull_with_children_bounds: bool,
    /// Consult the occlusion proxy provider, when one is registered.
    pub enable_occlusion_culling: bool,
    /// Fade tiles in and out instead of popping.
    pub enable_lod_transition_period: bool,
    /// Length of a fade, in seconds.
    pub lod_transition_length: f32,
    /// Fog density by camera height, sorted by ascending height.
    pub fog_density_table: Vec<FogDensityAtHeight>,
}

impl Default for TilesetOptions {
    fn default() -> Self {
        Self {
            maximum_screen_space_error: 16.0,
            maximum_simultaneous_tile_loads: 20,
            loading_descendant_limit: 20,
            preload_ancestors: true,
            enable_frustum_culling: true,
            enable_fog_culling: true,
            enforce_culled_screen_space_error: true,
            culled_screen_space_error: 64.0,
            maximum_cached_bytes: 512 * 1024 * 1024,
            maximum_cached_tiles: None,
            unload_time_budget_ms: 2.0,
            main_thread_loading_time_limit_ms: 0.0,
            cull_with_children_bounds: false,
            enable_occlusion_culling: true,
            enable_lod_transition_period: false,
            lod_transition_length: 1.0,
            fog_density_table: default_fog_density_table(),
        }
    }
}

impl TilesetOptions {
    /// Reject option combinations the selection engine cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.maximum_screen_space_error > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "maximum_screen_space_error must be positive, got {}",
                self.maximum_screen_space_error
            )));
        }
        if self.maximum_simultaneous_tile_loads == 0 {
            return Err(ConfigError::Invalid(
                "maximum_simultaneous_tile_loads must be at least 1".to_string(),
            ));
        }
        if self.enable_lod_transition_period && !(self.lod_transition_length > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "lod_transition_length must be positive, got {}",
                self.lod_transition_length
            )));
        }
        if self.unload_time_budget_ms < 0.0 || self.main_thread_loading_time_limit_ms < 0.0 {
            return Err(ConfigError::Invalid(
                "time budgets must not be negative".to_string(),
            ));
        }
        let sorted = self
            .fog_density_table
            .windows(2)
            .all(|pair| pair[0].camera_height <= pair[1].camera_height);
        if !sorted {
            return Err(ConfigError::Invalid(
                "fog_density_table must be sorted by camera height".to_string(),
            ));
        }
        Ok(())
    }
}
