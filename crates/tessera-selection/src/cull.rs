//! Stateless visibility and refinement metrics evaluated per tile per frame.

use tessera_config::{FogDensityAtHeight, TilesetOptions};

use crate::bounds::BoundingVolume;
use crate::loader::{OcclusionProxyProvider, TileOcclusionState};
use crate::tile::TileId;
use crate::traversal::FrameState;
use crate::view_state::ViewState;

/// Outcome of the cull stage for one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CullResult {
    /// Traversal should continue into this tile.
    pub should_visit: bool,
    /// The tile is not visible from any view. A culled tile may still be
    /// visited when the matching culling option is disabled.
    pub culled: bool,
}

impl Default for CullResult {
    fn default() -> Self {
        Self {
            should_visit: true,
            culled: false,
        }
    }
}

/// Mark the tile culled if no view sees `volume`.
pub fn frustum_cull(
    frame: &FrameState<'_>,
    volume: &BoundingVolume,
    enable_frustum_culling: bool,
    result: &mut CullResult,
) {
    if !result.should_visit || result.culled {
        return;
    }
    let visible = frame
        .views
        .iter()
        .any(|view| view.is_bounding_volume_visible(volume));
    if !visible {
        result.culled = true;
        if enable_frustum_culling {
            result.should_visit = false;
        }
    }
}

/// Mark the tile culled if it is lost in fog from every view.
///
/// `distances` holds the tile's distance to each view, in view order.
pub fn fog_cull(
    frame: &FrameState<'_>,
    distances: &[f64],
    enable_fog_culling: bool,
    result: &mut CullResult,
) {
    if !result.should_visit || result.culled {
        return;
    }
    let fogged = distances
        .iter()
        .zip(&frame.fog_densities)
        .all(|(&distance, &density)| !is_visible_in_fog(distance, density));
    if fogged {
        result.culled = true;
        if enable_fog_culling {
            result.should_visit = false;
        }
    }
}

/// Whether a tile at `distance` survives fog of `fog_density`.
#[must_use]
pub fn is_visible_in_fog(distance: f64, fog_density: f64) -> bool {
    if fog_density <= 0.0 {
        return true;
    }
    let fog_scalar = distance * fog_density;
    (-(fog_scalar * fog_scalar)).exp() > 0.0
}

/// Fog density for a view, interpolated linearly between the two table
/// entries that bracket the camera height. Views without a height use zero.
#[must_use]
pub fn compute_fog_density(table: &[FogDensityAtHeight], view: &ViewState) -> f64 {
    let height = view.height().unwrap_or(0.0);
    let next = table.partition_point(|entry| entry.camera_height < height);

    let Some(upper) = table.get(next) else {
        return table.last().map_or(0.0, |entry| entry.fog_density);
    };
    if next == 0 {
        return upper.fog_density;
    }
    let lower = &table[next - 1];

    let span = upper.camera_height - lower.camera_height;
    let t = if span > 0.0 {
        ((height - lower.camera_height) / span).clamp(0.0, 1.0)
    } else {
        1.0
    };
    lower.fog_density + (upper.fog_density - lower.fog_density) * t
}

/// Whether the tile is detailed enough to render instead of refining.
///
/// Uses the largest screen-space error across all views. Culled tiles are
/// held to `culled_screen_space_error` when that is enforced; otherwise they
/// never force refinement. A NaN error cannot be compared, so the tile is
/// rendered where it stands.
#[must_use]
pub fn meets_sse(
    frame: &FrameState<'_>,
    tile: TileId,
    geometric_error: f64,
    distances: &[f64],
    culled: bool,
    options: &TilesetOptions,
) -> bool {
    let mut largest_sse = 0.0_f64;
    for (view, &distance) in frame.views.iter().zip(distances) {
        let sse = view.compute_screen_space_error(geometric_error, distance);
        if sse.is_nan() {
            tracing::warn!(%tile, geometric_error, distance, "screen-space error is NaN");
            return true;
        }
        largest_sse = largest_sse.max(sse);
    }

    if culled {
        !options.enforce_culled_screen_space_error
            || largest_sse < options.culled_screen_space_error
    } else {
        largest_sse < options.maximum_screen_space_error
    }
}

/// Ask the occlusion provider about the tile, if occlusion culling is on.
#[must_use]
pub fn check_occlusion(
    provider: Option<&dyn OcclusionProxyProvider>,
    enable_occlusion_culling: bool,
    tile: TileId,
    volume: &BoundingVolume,
) -> TileOcclusionState {
    match provider {
        Some(provider) if enable_occlusion_culling => provider.occlusion_state(tile, volume),
        _ => TileOcclusionState::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{DVec2, DVec3};
    use std::f64::consts::FRAC_PI_2;
    use tessera_config::default_fog_density_table;

    fn view_at_height(height: f64) -> ViewState {
        ViewState::new(
            DVec3::new(0.0, 0.0, height),
            DVec3::NEG_Z,
            DVec3::Y,
            DVec2::new(100.0, 100.0),
            FRAC_PI_2,
            FRAC_PI_2,
        )
        .with_height(height)
    }

    fn frame(views: &[ViewState], fog_densities: Vec<f64>) -> FrameState<'_> {
        FrameState {
            views,
            fog_densities,
            last_frame_number: 0,
            current_frame_number: 1,
        }
    }

    #[test]
    fn test_fog_density_clamps_to_table_ends() {
        let table = default_fog_density_table();
        assert_eq!(compute_fog_density(&table, &view_at_height(0.0)), 2.0e-5);
        assert_eq!(compute_fog_density(&table, &view_at_height(5.0e6)), 0.0);
    }

    #[test]
    fn test_fog_density_interpolates_between_entries() {
        let table = [
            FogDensityAtHeight {
                camera_height: 100.0,
                fog_density: 1.0,
            },
            FogDensityAtHeight {
                camera_height: 200.0,
                fog_density: 3.0,
            },
        ];
        let density = compute_fog_density(&table, &view_at_height(150.0));
        assert!((density - 2.0).abs() < 1e-12, "got {density}");
    }

    #[test]
    fn test_empty_fog_table_means_no_fog() {
        assert_eq!(compute_fog_density(&[], &view_at_height(10.0)), 0.0);
    }

    #[test]
    fn test_visibility_in_fog() {
        assert!(is_visible_in_fog(1.0e9, 0.0), "zero density never fogs");
        assert!(is_visible_in_fog(100.0, 1.0e-3));
        assert!(!is_visible_in_fog(1.0e5, 1.0e-3));
    }

    #[test]
    fn test_fog_cull_respects_option() {
        let views = [view_at_height(10.0)];
        let frame = frame(&views, vec![1.0e-3]);

        let mut enabled = CullResult::default();
        fog_cull(&frame, &[1.0e5], true, &mut enabled);
        assert_eq!(
            enabled,
            CullResult {
                should_visit: false,
                culled: true
            }
        );

        let mut disabled = CullResult::default();
        fog_cull(&frame, &[1.0e5], false, &mut disabled);
        assert!(disabled.culled);
        assert!(disabled.should_visit, "culled tiles are still visited when fog culling is off");
    }

    #[test]
    fn test_frustum_cull_with_any_view() {
        let views = [
            view_at_height(10.0),
            ViewState::new(
                DVec3::new(0.0, 0.0, -10.0),
                DVec3::Z,
                DVec3::Y,
                DVec2::new(100.0, 100.0),
                FRAC_PI_2,
                FRAC_PI_2,
            ),
        ];
        let frame = frame(&views, vec![0.0, 0.0]);
        let above = BoundingVolume::sphere(DVec3::new(0.0, 0.0, 20.0), 1.0);

        let mut result = CullResult::default();
        frustum_cull(&frame, &above, true, &mut result);
        assert!(!result.culled, "second view looks up at the volume");

        let mut single = CullResult::default();
        frustum_cull(&FrameState { views: &views[..1], ..frame }, &above, true, &mut single);
        assert!(single.culled && !single.should_visit);
    }

    #[test]
    fn test_meets_sse_uses_largest_error() {
        let views = [view_at_height(10.0), view_at_height(100.0)];
        let frame = frame(&views, vec![0.0, 0.0]);
        let options = TilesetOptions::default();
        // sse = 10 * 100 / (d * 2)
        assert!(meets_sse(&frame, TileId(0), 10.0, &[100.0, 200.0], false, &options));
        assert!(!meets_sse(&frame, TileId(0), 10.0, &[100.0, 20.0], false, &options));
    }

    #[test]
    fn test_culled_tiles_use_culled_threshold() {
        let views = [view_at_height(10.0)];
        let frame = frame(&views, vec![0.0]);
        let mut options = TilesetOptions::default();
        // sse = 25: above the normal threshold, below the culled one
        assert!(!meets_sse(&frame, TileId(0), 10.0, &[20.0], false, &options));
        assert!(meets_sse(&frame, TileId(0), 10.0, &[20.0], true, &options));

        options.enforce_culled_screen_space_error = false;
        assert!(meets_sse(&frame, TileId(0), 1.0e6, &[1.0], true, &options));
    }

    #[test]
    fn test_nan_error_renders_in_place() {
        let views = [view_at_height(10.0)];
        let frame = frame(&views, vec![0.0]);
        let options = TilesetOptions::default();
        assert!(meets_sse(&frame, TileId(0), f64::NAN, &[10.0], false, &options));
    }

    struct AlwaysOccluded;

    impl OcclusionProxyProvider for AlwaysOccluded {
        fn occlusion_state(&self, _tile: TileId, _volume: &BoundingVolume) -> TileOcclusionState {
            TileOcclusionState::Occluded
        }
    }

    #[test]
    fn test_occlusion_requires_provider_and_option() {
        let volume = BoundingVolume::sphere(DVec3::ZERO, 1.0);
        let provider = AlwaysOccluded;
        assert_eq!(
            check_occlusion(Some(&provider), true, TileId(0), &volume),
            TileOcclusionState::Occluded
        );
        assert_eq!(
            check_occlusion(Some(&provider), false, TileId(0), &volume),
            TileOcclusionState::Unknown
        );
        assert_eq!(check_occlusion(None, true, TileId(0), &volume), TileOcclusionState::Unknown);
    }
}
