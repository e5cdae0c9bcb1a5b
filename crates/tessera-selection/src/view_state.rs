//! Camera view states: culling volume, distances, and screen-space error.

use glam::{DVec2, DVec3};

use crate::bounds::{BoundingVolume, CullingResult, Plane};

/// Four inward-facing side planes through the camera position.
///
/// There is no near or far plane: anything in front of the camera inside the
/// field of view is visible, however far away.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CullingVolume {
    pub left: Plane,
    pub right: Plane,
    pub top: Plane,
    pub bottom: Plane,
}

impl CullingVolume {
    /// Build the side planes of a symmetric perspective frustum.
    #[must_use]
    pub fn from_camera(
        position: DVec3,
        direction: DVec3,
        up: DVec3,
        horizontal_fov: f64,
        vertical_fov: f64,
    ) -> Self {
        let right = direction.cross(up);
        let tan_h = (0.5 * horizontal_fov).tan();
        let tan_v = (0.5 * vertical_fov).tan();

        let left_edge = direction - right * tan_h;
        let right_edge = direction + right * tan_h;
        let bottom_edge = direction - up * tan_v;
        let top_edge = direction + up * tan_v;

        Self {
            left: Plane::from_point_normal(position, left_edge.cross(up)),
            right: Plane::from_point_normal(position, up.cross(right_edge)),
            bottom: Plane::from_point_normal(position, right.cross(bottom_edge)),
            top: Plane::from_point_normal(position, top_edge.cross(right)),
        }
    }

    /// Whether any part of the volume may be inside all four planes.
    #[must_use]
    pub fn is_visible(&self, volume: &BoundingVolume) -> bool {
        [&self.left, &self.right, &self.top, &self.bottom]
            .into_iter()
            .all(|plane| volume.intersect_plane(plane) != CullingResult::Outside)
    }
}

/// One camera the tileset is being viewed from this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    position: DVec3,
    direction: DVec3,
    up: DVec3,
    viewport_size: DVec2,
    horizontal_fov: f64,
    vertical_fov: f64,
    height: Option<f64>,
    sse_denominator: f64,
    culling_volume: CullingVolume,
}

impl ViewState {
    /// Create a view state. `direction` and `up` are normalized and `up` is
    /// re-orthogonalized against `direction`. Fields of view are in radians.
    #[must_use]
    pub fn new(
        position: DVec3,
        direction: DVec3,
        up: DVec3,
        viewport_size: DVec2,
        horizontal_fov: f64,
        vertical_fov: f64,
    ) -> Self {
        let direction = direction.normalize_or_zero();
        let right = direction.cross(up).normalize_or_zero();
        let up = right.cross(direction);
        Self {
            position,
            direction,
            up,
            viewport_size,
            horizontal_fov,
            vertical_fov,
            height: None,
            sse_denominator: 2.0 * (0.5 * vertical_fov).tan(),
            culling_volume: CullingVolume::from_camera(
                position,
                direction,
                up,
                horizontal_fov,
                vertical_fov,
            ),
        }
    }

    /// Create a view state looking from `position` at `target`, deriving the
    /// horizontal field of view from the viewport aspect ratio.
    #[must_use]
    pub fn look_at(
        position: DVec3,
        target: DVec3,
        up: DVec3,
        viewport_size: DVec2,
        vertical_fov: f64,
    ) -> Self {
        let aspect = if viewport_size.y > 0.0 {
            viewport_size.x / viewport_size.y
        } else {
            1.0
        };
        let horizontal_fov = 2.0 * ((0.5 * vertical_fov).tan() * aspect).atan();
        Self::new(
            position,
            target - position,
            up,
            viewport_size,
            horizontal_fov,
            vertical_fov,
        )
    }

    /// Attach the camera's height above the surface, used to look up fog density.
    #[must_use]
    pub fn with_height(mut self, height: f64) -> Self {
        self.height = Some(height);
        self
    }

    pub fn position(&self) -> DVec3 {
        self.position
    }

    pub fn direction(&self) -> DVec3 {
        self.direction
    }

    pub fn up(&self) -> DVec3 {
        self.up
    }

    pub fn viewport_size(&self) -> DVec2 {
        self.viewport_size
    }

    pub fn horizontal_fov(&self) -> f64 {
        self.horizontal_fov
    }

    pub fn vertical_fov(&self) -> f64 {
        self.vertical_fov
    }

    /// Camera height above the surface, if the host supplied one.
    pub fn height(&self) -> Option<f64> {
        self.height
    }

    /// `2 * tan(vertical_fov / 2)`.
    pub fn sse_denominator(&self) -> f64 {
        self.sse_denominator
    }

    pub fn culling_volume(&self) -> &CullingVolume {
        &self.culling_volume
    }

    /// Whether the volume intersects this view's frustum.
    #[must_use]
    pub fn is_bounding_volume_visible(&self, volume: &BoundingVolume) -> bool {
        self.culling_volume.is_visible(volume)
    }

    /// Squared distance from the camera to the volume; zero if the camera is inside.
    #[must_use]
    pub fn compute_distance_squared_to_bounding_volume(&self, volume: &BoundingVolume) -> f64 {
        volume.distance_squared_to(self.position)
    }

    /// Screen-space error in pixels of rendering `geometric_error` at `distance`.
    #[must_use]
    pub fn compute_screen_space_error(&self, geometric_error: f64, distance: f64) -> f64 {
        // Camera inside the volume: avoid dividing by zero.
        let distance = distance.max(1e-7);
        (geometric_error * self.viewport_size.y) / (distance * self.sse_denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    /// Camera ten meters above the origin looking straight down.
    fn top_down() -> ViewState {
        ViewState::new(
            DVec3::new(0.0, 0.0, 10.0),
            DVec3::NEG_Z,
            DVec3::Y,
            DVec2::new(100.0, 100.0),
            FRAC_PI_2,
            FRAC_PI_2,
        )
    }

    #[test]
    fn test_volume_in_front_is_visible() {
        let view = top_down();
        let below = BoundingVolume::sphere(DVec3::ZERO, 1.0);
        assert!(view.is_bounding_volume_visible(&below));
    }

    #[test]
    fn test_volume_behind_is_culled() {
        let view = top_down();
        let above = BoundingVolume::sphere(DVec3::new(0.0, 0.0, 30.0), 1.0);
        assert!(!view.is_bounding_volume_visible(&above));
    }

    /// At 90 degrees, the visible half-width equals the distance.
    #[test]
    fn test_volume_outside_side_plane_is_culled() {
        let view = top_down();
        let far_right = BoundingVolume::sphere(DVec3::new(25.0, 0.0, 0.0), 1.0);
        let edge = BoundingVolume::sphere(DVec3::new(10.5, 0.0, 0.0), 1.0);
        assert!(!view.is_bounding_volume_visible(&far_right));
        assert!(view.is_bounding_volume_visible(&edge));
    }

    #[test]
    fn test_screen_space_error_scales_inversely_with_distance() {
        let view = top_down();
        // denominator = 2 * tan(45deg) = 2, viewport height 100
        let near = view.compute_screen_space_error(10.0, 25.0);
        let far = view.compute_screen_space_error(10.0, 50.0);
        assert!((near - 20.0).abs() < 1e-9, "got {near}");
        assert!((far - 10.0).abs() < 1e-9, "got {far}");
    }

    #[test]
    fn test_zero_distance_does_not_divide_by_zero() {
        let view = top_down();
        assert!(view.compute_screen_space_error(1.0, 0.0).is_finite());
    }

    #[test]
    fn test_distance_to_volume() {
        let view = top_down();
        let volume = BoundingVolume::aabb(DVec3::new(-5.0, -5.0, -1.0), DVec3::new(5.0, 5.0, 0.0));
        assert_eq!(view.compute_distance_squared_to_bounding_volume(&volume), 100.0);
    }

    #[test]
    fn test_look_at_derives_horizontal_fov() {
        let view = ViewState::look_at(
            DVec3::new(0.0, 0.0, 10.0),
            DVec3::ZERO,
            DVec3::Y,
            DVec2::new(200.0, 100.0),
            FRAC_PI_2,
        );
        assert!(view.horizontal_fov() > view.vertical_fov());
        assert!((view.direction() - DVec3::NEG_Z).length() < 1e-12);
    }
}
