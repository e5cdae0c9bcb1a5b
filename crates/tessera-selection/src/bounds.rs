//! Bounding volumes and the plane tests the culling stage runs against them.
//!
//! All math is in f64 world space: geospatial tiles routinely sit millions of
//! meters from the origin, well past where f32 keeps centimeter precision.

use glam::{DMat3, DVec3};

/// Result of classifying a volume against a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullingResult {
    /// Entirely on the positive (inside) side of the plane.
    Inside,
    /// Entirely on the negative (outside) side of the plane.
    Outside,
    /// Straddles the plane.
    Intersecting,
}

/// A plane `normal.dot(p) + distance = 0` with a unit, inward-pointing normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: DVec3,
    pub distance: f64,
}

impl Plane {
    /// Build a plane from a normal (normalized here) and a point on the plane.
    #[must_use]
    pub fn from_point_normal(point: DVec3, normal: DVec3) -> Self {
        let normal = normal.normalize_or_zero();
        Self {
            normal,
            distance: -normal.dot(point),
        }
    }

    /// Positive inside, negative outside.
    #[must_use]
    pub fn signed_distance(&self, point: DVec3) -> f64 {
        self.normal.dot(point) + self.distance
    }

    /// Classify a sphere-like extent: `radius` is the volume's projected
    /// half-width along the plane normal.
    fn classify(&self, center: DVec3, radius: f64) -> CullingResult {
        let d = self.signed_distance(center);
        if d < -radius {
            CullingResult::Outside
        } else if d < radius {
            CullingResult::Intersecting
        } else {
            CullingResult::Inside
        }
    }
}

/// A bounding sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: DVec3,
    pub radius: f64,
}

/// An axis-aligned bounding box.
///
/// Invariant: `min <= max` on every axis; [`Aabb::new`] sorts the corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    /// Create an AABB from two corners, sorting components so `min <= max`.
    #[must_use]
    pub fn new(a: DVec3, b: DVec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Create an AABB from a center point and half-extents.
    #[must_use]
    pub fn from_center_half_extents(center: DVec3, half: DVec3) -> Self {
        Self::new(center - half, center + half)
    }

    /// Returns the center point of the AABB.
    #[must_use]
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Returns the half-extents (half-size along each axis).
    #[must_use]
    pub fn extents(&self) -> DVec3 {
        (self.max - self.min) * 0.5
    }

    /// Returns the smallest AABB enclosing both boxes.
    #[must_use]
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Squared distance from the point to the box; zero inside.
    #[must_use]
    pub fn distance_squared_to(&self, point: DVec3) -> f64 {
        let below = (self.min - point).max(DVec3::ZERO);
        let above = (point - self.max).max(DVec3::ZERO);
        (below + above).length_squared()
    }
}

/// A box with arbitrary orientation. The columns of `half_axes` are the
/// box's half-axis vectors (direction times half-length).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBoundingBox {
    pub center: DVec3,
    pub half_axes: DMat3,
}

impl OrientedBoundingBox {
    /// Projected half-width along `normal`.
    fn projected_radius(&self, normal: DVec3) -> f64 {
        normal.dot(self.half_axes.x_axis).abs()
            + normal.dot(self.half_axes.y_axis).abs()
            + normal.dot(self.half_axes.z_axis).abs()
    }

    /// Squared distance from the point to the box; zero inside.
    #[must_use]
    pub fn distance_squared_to(&self, point: DVec3) -> f64 {
        let offset = point - self.center;
        let mut distance_squared = 0.0;
        for axis in [
            self.half_axes.x_axis,
            self.half_axes.y_axis,
            self.half_axes.z_axis,
        ] {
            let half_length = axis.length();
            if half_length <= f64::EPSILON {
                continue;
            }
            let along = offset.dot(axis / half_length).abs();
            if along > half_length {
                let excess = along - half_length;
                distance_squared += excess * excess;
            }
        }
        distance_squared
    }

    /// Axis-aligned box enclosing this box.
    #[must_use]
    pub fn to_aabb(&self) -> Aabb {
        let half =
            self.half_axes.x_axis.abs() + self.half_axes.y_axis.abs() + self.half_axes.z_axis.abs();
        Aabb::from_center_half_extents(self.center, half)
    }
}

/// The bounding volume of a tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundingVolume {
    Sphere(BoundingSphere),
    Box(Aabb),
    OrientedBox(OrientedBoundingBox),
}

impl BoundingVolume {
    /// Convenience constructor for a sphere.
    #[must_use]
    pub fn sphere(center: DVec3, radius: f64) -> Self {
        Self::Sphere(BoundingSphere { center, radius })
    }

    /// Convenience constructor for an axis-aligned box.
    #[must_use]
    pub fn aabb(min: DVec3, max: DVec3) -> Self {
        Self::Box(Aabb::new(min, max))
    }

    /// Center of the volume.
    #[must_use]
    pub fn center(&self) -> DVec3 {
        match self {
            Self::Sphere(sphere) => sphere.center,
            Self::Box(aabb) => aabb.center(),
            Self::OrientedBox(obb) => obb.center,
        }
    }

    /// Classify the volume against a plane.
    #[must_use]
    pub fn intersect_plane(&self, plane: &Plane) -> CullingResult {
        match self {
            Self::Sphere(sphere) => plane.classify(sphere.center, sphere.radius),
            Self::Box(aabb) => {
                let e = aabb.extents();
                let n = plane.normal;
                let radius = e.x * n.x.abs() + e.y * n.y.abs() + e.z * n.z.abs();
                plane.classify(aabb.center(), radius)
            }
            Self::OrientedBox(obb) => {
                plane.classify(obb.center, obb.projected_radius(plane.normal))
            }
        }
    }

    /// Squared distance from a point to the volume's surface; zero inside.
    #[must_use]
    pub fn distance_squared_to(&self, point: DVec3) -> f64 {
        match self {
            Self::Sphere(sphere) => {
                let d = (point.distance(sphere.center) - sphere.radius).max(0.0);
                d * d
            }
            Self::Box(aabb) => aabb.distance_squared_to(point),
            Self::OrientedBox(obb) => obb.distance_squared_to(point),
        }
    }

    /// Axis-aligned box enclosing the volume.
    #[must_use]
    pub fn to_aabb(&self) -> Aabb {
        match self {
            Self::Sphere(sphere) => {
                Aabb::from_center_half_extents(sphere.center, DVec3::splat(sphere.radius))
            }
            Self::Box(aabb) => *aabb,
            Self::OrientedBox(obb) => obb.to_aabb(),
        }
    }

    /// Box enclosing every volume in the iterator, or `None` if it is empty.
    pub fn union_all<'a>(volumes: impl IntoIterator<Item = &'a BoundingVolume>) -> Option<Self> {
        volumes
            .into_iter()
            .map(BoundingVolume::to_aabb)
            .reduce(|a, b| a.union(&b))
            .map(BoundingVolume::Box)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn z_plane() -> Plane {
        Plane::from_point_normal(DVec3::ZERO, DVec3::Z)
    }

    #[test]
    fn test_aabb_new_sorts_corners() {
        let aabb = Aabb::new(DVec3::new(1.0, -1.0, 5.0), DVec3::new(-1.0, 1.0, 0.0));
        assert_eq!(aabb.min, DVec3::new(-1.0, -1.0, 0.0));
        assert_eq!(aabb.max, DVec3::new(1.0, 1.0, 5.0));
    }

    #[test]
    fn test_aabb_distance_zero_inside() {
        let aabb = Aabb::new(DVec3::splat(-1.0), DVec3::splat(1.0));
        assert_eq!(aabb.distance_squared_to(DVec3::new(0.5, 0.0, -0.5)), 0.0);
        assert_eq!(aabb.distance_squared_to(DVec3::new(4.0, 0.0, 0.0)), 9.0);
        assert_eq!(aabb.distance_squared_to(DVec3::new(2.0, 2.0, 0.0)), 2.0);
    }

    #[test]
    fn test_sphere_classification() {
        let plane = z_plane();
        let inside = BoundingVolume::sphere(DVec3::new(0.0, 0.0, 5.0), 1.0);
        let outside = BoundingVolume::sphere(DVec3::new(0.0, 0.0, -5.0), 1.0);
        let straddling = BoundingVolume::sphere(DVec3::new(0.0, 0.0, 0.5), 1.0);
        assert_eq!(inside.intersect_plane(&plane), CullingResult::Inside);
        assert_eq!(outside.intersect_plane(&plane), CullingResult::Outside);
        assert_eq!(straddling.intersect_plane(&plane), CullingResult::Intersecting);
    }

    #[test]
    fn test_box_classification() {
        let plane = z_plane();
        let below = BoundingVolume::aabb(DVec3::new(-1.0, -1.0, -3.0), DVec3::new(1.0, 1.0, -1.0));
        let across = BoundingVolume::aabb(DVec3::new(-1.0, -1.0, -1.0), DVec3::new(1.0, 1.0, 1.0));
        assert_eq!(below.intersect_plane(&plane), CullingResult::Outside);
        assert_eq!(across.intersect_plane(&plane), CullingResult::Intersecting);
    }

    /// A rotated box matches its axis-aligned equivalent.
    #[test]
    fn test_oriented_box_matches_aabb_when_axis_aligned() {
        let obb = OrientedBoundingBox {
            center: DVec3::new(0.0, 0.0, 3.0),
            half_axes: DMat3::from_diagonal(DVec3::new(1.0, 2.0, 1.0)),
        };
        let volume = BoundingVolume::OrientedBox(obb);
        assert_eq!(volume.intersect_plane(&z_plane()), CullingResult::Inside);
        assert!((volume.distance_squared_to(DVec3::new(0.0, 5.0, 3.0)) - 9.0).abs() < 1e-9);
        assert_eq!(obb.to_aabb().max, DVec3::new(1.0, 2.0, 4.0));
    }

    #[test]
    fn test_sphere_distance_clamps_inside() {
        let sphere = BoundingVolume::sphere(DVec3::ZERO, 2.0);
        assert_eq!(sphere.distance_squared_to(DVec3::new(1.0, 0.0, 0.0)), 0.0);
        assert!((sphere.distance_squared_to(DVec3::new(5.0, 0.0, 0.0)) - 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_union_all_encloses_every_volume() {
        let volumes = [
            BoundingVolume::sphere(DVec3::new(10.0, 0.0, 0.0), 1.0),
            BoundingVolume::aabb(DVec3::splat(-2.0), DVec3::splat(-1.0)),
        ];
        let union = BoundingVolume::union_all(volumes.iter()).unwrap().to_aabb();
        assert_eq!(union.min, DVec3::splat(-2.0));
        assert_eq!(union.max, DVec3::new(11.0, 1.0, 1.0));
        assert!(BoundingVolume::union_all(std::iter::empty::<&BoundingVolume>()).is_none());
    }
}
