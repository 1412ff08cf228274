#![warn(missing_docs)]

//! Math types for the brushwork geometry kernel.
//!
//! Thin wrappers around nalgebra providing the domain types the
//! brush kernel works in: points, directions, planes, rays, axis-aligned
//! boxes, and the tolerance constants used for plane-side classification.

use nalgebra::{Unit, Vector3};
use serde::{Deserialize, Serialize};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// A unit (normalized) direction vector in 3D space.
pub type Dir3 = Unit<Vector3<f64>>;

// ====== Tolerances ======

/// Base linear tolerance for exact-ish comparisons.
pub const EPSILON: f64 = 1e-9;

/// Tolerance for classifying a point against a plane.
///
/// Map coordinates are large (hundreds to thousands of units), so
/// plane-side classification runs with a much coarser epsilon than
/// the base tolerance.
pub const POINT_STATUS_EPSILON: f64 = 1e-2;

/// Dot-product tolerance for parallel/antiparallel direction tests.
pub const COLINEAR_EPSILON: f64 = 1e-5;

/// Minimum length of a polyhedron edge, in world units.
pub const MIN_EDGE_LENGTH: f64 = 0.01;

/// Epsilon scaled to the magnitude of the values being compared.
pub fn scaled_eps(magnitude: f64) -> f64 {
    EPSILON * magnitude.abs().max(1.0)
}

/// Check if a scalar is effectively zero.
pub fn is_zero(v: f64, eps: f64) -> bool {
    v.abs() < eps
}

/// Check if two scalars are equal within `eps`.
pub fn is_equal(a: f64, b: f64, eps: f64) -> bool {
    is_zero(a - b, eps)
}

/// Check if two points are coincident within `eps`.
pub fn points_equal(a: &Point3, b: &Point3, eps: f64) -> bool {
    (a - b).norm() < eps
}

// ====== Approximate comparison wrapper ======

/// A scalar paired with an epsilon, comparing tolerantly.
///
/// `Approx::new(a, eps) == b` holds when `|a - b| <= eps`, and the
/// ordering operators treat approximately equal values as equal:
/// `Approx::new(a, eps) < b` only when `b - a > eps`. The relation is
/// symmetric in its arguments but, like all tolerant comparisons, not
/// transitive.
#[derive(Debug, Clone, Copy)]
pub struct Approx {
    value: f64,
    epsilon: f64,
}

impl Approx {
    /// Wrap `value` with an explicit epsilon.
    pub fn new(value: f64, epsilon: f64) -> Self {
        Self { value, epsilon }
    }

    /// Wrap `value` with the base tolerance scaled to its magnitude.
    pub fn auto(value: f64) -> Self {
        Self::new(value, scaled_eps(value))
    }

    /// The wrapped value.
    pub fn value(&self) -> f64 {
        self.value
    }
}

impl PartialEq<f64> for Approx {
    fn eq(&self, other: &f64) -> bool {
        (self.value - other).abs() <= self.epsilon
    }
}

impl PartialEq for Approx {
    fn eq(&self, other: &Self) -> bool {
        (self.value - other.value).abs() <= self.epsilon.max(other.epsilon)
    }
}

impl PartialOrd<f64> for Approx {
    fn partial_cmp(&self, other: &f64) -> Option<std::cmp::Ordering> {
        if self == other {
            Some(std::cmp::Ordering::Equal)
        } else {
            self.value.partial_cmp(other)
        }
    }
}

impl PartialOrd for Approx {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        if self == other {
            Some(std::cmp::Ordering::Equal)
        } else {
            self.value.partial_cmp(&other.value)
        }
    }
}

// ====== Plane ======

/// Which side of a plane a point lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointStatus {
    /// On the positive (normal) side.
    Above,
    /// On the negative side.
    Below,
    /// Within tolerance of the plane.
    Inside,
}

/// An oriented plane in constant-normal form: `x · normal == distance`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane3 {
    /// Unit normal of the plane.
    pub normal: Dir3,
    /// Signed distance from the origin along the normal.
    pub distance: f64,
}

impl Plane3 {
    /// Plane through `point` with the given normal direction.
    pub fn from_point_normal(point: &Point3, normal: Dir3) -> Self {
        Self {
            normal,
            distance: point.coords.dot(normal.as_ref()),
        }
    }

    /// Plane through three points, with the normal of the
    /// counter-clockwise winding.
    ///
    /// Returns `None` when the points are (nearly) collinear.
    pub fn from_points(p1: &Point3, p2: &Point3, p3: &Point3) -> Option<Self> {
        let cross = (p3 - p2).cross(&(p1 - p2));
        let norm = cross.norm();
        if norm < EPSILON {
            return None;
        }
        let normal = Unit::new_unchecked(cross / norm);
        Some(Self::from_point_normal(p2, normal))
    }

    /// An arbitrary point on the plane.
    pub fn anchor(&self) -> Point3 {
        Point3::origin() + self.normal.as_ref() * self.distance
    }

    /// Signed distance of `point` from the plane (positive above).
    pub fn signed_distance(&self, point: &Point3) -> f64 {
        point.coords.dot(self.normal.as_ref()) - self.distance
    }

    /// Classify `point` against the plane with tolerance `eps`.
    pub fn point_status(&self, point: &Point3, eps: f64) -> PointStatus {
        let dist = self.signed_distance(point);
        if dist > eps {
            PointStatus::Above
        } else if dist < -eps {
            PointStatus::Below
        } else {
            PointStatus::Inside
        }
    }

    /// Orthogonal projection of `point` onto the plane.
    pub fn project_point(&self, point: &Point3) -> Point3 {
        point - self.normal.as_ref() * self.signed_distance(point)
    }

    /// The same plane with its orientation reversed.
    pub fn flipped(&self) -> Self {
        Self {
            normal: -self.normal,
            distance: -self.distance,
        }
    }

    /// The plane translated by `delta`.
    pub fn translated(&self, delta: &Vec3) -> Self {
        Self {
            normal: self.normal,
            distance: self.distance + delta.dot(self.normal.as_ref()),
        }
    }

    /// Signed distance along the infinite line through `origin` in
    /// `direction` to the plane.
    ///
    /// Unlike [`Plane3::intersect_ray`] the result may be negative.
    /// `None` when the line is parallel to the plane.
    pub fn intersect_line(&self, origin: &Point3, direction: &Vec3) -> Option<f64> {
        let denom = direction.dot(self.normal.as_ref());
        if denom.abs() < EPSILON {
            return None;
        }
        Some(-self.signed_distance(origin) / denom)
    }

    /// Distance along `ray` to the plane.
    ///
    /// `None` when the ray is parallel to the plane (unless its origin
    /// lies on it, which yields `Some(0.0)`) or the plane is behind the
    /// ray origin.
    pub fn intersect_ray(&self, ray: &Ray3) -> Option<f64> {
        let denom = ray.direction.dot(self.normal.as_ref());
        let dist = self.signed_distance(&ray.origin);
        if denom.abs() < EPSILON {
            if dist.abs() < EPSILON {
                return Some(0.0);
            }
            return None;
        }
        let t = -dist / denom;
        if t < -EPSILON {
            None
        } else {
            Some(t.max(0.0))
        }
    }
}

// ====== Ray ======

/// A half-infinite line with an origin and unit direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray3 {
    /// Start point of the ray.
    pub origin: Point3,
    /// Unit direction the ray travels in.
    pub direction: Dir3,
}

impl Ray3 {
    /// Create a ray, normalizing `direction`.
    pub fn new(origin: Point3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: Unit::new_normalize(direction),
        }
    }

    /// The point at `distance` along the ray.
    pub fn point_at(&self, distance: f64) -> Point3 {
        self.origin + self.direction.as_ref() * distance
    }
}

// ====== Axis-aligned bounding box ======

/// An axis-aligned box given by its minimal and maximal corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bbox3 {
    /// Componentwise minimal corner.
    pub min: Point3,
    /// Componentwise maximal corner.
    pub max: Point3,
}

impl Bbox3 {
    /// Box from two corners. `min` must not exceed `max` in any component.
    pub fn new(min: Point3, max: Point3) -> Self {
        debug_assert!(min.x <= max.x && min.y <= max.y && min.z <= max.z);
        Self { min, max }
    }

    /// The zero-size box at a single point.
    pub fn at_point(point: Point3) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    /// Tight box around a set of points. `None` for an empty set.
    pub fn from_points<I: IntoIterator<Item = Point3>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = Self::at_point(first);
        for p in iter {
            bbox = bbox.merged(&p);
        }
        Some(bbox)
    }

    /// This box grown to include `point`.
    pub fn merged(&self, point: &Point3) -> Self {
        Self {
            min: Point3::new(
                self.min.x.min(point.x),
                self.min.y.min(point.y),
                self.min.z.min(point.z),
            ),
            max: Point3::new(
                self.max.x.max(point.x),
                self.max.y.max(point.y),
                self.max.z.max(point.z),
            ),
        }
    }

    /// The smallest box containing both `self` and `other`.
    pub fn union(&self, other: &Self) -> Self {
        self.merged(&other.min).merged(&other.max)
    }

    /// Componentwise extent of the box.
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Center of the box.
    pub fn center(&self) -> Point3 {
        nalgebra::center(&self.min, &self.max)
    }

    /// The box translated by `delta`.
    pub fn translated(&self, delta: &Vec3) -> Self {
        Self {
            min: self.min + delta,
            max: self.max + delta,
        }
    }

    /// The box grown by `margin` on every side.
    pub fn expanded(&self, margin: f64) -> Self {
        let m = Vec3::new(margin, margin, margin);
        Self {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// Whether `point` lies inside or on the boundary, within `eps`.
    pub fn contains_point(&self, point: &Point3, eps: f64) -> bool {
        point.x >= self.min.x - eps
            && point.y >= self.min.y - eps
            && point.z >= self.min.z - eps
            && point.x <= self.max.x + eps
            && point.y <= self.max.y + eps
            && point.z <= self.max.z + eps
    }

    /// Whether `other` lies entirely inside this box.
    pub fn contains_bbox(&self, other: &Self) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.min.z <= other.min.z
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
            && self.max.z >= other.max.z
    }

    /// Whether the two boxes overlap (touching counts).
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// The eight corner points.
    pub fn vertices(&self) -> [Point3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Point3::new(lo.x, lo.y, lo.z),
            Point3::new(hi.x, lo.y, lo.z),
            Point3::new(lo.x, hi.y, lo.z),
            Point3::new(hi.x, hi.y, lo.z),
            Point3::new(lo.x, lo.y, hi.z),
            Point3::new(hi.x, lo.y, hi.z),
            Point3::new(lo.x, hi.y, hi.z),
            Point3::new(hi.x, hi.y, hi.z),
        ]
    }

    /// Distance along `ray` to the box (slab method).
    ///
    /// `Some(0.0)` when the ray origin is inside; `None` on a miss.
    pub fn intersect_ray(&self, ray: &Ray3) -> Option<f64> {
        let mut t_min = f64::NEG_INFINITY;
        let mut t_max = f64::INFINITY;
        for i in 0..3 {
            let o = ray.origin[i];
            let d = ray.direction[i];
            if d.abs() < EPSILON {
                if o < self.min[i] || o > self.max[i] {
                    return None;
                }
            } else {
                let t1 = (self.min[i] - o) / d;
                let t2 = (self.max[i] - o) / d;
                t_min = t_min.max(t1.min(t2));
                t_max = t_max.min(t1.max(t2));
            }
        }
        if t_max < t_min || t_max < 0.0 {
            None
        } else {
            Some(t_min.max(0.0))
        }
    }
}

// ====== Ray / polygon intersection ======

/// Distance along `ray` to a planar polygon given by `vertices` on `plane`.
///
/// The polygon may wind either way; callers that care about front/back
/// orientation check the sign of `ray.direction · plane.normal`.
/// `None` when the ray misses the plane or hits it outside the polygon.
pub fn polygon_intersect_ray(vertices: &[Point3], plane: &Plane3, ray: &Ray3) -> Option<f64> {
    if vertices.len() < 3 {
        return None;
    }
    let t = plane.intersect_ray(ray)?;
    let hit = ray.point_at(t);
    if point_in_polygon(vertices, &plane.normal, &hit) {
        Some(t)
    } else {
        None
    }
}

/// Area-weighted normal of a planar polygon (Newell's method).
///
/// The result points to the side from which the loop winds
/// counter-clockwise. `None` for degenerate (zero-area) loops.
pub fn polygon_normal(vertices: &[Point3]) -> Option<Dir3> {
    if vertices.len() < 3 {
        return None;
    }
    let mut n = Vec3::zeros();
    for i in 0..vertices.len() {
        let a = &vertices[i];
        let b = &vertices[(i + 1) % vertices.len()];
        n.x += (a.y - b.y) * (a.z + b.z);
        n.y += (a.z - b.z) * (a.x + b.x);
        n.z += (a.x - b.x) * (a.y + b.y);
    }
    let norm = n.norm();
    if norm < EPSILON {
        None
    } else {
        Some(Unit::new_unchecked(n / norm))
    }
}

/// Even-odd point-in-polygon test in the projection plane that drops
/// the dominant axis of `normal`.
fn point_in_polygon(vertices: &[Point3], normal: &Vec3, point: &Point3) -> bool {
    let (u, v) = projection_axes(normal);
    let px = point[u];
    let py = point[v];
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (xi, yi) = (vertices[i][u], vertices[i][v]);
        let (xj, yj) = (vertices[j][u], vertices[j][v]);
        if ((yi > py) != (yj > py)) && (px < (xj - xi) * (py - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// The two coordinate axes spanning the projection plane that drops the
/// dominant axis of `normal`.
pub fn projection_axes(normal: &Vec3) -> (usize, usize) {
    let (ax, ay, az) = (normal.x.abs(), normal.y.abs(), normal.z.abs());
    if ax >= ay && ax >= az {
        (1, 2)
    } else if ay >= az {
        (0, 2)
    } else {
        (0, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tolerance_helpers() {
        assert!(is_zero(1e-10, EPSILON));
        assert!(!is_zero(1e-8, EPSILON));
        assert!(is_equal(1.0, 1.0 + 1e-10, EPSILON));
        assert!(!is_equal(1.0, 1.001, EPSILON));
        assert!(points_equal(
            &Point3::new(1.0, 2.0, 3.0),
            &Point3::new(1.0, 2.0, 3.0 + 1e-10),
            EPSILON
        ));
    }

    #[test]
    fn test_plane_from_points() {
        let plane = Plane3::from_points(
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.0, 1.0, 0.0),
        )
        .unwrap();
        assert_relative_eq!(plane.normal.z.abs(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(plane.distance, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_plane_from_collinear_points_is_none() {
        let plane = Plane3::from_points(
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(1.0, 1.0, 1.0),
            &Point3::new(2.0, 2.0, 2.0),
        );
        assert!(plane.is_none());
    }

    #[test]
    fn test_plane_point_status() {
        let plane =
            Plane3::from_point_normal(&Point3::origin(), Dir3::new_normalize(Vec3::z()));
        let eps = POINT_STATUS_EPSILON;
        assert_eq!(
            plane.point_status(&Point3::new(0.0, 0.0, 1.0), eps),
            PointStatus::Above
        );
        assert_eq!(
            plane.point_status(&Point3::new(0.0, 0.0, -1.0), eps),
            PointStatus::Below
        );
        assert_eq!(
            plane.point_status(&Point3::new(5.0, -3.0, 0.001), eps),
            PointStatus::Inside
        );
    }

    #[test]
    fn test_plane_intersect_ray() {
        let plane =
            Plane3::from_point_normal(&Point3::new(0.0, 0.0, 2.0), Dir3::new_normalize(Vec3::z()));
        let ray = Ray3::new(Point3::origin(), Vec3::z());
        assert_relative_eq!(plane.intersect_ray(&ray).unwrap(), 2.0, epsilon = 1e-12);

        // Parallel ray misses.
        let parallel = Ray3::new(Point3::origin(), Vec3::x());
        assert!(plane.intersect_ray(&parallel).is_none());

        // Plane behind the origin.
        let away = Ray3::new(Point3::new(0.0, 0.0, 5.0), Vec3::z());
        assert!(plane.intersect_ray(&away).is_none());

        // The line intersection is signed.
        let behind = plane
            .intersect_line(&Point3::new(0.0, 0.0, 5.0), &Vec3::z())
            .unwrap();
        assert_relative_eq!(behind, -3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_plane_project_point() {
        let plane =
            Plane3::from_point_normal(&Point3::origin(), Dir3::new_normalize(Vec3::z()));
        let projected = plane.project_point(&Point3::new(3.0, 4.0, 7.0));
        assert_relative_eq!(projected.z, 0.0, epsilon = 1e-12);
        assert_relative_eq!(projected.x, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_bbox_from_points_and_queries() {
        let bbox = Bbox3::from_points([
            Point3::new(1.0, 2.0, 3.0),
            Point3::new(-1.0, 5.0, 0.0),
            Point3::new(0.0, 0.0, 4.0),
        ])
        .unwrap();
        assert_eq!(bbox.min, Point3::new(-1.0, 0.0, 0.0));
        assert_eq!(bbox.max, Point3::new(1.0, 5.0, 4.0));
        assert!(bbox.contains_point(&Point3::new(0.0, 1.0, 1.0), 0.0));
        assert!(!bbox.contains_point(&Point3::new(2.0, 1.0, 1.0), 0.0));
        assert!(Bbox3::from_points([]).is_none());
    }

    #[test]
    fn test_bbox_contains_and_intersects() {
        let outer = Bbox3::new(Point3::new(-2.0, -2.0, -2.0), Point3::new(2.0, 2.0, 2.0));
        let inner = Bbox3::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0));
        let off = Bbox3::new(Point3::new(1.5, 1.5, 1.5), Point3::new(3.0, 3.0, 3.0));
        assert!(outer.contains_bbox(&inner));
        assert!(!inner.contains_bbox(&outer));
        assert!(outer.intersects(&off));
        assert!(!inner.intersects(&off));
    }

    #[test]
    fn test_bbox_intersect_ray() {
        let bbox = Bbox3::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0));
        let hit = Ray3::new(Point3::new(-5.0, 0.0, 0.0), Vec3::x());
        assert_relative_eq!(bbox.intersect_ray(&hit).unwrap(), 4.0, epsilon = 1e-12);

        let miss = Ray3::new(Point3::new(-5.0, 2.0, 0.0), Vec3::x());
        assert!(bbox.intersect_ray(&miss).is_none());

        // Origin inside the box.
        let inside = Ray3::new(Point3::origin(), Vec3::x());
        assert_relative_eq!(bbox.intersect_ray(&inside).unwrap(), 0.0, epsilon = 1e-12);

        // Pointing away from the box.
        let away = Ray3::new(Point3::new(5.0, 0.0, 0.0), Vec3::x());
        assert!(bbox.intersect_ray(&away).is_none());
    }

    #[test]
    fn test_polygon_intersect_ray() {
        let square = [
            Point3::new(-1.0, -1.0, 0.0),
            Point3::new(1.0, -1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(-1.0, 1.0, 0.0),
        ];
        let plane =
            Plane3::from_point_normal(&Point3::origin(), Dir3::new_normalize(Vec3::z()));

        let hit = Ray3::new(Point3::new(0.5, 0.5, 3.0), -Vec3::z());
        assert_relative_eq!(
            polygon_intersect_ray(&square, &plane, &hit).unwrap(),
            3.0,
            epsilon = 1e-12
        );

        let miss = Ray3::new(Point3::new(1.5, 0.5, 3.0), -Vec3::z());
        assert!(polygon_intersect_ray(&square, &plane, &miss).is_none());
    }

    #[test]
    fn test_polygon_normal() {
        let ccw = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let n = polygon_normal(&ccw).unwrap();
        assert_relative_eq!(n.z, 1.0, epsilon = 1e-12);

        let mut cw = ccw;
        cw.reverse();
        let n = polygon_normal(&cw).unwrap();
        assert_relative_eq!(n.z, -1.0, epsilon = 1e-12);

        let degenerate = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ];
        assert!(polygon_normal(&degenerate).is_none());
    }

    #[test]
    fn test_approx_comparisons() {
        let a = Approx::new(1.0, 1e-3);
        assert!(a == 1.0005);
        assert!(a != 1.01);
        assert!(a < 1.01);
        assert!(a > 0.99);
        assert!(!(a < 1.0005));

        let b = Approx::new(1.0005, 1e-3);
        assert!(a == b);
    }

    #[test]
    fn test_scaled_eps_grows_with_magnitude() {
        assert_relative_eq!(scaled_eps(0.5), EPSILON);
        assert!(scaled_eps(1000.0) > EPSILON);
    }
}
