//! Ray picking over an octree of opaque handles.
//!
//! Picking is split in two: the octree narrows the candidate set to
//! handles whose nodes the ray passes through, and a caller-supplied
//! closure runs the precise intersection test and records [`Hit`]s.
//! The kernel therefore needs no knowledge of what a handle refers to.

use brushwork_math::{scaled_eps, Approx, Bbox3, Point3, Ray3};

use crate::{Octree, SpatialError};

/// Bitmask over hit-type bits.
pub type HitTypeMask = u32;

/// The kinds of things a pick ray can hit, as combinable bits.
pub mod hit_type {
    use super::HitTypeMask;

    /// An entity body.
    pub const ENTITY: HitTypeMask = 1 << 0;
    /// A brush face.
    pub const FACE: HitTypeMask = 1 << 1;
    /// A vertex manipulation handle.
    pub const VERTEX_HANDLE: HitTypeMask = 1 << 2;
    /// An edge manipulation handle.
    pub const EDGE_HANDLE: HitTypeMask = 1 << 3;
    /// A face manipulation handle.
    pub const FACE_HANDLE: HitTypeMask = 1 << 4;
    /// Every hit type.
    pub const ANY: HitTypeMask = HitTypeMask::MAX;
}

/// A single ray intersection recorded during picking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit<H> {
    /// The type bit of this hit.
    pub hit_type: HitTypeMask,
    /// Distance from the ray origin to the intersection.
    pub distance: f64,
    /// The intersection point.
    pub point: Point3,
    /// The caller's handle for what was hit.
    pub target: H,
}

impl<H> Hit<H> {
    /// A hit of the given type at `distance` along the picking ray.
    pub fn new(hit_type: HitTypeMask, distance: f64, point: Point3, target: H) -> Self {
        Self {
            hit_type,
            distance,
            point,
            target,
        }
    }

    /// Whether this hit's type is included in `mask`.
    pub fn matches(&self, mask: HitTypeMask) -> bool {
        self.hit_type & mask != 0
    }
}

/// Hits collected along one pick ray, ordered by distance.
///
/// Hits at the same distance keep their insertion order, so a test
/// that records a face before its vertex handles leaves the face
/// first within the group.
#[derive(Debug, Default)]
pub struct PickResult<H> {
    hits: Vec<Hit<H>>,
}

impl<H> PickResult<H> {
    /// An empty result.
    pub fn new() -> Self {
        Self { hits: Vec::new() }
    }

    /// Record a hit, keeping the list sorted by distance.
    pub fn add(&mut self, hit: Hit<H>) {
        let at = self
            .hits
            .partition_point(|existing| existing.distance <= hit.distance);
        self.hits.insert(at, hit);
    }

    /// Whether no hits were recorded.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Number of recorded hits.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// All hits, nearest first.
    pub fn all(&self) -> &[Hit<H>] {
        &self.hits
    }

    /// Hits whose type is in `mask`, nearest first.
    pub fn matching(&self, mask: HitTypeMask) -> impl Iterator<Item = &Hit<H>> {
        self.hits.iter().filter(move |hit| hit.matches(mask))
    }

    /// Hits matching both `mask` and `filter`, nearest first.
    pub fn filtered<'a>(
        &'a self,
        mask: HitTypeMask,
        filter: impl Fn(&Hit<H>) -> bool + 'a,
    ) -> impl Iterator<Item = &'a Hit<H>> {
        self.hits
            .iter()
            .filter(move |hit| hit.matches(mask) && filter(hit))
    }

    /// The first hit matching `mask` and `filter`, honoring occlusion.
    ///
    /// Hits are walked in groups of approximately equal distance. The
    /// first group containing a hit that matches both mask and filter
    /// yields that hit. When `ignore_occluders` is false, a closer
    /// group containing any filter-passing hit of another type blocks
    /// the pick entirely: something nearer is in the way.
    pub fn first(
        &self,
        mask: HitTypeMask,
        ignore_occluders: bool,
        filter: impl Fn(&Hit<H>) -> bool,
    ) -> Option<&Hit<H>> {
        if ignore_occluders {
            return self
                .hits
                .iter()
                .find(|hit| hit.matches(mask) && filter(hit));
        }
        let mut begin = 0;
        while begin < self.hits.len() {
            let group_distance = self.hits[begin].distance;
            let near = Approx::new(group_distance, scaled_eps(group_distance));
            let mut end = begin;
            while end < self.hits.len() && near == self.hits[end].distance {
                end += 1;
            }
            let group = &self.hits[begin..end];
            if let Some(hit) = group.iter().find(|hit| hit.matches(mask) && filter(hit)) {
                return Some(hit);
            }
            if group.iter().any(&filter) {
                // A nearer pickable hit of another type occludes the ray.
                return None;
            }
            begin = end;
        }
        None
    }
}

/// Octree-accelerated picking over caller-owned objects.
pub struct Picker<H: Clone + PartialEq> {
    octree: Octree<H>,
}

impl<H: Clone + PartialEq> Picker<H> {
    /// A picker over the given world bounds.
    pub fn new(bounds: Bbox3, min_node_size: f64) -> Self {
        Self {
            octree: Octree::new(bounds, min_node_size),
        }
    }

    /// Register an object for picking.
    pub fn add_object(&mut self, bounds: Bbox3, handle: H) -> Result<(), SpatialError> {
        self.octree.add(bounds, handle)
    }

    /// Remove a registered object.
    pub fn remove_object(&mut self, handle: &H) -> Result<(), SpatialError> {
        self.octree.remove(handle)
    }

    /// Reinsert an object whose bounds changed.
    pub fn move_object(&mut self, bounds: Bbox3, handle: H) -> Result<(), SpatialError> {
        self.octree.remove(&handle)?;
        self.octree.add(bounds, handle)
    }

    /// Number of registered objects.
    pub fn object_count(&self) -> usize {
        self.octree.len()
    }

    /// Run `test` over every candidate whose octree node the ray
    /// passes through, collecting the hits it records.
    ///
    /// The hit target type `T` is independent of the handle type, so a
    /// test can record finer-grained targets (a face of a brush, say)
    /// than the objects registered for culling.
    pub fn pick<T, F>(&self, ray: &Ray3, mut test: F) -> PickResult<T>
    where
        F: FnMut(H, &Ray3, &mut PickResult<T>),
    {
        let mut result = PickResult::new();
        for handle in self.octree.find_intersectors(ray) {
            test(handle, ray, &mut result);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use brushwork_math::Vec3;

    fn hit(hit_type: HitTypeMask, distance: f64, target: u32) -> Hit<u32> {
        Hit::new(hit_type, distance, Point3::new(distance, 0.0, 0.0), target)
    }

    #[test]
    fn test_hits_sorted_by_distance() {
        let mut result = PickResult::new();
        result.add(hit(hit_type::FACE, 3.0, 1));
        result.add(hit(hit_type::FACE, 1.0, 2));
        result.add(hit(hit_type::FACE, 2.0, 3));
        let order: Vec<u32> = result.all().iter().map(|h| h.target).collect();
        assert_eq!(order, vec![2, 3, 1]);

        let far: Vec<u32> = result
            .filtered(hit_type::FACE, |h| h.distance > 1.5)
            .map(|h| h.target)
            .collect();
        assert_eq!(far, vec![3, 1]);
    }

    #[test]
    fn test_equal_distances_keep_insertion_order() {
        let mut result = PickResult::new();
        result.add(hit(hit_type::FACE, 1.0, 1));
        result.add(hit(hit_type::VERTEX_HANDLE, 1.0, 2));
        let order: Vec<u32> = result.all().iter().map(|h| h.target).collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[test]
    fn test_first_prefers_mask_match_within_group() {
        let mut result = PickResult::new();
        result.add(hit(hit_type::FACE, 1.0, 1));
        result.add(hit(hit_type::VERTEX_HANDLE, 1.0, 2));
        let picked = result
            .first(hit_type::VERTEX_HANDLE, false, |_| true)
            .unwrap();
        assert_eq!(picked.target, 2);
    }

    #[test]
    fn test_closer_hit_occludes_farther_target() {
        let mut result = PickResult::new();
        result.add(hit(hit_type::FACE, 1.0, 1));
        result.add(hit(hit_type::ENTITY, 2.0, 2));

        // The face is in front, so the entity pick is blocked...
        assert!(result.first(hit_type::ENTITY, false, |_| true).is_none());
        // ...unless occluders are ignored.
        let picked = result.first(hit_type::ENTITY, true, |_| true).unwrap();
        assert_eq!(picked.target, 2);
    }

    #[test]
    fn test_filtered_out_hits_do_not_occlude() {
        let mut result = PickResult::new();
        result.add(hit(hit_type::FACE, 1.0, 1));
        result.add(hit(hit_type::ENTITY, 2.0, 2));

        let not_the_face = |h: &Hit<u32>| h.target != 1;
        let picked = result.first(hit_type::ENTITY, false, not_the_face).unwrap();
        assert_eq!(picked.target, 2);
    }

    #[test]
    fn test_no_match_yields_none() {
        let mut result: PickResult<u32> = PickResult::new();
        assert!(result.first(hit_type::ANY, false, |_| true).is_none());
        result.add(hit(hit_type::FACE, 1.0, 1));
        assert!(result
            .first(hit_type::EDGE_HANDLE, true, |_| true)
            .is_none());
    }

    #[test]
    fn test_picker_runs_test_only_for_candidates() {
        let bounds = Bbox3::new(Point3::new(-8.0, -8.0, -8.0), Point3::new(8.0, 8.0, 8.0));
        let mut picker = Picker::new(bounds, 1.0);
        picker
            .add_object(
                Bbox3::new(Point3::new(5.0, 5.0, 5.0), Point3::new(6.0, 6.0, 6.0)),
                1u32,
            )
            .unwrap();
        picker
            .add_object(
                Bbox3::new(Point3::new(5.0, -6.0, -6.0), Point3::new(6.0, -5.0, -5.0)),
                2u32,
            )
            .unwrap();

        let ray = Ray3::new(Point3::new(-20.0, 5.5, 5.5), Vec3::new(1.0, 0.0, 0.0));
        let result = picker.pick(&ray, |handle, ray, result| {
            // Precise test: intersect the handle's own box.
            let boxes = [
                Bbox3::new(Point3::new(5.0, 5.0, 5.0), Point3::new(6.0, 6.0, 6.0)),
                Bbox3::new(Point3::new(5.0, -6.0, -6.0), Point3::new(6.0, -5.0, -5.0)),
            ];
            if let Some(distance) = boxes[(handle - 1) as usize].intersect_ray(ray) {
                result.add(Hit::new(
                    hit_type::ENTITY,
                    distance,
                    ray.point_at(distance),
                    handle,
                ));
            }
        });

        assert_eq!(result.len(), 1);
        assert_eq!(result.all()[0].target, 1);
        assert_relative_eq!(result.all()[0].distance, 25.0, epsilon = 1e-9);
    }

    #[test]
    fn test_move_object_updates_candidates() {
        let bounds = Bbox3::new(Point3::new(-8.0, -8.0, -8.0), Point3::new(8.0, 8.0, 8.0));
        let mut picker = Picker::new(bounds, 1.0);
        let at = |p: Point3| Bbox3::new(p, p + Vec3::new(1.0, 1.0, 1.0));
        picker.add_object(at(Point3::new(5.0, 5.0, 5.0)), 1u32).unwrap();
        picker
            .move_object(at(Point3::new(5.0, -6.0, -6.0)), 1u32)
            .unwrap();
        assert_eq!(picker.object_count(), 1);
        assert!(picker.remove_object(&1).is_ok());
    }
}
