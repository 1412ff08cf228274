//! Bounded octree over axis-aligned boxes.
//!
//! Objects are stored in the smallest node that fully contains their
//! bounds, down to a configurable minimum node size. An object
//! straddling an octant split stays in the parent, so every object
//! lives in exactly one node and removal never has to search siblings
//! once the containing branch is found.

use brushwork_math::{Bbox3, Ray3};
use thiserror::Error;

/// Errors from spatial index operations.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// The object's bounds are not contained in the octree bounds.
    #[error("object bounds exceed the octree bounds")]
    ObjectTooLarge,
    /// The object was not found in the octree.
    #[error("object not present in the octree")]
    ObjectNotFound,
}

struct Entry<U> {
    bounds: Bbox3,
    object: U,
}

struct Node<U> {
    bounds: Bbox3,
    entries: Vec<Entry<U>>,
    children: Option<Box<[Node<U>; 8]>>,
}

impl<U: Clone + PartialEq> Node<U> {
    fn new(bounds: Bbox3) -> Self {
        Self {
            bounds,
            entries: Vec::new(),
            children: None,
        }
    }

    /// Bounds of the child octant at `index`, where bit `i` of the
    /// index selects the upper half along axis `i`.
    fn child_bounds(&self, index: usize) -> Bbox3 {
        let center = self.bounds.center();
        let mut min = self.bounds.min;
        let mut max = center;
        for axis in 0..3 {
            if index & (1 << axis) != 0 {
                min[axis] = center[axis];
                max[axis] = self.bounds.max[axis];
            }
        }
        Bbox3::new(min, max)
    }

    fn insert(&mut self, entry: Entry<U>, min_size: f64) {
        let child_extent = self.bounds.size() * 0.5;
        let splittable = child_extent.x.min(child_extent.y).min(child_extent.z) >= min_size;
        if splittable {
            for index in 0..8 {
                if self.child_bounds(index).contains_bbox(&entry.bounds) {
                    if self.children.is_none() {
                        let octants: [Bbox3; 8] = std::array::from_fn(|i| self.child_bounds(i));
                        self.children = Some(Box::new(octants.map(Node::new)));
                    }
                    if let Some(children) = &mut self.children {
                        children[index].insert(entry, min_size);
                    }
                    return;
                }
            }
        }
        self.entries.push(entry);
    }

    fn remove(&mut self, object: &U) -> bool {
        if let Some(position) = self.entries.iter().position(|e| &e.object == object) {
            self.entries.remove(position);
            return true;
        }
        let Some(children) = &mut self.children else {
            return false;
        };
        let removed = children.iter_mut().any(|child| child.remove(object));
        if removed && children.iter().all(Node::is_empty) {
            self.children = None;
        }
        removed
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.children.is_none()
    }

    fn contains(&self, object: &U) -> bool {
        self.entries.iter().any(|e| &e.object == object)
            || self
                .children
                .as_ref()
                .is_some_and(|children| children.iter().any(|child| child.contains(object)))
    }

    fn len(&self) -> usize {
        let below = self
            .children
            .as_ref()
            .map_or(0, |children| children.iter().map(Node::len).sum());
        self.entries.len() + below
    }

    fn collect_intersectors(&self, ray: &Ray3, out: &mut Vec<U>) {
        if self.bounds.intersect_ray(ray).is_none() {
            return;
        }
        out.extend(self.entries.iter().map(|e| e.object.clone()));
        if let Some(children) = &self.children {
            for child in children.iter() {
                child.collect_intersectors(ray, out);
            }
        }
    }
}

/// A loose-free octree with fixed outer bounds.
///
/// `U` is an opaque handle; the tree stores copies of it and compares
/// handles with `PartialEq` for removal.
pub struct Octree<U> {
    root: Node<U>,
    min_size: f64,
}

impl<U: Clone + PartialEq> Octree<U> {
    /// An empty octree covering `bounds`, never subdividing nodes
    /// below `min_size` per axis.
    pub fn new(bounds: Bbox3, min_size: f64) -> Self {
        Self {
            root: Node::new(bounds),
            min_size,
        }
    }

    /// The fixed outer bounds.
    pub fn bounds(&self) -> &Bbox3 {
        &self.root.bounds
    }

    /// Insert `object` with the given bounds.
    ///
    /// Fails when the bounds are not fully inside the octree bounds;
    /// the tree never grows to accommodate an object.
    pub fn add(&mut self, bounds: Bbox3, object: U) -> Result<(), SpatialError> {
        if !self.root.bounds.contains_bbox(&bounds) {
            return Err(SpatialError::ObjectTooLarge);
        }
        self.root.insert(Entry { bounds, object }, self.min_size);
        Ok(())
    }

    /// Remove `object`, failing when it is not present.
    pub fn remove(&mut self, object: &U) -> Result<(), SpatialError> {
        if self.root.remove(object) {
            Ok(())
        } else {
            Err(SpatialError::ObjectNotFound)
        }
    }

    /// Whether `object` is present.
    pub fn contains(&self, object: &U) -> bool {
        self.root.contains(object)
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.root.len()
    }

    /// Whether the octree stores no objects.
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Drop every object, keeping the bounds.
    pub fn clear(&mut self) {
        self.root.entries.clear();
        self.root.children = None;
    }

    /// All objects in nodes whose bounds the ray passes through.
    ///
    /// This is the broad phase: candidates are reported at node
    /// granularity and callers run their own precise test.
    pub fn find_intersectors(&self, ray: &Ray3) -> Vec<U> {
        let mut out = Vec::new();
        self.root.collect_intersectors(ray, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brushwork_math::{Point3, Vec3};

    fn tree() -> Octree<u32> {
        Octree::new(
            Bbox3::new(Point3::new(-8.0, -8.0, -8.0), Point3::new(8.0, 8.0, 8.0)),
            1.0,
        )
    }

    fn cell(min: Point3) -> Bbox3 {
        Bbox3::new(min, min + Vec3::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn test_add_remove_contains() {
        let mut octree = tree();
        octree.add(cell(Point3::new(6.0, 6.0, 6.0)), 1).unwrap();
        octree.add(cell(Point3::new(-7.0, -7.0, -7.0)), 2).unwrap();
        assert_eq!(octree.len(), 2);
        assert!(octree.contains(&1));
        assert!(!octree.contains(&3));

        octree.remove(&1).unwrap();
        assert_eq!(octree.len(), 1);
        assert!(!octree.contains(&1));
        assert!(octree.remove(&1).is_err());
    }

    #[test]
    fn test_oversized_object_rejected() {
        let mut octree = tree();
        let huge = Bbox3::new(Point3::new(-9.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        assert!(matches!(
            octree.add(huge, 1),
            Err(SpatialError::ObjectTooLarge)
        ));
        assert!(octree.is_empty());
    }

    #[test]
    fn test_ray_skips_far_octants() {
        let mut octree = tree();
        octree.add(cell(Point3::new(6.0, 6.0, 6.0)), 1).unwrap();

        // A ray confined to the lower octants never reaches the node
        // holding the object.
        let miss = Ray3::new(Point3::new(-20.0, -6.0, -6.0), Vec3::new(1.0, 0.0, 0.0));
        assert!(octree.find_intersectors(&miss).is_empty());

        let hit = Ray3::new(Point3::new(-20.0, 6.5, 6.5), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(octree.find_intersectors(&hit), vec![1]);
    }

    #[test]
    fn test_straddling_object_reported_from_the_root() {
        let mut octree = tree();
        // Straddles the center split, so it stays in the root node and
        // is a candidate for any ray entering the octree.
        let straddling = Bbox3::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0));
        octree.add(straddling, 7).unwrap();

        let corner_ray = Ray3::new(Point3::new(-20.0, 7.5, 7.5), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(octree.find_intersectors(&corner_ray), vec![7]);
    }

    #[test]
    fn test_clear() {
        let mut octree = tree();
        octree.add(cell(Point3::new(0.5, 0.5, 0.5)), 1).unwrap();
        octree.add(cell(Point3::new(-3.0, -3.0, -3.0)), 2).unwrap();
        octree.clear();
        assert!(octree.is_empty());
        assert_eq!(octree.len(), 0);
    }
}
