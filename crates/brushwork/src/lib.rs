#![warn(missing_docs)]

//! Convex-brush geometry kernel for 3D level editing.
//!
//! A *brush* is a convex solid whose faces carry texturing attributes.
//! This crate ties the member crates together: [`brushwork_brep`]
//! provides the half-edge solid with stable face keys, and
//! [`brushwork_spatial`] the octree-backed picking. The stable keys
//! are what lets a brush keep each face's attributes across clips and
//! vertex moves, even though the underlying mesh is rebuilt.

pub use brushwork_brep as brep;
pub use brushwork_math as math;
pub use brushwork_spatial as spatial;

pub use brushwork_brep::{ClipResult, FaceKey, GeometryError, Polyhedron};
pub use brushwork_math::{Bbox3, Plane3, Point3, Ray3, Vec3};
pub use brushwork_spatial::{hit_type, Hit, PickResult, Picker};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ====== Face attributes ======

/// Texturing attributes of one brush face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceAttributes {
    /// Name of the applied material.
    pub material: String,
    /// Texture offset along the face's U axis.
    pub x_offset: f64,
    /// Texture offset along the face's V axis.
    pub y_offset: f64,
    /// Texture rotation in degrees.
    pub rotation: f64,
    /// Texture scale along U.
    pub x_scale: f64,
    /// Texture scale along V.
    pub y_scale: f64,
}

impl FaceAttributes {
    /// Untransformed attributes with the given material.
    pub fn new(material: impl Into<String>) -> Self {
        Self {
            material: material.into(),
            x_offset: 0.0,
            y_offset: 0.0,
            rotation: 0.0,
            x_scale: 1.0,
            y_scale: 1.0,
        }
    }
}

impl Default for FaceAttributes {
    fn default() -> Self {
        Self::new("")
    }
}

// ====== Brush ======

/// A convex solid with per-face texturing attributes.
///
/// The attribute map is keyed by the polyhedron's stable face keys, so
/// it survives the mesh rebuilds that clipping and vertex moves
/// perform. After every mutation the map is pruned to the faces that
/// still exist.
#[derive(Debug, Clone)]
pub struct Brush {
    /// The solid geometry.
    pub polyhedron: Polyhedron,
    /// Attributes per stable face key.
    pub attributes: HashMap<FaceKey, FaceAttributes>,
}

impl Brush {
    /// An axis-aligned cuboid brush with `material` on every face.
    pub fn from_bounds(bounds: &Bbox3, material: impl Into<String>) -> Self {
        let polyhedron = Polyhedron::from_bounds(bounds);
        let attributes = FaceAttributes::new(material);
        let mut brush = Self {
            polyhedron,
            attributes: HashMap::new(),
        };
        for key in brush.face_keys() {
            brush.attributes.insert(key, attributes.clone());
        }
        brush
    }

    /// A brush over the convex hull of `points`, with `material` on
    /// every face. Returns `None` when the points do not span a solid.
    pub fn from_points<I: IntoIterator<Item = Point3>>(
        points: I,
        material: impl Into<String>,
    ) -> Option<Self> {
        let polyhedron = Polyhedron::from_points(points);
        if !polyhedron.is_polyhedron() {
            return None;
        }
        let attributes = FaceAttributes::new(material);
        let mut brush = Self {
            polyhedron,
            attributes: HashMap::new(),
        };
        for key in brush.face_keys() {
            brush.attributes.insert(key, attributes.clone());
        }
        Some(brush)
    }

    /// Stable keys of the current faces.
    pub fn face_keys(&self) -> Vec<FaceKey> {
        self.polyhedron
            .face_ids()
            .map(|id| self.polyhedron.face(id).key)
            .collect()
    }

    /// The attributes of the face with `key`, if both exist.
    pub fn face_attributes(&self, key: FaceKey) -> Option<&FaceAttributes> {
        self.attributes.get(&key)
    }

    /// Clip away everything above `plane`, texturing the sealing face
    /// with `new_face_attributes`.
    ///
    /// Surviving faces keep their attributes; attributes of removed
    /// faces are dropped.
    pub fn clip(
        &mut self,
        plane: &Plane3,
        new_face_attributes: FaceAttributes,
    ) -> Result<ClipResult, GeometryError> {
        let result = self.polyhedron.clip(plane)?;
        if let ClipResult::Clipped { new_face } = result {
            self.attributes.insert(new_face, new_face_attributes);
        }
        self.prune_attributes();
        Ok(result)
    }

    /// Translate the vertices at `positions` by `delta`.
    ///
    /// Surviving faces keep their attributes through the move.
    pub fn move_vertices(
        &mut self,
        positions: &[Point3],
        delta: &Vec3,
    ) -> Result<Vec<Point3>, GeometryError> {
        let moved = self.polyhedron.move_vertices(positions, delta)?;
        self.prune_attributes();
        Ok(moved)
    }

    /// The world bounds of the brush, when it has any vertices.
    pub fn bounds(&self) -> Option<Bbox3> {
        self.polyhedron.bounds()
    }

    /// Record a `FACE` hit for the nearest front face the ray strikes.
    ///
    /// Written against [`Picker::pick`]'s test-closure contract: the
    /// handle identifies this brush to the caller.
    pub fn pick<H: Copy>(&self, handle: H, ray: &Ray3, result: &mut PickResult<(H, FaceKey)>) {
        if let Some((face, distance)) = self.polyhedron.pick_face(ray) {
            result.add(Hit::new(
                hit_type::FACE,
                distance,
                ray.point_at(distance),
                (handle, self.polyhedron.face(face).key),
            ));
        }
    }

    fn prune_attributes(&mut self) {
        let live = self.face_keys();
        self.attributes.retain(|key, _| live.contains(key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use brushwork_math::Dir3;

    fn unit_brush() -> Brush {
        Brush::from_bounds(
            &Bbox3::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0)),
            "wall",
        )
    }

    #[test]
    fn test_from_bounds_textures_every_face() {
        let brush = unit_brush();
        assert_eq!(brush.polyhedron.face_count(), 6);
        assert_eq!(brush.attributes.len(), 6);
        for key in brush.face_keys() {
            assert_eq!(brush.face_attributes(key).unwrap().material, "wall");
        }
    }

    #[test]
    fn test_clip_threads_attributes() {
        let mut brush = unit_brush();
        let keys_before = brush.face_keys();

        let plane = Plane3::from_point_normal(
            &Point3::new(0.0, 0.0, 0.0),
            Dir3::new_normalize(Vec3::new(1.0, 0.0, 0.0)),
        );
        let result = brush.clip(&plane, FaceAttributes::new("cut")).unwrap();
        let ClipResult::Clipped { new_face } = result else {
            panic!("expected a real cut");
        };

        // Five original faces survive with their attributes, the cap
        // carries the new ones.
        assert_eq!(brush.attributes.len(), 6);
        assert_eq!(brush.face_attributes(new_face).unwrap().material, "cut");
        let surviving = brush
            .face_keys()
            .into_iter()
            .filter(|k| keys_before.contains(k))
            .count();
        assert_eq!(surviving, 5);
        for key in brush.face_keys() {
            if key != new_face {
                assert_eq!(brush.face_attributes(key).unwrap().material, "wall");
            }
        }
    }

    #[test]
    fn test_clip_to_nothing_drops_all_attributes() {
        let mut brush = unit_brush();
        // The whole brush lies above this plane, so nothing survives.
        let plane = Plane3::from_point_normal(
            &Point3::new(0.0, 0.0, -5.0),
            Dir3::new_normalize(Vec3::new(0.0, 0.0, 1.0)),
        );
        assert_eq!(
            brush.clip(&plane, FaceAttributes::new("cut")).unwrap(),
            ClipResult::Empty
        );
        assert!(brush.attributes.is_empty());
    }

    #[test]
    fn test_move_keeps_attributes() {
        let mut brush = unit_brush();
        let top = [
            Point3::new(-1.0, -1.0, 1.0),
            Point3::new(1.0, -1.0, 1.0),
            Point3::new(-1.0, 1.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
        ];
        brush
            .move_vertices(&top, &Vec3::new(0.0, 0.0, 1.0))
            .unwrap();
        assert_eq!(brush.attributes.len(), 6);
        for key in brush.face_keys() {
            assert_eq!(brush.face_attributes(key).unwrap().material, "wall");
        }
    }

    #[test]
    fn test_pick_through_the_picker() {
        let brush = unit_brush();
        let world = Bbox3::new(Point3::new(-16.0, -16.0, -16.0), Point3::new(16.0, 16.0, 16.0));
        let mut picker: Picker<u32> = Picker::new(world, 1.0);
        picker.add_object(brush.bounds().unwrap(), 1).unwrap();

        let ray = Ray3::new(Point3::new(-5.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        let result = picker.pick(&ray, |handle, ray, result| {
            assert_eq!(handle, 1);
            brush.pick(handle, ray, result);
        });

        let hit = result.first(hit_type::FACE, false, |_| true).unwrap();
        assert_relative_eq!(hit.distance, 4.0, epsilon = 1e-9);
        let (handle, face_key) = hit.target;
        assert_eq!(handle, 1);
        // The struck face is the -X face.
        let face = brush.polyhedron.face_by_key(face_key).unwrap();
        assert!(brush.polyhedron.face(face).plane.normal.x < -0.9);
    }

    #[test]
    fn test_attributes_serialize() {
        let attrs = FaceAttributes {
            material: "brick".into(),
            x_offset: 8.0,
            y_offset: -4.0,
            rotation: 90.0,
            x_scale: 0.5,
            y_scale: 0.5,
        };
        let json = serde_json::to_string(&attrs).unwrap();
        let back: FaceAttributes = serde_json::from_str(&json).unwrap();
        assert_eq!(back, attrs);
    }
}
