//! Moving vertices of a solid.
//!
//! A move is validated as a whole before it is applied: the translated
//! point set is rebuilt into a candidate hull, and the move commits only
//! if every moved vertex survives as a hull vertex and no edge falls
//! below the minimum length. A rejected move reports an error and
//! leaves the polyhedron exactly as it was.

use std::collections::HashSet;

use brushwork_math::{points_equal, Point3, Vec3, EPSILON, MIN_EDGE_LENGTH, POINT_STATUS_EPSILON};

use crate::{FaceKey, GeometryError, Polyhedron, VertexId};

impl Polyhedron {
    /// Translate the vertices at `positions` by `delta`.
    ///
    /// Returns the new positions of the moved vertices. Moving a vertex
    /// exactly onto another merges them; landing merely near one (closer
    /// than the minimum edge length) or inside the hull of the other
    /// vertices rejects the whole move. Faces that survive the move
    /// keep their stable keys.
    pub fn move_vertices(
        &mut self,
        positions: &[Point3],
        delta: &Vec3,
    ) -> Result<Vec<Point3>, GeometryError> {
        if !self.is_polyhedron() {
            return Err(GeometryError::NotAPolyhedron);
        }

        let mut moved: Vec<VertexId> = Vec::with_capacity(positions.len());
        for p in positions {
            let id = self
                .find_vertex(p, POINT_STATUS_EPSILON)
                .ok_or(GeometryError::VertexNotFound(*p))?;
            moved.push(id);
        }
        if delta.norm() < EPSILON {
            return Ok(moved
                .iter()
                .map(|&id| self.vertices[id].position)
                .collect());
        }

        let translated: Vec<(VertexId, Point3)> = self
            .vertices
            .iter()
            .map(|(id, v)| {
                if moved.contains(&id) {
                    (id, v.position + delta)
                } else {
                    (id, v.position)
                }
            })
            .collect();

        // A landing point near (but not on) another vertex would collapse
        // an edge below the minimum length, and the hull rebuild would
        // silently swallow it. Landing exactly on one is a deliberate
        // merge.
        for &id in &moved {
            let p = self.vertices[id].position + delta;
            for (other, q) in &translated {
                if *other == id {
                    continue;
                }
                let gap = (p - q).norm();
                if gap >= EPSILON && gap < MIN_EDGE_LENGTH {
                    return Err(GeometryError::InvalidMove(
                        "move would create an edge below the minimum length".into(),
                    ));
                }
            }
        }
        let moved_to: Vec<Point3> = moved
            .iter()
            .map(|&id| self.vertices[id].position + delta)
            .collect();

        let mut candidate = Polyhedron::from_points(translated.iter().map(|(_, p)| *p));
        if !candidate.is_polyhedron() {
            return Err(GeometryError::InvalidMove(
                "result would not be a solid".into(),
            ));
        }
        if !candidate.has_all_vertices(&moved_to, EPSILON) {
            return Err(GeometryError::InvalidMove(
                "moved vertex would be absorbed into the hull".into(),
            ));
        }
        if candidate.check_edge_lengths(MIN_EDGE_LENGTH).is_err() {
            return Err(GeometryError::InvalidMove(
                "move would create an edge below the minimum length".into(),
            ));
        }

        // The rebuild issued its own keys from zero. A rebuilt face
        // inherits the stable key of the original face whose translated
        // boundary it shares at least three corners with; faces with no
        // such ancestor are keyed fresh, past this polyhedron's counter.
        let expected: Vec<(FaceKey, Vec<Point3>)> = self
            .face_ids()
            .map(|id| {
                let boundary = self
                    .face_vertex_ids(id)
                    .into_iter()
                    .map(|v| {
                        if moved.contains(&v) {
                            self.vertices[v].position + delta
                        } else {
                            self.vertices[v].position
                        }
                    })
                    .collect();
                (self.faces[id].key, boundary)
            })
            .collect();
        let candidate_faces: Vec<_> = candidate.face_ids().collect();
        let mut used: HashSet<FaceKey> = HashSet::new();
        let mut next = self.next_face_key;
        for id in candidate_faces {
            let boundary = candidate.face_positions(id);
            let mut best: Option<(usize, FaceKey)> = None;
            for (key, ancestor) in &expected {
                if used.contains(key) {
                    continue;
                }
                let shared = boundary
                    .iter()
                    .filter(|p| {
                        ancestor
                            .iter()
                            .any(|q| points_equal(p, q, POINT_STATUS_EPSILON))
                    })
                    .count();
                if shared >= 3 && best.map_or(true, |(count, _)| shared > count) {
                    best = Some((shared, *key));
                }
            }
            match best {
                Some((_, key)) => {
                    used.insert(key);
                    candidate.faces[id].key = key;
                }
                None => {
                    candidate.faces[id].key = FaceKey(next);
                    next += 1;
                }
            }
        }
        candidate.next_face_key = next;

        *self = candidate;
        debug_assert!(self.check_invariant().is_ok());
        Ok(moved_to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brushwork_math::Bbox3;

    fn unit_cube() -> Polyhedron {
        Polyhedron::from_bounds(&Bbox3::new(
            Point3::new(-1.0, -1.0, -1.0),
            Point3::new(1.0, 1.0, 1.0),
        ))
    }

    fn top_corners() -> [Point3; 4] {
        [
            Point3::new(-1.0, -1.0, 1.0),
            Point3::new(1.0, -1.0, 1.0),
            Point3::new(-1.0, 1.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
        ]
    }

    #[test]
    fn test_move_top_face_up() {
        let mut cube = unit_cube();
        let moved = cube
            .move_vertices(&top_corners(), &Vec3::new(0.0, 0.0, 1.0))
            .unwrap();
        assert_eq!(moved.len(), 4);
        assert!(moved.iter().all(|p| (p.z - 2.0).abs() < 1e-9));
        assert_eq!(cube.vertex_count(), 8);
        assert_eq!(cube.face_count(), 6);
        assert!((cube.bounds().unwrap().max.z - 2.0).abs() < 1e-9);
        assert!(cube.check_invariant().is_ok());
    }

    #[test]
    fn test_move_corner_outward() {
        let mut cube = unit_cube();
        let corner = Point3::new(1.0, 1.0, 1.0);
        let moved = cube
            .move_vertices(&[corner], &Vec3::new(0.5, 0.5, 0.5))
            .unwrap();
        assert_eq!(moved, vec![Point3::new(1.5, 1.5, 1.5)]);
        assert!(cube.is_polyhedron());
        assert!(cube.has_vertex(&Point3::new(1.5, 1.5, 1.5), EPSILON));
        assert!(cube.check_invariant().is_ok());
        assert!(cube.check_convex().is_ok());
    }

    #[test]
    fn test_move_into_hull_is_rejected() {
        let mut cube = unit_cube();
        let corner = Point3::new(1.0, 1.0, 1.0);
        let result = cube.move_vertices(&[corner], &Vec3::new(-1.0, -1.0, -1.0));
        assert!(matches!(result, Err(GeometryError::InvalidMove(_))));

        // The failed move left the cube untouched.
        assert_eq!(cube.vertex_count(), 8);
        assert_eq!(cube.face_count(), 6);
        assert!(cube.has_vertex(&corner, EPSILON));
    }

    #[test]
    fn test_move_unknown_vertex() {
        let mut cube = unit_cube();
        let result = cube.move_vertices(&[Point3::new(5.0, 5.0, 5.0)], &Vec3::x());
        assert!(matches!(result, Err(GeometryError::VertexNotFound(_))));
    }

    #[test]
    fn test_move_creating_short_edge_is_rejected() {
        let mut cube = unit_cube();
        let corner = Point3::new(1.0, 1.0, 1.0);
        // Lands 0.005 above the corner below it, close enough for the
        // rebuild to swallow one of the two vertices.
        let result = cube.move_vertices(&[corner], &Vec3::new(0.0, 0.0, -1.995));
        assert!(matches!(result, Err(GeometryError::InvalidMove(_))));
        assert_eq!(cube.vertex_count(), 8);
        assert!(cube.has_vertex(&corner, EPSILON));
        assert!(!cube.has_vertex(&Point3::new(1.0, 1.0, -0.995), EPSILON));
    }

    #[test]
    fn test_move_onto_other_vertex_merges() {
        let mut cube = unit_cube();
        let corner = Point3::new(1.0, 1.0, 1.0);
        let moved = cube
            .move_vertices(&[corner], &Vec3::new(0.0, 0.0, -2.0))
            .unwrap();
        assert_eq!(moved, vec![Point3::new(1.0, 1.0, -1.0)]);
        assert_eq!(cube.vertex_count(), 7);
        assert!(cube.check_invariant().is_ok());
    }

    #[test]
    fn test_move_preserves_face_keys() {
        let mut cube = unit_cube();
        let key_of = |poly: &Polyhedron, z: f64| {
            poly.face_ids()
                .find(|&f| poly.faces[f].plane.normal.z * z > 0.9)
                .map(|f| poly.faces[f].key)
                .unwrap()
        };
        let top_before = key_of(&cube, 1.0);
        let bottom_before = key_of(&cube, -1.0);

        cube.move_vertices(&top_corners(), &Vec3::new(0.0, 0.0, 1.0))
            .unwrap();

        assert_eq!(key_of(&cube, 1.0), top_before);
        assert_eq!(key_of(&cube, -1.0), bottom_before);
    }

    #[test]
    fn test_zero_delta_is_a_no_op() {
        let mut cube = unit_cube();
        let before = cube.face_count();
        let moved = cube
            .move_vertices(&top_corners(), &Vec3::zeros())
            .unwrap();
        assert_eq!(moved.len(), 4);
        assert_eq!(cube.face_count(), before);
    }

    #[test]
    fn test_zero_delta_still_validates_vertices() {
        let mut cube = unit_cube();
        let result = cube.move_vertices(&[Point3::new(5.0, 5.0, 5.0)], &Vec3::zeros());
        assert!(matches!(result, Err(GeometryError::VertexNotFound(_))));
    }
}
