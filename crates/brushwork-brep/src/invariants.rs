//! Structural invariant checks.
//!
//! Each check is individually callable and reports the first violation
//! it finds. [`Polyhedron::check_invariant`] is the composite run (in
//! debug builds) after every mutation; the strict geometric checks
//! [`Polyhedron::check_convex`] and
//! [`Polyhedron::check_no_coplanar_faces`] are not part of it, because
//! tolerance-boundary configurations may violate them transiently
//! without being structurally broken. Tests apply them to final shapes.

use brushwork_math::PointStatus;

use crate::{GeometryError, Polyhedron};

fn violation(msg: impl Into<String>) -> GeometryError {
    GeometryError::InvariantViolation(msg.into())
}

impl Polyhedron {
    /// The composite structural check.
    pub fn check_invariant(&self) -> Result<(), GeometryError> {
        self.check_face_boundaries()?;
        if self.is_polyhedron() {
            self.check_closed()?;
            self.check_no_degenerate_faces()?;
            self.check_face_neighbours()?;
            self.check_vertex_leaving_edges()?;
            self.check_edges()?;
            self.check_euler_characteristic()?;
            self.check_overlapping_faces()?;
        }
        Ok(())
    }

    /// Every face boundary is a closed, mutually linked loop whose
    /// half-edges reference the face, their edge, and live vertices.
    pub fn check_face_boundaries(&self) -> Result<(), GeometryError> {
        for (face_id, face) in &self.faces {
            let start = face.boundary;
            let mut current = start;
            let mut steps = 0usize;
            loop {
                let Some(he) = self.half_edges.get(current) else {
                    return Err(violation("boundary references a dead half-edge"));
                };
                if he.face != Some(face_id) {
                    return Err(violation("boundary half-edge references another face"));
                }
                if self.half_edges[he.next].prev != current {
                    return Err(violation("next/prev links disagree"));
                }
                if !self.vertices.contains_key(he.origin) {
                    return Err(violation("half-edge origin is a dead vertex"));
                }
                let Some(edge) = self.edges.get(he.edge) else {
                    return Err(violation("half-edge references a dead edge"));
                };
                if edge.first != current && edge.second != Some(current) {
                    return Err(violation("edge does not contain its half-edge"));
                }
                steps += 1;
                if steps > self.half_edges.len() {
                    return Err(violation("face boundary does not close"));
                }
                current = he.next;
                if current == start {
                    break;
                }
            }
        }
        Ok(())
    }

    /// No partially specified edges remain.
    pub fn check_closed(&self) -> Result<(), GeometryError> {
        if self.edges.values().all(|e| e.fully_specified()) {
            Ok(())
        } else {
            Err(violation("partially specified edge in a closed solid"))
        }
    }

    /// Every face has at least three boundary half-edges, all of them on
    /// fully specified edges.
    pub fn check_no_degenerate_faces(&self) -> Result<(), GeometryError> {
        for face in self.face_ids() {
            let boundary = self.face_half_edges(face);
            if boundary.len() < 3 {
                return Err(violation("face with fewer than three half-edges"));
            }
            for he in boundary {
                if !self.edges[self.half_edges[he].edge].fully_specified() {
                    return Err(violation("face bounded by a partially specified edge"));
                }
            }
        }
        Ok(())
    }

    /// Every boundary half-edge has a twin bounding a different, live
    /// face.
    pub fn check_face_neighbours(&self) -> Result<(), GeometryError> {
        for face in self.face_ids() {
            for he in self.face_half_edges(face) {
                let Some(twin) = self.half_edges[he].twin else {
                    return Err(violation("boundary half-edge without a twin"));
                };
                match self.half_edges[twin].face {
                    Some(neighbour) if neighbour != face => {
                        if !self.faces.contains_key(neighbour) {
                            return Err(violation("neighbouring face is dead"));
                        }
                    }
                    Some(_) => return Err(violation("face is its own neighbour")),
                    None => return Err(violation("twin half-edge has no face")),
                }
            }
        }
        Ok(())
    }

    /// Every vertex leaves through a half-edge that starts at it and
    /// lies on a fully specified edge.
    pub fn check_vertex_leaving_edges(&self) -> Result<(), GeometryError> {
        for (id, vertex) in &self.vertices {
            let Some(leaving) = vertex.leaving else {
                return Err(violation("vertex without a leaving half-edge"));
            };
            let Some(he) = self.half_edges.get(leaving) else {
                return Err(violation("leaving half-edge is dead"));
            };
            if he.origin != id {
                return Err(violation("leaving half-edge starts elsewhere"));
            }
            if !self.edges[he.edge].fully_specified() {
                return Err(violation("leaving half-edge on a partial edge"));
            }
        }
        Ok(())
    }

    /// Every edge joins two distinct vertices through twinned
    /// half-edges bounding two distinct live faces.
    pub fn check_edges(&self) -> Result<(), GeometryError> {
        for edge in self.edges.values() {
            let Some(second) = edge.second else {
                return Err(violation("partially specified edge"));
            };
            let first = &self.half_edges[edge.first];
            let second_he = &self.half_edges[second];
            if first.twin != Some(second) || second_he.twin != Some(edge.first) {
                return Err(violation("edge half-edges are not twins"));
            }
            if first.origin == second_he.origin {
                return Err(violation("edge with coincident endpoints"));
            }
            match (first.face, second_he.face) {
                (Some(a), Some(b)) if a != b => {
                    if !self.faces.contains_key(a) || !self.faces.contains_key(b) {
                        return Err(violation("edge bounded by a dead face"));
                    }
                }
                _ => return Err(violation("edge does not bound two distinct faces")),
            }
        }
        Ok(())
    }

    /// `V - E + F == 2` for a closed solid.
    pub fn check_euler_characteristic(&self) -> Result<(), GeometryError> {
        let v = self.vertex_count() as i64;
        let e = self.edge_count() as i64;
        let f = self.face_count() as i64;
        if v - e + f == 2 {
            Ok(())
        } else {
            Err(violation(format!(
                "Euler characteristic violated: V={v} E={e} F={f}"
            )))
        }
    }

    /// No two faces share their entire vertex set.
    pub fn check_overlapping_faces(&self) -> Result<(), GeometryError> {
        let face_sets: Vec<Vec<_>> = self
            .face_ids()
            .map(|f| {
                let mut ids = self.face_vertex_ids(f);
                ids.sort();
                ids
            })
            .collect();
        for i in 0..face_sets.len() {
            for j in i + 1..face_sets.len() {
                if face_sets[i] == face_sets[j] {
                    return Err(violation("two faces share all their vertices"));
                }
            }
        }
        Ok(())
    }

    /// No vertex lies strictly above any face plane.
    pub fn check_convex(&self) -> Result<(), GeometryError> {
        for face in self.face_ids() {
            for position in self.vertex_positions() {
                if self.face_point_status(face, &position) == PointStatus::Above {
                    return Err(violation("vertex above a face plane"));
                }
            }
        }
        Ok(())
    }

    /// No edge joins two coplanar faces.
    pub fn check_no_coplanar_faces(&self) -> Result<(), GeometryError> {
        for edge in self.edges.values() {
            let (Some(second), Some(fa)) = (edge.second, self.half_edges[edge.first].face)
            else {
                continue;
            };
            let Some(fb) = self.half_edges[second].face else {
                continue;
            };
            if self.faces_coplanar(fa, fb) {
                return Err(violation("adjacent coplanar faces"));
            }
        }
        Ok(())
    }

    /// Walking the half-edges around every vertex terminates and stays
    /// at that vertex.
    pub fn check_leaving_edge_consistency(&self) -> Result<(), GeometryError> {
        for (id, vertex) in &self.vertices {
            let Some(start) = vertex.leaving else {
                continue;
            };
            let mut current = start;
            let mut steps = 0usize;
            loop {
                let he = &self.half_edges[current];
                if he.origin != id {
                    return Err(violation("incident half-edge leaves another vertex"));
                }
                let prev = he.prev;
                let Some(next_around) = self.half_edges[prev].twin else {
                    break;
                };
                steps += 1;
                if steps > self.half_edges.len() {
                    return Err(violation("vertex fan does not close"));
                }
                current = next_around;
                if current == start {
                    break;
                }
            }
        }
        Ok(())
    }

    /// No edge shorter than `min`.
    pub fn check_edge_lengths(&self, min: f64) -> Result<(), GeometryError> {
        for edge in self.edge_ids() {
            let length = self.edge_length(edge);
            if length < min {
                return Err(violation(format!(
                    "edge of length {length} below minimum {min}"
                )));
            }
        }
        Ok(())
    }
}
