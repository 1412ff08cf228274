//! Clipping a polyhedron by a half-space.
//!
//! Everything above the clip plane is cut away and the planar hole is
//! sealed with a single new face. The whole result is computed before it
//! is committed, so a failed clip leaves the polyhedron untouched.

use std::collections::{HashMap, HashSet};

use brushwork_math::{
    points_equal, polygon_normal, Plane3, Point3, PointStatus, COLINEAR_EPSILON, EPSILON,
    POINT_STATUS_EPSILON,
};
use slotmap::SecondaryMap;

use crate::hull::{dedup_loop, simplify_loops};
use crate::topology::LoopSpec;
use crate::{FaceKey, GeometryError, Polyhedron, VertexId};

/// Outcome of a half-space clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipResult {
    /// The solid was entirely on the kept side; nothing changed.
    Unchanged,
    /// Nothing was on the kept side; the polyhedron is now empty.
    Empty,
    /// Part of the solid was cut away and the hole sealed.
    Clipped {
        /// Stable key of the face sealing the cut.
        new_face: FaceKey,
    },
}

impl Polyhedron {
    /// Cut away the part of the solid above `plane`.
    ///
    /// Faces surviving the cut keep their stable keys; the sealing face
    /// gets a fresh key, reported in [`ClipResult::Clipped`]. Vertices
    /// lying on the plane (within the classification tolerance) are
    /// kept and shared with the seal.
    pub fn clip(&mut self, plane: &Plane3) -> Result<ClipResult, GeometryError> {
        if !self.is_polyhedron() {
            return Err(GeometryError::NotAPolyhedron);
        }

        let mut statuses: SecondaryMap<VertexId, PointStatus> = SecondaryMap::new();
        let mut above = 0usize;
        let mut below = 0usize;
        for (id, vertex) in &self.vertices {
            let status = plane.point_status(&vertex.position, POINT_STATUS_EPSILON);
            match status {
                PointStatus::Above => above += 1,
                PointStatus::Below => below += 1,
                PointStatus::Inside => {}
            }
            statuses.insert(id, status);
        }
        if above == 0 {
            return Ok(ClipResult::Unchanged);
        }
        if below == 0 {
            self.clear_keeping_keys();
            return Ok(ClipResult::Empty);
        }

        // Split every face loop against the plane. Crossing edges get
        // one shared intersection vertex, so neighbouring faces agree.
        let mut crossings: HashMap<(VertexId, VertexId), Point3> = HashMap::new();
        let mut intersect = |a: VertexId, b: VertexId, poly: &Polyhedron| -> Point3 {
            let key = if a < b { (a, b) } else { (b, a) };
            *crossings.entry(key).or_insert_with(|| {
                let pa = poly.vertices[a].position;
                let pb = poly.vertices[b].position;
                let da = plane.signed_distance(&pa);
                let db = plane.signed_distance(&pb);
                pa + (pb - pa) * (da / (da - db))
            })
        };

        let mut kept: Vec<LoopSpec> = Vec::new();
        for (id, face) in &self.faces {
            let vids = self.face_vertex_ids(id);
            let n = vids.len();
            let mut out: Vec<Point3> = Vec::with_capacity(n + 2);
            for i in 0..n {
                let a = vids[i];
                let b = vids[(i + 1) % n];
                let (sa, sb) = (statuses[a], statuses[b]);
                if sb != PointStatus::Above {
                    if sa == PointStatus::Above && sb == PointStatus::Below {
                        out.push(intersect(a, b, self));
                    }
                    out.push(self.vertices[b].position);
                } else if sa == PointStatus::Below {
                    out.push(intersect(a, b, self));
                }
            }
            dedup_loop(&mut out);
            if out.len() >= 3 {
                kept.push(LoopSpec {
                    positions: out,
                    plane: face.plane,
                    key: Some(face.key),
                });
            }
        }
        if kept.is_empty() {
            self.clear_keeping_keys();
            return Ok(ClipResult::Empty);
        }

        let mut cap = cap_loop(&kept)?;
        if let Some(normal) = polygon_normal(&cap) {
            if normal.dot(plane.normal.as_ref()) < 0.0 {
                cap.reverse();
            }
        }
        let cap_key = self.issue_face_key();
        kept.push(LoopSpec {
            positions: cap,
            plane: *plane,
            key: Some(cap_key),
        });

        let loops = simplify_loops(kept);

        // The cap normally survives as its own loop; if simplification
        // merged it into a coplanar neighbour, report that neighbour.
        // Resolved before the commit so a failure leaves `self` intact.
        let new_face = loops
            .iter()
            .find(|l| l.key == Some(cap_key))
            .or_else(|| {
                loops
                    .iter()
                    .find(|l| l.plane.normal.dot(plane.normal.as_ref()) > 1.0 - COLINEAR_EPSILON)
            })
            .and_then(|l| l.key)
            .ok_or_else(|| GeometryError::Degenerate("clip produced no sealing face".into()))?;

        self.commit_loops(&loops)?;
        debug_assert!(self.check_invariant().is_ok());
        Ok(ClipResult::Clipped { new_face })
    }

    /// Reset to the empty polyhedron without reusing issued face keys.
    fn clear_keeping_keys(&mut self) {
        let next = self.next_face_key;
        *self = Polyhedron::new();
        self.next_face_key = next;
    }
}

/// The boundary loop of the hole left by discarding the clipped-away
/// geometry: the reversal of the directed edges that lost their twin.
fn cap_loop(kept: &[LoopSpec]) -> Result<Vec<Point3>, GeometryError> {
    // Unify corner positions so directed edges can be compared by index.
    let mut unique: Vec<Point3> = Vec::new();
    let mut loops: Vec<Vec<usize>> = Vec::new();
    for spec in kept {
        let indexed = spec
            .positions
            .iter()
            .map(|p| {
                unique
                    .iter()
                    .position(|u| points_equal(u, p, EPSILON))
                    .unwrap_or_else(|| {
                        unique.push(*p);
                        unique.len() - 1
                    })
            })
            .collect();
        loops.push(indexed);
    }

    let mut directed: HashSet<(usize, usize)> = HashSet::new();
    for indices in &loops {
        let n = indices.len();
        for i in 0..n {
            directed.insert((indices[i], indices[(i + 1) % n]));
        }
    }

    // next[b] = a for every unmatched directed edge (a, b): the cap
    // traverses the hole boundary in reverse.
    let mut next: HashMap<usize, usize> = HashMap::new();
    for &(a, b) in &directed {
        if !directed.contains(&(b, a)) {
            if next.insert(b, a).is_some() {
                return Err(GeometryError::Degenerate(
                    "cut boundary is not a simple loop".into(),
                ));
            }
        }
    }
    if next.is_empty() {
        return Err(GeometryError::Degenerate("cut left no boundary".into()));
    }

    let start = *next.keys().next().ok_or_else(|| {
        GeometryError::Degenerate("cut left no boundary".into())
    })?;
    let mut chain = vec![start];
    let mut current = start;
    loop {
        let &following = next.get(&current).ok_or_else(|| {
            GeometryError::Degenerate("cut boundary does not close".into())
        })?;
        if following == start {
            break;
        }
        chain.push(following);
        current = following;
        if chain.len() > next.len() {
            return Err(GeometryError::Degenerate(
                "cut boundary does not close".into(),
            ));
        }
    }
    if chain.len() != next.len() {
        return Err(GeometryError::Degenerate(
            "cut produced more than one boundary loop".into(),
        ));
    }
    Ok(chain.into_iter().map(|i| unique[i]).collect())
}
