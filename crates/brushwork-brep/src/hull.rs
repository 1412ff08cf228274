//! Incremental convex hull construction.
//!
//! Points are added one at a time and the polyhedron passes through its
//! degenerate states on the way up: point, segment, planar polygon,
//! solid. A point that does not extend the hull is absorbed and reported
//! as `None`; that is an expected outcome, not an error.

use brushwork_math::{
    points_equal, polygon_normal, projection_axes, Bbox3, Dir3, Plane3, Point3, PointStatus,
    Vec3, COLINEAR_EPSILON, EPSILON, POINT_STATUS_EPSILON,
};

use crate::topology::{build_from_loops, LoopSpec};
use crate::{Edge, GeometryError, HalfEdge, Polyhedron, Vertex, VertexId};

impl Polyhedron {
    /// The convex hull of a point set.
    pub fn from_points<I: IntoIterator<Item = Point3>>(points: I) -> Self {
        let mut poly = Self::new();
        for point in points {
            poly.add_point(&point);
        }
        poly
    }

    /// An axis-aligned cuboid, built directly without running the
    /// incremental hull.
    pub fn from_bounds(bounds: &Bbox3) -> Self {
        let (lo, hi) = (bounds.min, bounds.max);
        let p = |x: f64, y: f64, z: f64| Point3::new(x, y, z);
        let axis = |v: Vec3| Dir3::new_normalize(v);
        let quad = |a: Point3, b: Point3, c: Point3, d: Point3, normal: Dir3| LoopSpec {
            positions: vec![a, b, c, d],
            plane: Plane3::from_point_normal(&a, normal),
            key: None,
        };
        let loops = [
            // -z and +z
            quad(
                p(lo.x, lo.y, lo.z),
                p(lo.x, hi.y, lo.z),
                p(hi.x, hi.y, lo.z),
                p(hi.x, lo.y, lo.z),
                axis(-Vec3::z()),
            ),
            quad(
                p(lo.x, lo.y, hi.z),
                p(hi.x, lo.y, hi.z),
                p(hi.x, hi.y, hi.z),
                p(lo.x, hi.y, hi.z),
                axis(Vec3::z()),
            ),
            // -y and +y
            quad(
                p(lo.x, lo.y, lo.z),
                p(hi.x, lo.y, lo.z),
                p(hi.x, lo.y, hi.z),
                p(lo.x, lo.y, hi.z),
                axis(-Vec3::y()),
            ),
            quad(
                p(lo.x, hi.y, lo.z),
                p(lo.x, hi.y, hi.z),
                p(hi.x, hi.y, hi.z),
                p(hi.x, hi.y, lo.z),
                axis(Vec3::y()),
            ),
            // -x and +x
            quad(
                p(lo.x, lo.y, lo.z),
                p(lo.x, lo.y, hi.z),
                p(lo.x, hi.y, hi.z),
                p(lo.x, hi.y, lo.z),
                axis(-Vec3::x()),
            ),
            quad(
                p(hi.x, lo.y, lo.z),
                p(hi.x, hi.y, lo.z),
                p(hi.x, hi.y, hi.z),
                p(hi.x, lo.y, hi.z),
                axis(Vec3::x()),
            ),
        ];
        let built = build_from_loops(&loops, 0);
        debug_assert!(built.is_ok());
        built.unwrap_or_default()
    }

    /// Add a point to the hull.
    ///
    /// Returns the vertex the point became, or `None` when the point
    /// was absorbed (inside the hull, or merged into existing geometry).
    pub fn add_point(&mut self, point: &Point3) -> Option<VertexId> {
        let result = if self.is_empty() {
            Some(self.add_first_point(point))
        } else if self.is_point() {
            self.add_second_point(point)
        } else if self.is_edge() {
            self.add_third_point(point)
        } else if self.is_polygon() {
            self.add_point_to_polygon(point)
        } else {
            self.add_point_to_polyhedron(point)
        };
        debug_assert!(self.check_invariant().is_ok());
        result
    }

    fn add_first_point(&mut self, point: &Point3) -> VertexId {
        let id = self.vertices.insert(Vertex {
            position: *point,
            leaving: None,
        });
        self.update_bounds();
        id
    }

    fn add_second_point(&mut self, point: &Point3) -> Option<VertexId> {
        let (v1, p1) = {
            let (id, v) = self.vertices.iter().next()?;
            (id, v.position)
        };
        if points_equal(&p1, point, EPSILON) {
            return None;
        }
        let v2 = self.vertices.insert(Vertex {
            position: *point,
            leaving: None,
        });
        let h1 = self.half_edges.insert_with_key(|id| HalfEdge {
            origin: v1,
            next: id,
            prev: id,
            twin: None,
            edge: Default::default(),
            face: None,
        });
        let h2 = self.half_edges.insert_with_key(|id| HalfEdge {
            origin: v2,
            next: id,
            prev: id,
            twin: None,
            edge: Default::default(),
            face: None,
        });
        let edge = self.edges.insert(Edge {
            first: h1,
            second: Some(h2),
        });
        self.half_edges[h1].twin = Some(h2);
        self.half_edges[h1].edge = edge;
        self.half_edges[h2].twin = Some(h1);
        self.half_edges[h2].edge = edge;
        self.vertices[v1].leaving = Some(h1);
        self.vertices[v2].leaving = Some(h2);
        self.update_bounds();
        Some(v2)
    }

    fn add_third_point(&mut self, point: &Point3) -> Option<VertexId> {
        let endpoints: Vec<(VertexId, Point3)> = self
            .vertices
            .iter()
            .map(|(id, v)| (id, v.position))
            .collect();
        let (va, pa) = endpoints[0];
        let (vb, pb) = endpoints[1];

        let cross = (pb - pa).cross(&(point - pa));
        if cross.norm() < EPSILON * (pb - pa).norm().max(1.0) {
            // Collinear: absorb interior points, extend past an endpoint.
            let between = |x: &Point3, a: &Point3, b: &Point3| (x - a).dot(&(x - b)) <= 0.0;
            if between(point, &pa, &pb) {
                return None;
            }
            let moved = if between(&pa, &pb, point) { va } else { vb };
            self.vertices[moved].position = *point;
            self.update_bounds();
            return Some(moved);
        }

        let plane = Plane3::from_points(&pa, &pb, point)?;
        let spec = LoopSpec {
            positions: vec![pa, pb, *point],
            plane,
            key: None,
        };
        if self.commit_loops(&[spec]).is_err() {
            return None;
        }
        self.find_vertex(point, EPSILON)
    }

    fn add_point_to_polygon(&mut self, point: &Point3) -> Option<VertexId> {
        let face = self.face_ids().next()?;
        let plane = self.faces[face].plane;
        match plane.point_status(point, POINT_STATUS_EPSILON) {
            PointStatus::Inside => self.grow_polygon(point),
            status => self.extrude_polygon(point, status),
        }
    }

    /// Insert a coplanar point by recomputing the 2D hull of the
    /// boundary. Interior and duplicate points are absorbed; boundary
    /// vertices that become interior are removed.
    fn grow_polygon(&mut self, point: &Point3) -> Option<VertexId> {
        if self.find_vertex(point, EPSILON).is_some() {
            return None;
        }
        let face = self.face_ids().next()?;
        let plane = self.faces[face].plane;
        let key = self.faces[face].key;

        let mut positions = self.face_positions(face);
        positions.push(*point);
        let mut hull = planar_convex_hull(&positions, plane.normal.as_ref());
        if !hull.iter().any(|p| points_equal(p, point, EPSILON)) {
            return None;
        }
        orient_loop(&mut hull, &plane);
        let spec = LoopSpec {
            positions: hull,
            plane,
            key: Some(key),
        };
        if self.commit_loops(&[spec]).is_err() {
            return None;
        }
        self.find_vertex(point, EPSILON)
    }

    /// Turn the polygon into a cone over its boundary with the new
    /// point as apex.
    fn extrude_polygon(&mut self, point: &Point3, status: PointStatus) -> Option<VertexId> {
        let face = self.face_ids().next()?;
        let mut base = self.face_positions(face);
        let mut base_plane = self.faces[face].plane;
        let key = self.faces[face].key;
        if status == PointStatus::Above {
            // Keep the base normal pointing away from the apex.
            base.reverse();
            base_plane = base_plane.flipped();
        }

        let mut loops = vec![LoopSpec {
            positions: base.clone(),
            plane: base_plane,
            key: Some(key),
        }];
        for i in 0..base.len() {
            let a = base[i];
            let b = base[(i + 1) % base.len()];
            let plane = Plane3::from_points(&b, &a, point)?;
            loops.push(LoopSpec {
                positions: vec![b, a, *point],
                plane,
                key: None,
            });
        }
        let loops = simplify_loops(loops);
        if self.commit_loops(&loops).is_err() {
            return None;
        }
        self.find_vertex(point, EPSILON)
    }

    /// Delete the faces that see the point and fan new triangles from
    /// the point over the horizon, merging coplanar results.
    fn add_point_to_polyhedron(&mut self, point: &Point3) -> Option<VertexId> {
        if self.contains_point(point, POINT_STATUS_EPSILON) {
            return None;
        }
        let mut kept: Vec<LoopSpec> = Vec::new();
        let mut any_visible = false;
        for (id, face) in &self.faces {
            if face.plane.point_status(point, POINT_STATUS_EPSILON) == PointStatus::Above {
                any_visible = true;
            } else {
                kept.push(LoopSpec {
                    positions: self.face_positions(id),
                    plane: face.plane,
                    key: Some(face.key),
                });
            }
        }
        if !any_visible || kept.is_empty() {
            return None;
        }

        // A kept directed edge whose reverse is not kept lies on the
        // horizon; the reverse belonged to a deleted face.
        let is_kept_edge = |a: &Point3, b: &Point3| {
            kept.iter().any(|l| {
                let n = l.positions.len();
                (0..n).any(|i| {
                    points_equal(&l.positions[i], a, EPSILON)
                        && points_equal(&l.positions[(i + 1) % n], b, EPSILON)
                })
            })
        };
        let mut fan: Vec<LoopSpec> = Vec::new();
        for spec in &kept {
            let n = spec.positions.len();
            for i in 0..n {
                let a = spec.positions[i];
                let b = spec.positions[(i + 1) % n];
                if !is_kept_edge(&b, &a) {
                    let plane = Plane3::from_points(&b, &a, point)?;
                    fan.push(LoopSpec {
                        positions: vec![b, a, *point],
                        plane,
                        key: None,
                    });
                }
            }
        }
        if fan.is_empty() {
            return None;
        }

        let mut loops = kept;
        loops.append(&mut fan);
        let loops = simplify_loops(loops);
        if self.commit_loops(&loops).is_err() {
            return None;
        }
        self.find_vertex(point, EPSILON)
    }

    /// Collapse edges shorter than `min_length` to their midpoint until
    /// none remain, dropping faces that degenerate in the process.
    ///
    /// Returns the number of collapsed edges.
    pub fn heal_edges(&mut self, min_length: f64) -> Result<usize, GeometryError> {
        if !self.is_polyhedron() {
            return Err(GeometryError::NotAPolyhedron);
        }
        let mut collapsed = 0;
        loop {
            let short = self
                .edge_ids()
                .find(|&e| self.edge_length(e) < min_length);
            let Some(edge) = short else {
                break;
            };
            let (a, b) = self.edge_positions(edge);
            let mid = a + (b - a) * 0.5;
            let mut loops = self.extract_loops();
            for spec in &mut loops {
                for p in &mut spec.positions {
                    if points_equal(p, &a, EPSILON) || points_equal(p, &b, EPSILON) {
                        *p = mid;
                    }
                }
            }
            let loops = simplify_loops(loops);
            if loops.len() < 4 {
                return Err(GeometryError::Degenerate(
                    "edge healing collapsed the solid".into(),
                ));
            }
            self.commit_loops(&loops)?;
            collapsed += 1;
        }
        debug_assert!(self.check_invariant().is_ok());
        Ok(collapsed)
    }
}

// ====== Loop utilities ======

/// Remove consecutive (circularly) duplicate positions.
pub(crate) fn dedup_loop(positions: &mut Vec<Point3>) {
    let mut i = 0;
    while positions.len() > 1 && i < positions.len() {
        let next = (i + 1) % positions.len();
        if points_equal(&positions[i], &positions[next], EPSILON) {
            positions.remove(next);
        } else {
            i += 1;
        }
    }
}

fn loops_coplanar(a: &LoopSpec, b: &LoopSpec) -> bool {
    if a.plane.normal.dot(b.plane.normal.as_ref()) < 1.0 - COLINEAR_EPSILON {
        return false;
    }
    let on = |plane: &Plane3, positions: &[Point3]| {
        positions
            .iter()
            .all(|p| plane.point_status(p, POINT_STATUS_EPSILON) == PointStatus::Inside)
    };
    on(&a.plane, &b.positions) && on(&b.plane, &a.positions)
}

/// Splice two loops sharing a reversed directed edge into one.
fn merge_loops(a: &LoopSpec, b: &LoopSpec) -> Option<LoopSpec> {
    let n = a.positions.len();
    let m = b.positions.len();
    for i in 0..n {
        let ax = &a.positions[i];
        let ay = &a.positions[(i + 1) % n];
        for j in 0..m {
            let bx = &b.positions[j];
            let by = &b.positions[(j + 1) % m];
            if points_equal(ax, by, EPSILON) && points_equal(ay, bx, EPSILON) {
                let mut merged: Vec<Point3> = a.positions[..=i].to_vec();
                for k in 0..m - 2 {
                    merged.push(b.positions[(j + 2 + k) % m]);
                }
                merged.extend_from_slice(&a.positions[i + 1..]);
                dedup_loop(&mut merged);
                return Some(LoopSpec {
                    positions: merged,
                    plane: a.plane,
                    key: a.key.or(b.key),
                });
            }
        }
    }
    None
}

/// Remove vertices used by exactly two loops and collinear within both.
fn remove_redundant_vertices(loops: &mut [LoopSpec]) {
    let collinear_at = |positions: &[Point3], i: usize| {
        let n = positions.len();
        let prev = positions[(i + n - 1) % n];
        let v = positions[i];
        let next = positions[(i + 1) % n];
        let d1 = v - prev;
        let d2 = next - v;
        d1.cross(&d2).norm() <= COLINEAR_EPSILON * d1.norm() * d2.norm()
    };

    // Collect candidate positions and their usage.
    let mut unique: Vec<Point3> = Vec::new();
    let mut usage: Vec<Vec<(usize, usize)>> = Vec::new();
    for (li, spec) in loops.iter().enumerate() {
        for (pi, p) in spec.positions.iter().enumerate() {
            let idx = unique
                .iter()
                .position(|u| points_equal(u, p, EPSILON))
                .unwrap_or_else(|| {
                    unique.push(*p);
                    usage.push(Vec::new());
                    unique.len() - 1
                });
            usage[idx].push((li, pi));
        }
    }

    let mut to_remove: Vec<Point3> = Vec::new();
    for (idx, uses) in usage.iter().enumerate() {
        if uses.len() == 2
            && uses
                .iter()
                .all(|&(li, pi)| collinear_at(&loops[li].positions, pi))
        {
            to_remove.push(unique[idx]);
        }
    }
    for p in to_remove {
        for spec in loops.iter_mut() {
            spec.positions
                .retain(|q| !points_equal(q, &p, EPSILON));
        }
    }
}

/// Clean a loop set: drop duplicate corners, merge adjacent coplanar
/// loops, drop redundant collinear vertices and degenerate loops.
pub(crate) fn simplify_loops(mut loops: Vec<LoopSpec>) -> Vec<LoopSpec> {
    for spec in &mut loops {
        dedup_loop(&mut spec.positions);
    }
    loops.retain(|l| l.positions.len() >= 3);

    // Merge adjacent coplanar loops to a fixpoint.
    'merge: loop {
        for i in 0..loops.len() {
            for j in i + 1..loops.len() {
                if loops_coplanar(&loops[i], &loops[j]) {
                    if let Some(merged) = merge_loops(&loops[i], &loops[j]) {
                        loops[i] = merged;
                        loops.remove(j);
                        continue 'merge;
                    }
                }
            }
        }
        break;
    }

    remove_redundant_vertices(&mut loops);
    for spec in &mut loops {
        dedup_loop(&mut spec.positions);
    }
    loops.retain(|l| l.positions.len() >= 3);
    loops
}

/// 2D convex hull (monotone chain) of points lying on a common plane,
/// computed in the projection that drops the dominant normal axis.
/// Collinear boundary points are absorbed.
fn planar_convex_hull(points: &[Point3], normal: &Vec3) -> Vec<Point3> {
    let (u, v) = projection_axes(normal);
    let mut projected: Vec<(f64, f64, usize)> = points
        .iter()
        .enumerate()
        .map(|(i, p)| (p[u], p[v], i))
        .collect();
    projected.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    projected.dedup_by(|a, b| (a.0 - b.0).abs() < EPSILON && (a.1 - b.1).abs() < EPSILON);

    let cross = |o: &(f64, f64, usize), a: &(f64, f64, usize), b: &(f64, f64, usize)| {
        (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
    };
    let scale: f64 = projected
        .iter()
        .map(|p| p.0.abs().max(p.1.abs()))
        .fold(1.0, f64::max);
    let eps = EPSILON * scale * scale;

    let mut hull: Vec<(f64, f64, usize)> = Vec::new();
    for half in 0..2 {
        let start = hull.len();
        let iter: Box<dyn Iterator<Item = &(f64, f64, usize)>> = if half == 0 {
            Box::new(projected.iter())
        } else {
            Box::new(projected.iter().rev())
        };
        for p in iter {
            while hull.len() >= start + 2
                && cross(&hull[hull.len() - 2], &hull[hull.len() - 1], p) <= eps
            {
                hull.pop();
            }
            hull.push(*p);
        }
        hull.pop();
    }
    hull.into_iter().map(|(_, _, i)| points[i]).collect()
}

/// Reverse `positions` if their winding disagrees with `plane`'s normal.
fn orient_loop(positions: &mut Vec<Point3>, plane: &Plane3) {
    if let Some(normal) = polygon_normal(positions) {
        if normal.dot(plane.normal.as_ref()) < 0.0 {
            positions.reverse();
        }
    }
}
