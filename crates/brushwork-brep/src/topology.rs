//! Arena-backed half-edge mesh and its read-side queries.
//!
//! The mesh is stored in four generational arenas (vertices, half-edges,
//! edges, faces). Links between records are arena keys rather than
//! pointers, so a key held across a mutation either resolves to the
//! current record or fails to resolve; it never dangles.

use std::collections::HashMap;

use brushwork_math::{
    points_equal, Bbox3, Plane3, Point3, PointStatus, Ray3, COLINEAR_EPSILON, EPSILON,
    POINT_STATUS_EPSILON,
};
use slotmap::SlotMap;

use crate::GeometryError;

slotmap::new_key_type! {
    /// Arena key of a [`Vertex`].
    pub struct VertexId;
    /// Arena key of a [`HalfEdge`].
    pub struct HalfEdgeId;
    /// Arena key of an [`Edge`].
    pub struct EdgeId;
    /// Arena key of a [`Face`].
    pub struct FaceId;
}

/// Stable identity of a face.
///
/// Unlike [`FaceId`], which is an arena key invalidated whenever the
/// mesh is rebuilt, a `FaceKey` is issued once and follows the face
/// through clips: faces surviving a clip keep their key, the cap face
/// gets a fresh one. Editors key per-face attributes by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceKey(pub u64);

/// A corner of the polyhedron.
#[derive(Debug, Clone)]
pub struct Vertex {
    /// Position in world space.
    pub position: Point3,
    /// Some half-edge leaving this vertex, if any edge exists yet.
    pub leaving: Option<HalfEdgeId>,
}

/// One directed side of an edge, bounding at most one face.
#[derive(Debug, Clone)]
pub struct HalfEdge {
    /// Vertex this half-edge leaves from.
    pub origin: VertexId,
    /// Next half-edge along the boundary loop.
    pub next: HalfEdgeId,
    /// Previous half-edge along the boundary loop.
    pub prev: HalfEdgeId,
    /// Oppositely directed half-edge of the same edge, if present.
    pub twin: Option<HalfEdgeId>,
    /// The undirected edge this half-edge belongs to.
    pub edge: EdgeId,
    /// The face this half-edge bounds. `None` in the edge state, where
    /// half-edges exist without any face.
    pub face: Option<FaceId>,
}

/// An undirected edge.
///
/// An edge is *fully specified* when both of its half-edges exist. In
/// the polygon state the boundary edges carry only their first half.
#[derive(Debug, Clone)]
pub struct Edge {
    /// The first half-edge; always present.
    pub first: HalfEdgeId,
    /// The second half-edge, once both neighbouring loops exist.
    pub second: Option<HalfEdgeId>,
}

impl Edge {
    /// Whether both half-edges of this edge exist.
    pub fn fully_specified(&self) -> bool {
        self.second.is_some()
    }
}

/// A planar face bounded by a loop of half-edges.
#[derive(Debug, Clone)]
pub struct Face {
    /// One half-edge of the boundary loop.
    pub boundary: HalfEdgeId,
    /// Supporting plane; the normal points out of the solid.
    pub plane: Plane3,
    /// Stable identity, preserved across clips.
    pub key: FaceKey,
}

/// Which side of a face a ray hit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceHitSide {
    /// The ray entered against the face normal.
    Front,
    /// The ray hit the back of the face.
    Back,
}

/// A ray/face intersection.
#[derive(Debug, Clone, Copy)]
pub struct FaceRayHit {
    /// Side the face was hit from.
    pub side: FaceHitSide,
    /// Distance along the ray.
    pub distance: f64,
}

/// A convex solid (or a degenerate predecessor of one) stored as a
/// half-edge mesh.
#[derive(Debug, Clone)]
pub struct Polyhedron {
    pub(crate) vertices: SlotMap<VertexId, Vertex>,
    pub(crate) half_edges: SlotMap<HalfEdgeId, HalfEdge>,
    pub(crate) edges: SlotMap<EdgeId, Edge>,
    pub(crate) faces: SlotMap<FaceId, Face>,
    pub(crate) bounds: Option<Bbox3>,
    pub(crate) next_face_key: u64,
}

impl Default for Polyhedron {
    fn default() -> Self {
        Self::new()
    }
}

// ====== Construction and state ======

impl Polyhedron {
    /// The empty polyhedron.
    pub fn new() -> Self {
        Self {
            vertices: SlotMap::with_key(),
            half_edges: SlotMap::with_key(),
            edges: SlotMap::with_key(),
            faces: SlotMap::with_key(),
            bounds: None,
            next_face_key: 0,
        }
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Number of half-edges.
    pub fn half_edge_count(&self) -> usize {
        self.half_edges.len()
    }

    /// Number of faces.
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// No geometry at all.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// A single vertex.
    pub fn is_point(&self) -> bool {
        self.vertex_count() == 1
    }

    /// Two vertices joined by one edge, no faces.
    pub fn is_edge(&self) -> bool {
        self.vertex_count() == 2 && self.face_count() == 0 && self.edge_count() == 1
    }

    /// A single planar face.
    pub fn is_polygon(&self) -> bool {
        self.face_count() == 1
    }

    /// A solid with volume.
    pub fn is_polyhedron(&self) -> bool {
        self.face_count() > 3
    }

    /// Euler's criterion for a closed surface: `V + F == E + 2`.
    pub fn is_closed(&self) -> bool {
        self.vertex_count() + self.face_count() == self.edge_count() + 2
    }

    /// Issue a fresh stable face key.
    pub(crate) fn issue_face_key(&mut self) -> FaceKey {
        let key = FaceKey(self.next_face_key);
        self.next_face_key += 1;
        key
    }
}

// ====== Record access ======

impl Polyhedron {
    /// The vertex for `id`. Panics if the id is stale.
    pub fn vertex(&self, id: VertexId) -> &Vertex {
        &self.vertices[id]
    }

    /// The half-edge for `id`. Panics if the id is stale.
    pub fn half_edge(&self, id: HalfEdgeId) -> &HalfEdge {
        &self.half_edges[id]
    }

    /// The edge for `id`. Panics if the id is stale.
    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id]
    }

    /// The face for `id`. Panics if the id is stale.
    pub fn face(&self, id: FaceId) -> &Face {
        &self.faces[id]
    }

    /// Ids of all vertices.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices.keys()
    }

    /// Positions of all vertices, in arena order.
    pub fn vertex_positions(&self) -> impl Iterator<Item = Point3> + '_ {
        self.vertices.values().map(|v| v.position)
    }

    /// Ids of all edges.
    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges.keys()
    }

    /// Ids of all faces.
    pub fn face_ids(&self) -> impl Iterator<Item = FaceId> + '_ {
        self.faces.keys()
    }

    /// Axis-aligned bounds, `None` when empty.
    pub fn bounds(&self) -> Option<Bbox3> {
        self.bounds
    }

    pub(crate) fn update_bounds(&mut self) {
        let positions: Vec<Point3> = self.vertex_positions().collect();
        self.bounds = Bbox3::from_points(positions);
    }
}

// ====== Traversal ======

impl Polyhedron {
    /// The vertex a half-edge points to.
    pub fn half_edge_dest(&self, id: HalfEdgeId) -> VertexId {
        let he = &self.half_edges[id];
        match he.twin {
            Some(twin) => self.half_edges[twin].origin,
            None => self.half_edges[he.next].origin,
        }
    }

    /// The half-edges of a face boundary, in loop order.
    pub fn face_half_edges(&self, face: FaceId) -> Vec<HalfEdgeId> {
        let start = self.faces[face].boundary;
        let mut out = Vec::new();
        let mut current = start;
        loop {
            out.push(current);
            current = self.half_edges[current].next;
            if current == start {
                break;
            }
            // A malformed loop is a bug in the mutation that produced it.
            debug_assert!(out.len() <= self.half_edges.len());
            if out.len() > self.half_edges.len() {
                break;
            }
        }
        out
    }

    /// The vertex ids of a face boundary, in loop order.
    pub fn face_vertex_ids(&self, face: FaceId) -> Vec<VertexId> {
        self.face_half_edges(face)
            .into_iter()
            .map(|he| self.half_edges[he].origin)
            .collect()
    }

    /// The vertex positions of a face boundary, in loop order.
    pub fn face_positions(&self, face: FaceId) -> Vec<Point3> {
        self.face_vertex_ids(face)
            .into_iter()
            .map(|v| self.vertices[v].position)
            .collect()
    }

    /// The half-edges leaving `vertex`, walked around its fan.
    ///
    /// The walk stops at a missing twin, so in non-closed states only
    /// the reachable part of the fan is reported.
    pub fn vertex_incident_half_edges(&self, vertex: VertexId) -> Vec<HalfEdgeId> {
        let Some(start) = self.vertices[vertex].leaving else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut current = start;
        loop {
            out.push(current);
            let prev = self.half_edges[current].prev;
            let Some(next_around) = self.half_edges[prev].twin else {
                break;
            };
            if next_around == start || out.len() > self.half_edges.len() {
                break;
            }
            current = next_around;
        }
        out
    }

    /// Endpoints of an edge as vertex ids.
    pub fn edge_endpoints(&self, edge: EdgeId) -> (VertexId, VertexId) {
        let first = self.edges[edge].first;
        (self.half_edges[first].origin, self.half_edge_dest(first))
    }

    /// Endpoints of an edge as positions.
    pub fn edge_positions(&self, edge: EdgeId) -> (Point3, Point3) {
        let (a, b) = self.edge_endpoints(edge);
        (self.vertices[a].position, self.vertices[b].position)
    }

    /// Length of an edge.
    pub fn edge_length(&self, edge: EdgeId) -> f64 {
        let (a, b) = self.edge_positions(edge);
        (a - b).norm()
    }
}

// ====== Geometric queries ======

impl Polyhedron {
    /// Find the vertex at `position`, within `eps`.
    pub fn find_vertex(&self, position: &Point3, eps: f64) -> Option<VertexId> {
        self.vertices
            .iter()
            .find(|(_, v)| points_equal(&v.position, position, eps))
            .map(|(id, _)| id)
    }

    /// Whether a vertex exists at `position`, within `eps`.
    pub fn has_vertex(&self, position: &Point3, eps: f64) -> bool {
        self.find_vertex(position, eps).is_some()
    }

    /// Whether vertices exist at all of `positions`, within `eps`.
    pub fn has_all_vertices(&self, positions: &[Point3], eps: f64) -> bool {
        positions.iter().all(|p| self.has_vertex(p, eps))
    }

    /// Whether an edge connects `p1` and `p2` (in either order), within `eps`.
    pub fn has_edge(&self, p1: &Point3, p2: &Point3, eps: f64) -> bool {
        self.edges.keys().any(|e| {
            let (a, b) = self.edge_positions(e);
            (points_equal(&a, p1, eps) && points_equal(&b, p2, eps))
                || (points_equal(&a, p2, eps) && points_equal(&b, p1, eps))
        })
    }

    /// The face carrying the stable key `key`.
    pub fn face_by_key(&self, key: FaceKey) -> Option<FaceId> {
        self.faces
            .iter()
            .find(|(_, f)| f.key == key)
            .map(|(id, _)| id)
    }

    /// Whether `point` lies inside or on the solid, within `eps`.
    ///
    /// Meaningful in the polyhedron state; lesser states have no volume
    /// and report `false`.
    pub fn contains_point(&self, point: &Point3, eps: f64) -> bool {
        if !self.is_polyhedron() {
            return false;
        }
        if let Some(bounds) = &self.bounds {
            if !bounds.contains_point(point, eps) {
                return false;
            }
        }
        self.faces
            .values()
            .all(|f| f.plane.point_status(point, eps) != PointStatus::Above)
    }

    /// Classify `point` against the supporting plane of `face`.
    pub fn face_point_status(&self, face: FaceId, point: &Point3) -> PointStatus {
        self.faces[face]
            .plane
            .point_status(point, POINT_STATUS_EPSILON)
    }

    /// Whether two faces lie in the same plane, with matching orientation.
    pub fn faces_coplanar(&self, a: FaceId, b: FaceId) -> bool {
        let pa = self.faces[a].plane;
        let pb = self.faces[b].plane;
        if pa.normal.dot(pb.normal.as_ref()) < 1.0 - COLINEAR_EPSILON {
            return false;
        }
        let on = |plane: &Plane3, positions: &[Point3]| {
            positions
                .iter()
                .all(|p| plane.point_status(p, POINT_STATUS_EPSILON) == PointStatus::Inside)
        };
        on(&pb, &self.face_positions(a)) && on(&pa, &self.face_positions(b))
    }

    /// Intersect a ray with one face.
    pub fn face_intersect_ray(&self, face: FaceId, ray: &Ray3) -> Option<FaceRayHit> {
        let plane = self.faces[face].plane;
        let distance = brushwork_math::polygon_intersect_ray(
            &self.face_positions(face),
            &plane,
            ray,
        )?;
        let side = if ray.direction.dot(plane.normal.as_ref()) < 0.0 {
            FaceHitSide::Front
        } else {
            FaceHitSide::Back
        };
        Some(FaceRayHit { side, distance })
    }

    /// The nearest face hit from the front by `ray`.
    pub fn pick_face(&self, ray: &Ray3) -> Option<(FaceId, f64)> {
        let mut best: Option<(FaceId, f64)> = None;
        for face in self.faces.keys() {
            if let Some(hit) = self.face_intersect_ray(face, ray) {
                if hit.side == FaceHitSide::Front
                    && best.map_or(true, |(_, d)| hit.distance < d)
                {
                    best = Some((face, hit.distance));
                }
            }
        }
        best
    }
}

// ====== Rebuilding from face loops ======

/// A face described by its boundary positions, used when a mutation
/// computes its entire result before committing it.
#[derive(Debug, Clone)]
pub(crate) struct LoopSpec {
    /// Boundary positions, counter-clockwise about the outward normal.
    pub positions: Vec<Point3>,
    /// Supporting plane with outward normal.
    pub plane: Plane3,
    /// Stable key to keep, or `None` to issue a fresh one.
    pub key: Option<FaceKey>,
}

impl Polyhedron {
    /// Face loops of the current mesh, keys preserved.
    pub(crate) fn extract_loops(&self) -> Vec<LoopSpec> {
        self.faces
            .iter()
            .map(|(id, face)| LoopSpec {
                positions: self.face_positions(id),
                plane: face.plane,
                key: Some(face.key),
            })
            .collect()
    }

    /// Replace the mesh with one built from `loops`.
    ///
    /// The whole new mesh is linked up before anything is committed, so
    /// an error leaves `self` untouched.
    pub(crate) fn commit_loops(&mut self, loops: &[LoopSpec]) -> Result<(), GeometryError> {
        let candidate = build_from_loops(loops, self.next_face_key)?;
        *self = candidate;
        Ok(())
    }
}

/// Link a half-edge mesh from face loops given by position.
///
/// Positions equal within the base tolerance are unified into a single
/// vertex; twin half-edges are paired by their (origin, destination)
/// vertex pair. Directed edges left unpaired produce partially
/// specified edges, which is how the polygon state arises.
pub(crate) fn build_from_loops(
    loops: &[LoopSpec],
    mut next_face_key: u64,
) -> Result<Polyhedron, GeometryError> {
    let mut poly = Polyhedron::new();

    // Unify loop corners into vertices.
    let mut find_or_insert = |poly: &mut Polyhedron, p: &Point3| -> VertexId {
        if let Some(id) = poly.find_vertex(p, EPSILON) {
            id
        } else {
            poly.vertices.insert(Vertex {
                position: *p,
                leaving: None,
            })
        }
    };

    let mut pairing: HashMap<(VertexId, VertexId), HalfEdgeId> = HashMap::new();

    for spec in loops {
        let corner_ids: Vec<VertexId> = spec
            .positions
            .iter()
            .map(|p| find_or_insert(&mut poly, p))
            .collect();
        if corner_ids.len() < 3 {
            return Err(GeometryError::Degenerate(format!(
                "face loop with {} corners",
                corner_ids.len()
            )));
        }

        let key = match spec.key {
            Some(key) => {
                next_face_key = next_face_key.max(key.0 + 1);
                key
            }
            None => {
                let key = FaceKey(next_face_key);
                next_face_key += 1;
                key
            }
        };

        // Create the boundary half-edges, then link the loop.
        let hes: Vec<HalfEdgeId> = corner_ids
            .iter()
            .map(|&origin| {
                poly.half_edges.insert_with_key(|id| HalfEdge {
                    origin,
                    next: id,
                    prev: id,
                    twin: None,
                    edge: EdgeId::default(),
                    face: None,
                })
            })
            .collect();
        let n = hes.len();
        for i in 0..n {
            let next = hes[(i + 1) % n];
            let prev = hes[(i + n - 1) % n];
            let he = &mut poly.half_edges[hes[i]];
            he.next = next;
            he.prev = prev;
        }

        let face = poly.faces.insert(Face {
            boundary: hes[0],
            plane: spec.plane,
            key,
        });
        for &he in &hes {
            poly.half_edges[he].face = Some(face);
        }

        // Twin pairing by directed vertex pair.
        for i in 0..n {
            let a = corner_ids[i];
            let b = corner_ids[(i + 1) % n];
            let he = hes[i];
            if pairing.contains_key(&(a, b)) {
                return Err(GeometryError::Degenerate(
                    "directed edge bounded by two faces".into(),
                ));
            }
            if let Some(other) = pairing.remove(&(b, a)) {
                let edge = poly.edges.insert(Edge {
                    first: other,
                    second: Some(he),
                });
                poly.half_edges[he].twin = Some(other);
                poly.half_edges[he].edge = edge;
                poly.half_edges[other].twin = Some(he);
                poly.half_edges[other].edge = edge;
            } else {
                pairing.insert((a, b), he);
            }
        }
    }

    // Unpaired directed edges become partially specified edges.
    for (_, he) in pairing {
        let edge = poly.edges.insert(Edge {
            first: he,
            second: None,
        });
        poly.half_edges[he].edge = edge;
    }

    // Leaving edges, preferring fully specified ones.
    let assignments: Vec<(VertexId, HalfEdgeId, bool)> = poly
        .half_edges
        .iter()
        .map(|(id, he)| (he.origin, id, poly.edges[he.edge].fully_specified()))
        .collect();
    for (vertex, he, full) in assignments {
        let leaving = &mut poly.vertices[vertex].leaving;
        let upgrade = match leaving {
            None => true,
            Some(current) => full && !poly.edges[poly.half_edges[*current].edge].fully_specified(),
        };
        if upgrade {
            *leaving = Some(he);
        }
    }

    poly.next_face_key = next_face_key;
    poly.update_bounds();
    Ok(poly)
}
