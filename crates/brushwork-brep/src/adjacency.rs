//! Face adjacency across brushes, matched by shared edges.
//!
//! The graph does not own any geometry: callers insert face boundaries
//! and get opaque node ids back, and payloads are whatever handle the
//! caller wants to attach (typically a brush index and a face key).
//! Edges are matched through a canonical direction key, so an edge and
//! its reverse land in the same bucket regardless of winding.

use std::collections::HashMap;

use brushwork_math::{points_equal, Point3, Vec3, EPSILON, POINT_STATUS_EPSILON};

/// Identifier of a node in a [`FaceAdjacencyGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AdjacencyNodeId(pub usize);

/// Quantized canonical edge direction, sign-normalized so that an edge
/// and its reverse hash identically.
type DirectionKey = (i64, i64, i64);

const DIRECTION_QUANTUM: f64 = 1024.0;

fn direction_key(a: &Point3, b: &Point3) -> Option<DirectionKey> {
    let v = b - a;
    let norm = v.norm();
    if norm < EPSILON {
        return None;
    }
    let mut dir: Vec3 = v / norm;
    // Sign-normalize on the first clearly nonzero component.
    for i in 0..3 {
        if dir[i].abs() > 1e-6 {
            if dir[i] < 0.0 {
                dir = -dir;
            }
            break;
        }
    }
    Some((
        (dir.x * DIRECTION_QUANTUM).round() as i64,
        (dir.y * DIRECTION_QUANTUM).round() as i64,
        (dir.z * DIRECTION_QUANTUM).round() as i64,
    ))
}

struct EdgeRef {
    node: usize,
    segment: (Point3, Point3),
}

/// Which faces touch which, discovered incrementally as faces are added.
pub struct FaceAdjacencyGraph<N> {
    payloads: Vec<N>,
    neighbours: Vec<Vec<AdjacencyNodeId>>,
    shared: HashMap<(usize, usize), Vec<(Point3, Point3)>>,
    index: HashMap<DirectionKey, Vec<EdgeRef>>,
    epsilon: f64,
}

impl<N> Default for FaceAdjacencyGraph<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> FaceAdjacencyGraph<N> {
    /// An empty graph with the default endpoint tolerance.
    pub fn new() -> Self {
        Self::with_epsilon(POINT_STATUS_EPSILON)
    }

    /// An empty graph matching endpoints within `epsilon`.
    pub fn with_epsilon(epsilon: f64) -> Self {
        Self {
            payloads: Vec::new(),
            neighbours: Vec::new(),
            shared: HashMap::new(),
            index: HashMap::new(),
            epsilon,
        }
    }

    /// Number of faces in the graph.
    pub fn node_count(&self) -> usize {
        self.payloads.len()
    }

    /// The payload attached to `node`. Panics if the id is stale.
    pub fn payload(&self, node: AdjacencyNodeId) -> &N {
        &self.payloads[node.0]
    }

    /// Nodes adjacent to `node`.
    pub fn neighbours(&self, node: AdjacencyNodeId) -> &[AdjacencyNodeId] {
        &self.neighbours[node.0]
    }

    /// Whether two faces share an edge.
    pub fn is_adjacent(&self, a: AdjacencyNodeId, b: AdjacencyNodeId) -> bool {
        self.neighbours[a.0].contains(&b)
    }

    /// The edge segments two faces share, empty when not adjacent.
    pub fn shared_edges(&self, a: AdjacencyNodeId, b: AdjacencyNodeId) -> &[(Point3, Point3)] {
        self.shared
            .get(&ordered(a.0, b.0))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Insert a face with its boundary loop and link it to every
    /// already-present face sharing one of its edges.
    ///
    /// Candidate edges are looked up by canonical direction and count
    /// as shared when they also share at least one endpoint within the
    /// graph's tolerance.
    pub fn add_face(&mut self, payload: N, boundary: &[Point3]) -> AdjacencyNodeId {
        let node = self.payloads.len();
        self.payloads.push(payload);
        self.neighbours.push(Vec::new());

        let n = boundary.len();
        for i in 0..n {
            let a = boundary[i];
            let b = boundary[(i + 1) % n];
            let Some(key) = direction_key(&a, &b) else {
                continue;
            };

            let mut links: Vec<usize> = Vec::new();
            if let Some(candidates) = self.index.get(&key) {
                for candidate in candidates {
                    if candidate.node == node {
                        continue;
                    }
                    let (ca, cb) = &candidate.segment;
                    // Same segment in either orientation. Matching on a
                    // single endpoint would conflate collinear
                    // neighbours with true shared edges.
                    let same_segment = (points_equal(&a, ca, self.epsilon)
                        && points_equal(&b, cb, self.epsilon))
                        || (points_equal(&a, cb, self.epsilon)
                            && points_equal(&b, ca, self.epsilon));
                    if same_segment {
                        links.push(candidate.node);
                    }
                }
            }
            for other in links {
                self.link(node, other, (a, b));
            }
            self.index
                .entry(key)
                .or_default()
                .push(EdgeRef {
                    node,
                    segment: (a, b),
                });
        }
        AdjacencyNodeId(node)
    }

    fn link(&mut self, a: usize, b: usize, segment: (Point3, Point3)) {
        let (ida, idb) = (AdjacencyNodeId(a), AdjacencyNodeId(b));
        if !self.neighbours[a].contains(&idb) {
            self.neighbours[a].push(idb);
            self.neighbours[b].push(ida);
        }
        self.shared.entry(ordered(a, b)).or_default().push(segment);
    }
}

fn ordered(a: usize, b: usize) -> (usize, usize) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64) -> Vec<Point3> {
        vec![
            Point3::new(x0, y0, 0.0),
            Point3::new(x0 + 1.0, y0, 0.0),
            Point3::new(x0 + 1.0, y0 + 1.0, 0.0),
            Point3::new(x0, y0 + 1.0, 0.0),
        ]
    }

    #[test]
    fn test_two_squares_sharing_an_edge() {
        let mut graph = FaceAdjacencyGraph::new();
        let a = graph.add_face("left", &square(0.0, 0.0));
        let b = graph.add_face("right", &square(1.0, 0.0));

        assert_eq!(graph.node_count(), 2);
        assert!(graph.is_adjacent(a, b));
        assert_eq!(graph.neighbours(a), &[b]);
        assert_eq!(graph.neighbours(b), &[a]);
        assert_eq!(*graph.payload(a), "left");

        // The shared edge is reported exactly once.
        let shared = graph.shared_edges(a, b);
        assert_eq!(shared.len(), 1);
        let (p, q) = shared[0];
        assert!((p.x - 1.0).abs() < 1e-9 && (q.x - 1.0).abs() < 1e-9);

        // An unrelated face added later links to neither.
        let c = graph.add_face("far", &square(10.0, 10.0));
        assert!(graph.neighbours(c).is_empty());
        assert_eq!(graph.neighbours(a), &[b]);
        assert_eq!(graph.neighbours(b), &[a]);
    }

    #[test]
    fn test_disjoint_faces_are_not_adjacent() {
        let mut graph = FaceAdjacencyGraph::new();
        let a = graph.add_face(0u32, &square(0.0, 0.0));
        let b = graph.add_face(1u32, &square(5.0, 5.0));
        assert!(!graph.is_adjacent(a, b));
        assert!(graph.shared_edges(a, b).is_empty());
    }

    #[test]
    fn test_corner_touch_is_not_adjacency() {
        // Diagonal squares touch at one corner with collinear edges;
        // that is not a shared edge.
        let mut graph = FaceAdjacencyGraph::new();
        let a = graph.add_face('a', &square(0.0, 0.0));
        let b = graph.add_face('b', &square(1.0, 1.0));
        assert!(!graph.is_adjacent(a, b));
    }

    #[test]
    fn test_reverse_winding_still_matches() {
        let mut graph = FaceAdjacencyGraph::new();
        let mut reversed = square(1.0, 0.0);
        reversed.reverse();
        let a = graph.add_face(0u8, &square(0.0, 0.0));
        let b = graph.add_face(1u8, &reversed);
        assert!(graph.is_adjacent(a, b));
    }
}
