#![warn(missing_docs)]

//! Half-edge boundary representation for convex brush geometry.
//!
//! The central type is [`Polyhedron`], a convex solid stored as a
//! half-edge mesh in generational arenas. It is built incrementally as
//! the convex hull of a point set, clipped by half-spaces, and edited by
//! moving vertices. Degenerate configurations (a single point, a
//! segment, a planar polygon) are first-class states of the same type,
//! so hull construction can pass through them without special cases at
//! the call site.
//!
//! Structural soundness is expressed as a set of individually callable
//! invariant checks (see the methods named `check_*`); mutating
//! operations validate their result before committing it, so a failed
//! operation leaves the polyhedron untouched.

mod adjacency;
mod clip;
mod hull;
mod invariants;
mod moves;
mod topology;

pub use adjacency::{AdjacencyNodeId, FaceAdjacencyGraph};
pub use clip::ClipResult;
pub use topology::{
    Edge, EdgeId, Face, FaceHitSide, FaceId, FaceKey, FaceRayHit, HalfEdge, HalfEdgeId,
    Polyhedron, Vertex, VertexId,
};

use brushwork_math::Point3;
use thiserror::Error;

/// Errors reported by brush geometry operations.
///
/// These cover expected failures of valid requests (a vertex move that
/// would collapse the solid, a clip of a degenerate polyhedron).
/// Passing stale arena ids is a caller bug and panics instead.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// The operation requires the polyhedron to be a closed solid.
    #[error("operation requires a closed polyhedron")]
    NotAPolyhedron,

    /// The operation would produce or encountered degenerate geometry.
    #[error("degenerate geometry: {0}")]
    Degenerate(String),

    /// No vertex exists at the given position.
    #[error("no vertex at {0}")]
    VertexNotFound(Point3),

    /// A vertex move was rejected; the polyhedron is unchanged.
    #[error("invalid vertex move: {0}")]
    InvalidMove(String),

    /// A structural invariant does not hold.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}
