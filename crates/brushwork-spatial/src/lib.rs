#![warn(missing_docs)]

//! Spatial acceleration for the brushwork kernel: a bounded octree over
//! axis-aligned boxes, and ray picking built on top of it.
//!
//! The index never owns scene objects. Callers register opaque handles
//! with bounds and inject the actual hit test as a closure at pick
//! time, so the same picker serves brushes, entities, and editor
//! handles alike.

mod octree;
mod pick;

pub use octree::{Octree, SpatialError};
pub use pick::{hit_type, Hit, HitTypeMask, PickResult, Picker};
