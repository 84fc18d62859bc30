//! Depthscape geometry primitives
//!
//! Flat triangle meshes with per-vertex colors, closed solid primitives used
//! for synthesized scene elements, and edge-topology checks that verify a
//! mesh is watertight.

pub mod error;
pub mod mesh;
pub mod normals;
pub mod primitives;
pub mod topology;

// Re-export nalgebra types for convenience
pub use nalgebra::{Point3, Vector3};

pub use error::{Error, Result};
pub use mesh::Mesh;
pub use normals::calculate_normals;
pub use primitives::{cylinder, solid_box, Axis};
pub use topology::{edge_usage, is_consistently_oriented, is_watertight, open_edge_count};
