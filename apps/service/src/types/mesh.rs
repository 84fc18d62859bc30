// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh data types for serialization.

use depthscape_reconstruction::CombinedMesh;
use serde::{Deserialize, Serialize};

/// Combined scene mesh with per-triangle provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshPayload {
    /// Vertex positions (x, y, z triplets).
    pub positions: Vec<f32>,
    /// Vertex normals (x, y, z triplets).
    pub normals: Vec<f32>,
    /// Vertex colors (r, g, b triplets) in 0-1 range.
    pub colors: Vec<f32>,
    /// Triangle indices.
    pub indices: Vec<u32>,
    /// True for each hallucinated triangle.
    pub synthetic: Vec<bool>,
    /// Every edge shared by exactly two triangles.
    pub watertight: bool,
}

impl MeshPayload {
    /// Get the number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Get the number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

impl From<&CombinedMesh> for MeshPayload {
    fn from(combined: &CombinedMesh) -> Self {
        Self {
            positions: combined.mesh.positions.clone(),
            normals: combined.mesh.normals.clone(),
            colors: combined.mesh.colors.clone(),
            indices: combined.mesh.indices.clone(),
            synthetic: combined.synthetic.clone(),
            watertight: combined.is_watertight(),
        }
    }
}
