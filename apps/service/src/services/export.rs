// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh exporters.

use crate::error::JobError;
use crate::types::MeshPayload;
use depthscape_reconstruction::CombinedMesh;

/// Serializes a combined mesh into a named format.
pub trait Exporter: Send + Sync {
    fn export(&self, mesh: &CombinedMesh, format: &str) -> Result<Vec<u8>, JobError>;
}

/// JSON buffers: positions, normals, colors, indices and synthetic flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMeshExporter;

impl Exporter for JsonMeshExporter {
    fn export(&self, mesh: &CombinedMesh, format: &str) -> Result<Vec<u8>, JobError> {
        match format {
            "json" => Ok(serde_json::to_vec(&MeshPayload::from(mesh))?),
            other => Err(JobError::ExportFailure(format!(
                "unsupported export format '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depthscape_geometry::Mesh;

    fn combined() -> CombinedMesh {
        let mut mesh = Mesh::new();
        mesh.positions = vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        mesh.normals = vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
        mesh.colors = vec![0.5; 9];
        mesh.indices = vec![0, 1, 2];
        CombinedMesh {
            mesh,
            synthetic: vec![true],
            patch_count: 1,
            closed_loops: Vec::new(),
            open_loops: Vec::new(),
        }
    }

    #[test]
    fn test_json_export_round_trips() {
        let bytes = JsonMeshExporter.export(&combined(), "json").unwrap();
        let payload: MeshPayload = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(payload.triangle_count(), 1);
        assert_eq!(payload.synthetic, vec![true]);
        assert!(!payload.watertight);
    }

    #[test]
    fn test_unknown_format_fails() {
        let err = JobError::ExportFailure("unsupported export format 'obj'".into());
        assert_eq!(JsonMeshExporter.export(&combined(), "obj").unwrap_err(), err);
    }
}
