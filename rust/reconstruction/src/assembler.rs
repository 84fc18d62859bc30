// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scene assembly: merge the base mesh and hallucinated patches

use crate::boundary::LoopKind;
use crate::hallucination::{HallucinatedPatch, PatchAnchor, VertexKey};
use crate::mesh_builder::BaseMesh;
use depthscape_geometry::{calculate_normals, is_watertight, open_edge_count, Mesh};
use rustc_hash::{FxHashMap, FxHashSet};

/// Base mesh plus all patches with per-triangle provenance
#[derive(Debug, Clone)]
pub struct CombinedMesh {
    pub mesh: Mesh,
    /// One flag per triangle, true for hallucinated geometry
    pub synthetic: Vec<bool>,
    pub patch_count: usize,
    /// Loops closed by at least one patch, by id
    pub closed_loops: Vec<u32>,
    /// Loops left open, by id
    pub open_loops: Vec<u32>,
}

impl CombinedMesh {
    pub fn synthetic_triangle_count(&self) -> usize {
        self.synthetic.iter().filter(|&&s| s).count()
    }

    pub fn is_watertight(&self) -> bool {
        is_watertight(&self.mesh)
    }

    pub fn open_edge_count(&self) -> usize {
        open_edge_count(&self.mesh)
    }
}

/// Merge patches into the base mesh.
///
/// `Base` keys resolve to the existing base vertex so closures share the
/// loop cycle exactly. `Displaced` keys are shared between patches of the
/// same loop. Unkeyed vertices stay private to their patch.
pub fn assemble(base: &BaseMesh, patches: &[HallucinatedPatch]) -> CombinedMesh {
    let mut mesh = base.mesh.clone();
    let mut synthetic = vec![false; mesh.triangle_count()];

    if patches.is_empty() {
        let open_loops = base.loops.iter().map(|l| l.id).collect();
        return CombinedMesh {
            mesh,
            synthetic,
            patch_count: 0,
            closed_loops: Vec::new(),
            open_loops,
        };
    }

    let extra_vertices: usize = patches.iter().map(|p| p.vertices.len()).sum();
    let extra_indices: usize = patches.iter().map(|p| p.indices.len()).sum();
    mesh.positions.reserve(extra_vertices * 3);
    mesh.normals.reserve(extra_vertices * 3);
    mesh.colors.reserve(extra_vertices * 3);
    mesh.indices.reserve(extra_indices);
    synthetic.reserve(extra_indices / 3);

    let mut displaced: FxHashMap<VertexKey, u32> = FxHashMap::default();
    let mut closed: FxHashSet<u32> = FxHashSet::default();
    let mut unresolved = 0usize;

    for patch in patches {
        if let PatchAnchor::Loop(id) = patch.anchor {
            closed.insert(id);
        }

        let remap: Vec<u32> = patch
            .vertices
            .iter()
            .map(|vertex| match vertex.key {
                Some(VertexKey::Base(grid_index)) => {
                    match base.grid_vertex.get(grid_index as usize).copied().flatten() {
                        Some(index) => index,
                        None => {
                            unresolved += 1;
                            mesh.add_vertex(vertex.position, vertex.color)
                        }
                    }
                }
                Some(key) => *displaced
                    .entry(key)
                    .or_insert_with(|| mesh.add_vertex(vertex.position, vertex.color)),
                None => mesh.add_vertex(vertex.position, vertex.color),
            })
            .collect();

        for tri in patch.indices.chunks_exact(3) {
            mesh.add_triangle(
                remap[tri[0] as usize],
                remap[tri[1] as usize],
                remap[tri[2] as usize],
            );
            synthetic.push(true);
        }
    }

    if unresolved > 0 {
        tracing::warn!(unresolved, "patch referenced base vertices missing from the mesh");
    }

    calculate_normals(&mut mesh);

    let (closed_loops, open_loops): (Vec<u32>, Vec<u32>) = base
        .loops
        .iter()
        .map(|l| l.id)
        .partition(|id| closed.contains(id));

    tracing::debug!(
        vertices = mesh.vertex_count(),
        triangles = mesh.triangle_count(),
        patches = patches.len(),
        closed = closed_loops.len(),
        frame_closed = base
            .loops
            .iter()
            .any(|l| l.kind == LoopKind::Frame && closed.contains(&l.id)),
        "assembled scene"
    );

    CombinedMesh {
        mesh,
        synthetic,
        patch_count: patches.len(),
        closed_loops,
        open_loops,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::back_projection::back_project;
    use crate::hallucination::hallucinate;
    use crate::mesh_builder::build_base_mesh;
    use crate::types::{
        DepthGrid, GenerationOptions, ReconstructionConfig, RoomComplexity, SceneCategory,
        SceneClassification,
    };
    use image::RgbImage;

    fn base(depth: &DepthGrid) -> BaseMesh {
        let image = RgbImage::new(depth.width, depth.height);
        let config = ReconstructionConfig::default();
        let grid = back_project(&image, depth, &config).unwrap();
        build_base_mesh(&grid, &config).unwrap()
    }

    #[test]
    fn test_no_patches_keeps_base() {
        let base = base(&DepthGrid::uniform(8, 6, 2.0, 1.0));
        let combined = assemble(&base, &[]);
        assert_eq!(combined.mesh, base.mesh);
        assert_eq!(combined.synthetic_triangle_count(), 0);
        assert_eq!(combined.open_loops.len(), base.loops.len());
        assert!(!combined.is_watertight());
    }

    #[test]
    fn test_closed_shell_is_watertight() {
        let base = base(&DepthGrid::uniform(8, 6, 2.0, 1.0));
        let options = GenerationOptions {
            room_complexity: RoomComplexity::Low,
            ..GenerationOptions::default()
        };
        let patches = hallucinate(
            &base,
            &SceneClassification::known(SceneCategory::Generic),
            &options,
            1,
        )
        .unwrap();
        let combined = assemble(&base, &patches);

        assert!(combined.is_watertight());
        assert_eq!(combined.open_edge_count(), 0);
        assert!(combined.open_loops.is_empty());
        assert_eq!(combined.closed_loops, vec![0]);
        assert_eq!(
            combined.synthetic.len(),
            combined.mesh.triangle_count()
        );
        assert_eq!(
            combined.mesh.triangle_count() - combined.synthetic_triangle_count(),
            base.mesh.triangle_count()
        );
    }

    #[test]
    fn test_base_keys_reuse_base_vertices() {
        let base = base(&DepthGrid::uniform(6, 6, 3.0, 1.0));
        let patches = hallucinate(
            &base,
            &SceneClassification::known(SceneCategory::Generic),
            &GenerationOptions::default(),
            1,
        )
        .unwrap();
        let combined = assemble(&base, &patches);

        // Only displaced vertices are new: one ring per frame vertex plus the cap interior
        let frame = base.frame_loop().unwrap();
        let cap_vertices = 6 * 6;
        let ring_vertices = frame.len() * (options_rings() - 1) as usize;
        assert_eq!(
            combined.mesh.vertex_count(),
            base.mesh.vertex_count() + cap_vertices + ring_vertices
        );
    }

    fn options_rings() -> u32 {
        GenerationOptions::default().room_complexity.bridge_rings()
    }
}
