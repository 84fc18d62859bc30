// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Boundary-aware mesh building from a point grid

use crate::boundary::{resolve_pinches, trace_boundary_loops, BoundaryLoop, LoopKind};
use crate::error::{ReconstructionError, Result};
use crate::types::{CameraModel, PointGrid, ReconstructionConfig};
use depthscape_geometry::{calculate_normals, Mesh};

/// Mesh of the visible surface plus its boundary loops
#[derive(Debug, Clone)]
pub struct BaseMesh {
    pub mesh: Mesh,
    /// Grid index of each mesh vertex
    pub vertex_grid_index: Vec<u32>,
    /// Mesh vertex of each grid index, if emitted
    pub grid_vertex: Vec<Option<u32>>,
    pub loops: Vec<BoundaryLoop>,
    pub camera: CameraModel,
    pub width: u32,
    pub height: u32,
    pub quad_count: usize,
    /// Nearest visible depth
    pub min_depth: f64,
    /// Deepest visible depth
    pub max_depth: f64,
}

impl BaseMesh {
    pub fn frame_loop(&self) -> Option<&BoundaryLoop> {
        self.loops.iter().find(|l| l.kind == LoopKind::Frame)
    }

    pub fn occlusion_loops(&self) -> impl Iterator<Item = &BoundaryLoop> {
        self.loops.iter().filter(|l| l.kind == LoopKind::Occlusion)
    }
}

/// Build the visible-surface mesh.
///
/// Each 2x2 neighbourhood becomes two triangles unless a corner is invalid
/// or two corners differ in depth by more than the discontinuity threshold.
/// Rejected quads leave holes whose boundaries become occlusion loops.
/// Quads touching only at a corner are thinned first so every loop is simple.
pub fn build_base_mesh(grid: &PointGrid, config: &ReconstructionConfig) -> Result<BaseMesh> {
    let width = grid.width;
    let height = grid.height;
    if width < 2 || height < 2 {
        return Err(ReconstructionError::Degenerate(format!(
            "{}x{} grid has no quads",
            width, height
        )));
    }

    let quads_w = width - 1;
    let quads_h = height - 1;
    let threshold = config.discontinuity_threshold;

    let mut accepted = vec![false; (quads_w * quads_h) as usize];
    for v in 0..quads_h {
        for u in 0..quads_w {
            let corners = [
                grid.get(u, v),
                grid.get(u + 1, v),
                grid.get(u + 1, v + 1),
                grid.get(u, v + 1),
            ];
            if corners.iter().any(|p| !p.valid) {
                continue;
            }
            let (lo, hi) = corners.iter().fold((f64::MAX, f64::MIN), |(lo, hi), p| {
                (lo.min(p.depth), hi.max(p.depth))
            });
            if hi - lo > threshold {
                continue;
            }
            accepted[(v * quads_w + u) as usize] = true;
        }
    }

    // Loops through a pinch vertex cannot be closed without duplicate seams
    resolve_pinches(&mut accepted, quads_w, quads_h);

    let quad_count = accepted.iter().filter(|&&a| a).count();
    if quad_count == 0 {
        return Err(ReconstructionError::Degenerate(format!(
            "no valid quads in {}x{} depth grid ({} valid samples)",
            width,
            height,
            grid.valid_count()
        )));
    }

    let mut mesh = Mesh::with_capacity(quad_count + width as usize, quad_count * 6);
    let mut grid_vertex: Vec<Option<u32>> = vec![None; grid.points.len()];
    let mut vertex_grid_index = Vec::new();
    let mut min_depth = f64::MAX;
    let mut max_depth = f64::MIN;

    let mut vertex_for = |index: u32, mesh: &mut Mesh| -> u32 {
        if let Some(existing) = grid_vertex[index as usize] {
            return existing;
        }
        let point = &grid.points[index as usize];
        let vertex = mesh.add_vertex(point.position, point.color_f32());
        grid_vertex[index as usize] = Some(vertex);
        vertex_grid_index.push(index);
        min_depth = min_depth.min(point.depth);
        max_depth = max_depth.max(point.depth);
        vertex
    };

    for v in 0..quads_h {
        for u in 0..quads_w {
            if !accepted[(v * quads_w + u) as usize] {
                continue;
            }
            let a = vertex_for(grid.index(u, v), &mut mesh);
            let b = vertex_for(grid.index(u + 1, v), &mut mesh);
            let c = vertex_for(grid.index(u + 1, v + 1), &mut mesh);
            let d = vertex_for(grid.index(u, v + 1), &mut mesh);

            // Front faces toward the camera
            mesh.add_triangle(a, d, b);
            mesh.add_triangle(b, d, c);
        }
    }

    calculate_normals(&mut mesh);
    let loops = trace_boundary_loops(grid, &accepted);

    tracing::debug!(
        quads = quad_count,
        vertices = mesh.vertex_count(),
        loops = loops.len(),
        min_depth,
        max_depth,
        "built base mesh"
    );

    Ok(BaseMesh {
        mesh,
        vertex_grid_index,
        grid_vertex,
        loops,
        camera: grid.camera,
        width,
        height,
        quad_count,
        min_depth,
        max_depth,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::back_projection::back_project;
    use crate::types::{DepthGrid, DepthSample};
    use approx::assert_relative_eq;
    use depthscape_geometry::is_consistently_oriented;
    use image::RgbImage;

    fn build(depth: &DepthGrid) -> Result<BaseMesh> {
        let image = RgbImage::new(depth.width, depth.height);
        let config = ReconstructionConfig::default();
        let grid = back_project(&image, depth, &config)?;
        build_base_mesh(&grid, &config)
    }

    #[test]
    fn test_uniform_grid_is_fully_meshed() {
        let base = build(&DepthGrid::uniform(6, 5, 2.0, 1.0)).unwrap();
        assert_eq!(base.quad_count, 20);
        assert_eq!(base.mesh.triangle_count(), 40);
        assert_eq!(base.mesh.vertex_count(), 30);
        assert_eq!(base.loops.len(), 1);
        assert!(is_consistently_oriented(&base.mesh));

        // Visible surface faces the camera (+Z)
        for n in base.mesh.normals.chunks_exact(3) {
            assert_relative_eq!(n[2], 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_depth_discontinuity_splits_surface() {
        let mut depth = DepthGrid::uniform(6, 4, 1.0, 1.0);
        for v in 0..4 {
            for u in 3..6 {
                depth.samples[(v * 6 + u) as usize] = DepthSample::new(3.0, 1.0);
            }
        }
        let base = build(&depth).unwrap();
        // Column of quads spanning the step is rejected
        assert_eq!(base.quad_count, 2 * 3 + 2 * 3);
        assert_eq!(base.loops.len(), 2);
        assert_relative_eq!(base.min_depth, 1.0);
        assert_relative_eq!(base.max_depth, 3.0);
    }

    #[test]
    fn test_step_within_threshold_is_kept() {
        let mut depth = DepthGrid::uniform(4, 4, 1.0, 1.0);
        depth.samples[5] = DepthSample::new(1.5, 1.0);
        let base = build(&depth).unwrap();
        assert_eq!(base.quad_count, 9);
    }

    #[test]
    fn test_no_valid_quads_is_degenerate() {
        let err = build(&DepthGrid::uniform(5, 5, 1.0, 0.1)).unwrap_err();
        assert!(matches!(err, ReconstructionError::Degenerate(_)));
    }

    #[test]
    fn test_diagonal_holes_are_thinned_to_simple_loops() {
        // Invalid pixels on a diagonal reject quad blocks touching at corners
        let mut depth = DepthGrid::uniform(12, 12, 2.0, 1.0);
        for i in [3u32, 5, 7] {
            depth.samples[(i * 12 + i) as usize] = DepthSample::new(2.0, 0.0);
        }
        let base = build(&depth).unwrap();

        // Each invalid pixel rejects 4 quads, each pinch one more
        assert_eq!(base.quad_count, 121 - 12 - 2);
        for boundary in &base.loops {
            let mut indices = boundary.grid_indices();
            indices.sort_unstable();
            let len = indices.len();
            indices.dedup();
            assert_eq!(indices.len(), len);
        }
    }

    #[test]
    fn test_vertex_tables_are_inverse() {
        let mut depth = DepthGrid::uniform(5, 5, 1.0, 1.0);
        depth.samples[12] = DepthSample::new(1.0, 0.0);
        let base = build(&depth).unwrap();
        for (vertex, &grid_index) in base.vertex_grid_index.iter().enumerate() {
            assert_eq!(base.grid_vertex[grid_index as usize], Some(vertex as u32));
        }
        assert_eq!(base.grid_vertex[12], None);
    }
}
