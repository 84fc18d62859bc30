// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Boundary loop tracing over the accepted quad lattice
//!
//! Quads are accepted or rejected as a whole, so every boundary edge is a
//! directed quad side on the pixel lattice. Edges are oriented with the
//! accepted region on their left as seen from the camera, which makes outer
//! boundaries counter-clockwise and holes clockwise.

use crate::types::PointGrid;
use nalgebra::Point3;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Role of a boundary loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopKind {
    /// Outer boundary of the largest visible region
    Frame,
    /// Hole inside the visible surface, left by an occlusion or missing data
    Occlusion,
    /// Outer boundary of a smaller disconnected visible region
    Island,
}

impl LoopKind {
    /// Outer loops wind counter-clockwise as seen from the camera
    pub fn is_outer(self) -> bool {
        matches!(self, LoopKind::Frame | LoopKind::Island)
    }
}

/// Vertex of a boundary loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopVertex {
    pub grid_index: u32,
    pub pixel: (u32, u32),
    pub position: Point3<f64>,
    pub depth: f64,
}

/// Ordered closed vertex cycle where the mesh has no neighbour
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryLoop {
    pub id: u32,
    pub kind: LoopKind,
    pub vertices: Vec<LoopVertex>,
    /// Signed area in pixel units, positive for outer loops
    pub signed_area: f64,
}

impl BoundaryLoop {
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Deepest visible sample on the loop
    pub fn max_depth(&self) -> f64 {
        self.vertices
            .iter()
            .map(|v| v.depth)
            .fold(f64::MIN, f64::max)
    }

    /// Directed edges as pairs of positions in `vertices`
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (i, (i + 1) % n))
    }

    pub fn grid_indices(&self) -> Vec<u32> {
        self.vertices.iter().map(|v| v.grid_index).collect()
    }

    /// Lattice cells `(u, v)` enclosed by the loop, by even-odd scanline over
    /// its vertical edges. Cells are ordered row by row.
    pub fn enclosed_cells(&self) -> Vec<(u32, u32)> {
        if self.vertices.len() < 4 {
            return Vec::new();
        }

        let min_v = self.vertices.iter().map(|v| v.pixel.1).min().unwrap_or(0);
        let max_v = self.vertices.iter().map(|v| v.pixel.1).max().unwrap_or(0);
        let rows = (max_v - min_v) as usize;
        let mut crossings: Vec<Vec<u32>> = vec![Vec::new(); rows];

        for (i, j) in self.edges() {
            let (pu, pv) = self.vertices[i].pixel;
            let (qu, qv) = self.vertices[j].pixel;
            if pu == qu && pv != qv {
                crossings[(pv.min(qv) - min_v) as usize].push(pu);
            }
        }

        let mut cells = Vec::new();
        for (row, xs) in crossings.iter_mut().enumerate() {
            xs.sort_unstable();
            for span in xs.chunks_exact(2) {
                for u in span[0]..span[1] {
                    cells.push((u, min_v + row as u32));
                }
            }
        }
        cells
    }
}

/// Reject quads until no lattice vertex is a pinch, returning how many were
/// rejected.
///
/// A pinch is an interior vertex whose four quads alternate accepted and
/// rejected around it (two accepted quads touching only at a corner). Its two
/// incoming and two outgoing boundary edges can be paired into either a
/// single loop that visits the vertex twice or two loops, depending on the
/// global shape, so no tracing rule can keep every loop simple. Of each
/// diagonal pair the quad with fewer accepted side neighbours is dropped,
/// ties dropping the later one. Rejection can expose new pinches, so passes
/// repeat until one changes nothing.
pub fn resolve_pinches(accepted: &mut [bool], quads_w: u32, quads_h: u32) -> usize {
    let at = |u: u32, v: u32| (v * quads_w + u) as usize;
    let mut rejected = 0;

    loop {
        let mut changed = false;
        for v in 1..quads_h {
            for u in 1..quads_w {
                let tl = at(u - 1, v - 1);
                let tr = at(u, v - 1);
                let bl = at(u - 1, v);
                let br = at(u, v);

                let pair = if accepted[tl] && accepted[br] && !accepted[tr] && !accepted[bl] {
                    Some((tl, br))
                } else if accepted[tr] && accepted[bl] && !accepted[tl] && !accepted[br] {
                    Some((tr, bl))
                } else {
                    None
                };

                if let Some((first, second)) = pair {
                    let drop = if side_neighbours(accepted, first, quads_w, quads_h)
                        < side_neighbours(accepted, second, quads_w, quads_h)
                    {
                        first
                    } else {
                        second
                    };
                    accepted[drop] = false;
                    rejected += 1;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    if rejected > 0 {
        tracing::debug!(rejected, "rejected quads at pinch vertices");
    }
    rejected
}

fn side_neighbours(accepted: &[bool], index: usize, quads_w: u32, quads_h: u32) -> usize {
    let u = (index as u32 % quads_w) as i64;
    let v = (index as u32 / quads_w) as i64;
    [(u - 1, v), (u + 1, v), (u, v - 1), (u, v + 1)]
        .into_iter()
        .filter(|&(nu, nv)| {
            nu >= 0
                && nv >= 0
                && nu < quads_w as i64
                && nv < quads_h as i64
                && accepted[(nv as u32 * quads_w + nu as u32) as usize]
        })
        .count()
}

/// Trace all boundary loops of the accepted quads.
///
/// `accepted` is indexed by quad `(u, v)` at `v * (width - 1) + u`. Loops are
/// simple when `accepted` has no pinch vertex (see [`resolve_pinches`]).
/// Loops come back frame first, then ordered by their first grid index, with
/// ids assigned in that order.
pub fn trace_boundary_loops(grid: &PointGrid, accepted: &[bool]) -> Vec<BoundaryLoop> {
    let width = grid.width;
    let height = grid.height;
    if width < 2 || height < 2 {
        return Vec::new();
    }
    let quads_w = width - 1;
    let quads_h = height - 1;
    let is_accepted = |u: i64, v: i64| -> bool {
        u >= 0
            && v >= 0
            && u < quads_w as i64
            && v < quads_h as i64
            && accepted[(v as u32 * quads_w + u as u32) as usize]
    };

    let mut outgoing: FxHashMap<u32, SmallVec<[u32; 2]>> = FxHashMap::default();
    let mut add_edge = |from: u32, to: u32| outgoing.entry(from).or_default().push(to);

    for v in 0..quads_h {
        for u in 0..quads_w {
            if !accepted[(v * quads_w + u) as usize] {
                continue;
            }
            let a = grid.index(u, v);
            let b = grid.index(u + 1, v);
            let c = grid.index(u + 1, v + 1);
            let d = grid.index(u, v + 1);
            let (ui, vi) = (u as i64, v as i64);

            if !is_accepted(ui, vi - 1) {
                add_edge(b, a);
            }
            if !is_accepted(ui, vi + 1) {
                add_edge(d, c);
            }
            if !is_accepted(ui - 1, vi) {
                add_edge(a, d);
            }
            if !is_accepted(ui + 1, vi) {
                add_edge(c, b);
            }
        }
    }

    let mut starts: Vec<u32> = outgoing.keys().copied().collect();
    starts.sort_unstable();

    let mut cycles: Vec<Vec<u32>> = Vec::new();
    for start in starts {
        while let Some(first) = take_edge(&mut outgoing, start, None, width) {
            let mut cycle = vec![start];
            let mut prev = start;
            let mut current = first;
            let mut closed = true;

            while current != start {
                cycle.push(current);
                match take_edge(&mut outgoing, current, Some(prev), width) {
                    Some(next) => {
                        prev = current;
                        current = next;
                    }
                    None => {
                        closed = false;
                        break;
                    }
                }
            }

            if closed {
                cycles.push(cycle);
            } else {
                tracing::warn!(start, len = cycle.len(), "dropping unclosed boundary chain");
            }
        }
    }

    classify_cycles(grid, cycles)
}

/// Remove and return the next boundary edge leaving `from`.
///
/// With more than one candidate (a pinch vertex) the tightest turn relative
/// to the incoming edge wins. Tracing stays total on such input, but the
/// resulting loop may revisit the pinch.
fn take_edge(
    outgoing: &mut FxHashMap<u32, SmallVec<[u32; 2]>>,
    from: u32,
    prev: Option<u32>,
    width: u32,
) -> Option<u32> {
    let targets = outgoing.get_mut(&from)?;
    if targets.is_empty() {
        return None;
    }

    let pick = match prev {
        Some(prev) if targets.len() > 1 => {
            let (in_u, in_v) = direction(prev, from, width);
            let mut best = 0;
            let mut best_turn = i64::MAX;
            for (i, &to) in targets.iter().enumerate() {
                let (out_u, out_v) = direction(from, to, width);
                let turn = in_u * out_v - in_v * out_u;
                if turn < best_turn {
                    best_turn = turn;
                    best = i;
                }
            }
            best
        }
        _ => 0,
    };

    Some(targets.remove(pick))
}

#[inline]
fn direction(from: u32, to: u32, width: u32) -> (i64, i64) {
    (
        (to % width) as i64 - (from % width) as i64,
        (to / width) as i64 - (from / width) as i64,
    )
}

/// Signed area in `(u, -v)` space: positive for counter-clockwise as seen from the camera
fn signed_area(cycle: &[u32], width: u32) -> f64 {
    let n = cycle.len();
    let twice: i64 = (0..n)
        .map(|i| {
            let p = cycle[i];
            let q = cycle[(i + 1) % n];
            let (px, py) = ((p % width) as i64, -((p / width) as i64));
            let (qx, qy) = ((q % width) as i64, -((q / width) as i64));
            px * qy - qx * py
        })
        .sum();
    twice as f64 / 2.0
}

fn classify_cycles(grid: &PointGrid, cycles: Vec<Vec<u32>>) -> Vec<BoundaryLoop> {
    let areas: Vec<f64> = cycles.iter().map(|c| signed_area(c, grid.width)).collect();

    // Largest outer loop; ties go to the earliest traced
    let frame = areas
        .iter()
        .enumerate()
        .filter(|(_, area)| **area > 0.0)
        .fold(None, |best: Option<(usize, f64)>, (i, &area)| match best {
            Some((_, best_area)) if best_area >= area => best,
            _ => Some((i, area)),
        })
        .map(|(i, _)| i);

    let mut loops: Vec<BoundaryLoop> = cycles
        .into_iter()
        .zip(areas)
        .enumerate()
        .map(|(i, (cycle, area))| {
            let kind = if Some(i) == frame {
                LoopKind::Frame
            } else if area > 0.0 {
                LoopKind::Island
            } else {
                LoopKind::Occlusion
            };
            let vertices = cycle
                .into_iter()
                .map(|index| {
                    let point = &grid.points[index as usize];
                    LoopVertex {
                        grid_index: index,
                        pixel: grid.pixel(index),
                        position: point.position,
                        depth: point.depth,
                    }
                })
                .collect();
            BoundaryLoop {
                id: 0,
                kind,
                vertices,
                signed_area: area,
            }
        })
        .collect();

    loops.sort_by_key(|l| (l.kind != LoopKind::Frame, l.vertices[0].grid_index));
    for (id, boundary) in loops.iter_mut().enumerate() {
        boundary.id = id as u32;
    }
    loops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CameraModel, GridPoint};

    fn flat_grid(width: u32, height: u32) -> PointGrid {
        let camera = CameraModel::for_dimensions(width, height, 0.8);
        let points = (0..height)
            .flat_map(|v| (0..width).map(move |u| (u, v)))
            .map(|(u, v)| GridPoint {
                position: camera.project(u as f64, v as f64, 1.0),
                color: [0, 0, 0],
                depth: 1.0,
                valid: true,
            })
            .collect();
        PointGrid {
            width,
            height,
            camera,
            points,
        }
    }

    #[test]
    fn test_full_grid_has_single_frame_loop() {
        let grid = flat_grid(5, 4);
        let accepted = vec![true; 4 * 3];
        let loops = trace_boundary_loops(&grid, &accepted);

        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].kind, LoopKind::Frame);
        assert_eq!(loops[0].len(), 2 * 4 + 2 * 3);
        assert_eq!(loops[0].signed_area, 12.0);
        assert_eq!(loops[0].enclosed_cells().len(), 12);
    }

    #[test]
    fn test_rejected_center_quad_is_occlusion_loop() {
        let grid = flat_grid(4, 4);
        let mut accepted = vec![true; 9];
        accepted[4] = false;
        let loops = trace_boundary_loops(&grid, &accepted);

        assert_eq!(loops.len(), 2);
        assert_eq!(loops[0].kind, LoopKind::Frame);
        assert_eq!(loops[1].kind, LoopKind::Occlusion);
        assert_eq!(loops[1].len(), 4);
        assert_eq!(loops[1].signed_area, -1.0);
        assert_eq!(loops[1].enclosed_cells(), vec![(1, 1)]);
        // Frame encloses the hole cell too
        assert_eq!(loops[0].enclosed_cells().len(), 9);
    }

    #[test]
    fn test_pinch_vertex_splits_into_simple_loops() {
        // Checkerboard 2x2: quads (0,0) and (1,1) accepted, touching at one vertex
        let grid = flat_grid(3, 3);
        let accepted = vec![true, false, false, true];
        let loops = trace_boundary_loops(&grid, &accepted);

        assert_eq!(loops.len(), 2);
        for boundary in &loops {
            assert_eq!(boundary.len(), 4);
            assert!(boundary.kind.is_outer());
        }
        assert_eq!(loops[0].kind, LoopKind::Frame);
        assert_eq!(loops[1].kind, LoopKind::Island);
    }

    #[test]
    fn test_every_boundary_edge_is_used_once() {
        let grid = flat_grid(6, 6);
        let mut accepted = vec![true; 25];
        accepted[6] = false;
        accepted[12] = false;
        accepted[18] = false;
        let loops = trace_boundary_loops(&grid, &accepted);

        let mut edges = rustc_hash::FxHashSet::default();
        for boundary in &loops {
            for (i, j) in boundary.edges() {
                let edge = (boundary.vertices[i].grid_index, boundary.vertices[j].grid_index);
                assert!(edges.insert(edge), "edge {:?} traced twice", edge);
            }
        }
        // Outer 20 + diagonal hole chain of three cells touching at corners
        assert_eq!(edges.len(), 20 + 12);
    }

    #[test]
    fn test_resolve_pinches_thins_checkerboard() {
        let mut accepted = vec![true, false, false, true];
        assert_eq!(resolve_pinches(&mut accepted, 2, 2), 1);
        assert_eq!(accepted, vec![true, false, false, false]);

        let grid = flat_grid(3, 3);
        let loops = trace_boundary_loops(&grid, &accepted);
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].len(), 4);
    }

    #[test]
    fn test_resolve_pinches_drops_less_connected_quad() {
        let mut accepted = vec![
            true, true, true, //
            false, false, true, //
            false, true, false,
        ];
        // (2,1) and (1,2) pinch at vertex (2,2); (1,2) has no side neighbours
        assert_eq!(resolve_pinches(&mut accepted, 3, 3), 1);
        assert!(!accepted[7]);
        assert!(accepted[5]);
    }

    #[test]
    fn test_resolved_diagonal_chain_traces_simple_loops() {
        let grid = flat_grid(8, 8);
        let mut accepted = vec![true; 49];
        for i in [8usize, 16, 24, 32] {
            accepted[i] = false;
        }
        assert!(resolve_pinches(&mut accepted, 7, 7) > 0);

        for boundary in trace_boundary_loops(&grid, &accepted) {
            let mut indices = boundary.grid_indices();
            indices.sort_unstable();
            let len = indices.len();
            indices.dedup();
            assert_eq!(indices.len(), len, "loop {} revisits a vertex", boundary.id);
        }
    }

    #[test]
    fn test_no_accepted_quads_no_loops() {
        let grid = flat_grid(3, 3);
        assert!(trace_boundary_loops(&grid, &[false; 4]).is_empty());
    }
}
