// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Edge topology checks

use crate::mesh::Mesh;
use rustc_hash::FxHashMap;

/// Count how many triangles use each undirected edge.
/// Keys are `(min, max)` vertex index pairs.
pub fn edge_usage(mesh: &Mesh) -> FxHashMap<(u32, u32), u32> {
    let mut usage: FxHashMap<(u32, u32), u32> = FxHashMap::default();
    usage.reserve(mesh.indices.len());

    for tri in mesh.indices.chunks_exact(3) {
        for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
            let key = if a < b { (a, b) } else { (b, a) };
            *usage.entry(key).or_insert(0) += 1;
        }
    }

    usage
}

/// Number of edges not shared by exactly two triangles
pub fn open_edge_count(mesh: &Mesh) -> usize {
    edge_usage(mesh).values().filter(|&&count| count != 2).count()
}

/// True when the mesh has triangles and every edge is shared by exactly two
pub fn is_watertight(mesh: &Mesh) -> bool {
    mesh.triangle_count() > 0 && open_edge_count(mesh) == 0
}

/// True when no directed edge occurs twice, i.e. neighbouring triangles agree
/// on winding.
pub fn is_consistently_oriented(mesh: &Mesh) -> bool {
    let mut seen: FxHashMap<(u32, u32), ()> = FxHashMap::default();
    for tri in mesh.indices.chunks_exact(3) {
        for edge in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
            if seen.insert(edge, ()).is_some() {
                return false;
            }
        }
    }
    true
}
