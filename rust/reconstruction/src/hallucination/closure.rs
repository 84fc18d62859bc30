// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Loop closure: bridge a boundary loop to a displaced copy and cap it
//!
//! Ring `k` of loop vertex `p` sits on the camera ray through `p`'s pixel at
//! `lerp(depth(p), D, k / rings)`. Ring 0 is the base vertex itself. The cap
//! covers the lattice cells enclosed by the loop at depth `D`, wound so its
//! edges pair with the last bridge ring.

use super::{GenerationRule, HallucinatedPatch, PatchAnchor, PatchBuilder, PatchKind, VertexKey};
use crate::boundary::{BoundaryLoop, LoopKind, LoopVertex};
use crate::mesh_builder::BaseMesh;

/// Close one loop at `depth`, returning bridge patches followed by the cap.
pub(super) fn close_loop(
    base: &BaseMesh,
    boundary: &BoundaryLoop,
    depth: f64,
    rings: u32,
) -> Vec<HallucinatedPatch> {
    let rings = rings.max(1);
    let rule = match boundary.kind {
        LoopKind::Frame => GenerationRule::ShellClosure,
        LoopKind::Island => GenerationRule::IslandClosure,
        LoopKind::Occlusion => GenerationRule::OcclusionClosure,
    };
    let anchor = PatchAnchor::Loop(boundary.id);

    // Bridge patches keyed by kind, kept in first-seen order
    let mut bridges: Vec<(PatchKind, PatchBuilder)> = Vec::new();

    for (i, j) in boundary.edges() {
        let p = &boundary.vertices[i];
        let q = &boundary.vertices[j];
        let kind = bridge_kind(boundary.kind, p, q);

        let slot = match bridges.iter().position(|(k, _)| *k == kind) {
            Some(slot) => slot,
            None => {
                bridges.push((kind, PatchBuilder::new()));
                bridges.len() - 1
            }
        };
        let builder = &mut bridges[slot].1;
        let color = kind.color();

        for k in 0..rings {
            let p0 = ring_vertex(builder, base, boundary, p, k, rings, depth, color);
            let p1 = ring_vertex(builder, base, boundary, p, k + 1, rings, depth, color);
            let q0 = ring_vertex(builder, base, boundary, q, k, rings, depth, color);
            let q1 = ring_vertex(builder, base, boundary, q, k + 1, rings, depth, color);

            builder.triangle(q0, p0, p1);
            builder.triangle(q0, p1, q1);
        }
    }

    let mut patches: Vec<HallucinatedPatch> = bridges
        .into_iter()
        .map(|(kind, builder)| builder.finish(kind, rule, anchor))
        .collect();

    let cap_kind = match boundary.kind {
        LoopKind::Frame => PatchKind::BackWall,
        _ => PatchKind::OcclusionCap,
    };
    let cap = build_cap(base, boundary, depth, rings, cap_kind);
    if !cap.is_empty() {
        patches.push(cap.finish(cap_kind, rule, anchor));
    }

    patches
}

/// Frame bridges are named by the outward side of their edge
fn bridge_kind(kind: LoopKind, p: &LoopVertex, q: &LoopVertex) -> PatchKind {
    if kind != LoopKind::Frame {
        return PatchKind::OcclusionWall;
    }
    let du = q.pixel.0 as i64 - p.pixel.0 as i64;
    let dv = q.pixel.1 as i64 - p.pixel.1 as i64;
    match (du.signum(), dv.signum()) {
        (-1, 0) => PatchKind::Ceiling,
        (1, 0) => PatchKind::Floor,
        _ => PatchKind::SideWall,
    }
}

#[allow(clippy::too_many_arguments)]
fn ring_vertex(
    builder: &mut PatchBuilder,
    base: &BaseMesh,
    boundary: &BoundaryLoop,
    vertex: &LoopVertex,
    ring: u32,
    rings: u32,
    depth: f64,
    color: [f32; 3],
) -> u32 {
    if ring == 0 {
        return builder.keyed(VertexKey::Base(vertex.grid_index), vertex.position, color);
    }
    let d = if ring >= rings {
        depth
    } else {
        vertex.depth + (depth - vertex.depth) * (ring as f64 / rings as f64)
    };
    let (u, v) = vertex.pixel;
    builder.keyed(
        VertexKey::Displaced {
            loop_id: boundary.id,
            grid_index: vertex.grid_index,
            ring,
        },
        base.camera.project(u as f64, v as f64, d),
        color,
    )
}

fn build_cap(
    base: &BaseMesh,
    boundary: &BoundaryLoop,
    depth: f64,
    rings: u32,
    kind: PatchKind,
) -> PatchBuilder {
    let mut builder = PatchBuilder::new();
    let color = kind.color();
    let reversed = boundary.kind.is_outer();

    let corner = |builder: &mut PatchBuilder, u: u32, v: u32| -> u32 {
        builder.keyed(
            VertexKey::Displaced {
                loop_id: boundary.id,
                grid_index: v * base.width + u,
                ring: rings,
            },
            base.camera.project(u as f64, v as f64, depth),
            color,
        )
    };

    for (u, v) in boundary.enclosed_cells() {
        let a = corner(&mut builder, u, v);
        let b = corner(&mut builder, u + 1, v);
        let c = corner(&mut builder, u + 1, v + 1);
        let d = corner(&mut builder, u, v + 1);

        if reversed {
            builder.triangle(a, b, d);
            builder.triangle(b, c, d);
        } else {
            builder.triangle(a, d, b);
            builder.triangle(b, d, c);
        }
    }

    builder
}
