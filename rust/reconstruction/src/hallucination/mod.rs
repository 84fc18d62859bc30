// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rule-driven synthesis of geometry the camera could not see
//!
//! Closing patches bridge each boundary loop back along its pixel rays to a
//! displaced copy and cap it. Interior elements fill the floor region of the
//! room frustum according to the scene category. All randomness comes from
//! seeded ChaCha streams, one per rule and pass.

mod closure;
mod interiors;
mod room;

pub use room::RoomFrame;

use crate::boundary::LoopKind;
use crate::error::Result;
use crate::mesh_builder::BaseMesh;
use crate::types::{GenerationOptions, RoomComplexity, SceneClassification};
use depthscape_geometry::Mesh;
use nalgebra::Point3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// What a patch represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchKind {
    BackWall,
    Ceiling,
    Floor,
    SideWall,
    OcclusionWall,
    OcclusionCap,
    Catwalk,
    Pipe,
    Machinery,
    Furniture,
    Pillar,
    Trim,
    Beam,
}

impl PatchKind {
    /// Closing surfaces attach to a boundary loop; everything else is an interior element
    pub fn is_closure(self) -> bool {
        matches!(
            self,
            PatchKind::BackWall
                | PatchKind::Ceiling
                | PatchKind::Floor
                | PatchKind::SideWall
                | PatchKind::OcclusionWall
                | PatchKind::OcclusionCap
        )
    }

    pub(crate) fn color(self) -> [f32; 3] {
        match self {
            PatchKind::BackWall => [0.7, 0.7, 0.7],
            PatchKind::Ceiling => [0.8, 0.8, 0.8],
            PatchKind::Floor => [0.3, 0.3, 0.3],
            PatchKind::SideWall => [0.65, 0.65, 0.65],
            PatchKind::OcclusionWall => [0.55, 0.55, 0.55],
            PatchKind::OcclusionCap => [0.5, 0.5, 0.5],
            PatchKind::Catwalk => [0.4, 0.4, 0.4],
            PatchKind::Pipe => [0.5, 0.5, 0.5],
            PatchKind::Machinery => [0.45, 0.45, 0.5],
            PatchKind::Furniture => [0.6, 0.4, 0.3],
            PatchKind::Pillar => [0.5, 0.5, 0.5],
            PatchKind::Trim => [0.6, 0.6, 0.6],
            PatchKind::Beam => [0.55, 0.55, 0.55],
        }
    }
}

/// Rule that generated a patch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationRule {
    ShellClosure,
    OcclusionClosure,
    IslandClosure,
    FactoryLayout,
    FurnitureScatter,
    StructuralGrid,
}

/// Where a patch is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchAnchor {
    Loop(u32),
    FloorRegion,
}

/// Identity of a vertex that may be shared across patches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VertexKey {
    /// Vertex of the base mesh, by grid index
    Base(u32),
    /// Vertex on the camera ray of a loop pixel
    Displaced { loop_id: u32, grid_index: u32, ring: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatchVertex {
    pub position: Point3<f64>,
    pub color: [f32; 3],
    /// Shared identity; `None` for vertices private to the patch
    pub key: Option<VertexKey>,
}

/// Synthetic mesh fragment with provenance
#[derive(Debug, Clone, PartialEq)]
pub struct HallucinatedPatch {
    pub kind: PatchKind,
    pub rule: GenerationRule,
    pub anchor: PatchAnchor,
    pub vertices: Vec<PatchVertex>,
    pub indices: Vec<u32>,
}

impl HallucinatedPatch {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Shared keys referenced by this patch
    pub fn keys(&self) -> impl Iterator<Item = VertexKey> + '_ {
        self.vertices.iter().filter_map(|v| v.key)
    }
}

/// Incremental patch construction with key deduplication
pub(crate) struct PatchBuilder {
    vertices: Vec<PatchVertex>,
    indices: Vec<u32>,
    lookup: FxHashMap<VertexKey, u32>,
}

impl PatchBuilder {
    pub(crate) fn new() -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            lookup: FxHashMap::default(),
        }
    }

    pub(crate) fn keyed(&mut self, key: VertexKey, position: Point3<f64>, color: [f32; 3]) -> u32 {
        let next = self.vertices.len() as u32;
        let vertices = &mut self.vertices;
        *self.lookup.entry(key).or_insert_with(|| {
            vertices.push(PatchVertex {
                position,
                color,
                key: Some(key),
            });
            next
        })
    }

    pub(crate) fn triangle(&mut self, a: u32, b: u32, c: u32) {
        self.indices.extend_from_slice(&[a, b, c]);
    }

    /// Append a closed primitive; its vertices stay private to this patch
    pub(crate) fn append_mesh(&mut self, mesh: &Mesh) {
        let offset = self.vertices.len() as u32;
        for (i, chunk) in mesh.positions.chunks_exact(3).enumerate() {
            let color = [
                mesh.colors[i * 3],
                mesh.colors[i * 3 + 1],
                mesh.colors[i * 3 + 2],
            ];
            self.vertices.push(PatchVertex {
                position: Point3::new(chunk[0] as f64, chunk[1] as f64, chunk[2] as f64),
                color,
                key: None,
            });
        }
        self.indices
            .extend(mesh.indices.iter().map(|&i| i + offset));
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub(crate) fn finish(
        self,
        kind: PatchKind,
        rule: GenerationRule,
        anchor: PatchAnchor,
    ) -> HallucinatedPatch {
        HallucinatedPatch {
            kind,
            rule,
            anchor,
            vertices: self.vertices,
            indices: self.indices,
        }
    }
}

/// Random stream identifiers; each rule pass draws from its own stream
pub(crate) mod streams {
    pub const MACHINERY: u64 = 1;
    pub const MACHINERY_SECONDARY: u64 = 2;
    pub const FURNITURE: u64 = 3;
    pub const FURNITURE_SECONDARY: u64 = 4;
}

pub(crate) fn stream_rng(seed: u64, stream: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream);
    rng
}

/// Synthesize closing and interior geometry for a base mesh.
///
/// Patches come back in a fixed order: frame closure, island closures,
/// occlusion closures, then interior elements. Identical inputs and seed
/// always give identical patches.
pub fn hallucinate(
    base: &BaseMesh,
    classification: &SceneClassification,
    options: &GenerationOptions,
    seed: u64,
) -> Result<Vec<HallucinatedPatch>> {
    if !options.hallucinate_unseen {
        return Ok(Vec::new());
    }

    let rings = options.room_complexity.bridge_rings();
    let back_depth = base.max_depth + options.wall_thickness;
    let mut patches = Vec::new();

    for kind in [LoopKind::Frame, LoopKind::Island, LoopKind::Occlusion] {
        for boundary in base.loops.iter().filter(|l| l.kind == kind) {
            let depth = match kind {
                LoopKind::Frame => back_depth,
                _ => boundary.max_depth() + options.wall_thickness,
            };
            patches.extend(closure::close_loop(base, boundary, depth, rings));
        }
    }

    let closure_count = patches.len();
    if options.generate_interiors && options.room_complexity > RoomComplexity::Low {
        let room = RoomFrame::new(base, back_depth);
        patches.extend(interiors::populate(
            &room,
            classification.category,
            options,
            seed,
        )?);
    }

    tracing::debug!(
        closures = closure_count,
        interiors = patches.len() - closure_count,
        category = %classification.category,
        complexity = %options.room_complexity,
        "hallucinated unseen geometry"
    );

    Ok(patches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::back_projection::back_project;
    use crate::mesh_builder::build_base_mesh;
    use crate::types::{DepthGrid, DepthSample, ReconstructionConfig, SceneCategory};
    use approx::assert_relative_eq;
    use image::RgbImage;

    fn base_for(depth: &DepthGrid) -> BaseMesh {
        let config = ReconstructionConfig::default();
        let image = RgbImage::new(depth.width, depth.height);
        let grid = back_project(&image, depth, &config).unwrap();
        build_base_mesh(&grid, &config).unwrap()
    }

    /// Floor receding toward the top of the frame
    fn room_depth(width: u32, height: u32) -> DepthGrid {
        let samples = (0..height)
            .flat_map(|v| {
                (0..width).map(move |_| {
                    DepthSample::new(2.0 + 3.0 * (height - 1 - v) as f32 / (height - 1) as f32, 1.0)
                })
            })
            .collect();
        DepthGrid::new(width, height, samples).unwrap()
    }

    fn options(complexity: RoomComplexity) -> GenerationOptions {
        GenerationOptions {
            room_complexity: complexity,
            ..GenerationOptions::default()
        }
    }

    fn interior_count(patches: &[HallucinatedPatch]) -> usize {
        patches
            .iter()
            .filter(|p| p.anchor == PatchAnchor::FloorRegion)
            .count()
    }

    #[test]
    fn test_disabled_hallucination_is_empty() {
        let base = base_for(&room_depth(16, 12));
        let options = GenerationOptions {
            hallucinate_unseen: false,
            ..GenerationOptions::default()
        };
        let classification = SceneClassification::known(SceneCategory::Factory);
        assert!(hallucinate(&base, &classification, &options, 7).unwrap().is_empty());
    }

    #[test]
    fn test_frame_closed_first_with_back_wall_offset() {
        let base = base_for(&room_depth(16, 12));
        let classification = SceneClassification::known(SceneCategory::Generic);
        let patches = hallucinate(&base, &classification, &options(RoomComplexity::Low), 7).unwrap();

        assert_eq!(patches[0].anchor, PatchAnchor::Loop(0));
        assert_eq!(patches[0].rule, GenerationRule::ShellClosure);

        let back = patches
            .iter()
            .find(|p| p.kind == PatchKind::BackWall)
            .expect("back wall");
        for vertex in &back.vertices {
            assert_relative_eq!(-vertex.position.z, base.max_depth + 0.3, epsilon = 1e-9);
        }
        assert_eq!(interior_count(&patches), 0);
    }

    #[test]
    fn test_same_seed_same_patches() {
        let base = base_for(&room_depth(20, 16));
        let classification = SceneClassification::known(SceneCategory::Interior);
        let a = hallucinate(&base, &classification, &options(RoomComplexity::High), 42).unwrap();
        let b = hallucinate(&base, &classification, &options(RoomComplexity::High), 42).unwrap();
        assert_eq!(a, b);

        let c = hallucinate(&base, &classification, &options(RoomComplexity::High), 43).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_complexity_is_monotonic() {
        let base = base_for(&room_depth(20, 16));
        for category in [
            SceneCategory::Factory,
            SceneCategory::Interior,
            SceneCategory::Building,
        ] {
            let classification = SceneClassification::known(category);
            let counts: Vec<usize> = [RoomComplexity::Low, RoomComplexity::Medium, RoomComplexity::High]
                .into_iter()
                .map(|c| interior_count(&hallucinate(&base, &classification, &options(c), 9).unwrap()))
                .collect();
            assert_eq!(counts[0], 0, "{:?}", category);
            assert!(counts[0] <= counts[1] && counts[1] <= counts[2], "{:?}: {:?}", category, counts);
            assert!(counts[1] > 0, "{:?}", category);
        }
    }

    #[test]
    fn test_exterior_has_no_interiors() {
        let base = base_for(&room_depth(16, 12));
        let classification = SceneClassification::known(SceneCategory::Exterior);
        let patches = hallucinate(&base, &classification, &options(RoomComplexity::High), 1).unwrap();
        assert_eq!(interior_count(&patches), 0);
        assert!(!patches.is_empty());
    }

    #[test]
    fn test_stream_rng_streams_differ() {
        use rand::Rng;
        let a: u64 = stream_rng(5, streams::MACHINERY).gen();
        let b: u64 = stream_rng(5, streams::FURNITURE).gen();
        let c: u64 = stream_rng(5, streams::MACHINERY).gen();
        assert_ne!(a, b);
        assert_eq!(a, c);
    }
}
