//! Single-image scene reconstruction
//!
//! Turns an image and a per-pixel depth estimate into a closed 3D scene:
//! 1. Back-project pixels to camera space ([`back_projection`])
//! 2. Mesh the visible surface and trace its boundary loops ([`mesh_builder`], [`boundary`])
//! 3. Classify the scene with an ordered rule table ([`classifier`])
//! 4. Close every loop and populate the room with seeded elements ([`hallucination`])
//! 5. Merge everything into one watertight mesh ([`assembler`])
//!
//! # Usage
//!
//! ```rust,ignore
//! use depthscape_reconstruction::{
//!     estimate_depth, reconstruct_scene,
//!     types::{GenerationOptions, ReconstructionConfig},
//! };
//!
//! let depth = estimate_depth(&image);
//! let scene = reconstruct_scene(&image, &depth, &GenerationOptions::default(), seed,
//!     &ReconstructionConfig::default())?;
//! assert!(scene.combined.is_watertight());
//! ```

pub mod assembler;
pub mod back_projection;
pub mod boundary;
pub mod classifier;
pub mod error;
pub mod hallucination;
pub mod image_ops;
pub mod mesh_builder;
pub mod types;

pub use assembler::{assemble, CombinedMesh};
pub use back_projection::back_project;
pub use boundary::{resolve_pinches, trace_boundary_loops, BoundaryLoop, LoopKind, LoopVertex};
pub use classifier::{classify_scene, classify_statistics, scene_statistics, SceneStatistics, SCENE_RULES};
pub use error::{ReconstructionError, Result};
pub use hallucination::{
    hallucinate, GenerationRule, HallucinatedPatch, PatchAnchor, PatchKind, PatchVertex,
    RoomFrame, VertexKey,
};
pub use image_ops::{downscale_to, estimate_depth};
pub use mesh_builder::{build_base_mesh, BaseMesh};
pub use types::{
    CameraModel, DepthGrid, DepthSample, GenerationOptions, GridPoint, PointGrid,
    ReconstructionConfig, RoomComplexity, SceneCategory, SceneClassification,
};

use image::RgbImage;

/// Pipeline stages reported as they finish
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    BaseMeshBuilt,
    /// Carries the classification so callers can publish it before generation
    Classified(SceneClassification),
    Hallucinated,
    Assembled,
}

/// Output of the full reconstruction pipeline
#[derive(Debug, Clone)]
pub struct SceneReconstruction {
    pub base: BaseMesh,
    pub classification: SceneClassification,
    pub patches: Vec<HallucinatedPatch>,
    pub combined: CombinedMesh,
}

impl SceneReconstruction {
    pub fn loop_count(&self) -> usize {
        self.base.loops.len()
    }

    pub fn low_confidence(&self) -> bool {
        self.classification.low_confidence
    }
}

/// Run the full pipeline on an image and its depth grid
pub fn reconstruct_scene(
    image: &RgbImage,
    depth: &DepthGrid,
    options: &GenerationOptions,
    seed: u64,
    config: &ReconstructionConfig,
) -> Result<SceneReconstruction> {
    reconstruct_scene_with_progress(image, depth, options, seed, config, |_| {})
}

/// Run the full pipeline, calling `on_stage` after each stage completes.
///
/// Mesh building and classification only depend on the point grid, so they
/// run concurrently; their stages are still reported in order.
pub fn reconstruct_scene_with_progress(
    image: &RgbImage,
    depth: &DepthGrid,
    options: &GenerationOptions,
    seed: u64,
    config: &ReconstructionConfig,
    mut on_stage: impl FnMut(Stage),
) -> Result<SceneReconstruction> {
    let grid = back_project(image, depth, config)?;

    let (base, classification) = rayon::join(
        || build_base_mesh(&grid, config),
        || classify_scene(&grid, config.min_classification_confidence),
    );
    let base = base?;
    on_stage(Stage::BaseMeshBuilt);
    on_stage(Stage::Classified(classification.clone()));

    let patches = hallucinate(&base, &classification, options, seed)?;
    on_stage(Stage::Hallucinated);

    let combined = assemble(&base, &patches);
    on_stage(Stage::Assembled);

    tracing::debug!(
        width = grid.width,
        height = grid.height,
        valid = grid.valid_count(),
        loops = base.loops.len(),
        patches = patches.len(),
        watertight = combined.is_watertight(),
        "reconstructed scene"
    );

    Ok(SceneReconstruction {
        base,
        classification,
        patches,
        combined,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stages_reported_in_order() {
        let image = RgbImage::new(12, 9);
        let depth = DepthGrid::uniform(12, 9, 2.0, 1.0);
        let mut stages = Vec::new();
        let scene = reconstruct_scene_with_progress(
            &image,
            &depth,
            &GenerationOptions::default(),
            0,
            &ReconstructionConfig::default(),
            |stage| stages.push(stage),
        )
        .unwrap();

        assert_eq!(
            stages,
            vec![
                Stage::BaseMeshBuilt,
                Stage::Classified(scene.classification.clone()),
                Stage::Hallucinated,
                Stage::Assembled
            ]
        );
        assert_eq!(scene.classification.category, SceneCategory::Generic);
        assert_eq!(scene.loop_count(), 1);
    }

    #[test]
    fn test_mismatched_depth_fails() {
        let image = RgbImage::new(12, 9);
        let depth = DepthGrid::uniform(10, 9, 2.0, 1.0);
        let err = reconstruct_scene(
            &image,
            &depth,
            &GenerationOptions::default(),
            0,
            &ReconstructionConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ReconstructionError::DimensionMismatch(_)));
    }
}
