// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-job pipeline run by a worker.
//!
//! Depth estimation is the only awaited dependency; it is bounded by a
//! timeout and retried once after a backoff. The CPU stages run on the
//! blocking pool and report checkpoints as they finish.

use super::orchestrator::Shared;
use super::registry::{Artifacts, JobRegistry, Transition, WorkItem};
use crate::error::JobError;
use crate::types::{Checkpoint, JobSnapshot};
use depthscape_reconstruction::{reconstruct_scene_with_progress, CombinedMesh, DepthGrid, Stage};
use image::RgbImage;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

const DEPTH_ATTEMPTS: u32 = 2;

/// Run a PROCESSING job to COMPLETED or FAILED.
pub(crate) async fn run(shared: Arc<Shared>, id: Uuid) {
    let start = Instant::now();
    match execute(&shared, id).await {
        Ok(()) => {
            tracing::info!(
                job_id = %id,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Job completed"
            );
        }
        Err(JobError::NotFound(_)) => {
            tracing::warn!(job_id = %id, "Job purged while processing, dropping its results");
        }
        Err(err) => {
            tracing::warn!(
                job_id = %id,
                error = %err,
                recoverable = err.recoverable(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Job failed"
            );
            if let Err(e) = shared.registry.apply(id, Transition::Failed(err)) {
                tracing::warn!(job_id = %id, error = %e, "Could not record job failure");
            }
        }
    }
}

async fn execute(shared: &Arc<Shared>, id: Uuid) -> Result<(), JobError> {
    let WorkItem {
        image,
        options,
        seed,
    } = shared.registry.work_item(id)?;

    let depth = fetch_depth(shared, id, Arc::clone(&image)).await?;
    shared
        .registry
        .apply(id, Transition::Checkpoint(Checkpoint::BuildingBaseMesh))?;

    let registry = Arc::clone(&shared.registry);
    let config = shared.config.reconstruction;
    let scene = tokio::task::spawn_blocking(move || {
        reconstruct_scene_with_progress(&image, &depth, &options, seed, &config, |stage| {
            if let Err(err) = record_stage(&registry, id, stage) {
                tracing::debug!(job_id = %id, error = %err, "Checkpoint not recorded");
            }
        })
    })
    .await??;

    tracing::debug!(
        job_id = %id,
        category = %scene.classification.category,
        low_confidence = scene.low_confidence(),
        loops = scene.loop_count(),
        patches = scene.patches.len(),
        triangles = scene.combined.mesh.triangle_count(),
        "Reconstructed scene"
    );

    let combined = Arc::new(scene.combined);
    let artifacts = export_all(shared, Arc::clone(&combined)).await?;

    shared.registry.apply(
        id,
        Transition::Completed {
            result: combined,
            artifacts,
        },
    )?;
    Ok(())
}

/// Advance the job past a finished reconstruction stage. The scene category
/// is published as soon as classification is done.
fn record_stage(registry: &JobRegistry, id: Uuid, stage: Stage) -> Result<JobSnapshot, JobError> {
    let checkpoint = match stage {
        Stage::BaseMeshBuilt => Checkpoint::ClassifyingScene,
        Stage::Classified(classification) => {
            registry.apply(id, Transition::Classified(classification))?;
            Checkpoint::Hallucinating
        }
        Stage::Hallucinated => Checkpoint::Assembling,
        Stage::Assembled => Checkpoint::Exporting,
    };
    registry.apply(id, Transition::Checkpoint(checkpoint))
}

/// Fetch depth, retrying dependency failures once after the backoff.
async fn fetch_depth(
    shared: &Shared,
    id: Uuid,
    image: Arc<RgbImage>,
) -> Result<DepthGrid, JobError> {
    let timeout = shared.config.depth_timeout();
    let mut attempt = 1;
    loop {
        let result = match tokio::time::timeout(timeout, shared.depth.estimate(Arc::clone(&image))).await {
            Ok(result) => result.and_then(|depth| check_dimensions(depth, &image)),
            Err(_) => Err(JobError::DependencyTimeout(shared.config.depth_timeout_secs)),
        };

        match result {
            Ok(depth) => return Ok(depth),
            Err(err) if err.recoverable() && attempt < DEPTH_ATTEMPTS => {
                tracing::warn!(
                    job_id = %id,
                    attempt,
                    source = shared.depth.name(),
                    error = %err,
                    "Depth estimation failed, retrying"
                );
                tokio::time::sleep(shared.config.depth_retry_backoff()).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn check_dimensions(depth: DepthGrid, image: &RgbImage) -> Result<DepthGrid, JobError> {
    if (depth.width, depth.height) != image.dimensions() {
        return Err(JobError::DependencyUnavailable(format!(
            "Malformed depth response: {}x{} grid for a {}x{} image",
            depth.width,
            depth.height,
            image.width(),
            image.height()
        )));
    }
    Ok(depth)
}

async fn export_all(shared: &Shared, combined: Arc<CombinedMesh>) -> Result<Artifacts, JobError> {
    let Some(exporter) = shared.exporter.clone() else {
        return Ok(Artifacts::default());
    };
    let formats = shared.config.export_formats.clone();
    tokio::task::spawn_blocking(move || {
        formats
            .into_iter()
            .map(|format| {
                let bytes = exporter.export(&combined, &format)?;
                Ok((format, Arc::new(bytes)))
            })
            .collect::<Result<Artifacts, JobError>>()
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobStatus;
    use chrono::{Duration, Utc};
    use depthscape_reconstruction::{GenerationOptions, SceneCategory, SceneClassification};

    fn processing(registry: &JobRegistry) -> Uuid {
        let id = registry.create(Utc::now(), Duration::hours(1));
        registry
            .apply(id, Transition::ImageAccepted(Arc::new(RgbImage::new(4, 4))))
            .unwrap();
        registry
            .apply(id, Transition::Enqueued(GenerationOptions::default()))
            .unwrap();
        registry.apply(id, Transition::WorkerAcquired).unwrap();
        id
    }

    #[test]
    fn test_category_visible_once_classified() {
        let registry = JobRegistry::new();
        let id = processing(&registry);

        let snap = record_stage(&registry, id, Stage::BaseMeshBuilt).unwrap();
        assert_eq!(snap.progress, 40);
        assert_eq!(snap.scene_category, None);

        let classification = SceneClassification {
            low_confidence: true,
            ..SceneClassification::known(SceneCategory::Generic)
        };
        let snap = record_stage(&registry, id, Stage::Classified(classification)).unwrap();
        assert_eq!(snap.status, JobStatus::Processing);
        assert_eq!(snap.progress, 45);
        assert_eq!(snap.current_step, "Hallucinating unseen geometry");
        assert_eq!(snap.scene_category, Some(SceneCategory::Generic));
        assert!(snap.low_confidence_reconstruction);

        let snap = record_stage(&registry, id, Stage::Hallucinated).unwrap();
        assert_eq!(snap.progress, 85);
        assert_eq!(snap.scene_category, Some(SceneCategory::Generic));
    }

    #[test]
    fn test_purged_job_stage_is_not_found() {
        let registry = JobRegistry::new();
        let id = processing(&registry);
        registry.purge_expired(Utc::now() + Duration::hours(2));

        let err = record_stage(&registry, id, Stage::Assembled).unwrap_err();
        assert!(matches!(err, JobError::NotFound(_)));
    }
}
