// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory job registry.
//!
//! Jobs live in an arena keyed by id. Every mutation goes through
//! [`JobRegistry::apply`], which checks the transition against the current
//! state under the write lock, so readers always see a consistent job.

use crate::error::JobError;
use crate::types::{Checkpoint, JobFailure, JobSnapshot, JobStatus};
use chrono::{DateTime, Duration, Utc};
use depthscape_reconstruction::{CombinedMesh, GenerationOptions, SceneClassification};
use image::RgbImage;
use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

/// Exported artifacts by format.
pub type Artifacts = FxHashMap<String, Arc<Vec<u8>>>;

/// Job record.
#[derive(Debug)]
struct Job {
    id: Uuid,
    status: JobStatus,
    checkpoint: Checkpoint,
    seed: u64,
    image: Option<Arc<RgbImage>>,
    options: Option<GenerationOptions>,
    classification: Option<SceneClassification>,
    error: Option<JobError>,
    result: Option<Arc<CombinedMesh>>,
    artifacts: Artifacts,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Job {
    fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id,
            status: self.status,
            progress: self.checkpoint.progress(),
            current_step: self.checkpoint.label().to_string(),
            error: self.error.as_ref().map(JobFailure::from),
            scene_category: self.classification.as_ref().map(|c| c.category),
            low_confidence_reconstruction: self
                .classification
                .as_ref()
                .is_some_and(|c| c.low_confidence),
            created_at: self.created_at,
            expires_at: self.expires_at,
            completed_at: self.completed_at,
        }
    }
}

/// State change requested by the orchestrator or a worker.
#[derive(Debug)]
pub enum Transition {
    /// CREATED -> UPLOADED
    ImageAccepted(Arc<RgbImage>),
    /// UPLOADED -> QUEUED
    Enqueued(GenerationOptions),
    /// QUEUED -> PROCESSING
    WorkerAcquired,
    /// Progress within PROCESSING; never moves backwards
    Checkpoint(Checkpoint),
    Classified(SceneClassification),
    /// PROCESSING -> COMPLETED
    Completed {
        result: Arc<CombinedMesh>,
        artifacts: Artifacts,
    },
    /// Any non-terminal state -> FAILED
    Failed(JobError),
}

impl Transition {
    fn name(&self) -> &'static str {
        match self {
            Transition::ImageAccepted(_) => "image accepted",
            Transition::Enqueued(_) => "enqueue",
            Transition::WorkerAcquired => "worker acquired",
            Transition::Checkpoint(_) => "checkpoint",
            Transition::Classified(_) => "classified",
            Transition::Completed { .. } => "complete",
            Transition::Failed(_) => "fail",
        }
    }
}

/// Inputs a worker needs to run the pipeline.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub image: Arc<RgbImage>,
    pub options: GenerationOptions,
    pub seed: u64,
}

/// Per-job seed: first 8 bytes (little-endian) of the SHA-256 of the id.
pub fn job_seed(id: &Uuid) -> u64 {
    let digest = Sha256::digest(id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<FxHashMap<Uuid, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job in CREATED.
    pub fn create(&self, now: DateTime<Utc>, retention: Duration) -> Uuid {
        let id = Uuid::new_v4();
        let seed = job_seed(&id);
        let job = Job {
            id,
            status: JobStatus::Created,
            checkpoint: Checkpoint::Uploaded,
            seed,
            image: None,
            options: None,
            classification: None,
            error: None,
            result: None,
            artifacts: Artifacts::default(),
            created_at: now,
            expires_at: now + retention,
            completed_at: None,
        };
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, job);
        tracing::debug!(job_id = %id, seed = %hex::encode(seed.to_le_bytes()), "Created job");
        id
    }

    /// Apply a transition, returning the resulting snapshot.
    pub fn apply(&self, id: Uuid, transition: Transition) -> Result<JobSnapshot, JobError> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let job = jobs.get_mut(&id).ok_or(JobError::NotFound(id))?;

        let from = job.status;
        let invalid = |transition: &Transition| {
            JobError::InvalidState(format!("cannot {} a {} job", transition.name(), from))
        };

        match transition {
            Transition::ImageAccepted(image) => {
                if from != JobStatus::Created {
                    return Err(invalid(&Transition::ImageAccepted(image)));
                }
                job.image = Some(image);
                job.status = JobStatus::Uploaded;
                job.checkpoint = Checkpoint::Uploaded;
            }
            Transition::Enqueued(options) => {
                if from != JobStatus::Uploaded {
                    return Err(invalid(&Transition::Enqueued(options)));
                }
                job.options = Some(options);
                job.status = JobStatus::Queued;
                job.checkpoint = Checkpoint::WaitingForWorker;
            }
            Transition::WorkerAcquired => {
                if from != JobStatus::Queued {
                    return Err(invalid(&Transition::WorkerAcquired));
                }
                job.status = JobStatus::Processing;
                job.checkpoint = Checkpoint::EstimatingDepth;
            }
            Transition::Checkpoint(checkpoint) => {
                if from != JobStatus::Processing || checkpoint == Checkpoint::Complete {
                    return Err(invalid(&Transition::Checkpoint(checkpoint)));
                }
                job.checkpoint = job.checkpoint.max(checkpoint);
            }
            Transition::Classified(classification) => {
                if from != JobStatus::Processing {
                    return Err(invalid(&Transition::Classified(classification)));
                }
                job.classification = Some(classification);
            }
            Transition::Completed { result, artifacts } => {
                if from != JobStatus::Processing {
                    return Err(invalid(&Transition::Completed { result, artifacts }));
                }
                job.result = Some(result);
                job.artifacts = artifacts;
                job.status = JobStatus::Completed;
                job.checkpoint = Checkpoint::Complete;
                job.completed_at = Some(Utc::now());
                job.image = None;
            }
            Transition::Failed(error) => {
                if from.is_terminal() {
                    return Err(invalid(&Transition::Failed(error)));
                }
                job.error = Some(error);
                job.status = JobStatus::Failed;
                job.completed_at = Some(Utc::now());
                job.image = None;
            }
        }

        if job.status != from {
            tracing::debug!(
                job_id = %id,
                from = %from,
                to = %job.status,
                progress = job.checkpoint.progress(),
                "Job transition"
            );
        }
        Ok(job.snapshot())
    }

    pub fn snapshot(&self, id: Uuid) -> Result<JobSnapshot, JobError> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(&id).map(Job::snapshot).ok_or(JobError::NotFound(id))
    }

    /// Pipeline inputs of a PROCESSING job.
    pub fn work_item(&self, id: Uuid) -> Result<WorkItem, JobError> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        let job = jobs.get(&id).ok_or(JobError::NotFound(id))?;
        match (job.status, &job.image, job.options) {
            (JobStatus::Processing, Some(image), Some(options)) => Ok(WorkItem {
                image: Arc::clone(image),
                options,
                seed: job.seed,
            }),
            _ => Err(JobError::InvalidState(format!(
                "job {} is {} without pipeline inputs",
                id, job.status
            ))),
        }
    }

    pub fn result(&self, id: Uuid) -> Result<Arc<CombinedMesh>, JobError> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        let job = jobs.get(&id).ok_or(JobError::NotFound(id))?;
        match (&job.status, &job.result) {
            (JobStatus::Completed, Some(result)) => Ok(Arc::clone(result)),
            _ => Err(JobError::InvalidState(format!(
                "job {} is {}, result requires COMPLETED",
                id, job.status
            ))),
        }
    }

    pub fn artifact(&self, id: Uuid, format: &str) -> Result<Arc<Vec<u8>>, JobError> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        let job = jobs.get(&id).ok_or(JobError::NotFound(id))?;
        if job.status != JobStatus::Completed {
            return Err(JobError::InvalidState(format!(
                "job {} is {}, artifacts require COMPLETED",
                id, job.status
            )));
        }
        job.artifacts
            .get(format)
            .cloned()
            .ok_or_else(|| JobError::ExportFailure(format!("no {} artifact for job {}", format, id)))
    }

    /// Remove every job whose retention has passed, in any state.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let expired: Vec<Uuid> = jobs
            .values()
            .filter(|job| job.expires_at <= now)
            .map(|job| job.id)
            .collect();
        for id in &expired {
            jobs.remove(id);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn uploaded(registry: &JobRegistry) -> Uuid {
        let id = registry.create(Utc::now(), Duration::hours(24));
        registry
            .apply(id, Transition::ImageAccepted(Arc::new(RgbImage::new(4, 4))))
            .unwrap();
        id
    }

    #[test]
    fn test_happy_path_transitions() {
        let registry = JobRegistry::new();
        let id = uploaded(&registry);
        assert_eq!(registry.snapshot(id).unwrap().status, JobStatus::Uploaded);

        registry
            .apply(id, Transition::Enqueued(GenerationOptions::default()))
            .unwrap();
        let snap = registry.apply(id, Transition::WorkerAcquired).unwrap();
        assert_eq!(snap.status, JobStatus::Processing);
        assert_eq!(snap.current_step, "Estimating depth");
        assert!(registry.work_item(id).is_ok());

        let snap = registry
            .apply(id, Transition::Checkpoint(Checkpoint::ClassifyingScene))
            .unwrap();
        assert_eq!(snap.progress, 40);
        // Stale checkpoints never move progress backwards
        let snap = registry
            .apply(id, Transition::Checkpoint(Checkpoint::BuildingBaseMesh))
            .unwrap();
        assert_eq!(snap.progress, 40);
    }

    #[test]
    fn test_enqueue_requires_uploaded() {
        let registry = JobRegistry::new();
        let id = registry.create(Utc::now(), Duration::hours(24));
        let err = registry
            .apply(id, Transition::Enqueued(GenerationOptions::default()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_failed_is_absorbing_and_keeps_progress() {
        let registry = JobRegistry::new();
        let id = uploaded(&registry);
        registry
            .apply(id, Transition::Enqueued(GenerationOptions::default()))
            .unwrap();
        registry.apply(id, Transition::WorkerAcquired).unwrap();
        registry
            .apply(id, Transition::Checkpoint(Checkpoint::Hallucinating))
            .unwrap();
        let snap = registry
            .apply(id, Transition::Failed(JobError::DependencyTimeout(30)))
            .unwrap();
        assert_eq!(snap.status, JobStatus::Failed);
        assert_eq!(snap.progress, 45);
        assert!(snap.error.as_ref().is_some_and(|e| e.recoverable));

        assert!(registry
            .apply(id, Transition::Failed(JobError::ExportFailure("x".into())))
            .is_err());
        assert!(registry.result(id).is_err());
    }

    #[test]
    fn test_purge_expired() {
        let registry = JobRegistry::new();
        let now = Utc::now();
        let old = registry.create(now - Duration::hours(30), Duration::hours(24));
        let fresh = registry.create(now, Duration::hours(24));

        let purged = registry.purge_expired(now);
        assert_eq!(purged, vec![old]);
        assert!(matches!(registry.snapshot(old), Err(JobError::NotFound(_))));
        assert!(registry.snapshot(fresh).is_ok());
    }

    #[test]
    fn test_seed_is_stable_per_id() {
        let id = Uuid::from_u128(0x1234_5678_9abc_def0_1234_5678_9abc_def0);
        assert_eq!(job_seed(&id), job_seed(&id));
        assert_ne!(job_seed(&id), job_seed(&Uuid::from_u128(1)));
    }
}
