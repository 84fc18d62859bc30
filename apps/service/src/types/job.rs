// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Job lifecycle types.

use crate::error::{ErrorKind, JobError};
use chrono::{DateTime, Utc};
use depthscape_reconstruction::SceneCategory;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Job lifecycle state. `Completed` and `Failed` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Created,
    Uploaded,
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Created => "CREATED",
            JobStatus::Uploaded => "UPLOADED",
            JobStatus::Queued => "QUEUED",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress checkpoints, in pipeline order.
///
/// Each checkpoint names the step that runs next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Checkpoint {
    Uploaded,
    WaitingForWorker,
    EstimatingDepth,
    BuildingBaseMesh,
    ClassifyingScene,
    Hallucinating,
    Assembling,
    Exporting,
    Complete,
}

impl Checkpoint {
    pub fn progress(self) -> u8 {
        match self {
            Checkpoint::Uploaded | Checkpoint::WaitingForWorker | Checkpoint::EstimatingDepth => 0,
            Checkpoint::BuildingBaseMesh => 10,
            Checkpoint::ClassifyingScene => 40,
            Checkpoint::Hallucinating => 45,
            Checkpoint::Assembling => 85,
            Checkpoint::Exporting => 95,
            Checkpoint::Complete => 100,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Checkpoint::Uploaded => "Uploaded",
            Checkpoint::WaitingForWorker => "Waiting for worker",
            Checkpoint::EstimatingDepth => "Estimating depth",
            Checkpoint::BuildingBaseMesh => "Building base mesh",
            Checkpoint::ClassifyingScene => "Classifying scene",
            Checkpoint::Hallucinating => "Hallucinating unseen geometry",
            Checkpoint::Assembling => "Assembling scene",
            Checkpoint::Exporting => "Exporting",
            Checkpoint::Complete => "Complete",
        }
    }
}

/// Error detail of a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub recoverable: bool,
}

impl From<&JobError> for JobFailure {
    fn from(err: &JobError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            recoverable: err.recoverable(),
        }
    }
}

/// Consistent point-in-time view of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub status: JobStatus,
    /// Percent complete (0 - 100).
    pub progress: u8,
    pub current_step: String,
    pub error: Option<JobFailure>,
    /// Scene category, once classified.
    pub scene_category: Option<SceneCategory>,
    pub low_confidence_reconstruction: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoints_are_monotonic() {
        let order = [
            Checkpoint::Uploaded,
            Checkpoint::WaitingForWorker,
            Checkpoint::EstimatingDepth,
            Checkpoint::BuildingBaseMesh,
            Checkpoint::ClassifyingScene,
            Checkpoint::Hallucinating,
            Checkpoint::Assembling,
            Checkpoint::Exporting,
            Checkpoint::Complete,
        ];
        for pair in order.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].progress() <= pair[1].progress());
        }
        assert!(order[..8].iter().all(|c| c.progress() < 100));
    }

    #[test]
    fn test_status_serializes_upper_case() {
        let json = serde_json::to_string(&JobStatus::Processing).unwrap();
        assert_eq!(json, "\"PROCESSING\"");
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
    }
}
