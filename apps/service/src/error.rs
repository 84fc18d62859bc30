// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for job orchestration.

use depthscape_reconstruction::ReconstructionError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Job error types.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JobError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Job not found: {0}")]
    NotFound(Uuid),

    #[error("Depth service unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Depth service timed out after {0} s")]
    DependencyTimeout(u64),

    #[error("Reconstruction degenerate: {0}")]
    ReconstructionDegenerate(String),

    #[error("Export failed: {0}")]
    ExportFailure(String),
}

/// Serializable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidImage,
    InvalidOptions,
    InvalidState,
    NotFound,
    DependencyUnavailable,
    DependencyTimeout,
    ReconstructionDegenerate,
    ExportFailure,
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::InvalidImage(_) => ErrorKind::InvalidImage,
            JobError::InvalidOptions(_) => ErrorKind::InvalidOptions,
            JobError::InvalidState(_) => ErrorKind::InvalidState,
            JobError::NotFound(_) => ErrorKind::NotFound,
            JobError::DependencyUnavailable(_) => ErrorKind::DependencyUnavailable,
            JobError::DependencyTimeout(_) => ErrorKind::DependencyTimeout,
            JobError::ReconstructionDegenerate(_) => ErrorKind::ReconstructionDegenerate,
            JobError::ExportFailure(_) => ErrorKind::ExportFailure,
        }
    }

    /// Dependency failures may succeed if the job is submitted again.
    pub fn recoverable(&self) -> bool {
        matches!(
            self,
            JobError::DependencyUnavailable(_) | JobError::DependencyTimeout(_)
        )
    }
}

impl From<ReconstructionError> for JobError {
    fn from(err: ReconstructionError) -> Self {
        JobError::ReconstructionDegenerate(err.to_string())
    }
}

impl From<tokio::task::JoinError> for JobError {
    fn from(err: tokio::task::JoinError) -> Self {
        JobError::ReconstructionDegenerate(format!("worker task failed: {}", err))
    }
}

impl From<image::ImageError> for JobError {
    fn from(err: image::ImageError) -> Self {
        JobError::InvalidImage(err.to_string())
    }
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        JobError::ExportFailure(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_dependency_errors_are_recoverable() {
        assert!(JobError::DependencyUnavailable("down".into()).recoverable());
        assert!(JobError::DependencyTimeout(30).recoverable());
        assert!(!JobError::ReconstructionDegenerate("flat".into()).recoverable());
        assert!(!JobError::InvalidImage("bad".into()).recoverable());
        assert!(!JobError::ExportFailure("disk".into()).recoverable());
    }

    #[test]
    fn test_reconstruction_errors_map_to_degenerate() {
        let err: JobError = ReconstructionError::Degenerate("no quads".into()).into();
        assert_eq!(err.kind(), ErrorKind::ReconstructionDegenerate);
        let err: JobError = ReconstructionError::DimensionMismatch("2x2".into()).into();
        assert_eq!(err.kind(), ErrorKind::ReconstructionDegenerate);
    }
}
