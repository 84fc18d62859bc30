//! Depthscape job service
//!
//! Runs single-image scene reconstruction as asynchronous jobs:
//!
//! - `submit` validates and stores an image, creating a job
//! - `enqueue` queues it with generation options
//! - a bounded worker pool runs depth estimation and reconstruction
//! - `status` reports progress checkpoints, `result` and `artifact` return
//!   the combined mesh once the job is complete
//!
//! Jobs are kept in memory and purged after the retention period.

pub mod config;
pub mod error;
pub mod services;
pub mod types;

pub use config::{LogFormat, ServiceConfig};
pub use error::{ErrorKind, JobError};
pub use services::{
    DepthSource, Exporter, HeuristicDepthSource, HttpDepthSource, JsonMeshExporter, Orchestrator,
};
pub use types::{Checkpoint, GenerationRequest, JobFailure, JobSnapshot, JobStatus, MeshPayload};
