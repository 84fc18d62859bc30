// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Type definitions for job requests, snapshots and results.

mod job;
mod mesh;
mod request;

pub use job::{Checkpoint, JobFailure, JobSnapshot, JobStatus};
pub use mesh::MeshPayload;
pub use request::GenerationRequest;
