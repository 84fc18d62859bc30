// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Service modules for job orchestration.

pub mod depth;
pub mod export;
pub mod orchestrator;
mod pipeline;
pub mod registry;

pub use depth::{DepthSource, HeuristicDepthSource, HttpDepthSource};
pub use export::{Exporter, JsonMeshExporter};
pub use orchestrator::Orchestrator;
pub use registry::{job_seed, JobRegistry};
