// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Request types for generation jobs.

use crate::error::JobError;
use depthscape_reconstruction::{GenerationOptions, RoomComplexity};
use serde::{Deserialize, Serialize};

/// Options for a generation request, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Close the scene with synthetic geometry.
    #[serde(default = "default_true")]
    pub hallucinate_unseen: bool,

    /// Populate the room with category-specific elements.
    #[serde(default = "default_true")]
    pub generate_interiors: bool,

    /// One of "low", "medium", "high".
    #[serde(default = "default_complexity")]
    pub room_complexity: String,

    /// Distance between the deepest visible surface and the back wall.
    #[serde(default = "default_wall_thickness")]
    pub wall_thickness: f64,
}

fn default_true() -> bool {
    true
}

fn default_complexity() -> String {
    "medium".to_string()
}

fn default_wall_thickness() -> f64 {
    0.3
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            hallucinate_unseen: true,
            generate_interiors: true,
            room_complexity: default_complexity(),
            wall_thickness: default_wall_thickness(),
        }
    }
}

impl GenerationRequest {
    pub fn validate(&self) -> Result<GenerationOptions, JobError> {
        if !self.wall_thickness.is_finite() || self.wall_thickness <= 0.0 {
            return Err(JobError::InvalidOptions(format!(
                "wall_thickness must be positive, got {}",
                self.wall_thickness
            )));
        }
        let room_complexity: RoomComplexity = self
            .room_complexity
            .parse()
            .map_err(JobError::InvalidOptions)?;

        Ok(GenerationOptions {
            hallucinate_unseen: self.hallucinate_unseen,
            generate_interiors: self.generate_interiors,
            room_complexity,
            wall_thickness: self.wall_thickness,
        })
    }
}
