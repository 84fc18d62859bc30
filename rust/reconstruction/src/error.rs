// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for reconstruction operations
pub type Result<T> = std::result::Result<T, ReconstructionError>;

/// Errors that can occur while reconstructing a scene
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconstructionError {
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Reconstruction degenerate: {0}")]
    Degenerate(String),

    #[error("Geometry error: {0}")]
    Geometry(#[from] depthscape_geometry::Error),
}
