use thiserror::Error;

/// Result type for geometry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during geometry construction
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid primitive: {0}")]
    InvalidPrimitive(String),

    #[error("Empty mesh: {0}")]
    EmptyMesh(String),
}
