//! Error types for mesh conversion.

use thiserror::Error;

/// Errors that can occur while converting or encoding meshes.
#[derive(Error, Debug)]
pub enum MeshError {
    /// No registered decoder handles the extension.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The decoder produced zero meshes.
    #[error("decoder returned no meshes")]
    EmptyMesh,

    /// Decoded buffers do not describe whole triangles.
    #[error("malformed mesh: {0}")]
    MalformedMesh(String),

    /// The decoder itself failed.
    #[error("decode failed: {0}")]
    DecodeFailed(String),

    /// Buffer is not a valid binary STL.
    #[error("invalid STL: {0}")]
    InvalidStl(String),
}

/// Result type for mesh operations.
pub type Result<T> = std::result::Result<T, MeshError>;
