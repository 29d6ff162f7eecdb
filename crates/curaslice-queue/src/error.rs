//! Error types for the job queue.

use std::path::PathBuf;

use curaslice_engine::EngineError;
use curaslice_mesh::MeshError;
use thiserror::Error;

use crate::job::JobId;

/// Errors delivered to a job's result channel.
#[derive(Error, Debug)]
pub enum JobError {
    /// Conversion failed.
    #[error(transparent)]
    Mesh(#[from] MeshError),

    /// Configuration, session or engine failure.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The worker is no longer accepting jobs.
    #[error("job queue is closed")]
    QueueClosed,

    /// The worker dropped the job without answering.
    #[error("worker stopped before {0} completed")]
    WorkerGone(JobId),

    /// The job panicked inside the worker.
    #[error("{job} panicked: {message}")]
    Panicked {
        /// The job that panicked.
        job: JobId,
        /// Panic payload, when it was a string.
        message: String,
    },

    /// The worker answered with an output of the wrong kind.
    #[error("{0} returned an unexpected output")]
    UnexpectedOutput(JobId),
}

/// Errors loading a worker configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Result type for job operations.
pub type Result<T> = std::result::Result<T, JobError>;
