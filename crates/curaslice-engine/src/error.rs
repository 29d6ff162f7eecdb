//! Error types for engine sessions.

use thiserror::Error;

use crate::fs::FsError;

/// Errors from configuring, staging or running the slicing engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Both a launch command and setting overrides were supplied.
    #[error("cannot specify both a launch command and setting overrides")]
    ConfigConflict,

    /// An override targets an extruder the definition does not have.
    #[error("override {key} targets extruder {index}, but only {count} extruder(s) are defined")]
    ExtruderOutOfRange {
        /// Setting key of the offending override.
        key: String,
        /// Requested extruder index.
        index: usize,
        /// Number of extruders in the definition.
        count: usize,
    },

    /// A built-in definition name collides with a staged caller definition.
    #[error("definition name {0:?} is reserved")]
    ReservedDefinitionName(String),

    /// The session has no engine instance yet.
    #[error("engine session is not initialized")]
    NotInitialized,

    /// The session already owns an engine instance.
    #[error("engine session is already initialized")]
    AlreadyInitialized,

    /// The session has been torn down.
    #[error("engine session has been destroyed")]
    Destroyed,

    /// Unstaging was requested with nothing staged.
    #[error("no definitions are staged")]
    NotStaged,

    /// Staging was requested while a previous staging is still in place.
    #[error("definitions are already staged")]
    AlreadyStaged,

    /// The engine invocation reported failure.
    #[error("engine failure: {0}")]
    EngineFailure(String),

    /// Virtual filesystem error.
    #[error("virtual filesystem error: {0}")]
    Fs(#[from] FsError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Definition serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
