//! Job, payload and event types.

use std::fmt;

use curaslice_engine::{GcodeMetadata, SliceConfig};
use serde::{Deserialize, Serialize};

/// Identifier assigned at enqueue time; increases with submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// The three operations a worker executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Construct the engine instance.
    Initialize,
    /// Convert and slice one model.
    Slice,
    /// Release the engine instance.
    Destroy,
}

/// Model file and configuration for a slice job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlicePayload {
    /// Raw model file.
    pub file: Vec<u8>,
    /// File extension, without the dot.
    pub extension: String,
    /// Slice configuration.
    pub config: SliceConfig,
}

/// Payload of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    /// Initialize the engine session.
    Initialize {
        /// Forward engine output.
        verbose: bool,
    },
    /// Slice a model.
    Slice(SlicePayload),
    /// Destroy the engine session.
    Destroy,
}

impl JobPayload {
    /// Kind of this payload.
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Initialize { .. } => JobKind::Initialize,
            Self::Slice(_) => JobKind::Slice,
            Self::Destroy => JobKind::Destroy,
        }
    }
}

/// A unit of work owned by the dispatcher until handed to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Job identifier.
    pub id: JobId,
    /// Job payload.
    pub payload: JobPayload,
}

impl Job {
    /// Kind of this job.
    pub fn kind(&self) -> JobKind {
        self.payload.kind()
    }
}

/// Result of a successful slice.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceOutput {
    /// Raw G-code.
    pub gcode: Vec<u8>,
    /// Metadata parsed from the G-code header.
    pub metadata: GcodeMetadata,
    /// Non-fatal conditions encountered during the job.
    pub warnings: Vec<String>,
}

/// Result of a successful job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutput {
    /// The engine session is initialized.
    Initialized,
    /// The model was sliced.
    Sliced(SliceOutput),
    /// The engine session is destroyed.
    Destroyed,
}

impl JobOutput {
    /// The slice output, if this was a slice job.
    pub fn into_slice(self) -> Option<SliceOutput> {
        match self {
            Self::Sliced(out) => Some(out),
            _ => None,
        }
    }
}

/// Combined progress of one job, in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Job the progress belongs to.
    pub job: JobId,
    /// Fraction complete.
    pub progress: f64,
}

/// Side-channel output of a job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// Progress update.
    Progress(ProgressEvent),
    /// Non-fatal warning.
    Warning {
        /// Job the warning belongs to.
        job: JobId,
        /// Warning text.
        message: String,
    },
}
