//! Combined progress of the converter and slicer phases.
//!
//! A job's progress is a single stream in `[0, 1]`. The converter phase
//! covers `[0, bias]` and the slicer phase covers `[bias, 1]`:
//!
//! ```text
//! converter: bias * p
//! slicer:    bias + (1 - bias) * round2(p)
//! ```
//!
//! Only values strictly greater than the last emitted one reach the sink,
//! so consumers observe an increasing stream without repeats.

use std::sync::{Arc, Mutex, PoisonError};

use crate::job::{JobId, ProgressEvent};

/// Converter weight for formats that need conversion.
pub const CONVERTER_BIAS: f64 = 0.3;

/// Converter weight for the lowercase `extension`. STL input skips
/// conversion entirely.
pub fn converter_bias(extension: &str, configured: f64) -> f64 {
    if extension == "stl" {
        0.0
    } else {
        configured.clamp(0.0, 1.0)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Receives combined progress events.
pub type EventSink = Box<dyn FnMut(ProgressEvent) + Send>;

struct Inner {
    last: Option<f64>,
    sink: EventSink,
}

/// Per-job progress aggregator. Clones share state.
#[derive(Clone)]
pub struct ProgressAggregator {
    job: JobId,
    bias: f64,
    inner: Arc<Mutex<Inner>>,
}

impl ProgressAggregator {
    /// Create an aggregator for `job` with converter weight `bias`.
    pub fn new(job: JobId, bias: f64, sink: EventSink) -> Self {
        Self {
            job,
            bias: bias.clamp(0.0, 1.0),
            inner: Arc::new(Mutex::new(Inner { last: None, sink })),
        }
    }

    /// Converter weight in use.
    pub fn bias(&self) -> f64 {
        self.bias
    }

    /// Report converter progress in `[0, 1]`.
    pub fn converter(&self, progress: f64) {
        if let Some(p) = sanitize(progress) {
            self.emit(self.bias * p);
        }
    }

    /// Report slicer progress in `[0, 1]`.
    pub fn slicer(&self, progress: f64) {
        if let Some(p) = sanitize(progress) {
            self.emit(self.bias + (1.0 - self.bias) * round2(p));
        }
    }

    /// Last emitted value, if any.
    pub fn last(&self) -> Option<f64> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).last
    }

    fn emit(&self, value: f64) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.last.is_some_and(|last| value <= last) {
            return;
        }
        inner.last = Some(value);
        (inner.sink)(ProgressEvent {
            job: self.job,
            progress: value,
        });
    }
}

fn sanitize(progress: f64) -> Option<f64> {
    (!progress.is_nan()).then(|| progress.clamp(0.0, 1.0))
}
