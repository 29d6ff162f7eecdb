//! Ordered job submission.
//!
//! The dispatcher assigns ids and pushes jobs into a bounded channel
//! consumed by exactly one worker. Id assignment and the channel send happen
//! under one lock, so the worker receives jobs in id order even with many
//! concurrent producers.

use std::sync::Arc;

use curaslice_engine::SliceConfig;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::debug;

use crate::error::{JobError, Result};
use crate::job::{Job, JobEvent, JobId, JobKind, JobOutput, JobPayload, SlicePayload};

/// A job plus the channels used to answer it.
pub(crate) struct Envelope {
    pub(crate) job: Job,
    pub(crate) reply: oneshot::Sender<Result<JobOutput>>,
    pub(crate) events: mpsc::UnboundedSender<JobEvent>,
}

struct Submission {
    next_id: u64,
    tx: mpsc::Sender<Envelope>,
}

/// Producer side of a worker's queue. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Mutex<Submission>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let dispatcher = Self {
            inner: Arc::new(Mutex::new(Submission { next_id: 1, tx })),
        };
        (dispatcher, rx)
    }

    /// Submit a job. Waits while the queue is full.
    pub async fn enqueue(&self, payload: JobPayload) -> Result<JobHandle> {
        let kind = payload.kind();
        let (reply, result) = oneshot::channel();
        let (events, event_rx) = mpsc::unbounded_channel();

        let mut submission = self.inner.lock().await;
        let id = JobId(submission.next_id);
        let envelope = Envelope {
            job: Job { id, payload },
            reply,
            events,
        };
        submission
            .tx
            .send(envelope)
            .await
            .map_err(|_| JobError::QueueClosed)?;
        submission.next_id += 1;
        drop(submission);

        debug!(job = %id, kind = ?kind, "job enqueued");
        Ok(JobHandle {
            id,
            kind,
            result,
            events: event_rx,
        })
    }

    /// Submit an `Initialize` job.
    pub async fn initialize(&self, verbose: bool) -> Result<JobHandle> {
        self.enqueue(JobPayload::Initialize { verbose }).await
    }

    /// Submit a `Slice` job. The extension is matched case-insensitively.
    pub async fn slice(
        &self,
        file: Vec<u8>,
        extension: impl Into<String>,
        config: SliceConfig,
    ) -> Result<JobHandle> {
        self.enqueue(JobPayload::Slice(SlicePayload {
            file,
            extension: extension.into().to_ascii_lowercase(),
            config,
        }))
        .await
    }

    /// Submit a `Destroy` job.
    pub async fn destroy(&self) -> Result<JobHandle> {
        self.enqueue(JobPayload::Destroy).await
    }
}

/// Consumer side of one job.
///
/// Dropping the handle before the worker picks the job up cancels it.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    kind: JobKind,
    result: oneshot::Receiver<Result<JobOutput>>,
    events: mpsc::UnboundedReceiver<JobEvent>,
}

impl JobHandle {
    /// Job identifier.
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Job kind.
    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Next progress or warning event; `None` once the job has finished.
    pub async fn next_event(&mut self) -> Option<JobEvent> {
        self.events.recv().await
    }

    /// Wait for the job's result.
    pub async fn wait(self) -> Result<JobOutput> {
        let id = self.id;
        self.result.await.unwrap_or(Err(JobError::WorkerGone(id)))
    }

    /// Wait for the job's result, collecting every event it produced.
    pub async fn wait_with_events(mut self) -> (Result<JobOutput>, Vec<JobEvent>) {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        (self.wait().await, events)
    }
}
