//! The session-owning worker.
//!
//! One worker thread owns one [`EngineSession`] and executes jobs strictly
//! one at a time, in the order the dispatcher received them. Engine
//! construction, decoding and the engine run all block, so the worker lives
//! on a dedicated OS thread rather than on the async runtime.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use curaslice_engine::{
    synthesize, BuiltinDefinitions, EngineError, EngineFactory, EngineSession, GcodeMetadata,
    SessionState,
};
use curaslice_mesh::{convert, MeshDecoder};
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn};

use crate::config::WorkerConfig;
use crate::dispatcher::{Dispatcher, Envelope};
use crate::error::{JobError, Result};
use crate::job::{Job, JobEvent, JobId, JobOutput, JobPayload, SliceOutput, SlicePayload};
use crate::progress::{converter_bias, ProgressAggregator};

/// Handle to a running worker thread.
#[derive(Debug)]
pub struct WorkerHandle {
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    /// Wait for the worker to exit. It exits once every [`Dispatcher`]
    /// clone has been dropped and the queue is drained.
    pub fn join(self) -> thread::Result<()> {
        self.thread.join()
    }

    /// Whether the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

/// Start a worker thread and return the dispatcher feeding it.
pub fn spawn<F: EngineFactory>(
    factory: F,
    builtins: BuiltinDefinitions,
    decoder: Arc<dyn MeshDecoder>,
    config: &WorkerConfig,
) -> std::io::Result<(Dispatcher, WorkerHandle)> {
    let (dispatcher, rx) = Dispatcher::channel(config.queue_capacity);
    let worker = Worker {
        session: EngineSession::new(factory, builtins),
        decoder,
        converter_bias: config.converter_bias,
        verbose: config.verbose,
    };
    let thread = thread::Builder::new()
        .name("curaslice-worker".into())
        .spawn(move || worker.run(rx))?;
    Ok((dispatcher, WorkerHandle { thread }))
}

struct Worker<F: EngineFactory> {
    session: EngineSession<F>,
    decoder: Arc<dyn MeshDecoder>,
    converter_bias: f64,
    verbose: bool,
}

impl<F: EngineFactory> Worker<F> {
    fn run(mut self, mut rx: mpsc::Receiver<Envelope>) {
        info!(session = %self.session.id(), "worker started");

        while let Some(Envelope { job, reply, events }) = rx.blocking_recv() {
            if reply.is_closed() {
                debug!(job = %job.id, "handle dropped before start, skipping");
                continue;
            }

            let span = info_span!("job", job = %job.id, kind = ?job.kind());
            let _guard = span.enter();

            let id = job.id;
            let result = match panic::catch_unwind(AssertUnwindSafe(|| self.execute(job, &events))) {
                Ok(result) => result,
                Err(payload) => {
                    self.recover();
                    Err(JobError::Panicked {
                        job: id,
                        message: panic_message(payload.as_ref()),
                    })
                }
            };
            match &result {
                Ok(_) => debug!("job completed"),
                Err(e) => warn!(error = %e, "job failed"),
            }
            if reply.send(result).is_err() {
                debug!("result receiver dropped");
            }
        }

        if !matches!(
            self.session.state(),
            SessionState::Uninitialized | SessionState::Destroyed
        ) {
            if let Err(e) = self.session.destroy() {
                warn!(error = %e, "failed to destroy session on shutdown");
            }
        }
        info!(session = %self.session.id(), "worker stopped");
    }

    /// Put the session back into a usable state after a job panicked.
    fn recover(&mut self) {
        self.session.clear_progress();
        if self.session.state() == SessionState::Staged {
            if let Err(e) = self.session.unstage_definitions() {
                warn!(error = %e, "failed to remove definitions after panic");
            }
        }
    }

    fn execute(&mut self, job: Job, events: &mpsc::UnboundedSender<JobEvent>) -> Result<JobOutput> {
        match job.payload {
            JobPayload::Initialize { verbose } => {
                self.initialize(verbose)?;
                Ok(JobOutput::Initialized)
            }
            JobPayload::Slice(payload) => self.slice(job.id, payload, events).map(JobOutput::Sliced),
            JobPayload::Destroy => {
                self.destroy()?;
                Ok(JobOutput::Destroyed)
            }
        }
    }

    fn initialize(&mut self, verbose: bool) -> Result<()> {
        match self.session.state() {
            SessionState::Uninitialized => Ok(self.session.initialize(verbose)?),
            SessionState::Destroyed => Err(EngineError::Destroyed.into()),
            SessionState::Initialized | SessionState::Staged => {
                debug!("session already initialized");
                Ok(())
            }
        }
    }

    fn destroy(&mut self) -> Result<()> {
        if self.session.state() == SessionState::Destroyed {
            debug!("session already destroyed");
            return Ok(());
        }
        Ok(self.session.destroy()?)
    }

    fn slice(
        &mut self,
        id: JobId,
        payload: SlicePayload,
        events: &mpsc::UnboundedSender<JobEvent>,
    ) -> Result<SliceOutput> {
        let SlicePayload {
            file,
            extension,
            config,
        } = payload;

        // Validation and conversion touch no session state.
        let args = synthesize(config.command(), config.overrides(), config.verbose())?;

        let bias = converter_bias(&extension, self.converter_bias);
        let sink = events.clone();
        let progress = ProgressAggregator::new(
            id,
            bias,
            Box::new(move |event| {
                let _ = sink.send(JobEvent::Progress(event));
            }),
        );

        debug!(extension = %extension, bytes = file.len(), bias, "converting model");
        let converted = convert(file, &extension, self.decoder.as_ref(), &mut |p| {
            progress.converter(p)
        })?;
        for message in &converted.warnings {
            let _ = events.send(JobEvent::Warning {
                job: id,
                message: message.clone(),
            });
        }

        if self.session.state() == SessionState::Uninitialized {
            self.session.initialize(config.verbose() || self.verbose)?;
        }

        self.session.stage_definitions(config.definition())?;
        let slicer = progress.clone();
        let run = self
            .session
            .run(&args, &converted.stl, Box::new(move |p| slicer.slicer(p)));
        let unstage = self.session.unstage_definitions();

        let gcode = match (run, unstage) {
            (Ok(gcode), Ok(())) => gcode,
            (Ok(_), Err(e)) => return Err(e.into()),
            (Err(e), Ok(())) => return Err(e.into()),
            (Err(e), Err(cleanup)) => {
                warn!(error = %cleanup, "failed to remove definitions after failed run");
                return Err(e.into());
            }
        };

        let metadata = GcodeMetadata::parse(&gcode);
        info!(
            bytes = gcode.len(),
            layers = ?metadata.layer_count,
            print_time = ?metadata.print_time_seconds,
            "model sliced"
        );
        Ok(SliceOutput {
            gcode,
            metadata,
            warnings: converted.warnings,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
