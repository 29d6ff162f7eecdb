#![warn(missing_docs)]

//! Ordered slicing jobs for curaslice.
//!
//! A [`Dispatcher`] accepts `Initialize`, `Slice` and `Destroy` jobs from any
//! number of producers and hands them, in submission order, to a single
//! worker thread that owns the engine session. Every job resolves exactly
//! once through its [`JobHandle`]; progress and warnings arrive on the same
//! handle while the job runs.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use curaslice_engine::{ProcessEngineFactory, SliceConfig};
//! use curaslice_mesh::DecoderRegistry;
//! use curaslice_queue::{spawn, WorkerConfig};
//!
//! let config = WorkerConfig::default();
//! let factory = ProcessEngineFactory::new(config.engine.clone());
//! let (dispatcher, worker) = spawn(factory, config.builtins()?, Arc::new(DecoderRegistry::new()), &config)?;
//!
//! let handle = dispatcher.slice(std::fs::read("cube.stl")?, "stl", SliceConfig::default()).await?;
//! let gcode = handle.wait().await?.into_slice().unwrap().gcode;
//!
//! drop(dispatcher);
//! worker.join().unwrap();
//! ```

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod progress;
pub mod worker;

pub use client::Slicer;
pub use config::WorkerConfig;
pub use dispatcher::{Dispatcher, JobHandle};
pub use error::{ConfigError, JobError, Result};
pub use job::{
    Job, JobEvent, JobId, JobKind, JobOutput, JobPayload, ProgressEvent, SliceOutput, SlicePayload,
};
pub use progress::{converter_bias, ProgressAggregator, CONVERTER_BIAS};
pub use worker::{spawn, WorkerHandle};
