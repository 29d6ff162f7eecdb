#![warn(missing_docs)]

//! CuraEngine integration for curaslice.
//!
//! This crate provides:
//! - [`SliceConfig`] with printer/extruder definitions and setting overrides
//! - Deterministic synthesis of the engine's argument vector
//! - The engine boundary ([`SlicingEngine`], [`EngineFactory`], [`VirtualFs`])
//! - [`EngineSession`], which stages definitions, runs the engine and cleans up
//! - A process-backed engine that drives an external CuraEngine executable
//! - G-code header metadata parsing
//!
//! # Example
//!
//! ```ignore
//! use curaslice_engine::{synthesize, BuiltinDefinitions, EngineSession, ProcessEngineFactory, SliceConfig};
//!
//! let config = SliceConfig::default();
//! let mut session = EngineSession::new(ProcessEngineFactory::default(), BuiltinDefinitions::default());
//! session.initialize(config.verbose())?;
//! session.stage_definitions(config.definition())?;
//!
//! let args = synthesize(config.command(), config.overrides(), config.verbose())?;
//! let gcode = session.run(&args, &stl_bytes, Box::new(|p| println!("{:.0}%", p * 100.0)));
//! session.unstage_definitions()?;
//! ```

pub mod args;
pub mod config;
pub mod definitions;
pub mod engine;
pub mod error;
pub mod fs;
pub mod metadata;
pub mod process;
pub mod session;

pub use args::synthesize;
pub use config::{
    CombinedDefinition, ExtruderDefinition, Override, OverrideScope, PrinterDefinition,
    SliceConfig, SliceConfigBuilder,
};
pub use definitions::BuiltinDefinitions;
pub use engine::{EngineFactory, EngineOptions, MemoryEngine, MemoryEngineFactory, SlicingEngine};
pub use error::{EngineError, Result};
pub use fs::{FsError, MemoryFs, VirtualFs};
pub use metadata::GcodeMetadata;
pub use process::{ProcessEngine, ProcessEngineConfig, ProcessEngineFactory};
pub use session::{EngineSession, ProgressSink, SessionState};
