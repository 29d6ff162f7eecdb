//! Engine session: owns one engine instance and its filesystem.
//!
//! Lifecycle:
//!
//! ```text
//! Uninitialized -> Initialized -> (Staged -> run -> Initialized)* -> Destroyed
//! ```
//!
//! The session is driven by a single owner (`&mut self` everywhere), so a
//! staging, run and unstaging sequence can never interleave with another.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::args::{GCODE_FILE, MODEL_FILE};
use crate::config::CombinedDefinition;
use crate::definitions::{
    definition_path, extruder_path, printer_path, BuiltinDefinitions, DEFINITIONS_DIR,
};
use crate::engine::{EngineFactory, EngineOptions, SlicingEngine};
use crate::error::{EngineError, Result};
use crate::fs::{remove_tree, FsError, VirtualFs};

/// Progress sink installed for the duration of one run.
pub type ProgressSink = Box<dyn FnMut(f64) + Send>;

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No engine instance yet.
    Uninitialized,
    /// Engine constructed, nothing staged.
    Initialized,
    /// Definitions are staged in the engine filesystem.
    Staged,
    /// Engine released; terminal.
    Destroyed,
}

/// The single progress slot the engine reports into while running.
#[derive(Default)]
struct ProgressSlot {
    sink: Option<ProgressSink>,
}

impl ProgressSlot {
    fn install(&mut self, sink: ProgressSink) {
        self.sink = Some(sink);
    }

    fn clear(&mut self) {
        self.sink = None;
    }

    fn report(&mut self, progress: f64) {
        if let Some(sink) = self.sink.as_mut() {
            sink(progress);
        }
    }
}

/// Record of what staging wrote, used for symmetric removal.
#[derive(Debug, Clone)]
struct Staged {
    extruder_count: usize,
}

/// One engine instance plus its staging state.
pub struct EngineSession<F: EngineFactory> {
    id: Uuid,
    factory: F,
    builtins: BuiltinDefinitions,
    engine: Option<F::Engine>,
    staged: Option<Staged>,
    progress: ProgressSlot,
    destroyed: bool,
}

impl<F: EngineFactory> EngineSession<F> {
    /// Create an uninitialized session.
    pub fn new(factory: F, builtins: BuiltinDefinitions) -> Self {
        Self {
            id: Uuid::new_v4(),
            factory,
            builtins,
            engine: None,
            staged: None,
            progress: ProgressSlot::default(),
            destroyed: false,
        }
    }

    /// Session identifier used in logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        if self.destroyed {
            SessionState::Destroyed
        } else if self.engine.is_none() {
            SessionState::Uninitialized
        } else if self.staged.is_some() {
            SessionState::Staged
        } else {
            SessionState::Initialized
        }
    }

    /// Shared definitions written on every staging.
    pub fn builtins(&self) -> &BuiltinDefinitions {
        &self.builtins
    }

    /// The engine instance, if initialized.
    pub fn engine(&self) -> Option<&F::Engine> {
        self.engine.as_ref()
    }

    /// Construct the engine instance.
    pub fn initialize(&mut self, verbose: bool) -> Result<()> {
        if self.destroyed {
            return Err(EngineError::Destroyed);
        }
        if self.engine.is_some() {
            return Err(EngineError::AlreadyInitialized);
        }
        let engine = self.factory.construct(&EngineOptions { verbose })?;
        self.engine = Some(engine);
        info!(session = %self.id, verbose, "engine initialized");
        Ok(())
    }

    fn engine_mut(&mut self) -> Result<&mut F::Engine> {
        if self.destroyed {
            return Err(EngineError::Destroyed);
        }
        self.engine.as_mut().ok_or(EngineError::NotInitialized)
    }

    /// Write the built-in, printer and extruder definitions.
    ///
    /// On failure everything written so far is removed again.
    pub fn stage_definitions(&mut self, definition: &CombinedDefinition) -> Result<()> {
        if self.staged.is_some() {
            return Err(EngineError::AlreadyStaged);
        }

        let mut files: Vec<(String, Vec<u8>)> =
            Vec::with_capacity(self.builtins.len() + 1 + definition.extruders.len());
        for (name, document) in self.builtins.iter() {
            files.push((definition_path(name), serde_json::to_vec(document)?));
        }
        files.push((printer_path(), serde_json::to_vec(&definition.printer)?));
        for (i, extruder) in definition.extruders.iter().enumerate() {
            files.push((extruder_path(i), serde_json::to_vec(extruder)?));
        }

        let id = self.id;
        let fs = self.engine_mut()?.fs();
        match fs.mkdir(DEFINITIONS_DIR) {
            Ok(()) => {}
            Err(FsError::AlreadyExists(_)) => {
                let removed = remove_tree(fs, DEFINITIONS_DIR)?;
                warn!(session = %id, removed, "removed stale definitions directory");
                fs.mkdir(DEFINITIONS_DIR)?;
            }
            Err(e) => return Err(e.into()),
        }

        for (path, data) in &files {
            if let Err(e) = fs.write_file(path, data) {
                let _ = remove_tree(fs, DEFINITIONS_DIR);
                return Err(e.into());
            }
        }

        debug!(session = %id, files = files.len(), "definitions staged");
        self.staged = Some(Staged {
            extruder_count: definition.extruders.len(),
        });
        Ok(())
    }

    /// Remove every file written by [`stage_definitions`](Self::stage_definitions)
    /// and the definitions directory.
    ///
    /// Anything else found under the directory, such as files the engine
    /// wrote there during the run, is removed too.
    pub fn unstage_definitions(&mut self) -> Result<()> {
        let Some(staged) = self.staged.take() else {
            return Err(EngineError::NotStaged);
        };

        let mut paths: Vec<String> = self.builtins.names().map(definition_path).collect();
        paths.push(printer_path());
        paths.extend((0..staged.extruder_count).map(extruder_path));

        let id = self.id;
        let fs = self.engine_mut()?.fs();
        for path in &paths {
            if let Err(e) = fs.unlink(path) {
                warn!(session = %id, path = %path, error = %e, "staged definition already gone");
            }
        }
        let leftover = remove_tree(fs, DEFINITIONS_DIR)? - 1;
        if leftover > 0 {
            warn!(session = %id, leftover, "removed unexpected entries from definitions directory");
        }

        debug!(session = %id, files = paths.len(), "definitions removed");
        Ok(())
    }

    /// Slice `model` (binary STL) with `args` and return the G-code.
    ///
    /// `progress` is installed in the session's progress slot for the
    /// duration of the engine call and cleared afterwards.
    pub fn run(&mut self, args: &[String], model: &[u8], progress: ProgressSink) -> Result<Vec<u8>> {
        let id = self.id;
        self.engine_mut()?.fs().write_file(MODEL_FILE, model)?;

        self.progress.install(progress);
        let Self {
            engine, progress: slot, ..
        } = &mut *self;
        let outcome = match engine.as_mut() {
            Some(engine) => {
                debug!(session = %id, args = %args.join(" "), "calling engine");
                engine.call_main(args, &mut |p| slot.report(p))
            }
            None => Err(EngineError::NotInitialized),
        };
        self.progress.clear();

        let fs = self.engine_mut()?.fs();
        let gcode = outcome.and_then(|()| fs.read_file(GCODE_FILE).map_err(EngineError::from));

        if let Err(e) = fs.unlink(MODEL_FILE) {
            warn!(session = %id, error = %e, "failed to remove model file");
        }
        if gcode.is_ok() {
            fs.unlink(GCODE_FILE)?;
        } else {
            let _ = fs.unlink(GCODE_FILE);
        }

        gcode
    }

    /// Drop a progress sink left behind by an interrupted run.
    pub fn clear_progress(&mut self) {
        self.progress.clear();
    }

    /// Release the engine instance. The session cannot be used afterwards.
    pub fn destroy(&mut self) -> Result<()> {
        if self.destroyed {
            return Err(EngineError::Destroyed);
        }
        self.staged = None;
        self.progress.clear();
        self.engine = None;
        self.destroyed = true;
        info!(session = %self.id, "engine destroyed");
        Ok(())
    }
}
