//! Slicing engine boundary.
//!
//! An engine is an opaque, command-line-driven program with its own
//! filesystem. The session writes inputs into that filesystem, calls the
//! entry point with an argument vector and reads the output back.

use std::sync::Arc;

use crate::error::Result;
use crate::fs::{MemoryFs, VirtualFs};

/// Options used when constructing an engine instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Forward the engine's own output instead of suppressing it.
    pub verbose: bool,
}

/// A constructed engine instance.
pub trait SlicingEngine: Send {
    /// The instance's filesystem.
    fn fs(&mut self) -> &mut dyn VirtualFs;

    /// Run the engine's entry point to completion.
    ///
    /// `progress` receives fractions in `[0, 1]` while the engine runs.
    fn call_main(&mut self, args: &[String], progress: &mut dyn FnMut(f64)) -> Result<()>;
}

/// Constructs engine instances.
pub trait EngineFactory: Send + 'static {
    /// Engine type produced by this factory.
    type Engine: SlicingEngine + 'static;

    /// Construct a new instance. May block while the engine loads.
    fn construct(&self, options: &EngineOptions) -> Result<Self::Engine>;
}

/// Entry point of an in-process engine.
pub type EntryPoint =
    Arc<dyn Fn(&[String], &mut MemoryFs, &mut dyn FnMut(f64)) -> Result<()> + Send + Sync>;

/// Engine backed by [`MemoryFs`] and an in-process entry point.
pub struct MemoryEngine {
    fs: MemoryFs,
    entry: EntryPoint,
    options: EngineOptions,
}

impl MemoryEngine {
    /// Create an engine around `entry`.
    pub fn new(entry: EntryPoint, options: EngineOptions) -> Self {
        Self {
            fs: MemoryFs::new(),
            entry,
            options,
        }
    }

    /// Options the engine was constructed with.
    pub fn options(&self) -> EngineOptions {
        self.options
    }

    /// The in-memory filesystem.
    pub fn memory_fs(&self) -> &MemoryFs {
        &self.fs
    }
}

impl SlicingEngine for MemoryEngine {
    fn fs(&mut self) -> &mut dyn VirtualFs {
        &mut self.fs
    }

    fn call_main(&mut self, args: &[String], progress: &mut dyn FnMut(f64)) -> Result<()> {
        (self.entry)(args, &mut self.fs, progress)
    }
}

/// Factory for [`MemoryEngine`].
#[derive(Clone)]
pub struct MemoryEngineFactory {
    entry: EntryPoint,
}

impl MemoryEngineFactory {
    /// Create a factory whose engines run `entry`.
    pub fn new<F>(entry: F) -> Self
    where
        F: Fn(&[String], &mut MemoryFs, &mut dyn FnMut(f64)) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            entry: Arc::new(entry),
        }
    }
}

impl EngineFactory for MemoryEngineFactory {
    type Engine = MemoryEngine;

    fn construct(&self, options: &EngineOptions) -> Result<MemoryEngine> {
        Ok(MemoryEngine::new(self.entry.clone(), *options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_engine_runs_entry() {
        let factory = MemoryEngineFactory::new(|args, fs, progress| {
            progress(0.5);
            fs.write_file("out.txt", args.join(" ").as_bytes())?;
            Ok(())
        });
        let mut engine = factory.construct(&EngineOptions::default()).unwrap();

        let mut seen = Vec::new();
        engine
            .call_main(&["slice".to_string(), "-v".to_string()], &mut |p| seen.push(p))
            .unwrap();

        assert_eq!(seen, vec![0.5]);
        assert_eq!(engine.fs().read_file("/out.txt").unwrap(), b"slice -v");
    }
}
