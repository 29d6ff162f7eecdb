//! High-level client over a [`Dispatcher`].

use curaslice_engine::SliceConfig;
use tracing::info;

use crate::dispatcher::{Dispatcher, JobHandle};
use crate::error::{JobError, Result};
use crate::job::SliceOutput;

/// Slices models with one fixed configuration.
///
/// ```ignore
/// let mut slicer = Slicer::new(dispatcher, SliceConfig::default());
/// let mut file = std::fs::read("benchy.stl")?;
/// let out = slicer.slice(&mut file, "STL").await?;
/// assert!(file.is_empty()); // transferred
/// ```
#[derive(Debug)]
pub struct Slicer {
    dispatcher: Dispatcher,
    config: SliceConfig,
    loaded: bool,
}

impl Slicer {
    /// Create a client. The engine is loaded on first use.
    pub fn new(dispatcher: Dispatcher, config: SliceConfig) -> Self {
        Self {
            dispatcher,
            config,
            loaded: false,
        }
    }

    /// Configuration used for every slice.
    pub fn config(&self) -> &SliceConfig {
        &self.config
    }

    /// Whether [`load`](Self::load) has completed.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Initialize the worker's engine session.
    pub async fn load(&mut self) -> Result<()> {
        if self.config.verbose() {
            info!("loading engine");
        }
        self.dispatcher.initialize(self.config.verbose()).await?.wait().await?;
        self.loaded = true;
        if self.config.verbose() {
            info!("engine loaded");
        }
        Ok(())
    }

    /// Submit `file` for slicing and return the job handle.
    ///
    /// With `transfer` set the buffer is moved into the job and `file` is left
    /// empty; otherwise it is copied.
    pub async fn submit(&mut self, file: &mut Vec<u8>, extension: &str) -> Result<JobHandle> {
        if !self.loaded {
            self.load().await?;
        }
        let bytes = if self.config.transfer() {
            std::mem::take(file)
        } else {
            file.clone()
        };
        self.dispatcher
            .slice(bytes, extension, self.config.clone())
            .await
    }

    /// Slice `file` and wait for the G-code.
    pub async fn slice(&mut self, file: &mut Vec<u8>, extension: &str) -> Result<SliceOutput> {
        let handle = self.submit(file, extension).await?;
        let id = handle.id();
        handle
            .wait()
            .await?
            .into_slice()
            .ok_or(JobError::UnexpectedOutput(id))
    }

    /// Destroy the worker's engine session.
    pub async fn destroy(&mut self) -> Result<()> {
        self.dispatcher.destroy().await?.wait().await?;
        self.loaded = false;
        if self.config.verbose() {
            info!("engine destroyed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::worker::spawn;
    use curaslice_engine::{BuiltinDefinitions, MemoryEngineFactory};
    use curaslice_mesh::DecoderRegistry;
    use std::sync::Arc;

    #[test]
    fn test_load_then_destroy() {
        let factory = MemoryEngineFactory::new(|_, _, _| Ok(()));
        let (dispatcher, worker) = spawn(
            factory,
            BuiltinDefinitions::default(),
            Arc::new(DecoderRegistry::new()),
            &WorkerConfig::default(),
        )
        .unwrap();

        let mut slicer = Slicer::new(dispatcher, SliceConfig::default());
        assert!(slicer.config().transfer());

        tokio_test::block_on(async {
            slicer.load().await.unwrap();
            assert!(slicer.is_loaded());
            slicer.destroy().await.unwrap();
            assert!(!slicer.is_loaded());
        });

        drop(slicer);
        worker.join().unwrap();
    }

    #[test]
    fn test_missing_gcode_fails_slice() {
        let factory = MemoryEngineFactory::new(|_, _, _| Ok(()));
        let (dispatcher, worker) = spawn(
            factory,
            BuiltinDefinitions::default(),
            Arc::new(DecoderRegistry::new()),
            &WorkerConfig::default(),
        )
        .unwrap();
        let mut slicer = Slicer::new(dispatcher, SliceConfig::default());

        let err = tokio_test::block_on(slicer.slice(&mut vec![0u8; 84], "stl")).unwrap_err();
        assert!(matches!(err, JobError::Engine(_)));

        drop(slicer);
        worker.join().unwrap();
    }
}
