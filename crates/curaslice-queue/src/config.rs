//! Worker configuration loaded from TOML.
//!
//! ```toml
//! queue_capacity = 64
//! converter_bias = 0.3
//! verbose = false
//! definitions_dir = "/usr/share/cura/definitions"
//!
//! [engine]
//! binary = "CuraEngine"
//! timeout_secs = 600
//! ```

use std::path::{Path, PathBuf};

use curaslice_engine::{BuiltinDefinitions, ProcessEngineConfig};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::progress::CONVERTER_BIAS;

/// Configuration of one worker and its dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Bound of the dispatcher to worker channel.
    pub queue_capacity: usize,
    /// Converter phase weight for input that needs conversion.
    pub converter_bias: f64,
    /// Forward engine output when the worker initializes implicitly.
    pub verbose: bool,
    /// Directory of `*.def.json` files replacing the embedded built-ins.
    pub definitions_dir: Option<PathBuf>,
    /// External engine settings.
    pub engine: ProcessEngineConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            converter_bias: CONVERTER_BIAS,
            verbose: false,
            definitions_dir: None,
            engine: ProcessEngineConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.converter_bias) {
            return Err(ConfigError::Invalid(format!(
                "converter_bias must lie in [0, 1], got {}",
                self.converter_bias
            )));
        }
        Ok(())
    }

    /// Built-in definitions: from `definitions_dir` when set, embedded otherwise.
    pub fn builtins(&self) -> curaslice_engine::Result<BuiltinDefinitions> {
        match &self.definitions_dir {
            Some(dir) => BuiltinDefinitions::load_dir(dir),
            None => Ok(BuiltinDefinitions::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = WorkerConfig::from_toml_str("").unwrap();
        assert_eq!(config, WorkerConfig::default());
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.converter_bias, 0.3);
        assert_eq!(config.engine.binary, PathBuf::from("CuraEngine"));
    }

    #[test]
    fn test_engine_table() {
        let config = WorkerConfig::from_toml_str(
            r#"
            queue_capacity = 4
            verbose = true

            [engine]
            binary = "/opt/cura/CuraEngine"
            timeout_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.queue_capacity, 4);
        assert!(config.verbose);
        assert_eq!(config.engine.binary, PathBuf::from("/opt/cura/CuraEngine"));
        assert_eq!(config.engine.timeout_secs, Some(30));
        assert!(config.engine.report_progress);
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(matches!(
            WorkerConfig::from_toml_str("converter_bias = 1.5"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            WorkerConfig::from_toml_str("queue_capacity = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            WorkerConfig::from_toml_str("queue_capacity = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_and_builtins_dir() {
        let dir = tempfile::tempdir().unwrap();
        let defs = dir.path().join("defs");
        std::fs::create_dir(&defs).unwrap();
        std::fs::write(defs.join("base.def.json"), "{}").unwrap();

        let path = dir.path().join("worker.toml");
        std::fs::write(&path, format!("definitions_dir = {:?}\n", defs.display().to_string())).unwrap();

        let config = WorkerConfig::load(&path).unwrap();
        let builtins = config.builtins().unwrap();
        assert_eq!(builtins.names().collect::<Vec<_>>(), vec!["base"]);
    }

    #[test]
    fn test_load_missing_file() {
        let err = WorkerConfig::load("/nonexistent/worker.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
