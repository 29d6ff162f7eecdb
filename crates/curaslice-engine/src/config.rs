//! Slice configuration, printer definitions and setting overrides.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::definitions;
use crate::error::{EngineError, Result};

/// Printer definition document, owned by the engine's schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrinterDefinition(pub Value);

/// Extruder definition document, owned by the engine's schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtruderDefinition(pub Value);

/// A printer definition together with its extruder definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedDefinition {
    /// Machine definition.
    pub printer: PrinterDefinition,
    /// One definition per extruder, in extruder index order.
    pub extruders: Vec<ExtruderDefinition>,
}

impl Default for CombinedDefinition {
    fn default() -> Self {
        Self {
            printer: PrinterDefinition(definitions::fdmprinter()),
            extruders: vec![ExtruderDefinition(definitions::fdmextruder())],
        }
    }
}

/// Which definition an override applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideScope {
    /// Machine-wide setting.
    #[default]
    Printer,
    /// Setting of the extruder with the given index.
    Extruder(usize),
}

/// A single setting override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Override {
    /// Setting key as known to the engine (e.g. `layer_height`).
    pub key: String,
    /// Setting value.
    pub value: Value,
    /// Target definition.
    #[serde(default)]
    pub scope: OverrideScope,
}

impl Override {
    /// Printer-scoped override.
    pub fn printer(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            scope: OverrideScope::Printer,
        }
    }

    /// Extruder-scoped override.
    pub fn extruder(index: usize, key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            scope: OverrideScope::Extruder(index),
        }
    }

    /// Render as `key=value`; strings are emitted without quotes.
    pub fn to_setting(&self) -> String {
        match &self.value {
            Value::String(s) => format!("{}={}", self.key, s),
            other => format!("{}={}", self.key, other),
        }
    }
}

/// Configuration of a slice job.
///
/// A launch command and setting overrides are mutually exclusive; every
/// constructor, including deserialization, rejects the combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSliceConfig")]
pub struct SliceConfig {
    command: Option<String>,
    definition: CombinedDefinition,
    overrides: Vec<Override>,
    transfer: bool,
    verbose: bool,
}

impl Default for SliceConfig {
    fn default() -> Self {
        Self {
            command: None,
            definition: CombinedDefinition::default(),
            overrides: Vec::new(),
            transfer: true,
            verbose: false,
        }
    }
}

impl SliceConfig {
    /// Start building a configuration.
    pub fn builder() -> SliceConfigBuilder {
        SliceConfigBuilder::default()
    }

    /// Raw launch command, if any.
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    /// Printer and extruder definitions.
    pub fn definition(&self) -> &CombinedDefinition {
        &self.definition
    }

    /// Setting overrides.
    pub fn overrides(&self) -> &[Override] {
        &self.overrides
    }

    /// Whether the caller's buffer is moved into the job instead of copied.
    pub fn transfer(&self) -> bool {
        self.transfer
    }

    /// Whether engine output and lifecycle logging are enabled.
    pub fn verbose(&self) -> bool {
        self.verbose
    }
}

/// Builder for [`SliceConfig`].
#[derive(Debug, Clone, Default)]
pub struct SliceConfigBuilder {
    raw: RawSliceConfig,
}

impl SliceConfigBuilder {
    /// Set a raw launch command.
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.raw.command = Some(command.into());
        self
    }

    /// Set the definitions.
    pub fn definition(mut self, definition: CombinedDefinition) -> Self {
        self.raw.definition = definition;
        self
    }

    /// Append one override.
    pub fn with_override(mut self, item: Override) -> Self {
        self.raw.overrides.push(item);
        self
    }

    /// Replace all overrides.
    pub fn overrides(mut self, overrides: Vec<Override>) -> Self {
        self.raw.overrides = overrides;
        self
    }

    /// Set buffer transfer.
    pub fn transfer(mut self, transfer: bool) -> Self {
        self.raw.transfer = transfer;
        self
    }

    /// Set verbosity.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.raw.verbose = verbose;
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<SliceConfig> {
        SliceConfig::try_from(self.raw)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawSliceConfig {
    command: Option<String>,
    definition: CombinedDefinition,
    overrides: Vec<Override>,
    transfer: bool,
    verbose: bool,
}

impl Default for RawSliceConfig {
    fn default() -> Self {
        let defaults = SliceConfig::default();
        Self {
            command: defaults.command,
            definition: defaults.definition,
            overrides: defaults.overrides,
            transfer: defaults.transfer,
            verbose: defaults.verbose,
        }
    }
}

impl TryFrom<RawSliceConfig> for SliceConfig {
    type Error = EngineError;

    fn try_from(raw: RawSliceConfig) -> Result<Self> {
        if raw.command.is_some() && !raw.overrides.is_empty() {
            return Err(EngineError::ConfigConflict);
        }
        let count = raw.definition.extruders.len();
        for o in &raw.overrides {
            if let OverrideScope::Extruder(index) = o.scope {
                if index >= count {
                    return Err(EngineError::ExtruderOutOfRange {
                        key: o.key.clone(),
                        index,
                        count,
                    });
                }
            }
        }
        Ok(Self {
            command: raw.command,
            definition: raw.definition,
            overrides: raw.overrides,
            transfer: raw.transfer,
            verbose: raw.verbose,
        })
    }
}
