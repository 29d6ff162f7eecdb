//! Definition file layout and the shared built-in definitions.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{json, Value};
use tracing::debug;

use crate::error::{EngineError, Result};

/// Directory holding definition files inside the engine filesystem.
pub const DEFINITIONS_DIR: &str = "/definitions";

/// Suffix of every definition file.
pub const DEFINITION_SUFFIX: &str = ".def.json";

/// Virtual path of a named definition.
pub fn definition_path(name: &str) -> String {
    format!("{}/{}{}", DEFINITIONS_DIR, name, DEFINITION_SUFFIX)
}

/// Virtual path of the caller-supplied printer definition.
pub fn printer_path() -> String {
    definition_path("printer")
}

/// Virtual path of the definition for extruder `index`.
pub fn extruder_path(index: usize) -> String {
    definition_path(&format!("extruder-{}", index))
}

/// Whether `name` is taken by a caller-supplied printer or extruder file.
pub fn is_reserved_name(name: &str) -> bool {
    name == "printer"
        || name
            .strip_prefix("extruder-")
            .is_some_and(|index| index.parse::<usize>().is_ok())
}

/// Base machine definition every printer inherits from.
pub fn fdmprinter() -> Value {
    json!({
        "version": 2,
        "name": "FFF Printer",
        "metadata": {
            "type": "machine",
            "author": "Unknown",
            "manufacturer": "Unknown",
            "visible": false,
            "has_materials": true,
            "preferred_material": "generic_pla",
            "machine_extruder_trains": { "0": "fdmextruder" }
        },
        "settings": {
            "machine_settings": {
                "label": "Machine",
                "type": "category",
                "children": {
                    "machine_name": { "label": "Machine Type", "type": "str", "default_value": "Unknown" },
                    "machine_width": { "label": "Machine Width", "type": "float", "unit": "mm", "default_value": 100 },
                    "machine_depth": { "label": "Machine Depth", "type": "float", "unit": "mm", "default_value": 100 },
                    "machine_height": { "label": "Machine Height", "type": "float", "unit": "mm", "default_value": 100 },
                    "machine_heated_bed": { "label": "Has Heated Build Plate", "type": "bool", "default_value": false },
                    "machine_extruder_count": { "label": "Number of Extruders", "type": "int", "default_value": 1 },
                    "machine_gcode_flavor": { "label": "G-code Flavor", "type": "enum", "default_value": "RepRap (Marlin/Sprinter)" }
                }
            },
            "resolution": {
                "label": "Quality",
                "type": "category",
                "children": {
                    "layer_height": { "label": "Layer Height", "type": "float", "unit": "mm", "default_value": 0.1 },
                    "layer_height_0": { "label": "Initial Layer Height", "type": "float", "unit": "mm", "default_value": 0.3 },
                    "line_width": { "label": "Line Width", "type": "float", "unit": "mm", "default_value": 0.4 }
                }
            }
        }
    })
}

/// Base extruder definition every extruder inherits from.
pub fn fdmextruder() -> Value {
    json!({
        "version": 2,
        "name": "Extruder",
        "metadata": {
            "type": "extruder",
            "author": "Unknown",
            "manufacturer": "Unknown",
            "setting_version": 1,
            "visible": false,
            "position": "0"
        },
        "settings": {
            "machine_settings": {
                "label": "Machine",
                "type": "category",
                "children": {
                    "extruder_nr": { "label": "Extruder", "type": "extruder", "default_value": "0" },
                    "machine_nozzle_size": { "label": "Nozzle Diameter", "type": "float", "unit": "mm", "default_value": 0.4 },
                    "machine_nozzle_offset_x": { "label": "Nozzle X Offset", "type": "float", "unit": "mm", "default_value": 0 },
                    "machine_nozzle_offset_y": { "label": "Nozzle Y Offset", "type": "float", "unit": "mm", "default_value": 0 }
                }
            }
        }
    })
}

/// Shared definitions written alongside every printer definition.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltinDefinitions {
    entries: BTreeMap<String, Value>,
}

impl Default for BuiltinDefinitions {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("fdmprinter".to_string(), fdmprinter());
        entries.insert("fdmextruder".to_string(), fdmextruder());
        Self { entries }
    }
}

impl BuiltinDefinitions {
    /// A set with no definitions.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Add or replace a definition.
    ///
    /// Names that would overwrite the printer or an extruder file are
    /// rejected.
    pub fn insert(&mut self, name: impl Into<String>, document: Value) -> Result<()> {
        let name = name.into();
        if is_reserved_name(&name) {
            return Err(EngineError::ReservedDefinitionName(name));
        }
        self.entries.insert(name, document);
        Ok(())
    }

    /// Load every `<name>.def.json` file in `dir`.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let mut builtins = Self::empty();
        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            let Some(name) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(DEFINITION_SUFFIX))
            else {
                continue;
            };
            let document: Value = serde_json::from_slice(&std::fs::read(&path)?)?;
            debug!(name, path = %path.display(), "loaded built-in definition");
            builtins.insert(name, document)?;
        }
        Ok(builtins)
    }

    /// Number of definitions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Definition names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Name and document pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}
