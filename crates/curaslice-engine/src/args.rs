//! Synthesis of the engine's command-line arguments.
//!
//! Without a launch command the invocation is
//!
//! ```text
//! slice [-v] -j definitions/printer.def.json
//!       [-s key=value]...                                   printer overrides
//!       [-e<i> -j definitions/extruder-<i>.def.json [-s key=value]...]...
//!       [-g]
//!       -l Model.stl -o Model.gcode
//! ```
//!
//! Settings given after `-l` apply to the loaded mesh rather than to the
//! printer, so every override is placed before the model flag. Extruder
//! blocks are ordered by index and `-g` returns the focus to the global
//! scope before the model is loaded.

use std::collections::BTreeMap;

use crate::config::{Override, OverrideScope};
use crate::error::{EngineError, Result};

/// Engine verb.
pub const SLICE_VERB: &str = "slice";

/// Model path inside the engine filesystem.
pub const MODEL_FILE: &str = "Model.stl";

/// G-code output path inside the engine filesystem.
pub const GCODE_FILE: &str = "Model.gcode";

/// Printer definition path relative to the engine's working directory.
pub const PRINTER_DEFINITION: &str = "definitions/printer.def.json";

/// Extruder definition path relative to the engine's working directory.
pub fn extruder_definition(index: usize) -> String {
    format!("definitions/extruder-{}.def.json", index)
}

/// Build the argument vector for one engine invocation.
///
/// A raw `command` is split on whitespace and used verbatim. Otherwise the
/// default invocation is generated from `overrides`; overrides sharing a
/// scope keep their relative order, so a later entry shadows an earlier one.
pub fn synthesize(command: Option<&str>, overrides: &[Override], verbose: bool) -> Result<Vec<String>> {
    if let Some(command) = command {
        if !overrides.is_empty() {
            return Err(EngineError::ConfigConflict);
        }
        return Ok(command.split_whitespace().map(str::to_string).collect());
    }

    let mut args = vec![SLICE_VERB.to_string()];
    if verbose {
        args.push("-v".into());
    }
    args.push("-j".into());
    args.push(PRINTER_DEFINITION.into());

    let mut extruders: BTreeMap<usize, Vec<&Override>> = BTreeMap::new();
    for item in overrides {
        match item.scope {
            OverrideScope::Printer => {
                args.push("-s".into());
                args.push(item.to_setting());
            }
            OverrideScope::Extruder(index) => extruders.entry(index).or_default().push(item),
        }
    }

    for (index, items) in &extruders {
        args.push(format!("-e{}", index));
        args.push("-j".into());
        args.push(extruder_definition(*index));
        for item in items {
            args.push("-s".into());
            args.push(item.to_setting());
        }
    }
    if !extruders.is_empty() {
        args.push("-g".into());
    }

    args.extend(["-l", MODEL_FILE, "-o", GCODE_FILE].map(str::to_string));
    Ok(args)
}
