//! Parsing of `-s KEY=VALUE` and `-x N:KEY=VALUE` arguments and definition files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use curaslice_engine::{CombinedDefinition, ExtruderDefinition, Override, PrinterDefinition};
use serde_json::Value;

/// Values that parse as JSON keep their type; anything else is a string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn split_setting(s: &str) -> Result<(&str, Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{}`", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty setting key in `{}`", s));
    }
    Ok((key, parse_value(value.trim())))
}

/// Parse a printer-scoped `KEY=VALUE` override.
pub fn parse_printer_setting(s: &str) -> Result<Override, String> {
    let (key, value) = split_setting(s)?;
    Ok(Override::printer(key, value))
}

/// Parse an extruder-scoped `N:KEY=VALUE` override.
pub fn parse_extruder_setting(s: &str) -> Result<Override, String> {
    let (index, setting) = s
        .split_once(':')
        .ok_or_else(|| format!("expected N:KEY=VALUE, got `{}`", s))?;
    let index: usize = index
        .trim()
        .parse()
        .map_err(|_| format!("invalid extruder index `{}`", index))?;
    let (key, value) = split_setting(setting)?;
    Ok(Override::extruder(index, key, value))
}

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))
}

/// Build the printer and extruder definitions, falling back to the defaults
/// for whatever is not given.
pub fn load_definition(printer: Option<&Path>, extruders: &[PathBuf]) -> Result<CombinedDefinition> {
    let mut definition = CombinedDefinition::default();
    if let Some(path) = printer {
        definition.printer = PrinterDefinition(read_json(path)?);
    }
    if !extruders.is_empty() {
        definition.extruders = extruders
            .iter()
            .map(|path| read_json(path).map(ExtruderDefinition))
            .collect::<Result<_>>()?;
    }
    Ok(definition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use curaslice_engine::OverrideScope;

    #[test]
    fn test_printer_setting() {
        let o = parse_printer_setting("layer_height=0.2").unwrap();
        assert_eq!(o.key, "layer_height");
        assert_eq!(o.value, Value::from(0.2));
        assert_eq!(o.scope, OverrideScope::Printer);

        let o = parse_printer_setting("adhesion_type=brim").unwrap();
        assert_eq!(o.value, Value::from("brim"));
        assert_eq!(o.to_setting(), "adhesion_type=brim");
    }

    #[test]
    fn test_extruder_setting() {
        let o = parse_extruder_setting("1:material_print_temperature=215").unwrap();
        assert_eq!(o.scope, OverrideScope::Extruder(1));
        assert_eq!(o.value, Value::from(215));
    }

    #[test]
    fn test_malformed_settings() {
        assert!(parse_printer_setting("layer_height").is_err());
        assert!(parse_printer_setting("=1").is_err());
        assert!(parse_extruder_setting("x:a=1").is_err());
        assert!(parse_extruder_setting("a=1").is_err());
    }

    #[test]
    fn test_load_definition() {
        let dir = tempfile::tempdir().unwrap();
        let printer = dir.path().join("printer.def.json");
        let left = dir.path().join("left.def.json");
        let right = dir.path().join("right.def.json");
        std::fs::write(&printer, r#"{"name": "custom"}"#).unwrap();
        std::fs::write(&left, r#"{"position": 0}"#).unwrap();
        std::fs::write(&right, r#"{"position": 1}"#).unwrap();

        let definition = load_definition(Some(&printer), &[left, right]).unwrap();
        assert_eq!(definition.printer.0["name"], "custom");
        assert_eq!(definition.extruders.len(), 2);
        assert_eq!(definition.extruders[1].0["position"], 1);

        let defaults = load_definition(None, &[]).unwrap();
        assert_eq!(defaults, CombinedDefinition::default());
    }

    #[test]
    fn test_load_definition_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let printer = dir.path().join("printer.def.json");
        std::fs::write(&printer, "{").unwrap();
        assert!(load_definition(Some(&printer), &[]).is_err());
    }
}
