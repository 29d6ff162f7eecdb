//! Print metadata from the G-code header comments written by CuraEngine.

use serde::{Deserialize, Serialize};

/// Metadata extracted from G-code comments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GcodeMetadata {
    /// G-code flavor (e.g. "Marlin").
    pub flavor: Option<String>,
    /// Estimated print time in seconds.
    pub print_time_seconds: Option<f64>,
    /// Filament used per extruder, in metres.
    pub filament_used_m: Vec<f64>,
    /// Layer height (mm).
    pub layer_height: Option<f64>,
    /// Number of layers.
    pub layer_count: Option<u32>,
    /// Bounding box min corner.
    pub bounds_min: Option<[f64; 3]>,
    /// Bounding box max corner.
    pub bounds_max: Option<[f64; 3]>,
    /// Generator line (engine name and version).
    pub generator: Option<String>,
}

impl GcodeMetadata {
    /// Parse metadata from raw G-code.
    pub fn parse(gcode: &[u8]) -> Self {
        let text = String::from_utf8_lossy(gcode);
        let mut meta = Self::default();
        let mut min = [None; 3];
        let mut max = [None; 3];

        for line in text.lines() {
            let Some(comment) = line.trim().strip_prefix(';') else {
                continue;
            };

            if let Some(value) = comment.strip_prefix("FLAVOR:") {
                meta.flavor = Some(value.trim().to_string());
            } else if let Some(value) = comment.strip_prefix("TIME:") {
                meta.print_time_seconds = value.trim().parse().ok();
            } else if let Some(value) = comment.strip_prefix("Filament used:") {
                meta.filament_used_m = value
                    .split(',')
                    .filter_map(|v| v.trim().trim_end_matches('m').trim().parse().ok())
                    .collect();
            } else if let Some(value) = comment.strip_prefix("Layer height:") {
                meta.layer_height = value.trim().parse().ok();
            } else if let Some(value) = comment.strip_prefix("LAYER_COUNT:") {
                meta.layer_count = value.trim().parse().ok();
            } else if let Some(value) = comment.strip_prefix("Generated with") {
                meta.generator = Some(value.trim().to_string());
            } else if let Some((key, value)) = comment.split_once(':') {
                let slot = match key {
                    "MINX" => &mut min[0],
                    "MINY" => &mut min[1],
                    "MINZ" => &mut min[2],
                    "MAXX" => &mut max[0],
                    "MAXY" => &mut max[1],
                    "MAXZ" => &mut max[2],
                    _ => continue,
                };
                *slot = value.trim().parse::<f64>().ok();
            }
        }

        if let [Some(x), Some(y), Some(z)] = min {
            meta.bounds_min = Some([x, y, z]);
        }
        if let [Some(x), Some(y), Some(z)] = max {
            meta.bounds_max = Some([x, y, z]);
        }
        meta
    }
}
