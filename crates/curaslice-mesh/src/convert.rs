//! Conversion of arbitrary 3D model files into binary STL.
//!
//! STL input passes through untouched. Every other format is handed to a
//! [`MeshDecoder`]; the first decoded mesh is encoded with [`encode_stl`].

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{MeshError, Result};
use crate::stl::{encode_stl, Mesh};

/// Description of a file format a decoder understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDescriptor {
    /// Human-readable format name.
    pub name: String,
    /// Lower-case extensions, without the leading dot.
    pub extensions: Vec<String>,
}

impl FormatDescriptor {
    /// Create a descriptor.
    pub fn new(name: impl Into<String>, extensions: &[&str]) -> Self {
        Self {
            name: name.into(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Whether the descriptor lists `extension`.
    pub fn matches(&self, extension: &str) -> bool {
        self.extensions.iter().any(|e| e == extension)
    }
}

/// Options passed to a decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Request indexed normals instead of per-face normals.
    pub indexed_normals: bool,
    /// Request indexed vertices instead of per-face vertices.
    pub indexed_vertices: bool,
}

/// Numeric buffer as produced by a decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshBuffer {
    /// Single precision values.
    F32(Vec<f32>),
    /// Double precision values.
    F64(Vec<f64>),
}

impl MeshBuffer {
    /// Number of scalar components.
    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
        }
    }

    /// Whether the buffer holds no components.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Normalize to single precision.
    pub fn into_f32(self) -> Vec<f32> {
        match self {
            Self::F32(v) => v,
            Self::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        }
    }
}

impl From<Vec<f32>> for MeshBuffer {
    fn from(v: Vec<f32>) -> Self {
        Self::F32(v)
    }
}

impl From<Vec<f64>> for MeshBuffer {
    fn from(v: Vec<f64>) -> Self {
        Self::F64(v)
    }
}

/// One mesh returned by a decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMesh {
    /// Per-face normals.
    pub normals: MeshBuffer,
    /// Per-face vertices.
    pub vertices: MeshBuffer,
}

/// Format decoder boundary.
///
/// Progress passed to the callback is in the range `[0, 100]`.
pub trait MeshDecoder: Send + Sync {
    /// Return the format descriptor handling `extension`, if any.
    fn supports_extension(&self, extension: &str) -> Option<FormatDescriptor>;

    /// Decode `bytes` into zero or more meshes.
    fn decode(
        &self,
        bytes: &[u8],
        format: &FormatDescriptor,
        options: &DecodeOptions,
        progress: &mut dyn FnMut(f64),
    ) -> Result<Vec<DecodedMesh>>;
}

/// Ordered collection of decoders; the first one claiming an extension wins.
#[derive(Default, Clone)]
pub struct DecoderRegistry {
    decoders: Vec<Arc<dyn MeshDecoder>>,
}

impl DecoderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a decoder.
    pub fn register(&mut self, decoder: Arc<dyn MeshDecoder>) -> &mut Self {
        self.decoders.push(decoder);
        self
    }

    /// Number of registered decoders.
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    /// Whether no decoders are registered.
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    fn find(&self, extension: &str) -> Option<(&dyn MeshDecoder, FormatDescriptor)> {
        self.decoders
            .iter()
            .find_map(|d| d.supports_extension(extension).map(|f| (d.as_ref(), f)))
    }
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderRegistry")
            .field("decoders", &self.decoders.len())
            .finish()
    }
}

impl MeshDecoder for DecoderRegistry {
    fn supports_extension(&self, extension: &str) -> Option<FormatDescriptor> {
        self.find(extension).map(|(_, f)| f)
    }

    fn decode(
        &self,
        bytes: &[u8],
        format: &FormatDescriptor,
        options: &DecodeOptions,
        progress: &mut dyn FnMut(f64),
    ) -> Result<Vec<DecodedMesh>> {
        let decoder = format
            .extensions
            .iter()
            .find_map(|ext| self.find(ext))
            .map(|(d, _)| d)
            .ok_or_else(|| MeshError::UnsupportedFormat(format.name.clone()))?;
        decoder.decode(bytes, format, options, progress)
    }
}

/// Result of a successful conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct Converted {
    /// Binary STL bytes.
    pub stl: Vec<u8>,
    /// Non-fatal conditions encountered while converting.
    pub warnings: Vec<String>,
}

/// Convert a model file into binary STL.
///
/// `extension` is expected in lower case. `on_progress` receives fractions in
/// `[0, 1]` and is never called for STL input.
pub fn convert(
    file: Vec<u8>,
    extension: &str,
    decoder: &dyn MeshDecoder,
    on_progress: &mut dyn FnMut(f64),
) -> Result<Converted> {
    if extension == "stl" {
        return Ok(Converted {
            stl: file,
            warnings: Vec::new(),
        });
    }

    let format = decoder
        .supports_extension(extension)
        .ok_or_else(|| MeshError::UnsupportedFormat(extension.to_string()))?;
    debug!(format = %format.name, extension, "decoding model");

    let options = DecodeOptions::default();
    let mut forward = |p: f64| on_progress(p / 100.0);
    let meshes = decoder.decode(&file, &format, &options, &mut forward)?;

    let mut warnings = Vec::new();
    let count = meshes.len();
    let first = meshes.into_iter().next().ok_or(MeshError::EmptyMesh)?;
    if count > 1 {
        let message = format!(
            "got {} meshes when parsing the supplied file, using the first one",
            count
        );
        warn!(extension, meshes = count, "{}", message);
        warnings.push(message);
    }

    let mesh = Mesh::new(first.normals.into_f32(), first.vertices.into_f32())?;
    Ok(Converted {
        stl: encode_stl(&mesh.normals, &mesh.vertices),
        warnings,
    })
}
