#![warn(missing_docs)]

//! Mesh handling for the curaslice pipeline.
//!
//! This crate provides:
//! - The non-indexed [`Mesh`] model (per-face normals and vertices)
//! - A byte-exact binary STL encoder and decoder
//! - Conversion of arbitrary model files to STL through a [`MeshDecoder`]
//!
//! # Example
//!
//! ```
//! use curaslice_mesh::{convert, DecoderRegistry};
//!
//! let stl = vec![0u8; 84];
//! let out = convert(stl.clone(), "stl", &DecoderRegistry::new(), &mut |_| {}).unwrap();
//! assert_eq!(out.stl, stl);
//! ```

pub mod convert;
pub mod error;
pub mod stl;

pub use convert::{
    convert, Converted, DecodeOptions, DecodedMesh, DecoderRegistry, FormatDescriptor,
    MeshBuffer, MeshDecoder,
};
pub use error::{MeshError, Result};
pub use stl::{decode_stl, encode_stl, triangle_count, Mesh};
