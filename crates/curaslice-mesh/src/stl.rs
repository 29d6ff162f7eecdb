//! Binary STL encoding and decoding.
//!
//! ```text
//! UINT8[80]    – Header (zero-filled)
//! UINT32       – Number of triangles
//! foreach triangle
//!     REAL32[3] – Normal vector
//!     REAL32[3] – Vertex 1
//!     REAL32[3] – Vertex 2
//!     REAL32[3] – Vertex 3
//!     UINT16    – Attribute byte count (always 0)
//! end
//! ```
//!
//! All values are little-endian.

use serde::{Deserialize, Serialize};

use crate::error::{MeshError, Result};

/// STL binary header size in bytes.
pub const HEADER_SIZE: usize = 80;

/// Size of one triangle record (normal + 3 vertices + attribute).
pub const TRIANGLE_SIZE: usize = 50;

/// Header plus the triangle count field.
const PREAMBLE_SIZE: usize = HEADER_SIZE + 4;

/// A non-indexed triangle mesh.
///
/// Holds 3 normal components and 9 vertex components per face.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    /// Per-face normals (x, y, z triplets).
    pub normals: Vec<f32>,
    /// Per-face vertices (3 vertices of x, y, z per face).
    pub vertices: Vec<f32>,
}

impl Mesh {
    /// Create a mesh, checking that the buffers describe whole triangles.
    pub fn new(normals: Vec<f32>, vertices: Vec<f32>) -> Result<Self> {
        if normals.len() % 3 != 0 {
            return Err(MeshError::MalformedMesh(format!(
                "normal count {} is not a multiple of 3",
                normals.len()
            )));
        }
        if vertices.len() != 3 * normals.len() {
            return Err(MeshError::MalformedMesh(format!(
                "expected {} vertex components for {} normals, got {}",
                3 * normals.len(),
                normals.len(),
                vertices.len()
            )));
        }
        Ok(Self { normals, vertices })
    }

    /// Number of triangular faces.
    pub fn face_count(&self) -> usize {
        self.normals.len() / 3
    }

    /// Axis-aligned bounding box, or `None` for an empty mesh.
    pub fn bounds(&self) -> Option<([f32; 3], [f32; 3])> {
        let mut points = self.vertices.chunks_exact(3);
        let first = points.next()?;
        let mut min = [first[0], first[1], first[2]];
        let mut max = min;
        for p in points {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }
        Some((min, max))
    }

    /// Encode as binary STL.
    pub fn to_stl(&self) -> Vec<u8> {
        encode_stl(&self.normals, &self.vertices)
    }
}

/// Encode normals and vertices as a binary STL buffer.
///
/// # Panics
///
/// Panics if `vertices.len() != 3 * normals.len()`, if the normal count is
/// not a multiple of 3, or if the face count does not fit the 32-bit field.
/// These are caller bugs; use [`Mesh::new`] to validate untrusted buffers.
pub fn encode_stl(normals: &[f32], vertices: &[f32]) -> Vec<u8> {
    assert_eq!(
        normals.len() % 3,
        0,
        "normal count must be a multiple of 3"
    );
    assert_eq!(
        vertices.len(),
        3 * normals.len(),
        "vertex count must be 3x the normal count"
    );

    let face_count = normals.len() / 3;
    assert!(
        u32::try_from(face_count).is_ok(),
        "face count exceeds binary STL limit"
    );

    let mut data = Vec::with_capacity(PREAMBLE_SIZE + TRIANGLE_SIZE * face_count);
    data.extend_from_slice(&[0u8; HEADER_SIZE]);
    data.extend_from_slice(&(face_count as u32).to_le_bytes());

    for (normal, corners) in normals.chunks_exact(3).zip(vertices.chunks_exact(9)) {
        for value in normal.iter().chain(corners) {
            data.extend_from_slice(&value.to_le_bytes());
        }
        // Attribute byte count
        data.extend_from_slice(&0u16.to_le_bytes());
    }

    data
}

/// Read the triangle count field of a binary STL.
pub fn triangle_count(bytes: &[u8]) -> Result<u32> {
    if bytes.len() < PREAMBLE_SIZE {
        return Err(MeshError::InvalidStl(format!(
            "expected at least {} bytes, got {}",
            PREAMBLE_SIZE,
            bytes.len()
        )));
    }
    Ok(u32::from_le_bytes([
        bytes[HEADER_SIZE],
        bytes[HEADER_SIZE + 1],
        bytes[HEADER_SIZE + 2],
        bytes[HEADER_SIZE + 3],
    ]))
}

/// Decode a binary STL buffer into a [`Mesh`].
pub fn decode_stl(bytes: &[u8]) -> Result<Mesh> {
    let count = triangle_count(bytes)? as usize;
    let expected = PREAMBLE_SIZE + TRIANGLE_SIZE * count;
    if bytes.len() != expected {
        return Err(MeshError::InvalidStl(format!(
            "{} triangles need {} bytes, got {}",
            count,
            expected,
            bytes.len()
        )));
    }

    let mut normals = Vec::with_capacity(count * 3);
    let mut vertices = Vec::with_capacity(count * 9);

    for record in bytes[PREAMBLE_SIZE..].chunks_exact(TRIANGLE_SIZE) {
        let mut floats = record[..48]
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]));
        normals.extend(floats.by_ref().take(3));
        vertices.extend(floats);
    }

    Ok(Mesh { normals, vertices })
}
