//! CPU-side mesh data and the logical identifiers assigned by the asset queue.
//!
//! This module provides:
//! - [`Vertex`] - Interleaved position/normal/uv/tangent vertex (48 bytes)
//! - [`MeshData`] - Decoded vertices and `u32` indices ready for upload
//! - [`MeshId`], [`MaterialId`], [`Model`] - Logical identifiers that the
//!   GPU registry maps to concrete buffer and texture handles

use std::fmt;

/// Interleaved vertex with position, normal, texture coordinate and tangent.
///
/// The tangent `w` component carries the bitangent sign.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub tangent: [f32; 4],
}

impl Vertex {
    /// Size of one vertex in bytes.
    pub const STRIDE: usize = std::mem::size_of::<Self>();

    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
            tangent: [1.0, 0.0, 0.0, 1.0],
        }
    }

    pub fn with_tangent(mut self, tangent: [f32; 4]) -> Self {
        self.tangent = tangent;
        self
    }
}

static_assertions::const_assert_eq!(Vertex::STRIDE, 48);

/// Decoded mesh geometry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Vertex data as raw bytes.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Index data as raw bytes.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Returns `true` if there is nothing to draw.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }

    /// Returns the first index that points past the vertex array, if any.
    pub fn find_out_of_range_index(&self) -> Option<u32> {
        let count = self.vertex_count();
        self.indices.iter().copied().find(|&i| i >= count)
    }
}

/// Logical mesh identifier assigned when an asset is enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u32);

/// Logical material identifier assigned when an asset is enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

impl fmt::Display for MeshId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mesh#{}", self.0)
    }
}

impl fmt::Display for MaterialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "material#{}", self.0)
    }
}

/// A renderable model: one mesh drawn with one material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Model {
    pub mesh: MeshId,
    pub material: MaterialId,
}

impl Model {
    pub fn new(mesh: MeshId, material: MaterialId) -> Self {
        Self { mesh, material }
    }
}
