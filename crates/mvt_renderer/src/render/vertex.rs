//! Vertex format and the built-in quad meshes

/// Interleaved vertex as read by the mesh shader
///
/// Locations: 0 = position, 1 = color, 2 = texture coordinate.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Per-vertex color multiplied with the texture sample
    pub color: [f32; 3],
    /// Texture coordinate
    pub uv: [f32; 2],
}

unsafe impl bytemuck::Pod for Vertex {}
unsafe impl bytemuck::Zeroable for Vertex {}

impl Vertex {
    /// Create a vertex
    pub const fn new(position: [f32; 3], color: [f32; 3], uv: [f32; 2]) -> Self {
        Self { position, color, uv }
    }
}

/// A single unit quad in the XY plane
pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex::new([-0.5, -0.5, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0]),
    Vertex::new([0.5, -0.5, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
    Vertex::new([0.5, 0.5, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
    Vertex::new([-0.5, 0.5, 0.0], [1.0, 1.0, 1.0], [1.0, 1.0]),
];

/// Indices for [`QUAD_VERTICES`]
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

/// Two stacked quads, the second half a unit below the first
pub const TWO_QUAD_VERTICES: [Vertex; 8] = [
    Vertex::new([-0.5, -0.5, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0]),
    Vertex::new([0.5, -0.5, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
    Vertex::new([0.5, 0.5, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
    Vertex::new([-0.5, 0.5, 0.0], [1.0, 1.0, 1.0], [1.0, 1.0]),
    Vertex::new([-0.5, -0.5, -0.5], [1.0, 0.0, 0.0], [0.0, 0.0]),
    Vertex::new([0.5, -0.5, -0.5], [0.0, 1.0, 0.0], [1.0, 0.0]),
    Vertex::new([0.5, 0.5, -0.5], [0.0, 0.0, 1.0], [1.0, 1.0]),
    Vertex::new([-0.5, 0.5, -0.5], [1.0, 1.0, 1.0], [0.0, 1.0]),
];

/// Indices for [`TWO_QUAD_VERTICES`]
pub const TWO_QUAD_INDICES: [u32; 12] = [0, 1, 2, 2, 3, 0, 4, 5, 6, 6, 7, 4];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(std::mem::offset_of!(Vertex, color), 12);
        assert_eq!(std::mem::offset_of!(Vertex, uv), 24);
    }

    #[test]
    fn test_builtin_indices_in_range() {
        assert!(QUAD_INDICES.iter().all(|&i| (i as usize) < QUAD_VERTICES.len()));
        assert!(TWO_QUAD_INDICES.iter().all(|&i| (i as usize) < TWO_QUAD_VERTICES.len()));
    }

    #[test]
    fn test_vertex_bytes() {
        let bytes: &[u8] = bytemuck::cast_slice(&QUAD_VERTICES);
        assert_eq!(bytes.len(), 4 * 32);
    }
}
