//! GPU meshes
//!
//! A mesh's vertex and index data either live in two separately staged
//! buffers, or share one allocation with the index buffer placed at an
//! aligned offset after the vertices.

use ash::{vk, Device};

use super::buffer::Buffer;
use super::factory::ResourceFactory;
use crate::render::backends::vulkan::VulkanResult;
use crate::render::Vertex;

/// Round `size` up to the next multiple of `alignment`
///
/// An `alignment` of zero leaves `size` unchanged.
pub fn pad_to_alignment(size: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    if alignment == 0 || size % alignment == 0 {
        size
    } else {
        (size / alignment + 1) * alignment
    }
}

/// Placement of a vertex and an index buffer inside one allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColocatedLayout {
    /// Alignment both buffers honor
    pub alignment: vk::DeviceSize,
    /// Byte offset of the index buffer
    pub index_offset: vk::DeviceSize,
    /// Allocation size
    pub total_size: vk::DeviceSize,
    /// Memory types acceptable to both buffers
    pub memory_type_bits: u32,
}

impl ColocatedLayout {
    /// Lay out the two buffers from their memory requirements
    pub fn compute(vertex: &vk::MemoryRequirements, index: &vk::MemoryRequirements) -> Self {
        let alignment = vertex.alignment.max(index.alignment);
        let index_offset = pad_to_alignment(vertex.size, alignment);
        Self {
            alignment,
            index_offset,
            total_size: index_offset + pad_to_alignment(index.size, alignment),
            memory_type_bits: vertex.memory_type_bits & index.memory_type_bits,
        }
    }
}

/// Vertex and index buffers sharing one device-local allocation
pub struct ColocatedBuffers {
    device: Device,
    vertex_buffer: vk::Buffer,
    index_buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    layout: ColocatedLayout,
}

impl ColocatedBuffers {
    /// Take ownership of handles already bound according to `layout`
    pub(crate) fn from_raw(
        device: &Device,
        vertex_buffer: vk::Buffer,
        index_buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        layout: ColocatedLayout,
    ) -> Self {
        Self {
            device: device.clone(),
            vertex_buffer,
            index_buffer,
            memory,
            layout,
        }
    }

    /// Vertex buffer, bound at offset 0
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer
    }

    /// Index buffer, bound at [`ColocatedLayout::index_offset`]
    pub fn index_buffer(&self) -> vk::Buffer {
        self.index_buffer
    }

    /// How the two buffers were placed
    pub fn layout(&self) -> ColocatedLayout {
        self.layout
    }
}

impl Drop for ColocatedBuffers {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.index_buffer, None);
            self.device.destroy_buffer(self.vertex_buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Where a mesh's buffers live
pub enum MeshStorage {
    /// Two buffers with their own allocations
    Separate {
        /// Vertex data
        vertices: Buffer,
        /// 32-bit indices
        indices: Buffer,
    },
    /// Both buffers in one allocation
    Colocated(ColocatedBuffers),
}

/// Mesh ready to draw
pub struct GpuMesh {
    storage: MeshStorage,
    index_count: u32,
    texture: Option<usize>,
}

impl GpuMesh {
    /// Upload vertices and indices; `texture` indexes the renderer's texture list
    pub fn upload(
        factory: &ResourceFactory,
        vertices: &[Vertex],
        indices: &[u32],
        colocate: bool,
        texture: Option<usize>,
    ) -> VulkanResult<Self> {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(indices);

        let storage = if colocate {
            MeshStorage::Colocated(factory.create_colocated_mesh(vertex_bytes, index_bytes)?)
        } else {
            MeshStorage::Separate {
                vertices: factory.upload_buffer(vertex_bytes, vk::BufferUsageFlags::VERTEX_BUFFER)?,
                indices: factory.upload_buffer(index_bytes, vk::BufferUsageFlags::INDEX_BUFFER)?,
            }
        };

        log::debug!(
            "[UPLOAD] Mesh with {} vertices / {} indices ({})",
            vertices.len(),
            indices.len(),
            if colocate { "co-located" } else { "separate" }
        );

        Ok(Self {
            storage,
            index_count: indices.len() as u32,
            texture,
        })
    }

    /// Vertex buffer handle
    pub fn vertex_buffer(&self) -> vk::Buffer {
        match &self.storage {
            MeshStorage::Separate { vertices, .. } => vertices.handle(),
            MeshStorage::Colocated(buffers) => buffers.vertex_buffer(),
        }
    }

    /// Index buffer handle
    pub fn index_buffer(&self) -> vk::Buffer {
        match &self.storage {
            MeshStorage::Separate { indices, .. } => indices.handle(),
            MeshStorage::Colocated(buffers) => buffers.index_buffer(),
        }
    }

    /// Number of indices to draw
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Texture index, if the mesh is textured
    pub fn texture(&self) -> Option<usize> {
        self.texture
    }

    /// Backing storage
    pub fn storage(&self) -> &MeshStorage {
        &self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirements(size: u64, alignment: u64, bits: u32) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size,
            alignment,
            memory_type_bits: bits,
        }
    }

    #[test]
    fn test_pad_to_alignment() {
        assert_eq!(pad_to_alignment(13, 4), 16);
        assert_eq!(pad_to_alignment(16, 4), 16);
        assert_eq!(pad_to_alignment(0, 4), 0);
        assert_eq!(pad_to_alignment(1, 256), 256);
        assert_eq!(pad_to_alignment(7, 0), 7);
    }

    #[test]
    fn test_index_offset_after_vertices() {
        let layout = ColocatedLayout::compute(&requirements(100, 16, 0b111), &requirements(36, 16, 0b110));
        assert_eq!(layout.alignment, 16);
        assert_eq!(layout.index_offset, 112);
        assert_eq!(layout.total_size, 112 + 48);
        assert_eq!(layout.memory_type_bits, 0b110);
    }

    #[test]
    fn test_larger_alignment_wins() {
        let layout = ColocatedLayout::compute(&requirements(100, 4, 1), &requirements(10, 64, 1));
        assert_eq!(layout.alignment, 64);
        assert_eq!(layout.index_offset, 128);
        assert_eq!(layout.total_size, 192);
        assert_eq!(layout.index_offset % layout.alignment, 0);
    }

    #[test]
    fn test_already_aligned_vertices() {
        let layout = ColocatedLayout::compute(&requirements(256, 256, 1), &requirements(256, 256, 1));
        assert_eq!(layout.index_offset, 256);
        assert_eq!(layout.total_size, 512);
    }
}
