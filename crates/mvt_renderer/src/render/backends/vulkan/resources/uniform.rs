//! Per-frame uniform buffers
//!
//! One persistently mapped buffer per frame slot. A slot's buffer is only
//! written after that slot's fence has been observed signaled.

use ash::vk;
use std::sync::Arc;

use crate::render::backends::vulkan::memory::{AllocatedBuffer, MemoryAllocator};
use crate::render::backends::vulkan::{VulkanError, VulkanResult};
use crate::render::UniformBufferObject;

/// Uniform block storage indexed by frame slot
pub struct FrameUniforms {
    buffers: Vec<AllocatedBuffer>,
}

impl FrameUniforms {
    /// Size of one uniform block
    pub const BLOCK_SIZE: vk::DeviceSize = std::mem::size_of::<UniformBufferObject>() as vk::DeviceSize;

    /// Create one mapped buffer for each of `frames` slots
    pub fn new(allocator: &Arc<MemoryAllocator>, frames: usize) -> VulkanResult<Self> {
        let buffers = (0..frames)
            .map(|_| allocator.create_mapped_buffer(Self::BLOCK_SIZE, vk::BufferUsageFlags::UNIFORM_BUFFER))
            .collect::<VulkanResult<Vec<_>>>()?;
        Ok(Self { buffers })
    }

    /// Write the block for `frame`
    pub fn update(&mut self, frame: usize, ubo: &UniformBufferObject) -> VulkanResult<()> {
        let count = self.buffers.len();
        self.buffers
            .get_mut(frame)
            .ok_or_else(|| VulkanError::InvalidArgument(format!("frame {} out of range for {} uniform buffers", frame, count)))?
            .write(ubo.as_bytes())
    }

    /// Buffer handle and range of each slot, in slot order
    pub fn descriptor_ranges(&self) -> Vec<(vk::Buffer, vk::DeviceSize)> {
        self.buffers
            .iter()
            .map(|buffer| (buffer.handle(), Self::BLOCK_SIZE))
            .collect()
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// True when there are no slots
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_size() {
        assert_eq!(FrameUniforms::BLOCK_SIZE, 192);
    }
}
