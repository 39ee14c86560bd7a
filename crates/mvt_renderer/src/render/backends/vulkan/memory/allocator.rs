//! Allocator adapter over `vk_mem`
//!
//! One allocator per device, shared through `Arc`. Buffers created here keep
//! a clone of that `Arc`, so the allocator always outlives them.

use ash::vk;
use std::sync::Arc;
use vk_mem::{Alloc, AllocationCreateFlags, AllocationCreateInfo, MemoryUsage};

use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Shared pooled allocator
pub struct MemoryAllocator {
    allocator: vk_mem::Allocator,
}

impl MemoryAllocator {
    /// Create the allocator for a context's device, targeting Vulkan 1.3
    pub fn new(context: &VulkanContext) -> VulkanResult<Arc<Self>> {
        let create_info = vk_mem::AllocatorCreateInfo::new(
            context.instance(),
            context.raw_device(),
            context.physical_device.device,
        )
        .vulkan_api_version(vk::API_VERSION_1_3);

        #[allow(unused_unsafe)]
        let allocator = unsafe { vk_mem::Allocator::new(create_info) }.map_err(VulkanError::Allocation)?;
        log::info!("Vulkan Memory Allocator initialized");

        Ok(Arc::new(Self { allocator }))
    }

    /// Create and bind a buffer in one call
    pub fn create_buffer(
        self: &Arc<Self>,
        buffer_info: &vk::BufferCreateInfo,
        allocation_info: &AllocationCreateInfo,
    ) -> VulkanResult<AllocatedBuffer> {
        let (buffer, allocation) = unsafe { self.allocator.create_buffer(buffer_info, allocation_info) }
            .map_err(VulkanError::Allocation)?;

        Ok(AllocatedBuffer {
            buffer,
            allocation,
            size: buffer_info.size,
            mapped: None,
            allocator: Arc::clone(self),
        })
    }

    /// Host-visible, coherent buffer kept mapped for its whole life
    ///
    /// Used for per-frame uniforms written every frame from the CPU.
    pub fn create_mapped_buffer(self: &Arc<Self>, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> VulkanResult<AllocatedBuffer> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let allocation_info = AllocationCreateInfo {
            usage: MemoryUsage::Auto,
            flags: AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
            required_flags: vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            ..Default::default()
        };

        let mut buffer = self.create_buffer(&buffer_info, &allocation_info)?;
        buffer.map()?;
        Ok(buffer)
    }
}

/// Buffer whose memory came from [`MemoryAllocator`]
pub struct AllocatedBuffer {
    buffer: vk::Buffer,
    allocation: vk_mem::Allocation,
    size: vk::DeviceSize,
    mapped: Option<*mut u8>,
    allocator: Arc<MemoryAllocator>,
}

impl AllocatedBuffer {
    /// Raw buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Buffer size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Whether the buffer is currently mapped
    pub fn is_mapped(&self) -> bool {
        self.mapped.is_some()
    }

    /// Map the allocation; mapping twice returns the same pointer
    pub fn map(&mut self) -> VulkanResult<*mut u8> {
        if let Some(ptr) = self.mapped {
            return Ok(ptr);
        }
        let ptr = unsafe { self.allocator.allocator.map_memory(&mut self.allocation) }.map_err(VulkanError::Allocation)?;
        self.mapped = Some(ptr);
        Ok(ptr)
    }

    /// Unmap if mapped
    pub fn unmap(&mut self) {
        if self.mapped.take().is_some() {
            unsafe { self.allocator.allocator.unmap_memory(&mut self.allocation) };
        }
    }

    /// Copy `bytes` to the start of the buffer, mapping temporarily if needed
    pub fn write(&mut self, bytes: &[u8]) -> VulkanResult<()> {
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::InvalidArgument(format!(
                "write of {} bytes into a {} byte buffer",
                bytes.len(),
                self.size
            )));
        }

        let was_mapped = self.is_mapped();
        let ptr = self.map()?;
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len()) };
        if !was_mapped {
            self.unmap();
        }
        Ok(())
    }
}

impl Drop for AllocatedBuffer {
    fn drop(&mut self) {
        self.unmap();
        unsafe { self.allocator.allocator.destroy_buffer(self.buffer, &mut self.allocation) };
    }
}
