//! Command pools and command buffer recording
//!
//! [`ActiveRendering`] ends the dynamic rendering scope when dropped, so a
//! recorder cannot be ended with rendering still open.

use ash::{vk, Device};

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool whose buffers can be reset individually
    pub fn new(device: &Device, queue_family_index: u32) -> VulkanResult<Self> {
        Self::with_flags(device, queue_family_index, vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
    }

    /// Create a pool for short-lived one-time buffers
    pub fn transient(device: &Device, queue_family_index: u32) -> VulkanResult<Self> {
        Self::with_flags(
            device,
            queue_family_index,
            vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )
    }

    fn with_flags(device: &Device, queue_family_index: u32, flags: vk::CommandPoolCreateFlags) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(flags)
            .queue_family_index(queue_family_index);

        let command_pool =
            unsafe { device.create_command_pool(&pool_create_info, None) }.map_err(VulkanError::Api)?;

        Ok(Self {
            device: device.clone(),
            command_pool,
        })
    }

    /// Allocate primary command buffers
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.device.allocate_command_buffers(&alloc_info) }.map_err(VulkanError::Api)
    }

    /// Return command buffers to the pool
    pub fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.free_command_buffers(self.command_pool, command_buffers) };
    }

    /// Get the command pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            // Frees every buffer allocated from the pool
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Command buffer recorder
pub struct CommandRecorder {
    command_buffer: vk::CommandBuffer,
    device: Device,
    recording: bool,
}

impl CommandRecorder {
    /// Wrap a command buffer; nothing is recorded until [`Self::begin`]
    pub fn new(command_buffer: vk::CommandBuffer, device: &Device) -> Self {
        Self {
            command_buffer,
            device: device.clone(),
            recording: false,
        }
    }

    /// Begin recording
    pub fn begin(&mut self, flags: vk::CommandBufferUsageFlags) -> VulkanResult<&mut Self> {
        if self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer already recording".to_string(),
            });
        }

        let begin_info = vk::CommandBufferBeginInfo::builder().flags(flags);
        unsafe { self.device.begin_command_buffer(self.command_buffer, &begin_info) }.map_err(VulkanError::Api)?;

        self.recording = true;
        Ok(self)
    }

    /// Begin dynamic rendering
    pub fn begin_rendering(&mut self, rendering_info: &vk::RenderingInfo) -> VulkanResult<ActiveRendering<'_>> {
        self.ensure_recording()?;
        unsafe { self.device.cmd_begin_rendering(self.command_buffer, rendering_info) };
        Ok(ActiveRendering { recorder: self })
    }

    /// Record image barriers in one synchronization2 dependency
    pub fn image_barriers(&mut self, barriers: &[vk::ImageMemoryBarrier2]) {
        let dependency_info = vk::DependencyInfo::builder().image_memory_barriers(barriers);
        unsafe { self.device.cmd_pipeline_barrier2(self.command_buffer, &dependency_info) };
    }

    /// Copy whole regions between buffers
    pub fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe { self.device.cmd_copy_buffer(self.command_buffer, src, dst, regions) };
    }

    /// Copy tightly packed texels into mip 0 of an image in TRANSFER_DST layout
    pub fn copy_buffer_to_image(&mut self, src: vk::Buffer, image: vk::Image, width: u32, height: u32) {
        let region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D::default())
            .image_extent(vk::Extent3D { width, height, depth: 1 })
            .build();

        unsafe {
            self.device.cmd_copy_buffer_to_image(
                self.command_buffer,
                src,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
    }

    /// Blit within one image from a TRANSFER_SRC level to a TRANSFER_DST level
    pub fn blit_image(&mut self, image: vk::Image, region: vk::ImageBlit, filter: vk::Filter) {
        unsafe {
            self.device.cmd_blit_image(
                self.command_buffer,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
                filter,
            );
        }
    }

    /// End recording and hand back the buffer
    pub fn end(mut self) -> VulkanResult<vk::CommandBuffer> {
        self.ensure_recording()?;
        unsafe { self.device.end_command_buffer(self.command_buffer) }.map_err(VulkanError::Api)?;
        self.recording = false;
        Ok(self.command_buffer)
    }

    fn ensure_recording(&self) -> VulkanResult<()> {
        if self.recording {
            Ok(())
        } else {
            Err(VulkanError::InvalidOperation {
                reason: "Command buffer not recording".to_string(),
            })
        }
    }
}

/// Open dynamic rendering scope
pub struct ActiveRendering<'a> {
    recorder: &'a mut CommandRecorder,
}

impl ActiveRendering<'_> {
    /// Set viewport
    pub fn set_viewport(&mut self, viewport: vk::Viewport) {
        unsafe {
            self.recorder
                .device
                .cmd_set_viewport(self.recorder.command_buffer, 0, &[viewport]);
        }
    }

    /// Set scissor
    pub fn set_scissor(&mut self, scissor: vk::Rect2D) {
        unsafe {
            self.recorder
                .device
                .cmd_set_scissor(self.recorder.command_buffer, 0, &[scissor]);
        }
    }

    /// Bind graphics pipeline
    pub fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.recorder.device.cmd_bind_pipeline(
                self.recorder.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
    }

    /// Bind one vertex buffer at binding 0
    pub fn bind_vertex_buffer(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize) {
        unsafe {
            self.recorder
                .device
                .cmd_bind_vertex_buffers(self.recorder.command_buffer, 0, &[buffer], &[offset]);
        }
    }

    /// Bind a 32-bit index buffer
    pub fn bind_index_buffer(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize) {
        unsafe {
            self.recorder.device.cmd_bind_index_buffer(
                self.recorder.command_buffer,
                buffer,
                offset,
                vk::IndexType::UINT32,
            );
        }
    }

    /// Bind a descriptor set at set 0
    pub fn bind_descriptor_set(&mut self, layout: vk::PipelineLayout, set: vk::DescriptorSet) {
        unsafe {
            self.recorder.device.cmd_bind_descriptor_sets(
                self.recorder.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                &[],
            );
        }
    }

    /// Draw indexed, single instance
    pub fn draw_indexed(&mut self, index_count: u32) {
        unsafe {
            self.recorder
                .device
                .cmd_draw_indexed(self.recorder.command_buffer, index_count, 1, 0, 0, 0);
        }
    }
}

impl Drop for ActiveRendering<'_> {
    fn drop(&mut self) {
        unsafe { self.recorder.device.cmd_end_rendering(self.recorder.command_buffer) };
    }
}
