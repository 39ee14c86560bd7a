//! Resource factory
//!
//! Creates buffers, images, views and samplers against one device and runs
//! one-time transfer work. Every one-time submission waits on the factory's
//! transfer fence and resets it before returning, so uploads are complete
//! when these calls return.

use ash::{vk, Device, Instance};

use super::buffer::{allocate_memory, create_unbound_buffer, Buffer};
use super::image::{Image, ImageDesc, ImageView, Sampler};
use super::layout::{image_barrier, subresource_range, transition_masks, TransitionMasks};
use super::mesh::{ColocatedBuffers, ColocatedLayout};
use crate::render::backends::vulkan::initialization::QueueFamilyIndices;
use crate::render::backends::vulkan::rendering::{CommandPool, CommandRecorder};
use crate::render::backends::vulkan::state::Fence;
use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};

const HOST_MEMORY: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// Depth formats tried in order of preference
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Creates GPU resources and performs blocking uploads
pub struct ResourceFactory {
    command_pool: CommandPool,
    transfer_fence: Fence,
    device: Device,
    instance: Instance,
    physical_device: vk::PhysicalDevice,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    max_anisotropy: Option<f32>,
    queue_families: QueueFamilyIndices,
    queue: vk::Queue,
}

impl ResourceFactory {
    /// Create a factory submitting on the context's graphics queue
    pub fn new(context: &VulkanContext) -> VulkanResult<Self> {
        let device = context.raw_device().clone();
        let command_pool = CommandPool::transient(&device, context.graphics_queue_family())?;
        let transfer_fence = Fence::new(&device, false)?;

        let physical = &context.physical_device;
        let max_anisotropy = (physical.features.sampler_anisotropy == vk::TRUE)
            .then_some(physical.properties.limits.max_sampler_anisotropy);

        Ok(Self {
            command_pool,
            transfer_fence,
            device,
            instance: context.instance().clone(),
            physical_device: physical.device,
            memory_properties: physical.memory_properties,
            max_anisotropy,
            queue_families: context.device.queue_families,
            queue: context.graphics_queue(),
        })
    }

    /// Device the factory creates resources on
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Queue families resources may be shared across
    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.queue_families
    }

    /// Create a buffer bound to fresh memory at offset 0
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
        families: &[u32],
    ) -> VulkanResult<Buffer> {
        Buffer::new(
            &self.device,
            &self.memory_properties,
            size,
            usage,
            properties,
            families,
            self.queue_families.graphics,
        )
    }

    /// Host-visible, coherent buffer filled with `bytes`
    pub fn create_staging_buffer(&self, bytes: &[u8]) -> VulkanResult<Buffer> {
        let staging = self.create_buffer(bytes.len() as vk::DeviceSize, vk::BufferUsageFlags::TRANSFER_SRC, HOST_MEMORY, &[])?;
        staging.write_bytes(bytes)?;
        Ok(staging)
    }

    /// Copy `bytes` into a new device-local buffer through a staging buffer
    pub fn upload_buffer(&self, bytes: &[u8], usage: vk::BufferUsageFlags) -> VulkanResult<Buffer> {
        let staging = self.create_staging_buffer(bytes)?;
        let size = staging.size();
        let destination = self.create_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_DST | usage,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            &[],
        )?;

        self.execute_one_time(|recorder| {
            recorder.copy_buffer(
                staging.handle(),
                destination.handle(),
                &[vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size,
                }],
            );
            Ok(())
        })?;

        log::debug!("[UPLOAD] {} bytes staged into device-local buffer", size);
        Ok(destination)
    }

    /// Copy the first `size` bytes of a device-local buffer back to the host
    ///
    /// `buffer` must have been created with `TRANSFER_SRC` usage.
    pub fn read_back_buffer(&self, buffer: &Buffer, size: vk::DeviceSize) -> VulkanResult<Vec<u8>> {
        if size > buffer.size() {
            return Err(VulkanError::InvalidArgument(format!(
                "read back of {} bytes from a {} byte buffer",
                size,
                buffer.size()
            )));
        }

        let staging = self.create_buffer(size, vk::BufferUsageFlags::TRANSFER_DST, HOST_MEMORY, &[])?;
        self.execute_one_time(|recorder| {
            recorder.copy_buffer(
                buffer.handle(),
                staging.handle(),
                &[vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size,
                }],
            );
            Ok(())
        })?;

        staging.read_bytes(size as usize)
    }

    /// Create an image with its own memory
    pub fn create_image(&self, desc: &ImageDesc) -> VulkanResult<Image> {
        Image::new(&self.device, &self.memory_properties, desc, self.queue_families.graphics)
    }

    /// Create a 2D view over the first `mip_levels` levels
    pub fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
        mip_levels: u32,
    ) -> VulkanResult<ImageView> {
        ImageView::new(&self.device, image, format, aspect, mip_levels)
    }

    /// Linear, repeating sampler with anisotropy at the device maximum when supported
    pub fn create_sampler(&self, mip_levels: u32) -> VulkanResult<Sampler> {
        Sampler::new(&self.device, mip_levels, self.max_anisotropy)
    }

    /// Transition every mip of a color image between two table-listed layouts
    pub fn transition_image_layout(
        &self,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        mip_levels: u32,
    ) -> VulkanResult<()> {
        let masks = transition_masks(old_layout, new_layout)?;
        let barrier = image_barrier(
            image,
            old_layout,
            new_layout,
            masks,
            subresource_range(vk::ImageAspectFlags::COLOR, 0, mip_levels),
        );

        self.execute_one_time(|recorder| {
            recorder.image_barriers(&[barrier]);
            Ok(())
        })
    }

    /// Copy tightly packed texels into mip 0; the image must be in TRANSFER_DST layout
    pub fn copy_buffer_to_image(&self, buffer: &Buffer, image: vk::Image, width: u32, height: u32) -> VulkanResult<()> {
        self.execute_one_time(|recorder| {
            recorder.copy_buffer_to_image(buffer.handle(), image, width, height);
            Ok(())
        })
    }

    /// Fill mips 1.. by successive linear blits and leave every level shader-readable
    ///
    /// All levels must be in TRANSFER_DST layout with mip 0 holding the data.
    pub fn generate_mipmaps(
        &self,
        image: vk::Image,
        format: vk::Format,
        width: u32,
        height: u32,
        mip_levels: u32,
    ) -> VulkanResult<()> {
        let properties = unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        };
        if !properties
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
        {
            return Err(VulkanError::UnsupportedFeature(format!(
                "texture image format {:?} does not support linear blitting",
                format
            )));
        }

        let to_transfer_src = TransitionMasks {
            src_access: vk::AccessFlags2::TRANSFER_WRITE,
            dst_access: vk::AccessFlags2::TRANSFER_READ,
            src_stage: vk::PipelineStageFlags2::TRANSFER,
            dst_stage: vk::PipelineStageFlags2::TRANSFER,
        };
        let to_shader_read = TransitionMasks {
            src_access: vk::AccessFlags2::TRANSFER_READ,
            dst_access: vk::AccessFlags2::SHADER_READ,
            src_stage: vk::PipelineStageFlags2::TRANSFER,
            dst_stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
        };
        let last_level = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;

        self.execute_one_time(|recorder| {
            let mut mip_width = width;
            let mut mip_height = height;

            for level in 1..mip_levels {
                let previous = subresource_range(vk::ImageAspectFlags::COLOR, level - 1, 1);
                recorder.image_barriers(&[image_barrier(
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    to_transfer_src,
                    previous,
                )]);

                let next_width = (mip_width / 2).max(1);
                let next_height = (mip_height / 2).max(1);
                recorder.blit_image(image, mip_blit(level, mip_width, mip_height, next_width, next_height), vk::Filter::LINEAR);

                recorder.image_barriers(&[image_barrier(
                    image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    to_shader_read,
                    previous,
                )]);

                mip_width = next_width;
                mip_height = next_height;
            }

            // The last level was only ever written, never blitted from
            recorder.image_barriers(&[image_barrier(
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                last_level,
                subresource_range(vk::ImageAspectFlags::COLOR, mip_levels.saturating_sub(1), 1),
            )]);
            Ok(())
        })?;

        log::debug!("[UPLOAD] Generated {} mip levels for {}x{} image", mip_levels, width, height);
        Ok(())
    }

    /// First candidate whose tiling features contain `features`
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> VulkanResult<vk::Format> {
        candidates
            .iter()
            .copied()
            .find(|&format| {
                let props = unsafe {
                    self.instance
                        .get_physical_device_format_properties(self.physical_device, format)
                };
                let supported = match tiling {
                    vk::ImageTiling::LINEAR => props.linear_tiling_features,
                    vk::ImageTiling::OPTIMAL => props.optimal_tiling_features,
                    _ => vk::FormatFeatureFlags::empty(),
                };
                supported.contains(features)
            })
            .ok_or_else(|| VulkanError::UnsupportedFeature("failed to find supported format!".to_string()))
    }

    /// Depth attachment format supported with optimal tiling
    pub fn find_depth_format(&self) -> VulkanResult<vk::Format> {
        self.find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    }

    /// Put vertex and index data into one device-local allocation
    pub fn create_colocated_mesh(&self, vertex_bytes: &[u8], index_bytes: &[u8]) -> VulkanResult<ColocatedBuffers> {
        if vertex_bytes.is_empty() || index_bytes.is_empty() {
            return Err(VulkanError::InvalidArgument("co-located mesh needs vertices and indices".to_string()));
        }

        let vertex_size = vertex_bytes.len() as vk::DeviceSize;
        let index_size = index_bytes.len() as vk::DeviceSize;
        let graphics = self.queue_families.graphics;

        let vertex_buffer = create_unbound_buffer(
            &self.device,
            vertex_size,
            vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::VERTEX_BUFFER,
            &[],
            graphics,
        )?;
        let index_buffer = match create_unbound_buffer(
            &self.device,
            index_size,
            vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::INDEX_BUFFER,
            &[],
            graphics,
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                unsafe { self.device.destroy_buffer(vertex_buffer, None) };
                return Err(e);
            }
        };

        let (vertex_req, index_req) = unsafe {
            (
                self.device.get_buffer_memory_requirements(vertex_buffer),
                self.device.get_buffer_memory_requirements(index_buffer),
            )
        };
        let layout = ColocatedLayout::compute(&vertex_req, &index_req);
        let combined = vk::MemoryRequirements {
            size: layout.total_size,
            alignment: layout.alignment,
            memory_type_bits: layout.memory_type_bits,
        };

        let bound = allocate_memory(&self.device, &self.memory_properties, combined, vk::MemoryPropertyFlags::DEVICE_LOCAL)
            .and_then(|memory| {
                let bind = unsafe {
                    self.device
                        .bind_buffer_memory(vertex_buffer, memory, 0)
                        .and_then(|()| self.device.bind_buffer_memory(index_buffer, memory, layout.index_offset))
                };
                match bind {
                    Ok(()) => Ok(memory),
                    Err(e) => {
                        unsafe { self.device.free_memory(memory, None) };
                        Err(VulkanError::Api(e))
                    }
                }
            });
        let memory = match bound {
            Ok(memory) => memory,
            Err(e) => {
                unsafe {
                    self.device.destroy_buffer(index_buffer, None);
                    self.device.destroy_buffer(vertex_buffer, None);
                }
                return Err(e);
            }
        };

        // Owned from here, so early returns below release everything
        let buffers = ColocatedBuffers::from_raw(&self.device, vertex_buffer, index_buffer, memory, layout);

        let mut staged = Vec::with_capacity((vertex_size + index_size) as usize);
        staged.extend_from_slice(vertex_bytes);
        staged.extend_from_slice(index_bytes);
        let staging = self.create_staging_buffer(&staged)?;

        self.execute_one_time(|recorder| {
            recorder.copy_buffer(
                staging.handle(),
                vertex_buffer,
                &[vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size: vertex_size,
                }],
            );
            recorder.copy_buffer(
                staging.handle(),
                index_buffer,
                &[vk::BufferCopy {
                    src_offset: vertex_size,
                    dst_offset: 0,
                    size: index_size,
                }],
            );
            Ok(())
        })?;

        log::debug!(
            "[UPLOAD] Co-located mesh: {} vertex bytes, index offset {}, {} bytes total",
            vertex_size,
            layout.index_offset,
            layout.total_size
        );
        Ok(buffers)
    }

    /// Record with `record`, submit, and block until the GPU is done
    pub fn execute_one_time<F>(&self, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&mut CommandRecorder) -> VulkanResult<()>,
    {
        let command_buffers = self.command_pool.allocate_command_buffers(1)?;
        let result = self.record_and_submit(command_buffers[0], record);
        self.command_pool.free_command_buffers(&command_buffers);
        result
    }

    fn record_and_submit<F>(&self, command_buffer: vk::CommandBuffer, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&mut CommandRecorder) -> VulkanResult<()>,
    {
        let mut recorder = CommandRecorder::new(command_buffer, &self.device);
        recorder.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        record(&mut recorder)?;
        let command_buffer = recorder.end()?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
        unsafe {
            self.device
                .queue_submit(self.queue, &[submit_info.build()], self.transfer_fence.handle())
        }
        .map_err(VulkanError::Api)?;

        self.transfer_fence.wait_forever()?;
        self.transfer_fence.reset()
    }
}

fn mip_blit(level: u32, src_width: u32, src_height: u32, dst_width: u32, dst_height: u32) -> vk::ImageBlit {
    let layers = |mip_level| vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level,
        base_array_layer: 0,
        layer_count: 1,
    };

    vk::ImageBlit {
        src_subresource: layers(level - 1),
        src_offsets: [
            vk::Offset3D::default(),
            vk::Offset3D {
                x: src_width as i32,
                y: src_height as i32,
                z: 1,
            },
        ],
        dst_subresource: layers(level),
        dst_offsets: [
            vk::Offset3D::default(),
            vk::Offset3D {
                x: dst_width as i32,
                y: dst_height as i32,
                z: 1,
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::VulkanRendererConfig;

    #[test]
    fn test_mip_blit_regions() {
        let blit = mip_blit(3, 64, 32, 32, 16);
        assert_eq!(blit.src_subresource.mip_level, 2);
        assert_eq!(blit.dst_subresource.mip_level, 3);
        assert_eq!(blit.src_offsets[1].x, 64);
        assert_eq!(blit.src_offsets[1].y, 32);
        assert_eq!(blit.dst_offsets[1].x, 32);
        assert_eq!(blit.dst_offsets[1].y, 16);
        assert_eq!(blit.dst_offsets[1].z, 1);
    }

    #[test]
    fn test_host_memory_flags() {
        assert!(HOST_MEMORY.contains(vk::MemoryPropertyFlags::HOST_VISIBLE));
        assert!(HOST_MEMORY.contains(vk::MemoryPropertyFlags::HOST_COHERENT));
        assert!(!HOST_MEMORY.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL));
    }

    #[test]
    #[ignore = "requires a Vulkan 1.3 capable GPU"]
    fn test_staged_upload_round_trip() {
        let config = VulkanRendererConfig::default().with_validation(false);
        let context = VulkanContext::new_headless(&config).unwrap();
        let factory = ResourceFactory::new(&context).unwrap();

        let bytes: Vec<u8> = (0..4099_u32).map(|i| (i * 31 % 251) as u8).collect();
        let buffer = factory
            .upload_buffer(&bytes, vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::VERTEX_BUFFER)
            .unwrap();
        let read = factory.read_back_buffer(&buffer, bytes.len() as vk::DeviceSize).unwrap();
        assert_eq!(read, bytes);

        drop(buffer);
        drop(factory);
    }

    #[test]
    #[ignore = "requires a Vulkan 1.3 capable GPU"]
    fn test_depth_format_is_a_candidate() {
        let config = VulkanRendererConfig::default().with_validation(false);
        let context = VulkanContext::new_headless(&config).unwrap();
        let factory = ResourceFactory::new(&context).unwrap();
        let format = factory.find_depth_format().unwrap();
        assert!(DEPTH_FORMAT_CANDIDATES.contains(&format));
    }
}
