//! Images, views and samplers with dedicated memory

use ash::{vk, Device};

use super::buffer::{allocate_memory, sharing_mode_for};
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Number of mip levels for a full chain down to 1x1
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    u32::BITS - largest.leading_zeros()
}

/// Everything needed to create a 2D image
#[derive(Debug, Clone)]
pub struct ImageDesc {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Mip level count
    pub mip_levels: u32,
    /// Samples per pixel
    pub samples: vk::SampleCountFlags,
    /// Texel format
    pub format: vk::Format,
    /// Tiling mode
    pub tiling: vk::ImageTiling,
    /// Usage flags
    pub usage: vk::ImageUsageFlags,
    /// Required memory properties
    pub memory_properties: vk::MemoryPropertyFlags,
    /// Queue families that access the image
    pub families: Vec<u32>,
}

impl ImageDesc {
    /// Single-sampled, optimally tiled, device-local image with one mip
    pub fn new(width: u32, height: u32, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            width,
            height,
            mip_levels: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            format,
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
            memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            families: Vec::new(),
        }
    }

    /// Set the mip level count
    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    /// Set the sample count
    pub fn with_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    /// Set the queue families sharing the image
    pub fn with_families(mut self, families: &[u32]) -> Self {
        self.families = families.to_vec();
        self
    }
}

/// Image handle bound to its own memory at offset 0
pub struct Image {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    format: vk::Format,
    extent: vk::Extent2D,
    mip_levels: u32,
}

impl Image {
    /// Create the image and bind fresh memory to it
    pub fn new(
        device: &Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        desc: &ImageDesc,
        default_family: u32,
    ) -> VulkanResult<Self> {
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 {
            return Err(VulkanError::InvalidArgument(format!(
                "image {}x{} with {} mip levels",
                desc.width, desc.height, desc.mip_levels
            )));
        }

        let (sharing_mode, family_indices) = sharing_mode_for(&desc.families, default_family);
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(1)
            .format(desc.format)
            .tiling(desc.tiling)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .samples(desc.samples)
            .sharing_mode(sharing_mode)
            .queue_family_indices(&family_indices);

        let image = unsafe { device.create_image(&image_info, None) }.map_err(VulkanError::Api)?;
        let requirements = unsafe { device.get_image_memory_requirements(image) };

        let memory = match allocate_memory(device, memory_properties, requirements, desc.memory_properties) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { device.bind_image_memory(image, memory, 0) } {
            unsafe {
                device.destroy_image(image, None);
                device.free_memory(memory, None);
            }
            return Err(VulkanError::Api(e));
        }

        Ok(Self {
            device: device.clone(),
            image,
            memory,
            format: desc.format,
            extent: vk::Extent2D {
                width: desc.width,
                height: desc.height,
            },
            mip_levels: desc.mip_levels,
        })
    }

    /// Get image handle
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Texel format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Size of mip level 0
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Mip level count
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Owned image view
pub struct ImageView {
    device: Device,
    view: vk::ImageView,
}

impl ImageView {
    /// 2D view over `mip_levels` levels of `image`
    pub fn new(
        device: &Device,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
        mip_levels: u32,
    ) -> VulkanResult<Self> {
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe { device.create_image_view(&view_info, None) }.map_err(VulkanError::Api)?;
        Ok(Self {
            device: device.clone(),
            view,
        })
    }

    /// Get view handle
    pub fn handle(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe { self.device.destroy_image_view(self.view, None) };
    }
}

/// Owned sampler
pub struct Sampler {
    device: Device,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Linear filtering, repeat addressing, LOD clamped to `mip_levels`
    ///
    /// `max_anisotropy` of `None` disables anisotropic filtering.
    pub fn new(device: &Device, mip_levels: u32, max_anisotropy: Option<f32>) -> VulkanResult<Self> {
        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .mip_lod_bias(0.0)
            .anisotropy_enable(max_anisotropy.is_some())
            .max_anisotropy(max_anisotropy.unwrap_or(1.0))
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .min_lod(0.0)
            .max_lod(mip_levels as f32)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false);

        let sampler = unsafe { device.create_sampler(&sampler_info, None) }.map_err(VulkanError::Api)?;
        Ok(Self {
            device: device.clone(),
            sampler,
        })
    }

    /// Get sampler handle
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe { self.device.destroy_sampler(self.sampler, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_level_count() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 1), 2);
        assert_eq!(mip_level_count(1024, 1024), 11);
        assert_eq!(mip_level_count(1024, 512), 11);
        assert_eq!(mip_level_count(1000, 10), 10);
        assert_eq!(mip_level_count(4096, 4096), 13);
    }

    #[test]
    fn test_mip_level_count_degenerate() {
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn test_image_desc_builders() {
        let desc = ImageDesc::new(64, 32, vk::Format::R8G8B8A8_SRGB, vk::ImageUsageFlags::SAMPLED)
            .with_mip_levels(7)
            .with_samples(vk::SampleCountFlags::TYPE_4)
            .with_families(&[0, 1]);
        assert_eq!(desc.mip_levels, 7);
        assert_eq!(desc.samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(desc.families, vec![0, 1]);
        assert_eq!(desc.tiling, vk::ImageTiling::OPTIMAL);
        assert_eq!(desc.memory_properties, vk::MemoryPropertyFlags::DEVICE_LOCAL);
    }
}
