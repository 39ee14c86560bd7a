//! Sampled 2D textures with a full mip chain

use ash::vk;

use super::factory::ResourceFactory;
use super::image::{mip_level_count, Image, ImageDesc, ImageView, Sampler};
use crate::assets::ImageData;
use crate::render::backends::vulkan::VulkanResult;

/// Texture image with its view and sampler
pub struct Texture {
    sampler: Sampler,
    view: ImageView,
    image: Image,
}

impl Texture {
    /// Texel format every texture is uploaded as
    pub const FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

    /// Upload RGBA8 pixels and build every mip level
    pub fn from_image_data(factory: &ResourceFactory, data: &ImageData) -> VulkanResult<Self> {
        let mip_levels = mip_level_count(data.width, data.height);
        let staging = factory.create_staging_buffer(&data.data)?;

        let desc = ImageDesc::new(
            data.width,
            data.height,
            Self::FORMAT,
            vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        )
        .with_mip_levels(mip_levels);
        let image = factory.create_image(&desc)?;

        factory.transition_image_layout(
            image.handle(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            mip_levels,
        )?;
        factory.copy_buffer_to_image(&staging, image.handle(), data.width, data.height)?;
        drop(staging);
        // Leaves every level in SHADER_READ_ONLY_OPTIMAL
        factory.generate_mipmaps(image.handle(), Self::FORMAT, data.width, data.height, mip_levels)?;

        let view = factory.create_image_view(image.handle(), Self::FORMAT, vk::ImageAspectFlags::COLOR, mip_levels)?;
        let sampler = factory.create_sampler(mip_levels)?;

        log::info!(
            "[UPLOAD] Texture {}x{} uploaded with {} mip levels",
            data.width,
            data.height,
            mip_levels
        );

        Ok(Self { sampler, view, image })
    }

    /// 1x1 opaque white texture for untextured meshes
    pub fn white(factory: &ResourceFactory) -> VulkanResult<Self> {
        Self::from_image_data(factory, &ImageData::solid_color(1, 1, [255, 255, 255, 255]))
    }

    /// Image view handle
    pub fn view(&self) -> vk::ImageView {
        self.view.handle()
    }

    /// Sampler handle
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.handle()
    }

    /// Size of mip level 0
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }

    /// Mip level count
    pub fn mip_levels(&self) -> u32 {
        self.image.mip_levels()
    }
}
