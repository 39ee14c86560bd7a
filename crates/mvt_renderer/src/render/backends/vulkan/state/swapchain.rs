//! Swapchain creation and the pure choices behind it

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use super::frame::{AcquireOutcome, PresentOutcome};
use crate::render::backends::vulkan::resources::ImageView;
use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Preferred format, falling back to the first reported one
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> VulkanResult<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
        .ok_or_else(|| VulkanError::InitializationFailed("surface reports no formats".to_string()))
}

/// MAILBOX when available, otherwise FIFO which is always supported
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Surface extent, or the framebuffer size clamped to the surface limits
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, framebuffer_size: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return vk::Extent2D {
            width: capabilities.current_extent.width.max(1),
            height: capabilities.current_extent.height.max(1),
        };
    }

    let (width, height) = framebuffer_size;
    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: width.clamp(min.width, max.width.max(min.width)).max(1),
        height: height.clamp(min.height, max.height.max(min.height)).max(1),
    }
}

/// At least three images, within the surface's bounds
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count.max(3);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// Presentable images with one view each
pub struct Swapchain {
    // Views go before the swapchain that owns their images
    views: Vec<ImageView>,
    images: Vec<vk::Image>,
    loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Create a swapchain for the context's surface
    ///
    /// `old` is handed to the driver for reuse and must still be alive.
    pub fn new(context: &VulkanContext, framebuffer_size: (u32, u32), old: vk::SwapchainKHR) -> VulkanResult<Self> {
        let surface = context.surface()?;
        let physical = context.physical_device.device;
        let surface_loader = &context.surface_loader;

        let (capabilities, formats, modes) = unsafe {
            (
                surface_loader
                    .get_physical_device_surface_capabilities(physical, surface)
                    .map_err(VulkanError::Api)?,
                surface_loader
                    .get_physical_device_surface_formats(physical, surface)
                    .map_err(VulkanError::Api)?,
                surface_loader
                    .get_physical_device_surface_present_modes(physical, surface)
                    .map_err(VulkanError::Api)?,
            )
        };

        let format = choose_surface_format(&formats)?;
        let present_mode = choose_present_mode(&modes);
        let extent = choose_extent(&capabilities, framebuffer_size);
        let image_count = choose_image_count(&capabilities);

        let families = context.device.queue_families;
        let family_indices = [families.graphics, families.present];
        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old);
        create_info = if families.graphics == families.present {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        };

        let device: &Device = context.raw_device();
        let loader = SwapchainLoader::new(context.instance(), device);
        let swapchain = unsafe { loader.create_swapchain(&create_info, None) }.map_err(VulkanError::Api)?;

        let images = match unsafe { loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { loader.destroy_swapchain(swapchain, None) };
                return Err(VulkanError::Api(e));
            }
        };

        let views = images
            .iter()
            .map(|&image| ImageView::new(device, image, format.format, vk::ImageAspectFlags::COLOR, 1))
            .collect::<VulkanResult<Vec<_>>>();
        let views = match views {
            Ok(views) => views,
            Err(e) => {
                unsafe { loader.destroy_swapchain(swapchain, None) };
                return Err(e);
            }
        };

        log::info!(
            "[SWAPCHAIN] {} images {}x{} {:?} {:?}",
            images.len(),
            extent.width,
            extent.height,
            format.format,
            present_mode
        );

        Ok(Self {
            views,
            images,
            loader,
            swapchain,
            format,
            extent,
            present_mode,
        })
    }

    /// Acquire the next image, signaling `semaphore` when it is ready
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> VulkanResult<AcquireOutcome> {
        match unsafe {
            self.loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
        } {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired { image_index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Queue `image_index` for presentation after `wait` is signaled
    pub fn present(&self, queue: vk::Queue, image_index: u32, wait: vk::Semaphore) -> VulkanResult<PresentOutcome> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.loader.queue_present(queue, &present_info) } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Image handles, owned by the swapchain
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// View of image `index`
    pub fn view(&self, index: usize) -> Option<vk::ImageView> {
        self.views.get(index).map(ImageView::handle)
    }

    /// Number of images
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Image extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Present mode
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.views.clear();
        unsafe { self.loader.destroy_swapchain(self.swapchain, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_preferred_surface_format() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats).unwrap(), formats[1]);
    }

    #[test]
    fn test_surface_format_falls_back_to_first() {
        let formats = [
            format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        assert_eq!(choose_surface_format(&formats).unwrap(), formats[0]);
        assert!(choose_surface_format(&[]).is_err());
    }

    #[test]
    fn test_present_mode_choice() {
        assert_eq!(choose_present_mode(&[vk::PresentModeKHR::FIFO]), vk::PresentModeKHR::FIFO);
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_extent_uses_current_when_fixed() {
        let mut caps = capabilities(2, 8);
        caps.current_extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        assert_eq!(
            choose_extent(&caps, (1600, 900)),
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn test_extent_clamps_framebuffer_size() {
        let caps = capabilities(2, 8);
        assert_eq!(
            choose_extent(&caps, (1600, 900)),
            vk::Extent2D {
                width: 1600,
                height: 900
            }
        );
        assert_eq!(
            choose_extent(&caps, (10_000, 0)),
            vk::Extent2D {
                width: 4096,
                height: 1
            }
        );
    }

    #[test]
    fn test_image_count_bounds() {
        assert_eq!(choose_image_count(&capabilities(2, 8)), 3);
        assert_eq!(choose_image_count(&capabilities(4, 8)), 4);
        assert_eq!(choose_image_count(&capabilities(2, 2)), 2);
        assert_eq!(choose_image_count(&capabilities(2, 0)), 3);
    }
}
