//! Swapchain plus the depth and multisampled color targets sized to it
//!
//! One set of attachments exists per swapchain image. Rebuilding waits for
//! the device to go idle and replaces everything in one call, or nothing
//! when a step fails.

use ash::vk;

use super::swapchain::Swapchain;
use crate::render::backends::vulkan::resources::{Image, ImageDesc, ImageView, ResourceFactory};
use crate::render::backends::vulkan::{VulkanContext, VulkanResult};

/// Render targets drawn into before resolving to one swapchain image
pub struct FrameAttachments {
    /// Multisampled color target, absent when rendering single-sampled
    pub color: Option<(ImageView, Image)>,
    /// Depth target
    pub depth: (ImageView, Image),
}

impl FrameAttachments {
    fn new(
        factory: &ResourceFactory,
        extent: vk::Extent2D,
        color_format: vk::Format,
        depth_format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> VulkanResult<Self> {
        let color = if samples != vk::SampleCountFlags::TYPE_1 {
            let desc = ImageDesc::new(
                extent.width,
                extent.height,
                color_format,
                vk::ImageUsageFlags::TRANSIENT_ATTACHMENT | vk::ImageUsageFlags::COLOR_ATTACHMENT,
            )
            .with_samples(samples);
            let image = factory.create_image(&desc)?;
            let view = factory.create_image_view(image.handle(), color_format, vk::ImageAspectFlags::COLOR, 1)?;
            Some((view, image))
        } else {
            None
        };

        let desc = ImageDesc::new(
            extent.width,
            extent.height,
            depth_format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        )
        .with_samples(samples);
        let image = factory.create_image(&desc)?;
        let view = factory.create_image_view(image.handle(), depth_format, vk::ImageAspectFlags::DEPTH, 1)?;

        Ok(Self {
            color,
            depth: (view, image),
        })
    }

    /// Multisampled color image and view
    pub fn color_target(&self) -> Option<(vk::Image, vk::ImageView)> {
        self.color.as_ref().map(|(view, image)| (image.handle(), view.handle()))
    }

    /// Depth image and view
    pub fn depth_target(&self) -> (vk::Image, vk::ImageView) {
        (self.depth.1.handle(), self.depth.0.handle())
    }
}

/// Build a replacement swapchain and its attachments, then swap both in
///
/// Nothing is replaced unless both builds succeed. The old swapchain stays
/// alive until its replacement exists.
fn replace_together<S, A, E>(
    swapchain: &mut S,
    attachments: &mut Vec<A>,
    build_swapchain: impl FnOnce(&S) -> Result<S, E>,
    build_attachments: impl FnOnce(&S) -> Result<Vec<A>, E>,
) -> Result<(), E> {
    let next = build_swapchain(swapchain)?;
    let next_attachments = build_attachments(&next)?;
    *attachments = next_attachments;
    *swapchain = next;
    Ok(())
}

/// Owns the swapchain and its per-image attachments
pub struct SwapchainManager {
    attachments: Vec<FrameAttachments>,
    swapchain: Swapchain,
    depth_format: vk::Format,
    samples: vk::SampleCountFlags,
}

impl SwapchainManager {
    /// Build the swapchain and one attachment set per image
    pub fn new(
        context: &VulkanContext,
        factory: &ResourceFactory,
        depth_format: vk::Format,
        samples: vk::SampleCountFlags,
        framebuffer_size: (u32, u32),
    ) -> VulkanResult<Self> {
        let swapchain = Swapchain::new(context, framebuffer_size, vk::SwapchainKHR::null())?;
        let attachments = Self::create_attachments(factory, &swapchain, depth_format, samples)?;

        Ok(Self {
            attachments,
            swapchain,
            depth_format,
            samples,
        })
    }

    fn create_attachments(
        factory: &ResourceFactory,
        swapchain: &Swapchain,
        depth_format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> VulkanResult<Vec<FrameAttachments>> {
        let attachments = (0..swapchain.image_count())
            .map(|_| {
                FrameAttachments::new(
                    factory,
                    swapchain.extent(),
                    swapchain.format().format,
                    depth_format,
                    samples,
                )
            })
            .collect::<VulkanResult<Vec<_>>>()?;
        log::debug!("[SWAPCHAIN] Created {} attachment sets", attachments.len());
        Ok(attachments)
    }

    /// Replace the swapchain and attachments for a new framebuffer size
    pub fn recreate(
        &mut self,
        context: &VulkanContext,
        factory: &ResourceFactory,
        framebuffer_size: (u32, u32),
    ) -> VulkanResult<()> {
        context.wait_idle()?;

        let (depth_format, samples) = (self.depth_format, self.samples);
        replace_together(
            &mut self.swapchain,
            &mut self.attachments,
            |old| Swapchain::new(context, framebuffer_size, old.handle()),
            |swapchain| Self::create_attachments(factory, swapchain, depth_format, samples),
        )?;

        log::info!(
            "[SWAPCHAIN] Recreated at {}x{}",
            self.swapchain.extent().width,
            self.swapchain.extent().height
        );
        Ok(())
    }

    /// Current swapchain
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Attachments for swapchain image `index`
    pub fn attachments(&self, index: usize) -> Option<&FrameAttachments> {
        self.attachments.get(index)
    }

    /// Number of attachment sets, always the image count
    pub fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    /// Depth format in use
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    /// Sample count of the attachments
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct FakeChain {
        generation: u32,
        images: usize,
    }

    fn chain(generation: u32, images: usize) -> FakeChain {
        FakeChain { generation, images }
    }

    #[test]
    fn test_replace_together_swaps_both() {
        let mut current = chain(1, 2);
        let mut attachments = vec![1, 1];

        let result: Result<(), &str> = replace_together(
            &mut current,
            &mut attachments,
            |old| Ok(chain(old.generation + 1, 3)),
            |next| Ok(vec![next.generation; next.images]),
        );

        assert!(result.is_ok());
        assert_eq!(current, chain(2, 3));
        assert_eq!(attachments, vec![2, 2, 2]);
    }

    #[test]
    fn test_failed_swapchain_keeps_everything() {
        let mut current = chain(1, 2);
        let mut attachments = vec![1, 1];

        let result = replace_together(
            &mut current,
            &mut attachments,
            |_| Err("surface lost"),
            |next: &FakeChain| Ok(vec![next.generation; next.images]),
        );

        assert_eq!(result, Err("surface lost"));
        assert_eq!(current, chain(1, 2));
        assert_eq!(attachments, vec![1, 1]);
    }

    #[test]
    fn test_failed_attachments_keep_old_swapchain() {
        let mut current = chain(1, 2);
        let mut attachments = vec![1, 1];

        let result = replace_together(
            &mut current,
            &mut attachments,
            |old| Ok(chain(old.generation + 1, 3)),
            |_| Err::<Vec<u32>, _>("out of device memory"),
        );

        assert_eq!(result, Err("out of device memory"));
        assert_eq!(current, chain(1, 2));
        assert_eq!(attachments, vec![1, 1]);
    }
}
