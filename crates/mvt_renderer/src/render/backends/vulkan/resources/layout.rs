//! Image layout transitions
//!
//! Upload transitions come from a fixed table; anything outside it is
//! rejected. Frame recording builds its attachment barriers with
//! [`image_barrier`] directly.

use ash::vk;

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Access and stage masks for one layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    /// Accesses that must complete before the transition
    pub src_access: vk::AccessFlags2,
    /// Accesses that wait on the transition
    pub dst_access: vk::AccessFlags2,
    /// Stages that must complete before the transition
    pub src_stage: vk::PipelineStageFlags2,
    /// Stages that wait on the transition
    pub dst_stage: vk::PipelineStageFlags2,
}

/// Masks for the supported upload transitions
pub fn transition_masks(old: vk::ImageLayout, new: vk::ImageLayout) -> VulkanResult<TransitionMasks> {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags2::NONE,
            dst_access: vk::AccessFlags2::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags2::TRANSFER,
        }),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags2::TRANSFER_WRITE,
            dst_access: vk::AccessFlags2::SHADER_READ,
            src_stage: vk::PipelineStageFlags2::TRANSFER,
            dst_stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
        }),
        _ => Err(VulkanError::InvalidArgument(format!(
            "unsupported layout transition {:?} -> {:?}",
            old, new
        ))),
    }
}

/// Subresource range covering `level_count` mips starting at `base_mip_level`
pub fn subresource_range(
    aspect: vk::ImageAspectFlags,
    base_mip_level: u32,
    level_count: u32,
) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level,
        level_count,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Synchronization2 image barrier for a single queue family
pub fn image_barrier(
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    masks: TransitionMasks,
    range: vk::ImageSubresourceRange,
) -> vk::ImageMemoryBarrier2 {
    vk::ImageMemoryBarrier2::builder()
        .src_stage_mask(masks.src_stage)
        .src_access_mask(masks.src_access)
        .dst_stage_mask(masks.dst_stage)
        .dst_access_mask(masks.dst_access)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUTS: [vk::ImageLayout; 7] = [
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::GENERAL,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        vk::ImageLayout::PRESENT_SRC_KHR,
    ];

    #[test]
    fn test_undefined_to_transfer_dst() {
        let masks = transition_masks(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(masks.src_access, vk::AccessFlags2::NONE);
        assert_eq!(masks.dst_access, vk::AccessFlags2::TRANSFER_WRITE);
        assert_eq!(masks.src_stage, vk::PipelineStageFlags2::TOP_OF_PIPE);
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags2::TRANSFER);
    }

    #[test]
    fn test_transfer_dst_to_shader_read() {
        let masks =
            transition_masks(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL).unwrap();
        assert_eq!(masks.src_access, vk::AccessFlags2::TRANSFER_WRITE);
        assert_eq!(masks.dst_access, vk::AccessFlags2::SHADER_READ);
        assert_eq!(masks.src_stage, vk::PipelineStageFlags2::TRANSFER);
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);
    }

    #[test]
    fn test_only_two_pairs_are_supported() {
        let mut supported = 0;
        for old in LAYOUTS {
            for new in LAYOUTS {
                let first = transition_masks(old, new);
                let second = transition_masks(old, new);
                match (first, second) {
                    (Ok(a), Ok(b)) => {
                        assert_eq!(a, b);
                        supported += 1;
                    }
                    (Err(VulkanError::InvalidArgument(_)), Err(VulkanError::InvalidArgument(_))) => {}
                    other => panic!("inconsistent result for {:?} -> {:?}: {:?}", old, new, other),
                }
            }
        }
        assert_eq!(supported, 2);
    }

    #[test]
    fn test_barrier_carries_range_and_layouts() {
        let masks = transition_masks(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL).unwrap();
        let range = subresource_range(vk::ImageAspectFlags::COLOR, 2, 3);
        let barrier = image_barrier(
            vk::Image::null(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            masks,
            range,
        );
        assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(barrier.subresource_range.base_mip_level, 2);
        assert_eq!(barrier.subresource_range.level_count, 3);
        assert_eq!(barrier.dst_stage_mask, vk::PipelineStageFlags2::TRANSFER);
    }
}
