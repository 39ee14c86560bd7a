//! Vertex input state for [`Vertex`]

use ash::vk;
use std::mem::{offset_of, size_of};

use crate::render::Vertex;

/// Vulkan vertex layout for the renderer's vertex type
pub struct VulkanVertexLayout;

impl VulkanVertexLayout {
    /// One interleaved binding advancing per vertex
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Position, color and uv at locations 0, 1 and 2
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, color) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Vertex, uv) as u32,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_stride() {
        let binding = VulkanVertexLayout::binding_description();
        assert_eq!(binding.stride, 32);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_attribute_offsets_and_formats() {
        let attributes = VulkanVertexLayout::attribute_descriptions();
        let summary: Vec<(u32, vk::Format, u32)> = attributes
            .iter()
            .map(|attr| (attr.location, attr.format, attr.offset))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, vk::Format::R32G32B32_SFLOAT, 0),
                (1, vk::Format::R32G32B32_SFLOAT, 12),
                (2, vk::Format::R32G32_SFLOAT, 24),
            ]
        );
    }
}
