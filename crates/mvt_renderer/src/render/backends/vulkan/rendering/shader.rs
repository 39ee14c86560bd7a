//! Shader modules and the graphics pipeline
//!
//! The pipeline renders with dynamic rendering: attachment formats are given
//! at creation time and no render pass or framebuffer objects exist.

use ash::{vk, Device};
use std::ffi::CString;

use super::vertex_layout::VulkanVertexLayout;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};
use crate::shader::SpirvBinary;

/// Vulkan shader module with its SPIR-V entry point name
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
    entry_point: CString,
}

impl ShaderModule {
    /// Create a module from compiled SPIR-V
    pub fn from_spirv(device: &Device, binary: &SpirvBinary) -> VulkanResult<Self> {
        let words = binary.words();
        if words.first() != Some(&SpirvBinary::MAGIC) {
            log::error!("[SHADER] Rejecting module without the SPIR-V magic number");
            return Err(VulkanError::InvalidArgument("not a SPIR-V module".to_string()));
        }
        let entry_point = CString::new(binary.entry_point())
            .map_err(|_| VulkanError::InvalidArgument(format!("entry point '{}' contains a NUL byte", binary.entry_point())))?;

        log::debug!("[SHADER] Creating shader module from {} words", words.len());
        let create_info = vk::ShaderModuleCreateInfo::builder().code(words);
        let module = unsafe { device.create_shader_module(&create_info, None) }.map_err(|e| {
            log::error!("[SHADER] vkCreateShaderModule failed: {:?}", e);
            VulkanError::Api(e)
        })?;

        Ok(Self {
            device: device.clone(),
            module,
            entry_point,
        })
    }

    /// Get shader module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Stage info pointing at this module's entry point
    ///
    /// The returned struct borrows the entry point name from `self`.
    pub fn stage_info(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(&self.entry_point)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.destroy_shader_module(self.module, None) };
    }
}

/// Attachment formats and sampling the pipeline renders with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineTargets {
    /// Color attachment format (the swapchain format)
    pub color_format: vk::Format,
    /// Depth attachment format
    pub depth_format: vk::Format,
    /// Rasterization samples
    pub samples: vk::SampleCountFlags,
}

/// Graphics pipeline wrapper with RAII cleanup
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Build the mesh pipeline
    ///
    /// Triangle lists, no culling, counter-clockwise front faces, depth test
    /// LESS with writes, straight alpha blending, dynamic viewport and scissor.
    pub fn new(
        device: &Device,
        vertex_shader: &ShaderModule,
        fragment_shader: &ShaderModule,
        set_layout: vk::DescriptorSetLayout,
        targets: PipelineTargets,
    ) -> VulkanResult<Self> {
        let shader_stages = [
            vertex_shader.stage_info(vk::ShaderStageFlags::VERTEX),
            fragment_shader.stage_info(vk::ShaderStageFlags::FRAGMENT),
        ];

        let bindings = [VulkanVertexLayout::binding_description()];
        let attributes = VulkanVertexLayout::attribute_descriptions();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(targets.samples);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let set_layouts = [set_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }.map_err(VulkanError::Api)?;

        let color_formats = [targets.color_format];
        let mut rendering_info = vk::PipelineRenderingCreateInfo::builder()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(targets.depth_format);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .push_next(&mut rendering_info)
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(vk::RenderPass::null());

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
        };
        let pipeline = match pipelines {
            Ok(pipelines) => pipelines[0],
            Err((_, e)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                log::error!("[PIPELINE] vkCreateGraphicsPipelines failed: {:?}", e);
                return Err(VulkanError::Api(e));
            }
        };

        log::debug!(
            "[PIPELINE] Created pipeline for {:?} color / {:?} depth at {:?}",
            targets.color_format,
            targets.depth_format,
            targets.samples
        );

        Ok(Self {
            device: device.clone(),
            pipeline,
            layout,
        })
    }

    /// Get pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get layout handle
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        log::debug!("[PIPELINE] Dropping GraphicsPipeline {:?}", self.pipeline);
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}
