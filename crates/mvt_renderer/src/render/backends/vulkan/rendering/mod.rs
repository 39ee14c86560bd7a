//! Command recording, shader modules and the graphics pipeline

pub mod commands;
pub mod shader;
pub mod vertex_layout;

pub use commands::{ActiveRendering, CommandPool, CommandRecorder};
pub use shader::{GraphicsPipeline, PipelineTargets, ShaderModule};
pub use vertex_layout::VulkanVertexLayout;
