//! Vulkan 1.3 backend
//!
//! Dynamic rendering and synchronization2 throughout; no render pass or
//! framebuffer objects exist.
//!
//! - [`initialization`]: instance, physical device scoring, logical device
//! - [`memory`]: pooled allocations through `vk-mem`
//! - [`resources`]: buffers, images, textures, meshes, descriptors
//! - [`rendering`]: command recording and the graphics pipeline
//! - [`state`]: swapchain, synchronization objects and frame pacing
//! - [`renderer`]: ties everything into [`VulkanRenderer`]

pub mod initialization;
pub mod memory;
pub mod rendering;
pub mod renderer;
pub mod resources;
pub mod state;

pub use initialization::{
    LogicalDevice, PhysicalDeviceInfo, QueueFamilyIndices, VulkanContext, VulkanError, VulkanInstance, VulkanResult,
};
pub use memory::{AllocatedBuffer, MemoryAllocator};
pub use renderer::VulkanRenderer;
pub use state::{FrameDevice, FrameOutcome, FramePipeline};
