//! Vulkan initialization: instance, device selection and the owning context

pub mod context;
pub mod device;

pub use context::{VulkanContext, VulkanError, VulkanInstance, VulkanResult};
pub use device::{LogicalDevice, PhysicalDeviceInfo, QueueFamilyIndices};
