//! Rendering backends

/// Vulkan 1.3 backend
pub mod vulkan;
