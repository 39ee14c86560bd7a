//! Pooled GPU memory through the Vulkan Memory Allocator

pub mod allocator;

pub use allocator::{AllocatedBuffer, MemoryAllocator};
