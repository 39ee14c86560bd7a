//! Per-frame state: synchronization, the swapchain and the frame state machine

pub mod frame;
pub mod swapchain;
pub mod swapchain_manager;
pub mod sync;

pub use frame::{AcquireOutcome, FrameDevice, FrameOutcome, FramePipeline, PresentOutcome};
pub use swapchain::{choose_extent, choose_image_count, choose_present_mode, choose_surface_format, Swapchain};
pub use swapchain_manager::{FrameAttachments, SwapchainManager};
pub use sync::{Fence, FenceStatus, FrameSlot, Semaphore, SemaphorePool};
