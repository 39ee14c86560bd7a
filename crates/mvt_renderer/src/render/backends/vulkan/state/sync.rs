//! Vulkan synchronization primitives
//!
//! Fences and semaphores are move-only owners. Per-slot objects live in
//! [`FrameSlot`]; per-image semaphores live in [`SemaphorePool`], which is
//! sized to the swapchain image count rather than the frame count.

use ash::{vk, Device};

use crate::render::backends::vulkan::rendering::CommandPool;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Outcome of a bounded fence wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// The fence is signaled
    Signaled,
    /// The timeout elapsed first
    TimedOut,
}

/// Binary semaphore
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: &Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe { device.create_semaphore(&create_info, None) }.map_err(VulkanError::Api)?;
        Ok(Self {
            device: device.clone(),
            semaphore,
        })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { self.device.destroy_semaphore(self.semaphore, None) };
    }
}

/// CPU-visible fence
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a fence, optionally already signaled
    pub fn new(device: &Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe { device.create_fence(&create_info, None) }.map_err(VulkanError::Api)?;

        Ok(Self {
            device: device.clone(),
            fence,
        })
    }

    /// Wait up to `timeout_ns`; a timeout is reported, not an error
    pub fn wait(&self, timeout_ns: u64) -> VulkanResult<FenceStatus> {
        match unsafe { self.device.wait_for_fences(&[self.fence], true, timeout_ns) } {
            Ok(()) => Ok(FenceStatus::Signaled),
            Err(vk::Result::TIMEOUT) => Ok(FenceStatus::TimedOut),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Wait with no timeout
    pub fn wait_forever(&self) -> VulkanResult<()> {
        unsafe { self.device.wait_for_fences(&[self.fence], true, u64::MAX) }.map_err(VulkanError::Api)
    }

    /// Reset to unsignaled
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.fence]) }.map_err(VulkanError::Api)
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.device.destroy_fence(self.fence, None) };
    }
}

/// One frame-in-flight slot: a primary command buffer and its fence
///
/// The fence starts signaled so the first wait on a fresh slot returns at once.
pub struct FrameSlot {
    /// Command buffer re-recorded every time the slot comes around
    pub command_buffer: vk::CommandBuffer,
    /// Signaled when the slot's last submission finished
    pub in_flight: Fence,
}

impl FrameSlot {
    /// Create `count` slots with buffers from `pool`
    pub fn create_all(device: &Device, pool: &CommandPool, count: usize) -> VulkanResult<Vec<Self>> {
        let command_buffers = pool.allocate_command_buffers(count as u32)?;
        command_buffers
            .into_iter()
            .map(|command_buffer| {
                Ok(Self {
                    command_buffer,
                    in_flight: Fence::new(device, true)?,
                })
            })
            .collect()
    }
}

/// Acquire and render semaphores, one pair per swapchain image
pub struct SemaphorePool {
    present_complete: Vec<Semaphore>,
    render_finished: Vec<Semaphore>,
}

impl SemaphorePool {
    /// Create `count` pairs
    pub fn new(device: &Device, count: usize) -> VulkanResult<Self> {
        let present_complete = (0..count).map(|_| Semaphore::new(device)).collect::<VulkanResult<Vec<_>>>()?;
        let render_finished = (0..count).map(|_| Semaphore::new(device)).collect::<VulkanResult<Vec<_>>>()?;
        log::debug!("[FRAME] Semaphore pool sized to {} images", count);
        Ok(Self {
            present_complete,
            render_finished,
        })
    }

    /// Number of pairs
    pub fn len(&self) -> usize {
        self.present_complete.len()
    }

    /// True when the pool holds no semaphores
    pub fn is_empty(&self) -> bool {
        self.present_complete.is_empty()
    }

    /// Signaled by acquire, waited on by submit
    pub fn present_complete(&self, index: usize) -> VulkanResult<vk::Semaphore> {
        self.present_complete
            .get(index)
            .map(Semaphore::handle)
            .ok_or_else(|| out_of_range(index, self.len()))
    }

    /// Signaled by submit, waited on by present
    pub fn render_finished(&self, index: usize) -> VulkanResult<vk::Semaphore> {
        self.render_finished
            .get(index)
            .map(Semaphore::handle)
            .ok_or_else(|| out_of_range(index, self.len()))
    }
}

fn out_of_range(index: usize, len: usize) -> VulkanError {
    VulkanError::InvalidArgument(format!("semaphore index {} out of range for pool of {}", index, len))
}
