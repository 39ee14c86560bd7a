//! Buffer management for vertex, index and staging data
//!
//! A [`Buffer`] owns a dedicated allocation bound at offset 0. Dropping it
//! destroys the handle before freeing the memory.

use ash::{vk, Device};

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Sharing mode and the queue families it names
///
/// More than one distinct family shares the resource concurrently across
/// exactly those families; otherwise it is exclusive to `default_family`.
pub fn sharing_mode_for(families: &[u32], default_family: u32) -> (vk::SharingMode, Vec<u32>) {
    let mut unique: Vec<u32> = families.to_vec();
    unique.sort_unstable();
    unique.dedup();

    if unique.len() > 1 {
        (vk::SharingMode::CONCURRENT, unique)
    } else {
        (vk::SharingMode::EXCLUSIVE, vec![default_family])
    }
}

/// First memory type allowed by `type_bits` whose flags contain `flags`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&index| {
            type_bits & (1 << index) != 0
                && memory_properties.memory_types[index as usize]
                    .property_flags
                    .contains(flags)
        })
        .ok_or(VulkanError::NoSuitableMemoryType)
}

/// Allocate device memory matching `requirements`
pub(crate) fn allocate_memory(
    device: &Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<vk::DeviceMemory> {
    let memory_type_index = find_memory_type(memory_properties, requirements.memory_type_bits, properties)?;
    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    unsafe { device.allocate_memory(&alloc_info, None) }.map_err(VulkanError::Api)
}

/// Buffer wrapper with memory management
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a buffer with its own allocation bound at offset 0
    pub fn new(
        device: &Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
        families: &[u32],
        default_family: u32,
    ) -> VulkanResult<Self> {
        if size == 0 {
            return Err(VulkanError::InvalidArgument("buffer size must be non-zero".to_string()));
        }

        let buffer = create_unbound_buffer(device, size, usage, families, default_family)?;
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let memory = match allocate_memory(device, memory_properties, requirements, properties) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                device.destroy_buffer(buffer, None);
                device.free_memory(memory, None);
            }
            return Err(VulkanError::Api(e));
        }

        Ok(Self {
            device: device.clone(),
            buffer,
            memory,
            size,
        })
    }

    /// Copy `bytes` into the start of a host-visible buffer
    pub fn write_bytes(&self, bytes: &[u8]) -> VulkanResult<()> {
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::InvalidArgument(format!(
                "write of {} bytes into a {} byte buffer",
                bytes.len(),
                self.size
            )));
        }

        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Read the first `len` bytes of a host-visible buffer
    pub fn read_bytes(&self, len: usize) -> VulkanResult<Vec<u8>> {
        if len as vk::DeviceSize > self.size {
            return Err(VulkanError::InvalidArgument(format!(
                "read of {} bytes from a {} byte buffer",
                len, self.size
            )));
        }

        let mut out = vec![0_u8; len];
        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(ptr.cast::<u8>(), out.as_mut_ptr(), len);
            self.device.unmap_memory(self.memory);
        }
        Ok(out)
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Create a buffer handle with no memory behind it yet
pub(crate) fn create_unbound_buffer(
    device: &Device,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    families: &[u32],
    default_family: u32,
) -> VulkanResult<vk::Buffer> {
    let (sharing_mode, family_indices) = sharing_mode_for(families, default_family);
    let buffer_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(usage)
        .sharing_mode(sharing_mode)
        .queue_family_indices(&family_indices);

    unsafe { device.create_buffer(&buffer_info, None) }.map_err(VulkanError::Api)
}
