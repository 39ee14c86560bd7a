//! Descriptor layouts, pools and the per-texture, per-frame sets
//!
//! Set 0 has the uniform block at binding 0 (vertex stage) and a combined
//! image sampler at binding 1 (fragment stage). One set exists for every
//! (texture, frame slot) pair so a slot only ever binds its own uniforms.

use ash::{vk, Device};

use super::texture::Texture;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Binding of the uniform block
pub const UNIFORM_BINDING: u32 = 0;
/// Binding of the texture sampler
pub const SAMPLER_BINDING: u32 = 1;

/// Descriptor set layout builder
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a uniform buffer binding
    pub fn add_uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags)
    }

    /// Add a combined image sampler binding
    pub fn add_combined_image_sampler(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stage_flags)
    }

    fn add(mut self, binding: u32, ty: vk::DescriptorType, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(ty)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Bindings added so far
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }

    /// Build the descriptor set layout
    pub fn build(self, device: &Device) -> VulkanResult<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);
        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }.map_err(VulkanError::Api)?;

        Ok(DescriptorSetLayout {
            layout,
            device: device.clone(),
        })
    }
}

/// The renderer's single set layout
pub fn mesh_layout_builder() -> DescriptorSetLayoutBuilder {
    DescriptorSetLayoutBuilder::new()
        .add_uniform_buffer(UNIFORM_BINDING, vk::ShaderStageFlags::VERTEX)
        .add_combined_image_sampler(SAMPLER_BINDING, vk::ShaderStageFlags::FRAGMENT)
}

/// Descriptor set layout wrapper with automatic cleanup
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    device: Device,
}

impl DescriptorSetLayout {
    /// Get the Vulkan descriptor set layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe { self.device.destroy_descriptor_set_layout(self.layout, None) };
    }
}

/// Pool sizes for `set_count` sets of the mesh layout
pub fn pool_sizes(set_count: u32) -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: set_count,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: set_count,
        },
    ]
}

/// Descriptor pool for allocating descriptor sets
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: Device,
}

impl DescriptorPool {
    /// Pool able to hold `max_sets` mesh sets
    pub fn new(device: &Device, max_sets: u32) -> VulkanResult<Self> {
        let sizes = pool_sizes(max_sets);
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(&sizes);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }.map_err(VulkanError::Api)?;
        Ok(Self {
            pool,
            device: device.clone(),
        })
    }

    /// Allocate one set per layout entry
    pub fn allocate(&self, layouts: &[vk::DescriptorSetLayout]) -> VulkanResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        unsafe { self.device.allocate_descriptor_sets(&alloc_info) }.map_err(VulkanError::Api)
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe { self.device.destroy_descriptor_pool(self.pool, None) };
    }
}

/// Sets indexed by texture then frame slot
pub struct TextureDescriptorSets {
    sets: Vec<Vec<vk::DescriptorSet>>,
    // Sets are freed with the pool
    _pool: DescriptorPool,
}

impl TextureDescriptorSets {
    /// Allocate and write a set for every (texture, frame) pair
    ///
    /// `uniform_buffers[f]` is the uniform buffer of frame slot `f`.
    pub fn new(
        device: &Device,
        layout: &DescriptorSetLayout,
        textures: &[Texture],
        uniform_buffers: &[(vk::Buffer, vk::DeviceSize)],
    ) -> VulkanResult<Self> {
        let frames = uniform_buffers.len();
        let total = textures.len() * frames;
        if total == 0 {
            return Err(VulkanError::InvalidArgument(
                "descriptor sets need at least one texture and one frame".to_string(),
            ));
        }

        let pool = DescriptorPool::new(device, total as u32)?;
        let layouts = vec![layout.handle(); total];
        let flat = pool.allocate(&layouts)?;

        let buffer_infos: Vec<vk::DescriptorBufferInfo> = uniform_buffers
            .iter()
            .map(|&(buffer, range)| vk::DescriptorBufferInfo { buffer, offset: 0, range })
            .collect();
        let image_infos: Vec<vk::DescriptorImageInfo> = textures
            .iter()
            .map(|texture| vk::DescriptorImageInfo {
                sampler: texture.sampler(),
                image_view: texture.view(),
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            })
            .collect();

        // Infos are fully built above so the pointers taken here stay valid
        let mut writes = Vec::with_capacity(total * 2);
        for (texture_index, image_info) in image_infos.iter().enumerate() {
            for (frame, buffer_info) in buffer_infos.iter().enumerate() {
                let set = flat[texture_index * frames + frame];
                writes.push(
                    vk::WriteDescriptorSet::builder()
                        .dst_set(set)
                        .dst_binding(UNIFORM_BINDING)
                        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                        .buffer_info(std::slice::from_ref(buffer_info))
                        .build(),
                );
                writes.push(
                    vk::WriteDescriptorSet::builder()
                        .dst_set(set)
                        .dst_binding(SAMPLER_BINDING)
                        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                        .image_info(std::slice::from_ref(image_info))
                        .build(),
                );
            }
        }
        unsafe { device.update_descriptor_sets(&writes, &[]) };

        let sets = flat.chunks(frames).map(<[vk::DescriptorSet]>::to_vec).collect();
        log::debug!("Wrote {} descriptor sets ({} textures x {} frames)", total, textures.len(), frames);

        Ok(Self { sets, _pool: pool })
    }

    /// Set for `texture` used by frame slot `frame`
    pub fn get(&self, texture: usize, frame: usize) -> VulkanResult<vk::DescriptorSet> {
        self.sets
            .get(texture)
            .and_then(|per_frame| per_frame.get(frame))
            .copied()
            .ok_or_else(|| VulkanError::InvalidArgument(format!("no descriptor set for texture {} frame {}", texture, frame)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_layout_bindings() {
        let builder = mesh_layout_builder();
        let bindings = builder.bindings();
        assert_eq!(bindings.len(), 2);

        assert_eq!(bindings[0].binding, 0);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(bindings[0].stage_flags, vk::ShaderStageFlags::VERTEX);

        assert_eq!(bindings[1].binding, 1);
        assert_eq!(bindings[1].descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(bindings[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_pool_sizes_match_set_count() {
        let sizes = pool_sizes(6);
        assert!(sizes.iter().all(|size| size.descriptor_count == 6));
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
    }
}
