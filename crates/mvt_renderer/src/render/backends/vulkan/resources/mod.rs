//! Vulkan resource management: buffers, images, meshes, textures, descriptors

pub mod buffer;
pub mod descriptor_set;
pub mod factory;
pub mod image;
pub mod layout;
pub mod mesh;
pub mod texture;
pub mod uniform;

pub use buffer::{find_memory_type, sharing_mode_for, Buffer};
pub use descriptor_set::{mesh_layout_builder, DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, TextureDescriptorSets};
pub use factory::{ResourceFactory, DEPTH_FORMAT_CANDIDATES};
pub use image::{mip_level_count, Image, ImageDesc, ImageView, Sampler};
pub use layout::{image_barrier, subresource_range, transition_masks, TransitionMasks};
pub use mesh::{pad_to_alignment, ColocatedBuffers, ColocatedLayout, GpuMesh, MeshStorage};
pub use texture::Texture;
pub use uniform::FrameUniforms;
