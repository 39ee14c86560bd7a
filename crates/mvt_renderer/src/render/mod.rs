//! Rendering: window, vertex and uniform formats, and the Vulkan backend

pub mod window;
pub mod vertex;
pub mod uniform;
pub mod backends;

pub use window::{EventKind, Window, WindowError, WindowResult};
pub use vertex::{Vertex, QUAD_VERTICES, QUAD_INDICES, TWO_QUAD_VERTICES, TWO_QUAD_INDICES};
pub use uniform::UniformBufferObject;
