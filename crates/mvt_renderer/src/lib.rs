//! # MVT Renderer
//!
//! A real-time 3D renderer built directly on Vulkan 1.3.
//!
//! ## Features
//!
//! - **Frames in flight**: fence-paced frame slots with a semaphore pool sized to the swapchain
//! - **Dynamic rendering**: no render pass objects, MSAA resolved straight into the swapchain
//! - **GPU resources**: staged uploads, co-located mesh buffers, mipmapped textures
//! - **Hot reload**: GLSL shaders recompiled through `shaderc` whenever the source file changes
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mvt_renderer::prelude::*;
//!
//! fn main() -> Result<(), AppError> {
//!     mvt_renderer::foundation::logging::init();
//!     ShaderCompiler::add_search_path("EngineAssets/Shaders");
//!     ShaderCompiler::initialize()?;
//!
//!     let result = Application::new(ApplicationConfig::default()).and_then(|mut app| app.run());
//!
//!     ShaderCompiler::shutdown();
//!     result
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod core;

pub mod foundation;
pub mod config;
pub mod assets;
pub mod shader;
pub mod render;

mod application;

pub use application::{Application, AppError, MainLoop, LoopAction, RenderBackend};

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        Application, AppError, MainLoop, LoopAction, RenderBackend,
        assets::{ImageData, ModelData, AssetError},
        core::config::{ApplicationConfig, VulkanRendererConfig, ShaderConfig, WindowConfig, SceneConfig},
        config::Config,
        render::{EventKind, Vertex, UniformBufferObject, Window},
        render::backends::vulkan::{VulkanRenderer, VulkanError, VulkanResult},
        shader::{ShaderCompiler, CompilerSession, EntryPoint, ShaderStage, CompileError, SpirvBinary},
    };
}
