//! Shader compilation and hot reload
//!
//! - [`compiler`]: session-based GLSL to SPIR-V compilation through `shaderc`
//! - [`hot_reload`]: modification-time polling of shader sources

pub mod compiler;
pub mod hot_reload;

pub use compiler::{
    CompileError, CompileResult, CompilerSession, EntryPoint, GlobalSessionDesc, ShaderCompiler, ShaderStage,
    SpirvBinary,
};
pub use hot_reload::ShaderWatcher;
