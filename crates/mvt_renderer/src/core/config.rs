//! # Unified Configuration System
//!
//! All configuration structures for the renderer live here: window, renderer,
//! shader pipeline, scene content and engine-wide settings.
//!
//! ## Configuration Categories
//!
//! - **Window Config**: title and initial framebuffer size
//! - **Renderer Config**: frames in flight, validation, MSAA, mesh buffer layout
//! - **Shader Config**: search paths, module and entry point names, hot reload
//! - **Scene Config**: which model and texture get uploaded at startup
//!
//! Every struct is `#[serde(default)]`, so a config file only has to name the
//! values it changes.

use serde::{Serialize, Deserialize};

pub use crate::config::{Config, ConfigError};

/// # Shader Configuration
///
/// Where shader sources are found and which entry points the graphics
/// pipeline is built from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShaderConfig {
    /// Directories searched when a module is compiled by name
    pub search_paths: Vec<String>,
    /// Module holding both pipeline stages
    pub module_name: String,
    /// File polled for modifications while the renderer runs
    pub watch_file: String,
    /// Vertex stage entry point
    pub vertex_entry: String,
    /// Fragment stage entry point
    pub fragment_entry: String,
    /// Recompile and swap the pipeline when `watch_file` changes
    pub hot_reload: bool,
}

impl ShaderConfig {
    /// Create a shader configuration for a module in the given directory
    pub fn new(shader_dir: impl Into<String>, module_name: impl Into<String>) -> Self {
        let shader_dir = shader_dir.into();
        let module_name = module_name.into();
        let watch_file = format!("{}/{}.glsl", shader_dir.trim_end_matches('/'), module_name);
        Self {
            search_paths: vec![shader_dir],
            module_name,
            watch_file,
            vertex_entry: "vertMain".to_string(),
            fragment_entry: "fragMain".to_string(),
            hot_reload: true,
        }
    }

    /// Enable or disable hot reload
    pub fn with_hot_reload(mut self, enabled: bool) -> Self {
        self.hot_reload = enabled;
        self
    }

    /// Validate the shader configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.module_name.is_empty() {
            return Err("Shader module name cannot be empty".to_string());
        }
        if self.vertex_entry.is_empty() || self.fragment_entry.is_empty() {
            return Err("Shader entry point names cannot be empty".to_string());
        }
        if self.vertex_entry == self.fragment_entry {
            return Err(format!(
                "Vertex and fragment stages share the entry point '{}'",
                self.vertex_entry
            ));
        }
        Ok(())
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::new("EngineAssets/Shaders", "mesh")
    }
}

/// # Vulkan Renderer Configuration
///
/// Configuration specific to the Vulkan renderer: instance metadata, frame
/// pacing and attachment setup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VulkanRendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Shader configuration
    pub shaders: ShaderConfig,
    /// Number of frame slots recorded ahead of the GPU
    pub max_frames_in_flight: usize,
    /// Whether to enable Vulkan validation layers
    pub enable_validation: Option<bool>,
    /// How long a single frame fence wait lasts before it is retried
    pub fence_timeout_ms: u64,
    /// Render into multisampled color targets resolved into the swapchain
    pub enable_msaa: bool,
    /// Upper bound for the MSAA sample count, `None` uses the device maximum
    pub max_msaa_samples: Option<u32>,
    /// Place vertex and index data of a mesh in one device allocation
    pub colocate_mesh_buffers: bool,
}

impl VulkanRendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (1, 0, 0),
            shaders: ShaderConfig::default(),
            max_frames_in_flight: 2,
            enable_validation: None, // Auto-detect based on build type
            fence_timeout_ms: 1000,
            enable_msaa: true,
            max_msaa_samples: None,
            colocate_mesh_buffers: true,
        }
    }

    /// Set application version
    pub fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Set custom shader configuration
    pub fn with_shaders(mut self, shaders: ShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    /// Set maximum frames in flight
    pub fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Choose between co-located and separate mesh buffers
    pub fn with_colocated_meshes(mut self, enabled: bool) -> Self {
        self.colocate_mesh_buffers = enabled;
        self
    }

    /// Enable or disable multisampling, optionally capping the sample count
    pub fn with_msaa(mut self, enabled: bool, max_samples: Option<u32>) -> Self {
        self.enable_msaa = enabled;
        self.max_msaa_samples = max_samples;
        self
    }

    /// Whether validation layers end up enabled
    ///
    /// Defaults to on in debug builds and off in release builds.
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Fence timeout in nanoseconds, the unit Vulkan waits take
    pub fn fence_timeout_ns(&self) -> u64 {
        self.fence_timeout_ms.saturating_mul(1_000_000)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.application_name.is_empty() {
            return Err("Application name cannot be empty".to_string());
        }

        if self.max_frames_in_flight == 0 {
            return Err("Max frames in flight must be at least 1".to_string());
        }

        if self.max_frames_in_flight > 8 {
            return Err("Max frames in flight should not exceed 8".to_string());
        }

        if self.fence_timeout_ms == 0 {
            return Err("Fence timeout must be greater than zero".to_string());
        }

        if let Some(samples) = self.max_msaa_samples {
            if !samples.is_power_of_two() || samples > 64 {
                return Err(format!("MSAA sample cap {samples} is not a power of two up to 64"));
            }
        }

        self.shaders.validate()?;

        Ok(())
    }
}

impl Default for VulkanRendererConfig {
    fn default() -> Self {
        Self::new("Modern Vulkan")
    }
}

/// # Window Configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
    /// Whether the user may resize the window
    pub resizable: bool,
}

impl WindowConfig {
    /// Create a window configuration
    pub fn new(title: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            title: title.into(),
            width,
            height,
            resizable: true,
        }
    }

    /// Validate the window configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!("Window size {}x{} must be non-zero", self.width, self.height));
        }
        Ok(())
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::new("Modern Vulkan", 1600, 900)
    }
}

/// # Scene Configuration
///
/// What gets uploaded at startup. Missing files are reported and skipped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SceneConfig {
    /// OBJ model drawn with `texture_path`
    pub model_path: Option<String>,
    /// Texture sampled by the model
    pub texture_path: Option<String>,
    /// Draw the two built-in quads below the model
    pub include_builtin_quads: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            model_path: Some("EngineAssets/Models/viking_room.obj".to_string()),
            texture_path: Some("EngineAssets/Textures/viking_room.png".to_string()),
            include_builtin_quads: true,
        }
    }
}

/// # Engine Configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Default log filter, overridden by `RUST_LOG`
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// # Complete Application Configuration
///
/// Top-level configuration the application is started with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Engine core configuration
    pub engine: EngineConfig,
    /// Window configuration
    pub window: WindowConfig,
    /// Rendering system configuration
    pub renderer: VulkanRendererConfig,
    /// Scene content
    pub scene: SceneConfig,
}

impl ApplicationConfig {
    /// Create a new application configuration with defaults
    pub fn new(app_name: impl Into<String>) -> Self {
        let app_name = app_name.into();
        Self {
            window: WindowConfig {
                title: app_name.clone(),
                ..WindowConfig::default()
            },
            renderer: VulkanRendererConfig::new(app_name),
            ..Self::default()
        }
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.window.validate().map_err(ConfigError::Invalid)?;
        self.renderer.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }
}

impl Config for ApplicationConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ApplicationConfig::default();
        assert_eq!(config.window.width, 1600);
        assert_eq!(config.window.height, 900);
        assert_eq!(config.window.title, "Modern Vulkan");
        assert_eq!(config.renderer.max_frames_in_flight, 2);
        assert!(config.renderer.colocate_mesh_buffers);
        assert_eq!(config.renderer.shaders.module_name, "mesh");
        assert_eq!(config.renderer.shaders.watch_file, "EngineAssets/Shaders/mesh.glsl");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_frames_in_flight_bounds() {
        assert!(VulkanRendererConfig::default().with_max_frames_in_flight(0).validate().is_err());
        assert!(VulkanRendererConfig::default().with_max_frames_in_flight(1).validate().is_ok());
        assert!(VulkanRendererConfig::default().with_max_frames_in_flight(8).validate().is_ok());
        assert!(VulkanRendererConfig::default().with_max_frames_in_flight(9).validate().is_err());
    }

    #[test]
    fn test_msaa_cap_must_be_power_of_two() {
        assert!(VulkanRendererConfig::default().with_msaa(true, Some(4)).validate().is_ok());
        assert!(VulkanRendererConfig::default().with_msaa(true, Some(3)).validate().is_err());
        assert!(VulkanRendererConfig::default().with_msaa(true, Some(128)).validate().is_err());
    }

    #[test]
    fn test_shader_entry_points_must_differ() {
        let mut shaders = ShaderConfig::default();
        shaders.fragment_entry = shaders.vertex_entry.clone();
        assert!(shaders.validate().is_err());
    }

    #[test]
    fn test_zero_window_rejected() {
        let mut config = ApplicationConfig::default();
        config.window.height = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_fence_timeout_conversion() {
        let config = VulkanRendererConfig::default();
        assert_eq!(config.fence_timeout_ns(), 1_000_000_000);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[window]\ntitle = \"Resized\"\nwidth = 800\n\n[renderer]\nmax_frames_in_flight = 3\ncolocate_mesh_buffers = false\n"
        )
        .unwrap();

        let config = ApplicationConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.window.title, "Resized");
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 900);
        assert_eq!(config.renderer.max_frames_in_flight, 3);
        assert!(!config.renderer.colocate_mesh_buffers);
        assert_eq!(config.renderer.shaders, ShaderConfig::default());
    }

    #[test]
    fn test_ron_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mvt.ron");

        let mut config = ApplicationConfig::new("Saved");
        config.scene.model_path = None;
        config.save_to_file(&path).unwrap();

        let loaded = ApplicationConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
