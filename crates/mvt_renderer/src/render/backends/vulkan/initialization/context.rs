//! Vulkan context management
//!
//! Owns the entry, instance, debug messenger, optional surface and the
//! selected physical and logical devices. Everything else in the backend
//! borrows from here and must be dropped first.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::Surface;
use ash::{vk, Device, Entry, Instance};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use thiserror::Error;

use super::device::{first_missing, LogicalDevice, PhysicalDeviceInfo};
use crate::assets::AssetError;
use crate::core::config::VulkanRendererConfig;
use crate::render::window::Window;
use crate::shader::CompileError;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// A caller passed a value the operation cannot handle
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The device lacks a capability the renderer depends on
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// The pooled allocator rejected a request
    #[error("Allocation failed: {0:?}")]
    Allocation(vk::Result),

    /// Shader compilation failed
    #[error(transparent)]
    ShaderCompilation(#[from] CompileError),

    /// Model or texture loading failed
    #[error(transparent)]
    Asset(#[from] AssetError),
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

const VALIDATION_LAYER: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };
const ENGINE_NAME: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"No Engine\0") };

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    /// Debug utilities extension, present when validation is on
    pub debug_utils: Option<DebugUtils>,
    /// Debug messenger handle
    pub debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl VulkanInstance {
    /// Create a Vulkan 1.3 instance with the given window extensions
    pub fn new(app_name: &str, app_version: (u32, u32, u32), window_extensions: &[String], enable_validation: bool) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {:?}", e)))?;

        let app_name_cstr = CString::new(app_name)
            .map_err(|_| VulkanError::InvalidArgument(format!("application name '{}' contains a NUL byte", app_name)))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, app_version.0, app_version.1, app_version.2))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_3);

        let mut extensions: Vec<CString> = window_extensions
            .iter()
            .map(|name| CString::new(name.as_str()))
            .collect::<Result<_, _>>()
            .map_err(|_| VulkanError::InvalidArgument("extension name contains a NUL byte".to_string()))?;
        if enable_validation {
            extensions.push(DebugUtils::name().to_owned());
        }

        let layers: Vec<&CStr> = if enable_validation { vec![VALIDATION_LAYER] } else { Vec::new() };

        // Fail early with the offending name instead of a bare driver error
        let layer_props = entry.enumerate_instance_layer_properties().map_err(VulkanError::Api)?;
        let available_layers: Vec<&CStr> = layer_props
            .iter()
            .map(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) })
            .collect();
        if let Some(missing) = first_missing(&layers, &available_layers) {
            return Err(VulkanError::InitializationFailed(format!(
                "Required layer not supported: {}",
                missing.to_string_lossy()
            )));
        }

        let ext_props = entry
            .enumerate_instance_extension_properties(None)
            .map_err(VulkanError::Api)?;
        let available_extensions: Vec<&CStr> = ext_props
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) })
            .collect();
        let requested: Vec<&CStr> = extensions.iter().map(CString::as_c_str).collect();
        if let Some(missing) = first_missing(&requested, &available_extensions) {
            return Err(VulkanError::InitializationFailed(format!(
                "Required extension not supported: {}",
                missing.to_string_lossy()
            )));
        }

        let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|ext| ext.as_ptr()).collect();
        let layer_ptrs: Vec<*const c_char> = layers.iter().map(|layer| layer.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(VulkanError::Api)?;

        let (debug_utils, debug_messenger) = if cfg!(debug_assertions) && enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let messenger = match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => messenger,
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            };
            (Some(debug_utils), Some(messenger))
        } else {
            (None, None)
        };

        log::info!(
            "Vulkan instance created ({} extensions, validation {})",
            extension_ptrs.len(),
            if enable_validation { "on" } else { "off" }
        );

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        })
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }.map_err(VulkanError::Api)
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let (Some(debug_utils), Some(debug_messenger)) = (&self.debug_utils, self.debug_messenger) {
                debug_utils.destroy_debug_utils_messenger(debug_messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::trace!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Main Vulkan context that owns all core Vulkan resources
///
/// Field order matters: the logical device drops before the instance.
pub struct VulkanContext {
    /// Surface extension loader
    pub surface_loader: Surface,
    /// Presentation surface, absent for headless contexts
    pub surface: Option<vk::SurfaceKHR>,
    /// Selected physical device information
    pub physical_device: PhysicalDeviceInfo,
    /// Logical device and queues
    pub device: LogicalDevice,
    /// Vulkan instance and debug utilities
    pub instance: VulkanInstance,
}

impl VulkanContext {
    /// Create a context presenting to `window`
    pub fn new(window: &mut Window, config: &VulkanRendererConfig) -> VulkanResult<Self> {
        let window_extensions = window
            .required_instance_extensions()
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to get required extensions: {}", e)))?;
        let instance = VulkanInstance::new(
            &config.application_name,
            config.application_version,
            &window_extensions,
            config.validation_enabled(),
        )?;

        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let surface = window
            .create_vulkan_surface(instance.instance.handle())
            .map_err(|e| VulkanError::InitializationFailed(format!("Surface creation: {}", e)))?;

        // The surface is destroyed by hand on these early-return paths since
        // the context that would own it does not exist yet
        let selected = PhysicalDeviceInfo::select(&instance.instance, Some((&surface_loader, surface)))
            .and_then(|physical| LogicalDevice::new(&instance.instance, &physical, true).map(|device| (physical, device)));
        let (physical_device, device) = match selected {
            Ok(pair) => pair,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };

        Ok(Self {
            surface_loader,
            surface: Some(surface),
            physical_device,
            device,
            instance,
        })
    }

    /// Create a context without a window or surface
    pub fn new_headless(config: &VulkanRendererConfig) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(
            &config.application_name,
            config.application_version,
            &[],
            config.validation_enabled(),
        )?;
        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let physical_device = PhysicalDeviceInfo::select(&instance.instance, None)?;
        let device = LogicalDevice::new(&instance.instance, &physical_device, false)?;

        log::info!("Headless Vulkan context ready on {}", physical_device.name());

        Ok(Self {
            surface_loader,
            surface: None,
            physical_device,
            device,
            instance,
        })
    }

    /// Get a reference to the Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// Get the raw Device handle
    pub fn raw_device(&self) -> &Device {
        &self.device.device
    }

    /// Get the surface handle, failing for headless contexts
    pub fn surface(&self) -> VulkanResult<vk::SurfaceKHR> {
        self.surface.ok_or_else(|| VulkanError::InvalidOperation {
            reason: "headless context has no surface".to_string(),
        })
    }

    /// Get the graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Get the present queue
    pub fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Get the graphics queue family index
    pub fn graphics_queue_family(&self) -> u32 {
        self.device.queue_families.graphics
    }

    /// Block until the device has no pending work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.device.wait_idle()
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device.device_wait_idle();
            if let Some(surface) = self.surface.take() {
                self.surface_loader.destroy_surface(surface, None);
            }
        }
        // device, then instance, drop in declaration order
    }
}
