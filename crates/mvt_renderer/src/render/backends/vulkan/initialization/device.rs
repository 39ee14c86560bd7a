//! Physical device selection and logical device creation
//!
//! Selection is split into pure scoring/queue-family helpers and the Vulkan
//! queries that feed them.

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Instance};
use std::collections::BTreeSet;
use std::ffi::CStr;

use super::context::{VulkanError, VulkanResult};

/// Device extensions every candidate must expose
///
/// The swapchain extension is only required when presenting.
pub fn required_device_extensions(presenting: bool) -> Vec<&'static CStr> {
    let mut extensions = vec![
        vk::KhrSpirv14Fn::name(),
        vk::KhrSynchronization2Fn::name(),
        vk::KhrCreateRenderpass2Fn::name(),
        vk::KhrDynamicRenderingFn::name(),
        vk::ExtExtendedDynamicStateFn::name(),
    ];
    if presenting {
        extensions.insert(0, SwapchainLoader::name());
    }
    extensions
}

/// First name in `required` that `available` lacks
pub fn first_missing<'a>(required: &[&'a CStr], available: &[&CStr]) -> Option<&'a CStr> {
    required.iter().copied().find(|name| !available.contains(name))
}

/// Everything the scoring function looks at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceCandidate {
    /// Geometry shader support
    pub geometry_shader: bool,
    /// Tessellation shader support
    pub tessellation_shader: bool,
    /// Anisotropic filtering support
    pub sampler_anisotropy: bool,
    /// `maxSamplerAnisotropy` limit
    pub max_sampler_anisotropy: f32,
    /// Highest sample count usable for color and depth together
    pub max_usable_samples: vk::SampleCountFlags,
    /// `maxImageDimension2D` limit
    pub max_image_dimension_2d: u32,
    /// Discrete GPU
    pub discrete: bool,
    /// `extendedDynamicState` feature of `VK_EXT_extended_dynamic_state`
    pub extended_dynamic_state: bool,
    /// Required extensions, Vulkan 1.3 and the needed 1.3 features are present
    pub meets_requirements: bool,
}

/// Score a candidate; `None` excludes it
pub fn score_device(candidate: &DeviceCandidate) -> Option<u64> {
    if !candidate.geometry_shader
        || !candidate.tessellation_shader
        || !candidate.extended_dynamic_state
        || !candidate.meets_requirements
    {
        return None;
    }

    let mut score: u64 = 0;
    if candidate.sampler_anisotropy {
        score += (candidate.max_sampler_anisotropy * 10.0) as u64;
    }
    score *= u64::from(candidate.max_usable_samples.as_raw());
    score += u64::from(candidate.max_image_dimension_2d);
    if candidate.discrete {
        score *= 10;
    }
    Some(score)
}

/// Highest sample count set in both color and depth framebuffer limits
pub fn max_usable_sample_count(limits: &vk::PhysicalDeviceLimits) -> vk::SampleCountFlags {
    let counts = limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;
    [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ]
    .into_iter()
    .find(|&count| counts.contains(count))
    .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

/// Graphics and present queue family indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family used for rendering and transfers
    pub graphics: u32,
    /// Family used for presentation
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Distinct family indices, in ascending order
    pub fn unique(&self) -> Vec<u32> {
        [self.graphics, self.present].into_iter().collect::<BTreeSet<_>>().into_iter().collect()
    }
}

/// Pick graphics and present families
///
/// Prefers the first graphics family when it can also present, then any
/// family doing both, then the first graphics family paired with the first
/// presenting family.
pub fn select_queue_families(
    families: &[vk::QueueFamilyProperties],
    supports_present: impl Fn(u32) -> bool,
) -> Option<QueueFamilyIndices> {
    let is_graphics = |family: &vk::QueueFamilyProperties| family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
    let graphics = families.iter().position(is_graphics)? as u32;

    if supports_present(graphics) {
        return Some(QueueFamilyIndices { graphics, present: graphics });
    }

    let both = families
        .iter()
        .enumerate()
        .find(|&(index, family)| is_graphics(family) && supports_present(index as u32))
        .map(|(index, _)| index as u32);
    if let Some(index) = both {
        return Some(QueueFamilyIndices { graphics: index, present: index });
    }

    let present = (0..families.len() as u32).find(|&index| supports_present(index))?;
    Some(QueueFamilyIndices { graphics, present })
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported core features
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Chosen queue families
    pub queue_families: QueueFamilyIndices,
    /// Highest usable MSAA sample count
    pub max_msaa_samples: vk::SampleCountFlags,
    /// Score the device was selected with
    pub score: u64,
}

impl PhysicalDeviceInfo {
    /// Device name from the driver
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    /// Select the highest scoring device; `surface` is `None` for headless use
    pub fn select(instance: &Instance, surface: Option<(&Surface, vk::SurfaceKHR)>) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices() }.map_err(VulkanError::Api)?;

        let mut best: Option<Self> = None;
        for device in devices {
            match Self::evaluate(instance, device, surface) {
                Ok(Some(info)) => {
                    log::debug!("GPU candidate '{}' scored {}", info.name(), info.score);
                    if best.as_ref().map_or(true, |current| info.score > current.score) {
                        best = Some(info);
                    }
                }
                Ok(None) => {}
                Err(e) => log::warn!("Skipping GPU {:?}: {}", device, e),
            }
        }

        let selected = best.ok_or_else(|| VulkanError::InitializationFailed("failed to find a suitable GPU!".to_string()))?;
        log::info!(
            "Selected GPU: {} (score {}, up to {:?} MSAA samples)",
            selected.name(),
            selected.score,
            selected.max_msaa_samples
        );
        Ok(selected)
    }

    fn evaluate(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: Option<(&Surface, vk::SurfaceKHR)>,
    ) -> VulkanResult<Option<Self>> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let available = unsafe { instance.enumerate_device_extension_properties(device) }.map_err(VulkanError::Api)?;
        let available: Vec<&CStr> = available
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) })
            .collect();
        let required = required_device_extensions(surface.is_some());
        let missing = first_missing(&required, &available);
        if let Some(name) = missing {
            log::debug!("GPU {:?} lacks {:?}", device, name);
        }

        let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
        let mut dynamic_state = vk::PhysicalDeviceExtendedDynamicStateFeaturesEXT::default();
        {
            let mut features2 = vk::PhysicalDeviceFeatures2::builder().push_next(&mut features13);
            // Only chain extension structs the device advertises
            if available.contains(&vk::ExtExtendedDynamicStateFn::name()) {
                features2 = features2.push_next(&mut dynamic_state);
            }
            unsafe { instance.get_physical_device_features2(device, &mut features2) };
        }

        let meets_requirements = missing.is_none()
            && properties.api_version >= vk::API_VERSION_1_3
            && features13.dynamic_rendering == vk::TRUE
            && features13.synchronization2 == vk::TRUE;

        let max_msaa_samples = max_usable_sample_count(&properties.limits);
        let candidate = DeviceCandidate {
            geometry_shader: features.geometry_shader == vk::TRUE,
            tessellation_shader: features.tessellation_shader == vk::TRUE,
            sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
            max_sampler_anisotropy: properties.limits.max_sampler_anisotropy,
            max_usable_samples: max_msaa_samples,
            max_image_dimension_2d: properties.limits.max_image_dimension2_d,
            discrete: properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU,
            extended_dynamic_state: dynamic_state.extended_dynamic_state == vk::TRUE,
            meets_requirements,
        };
        let Some(score) = score_device(&candidate) else {
            return Ok(None);
        };

        let queue_families = match surface {
            Some((loader, surface)) => select_queue_families(&families, |index| unsafe {
                loader
                    .get_physical_device_surface_support(device, index, surface)
                    .unwrap_or(false)
            }),
            None => select_queue_families(&families, |_| true),
        };
        let Some(queue_families) = queue_families else {
            log::debug!("GPU {:?} has no usable graphics/present queue families", device);
            return Ok(None);
        };

        Ok(Some(Self {
            device,
            properties,
            features,
            memory_properties,
            queue_families,
            max_msaa_samples,
            score,
        }))
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    /// Queue family indices the queues came from
    pub queue_families: QueueFamilyIndices,
}

impl LogicalDevice {
    /// Create the logical device with the extensions and Vulkan 1.3 features the renderer uses
    pub fn new(instance: &Instance, physical_device: &PhysicalDeviceInfo, presenting: bool) -> VulkanResult<Self> {
        let families = physical_device.queue_families;
        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extension_ptrs: Vec<*const std::os::raw::c_char> = required_device_extensions(presenting)
            .iter()
            .map(|name| name.as_ptr())
            .collect();

        let core_features = vk::PhysicalDeviceFeatures {
            sampler_anisotropy: physical_device.features.sampler_anisotropy,
            ..Default::default()
        };
        let mut features2 = vk::PhysicalDeviceFeatures2::builder().features(core_features);
        let mut features11 = vk::PhysicalDeviceVulkan11Features::builder().shader_draw_parameters(true);
        let mut features13 = vk::PhysicalDeviceVulkan13Features::builder()
            .synchronization2(true)
            .dynamic_rendering(true);
        let mut extended_dynamic_state =
            vk::PhysicalDeviceExtendedDynamicStateFeaturesEXT::builder().extended_dynamic_state(true);

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .push_next(&mut features2)
            .push_next(&mut features11)
            .push_next(&mut features13)
            .push_next(&mut extended_dynamic_state);

        let device = unsafe { instance.create_device(physical_device.device, &create_info, None) }
            .map_err(VulkanError::Api)?;

        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(families.present, 0) };

        log::debug!(
            "Logical device created (graphics family {}, present family {})",
            families.graphics,
            families.present
        );

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            queue_families: families,
        })
    }

    /// Block until the device has no pending work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle() }.map_err(VulkanError::Api)
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> DeviceCandidate {
        DeviceCandidate {
            geometry_shader: true,
            tessellation_shader: true,
            sampler_anisotropy: true,
            max_sampler_anisotropy: 16.0,
            max_usable_samples: vk::SampleCountFlags::TYPE_8,
            max_image_dimension_2d: 16384,
            discrete: false,
            extended_dynamic_state: true,
            meets_requirements: true,
        }
    }

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_score_formula() {
        // (16 * 10) * 8 + 16384
        assert_eq!(score_device(&candidate()), Some(17664));

        let discrete = DeviceCandidate { discrete: true, ..candidate() };
        assert_eq!(score_device(&discrete), Some(176_640));

        let no_aniso = DeviceCandidate { sampler_anisotropy: false, ..candidate() };
        assert_eq!(score_device(&no_aniso), Some(16384));
    }

    #[test]
    fn test_missing_features_exclude_device() {
        assert_eq!(score_device(&DeviceCandidate { geometry_shader: false, ..candidate() }), None);
        assert_eq!(score_device(&DeviceCandidate { tessellation_shader: false, ..candidate() }), None);
        assert_eq!(score_device(&DeviceCandidate { meets_requirements: false, ..candidate() }), None);
        assert_eq!(
            score_device(&DeviceCandidate { extended_dynamic_state: false, ..candidate() }),
            None
        );
    }

    #[test]
    fn test_max_usable_sample_count() {
        let limits = vk::PhysicalDeviceLimits {
            framebuffer_color_sample_counts: vk::SampleCountFlags::TYPE_1
                | vk::SampleCountFlags::TYPE_4
                | vk::SampleCountFlags::TYPE_8,
            framebuffer_depth_sample_counts: vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_4,
            ..Default::default()
        };
        assert_eq!(max_usable_sample_count(&limits), vk::SampleCountFlags::TYPE_4);
        assert_eq!(
            max_usable_sample_count(&vk::PhysicalDeviceLimits::default()),
            vk::SampleCountFlags::TYPE_1
        );
    }

    #[test]
    fn test_graphics_family_that_presents_wins() {
        let families = [family(vk::QueueFlags::TRANSFER), family(vk::QueueFlags::GRAPHICS)];
        let selected = select_queue_families(&families, |_| true).unwrap();
        assert_eq!(selected, QueueFamilyIndices { graphics: 1, present: 1 });
        assert_eq!(selected.unique(), vec![1]);
    }

    #[test]
    fn test_family_with_both_preferred_over_split() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let selected = select_queue_families(&families, |index| index != 0).unwrap();
        assert_eq!(selected, QueueFamilyIndices { graphics: 2, present: 2 });
    }

    #[test]
    fn test_split_families() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::TRANSFER)];
        let selected = select_queue_families(&families, |index| index == 1).unwrap();
        assert_eq!(selected, QueueFamilyIndices { graphics: 0, present: 1 });
        assert_eq!(selected.unique(), vec![0, 1]);
    }

    #[test]
    fn test_no_family_found() {
        let families = [family(vk::QueueFlags::COMPUTE)];
        assert!(select_queue_families(&families, |_| true).is_none());

        let families = [family(vk::QueueFlags::GRAPHICS)];
        assert!(select_queue_families(&families, |_| false).is_none());
    }

    #[test]
    fn test_required_extensions() {
        let headless = required_device_extensions(false);
        let presenting = required_device_extensions(true);
        assert_eq!(presenting.len(), headless.len() + 1);
        assert_eq!(presenting[0], SwapchainLoader::name());
        assert_eq!(first_missing(&presenting, &headless), Some(SwapchainLoader::name()));
        assert_eq!(first_missing(&headless, &presenting), None);
    }
}
