//! Instance creation and the physical/logical device factory.

use std::ffi::{c_char, c_void, CStr};
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::device::{Device, DeviceShared, PhysicalDevice};
use crate::error::{Result, Status, VkResultExt};
use crate::swapchain::{Surface, SurfaceResource};
use crate::{DeviceType, MAX_FRAME_BUFFERING};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

#[derive(Debug, Clone, Copy, Default)]
pub struct InstanceDesc {
    /// Enables the Khronos validation layer and a debug-utils messenger that
    /// forwards validation messages to the `log` facade.
    pub validation: bool,
}

pub(crate) struct InstanceShared {
    // the entry keeps the loader library alive for every child object
    #[allow(dead_code)]
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) surface_loader: ash::khr::surface::Instance,
    pub(crate) debug_utils: Option<ash::ext::debug_utils::Instance>,
    pub(crate) debug_messenger: vk::DebugUtilsMessengerEXT,
    pub(crate) validation: bool,
}

impl Drop for InstanceShared {
    fn drop(&mut self) {
        unsafe {
            if let Some(ref debug_utils) = self.debug_utils {
                if self.debug_messenger != vk::DebugUtilsMessengerEXT::null() {
                    debug_utils.destroy_debug_utils_messenger(self.debug_messenger, None);
                }
            }
            self.instance.destroy_instance(None);
        }
    }
}

unsafe extern "system" fn debug_messenger_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    let message = unsafe {
        let data = &*data;
        if data.p_message.is_null() {
            return vk::FALSE;
        }
        CStr::from_ptr(data.p_message).to_string_lossy().into_owned()
    };
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("vulkan: {message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::warn!("vulkan: {message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::debug!("vulkan: {message}");
    } else {
        log::trace!("vulkan: {message}");
    }
    vk::FALSE
}

fn messenger_create_info<'a>() -> vk::DebugUtilsMessengerCreateInfoEXT<'a> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_messenger_callback))
}

/// Entry point of the GPU core; creates devices and window surfaces.
pub struct Instance {
    pub(crate) shared: Arc<InstanceShared>,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("validation", &self.shared.validation)
            .finish_non_exhaustive()
    }
}

impl Instance {
    pub fn new(desc: InstanceDesc) -> Result<Self> {
        let entry =
            unsafe { ash::Entry::load() }.map_err(|_| Status::InitializationFailed)?;

        let available_extensions = unsafe {
            entry
                .enumerate_instance_extension_properties(None)
                .status()?
        };
        let has_extension = |name: &CStr| {
            available_extensions.iter().any(|ext| {
                ext.extension_name_as_c_str()
                    .map(|ext_name| ext_name == name)
                    .unwrap_or(false)
            })
        };

        // surface extensions for whatever platforms this loader exposes
        let mut extensions: Vec<*const c_char> = Vec::new();
        for name in [
            ash::khr::surface::NAME,
            ash::khr::win32_surface::NAME,
            ash::khr::xlib_surface::NAME,
            ash::khr::xcb_surface::NAME,
            ash::khr::wayland_surface::NAME,
            ash::khr::android_surface::NAME,
            ash::ext::metal_surface::NAME,
        ] {
            if has_extension(name) {
                extensions.push(name.as_ptr());
            }
        }

        let validation = desc.validation && has_extension(ash::ext::debug_utils::NAME);
        if validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        } else if desc.validation {
            log::warn!("validation requested but VK_EXT_debug_utils is unavailable");
        }

        let mut layers: Vec<*const c_char> = Vec::new();
        if validation {
            let available_layers =
                unsafe { entry.enumerate_instance_layer_properties() }.status()?;
            let has_validation_layer = available_layers.iter().any(|layer| {
                layer
                    .layer_name_as_c_str()
                    .map(|name| name == VALIDATION_LAYER)
                    .unwrap_or(false)
            });
            if has_validation_layer {
                layers.push(VALIDATION_LAYER.as_ptr());
            } else {
                log::warn!("validation requested but the Khronos validation layer is not installed");
            }
        }

        let app_name = c"kiln";
        let app_info = vk::ApplicationInfo::default()
            .application_name(app_name)
            .engine_name(app_name)
            .api_version(vk::API_VERSION_1_2);

        let mut messenger_info = messenger_create_info();
        let mut create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        if validation {
            create_info = create_info.push_next(&mut messenger_info);
        }

        let instance = unsafe { entry.create_instance(&create_info, None) }.status()?;

        let debug_utils = validation
            .then(|| ash::ext::debug_utils::Instance::new(&entry, &instance));
        let debug_messenger = match debug_utils {
            Some(ref debug_utils) => {
                let info = messenger_create_info();
                unsafe { debug_utils.create_debug_utils_messenger(&info, None) }
                    .unwrap_or(vk::DebugUtilsMessengerEXT::null())
            }
            None => vk::DebugUtilsMessengerEXT::null(),
        };

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        Ok(Self {
            shared: Arc::new(InstanceShared {
                entry,
                instance,
                surface_loader,
                debug_utils,
                debug_messenger,
                validation,
            }),
        })
    }

    /// Creates a window surface for presentation.
    pub fn create_surface(
        &self,
        window: &(impl HasDisplayHandle + HasWindowHandle),
    ) -> Result<Surface> {
        let display = window
            .display_handle()
            .map_err(|_| Status::InitializationFailed)?;
        let handle = window
            .window_handle()
            .map_err(|_| Status::InitializationFailed)?;
        let vk_surface = unsafe {
            ash_window::create_surface(
                &self.shared.entry,
                &self.shared.instance,
                display.as_raw(),
                handle.as_raw(),
                None,
            )
        }
        .status()?;
        Ok(Surface {
            res: Arc::new(SurfaceResource {
                instance: Arc::clone(&self.shared),
                vk_surface,
            }),
        })
    }

    /// Selects the first physical device of each preferred type in order that
    /// owns a GRAPHICS|COMPUTE|TRANSFER queue family, then creates the
    /// logical device with the curated feature set and a frame ring of
    /// `buffering` slots.
    pub fn create_device(
        &self,
        preferred_types: &[DeviceType],
        buffering: u32,
    ) -> Result<Device> {
        assert!(buffering > 0, "buffering must be at least 1");
        assert!(
            buffering <= MAX_FRAME_BUFFERING,
            "buffering exceeds MAX_FRAME_BUFFERING"
        );

        let instance = &self.shared.instance;
        let vk_phy_devs =
            unsafe { instance.enumerate_physical_devices() }.status()?;
        if vk_phy_devs.is_empty() {
            return Err(Status::DeviceLost);
        }

        let phy_devs: Vec<PhysicalDevice> = vk_phy_devs
            .iter()
            .map(|&raw| unsafe {
                PhysicalDevice {
                    raw,
                    properties: instance.get_physical_device_properties(raw),
                    features: instance.get_physical_device_features(raw),
                    memory_properties: instance.get_physical_device_memory_properties(raw),
                }
            })
            .collect();

        log::trace!("available devices:");
        for (i, dev) in phy_devs.iter().enumerate() {
            let properties = &dev.properties;
            let name = properties
                .device_name_as_c_str()
                .unwrap_or(c"<invalid>")
                .to_string_lossy();
            log::trace!(
                "[device {i}] {:?} {name}, api {}.{}.{}, driver {}, vendor {:#x}, device {:#x}",
                properties.device_type,
                vk::api_version_major(properties.api_version),
                vk::api_version_minor(properties.api_version),
                vk::api_version_patch(properties.api_version),
                properties.driver_version,
                properties.vendor_id,
                properties.device_id,
            );
            let families =
                unsafe { instance.get_physical_device_queue_family_properties(dev.raw) };
            for (f, family) in families.iter().enumerate() {
                log::trace!(
                    "    queue family {f}: count {}, flags {:?}",
                    family.queue_count,
                    family.queue_flags
                );
            }
        }

        const REQUIRED_QUEUE_FLAGS: vk::QueueFlags = vk::QueueFlags::from_raw(
            vk::QueueFlags::GRAPHICS.as_raw()
                | vk::QueueFlags::COMPUTE.as_raw()
                | vk::QueueFlags::TRANSFER.as_raw(),
        );

        let mut selected: Option<(usize, u32)> = None;
        'select: for preferred in preferred_types {
            for (idev, dev) in phy_devs.iter().enumerate() {
                if dev.properties.device_type != preferred.to_vk() {
                    continue;
                }
                let families =
                    unsafe { instance.get_physical_device_queue_family_properties(dev.raw) };
                if let Some(family) = families
                    .iter()
                    .position(|f| f.queue_flags.contains(REQUIRED_QUEUE_FLAGS))
                {
                    selected = Some((idev, family as u32));
                    break 'select;
                }
            }
        }

        let Some((selected_idx, queue_family)) = selected else {
            log::trace!("no suitable device found");
            return Err(Status::DeviceLost);
        };

        let phy_dev = phy_devs[selected_idx];
        log::trace!("selected device {selected_idx}, queue family {queue_family}");

        check_device_limits(&phy_dev.properties.limits);
        check_device_features(&phy_dev.features);

        let available_extensions = unsafe {
            instance.enumerate_device_extension_properties(phy_dev.raw)
        }
        .status()?;
        let has_extension = |name: &CStr| {
            available_extensions.iter().any(|ext| {
                ext.extension_name_as_c_str()
                    .map(|ext_name| ext_name == name)
                    .unwrap_or(false)
            })
        };
        log::trace!("available device extensions:");
        for ext in &available_extensions {
            if let Ok(name) = ext.extension_name_as_c_str() {
                log::trace!("    {} (spec {})", name.to_string_lossy(), ext.spec_version);
            }
        }

        let required_extensions = [
            ash::khr::swapchain::NAME,
            ash::ext::descriptor_indexing::NAME,
            ash::ext::extended_dynamic_state::NAME,
            ash::khr::depth_stencil_resolve::NAME,
            ash::khr::dynamic_rendering::NAME,
            ash::khr::separate_depth_stencil_layouts::NAME,
            ash::khr::create_renderpass2::NAME,
        ];

        let mut extensions: Vec<*const c_char> = Vec::new();
        for name in required_extensions {
            if !has_extension(name) {
                log::trace!("required extension {} not present", name.to_string_lossy());
                return Err(Status::ExtensionNotPresent);
            }
            extensions.push(name.as_ptr());
        }
        if has_extension(ash::khr::portability_subset::NAME) {
            extensions.push(ash::khr::portability_subset::NAME.as_ptr());
        }

        let queue_priority = [1.0f32];
        let queue_create_info = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priority);

        // curated feature set: only what the engine actually exercises, plus
        // pass-throughs the application can query via device properties
        let features = vk::PhysicalDeviceFeatures::default()
            .image_cube_array(true)
            .multi_draw_indirect(true)
            .draw_indirect_first_instance(true)
            .fill_mode_non_solid(phy_dev.features.fill_mode_non_solid == vk::TRUE)
            .sampler_anisotropy(true)
            .shader_uniform_buffer_array_dynamic_indexing(true)
            .shader_sampled_image_array_dynamic_indexing(true)
            .shader_storage_buffer_array_dynamic_indexing(true)
            .shader_storage_image_array_dynamic_indexing(true)
            .shader_clip_distance(phy_dev.features.shader_clip_distance == vk::TRUE)
            .shader_cull_distance(phy_dev.features.shader_cull_distance == vk::TRUE)
            .shader_float64(phy_dev.features.shader_float64 == vk::TRUE)
            .shader_int64(phy_dev.features.shader_int64 == vk::TRUE)
            .shader_int16(phy_dev.features.shader_int16 == vk::TRUE);

        let mut separate_depth_stencil =
            vk::PhysicalDeviceSeparateDepthStencilLayoutsFeatures::default()
                .separate_depth_stencil_layouts(true);
        let mut extended_dynamic_state =
            vk::PhysicalDeviceExtendedDynamicStateFeaturesEXT::default()
                .extended_dynamic_state(true);
        let mut dynamic_rendering =
            vk::PhysicalDeviceDynamicRenderingFeatures::default().dynamic_rendering(true);
        let mut descriptor_indexing =
            vk::PhysicalDeviceDescriptorIndexingFeatures::default()
                .shader_uniform_buffer_array_non_uniform_indexing(true)
                .shader_sampled_image_array_non_uniform_indexing(true)
                .shader_storage_buffer_array_non_uniform_indexing(true)
                .shader_storage_image_array_non_uniform_indexing(true)
                .descriptor_binding_uniform_buffer_update_after_bind(true)
                .descriptor_binding_sampled_image_update_after_bind(true)
                .descriptor_binding_storage_image_update_after_bind(true)
                .descriptor_binding_storage_buffer_update_after_bind(true)
                .descriptor_binding_uniform_texel_buffer_update_after_bind(true)
                .descriptor_binding_storage_texel_buffer_update_after_bind(true)
                .descriptor_binding_update_unused_while_pending(true)
                .descriptor_binding_partially_bound(true)
                .descriptor_binding_variable_descriptor_count(true)
                .runtime_descriptor_array(true);

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extensions)
            .enabled_features(&features)
            .push_next(&mut separate_depth_stencil)
            .push_next(&mut extended_dynamic_state)
            .push_next(&mut dynamic_rendering)
            .push_next(&mut descriptor_indexing);

        let device =
            unsafe { instance.create_device(phy_dev.raw, &create_info, None) }.status()?;

        let queue = unsafe { device.get_device_queue(queue_family, 0) };
        let swapchain_loader = ash::khr::swapchain::Device::new(instance, &device);
        let dynamic_rendering_loader = ash::khr::dynamic_rendering::Device::new(instance, &device);
        let extended_dynamic_state_loader =
            ash::ext::extended_dynamic_state::Device::new(instance, &device);
        let debug_utils = self
            .shared
            .debug_utils
            .as_ref()
            .map(|_| ash::ext::debug_utils::Device::new(instance, &device));

        let shared = Arc::new(DeviceShared {
            instance: Arc::clone(&self.shared),
            phy_dev,
            device,
            queue_family,
            queue,
            swapchain_loader,
            dynamic_rendering: dynamic_rendering_loader,
            extended_dynamic_state: extended_dynamic_state_loader,
            debug_utils,
        });

        Device::new(shared, buffering)
    }
}

fn check_device_limits(limits: &vk::PhysicalDeviceLimits) {
    assert!(limits.max_image_dimension1_d >= crate::MAX_IMAGE_EXTENT_1D);
    assert!(limits.max_image_dimension2_d >= crate::MAX_IMAGE_EXTENT_2D);
    assert!(limits.max_image_dimension3_d >= crate::MAX_IMAGE_EXTENT_3D);
    assert!(limits.max_image_dimension_cube >= crate::MAX_IMAGE_EXTENT_CUBE);
    assert!(limits.max_image_array_layers >= crate::MAX_IMAGE_ARRAY_LAYERS);
    assert!(limits.max_viewport_dimensions[0] >= crate::MAX_VIEWPORT_EXTENT);
    assert!(limits.max_viewport_dimensions[1] >= crate::MAX_VIEWPORT_EXTENT);
    assert!(limits.max_framebuffer_width >= crate::MAX_FRAMEBUFFER_EXTENT);
    assert!(limits.max_framebuffer_height >= crate::MAX_FRAMEBUFFER_EXTENT);
    assert!(limits.max_framebuffer_layers >= crate::MAX_FRAMEBUFFER_LAYERS);
    assert!(limits.max_push_constants_size >= crate::MAX_PUSH_CONSTANTS_SIZE);
    assert!(limits.max_bound_descriptor_sets >= crate::MAX_PIPELINE_DESCRIPTOR_SETS);
    assert!(limits.max_color_attachments >= crate::MAX_PIPELINE_COLOR_ATTACHMENTS);
    assert!(limits.max_sampler_anisotropy >= crate::MAX_SAMPLER_ANISOTROPY);
    assert!(limits.max_uniform_buffer_range as u64 >= crate::MAX_UNIFORM_BUFFER_RANGE);
    assert!(
        limits.max_descriptor_set_uniform_buffers_dynamic
            >= crate::MAX_PIPELINE_DYNAMIC_UNIFORM_BUFFERS
    );
    assert!(
        limits.max_descriptor_set_storage_buffers_dynamic
            >= crate::MAX_PIPELINE_DYNAMIC_STORAGE_BUFFERS
    );
    assert!(limits.max_vertex_input_attributes >= crate::MAX_VERTEX_ATTRIBUTES);
}

fn check_device_features(features: &vk::PhysicalDeviceFeatures) {
    assert!(features.image_cube_array == vk::TRUE);
    assert!(features.multi_draw_indirect == vk::TRUE);
    assert!(features.draw_indirect_first_instance == vk::TRUE);
    assert!(features.sampler_anisotropy == vk::TRUE);
    assert!(features.shader_uniform_buffer_array_dynamic_indexing == vk::TRUE);
    assert!(features.shader_sampled_image_array_dynamic_indexing == vk::TRUE);
    assert!(features.shader_storage_buffer_array_dynamic_indexing == vk::TRUE);
    assert!(features.shader_storage_image_array_dynamic_indexing == vk::TRUE);
}
