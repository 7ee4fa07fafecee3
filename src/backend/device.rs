// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with validation layers
// - Physical device selection (prefer discrete GPU, require NV ray tracing)
// - Logical device + queue creation with the ray-tracing extension set
// - Memory allocator setup

use anyhow::{Context, Result};
use ash::extensions::nv::RayTracing;
use ash::{vk, Entry};
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use parking_lot::{Mutex, MutexGuard};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{CStr, CString};
use std::mem::ManuallyDrop;
use std::sync::Arc;

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    // Allocator is torn down explicitly before the device in Drop
    allocator: ManuallyDrop<Mutex<Allocator>>,
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: ash::Instance,
    pub entry: Entry,

    // Queue handles
    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,

    // Ray tracing extension + queried limits
    pub ray_tracing: RayTracing,
    pub ray_tracing_properties: vk::PhysicalDeviceRayTracingPropertiesNV,

    /// Variable-count descriptor arrays need this; checked before the
    /// per-mesh storage array path is taken.
    pub supports_descriptor_indexing: bool,

    // Debug utils (if validation enabled)
    debug_utils: Option<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,

    // Device properties (cached for performance)
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl VulkanDevice {
    /// Create Vulkan device
    ///
    /// # Arguments
    /// * `app_name` - Application name for debugging
    /// * `enable_validation` - Enable Vulkan validation layers (debug only)
    /// * `display_handle` - Used to pick the platform surface extensions
    pub fn new(
        app_name: &str,
        enable_validation: bool,
        display_handle: RawDisplayHandle,
    ) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan device: {}", app_name);

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        // Step 2: Create instance
        let instance = Self::create_instance(&entry, app_name, enable_validation, display_handle)?;

        // Step 3: Setup debug messenger if validation enabled
        let debug_utils = if enable_validation {
            Some(Self::setup_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        // Step 4: Pick physical device (GPU)
        let (physical_device, graphics_queue_family) = Self::pick_physical_device(&instance)?;

        // Step 5: Query optional descriptor indexing support
        let supports_descriptor_indexing =
            Self::query_descriptor_indexing(&instance, physical_device);

        // Step 6: Create logical device
        let (device, graphics_queue) = Self::create_logical_device(
            &instance,
            physical_device,
            graphics_queue_family,
            supports_descriptor_indexing,
        )?;

        // Step 7: Cache device properties
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        // Step 8: Ray tracing extension loader + limits
        let ray_tracing = RayTracing::new(&instance, &device);
        let ray_tracing_properties =
            unsafe { RayTracing::get_properties(&instance, physical_device) };
        log::info!(
            "Shader group handle size: {} bytes, max recursion: {}",
            ray_tracing_properties.shader_group_handle_size,
            ray_tracing_properties.max_recursion_depth
        );

        // Step 9: Create memory allocator
        let allocator = Self::create_allocator(&instance, physical_device, &device)?;

        Ok(Arc::new(Self {
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            device,
            physical_device,
            instance,
            entry,
            graphics_queue,
            graphics_queue_family,
            ray_tracing,
            ray_tracing_properties,
            supports_descriptor_indexing,
            debug_utils,
            properties,
            memory_properties,
        }))
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        enable_validation: bool,
        display_handle: RawDisplayHandle,
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = CString::new("No Engine")?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_1);

        // Surface extensions for the current platform, plus debug utils
        let mut extensions = ash_window::enumerate_required_extensions(display_handle)
            .context("No surface extensions for this display")?
            .to_vec();
        if enable_validation {
            extensions.push(ash::extensions::ext::DebugUtils::name().as_ptr());
        }

        // Validation layers
        let layer_names = if enable_validation {
            vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        Ok(instance)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::extensions::ext::DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }?;

        Ok((debug_utils, messenger))
    }

    fn pick_physical_device(instance: &ash::Instance) -> Result<(vk::PhysicalDevice, u32)> {
        let devices = unsafe { instance.enumerate_physical_devices() }?;

        if devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }

        // Score each device
        let mut best_device = None;
        let mut best_score = 0;

        for device in devices {
            let props = unsafe { instance.get_physical_device_properties(device) };

            if !Self::supports_ray_tracing(instance, device)? {
                continue;
            }

            // Find graphics queue family
            let queue_families =
                unsafe { instance.get_physical_device_queue_family_properties(device) };

            let graphics_family = queue_families
                .iter()
                .enumerate()
                .find(|(_, props)| props.queue_flags.contains(vk::QueueFlags::GRAPHICS))
                .map(|(i, _)| i as u32);

            if let Some(graphics_family) = graphics_family {
                // Score device (prefer discrete GPU)
                let score = match props.device_type {
                    vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
                    vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
                    _ => 1,
                };

                if score > best_score {
                    best_score = score;
                    best_device = Some((device, graphics_family));
                }
            }
        }

        best_device.ok_or_else(|| anyhow::anyhow!("No GPU with VK_NV_ray_tracing found"))
    }

    fn supports_ray_tracing(instance: &ash::Instance, device: vk::PhysicalDevice) -> Result<bool> {
        let available = unsafe { instance.enumerate_device_extension_properties(device) }?;
        Ok(available.iter().any(|ext| {
            let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
            name == RayTracing::name()
        }))
    }

    fn query_descriptor_indexing(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
    ) -> bool {
        let mut indexing = vk::PhysicalDeviceDescriptorIndexingFeatures::default();
        let mut features2 = vk::PhysicalDeviceFeatures2::builder()
            .push_next(&mut indexing)
            .build();
        unsafe { instance.get_physical_device_features2(physical_device, &mut features2) };

        indexing.runtime_descriptor_array == vk::TRUE
            && indexing.descriptor_binding_variable_descriptor_count == vk::TRUE
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        graphics_queue_family: u32,
        enable_descriptor_indexing: bool,
    ) -> Result<(ash::Device, vk::Queue)> {
        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(graphics_queue_family)
            .queue_priorities(&queue_priorities)
            .build();

        // Required device extensions; descriptor indexing needs maintenance3,
        // the ray-tracing extension needs get_memory_requirements2
        let extensions = vec![
            ash::extensions::khr::Swapchain::name().as_ptr(),
            RayTracing::name().as_ptr(),
            vk::KhrGetMemoryRequirements2Fn::name().as_ptr(),
            vk::ExtDescriptorIndexingFn::name().as_ptr(),
            vk::KhrMaintenance3Fn::name().as_ptr(),
        ];

        let mut indexing_features = vk::PhysicalDeviceDescriptorIndexingFeatures::builder()
            .runtime_descriptor_array(enable_descriptor_indexing)
            .descriptor_binding_variable_descriptor_count(enable_descriptor_indexing)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extensions)
            .push_next(&mut indexing_features);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };

        Ok((device, graphics_queue))
    }

    fn create_allocator(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: &ash::Device,
    ) -> Result<Allocator> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        Ok(allocator)
    }

    /// Lock the allocator for an allocation or free
    pub fn allocator(&self) -> MutexGuard<'_, Allocator> {
        self.allocator.lock()
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        // Wait for device to finish
        let _ = self.wait_idle();

        // Cleanup in reverse order; the allocator still frees through the
        // device, so it goes first
        unsafe {
            ManuallyDrop::drop(&mut self.allocator);

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
