//! Owned-or-borrowed Vulkan context.
//!
//! The staging backend either creates a minimal context of its own or
//! borrows externally supplied handles. Ownership is recorded per handle;
//! drop waits for the device to go idle and then destroys only what this
//! context created, in reverse creation order (command pool, device,
//! instance). Borrowed handles are never destroyed.

use ash::vk;

use crate::error::RuntimeError;

/// Raw handles supplied by an embedding renderer.
///
/// `queue` may be null (the queue is then fetched from `queue_family`);
/// `command_pool` may be null (a pool is then created and owned here).
/// Instance, physical device and device are required.
#[derive(Debug, Clone, Copy)]
pub struct ExternalHandles {
    pub instance: vk::Instance,
    pub physical: vk::PhysicalDevice,
    pub device: vk::Device,
    pub queue: vk::Queue,
    pub queue_family: u32,
    pub command_pool: vk::CommandPool,
}

/// Vulkan device context used by the staging backend.
pub struct GpuContext {
    // Keeps the loader library alive for the function tables below.
    _entry: ash::Entry,
    instance: ash::Instance,
    physical: vk::PhysicalDevice,
    device: ash::Device,
    queue: vk::Queue,
    queue_family: u32,
    command_pool: vk::CommandPool,
    memory_props: vk::PhysicalDeviceMemoryProperties,
    owns_instance: bool,
    owns_device: bool,
    owns_pool: bool,
}

impl GpuContext {
    /// Creates a minimal owned context: first physical device with a
    /// transfer-capable queue family, one queue, one command pool.
    pub fn create_minimal() -> Result<Self, RuntimeError> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| RuntimeError::DeviceInit(format!("Vulkan loader unavailable: {e}")))?;

        let app_info = vk::ApplicationInfo::default().api_version(vk::API_VERSION_1_1);
        let instance_info = vk::InstanceCreateInfo::default().application_info(&app_info);
        let instance = unsafe { entry.create_instance(&instance_info, None) }
            .map_err(|e| RuntimeError::DeviceInit(format!("instance creation failed: {e}")))?;

        let picked = unsafe { instance.enumerate_physical_devices() }
            .ok()
            .and_then(|devices| {
                devices.into_iter().find_map(|physical| {
                    let families =
                        unsafe { instance.get_physical_device_queue_family_properties(physical) };
                    families
                        .iter()
                        .position(|family| {
                            family.queue_flags.intersects(
                                vk::QueueFlags::TRANSFER
                                    | vk::QueueFlags::GRAPHICS
                                    | vk::QueueFlags::COMPUTE,
                            )
                        })
                        .map(|index| (physical, index as u32))
                })
            });
        let Some((physical, queue_family)) = picked else {
            unsafe { instance.destroy_instance(None) };
            return Err(RuntimeError::DeviceInit(
                "no physical device with a transfer-capable queue family".to_string(),
            ));
        };

        let priorities = [1.0f32];
        let queue_info = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&priorities);
        let device_info =
            vk::DeviceCreateInfo::default().queue_create_infos(std::slice::from_ref(&queue_info));
        let device = match unsafe { instance.create_device(physical, &device_info, None) } {
            Ok(device) => device,
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(RuntimeError::DeviceInit(format!(
                    "device creation failed: {e}"
                )));
            }
        };

        let queue = unsafe { device.get_device_queue(queue_family, 0) };
        let pool_info = vk::CommandPoolCreateInfo::default().queue_family_index(queue_family);
        let command_pool = match unsafe { device.create_command_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe {
                    device.destroy_device(None);
                    instance.destroy_instance(None);
                }
                return Err(RuntimeError::DeviceInit(format!(
                    "command pool creation failed: {e}"
                )));
            }
        };

        let memory_props = unsafe { instance.get_physical_device_memory_properties(physical) };

        tracing::info!("gpu context created (owned device, queue family {queue_family})");

        Ok(Self {
            _entry: entry,
            instance,
            physical,
            device,
            queue,
            queue_family,
            command_pool,
            memory_props,
            owns_instance: true,
            owns_device: true,
            owns_pool: true,
        })
    }

    /// Wraps externally owned handles. The context never destroys the
    /// instance or device; a command pool is created (and owned) only when
    /// `external.command_pool` is null.
    ///
    /// # Safety
    ///
    /// The handles must be valid, belong to the same device, and outlive
    /// the context.
    pub unsafe fn from_external(external: ExternalHandles) -> Result<Self, RuntimeError> {
        if external.instance == vk::Instance::null()
            || external.physical == vk::PhysicalDevice::null()
            || external.device == vk::Device::null()
        {
            return Err(RuntimeError::DeviceInit(
                "external context requires instance, physical device and device handles"
                    .to_string(),
            ));
        }

        let entry = ash::Entry::load()
            .map_err(|e| RuntimeError::DeviceInit(format!("Vulkan loader unavailable: {e}")))?;
        let instance = ash::Instance::load(entry.static_fn(), external.instance);
        let device = ash::Device::load(instance.fp_v1_0(), external.device);

        let queue = if external.queue == vk::Queue::null() {
            device.get_device_queue(external.queue_family, 0)
        } else {
            external.queue
        };

        let (command_pool, owns_pool) = if external.command_pool == vk::CommandPool::null() {
            let pool_info =
                vk::CommandPoolCreateInfo::default().queue_family_index(external.queue_family);
            let pool = device.create_command_pool(&pool_info, None).map_err(|e| {
                RuntimeError::DeviceInit(format!("command pool creation failed: {e}"))
            })?;
            (pool, true)
        } else {
            (external.command_pool, false)
        };

        let memory_props = instance.get_physical_device_memory_properties(external.physical);

        tracing::info!(
            "gpu context wrapping external device (queue family {})",
            external.queue_family
        );

        Ok(Self {
            _entry: entry,
            instance,
            physical: external.physical,
            device,
            queue,
            queue_family: external.queue_family,
            command_pool,
            memory_props,
            owns_instance: false,
            owns_device: false,
            owns_pool,
        })
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn physical(&self) -> vk::PhysicalDevice {
        self.physical
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    pub fn memory_props(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_props
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            // Outstanding copies must retire before any teardown.
            let _ = self.device.device_wait_idle();
            if self.owns_pool {
                self.device.destroy_command_pool(self.command_pool, None);
            }
            if self.owns_device {
                self.device.destroy_device(None);
            }
            if self.owns_instance {
                self.instance.destroy_instance(None);
            }
        }
    }
}

// SAFETY: all mutation of the queue and command pool is serialized by the
// backend's submission mutex; the remaining fields are read-only after
// construction.
unsafe impl Send for GpuContext {}
unsafe impl Sync for GpuContext {}
