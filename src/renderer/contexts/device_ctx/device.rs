use std::ffi::{c_char, CStr};
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::contexts::device_ctx::queue::{Queue, QueueFamily};
use crate::renderer::contexts::device_ctx::surface::RenderSurface;
use crate::renderer::contexts::device_ctx::transfer_ctx::TransferContext;
use crate::renderer::contexts::resource_ctx::memory::VulkanMemory;

/// Candidates for the depth attachment, in order of preference
const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Logical device with its single graphics queue
pub struct RenderDevice {
    pub logical: Arc<ash::Device>,
    pub physical: vk::PhysicalDevice,

    // The graphics queue also presents
    pub graphics_queue: Arc<Queue>,

    pub depth_format: vk::Format,
    pub max_sampler_anisotropy: f32,
}

impl RenderDevice {
    pub fn new(
        instance: &RenderInstance,
        surface: &RenderSurface,
    ) -> Result<Self> {
        let (physical_device, graphics_queue_family) = Self::select_physical_device(
            &instance.instance,
            surface,
        )?;

        let properties = unsafe {
            instance.instance.get_physical_device_properties(physical_device)
        };
        if let Ok(name) = properties.device_name_as_c_str() {
            log::info!("Selected physical device {:?}", name);
        }

        let depth_format = Self::find_depth_format(&instance.instance, physical_device)?;
        log::debug!("Depth attachment format: {:?}", depth_format);

        let (logical_device, graphics_queue) = Self::create_logical_device(
            &instance.instance,
            &physical_device,
            graphics_queue_family,
        )?;

        Ok(Self {
            logical: Arc::new(logical_device),
            physical: physical_device,

            graphics_queue: Arc::new(graphics_queue),

            depth_format,
            max_sampler_anisotropy: properties.limits.max_sampler_anisotropy,
        })
    }

    /// Creates the allocator-backed memory facade that owns every buffer and image
    pub fn create_memory(&self, instance: &RenderInstance) -> Result<VulkanMemory> {
        let memory_allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.instance.clone(),
            device: (*self.logical).clone(),
            physical_device: self.physical,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        let transfer_context = TransferContext::new(
            self.graphics_queue.clone(),
            self.logical.clone(),
        )?;

        Ok(VulkanMemory::new(
            memory_allocator,
            transfer_context,
            self.logical.clone(),
        ))
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.logical.device_wait_idle()?;
        }
        Ok(())
    }

    fn find_depth_format(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
    ) -> Result<vk::Format> {
        DEPTH_FORMAT_CANDIDATES
            .into_iter()
            .find(|format| {
                let props = unsafe {
                    instance.get_physical_device_format_properties(physical_device, *format)
                };
                props.optimal_tiling_features
                    .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
            })
            .ok_or_eyre("No supported depth attachment format")
    }

    fn select_physical_device(
        instance: &ash::Instance,
        surface: &RenderSurface,
    ) -> Result<(vk::PhysicalDevice, QueueFamily)> {
        let candidates = unsafe { instance.enumerate_physical_devices()? }
            .into_iter()
            .filter_map(|device| Self::inspect_device(instance, surface, device))
            .collect::<Vec<_>>();
        log::debug!("{} suitable physical device(s)", candidates.len());

        pick_candidate(candidates)
            .map(|candidate| (candidate.device, candidate.queue_family))
            .ok_or_eyre("No suitable physical device found")
    }

    /// Returns `None` when the device cannot render to `surface`
    fn inspect_device(
        instance: &ash::Instance,
        surface: &RenderSurface,
        device: vk::PhysicalDevice,
    ) -> Option<DeviceCandidate> {
        let supported_exts = unsafe {
            instance.enumerate_device_extension_properties(device)
        }.ok()?;
        let supported_exts = supported_exts
            .iter()
            .filter_map(|ext| ext.extension_name_as_c_str().ok())
            .collect::<Vec<_>>();
        if let Some(missing) = Self::get_required_device_extensions()
            .into_iter()
            .find(|req| !supported_exts.contains(req))
        {
            log::debug!("Skipping device without {:?}", missing);
            return None;
        }

        let features = unsafe { instance.get_physical_device_features(device) };
        if features.sampler_anisotropy != vk::TRUE {
            return None;
        }

        let queue_family = unsafe { instance.get_physical_device_queue_family_properties(device) }
            .into_iter()
            .enumerate()
            .map(|(i, props)| QueueFamily::new(i as u32, props))
            .find(|family| family.supports_graphics() && surface.supports_present(device, family.index))?;
        if !surface.is_adequate(device) {
            return None;
        }

        let properties = unsafe { instance.get_physical_device_properties(device) };
        Some(DeviceCandidate {
            device,
            queue_family,
            device_type: properties.device_type,
        })
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: &vk::PhysicalDevice,
        graphics_queue_family: QueueFamily,
    ) -> Result<(ash::Device, Queue)> {
        let queue_priorities = [1.0];
        let queue_create_infos = [
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_queue_family.index)
                .queue_priorities(&queue_priorities),
        ];

        let device = {
            let enabled_extension_names = Self::get_required_device_extensions()
                .iter()
                .map(|ext| ext.as_ptr())
                .collect::<Vec<*const c_char>>();
            let enabled_features = vk::PhysicalDeviceFeatures::default()
                .sampler_anisotropy(true);

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&enabled_extension_names)
                .enabled_features(&enabled_features);

            unsafe {
                instance.create_device(*physical_device, &device_create_info, None)?
            }
        };

        let graphics_queue = unsafe {
            let queue = device.get_device_queue(graphics_queue_family.index, 0);
            Queue::new(graphics_queue_family, queue)
        };

        Ok((device, graphics_queue))
    }

    fn get_required_device_extensions() -> Vec<&'static CStr> {
        vec![
            ash::khr::swapchain::NAME,

            #[cfg(target_os = "macos")]
            ash::khr::portability_subset::NAME,
        ]
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        unsafe {
            self.logical.destroy_device(None);
        }
    }
}

struct DeviceCandidate {
    device: vk::PhysicalDevice,
    queue_family: QueueFamily,
    device_type: vk::PhysicalDeviceType,
}

fn device_type_rank(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 3,
        _ => 4,
    }
}

/// Prefers discrete GPUs, then the first enumerated device among equals
fn pick_candidate(candidates: Vec<DeviceCandidate>) -> Option<DeviceCandidate> {
    candidates
        .into_iter()
        .enumerate()
        .min_by_key(|(i, candidate)| (device_type_rank(candidate.device_type), *i))
        .map(|(_, candidate)| candidate)
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;
    use super::*;

    fn candidate(raw: u64, device_type: vk::PhysicalDeviceType) -> DeviceCandidate {
        DeviceCandidate {
            device: vk::PhysicalDevice::from_raw(raw),
            queue_family: QueueFamily::new(0, vk::QueueFamilyProperties::default()),
            device_type,
        }
    }

    #[test]
    fn discrete_gpu_wins() {
        let picked = pick_candidate(vec![
            candidate(1, vk::PhysicalDeviceType::INTEGRATED_GPU),
            candidate(2, vk::PhysicalDeviceType::DISCRETE_GPU),
            candidate(3, vk::PhysicalDeviceType::CPU),
        ]);
        assert_eq!(picked.map(|c| c.device.as_raw()), Some(2));
    }

    #[test]
    fn first_device_wins_among_equals() {
        let picked = pick_candidate(vec![
            candidate(7, vk::PhysicalDeviceType::INTEGRATED_GPU),
            candidate(8, vk::PhysicalDeviceType::INTEGRATED_GPU),
        ]);
        assert_eq!(picked.map(|c| c.device.as_raw()), Some(7));
    }

    #[test]
    fn no_candidates_no_device() {
        assert!(pick_candidate(Vec::new()).is_none());
    }
}
