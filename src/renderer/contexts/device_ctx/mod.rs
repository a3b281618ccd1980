pub mod instance;
pub mod device;
pub mod queue;
pub mod surface;
pub mod swapchain;
pub mod target;
pub mod transfer_ctx;

use color_eyre::Result;
use winit::window::Window;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::instance::{DebugMessenger, RenderInstance};
use crate::renderer::contexts::device_ctx::surface::RenderSurface;
use crate::renderer::contexts::resource_ctx::memory::VulkanMemory;

/// Responsibilities:
/// - Manage the Vulkan instance, surface, device, and queue
/// - Own the memory facade every buffer and image is created through
///
/// Fields drop in declaration order: allocator, device, debug messenger, surface, instance.
pub struct RenderDeviceContext {
    pub memory: VulkanMemory,
    pub device: RenderDevice,
    debug_messenger: Option<DebugMessenger>,
    pub surface: RenderSurface,
    pub instance: RenderInstance,
}

impl RenderDeviceContext {
    pub fn new(
        window: &Window,
        config: &RenderConfig,
    ) -> Result<Self> {
        let instance = RenderInstance::new(window, config)?;
        let debug_messenger = instance.create_debug_messenger()?;
        let surface = instance.create_surface(window)?;
        let device = RenderDevice::new(&instance, &surface)?;
        let memory = device.create_memory(&instance)?;

        Ok(Self {
            memory,
            device,
            debug_messenger,
            surface,
            instance,
        })
    }
}
