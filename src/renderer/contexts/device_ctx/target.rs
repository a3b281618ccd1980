use std::sync::Arc;
use std::time::Duration;
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use gpu_allocator::MemoryLocation;
use winit::window::Window;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::contexts::device_ctx::surface::RenderSurface;
use crate::renderer::contexts::device_ctx::swapchain::Swapchain;
use crate::renderer::contexts::resource_ctx::memory::{GpuMemory, ImageDesc, VulkanMemory};
use crate::renderer::resources::image::Image;

/// Lifecycle of the presentation target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Uninitialized,
    Ready,
    Invalidated,
    Destroyed,
}

impl TargetState {
    /// State held while the target is torn down and rebuilt
    fn begin_rebuild(self) -> Result<Self> {
        match self {
            TargetState::Destroyed => Err(eyre!("Render target recreated after destruction")),
            TargetState::Ready => Ok(TargetState::Invalidated),
            other => Ok(other),
        }
    }
}

/// Framebuffer size as reported by the windowing layer
pub trait FramebufferSize {
    fn framebuffer_size(&self) -> vk::Extent2D;

    /// Blocks briefly so the windowing layer can deliver new size events
    fn wait_for_events(&self);
}

impl FramebufferSize for Window {
    fn framebuffer_size(&self) -> vk::Extent2D {
        let size = self.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }

    fn wait_for_events(&self) {
        std::thread::sleep(Duration::from_millis(16));
    }
}

/// Blocks while the framebuffer has no area, e.g. while the window is minimized
pub fn wait_for_nonzero_extent<S: FramebufferSize + ?Sized>(size: &S) -> vk::Extent2D {
    let mut extent = size.framebuffer_size();
    while extent.width == 0 || extent.height == 0 {
        size.wait_for_events();
        extent = size.framebuffer_size();
    }
    extent
}

/// Runs `build` only once the framebuffer has a nonzero size
pub fn recreate_when_visible<S, T, F>(size: &S, build: F) -> Result<T>
where
    S: FramebufferSize + ?Sized,
    F: FnOnce(vk::Extent2D) -> Result<T>,
{
    let extent = wait_for_nonzero_extent(size);
    build(extent)
}

/// Everything that has to be rebuilt when the surface changes size
struct TargetResources {
    framebuffers: Vec<vk::Framebuffer>,
    depth: Image,
    swapchain: Swapchain,

    device: Arc<ash::Device>,
}

impl Drop for TargetResources {
    fn drop(&mut self) {
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                self.device.destroy_framebuffer(framebuffer, None);
            }
        }
    }
}

/// Presentation target: swapchain, its views, the shared depth buffer and one framebuffer per image
pub struct RenderTarget {
    state: TargetState,
    resources: Option<TargetResources>,
    render_pass: vk::RenderPass,
}

impl RenderTarget {
    pub fn new(render_pass: vk::RenderPass) -> Self {
        Self {
            state: TargetState::Uninitialized,
            resources: None,
            render_pass,
        }
    }

    pub fn state(&self) -> TargetState {
        self.state
    }

    /// Builds the target for the first time or rebuilds it after the surface went stale.
    /// Blocks until the framebuffer is visible and the device has finished all submitted work.
    pub fn recreate(
        &mut self,
        size: &dyn FramebufferSize,
        surface: &RenderSurface,
        ins: &RenderInstance,
        dev: &RenderDevice,
        memory: &VulkanMemory,
    ) -> Result<()> {
        self.state = self.state.begin_rebuild()?;

        let render_pass = self.render_pass;
        let resources = &mut self.resources;
        recreate_when_visible(size, |extent| {
            dev.wait_idle()?;
            // The old swapchain has to be gone before the surface accepts a new one
            *resources = None;
            *resources = Some(TargetResources::new(extent, render_pass, surface, ins, dev, memory)?);
            Ok(())
        })?;

        self.state = TargetState::Ready;
        if let Some(res) = &self.resources {
            log::info!(
                "Render target ready at {}x{} with {} images",
                res.swapchain.swapchain_image_extent.width,
                res.swapchain.swapchain_image_extent.height,
                res.swapchain.swapchain_images.len(),
            );
        }
        Ok(())
    }

    pub fn destroy(&mut self) {
        self.resources = None;
        self.state = TargetState::Destroyed;
    }

    pub fn swapchain(&self) -> Result<&Swapchain> {
        self.resources
            .as_ref()
            .map(|res| &res.swapchain)
            .ok_or_eyre("Render target is not ready")
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.resources
            .as_ref()
            .map(|res| res.swapchain.swapchain_image_extent)
            .unwrap_or_default()
    }

    pub fn framebuffer(&self, image_index: u32) -> Result<vk::Framebuffer> {
        self.resources
            .as_ref()
            .and_then(|res| res.framebuffers.get(image_index as usize))
            .copied()
            .ok_or_else(|| eyre!("No framebuffer for swapchain image {}", image_index))
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl TargetResources {
    fn new(
        extent: vk::Extent2D,
        render_pass: vk::RenderPass,
        surface: &RenderSurface,
        ins: &RenderInstance,
        dev: &RenderDevice,
        memory: &VulkanMemory,
    ) -> Result<Self> {
        let swapchain = Swapchain::new(extent, surface, ins, dev)?;
        let extent = swapchain.swapchain_image_extent;

        let depth = memory.create_image(&ImageDesc {
            name: "Depth buffer",
            extent,
            format: dev.depth_format,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect: depth_aspect(dev.depth_format),
            location: MemoryLocation::GpuOnly,
        })?;
        memory.transition_image_layout(
            &depth,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )?;

        let mut resources = Self {
            framebuffers: Vec::with_capacity(swapchain.swapchain_image_views.len()),
            depth,
            swapchain,

            device: dev.logical.clone(),
        };
        for view in &resources.swapchain.swapchain_image_views {
            let attachments = [*view, resources.depth.view];
            let info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            let framebuffer = unsafe { dev.logical.create_framebuffer(&info, None)? };
            resources.framebuffers.push(framebuffer);
        }

        Ok(resources)
    }
}

fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::DEPTH,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use super::*;

    /// Reports queued sizes one per query and repeats the last one
    struct ScriptedWindow {
        sizes: RefCell<VecDeque<vk::Extent2D>>,
        waits: Cell<usize>,
    }

    impl ScriptedWindow {
        fn new(sizes: &[(u32, u32)]) -> Self {
            Self {
                sizes: RefCell::new(
                    sizes
                        .iter()
                        .map(|&(width, height)| vk::Extent2D { width, height })
                        .collect(),
                ),
                waits: Cell::new(0),
            }
        }
    }

    impl FramebufferSize for ScriptedWindow {
        fn framebuffer_size(&self) -> vk::Extent2D {
            let mut sizes = self.sizes.borrow_mut();
            if sizes.len() > 1 {
                sizes.pop_front().unwrap_or_default()
            } else {
                sizes.front().copied().unwrap_or_default()
            }
        }

        fn wait_for_events(&self) {
            self.waits.set(self.waits.get() + 1);
        }
    }

    #[test]
    fn recreation_blocks_while_minimized() {
        let window = ScriptedWindow::new(&[(0, 0), (0, 0), (640, 0), (640, 480)]);
        let built = Cell::new(false);

        let extent = recreate_when_visible(&window, |extent| {
            assert_eq!(window.waits.get(), 3);
            built.set(true);
            Ok(extent)
        }).unwrap();

        assert!(built.get());
        assert_eq!(extent, vk::Extent2D { width: 640, height: 480 });
    }

    #[test]
    fn visible_window_does_not_wait() {
        let window = ScriptedWindow::new(&[(800, 600)]);
        let extent = wait_for_nonzero_extent(&window);
        assert_eq!(extent, vk::Extent2D { width: 800, height: 600 });
        assert_eq!(window.waits.get(), 0);
    }

    #[test]
    fn build_errors_propagate() {
        let window = ScriptedWindow::new(&[(1, 1)]);
        let result: Result<()> = recreate_when_visible(&window, |_| Err(eyre!("device lost")));
        assert!(result.is_err());
    }

    #[test]
    fn rebuild_transitions() {
        assert_eq!(TargetState::Uninitialized.begin_rebuild().unwrap(), TargetState::Uninitialized);
        assert_eq!(TargetState::Ready.begin_rebuild().unwrap(), TargetState::Invalidated);
        assert_eq!(TargetState::Invalidated.begin_rebuild().unwrap(), TargetState::Invalidated);
        assert!(TargetState::Destroyed.begin_rebuild().is_err());
    }

    #[test]
    fn destroyed_target_has_no_swapchain() {
        let mut target = RenderTarget::new(vk::RenderPass::null());
        assert_eq!(target.state(), TargetState::Uninitialized);
        assert!(target.swapchain().is_err());
        assert_eq!(target.extent(), vk::Extent2D::default());

        target.destroy();
        assert_eq!(target.state(), TargetState::Destroyed);
        assert!(target.framebuffer(0).is_err());
    }

    #[test]
    fn stencil_formats_keep_both_aspects() {
        assert_eq!(depth_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert!(depth_aspect(vk::Format::D24_UNORM_S8_UINT).contains(vk::ImageAspectFlags::STENCIL));
    }
}
