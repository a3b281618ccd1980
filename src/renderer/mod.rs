pub mod camera;
pub mod config;
pub mod error;
pub mod scene;
pub mod shader_data;

pub(crate) mod contexts;
pub(crate) mod resources;

pub use contexts::resource_ctx::SceneDesc;

use std::sync::Arc;
use std::time::Instant;
use color_eyre::Result;
use winit::window::Window;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::target::RenderTarget;
use crate::renderer::contexts::device_ctx::RenderDeviceContext;
use crate::renderer::contexts::frame_ctx::frame::FrameTarget;
use crate::renderer::contexts::frame_ctx::slot::FrameSlot;
use crate::renderer::contexts::frame_ctx::{FrameBackend, FrameOutcome, FramePacer, RenderFrameContext};
use crate::renderer::contexts::pipeline_ctx::render_pass::RenderPass;
use crate::renderer::contexts::pipeline_ctx::RenderPipelineContext;
use crate::renderer::contexts::resource_ctx::descriptors::DescriptorManager;
use crate::renderer::contexts::resource_ctx::RenderResourceContext;
use crate::renderer::error::{AcquiredImage, SurfaceStatus};
use crate::renderer::scene::AnimationClock;

pub struct Renderer {
    pacer: FramePacer,
    contexts: RenderContexts,
}

/// Every context the frame loop touches.
/// Fields drop in declaration order, which is the reverse of their dependencies.
struct RenderContexts {
    frm: RenderFrameContext,
    target: RenderTarget,
    res: RenderResourceContext,
    pip: RenderPipelineContext,
    descriptors: DescriptorManager,
    render_pass: RenderPass,
    dev: RenderDeviceContext,

    window: Arc<Window>,
    config: RenderConfig,
    clock: AnimationClock,
}

impl Renderer {
    pub fn new(
        window: Arc<Window>,
        config: RenderConfig,
        scene: &SceneDesc,
    ) -> Result<Self> {
        let dev = RenderDeviceContext::new(&window, &config)?;
        let device = dev.device.logical.clone();

        let color_format = dev.surface.query_support(dev.device.physical)?.format.format;
        let render_pass = RenderPass::new(color_format, dev.device.depth_format, device.clone())?;

        let mut target = RenderTarget::new(render_pass.render_pass);
        target.recreate(
            &*window,
            &dev.surface,
            &dev.instance,
            &dev.device,
            &dev.memory,
        )?;

        let mut descriptors = DescriptorManager::new(device.clone())?;
        let pip = RenderPipelineContext::new(
            &config,
            &descriptors.layouts.in_set_order(),
            render_pass.render_pass,
            device.clone(),
        )?;
        let res = RenderResourceContext::new(scene, &dev, &mut descriptors)?;
        let frm = RenderFrameContext::new(dev.device.graphics_queue.family.index, device)?;

        Ok(Self {
            pacer: FramePacer::new(),
            contexts: RenderContexts {
                frm,
                target,
                res,
                pip,
                descriptors,
                render_pass,
                dev,

                window,
                config,
                clock: AnimationClock::default(),
            },
        })
    }

    pub fn request_resize(&mut self) {
        self.pacer.request_resize();
    }

    pub fn draw(&mut self) -> Result<()> {
        match self.pacer.draw_frame(&mut self.contexts)? {
            FrameOutcome::Presented { slot, image_index } => {
                log::trace!("Presented image {} from slot {}", image_index, slot.index());
            }
            FrameOutcome::Skipped => {
                log::trace!("Skipped frame while the render target was rebuilt");
            }
        }
        Ok(())
    }
}

impl FrameBackend for RenderContexts {
    fn wait_for_slot(&mut self, slot: FrameSlot) -> Result<()> {
        self.frm.frame(slot).wait(&self.dev.device.logical)
    }

    fn acquire_image(&mut self, slot: FrameSlot) -> Result<AcquiredImage> {
        let acquired = self.target
            .swapchain()?
            .acquire_next_image(self.frm.frame(slot).image_available)?;
        if acquired == AcquiredImage::OutOfDate {
            log::warn!("Swapchain out of date at acquire");
        }
        Ok(acquired)
    }

    fn reset_slot(&mut self, slot: FrameSlot) -> Result<()> {
        self.frm.frame(slot).reset(&self.dev.device.logical)
    }

    fn update(&mut self, slot: FrameSlot) -> Result<()> {
        let elapsed_secs = self.clock.elapsed_secs(Instant::now());
        self.res.scene.update(slot, self.target.extent(), elapsed_secs)
    }

    fn record(&mut self, slot: FrameSlot, image_index: u32) -> Result<()> {
        let groups = self.res.scene.render_groups(&self.res.registry, &self.descriptors.table, slot)?;
        let target = FrameTarget {
            render_pass: self.render_pass.render_pass,
            framebuffer: self.target.framebuffer(image_index)?,
            extent: self.target.extent(),
            clear_color: self.config.clear_color,
            clear_depth: self.config.clear_depth,
            pipeline: &self.pip.pipeline,
        };
        self.frm.frame(slot).record(&self.dev.device.logical, &target, &groups)
    }

    fn submit(&mut self, slot: FrameSlot) -> Result<()> {
        self.frm.frame(slot).submit(
            &self.dev.device.logical,
            self.dev.device.graphics_queue.handle,
        )
    }

    fn present(&mut self, slot: FrameSlot, image_index: u32) -> Result<SurfaceStatus> {
        let status = self.target.swapchain()?.present(
            self.dev.device.graphics_queue.handle,
            image_index,
            self.frm.frame(slot).render_finished,
        )?;
        if status.is_stale() {
            log::warn!("Presentation reported a {:?} surface", status);
        }
        Ok(status)
    }

    fn recreate_target(&mut self) -> Result<()> {
        self.target.recreate(
            &*self.window,
            &self.dev.surface,
            &self.dev.instance,
            &self.dev.device,
            &self.dev.memory,
        )
    }
}

impl Drop for RenderContexts {
    fn drop(&mut self) {
        if let Err(err) = self.dev.device.wait_idle() {
            log::error!("Failed to wait for device idle before shutdown: {}", err);
        }
        log::info!("Shutting down renderer");
    }
}
