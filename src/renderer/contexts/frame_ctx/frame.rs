use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::pipeline_ctx::pipeline::GraphicsPipeline;
use crate::renderer::contexts::pipeline_ctx::RenderPipelineContext;
use crate::renderer::scene::RenderGroup;
use crate::renderer::shader_data::PerDrawData;

/// Synchronization objects and command buffer owned by one frame slot
pub struct Frame {
    pub command_buffer: vk::CommandBuffer,

    // Signals when the acquired swapchain image is ready to be rendered to
    pub image_available: vk::Semaphore,

    // Signals when rendering has finished and the image may be presented
    pub render_finished: vk::Semaphore,

    // Signals when the GPU is done with this slot's submission
    pub in_flight: vk::Fence,
}

/// Everything `Frame::record` needs to fill a command buffer
pub struct FrameTarget<'a> {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
    pub pipeline: &'a GraphicsPipeline,
}

impl Frame {
    pub fn new(
        command_buffer: vk::CommandBuffer,
        device: &ash::Device,
    ) -> Result<Self> {
        let image_available = unsafe {
            device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
        };
        let render_finished = unsafe {
            device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
        };
        // Created signaled so that the first wait on a fresh slot returns immediately
        let in_flight = unsafe {
            device.create_fence(
                &vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED),
                None,
            )?
        };

        Ok(Self {
            command_buffer,
            image_available,
            render_finished,
            in_flight,
        })
    }

    pub fn wait(&self, device: &ash::Device) -> Result<()> {
        unsafe {
            device.wait_for_fences(&[self.in_flight], true, u64::MAX)?;
        }
        Ok(())
    }

    pub fn reset(&self, device: &ash::Device) -> Result<()> {
        unsafe {
            device.reset_fences(&[self.in_flight])?;
            device.reset_command_buffer(
                self.command_buffer,
                vk::CommandBufferResetFlags::empty(),
            )?;
        }
        Ok(())
    }

    pub fn record(
        &self,
        device: &ash::Device,
        target: &FrameTarget,
        groups: &[RenderGroup],
    ) -> Result<()> {
        let cmd = self.command_buffer;
        let begin_info = vk::CommandBufferBeginInfo::default();
        unsafe {
            device.begin_command_buffer(cmd, &begin_info)?;
        }

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: target.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: target.clear_depth,
                    stencil: 0,
                },
            },
        ];
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: target.extent,
        };
        let pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(target.render_pass)
            .framebuffer(target.framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: target.extent.width as f32,
            height: target.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            device.cmd_begin_render_pass(cmd, &pass_info, vk::SubpassContents::INLINE);
        }
        target.pipeline.bind_pipeline(cmd);
        unsafe {
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[render_area]);
        }

        for group in groups {
            let per_draw = PerDrawData {
                shader_variant: group.shader_variant,
            };
            target.pipeline.update_push_constants(
                cmd,
                RenderPipelineContext::PUSH_CONSTANT_STAGES,
                bytemuck::bytes_of(&per_draw),
            );
            for draw in &group.draws {
                unsafe {
                    device.cmd_bind_vertex_buffers(cmd, 0, &[draw.vertex_buffer], &[0]);
                    device.cmd_bind_index_buffer(cmd, draw.index_buffer, 0, vk::IndexType::UINT32);
                }
                // One dynamic offset for the UI instance buffer
                target.pipeline.bind_descriptor_sets(cmd, 0, &draw.descriptor_sets, &[0]);
                unsafe {
                    device.cmd_draw_indexed(cmd, draw.index_count, group.instance_count, 0, 0, 0);
                }
            }
        }

        unsafe {
            device.cmd_end_render_pass(cmd);
            device.end_command_buffer(cmd)?;
        }
        Ok(())
    }

    pub fn submit(&self, device: &ash::Device, queue: vk::Queue) -> Result<()> {
        let wait_semaphores = [self.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffer];
        let signal_semaphores = [self.render_finished];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);
        unsafe {
            device.queue_submit(queue, &[submit_info], self.in_flight)?;
        }
        Ok(())
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight, None);
        }
    }
}
