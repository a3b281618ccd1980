use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::{OptionExt, Result};
use crate::renderer::contexts::device_ctx::queue::Queue;

/// Records and runs one-shot command buffers for uploads and layout transitions
pub struct TransferContext {
    command_pool: vk::CommandPool,

    queue: Arc<Queue>,
    device: Arc<ash::Device>,
}

impl TransferContext {
    pub fn new(
        queue: Arc<Queue>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let command_pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue.family.index)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let command_pool =
            unsafe { device.create_command_pool(&command_pool_info, None)? };

        Ok(Self {
            command_pool,
            queue,
            device,
        })
    }

    // Executes the recorded commands right away and blocks until the queue is idle.
    // Uploads are therefore not pipelined with each other, which only happens during loading.
    pub fn immediate_submit<F>(
        &self,
        func: F,
    ) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        let command_buffer_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .command_buffer_count(1)
            .level(vk::CommandBufferLevel::PRIMARY);
        let cmd = unsafe {
            self.device.allocate_command_buffers(&command_buffer_info)?
        }
            .into_iter()
            .next()
            .ok_or_eyre("No one-shot command buffer was allocated")?;

        let result = self.record_and_wait(cmd, func);

        unsafe {
            self.device.free_command_buffers(self.command_pool, &[cmd]);
        }

        result
    }

    fn record_and_wait<F>(
        &self,
        cmd: vk::CommandBuffer,
        func: F,
    ) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        // This command buffer will be used exactly once before being freed
        let cmd_begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device.begin_command_buffer(cmd, &cmd_begin_info)?;
        }

        func(cmd, &self.device)?;

        unsafe {
            self.device.end_command_buffer(cmd)?;
        }

        let cmds = [cmd];
        let submit = vk::SubmitInfo::default()
            .command_buffers(&cmds);
        unsafe {
            self.device.queue_submit(
                self.queue.handle,
                &[submit],
                vk::Fence::null(),
            )?;
            self.device.queue_wait_idle(self.queue.handle)?;
        }

        Ok(())
    }
}

impl Drop for TransferContext {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
