pub mod frame;
pub mod slot;

use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use crate::renderer::config::MAX_FRAMES_IN_FLIGHT;
use crate::renderer::contexts::frame_ctx::frame::Frame;
use crate::renderer::contexts::frame_ctx::slot::FrameSlot;
use crate::renderer::error::{AcquiredImage, SurfaceStatus};

/// Responsibilities:
/// - Manage per-frame command buffers
/// - Manage synchronization between frames
pub struct RenderFrameContext {
    frames: Vec<Frame>,
    command_pool: vk::CommandPool,
    device: Arc<ash::Device>,
}

impl RenderFrameContext {
    pub fn new(
        queue_family_index: u32,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None)? };

        // Built before the frames so a failure below still releases the pool
        let mut frm = Self {
            frames: Vec::with_capacity(MAX_FRAMES_IN_FLIGHT),
            command_pool,
            device,
        };

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(MAX_FRAMES_IN_FLIGHT as u32);
        let command_buffers = unsafe { frm.device.allocate_command_buffers(&alloc_info)? };
        for command_buffer in command_buffers {
            let frame = Frame::new(command_buffer, &frm.device)?;
            frm.frames.push(frame);
        }

        Ok(frm)
    }

    pub fn frame(&self, slot: FrameSlot) -> &Frame {
        &self.frames[slot.index()]
    }
}

impl Drop for RenderFrameContext {
    fn drop(&mut self) {
        for frame in self.frames.drain(..) {
            frame.destroy(&self.device);
        }
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// The steps of one frame, in the order `FramePacer::draw_frame` drives them
pub trait FrameBackend {
    /// Blocks until the GPU has finished the previous submission that used `slot`
    fn wait_for_slot(&mut self, slot: FrameSlot) -> Result<()>;
    fn acquire_image(&mut self, slot: FrameSlot) -> Result<AcquiredImage>;
    /// Resets the slot's fence and command buffer
    fn reset_slot(&mut self, slot: FrameSlot) -> Result<()>;
    /// Writes the per-frame uniform data for `slot`
    fn update(&mut self, slot: FrameSlot) -> Result<()>;
    fn record(&mut self, slot: FrameSlot, image_index: u32) -> Result<()>;
    fn submit(&mut self, slot: FrameSlot) -> Result<()>;
    fn present(&mut self, slot: FrameSlot, image_index: u32) -> Result<SurfaceStatus>;
    fn recreate_target(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { slot: FrameSlot, image_index: u32 },
    /// The swapchain was out of date at acquire time and has been rebuilt
    Skipped,
}

/// Tracks the current frame slot and pending resize requests
#[derive(Debug, Default)]
pub struct FramePacer {
    current: FrameSlot,
    resize_requested: bool,
}

impl FramePacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_slot(&self) -> FrameSlot {
        self.current
    }

    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    pub fn resize_requested(&self) -> bool {
        self.resize_requested
    }

    pub fn draw_frame<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> Result<FrameOutcome> {
        let slot = self.current;
        backend.wait_for_slot(slot)?;

        let image_index = match backend.acquire_image(slot)? {
            AcquiredImage::Ready { image_index, .. } => image_index,
            AcquiredImage::OutOfDate => {
                // The fence stays signaled so the retry on this slot does not deadlock
                backend.recreate_target()?;
                self.resize_requested = false;
                return Ok(FrameOutcome::Skipped);
            }
        };

        backend.reset_slot(slot)?;
        backend.update(slot)?;
        backend.record(slot, image_index)?;
        backend.submit(slot)?;

        let status = backend.present(slot, image_index)?;
        if status.is_stale() || self.resize_requested {
            log::debug!("Recreating render target after present ({:?})", status);
            self.resize_requested = false;
            backend.recreate_target()?;
        }

        self.current = slot.next();
        Ok(FrameOutcome::Presented { slot, image_index })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Step {
        Wait(usize),
        Acquire(usize),
        Reset(usize),
        Update(usize),
        Record(usize, u32),
        Submit(usize),
        Present(usize, u32),
        Recreate,
    }

    #[derive(Default)]
    struct ScriptedBackend {
        steps: Vec<Step>,
        acquires: VecDeque<AcquiredImage>,
        presents: VecDeque<SurfaceStatus>,
        fail_record: bool,
    }

    impl ScriptedBackend {
        fn count(&self, step: fn(&Step) -> bool) -> usize {
            self.steps.iter().filter(|s| step(s)).count()
        }
    }

    impl FrameBackend for ScriptedBackend {
        fn wait_for_slot(&mut self, slot: FrameSlot) -> Result<()> {
            self.steps.push(Step::Wait(slot.index()));
            Ok(())
        }

        fn acquire_image(&mut self, slot: FrameSlot) -> Result<AcquiredImage> {
            self.steps.push(Step::Acquire(slot.index()));
            Ok(self.acquires.pop_front().unwrap_or(AcquiredImage::Ready {
                image_index: 0,
                suboptimal: false,
            }))
        }

        fn reset_slot(&mut self, slot: FrameSlot) -> Result<()> {
            self.steps.push(Step::Reset(slot.index()));
            Ok(())
        }

        fn update(&mut self, slot: FrameSlot) -> Result<()> {
            self.steps.push(Step::Update(slot.index()));
            Ok(())
        }

        fn record(&mut self, slot: FrameSlot, image_index: u32) -> Result<()> {
            if self.fail_record {
                return Err(color_eyre::eyre::eyre!("record failed"));
            }
            self.steps.push(Step::Record(slot.index(), image_index));
            Ok(())
        }

        fn submit(&mut self, slot: FrameSlot) -> Result<()> {
            self.steps.push(Step::Submit(slot.index()));
            Ok(())
        }

        fn present(&mut self, slot: FrameSlot, image_index: u32) -> Result<SurfaceStatus> {
            self.steps.push(Step::Present(slot.index(), image_index));
            Ok(self.presents.pop_front().unwrap_or(SurfaceStatus::Optimal))
        }

        fn recreate_target(&mut self) -> Result<()> {
            self.steps.push(Step::Recreate);
            Ok(())
        }
    }

    #[test]
    fn frame_k_uses_slot_k_mod_n() {
        let mut pacer = FramePacer::new();
        let mut backend = ScriptedBackend::default();
        for k in 0..5 {
            let outcome = pacer.draw_frame(&mut backend).unwrap();
            assert_eq!(
                outcome,
                FrameOutcome::Presented {
                    slot: FrameSlot::new(k),
                    image_index: 0,
                },
            );
        }
        let waits: Vec<_> = backend.steps
            .iter()
            .filter_map(|s| match s {
                Step::Wait(slot) => Some(*slot),
                _ => None,
            })
            .collect();
        let expected: Vec<_> = (0..5).map(|k| k % MAX_FRAMES_IN_FLIGHT).collect();
        assert_eq!(waits, expected);
    }

    #[test]
    fn steps_run_in_protocol_order() {
        let mut pacer = FramePacer::new();
        let mut backend = ScriptedBackend::default();
        backend.acquires.push_back(AcquiredImage::Ready {
            image_index: 2,
            suboptimal: false,
        });
        pacer.draw_frame(&mut backend).unwrap();
        assert_eq!(
            backend.steps,
            vec![
                Step::Wait(0),
                Step::Acquire(0),
                Step::Reset(0),
                Step::Update(0),
                Step::Record(0, 2),
                Step::Submit(0),
                Step::Present(0, 2),
            ],
        );
    }

    #[test]
    fn out_of_date_acquire_skips_without_reset() {
        let mut pacer = FramePacer::new();
        let mut backend = ScriptedBackend::default();
        backend.acquires.push_back(AcquiredImage::OutOfDate);

        let outcome = pacer.draw_frame(&mut backend).unwrap();
        assert_eq!(outcome, FrameOutcome::Skipped);
        assert_eq!(backend.steps, vec![Step::Wait(0), Step::Acquire(0), Step::Recreate]);
        // The same slot is tried again on the next call
        assert_eq!(pacer.current_slot(), FrameSlot::new(0));

        pacer.draw_frame(&mut backend).unwrap();
        assert_eq!(backend.count(|s| matches!(s, Step::Reset(0))), 1);
        assert_eq!(pacer.current_slot(), FrameSlot::new(1));
    }

    #[test]
    fn suboptimal_acquire_still_draws() {
        let mut pacer = FramePacer::new();
        let mut backend = ScriptedBackend::default();
        backend.acquires.push_back(AcquiredImage::Ready {
            image_index: 1,
            suboptimal: true,
        });
        let outcome = pacer.draw_frame(&mut backend).unwrap();
        assert!(matches!(outcome, FrameOutcome::Presented { image_index: 1, .. }));
        assert_eq!(backend.count(|s| matches!(s, Step::Recreate)), 0);
    }

    #[test]
    fn stale_present_recreates_the_target() {
        for status in [SurfaceStatus::Suboptimal, SurfaceStatus::OutOfDate] {
            let mut pacer = FramePacer::new();
            let mut backend = ScriptedBackend::default();
            backend.presents.push_back(status);

            pacer.draw_frame(&mut backend).unwrap();
            assert_eq!(backend.steps.last(), Some(&Step::Recreate));
            assert_eq!(pacer.current_slot(), FrameSlot::new(1));
        }
    }

    #[test]
    fn resize_request_is_consumed_once() {
        let mut pacer = FramePacer::new();
        let mut backend = ScriptedBackend::default();
        pacer.request_resize();

        pacer.draw_frame(&mut backend).unwrap();
        assert!(!pacer.resize_requested());
        pacer.draw_frame(&mut backend).unwrap();
        assert_eq!(backend.count(|s| matches!(s, Step::Recreate)), 1);
    }

    #[test]
    fn errors_leave_the_slot_unchanged() {
        let mut pacer = FramePacer::new();
        let mut backend = ScriptedBackend {
            fail_record: true,
            ..Default::default()
        };
        assert!(pacer.draw_frame(&mut backend).is_err());
        assert_eq!(pacer.current_slot(), FrameSlot::new(0));
        assert_eq!(backend.count(|s| matches!(s, Step::Submit(_))), 0);
    }
}
