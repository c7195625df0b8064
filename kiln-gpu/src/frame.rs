//! The frame ring: per-slot command encoders, acquire/submit semaphores, and
//! submit fences.

use std::sync::Arc;

use ash::vk;

use crate::device::DeviceShared;
use crate::encoder::CommandEncoder;
use crate::error::{Result, VkResultExt};
use crate::swapchain::Swapchain;
use crate::FrameId;

/// `tail = max(current, buffering) - buffering`: the newest frame the GPU is
/// guaranteed to have fully retired.
pub(crate) fn compute_tail_frame(current: FrameId, buffering: u32) -> FrameId {
    current.max(buffering as FrameId) - buffering as FrameId
}

pub(crate) struct FrameContext {
    pub(crate) dev: Arc<DeviceShared>,
    pub(crate) buffering: u32,
    pub(crate) ring_index: u32,
    pub(crate) current_frame: FrameId,
    pub(crate) tail_frame: FrameId,
    pub(crate) encoders: Vec<CommandEncoder>,
    pub(crate) acquire_semaphores: Vec<vk::Semaphore>,
    pub(crate) submit_fences: Vec<vk::Fence>,
    pub(crate) submit_semaphores: Vec<vk::Semaphore>,
    /// Swapchain handed to `begin_frame`, compared against `submit_frame`.
    pub(crate) swapchain: Option<Swapchain>,
}

impl FrameContext {
    pub(crate) fn new(dev: Arc<DeviceShared>, buffering: u32) -> Result<Self> {
        let mut ctx = Self {
            dev: Arc::clone(&dev),
            buffering,
            ring_index: 0,
            current_frame: 0,
            tail_frame: 0,
            encoders: Vec::with_capacity(buffering as usize),
            acquire_semaphores: Vec::with_capacity(buffering as usize),
            submit_fences: Vec::with_capacity(buffering as usize),
            submit_semaphores: Vec::with_capacity(buffering as usize),
            swapchain: None,
        };

        // partially-created slots are torn down by Drop on the error path
        for _ in 0..buffering {
            ctx.encoders.push(CommandEncoder::new(Arc::clone(&dev))?);
        }

        let semaphore_info = vk::SemaphoreCreateInfo::default();
        for _ in 0..buffering {
            let semaphore =
                unsafe { dev.device.create_semaphore(&semaphore_info, None) }.status()?;
            dev.set_object_name(Some("frame acquire semaphore"), semaphore);
            ctx.acquire_semaphores.push(semaphore);
        }

        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
        for _ in 0..buffering {
            let fence = unsafe { dev.device.create_fence(&fence_info, None) }.status()?;
            dev.set_object_name(Some("frame submit fence"), fence);
            ctx.submit_fences.push(fence);
        }

        for _ in 0..buffering {
            let semaphore =
                unsafe { dev.device.create_semaphore(&semaphore_info, None) }.status()?;
            dev.set_object_name(Some("frame submit semaphore"), semaphore);
            ctx.submit_semaphores.push(semaphore);
        }

        Ok(ctx)
    }

    pub(crate) fn ring_index(&self) -> usize {
        self.ring_index as usize
    }

    /// Advances the frame after a submission, even when presentation was
    /// skipped; the frame is simply marked as missed.
    pub(crate) fn advance(&mut self) {
        self.current_frame += 1;
        self.tail_frame = compute_tail_frame(self.current_frame, self.buffering);
        self.ring_index = (self.ring_index + 1) % self.buffering;
    }
}

impl Drop for FrameContext {
    fn drop(&mut self) {
        unsafe {
            for semaphore in self.acquire_semaphores.drain(..) {
                self.dev.device.destroy_semaphore(semaphore, None);
            }
            for fence in self.submit_fences.drain(..) {
                self.dev.device.destroy_fence(fence, None);
            }
            for semaphore in self.submit_semaphores.drain(..) {
                self.dev.device.destroy_semaphore(semaphore, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_frame_lags_by_buffering() {
        assert_eq!(compute_tail_frame(0, 2), 0);
        assert_eq!(compute_tail_frame(1, 2), 0);
        assert_eq!(compute_tail_frame(2, 2), 0);
        assert_eq!(compute_tail_frame(3, 2), 1);
        assert_eq!(compute_tail_frame(4, 2), 2);
        assert_eq!(compute_tail_frame(10, 4), 6);
        assert_eq!(compute_tail_frame(3, 4), 0);
    }
}
