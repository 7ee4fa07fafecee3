// Synchronization primitives
//
// One semaphore pair gates acquire/present, and a fence per swapchain
// image keeps the CPU from resubmitting a command buffer still in flight.

use super::VulkanDevice;
use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fences: Vec<vk::Fence>,
    device: Arc<VulkanDevice>,
}

impl FrameSync {
    pub fn new(device: Arc<VulkanDevice>, image_count: usize) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Fences start signaled so the first wait on each image passes
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            let image_available = device.device.create_semaphore(&semaphore_info, None)?;
            let render_finished = device.device.create_semaphore(&semaphore_info, None)?;
            let in_flight_fences = (0..image_count)
                .map(|_| device.device.create_fence(&fence_info, None))
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(Self {
                image_available,
                render_finished,
                in_flight_fences,
                device,
            })
        }
    }

    /// Wait for the fence guarding `image_index`, then reset it.
    ///
    /// The timeout is finite; expiry is an error rather than a hang.
    pub fn wait_and_reset(&self, image_index: u32, timeout_ns: u64) -> Result<()> {
        let fence = self.in_flight_fences[image_index as usize];
        unsafe {
            match self.device.device.wait_for_fences(&[fence], true, timeout_ns) {
                Ok(()) => {}
                Err(vk::Result::TIMEOUT) => {
                    anyhow::bail!(
                        "Timed out waiting for frame fence {} ({} ns)",
                        image_index,
                        timeout_ns
                    )
                }
                Err(e) => return Err(e).context("Failed to wait for frame fence"),
            }
            self.device
                .device
                .reset_fences(&[fence])
                .context("Failed to reset frame fence")?;
        }
        Ok(())
    }

    pub fn fence(&self, image_index: u32) -> vk::Fence {
        self.in_flight_fences[image_index as usize]
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            self.device
                .device
                .destroy_semaphore(self.image_available, None);
            self.device
                .device
                .destroy_semaphore(self.render_finished, None);
            for &fence in &self.in_flight_fences {
                self.device.device.destroy_fence(fence, None);
            }
        }
    }
}
