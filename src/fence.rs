use crate::device::SurfaceDevice;
use ash::vk;
use std::sync::Arc;

/// Block until the work really finishes; a frame never starts over unfinished commands
pub const FENCE_WAIT_TIMEOUT: u64 = u64::MAX;

pub(crate) struct DeviceFence {
    device: Arc<dyn SurfaceDevice>,
    pub(crate) handle: vk::Fence,
}

impl DeviceFence {
    pub(crate) fn new(device: Arc<dyn SurfaceDevice>) -> crate::Result<Self> {
        let handle = crate::vk_check("vkCreateFence", device.create_fence())?;
        Ok(Self { device, handle })
    }

    pub(crate) fn wait(&self) -> crate::Result<()> {
        crate::vk_check(
            "vkWaitForFences",
            self.device.wait_for_fence(self.handle, FENCE_WAIT_TIMEOUT),
        )
    }

    pub(crate) fn reset(&self) -> crate::Result<()> {
        crate::vk_check("vkResetFences", self.device.reset_fence(self.handle))
    }
}

impl Drop for DeviceFence {
    fn drop(&mut self) {
        self.device.destroy_fence(self.handle);
        trace!("Destroy Fence");
    }
}

/// A command buffer recorded against a surface, returned to its pool on drop
pub(crate) struct SurfaceCommandBuffer {
    device: Arc<dyn SurfaceDevice>,
    pool: vk::CommandPool,
    pub(crate) handle: vk::CommandBuffer,
}

impl SurfaceCommandBuffer {
    pub(crate) fn new(device: Arc<dyn SurfaceDevice>, pool: vk::CommandPool) -> crate::Result<Self> {
        let handle = crate::vk_check(
            "vkAllocateCommandBuffers",
            device.allocate_command_buffer(pool),
        )?;
        Ok(Self {
            device,
            pool,
            handle,
        })
    }
}

impl Drop for SurfaceCommandBuffer {
    fn drop(&mut self) {
        self.device.free_command_buffer(self.pool, self.handle);
    }
}
