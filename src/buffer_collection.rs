use crate::device::SurfaceDevice;
use crate::zircon::{self, Handle};
use ash::vk;
use std::sync::Arc;

/// Client of the sysmem allocator
///
/// Tokens are channel handles naming a shared collection; each participant that must agree
/// on the collection's constraints gets its own duplicate.
pub trait BufferCollectionAllocator {
    fn allocate_shared_collection(&mut self) -> zircon::Result<Handle>;
    fn duplicate(&mut self, token: &Handle) -> zircon::Result<Handle>;
    /// Round-trip to sysmem so duplicates made on `token` are known before it is handed off
    fn sync(&mut self, token: &Handle) -> zircon::Result<()>;
}

/// A driver-side import of a sysmem collection
pub(crate) struct DeviceBufferCollection {
    device: Arc<dyn SurfaceDevice>,
    pub(crate) handle: vk::BufferCollectionFUCHSIA,
}

impl DeviceBufferCollection {
    pub(crate) fn import(device: Arc<dyn SurfaceDevice>, token: Handle) -> crate::Result<Self> {
        let handle = crate::vk_check(
            "vkCreateBufferCollectionFUCHSIA",
            device.create_buffer_collection(token.into_raw()),
        )?;
        Ok(Self { device, handle })
    }
}

impl Drop for DeviceBufferCollection {
    fn drop(&mut self) {
        self.device.destroy_buffer_collection(self.handle);
        trace!("Destroy Buffer Collection");
    }
}
