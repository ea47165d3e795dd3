use crate::device::SurfaceDevice;
use crate::zircon::{Event, HandleBased, Rights};
use ash::vk;
use std::sync::Arc;

/// A semaphore whose payload was imported from a zircon event
///
/// The import is temporary, so the semaphore is good for exactly one wait; build a fresh one
/// with [`semaphore_from_event`] for every frame.
pub struct DeviceSemaphore {
    device: Arc<dyn SurfaceDevice>,
    handle: vk::Semaphore,
}

impl DeviceSemaphore {
    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

impl Drop for DeviceSemaphore {
    fn drop(&mut self) {
        self.device.destroy_semaphore(self.handle);
        trace!("Destroy Semaphore");
    }
}

/// Import a duplicate of `event` into a new semaphore; `event` itself stays with the caller
pub fn semaphore_from_event(
    device: &Arc<dyn SurfaceDevice>,
    event: &Event,
) -> Option<DeviceSemaphore> {
    let semaphore_event = match event.duplicate_handle(Rights::SAME_RIGHTS) {
        Ok(semaphore_event) => semaphore_event,
        Err(status) => {
            error!("Failed to duplicate semaphore event: {}", status);
            return None;
        }
    };

    let semaphore = match device.create_semaphore() {
        Ok(handle) => DeviceSemaphore {
            device: device.clone(),
            handle,
        },
        Err(e) => {
            error!("vkCreateSemaphore failed: {}", e);
            return None;
        }
    };

    let raw_event = semaphore_event.into_raw();
    if let Err(e) = device.import_semaphore_zircon_event(semaphore.handle, raw_event) {
        error!("vkImportSemaphoreZirconHandleFUCHSIA failed: {}", e);
        // The driver only takes the event on success.
        drop(unsafe { crate::zircon::Handle::from_raw(raw_event) });
        return None;
    }

    Some(semaphore)
}
