//! Zero-copy Vulkan render surfaces for the Fuchsia compositor
//!
//! A [`VulkanSurface`] owns one image backed by a sysmem buffer collection that the
//! compositor also imports. Each frame the producer draws, flushes the surface's
//! acquire/release events to the compositor session, and the surface re-arms itself once the
//! compositor signals release.

mod age;
mod buffer_collection;
mod device;
mod dispatcher;
mod fence;
mod image;
mod render_target;
mod semaphore;
mod session;
mod surface;
pub mod zircon;

#[cfg(test)]
mod testing;

pub use age::*;
pub use buffer_collection::BufferCollectionAllocator;
pub use device::*;
pub use dispatcher::*;
pub use fence::FENCE_WAIT_TIMEOUT;
pub use image::{ImageDescription, ImageUsage};
pub use render_target::*;
pub use semaphore::*;
pub use session::*;
pub use surface::*;

pub use ash;
use ash::prelude::VkResult;
use ash::vk;

#[macro_use]
extern crate log;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Vk error: {0}")]
    Vk(#[from] vk::Result),

    #[error("Zircon error: {0}")]
    Zircon(#[from] zircon::Status),

    #[error("Surface size is empty")]
    EmptySize,

    #[error("Render target factory produced no target")]
    MissingRenderTarget,

    #[error("Render target has no canvas")]
    MissingCanvas,

    #[error("Failed to create acquire semaphore")]
    NoAcquireSemaphore,

    #[error("Surface is not valid")]
    Invalid,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Log a failed driver call by name and lift it into [`Error`]
pub(crate) fn vk_check<T>(call: &str, result: VkResult<T>) -> Result<T> {
    result.map_err(|e| {
        error!("{} failed: {}", call, e);
        Error::Vk(e)
    })
}

/// Log a failed kernel or sysmem call by name and lift it into [`Error`]
pub(crate) fn zx_check<T>(call: &str, result: zircon::Result<T>) -> Result<T> {
    result.map_err(|status| {
        error!("{} failed: {}", call, status);
        Error::Zircon(status)
    })
}
