use crate::image::ImageDescription;
use ash::vk;

/// Everything a rendering library needs to wrap a surface's image
#[derive(Copy, Clone, Debug)]
pub struct BoundImage {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub memory_offset: vk::DeviceSize,
    pub allocation_size: vk::DeviceSize,
    pub description: ImageDescription,
    pub tiling: vk::ImageTiling,
    pub initial_layout: vk::ImageLayout,
}

/// A paintable view over a surface's image, built once and reused every frame
pub trait RenderTarget {
    fn size(&self) -> vk::Extent2D;
    /// False if the library failed to produce something that can be drawn into
    fn has_canvas(&self) -> bool;
}

pub trait RenderTargetFactory {
    fn create_render_target(&self, image: &BoundImage) -> Option<Box<dyn RenderTarget>>;
}

impl<F> RenderTargetFactory for F
where
    F: Fn(&BoundImage) -> Option<Box<dyn RenderTarget>>,
{
    fn create_render_target(&self, image: &BoundImage) -> Option<Box<dyn RenderTarget>> {
        self(image)
    }
}
