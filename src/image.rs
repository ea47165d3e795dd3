use crate::device::SurfaceDevice;
use ash::vk;
use bitflags::bitflags;
use std::sync::Arc;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ImageUsage: u32 {
        const ATTACHMENT = 1 << 0;
        const SAMPLED = 1 << 1;
        const TRANSFER_SRC = 1 << 2;
        const TRANSFER_DST = 1 << 3;
    }
}

impl ImageUsage {
    pub fn to_vk(self) -> vk::ImageUsageFlags {
        let mut vk_usage = vk::ImageUsageFlags::empty();
        if self.contains(ImageUsage::ATTACHMENT) {
            vk_usage |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        }
        if self.contains(ImageUsage::SAMPLED) {
            vk_usage |= vk::ImageUsageFlags::SAMPLED;
        }
        if self.contains(ImageUsage::TRANSFER_SRC) {
            vk_usage |= vk::ImageUsageFlags::TRANSFER_SRC;
        }
        if self.contains(ImageUsage::TRANSFER_DST) {
            vk_usage |= vk::ImageUsageFlags::TRANSFER_DST;
        }
        vk_usage
    }
}

impl Default for ImageUsage {
    fn default() -> Self {
        ImageUsage::all()
    }
}

/// The image every surface allocates: 2D, one mip, one layer, optimal tiling
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ImageDescription {
    pub size: vk::Extent2D,
    pub format: vk::Format,
    pub usage: ImageUsage,
}

impl ImageDescription {
    /// Create info without the buffer collection link, which the device chains on itself
    pub fn to_vk(&self) -> vk::ImageCreateInfo {
        vk::ImageCreateInfo::builder()
            .format(self.format)
            .image_type(vk::ImageType::TYPE_2D)
            .usage(self.usage.to_vk())
            .extent(vk::Extent3D {
                width: self.size.width,
                height: self.size.height,
                depth: 1,
            })
            .array_layers(1)
            .mip_levels(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .build()
    }
}

pub(crate) struct SurfaceImage {
    device: Arc<dyn SurfaceDevice>,
    pub(crate) handle: vk::Image,
    pub(crate) requirements: vk::MemoryRequirements,
}

impl SurfaceImage {
    pub(crate) fn new(
        device: Arc<dyn SurfaceDevice>,
        description: &ImageDescription,
        collection: vk::BufferCollectionFUCHSIA,
    ) -> crate::Result<Self> {
        let handle = crate::vk_check("vkCreateImage", device.create_image(description, collection))?;
        let requirements = device.get_image_memory_requirements(handle);
        Ok(Self {
            device,
            handle,
            requirements,
        })
    }
}

impl Drop for SurfaceImage {
    fn drop(&mut self) {
        self.device.destroy_image(self.handle);
        trace!("Drop Surface Image");
    }
}

/// Device memory imported from one buffer of a collection
pub(crate) struct ImportedMemory {
    device: Arc<dyn SurfaceDevice>,
    pub(crate) handle: vk::DeviceMemory,
    pub(crate) allocation_size: vk::DeviceSize,
}

impl ImportedMemory {
    pub(crate) fn new(
        device: Arc<dyn SurfaceDevice>,
        collection: vk::BufferCollectionFUCHSIA,
        requirements: &vk::MemoryRequirements,
        collection_memory_type_bits: u32,
    ) -> crate::Result<Self> {
        let memory_type_bits = requirements.memory_type_bits & collection_memory_type_bits;
        assert_ne!(
            memory_type_bits, 0,
            "Buffer collection memory types {:#b} are incompatible with image memory types {:#b}",
            collection_memory_type_bits, requirements.memory_type_bits
        );

        let handle = crate::vk_check(
            "vkAllocateMemory",
            device.allocate_imported_memory(
                collection,
                0,
                requirements.size,
                memory_type_bits.trailing_zeros(),
            ),
        )?;

        Ok(Self {
            device,
            handle,
            allocation_size: requirements.size,
        })
    }
}

impl Drop for ImportedMemory {
    fn drop(&mut self) {
        self.device.free_memory(self.handle);
        trace!("Free Imported Memory");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDevice;

    #[test]
    fn usage_maps_to_vk_flags() {
        let usage = ImageUsage::default().to_vk();
        assert!(usage.contains(
            vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
        ));
        assert_eq!(ImageUsage::SAMPLED.to_vk(), vk::ImageUsageFlags::SAMPLED);
    }

    #[test]
    fn create_info_is_single_level_2d() {
        let info = ImageDescription {
            size: vk::Extent2D {
                width: 64,
                height: 32,
            },
            format: vk::Format::R8G8B8A8_UNORM,
            usage: ImageUsage::default(),
        }
        .to_vk();

        assert_eq!(info.image_type, vk::ImageType::TYPE_2D);
        assert_eq!(info.mip_levels, 1);
        assert_eq!(info.array_layers, 1);
        assert_eq!(info.extent.width, 64);
        assert_eq!(info.extent.height, 32);
        assert_eq!(info.extent.depth, 1);
        assert_eq!(info.tiling, vk::ImageTiling::OPTIMAL);
    }

    #[test]
    fn memory_uses_lowest_shared_type() {
        let device = MockDevice::new();
        let requirements = vk::MemoryRequirements {
            size: 4096,
            alignment: 256,
            memory_type_bits: 0b1110,
        };
        let memory = ImportedMemory::new(
            device.clone(),
            vk::BufferCollectionFUCHSIA::null(),
            &requirements,
            0b1100,
        )
        .unwrap();

        assert_eq!(memory.allocation_size, 4096);
        assert_eq!(device.last_memory_type_index(), Some(2));
        drop(memory);
        assert_eq!(device.count("free_memory"), 1);
    }

    #[test]
    #[should_panic(expected = "incompatible")]
    fn disjoint_memory_types_are_fatal() {
        let device = MockDevice::new();
        let requirements = vk::MemoryRequirements {
            size: 4096,
            alignment: 256,
            memory_type_bits: 0b0011,
        };
        let _ = ImportedMemory::new(
            device,
            vk::BufferCollectionFUCHSIA::null(),
            &requirements,
            0b1100,
        );
    }
}
