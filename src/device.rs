use crate::image::ImageDescription;
use crate::zircon::RawHandle;
use ash::prelude::VkResult;
use ash::vk;
use std::ffi::{c_void, CStr};
use std::mem;
use std::ptr;

/// Driver calls a surface issues against its GPU context
///
/// Surfaces only reference the device; every object created here is destroyed by its owner
/// before the device goes away.
pub trait SurfaceDevice {
    /// Import a sysmem collection token. The driver takes ownership of `token`.
    fn create_buffer_collection(&self, token: RawHandle) -> VkResult<vk::BufferCollectionFUCHSIA>;
    fn set_buffer_collection_image_constraints(
        &self,
        collection: vk::BufferCollectionFUCHSIA,
        description: &ImageDescription,
    ) -> VkResult<()>;
    /// Memory type bits the collection's buffers can be imported as
    fn get_buffer_collection_memory_type_bits(
        &self,
        collection: vk::BufferCollectionFUCHSIA,
    ) -> VkResult<u32>;
    fn destroy_buffer_collection(&self, collection: vk::BufferCollectionFUCHSIA);

    fn create_image(
        &self,
        description: &ImageDescription,
        collection: vk::BufferCollectionFUCHSIA,
    ) -> VkResult<vk::Image>;
    fn get_image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements;
    fn destroy_image(&self, image: vk::Image);

    fn allocate_imported_memory(
        &self,
        collection: vk::BufferCollectionFUCHSIA,
        index: u32,
        size: vk::DeviceSize,
        memory_type_index: u32,
    ) -> VkResult<vk::DeviceMemory>;
    fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()>;
    fn free_memory(&self, memory: vk::DeviceMemory);

    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;
    /// Temporarily import a zircon event as the semaphore's payload.
    /// The driver takes ownership of `event` on success only.
    fn import_semaphore_zircon_event(
        &self,
        semaphore: vk::Semaphore,
        event: RawHandle,
    ) -> VkResult<()>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    fn create_fence(&self) -> VkResult<vk::Fence>;
    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> VkResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;
    fn destroy_fence(&self, fence: vk::Fence);

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VkResult<vk::CommandBuffer>;
    fn free_command_buffer(&self, pool: vk::CommandPool, command_buffer: vk::CommandBuffer);
}

/// sysmem `ColorSpaceType::SRGB`
const SYSMEM_COLOR_SPACE_SRGB: u32 = 1;

/// [`SurfaceDevice`] over an ash device with the Fuchsia extensions enabled:
/// `VK_FUCHSIA_buffer_collection`, `VK_FUCHSIA_external_memory`,
/// `VK_FUCHSIA_external_semaphore`.
pub struct AshSurfaceDevice {
    pub core: ash::Device,
    buffer_collection: vk::FuchsiaBufferCollectionFn,
    external_semaphore: vk::FuchsiaExternalSemaphoreFn,
}

impl AshSurfaceDevice {
    pub fn new(instance: &ash::Instance, core: ash::Device) -> Self {
        let handle = core.handle();
        let buffer_collection = vk::FuchsiaBufferCollectionFn::load(|name| unsafe {
            mem::transmute(instance.get_device_proc_addr(handle, name.as_ptr()))
        });
        let external_semaphore = vk::FuchsiaExternalSemaphoreFn::load(|name| unsafe {
            mem::transmute(instance.get_device_proc_addr(handle, name.as_ptr()))
        });

        Self {
            core,
            buffer_collection,
            external_semaphore,
        }
    }

    pub fn required_extension_names() -> [&'static CStr; 3] {
        [
            vk::FuchsiaBufferCollectionFn::name(),
            vk::FuchsiaExternalMemoryFn::name(),
            vk::FuchsiaExternalSemaphoreFn::name(),
        ]
    }
}

impl SurfaceDevice for AshSurfaceDevice {
    fn create_buffer_collection(&self, token: RawHandle) -> VkResult<vk::BufferCollectionFUCHSIA> {
        let create_info = vk::BufferCollectionCreateInfoFUCHSIA::builder().collection_token(token);
        let mut collection = vk::BufferCollectionFUCHSIA::null();
        unsafe {
            (self.buffer_collection.create_buffer_collection_fuchsia)(
                self.core.handle(),
                &*create_info,
                ptr::null(),
                &mut collection,
            )
        }
        .result_with_success(collection)
    }

    fn set_buffer_collection_image_constraints(
        &self,
        collection: vk::BufferCollectionFUCHSIA,
        description: &ImageDescription,
    ) -> VkResult<()> {
        let color_spaces = [vk::SysmemColorSpaceFUCHSIA::builder()
            .color_space(SYSMEM_COLOR_SPACE_SRGB)
            .build()];

        let format_constraints = [vk::ImageFormatConstraintsInfoFUCHSIA::builder()
            .image_create_info(description.to_vk())
            .required_format_features(
                vk::FormatFeatureFlags::COLOR_ATTACHMENT
                    | vk::FormatFeatureFlags::TRANSFER_SRC
                    | vk::FormatFeatureFlags::TRANSFER_DST,
            )
            .color_spaces(&color_spaces)
            .build()];

        let constraints_info = vk::ImageConstraintsInfoFUCHSIA::builder()
            .format_constraints(&format_constraints)
            .buffer_collection_constraints(
                vk::BufferCollectionConstraintsInfoFUCHSIA::builder()
                    .min_buffer_count(1)
                    .build(),
            );

        unsafe {
            (self
                .buffer_collection
                .set_buffer_collection_image_constraints_fuchsia)(
                self.core.handle(),
                collection,
                &*constraints_info,
            )
        }
        .result()
    }

    fn get_buffer_collection_memory_type_bits(
        &self,
        collection: vk::BufferCollectionFUCHSIA,
    ) -> VkResult<u32> {
        let mut properties = vk::BufferCollectionPropertiesFUCHSIA::default();
        unsafe {
            (self
                .buffer_collection
                .get_buffer_collection_properties_fuchsia)(
                self.core.handle(),
                collection,
                &mut properties,
            )
        }
        .result_with_success(properties.memory_type_bits)
    }

    fn destroy_buffer_collection(&self, collection: vk::BufferCollectionFUCHSIA) {
        unsafe {
            (self.buffer_collection.destroy_buffer_collection_fuchsia)(
                self.core.handle(),
                collection,
                ptr::null(),
            )
        }
    }

    fn create_image(
        &self,
        description: &ImageDescription,
        collection: vk::BufferCollectionFUCHSIA,
    ) -> VkResult<vk::Image> {
        let collection_info = vk::BufferCollectionImageCreateInfoFUCHSIA::builder()
            .collection(collection)
            .index(0)
            .build();
        let create_info = vk::ImageCreateInfo {
            p_next: &collection_info as *const _ as *const c_void,
            ..description.to_vk()
        };
        unsafe { self.core.create_image(&create_info, None) }
    }

    fn get_image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        unsafe { self.core.get_image_memory_requirements(image) }
    }

    fn destroy_image(&self, image: vk::Image) {
        unsafe { self.core.destroy_image(image, None) }
    }

    fn allocate_imported_memory(
        &self,
        collection: vk::BufferCollectionFUCHSIA,
        index: u32,
        size: vk::DeviceSize,
        memory_type_index: u32,
    ) -> VkResult<vk::DeviceMemory> {
        let mut import_info = vk::ImportMemoryBufferCollectionFUCHSIA::builder()
            .collection(collection)
            .index(index);
        unsafe {
            self.core.allocate_memory(
                &vk::MemoryAllocateInfo::builder()
                    .allocation_size(size)
                    .memory_type_index(memory_type_index)
                    .push_next(&mut import_info),
                None,
            )
        }
    }

    fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        unsafe { self.core.bind_image_memory(image, memory, offset) }
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.core.free_memory(memory, None) }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        unsafe {
            self.core
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
        }
    }

    fn import_semaphore_zircon_event(
        &self,
        semaphore: vk::Semaphore,
        event: RawHandle,
    ) -> VkResult<()> {
        let import_info = vk::ImportSemaphoreZirconHandleInfoFUCHSIA::builder()
            .semaphore(semaphore)
            .flags(vk::SemaphoreImportFlags::TEMPORARY)
            .handle_type(vk::ExternalSemaphoreHandleTypeFlags::ZIRCON_EVENT_FUCHSIA)
            .zircon_handle(event);
        unsafe {
            (self
                .external_semaphore
                .import_semaphore_zircon_handle_fuchsia)(
                self.core.handle(), &*import_info
            )
        }
        .result()
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.core.destroy_semaphore(semaphore, None) }
    }

    fn create_fence(&self) -> VkResult<vk::Fence> {
        unsafe {
            self.core
                .create_fence(&vk::FenceCreateInfo::default(), None)
        }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> VkResult<()> {
        unsafe { self.core.wait_for_fences(&[fence], true, timeout) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.core.reset_fences(&[fence]) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.core.destroy_fence(fence, None) }
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VkResult<vk::CommandBuffer> {
        unsafe {
            self.core.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::builder()
                    .command_pool(pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1),
            )
        }
        .map(|command_buffers| command_buffers[0])
    }

    fn free_command_buffer(&self, pool: vk::CommandPool, command_buffer: vk::CommandBuffer) {
        unsafe { self.core.free_command_buffers(pool, &[command_buffer]) }
    }
}
