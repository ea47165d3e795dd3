//! Fakes for the driver, sysmem and the rendering library

use crate::buffer_collection::BufferCollectionAllocator;
use crate::device::SurfaceDevice;
use crate::image::ImageDescription;
use crate::render_target::{BoundImage, RenderTarget, RenderTargetFactory};
use crate::zircon::{self, Event, Handle, RawHandle, Rights, Status};
use ash::prelude::VkResult;
use ash::vk::{self, Handle as _};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) fn init_logging() {
    let _ = pretty_env_logger::formatted_builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Trace)
        .try_init();
}

#[derive(Default)]
struct MockState {
    calls: Vec<&'static str>,
    failures: HashSet<&'static str>,
    imported_events: Vec<RawHandle>,
    last_memory_type_index: Option<u32>,
    last_wait_timeout: Option<u64>,
    last_description: Option<ImageDescription>,
    live_objects: i64,
}

/// Records every call and hands out unique non-null handles
pub(crate) struct MockDevice {
    state: Mutex<MockState>,
    next_handle: AtomicU64,
    image_memory_type_bits: Mutex<u32>,
    collection_memory_type_bits: Mutex<u32>,
}

impl MockDevice {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState::default()),
            next_handle: AtomicU64::new(1),
            image_memory_type_bits: Mutex::new(0b0110),
            collection_memory_type_bits: Mutex::new(0b0100),
        })
    }

    pub(crate) fn as_device(self: &Arc<Self>) -> Arc<dyn SurfaceDevice> {
        self.clone()
    }

    /// Every later call named `call` fails with `ERROR_INITIALIZATION_FAILED`
    pub(crate) fn fail(&self, call: &'static str) {
        self.state.lock().unwrap().failures.insert(call);
    }

    pub(crate) fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    pub(crate) fn set_memory_type_bits(&self, image: u32, collection: u32) {
        *self.image_memory_type_bits.lock().unwrap() = image;
        *self.collection_memory_type_bits.lock().unwrap() = collection;
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| **c == call)
            .count()
    }

    pub(crate) fn imported_events(&self) -> Vec<RawHandle> {
        self.state.lock().unwrap().imported_events.clone()
    }

    pub(crate) fn last_memory_type_index(&self) -> Option<u32> {
        self.state.lock().unwrap().last_memory_type_index
    }

    pub(crate) fn last_wait_timeout(&self) -> Option<u64> {
        self.state.lock().unwrap().last_wait_timeout
    }

    /// Objects created and not yet destroyed
    pub(crate) fn live_objects(&self) -> i64 {
        self.state.lock().unwrap().live_objects
    }

    pub(crate) fn last_description(&self) -> Option<ImageDescription> {
        self.state.lock().unwrap().last_description
    }

    fn record(&self, call: &'static str) -> VkResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.failures.contains(call) {
            Err(vk::Result::ERROR_INITIALIZATION_FAILED)
        } else {
            Ok(())
        }
    }

    fn create<T: vk::Handle>(&self, call: &'static str) -> VkResult<T> {
        self.record(call)?;
        self.state.lock().unwrap().live_objects += 1;
        Ok(T::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed)))
    }

    fn destroy(&self, call: &'static str) {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state.live_objects -= 1;
    }
}

impl SurfaceDevice for MockDevice {
    fn create_buffer_collection(&self, token: RawHandle) -> VkResult<vk::BufferCollectionFUCHSIA> {
        // Ownership of the token moves to the driver either way.
        drop(unsafe { Handle::from_raw(token) });
        self.create("create_buffer_collection")
    }

    fn set_buffer_collection_image_constraints(
        &self,
        _collection: vk::BufferCollectionFUCHSIA,
        description: &ImageDescription,
    ) -> VkResult<()> {
        self.record("set_buffer_collection_image_constraints")?;
        self.state.lock().unwrap().last_description = Some(*description);
        Ok(())
    }

    fn get_buffer_collection_memory_type_bits(
        &self,
        _collection: vk::BufferCollectionFUCHSIA,
    ) -> VkResult<u32> {
        self.record("get_buffer_collection_memory_type_bits")?;
        Ok(*self.collection_memory_type_bits.lock().unwrap())
    }

    fn destroy_buffer_collection(&self, _collection: vk::BufferCollectionFUCHSIA) {
        self.destroy("destroy_buffer_collection");
    }

    fn create_image(
        &self,
        _description: &ImageDescription,
        _collection: vk::BufferCollectionFUCHSIA,
    ) -> VkResult<vk::Image> {
        self.create("create_image")
    }

    fn get_image_memory_requirements(&self, _image: vk::Image) -> vk::MemoryRequirements {
        let _ = self.record("get_image_memory_requirements");
        vk::MemoryRequirements {
            size: 256 * 256 * 4,
            alignment: 4096,
            memory_type_bits: *self.image_memory_type_bits.lock().unwrap(),
        }
    }

    fn destroy_image(&self, _image: vk::Image) {
        self.destroy("destroy_image");
    }

    fn allocate_imported_memory(
        &self,
        _collection: vk::BufferCollectionFUCHSIA,
        _index: u32,
        _size: vk::DeviceSize,
        memory_type_index: u32,
    ) -> VkResult<vk::DeviceMemory> {
        let memory = self.create("allocate_imported_memory")?;
        self.state.lock().unwrap().last_memory_type_index = Some(memory_type_index);
        Ok(memory)
    }

    fn bind_image_memory(
        &self,
        _image: vk::Image,
        _memory: vk::DeviceMemory,
        _offset: vk::DeviceSize,
    ) -> VkResult<()> {
        self.record("bind_image_memory")
    }

    fn free_memory(&self, _memory: vk::DeviceMemory) {
        self.destroy("free_memory");
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        self.create("create_semaphore")
    }

    fn import_semaphore_zircon_event(
        &self,
        _semaphore: vk::Semaphore,
        event: RawHandle,
    ) -> VkResult<()> {
        self.record("import_semaphore_zircon_event")?;
        self.state.lock().unwrap().imported_events.push(event);
        drop(unsafe { Handle::from_raw(event) });
        Ok(())
    }

    fn destroy_semaphore(&self, _semaphore: vk::Semaphore) {
        self.destroy("destroy_semaphore");
    }

    fn create_fence(&self) -> VkResult<vk::Fence> {
        self.create("create_fence")
    }

    fn wait_for_fence(&self, _fence: vk::Fence, timeout: u64) -> VkResult<()> {
        self.state.lock().unwrap().last_wait_timeout = Some(timeout);
        self.record("wait_for_fence")
    }

    fn reset_fence(&self, _fence: vk::Fence) -> VkResult<()> {
        self.record("reset_fence")
    }

    fn destroy_fence(&self, _fence: vk::Fence) {
        self.destroy("destroy_fence");
    }

    fn allocate_command_buffer(&self, _pool: vk::CommandPool) -> VkResult<vk::CommandBuffer> {
        self.create("allocate_command_buffer")
    }

    fn free_command_buffer(&self, _pool: vk::CommandPool, _command_buffer: vk::CommandBuffer) {
        self.destroy("free_command_buffer");
    }
}

/// Sysmem stand-in; tokens are plain events so duplication goes through the kernel table
#[derive(Default)]
pub(crate) struct MockAllocator {
    pub(crate) calls: Vec<&'static str>,
    pub(crate) fail: Option<&'static str>,
}

impl MockAllocator {
    fn record(&mut self, call: &'static str) -> zircon::Result<()> {
        self.calls.push(call);
        match self.fail {
            Some(failing) if failing == call => Err(Status::ERR_NO_RESOURCES),
            _ => Ok(()),
        }
    }
}

impl BufferCollectionAllocator for MockAllocator {
    fn allocate_shared_collection(&mut self) -> zircon::Result<Handle> {
        self.record("allocate_shared_collection")?;
        Ok(Event::create()?.into())
    }

    fn duplicate(&mut self, token: &Handle) -> zircon::Result<Handle> {
        self.record("duplicate")?;
        token.duplicate(Rights::SAME_RIGHTS)
    }

    fn sync(&mut self, _token: &Handle) -> zircon::Result<()> {
        self.record("sync")
    }
}

pub(crate) struct MockRenderTarget {
    size: vk::Extent2D,
    has_canvas: bool,
}

impl RenderTarget for MockRenderTarget {
    fn size(&self) -> vk::Extent2D {
        self.size
    }

    fn has_canvas(&self) -> bool {
        self.has_canvas
    }
}

/// Builds [`MockRenderTarget`]s and remembers the last image it was asked to wrap
pub(crate) struct MockRenderTargets {
    pub(crate) produce: bool,
    pub(crate) has_canvas: bool,
    pub(crate) created: Cell<u32>,
    pub(crate) last_image: RefCell<Option<BoundImage>>,
}

impl Default for MockRenderTargets {
    fn default() -> Self {
        Self {
            produce: true,
            has_canvas: true,
            created: Cell::new(0),
            last_image: RefCell::new(None),
        }
    }
}

impl RenderTargetFactory for MockRenderTargets {
    fn create_render_target(&self, image: &BoundImage) -> Option<Box<dyn RenderTarget>> {
        *self.last_image.borrow_mut() = Some(*image);
        if !self.produce {
            return None;
        }
        self.created.set(self.created.get() + 1);
        Some(Box::new(MockRenderTarget {
            size: image.description.size,
            has_canvas: self.has_canvas,
        }))
    }
}
