use crate::age::SizeHistory;
use crate::buffer_collection::{BufferCollectionAllocator, DeviceBufferCollection};
use crate::device::SurfaceDevice;
use crate::dispatcher::{Dispatcher, Wait};
use crate::fence::{DeviceFence, SurfaceCommandBuffer};
use crate::image::{ImageDescription, ImageUsage, ImportedMemory, SurfaceImage};
use crate::render_target::{BoundImage, RenderTarget, RenderTargetFactory};
use crate::semaphore::{semaphore_from_event, DeviceSemaphore};
use crate::session::{BufferId, Command, ResourceId, SessionRef};
use crate::zircon::{AsHandleRef, Event, HandleBased, Rights, Signals, Status, HANDLE_INVALID};
use crate::{vk_check, zx_check, Error};
use ash::vk;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SurfaceSettings {
    pub format: vk::Format,
    pub usage: ImageUsage,
}

impl Default for SurfaceSettings {
    fn default() -> Self {
        Self {
            format: vk::Format::R8G8B8A8_UNORM,
            usage: ImageUsage::default(),
        }
    }
}

/// Everything surfaces of one producer share
#[derive(Clone)]
pub struct SurfaceContext {
    pub device: Arc<dyn SurfaceDevice>,
    pub session: SessionRef,
    pub dispatcher: Rc<Dispatcher>,
    pub settings: SurfaceSettings,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameState {
    /// Free to draw; the release wait is armed on a cleared event
    Armed,
    /// Flushed to the compositor, waiting for it to signal release
    AwaitingRelease,
}

pub type WritesCommittedCallback = Box<dyn FnOnce()>;

struct SurfaceState {
    // Field order is drop order: everything bound to the image goes first, the collection last.
    render_target: Option<Rc<dyn RenderTarget>>,
    command_buffer: Option<SurfaceCommandBuffer>,
    acquire_semaphore: Option<DeviceSemaphore>,
    command_buffer_fence: Option<DeviceFence>,
    image: Option<SurfaceImage>,
    memory: Option<ImportedMemory>,
    collection: Option<DeviceBufferCollection>,
    release_wait: Wait,
    acquire_event: Option<Event>,
    release_event: Option<Event>,

    device: Arc<dyn SurfaceDevice>,
    session: SessionRef,
    description: ImageDescription,
    bound_image: Option<BoundImage>,
    image_id: ResourceId,
    buffer_id: Option<BufferId>,
    valid: bool,
    awaiting_release: bool,
    size_history: SizeHistory,
    pending_on_writes_committed: Option<WritesCommittedCallback>,
}

impl SurfaceState {
    fn new(context: &SurfaceContext, size: vk::Extent2D) -> Self {
        Self {
            render_target: None,
            command_buffer: None,
            acquire_semaphore: None,
            command_buffer_fence: None,
            image: None,
            memory: None,
            collection: None,
            release_wait: Wait::new(context.dispatcher.clone(), Signals::EVENT_SIGNALED),
            acquire_event: None,
            release_event: None,
            device: context.device.clone(),
            session: context.session.clone(),
            description: ImageDescription {
                size,
                format: context.settings.format,
                usage: context.settings.usage,
            },
            bound_image: None,
            image_id: 0,
            buffer_id: None,
            valid: false,
            awaiting_release: false,
            size_history: SizeHistory::default(),
            pending_on_writes_committed: None,
        }
    }

    fn allocate_device_memory(
        &mut self,
        allocator: &mut dyn BufferCollectionAllocator,
        render_targets: &dyn RenderTargetFactory,
        buffer_id: BufferId,
    ) -> crate::Result<()> {
        let size = self.description.size;
        if size.width == 0 || size.height == 0 {
            return Err(Error::EmptySize);
        }

        let vulkan_token = zx_check(
            "AllocateSharedCollection",
            allocator.allocate_shared_collection(),
        )?;
        let compositor_token = zx_check("Duplicate", allocator.duplicate(&vulkan_token))?;
        zx_check("Sync", allocator.sync(&vulkan_token))?;

        self.session
            .borrow_mut()
            .register_buffer_collection(buffer_id, compositor_token);
        self.buffer_id = Some(buffer_id);

        let collection = DeviceBufferCollection::import(self.device.clone(), vulkan_token)?;
        let collection_handle = collection.handle;
        self.collection = Some(collection);

        vk_check(
            "vkSetBufferCollectionImageConstraintsFUCHSIA",
            self.device
                .set_buffer_collection_image_constraints(collection_handle, &self.description),
        )?;

        let image = SurfaceImage::new(self.device.clone(), &self.description, collection_handle)?;
        let image_handle = image.handle;
        let requirements = image.requirements;
        self.image = Some(image);

        let collection_memory_type_bits = vk_check(
            "vkGetBufferCollectionPropertiesFUCHSIA",
            self.device
                .get_buffer_collection_memory_type_bits(collection_handle),
        )?;

        let memory = ImportedMemory::new(
            self.device.clone(),
            collection_handle,
            &requirements,
            collection_memory_type_bits,
        )?;
        let memory_handle = memory.handle;
        let allocation_size = memory.allocation_size;
        self.memory = Some(memory);

        vk_check(
            "vkBindImageMemory",
            self.device
                .bind_image_memory(image_handle, memory_handle, 0),
        )?;

        let bound_image = BoundImage {
            image: image_handle,
            memory: memory_handle,
            memory_offset: 0,
            allocation_size,
            description: self.description,
            tiling: vk::ImageTiling::OPTIMAL,
            initial_layout: vk::ImageLayout::UNDEFINED,
        };
        self.bound_image = Some(bound_image);

        let render_target = render_targets
            .create_render_target(&bound_image)
            .ok_or(Error::MissingRenderTarget)?;
        if !render_target.has_canvas() {
            return Err(Error::MissingCanvas);
        }
        self.render_target = Some(Rc::from(render_target));

        Ok(())
    }

    fn create_fences(&mut self) -> crate::Result<()> {
        let acquire_event = zx_check("zx_event_create", Event::create())?;
        let acquire_semaphore = semaphore_from_event(&self.device, &acquire_event)
            .ok_or(Error::NoAcquireSemaphore)?;
        self.acquire_event = Some(acquire_event);
        self.acquire_semaphore = Some(acquire_semaphore);

        self.release_event = Some(zx_check("zx_event_create", Event::create())?);
        self.command_buffer_fence = Some(DeviceFence::new(self.device.clone())?);
        Ok(())
    }

    fn push_session_image_setup_ops(&mut self) {
        let Some(buffer_id) = self.buffer_id else {
            return;
        };

        let mut session = self.session.borrow_mut();
        if self.image_id == 0 {
            self.image_id = session.alloc_resource_id();
        }
        session.enqueue(Command::CreateImage {
            id: self.image_id,
            width: self.description.size.width,
            height: self.description.size.height,
            buffer_id,
            buffer_collection_index: 0,
        });
    }

    fn reset_events(&self) -> crate::Result<()> {
        for event in [&self.acquire_event, &self.release_event] {
            let event = event.as_ref().ok_or(Error::Invalid)?;
            zx_check(
                "zx_object_signal",
                event.signal(Signals::EVENT_SIGNALED, Signals::NONE),
            )?;
        }
        Ok(())
    }

    /// Prepare for the next frame. Leaves the pending callback in place for the caller to run.
    fn reset(&mut self, this: Weak<RefCell<SurfaceState>>) -> crate::Result<()> {
        if let Err(e) = self.reset_events() {
            error!("Could not reset surface events, surface is no longer valid: {}", e);
            self.valid = false;
            self.awaiting_release = false;
            self.acquire_semaphore = None;
            return Err(e);
        }

        if let Some(command_buffer) = self.command_buffer.take() {
            if let Some(fence) = &self.command_buffer_fence {
                let _ = fence.wait();
            }
            drop(command_buffer);
        }

        if let Some(fence) = &self.command_buffer_fence {
            let _ = fence.reset();
        }

        // Imports are one-shot, the previous semaphore has been consumed.
        self.acquire_semaphore = None;
        self.acquire_semaphore = self
            .acquire_event
            .as_ref()
            .and_then(|event| semaphore_from_event(&self.device, event));
        if self.acquire_semaphore.is_none() {
            error!("Could not create acquire semaphore");
        }

        if let Err(status) = self.arm_release_wait(this) {
            error!("Could not arm release wait: {}", status);
        }

        self.awaiting_release = false;
        Ok(())
    }

    fn arm_release_wait(&mut self, this: Weak<RefCell<SurfaceState>>) -> crate::zircon::Result<()> {
        self.release_wait
            .begin(Box::new(move |status: Status, observed: Signals| {
                if let Some(state) = this.upgrade() {
                    VulkanSurface::on_release(&state, status, observed);
                }
            }))
    }
}

impl Drop for SurfaceState {
    fn drop(&mut self) {
        match self.session.try_borrow_mut() {
            Ok(mut session) => {
                if self.image_id != 0 {
                    session.enqueue(Command::ReleaseResource { id: self.image_id });
                }
                if let Some(buffer_id) = self.buffer_id {
                    session.deregister_buffer_collection(buffer_id);
                }
            }
            Err(_) => error!(
                "Session is busy, leaking image {} and buffer collection {:?}",
                self.image_id, self.buffer_id
            ),
        }

        // Must not outlive the release event it waits on.
        self.release_wait.cancel();
        self.release_wait.set_object(HANDLE_INVALID);
        trace!("Drop Vulkan Surface");
    }
}

/// A compositor-shared render surface
///
/// Construction never fails outright: if any step goes wrong everything allocated so far is
/// released and the surface reports `is_valid() == false` for the rest of its life.
pub struct VulkanSurface {
    state: Rc<RefCell<SurfaceState>>,
}

impl VulkanSurface {
    pub fn new(
        context: &SurfaceContext,
        allocator: &mut dyn BufferCollectionAllocator,
        render_targets: &dyn RenderTargetFactory,
        size: vk::Extent2D,
        buffer_id: BufferId,
    ) -> Self {
        let mut state = SurfaceState::new(context, size);

        if let Err(e) = state.allocate_device_memory(allocator, render_targets, buffer_id) {
            error!("Could not allocate device memory: {}", e);
            return Self::from_state(state);
        }

        if let Err(e) = state.create_fences() {
            error!("Could not create signal fences: {}", e);
            return Self::from_state(state);
        }

        state.push_session_image_setup_ops();
        state.size_history.clear();

        let release_object = state
            .release_event
            .as_ref()
            .map_or(HANDLE_INVALID, |event| event.raw_handle());
        state.release_wait.set_object(release_object);

        let state = Rc::new(RefCell::new(state));
        if Self::reset(&state) {
            state.borrow_mut().valid = true;
            debug!(
                "Created Vulkan Surface {}x{} for buffer collection {}",
                size.width, size.height, buffer_id
            );
        }

        Self { state }
    }

    fn from_state(state: SurfaceState) -> Self {
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    fn reset(state: &Rc<RefCell<SurfaceState>>) -> bool {
        let mut inner = state.borrow_mut();
        let result = inner.reset(Rc::downgrade(state));
        let callback = inner.pending_on_writes_committed.take();
        drop(inner);

        match result {
            Ok(()) => {
                if let Some(callback) = callback {
                    callback();
                }
                true
            }
            Err(_) => {
                drop(callback);
                false
            }
        }
    }

    fn on_release(state: &Rc<RefCell<SurfaceState>>, status: Status, observed: Signals) {
        if status != Status::OK {
            debug!("Release wait ended: {}", status);
            return;
        }
        if !observed.contains(Signals::EVENT_SIGNALED) {
            return;
        }
        Self::reset(state);
    }

    pub fn is_valid(&self) -> bool {
        self.state.borrow().valid
    }

    /// The requested size, or 0x0 if the surface is not valid
    pub fn size(&self) -> vk::Extent2D {
        let state = self.state.borrow();
        if state.valid {
            state.description.size
        } else {
            vk::Extent2D::default()
        }
    }

    pub fn frame_state(&self) -> FrameState {
        if self.state.borrow().awaiting_release {
            FrameState::AwaitingRelease
        } else {
            FrameState::Armed
        }
    }

    /// Hand duplicates of the acquire and release events to the session for the next present.
    /// On failure nothing is queued and the surface is unchanged.
    pub fn flush_acquire_and_release(&self) -> crate::Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.valid {
            return Err(Error::Invalid);
        }

        let (Some(acquire_event), Some(release_event)) =
            (&state.acquire_event, &state.release_event)
        else {
            return Err(Error::Invalid);
        };
        let acquire = zx_check(
            "zx_handle_duplicate",
            acquire_event.duplicate_handle(Rights::SAME_RIGHTS),
        )?;
        let release = zx_check(
            "zx_handle_duplicate",
            release_event.duplicate_handle(Rights::SAME_RIGHTS),
        )?;

        {
            let mut session = state.session.borrow_mut();
            session.enqueue_acquire_fence(acquire);
            session.enqueue_release_fence(release);
        }

        state.size_history.reset_age();
        state.awaiting_release = true;
        Ok(())
    }

    /// Run `on_writes_committed` once the compositor has released the frame being flushed.
    /// Panics if a callback from an earlier frame has not run yet.
    pub fn signal_writes_finished(&self, on_writes_committed: impl FnOnce() + 'static) {
        let mut state = self.state.borrow_mut();
        if !state.valid {
            drop(state);
            on_writes_committed();
            return;
        }

        assert!(
            state.pending_on_writes_committed.is_none(),
            "Write callback registered while the previous write is still pending"
        );
        state.pending_on_writes_committed = Some(Box::new(on_writes_committed));
    }

    /// Record this frame's size and return the number of frames since the last flush
    pub fn advance_and_get_age(&self) -> usize {
        let size = self.size();
        self.state.borrow_mut().size_history.advance(size)
    }

    pub fn size_history(&self) -> SizeHistory {
        self.state.borrow().size_history.clone()
    }

    /// Compositor resource id of the image, 0 if it was never created
    pub fn image_id(&self) -> ResourceId {
        self.state.borrow().image_id
    }

    pub fn buffer_id(&self) -> Option<BufferId> {
        self.state.borrow().buffer_id
    }

    pub fn vk_image(&self) -> Option<vk::Image> {
        self.state.borrow().image.as_ref().map(|image| image.handle)
    }

    /// Semaphore the producer's last submission of a frame must signal
    pub fn acquire_semaphore(&self) -> Option<vk::Semaphore> {
        self.state
            .borrow()
            .acquire_semaphore
            .as_ref()
            .map(DeviceSemaphore::handle)
    }

    /// The frame's command buffer, allocated from `pool` on first use
    pub fn command_buffer(&self, pool: vk::CommandPool) -> crate::Result<vk::CommandBuffer> {
        let mut state = self.state.borrow_mut();
        if !state.valid {
            return Err(Error::Invalid);
        }

        if let Some(command_buffer) = &state.command_buffer {
            return Ok(command_buffer.handle);
        }

        let command_buffer = SurfaceCommandBuffer::new(state.device.clone(), pool)?;
        let handle = command_buffer.handle;
        state.command_buffer = Some(command_buffer);
        Ok(handle)
    }

    /// Fence the frame's command buffer submission must signal
    pub fn command_buffer_fence(&self) -> Option<vk::Fence> {
        self.state
            .borrow()
            .command_buffer_fence
            .as_ref()
            .map(|fence| fence.handle)
    }

    pub fn allocation_size(&self) -> Option<vk::DeviceSize> {
        self.state
            .borrow()
            .memory
            .as_ref()
            .map(|memory| memory.allocation_size)
    }

    pub fn memory_requirements(&self) -> Option<vk::MemoryRequirements> {
        self.state
            .borrow()
            .image
            .as_ref()
            .map(|image| image.requirements)
    }

    pub fn image_info(&self) -> Option<BoundImage> {
        self.state.borrow().bound_image
    }

    pub fn with_render_target<R>(&self, f: impl FnOnce(&dyn RenderTarget) -> R) -> Option<R> {
        let render_target = {
            let state = self.state.borrow();
            if !state.valid {
                return None;
            }
            state.render_target.clone()?
        };
        // No state borrow is held, so `f` may flush or register callbacks.
        Some(f(&*render_target))
    }
}
