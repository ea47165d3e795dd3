//! Compositor session boundary
//!
//! Surfaces never talk to the compositor directly. They register their buffer collection,
//! create and release one image resource, and queue acquire/release fences on a
//! [`CompositorSession`]. [`Session`] is the batching implementation: it keeps everything in
//! call order until the owner presents, and leaves the wire transport to the caller.

use crate::zircon::{Event, Handle};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

/// Session-scoped resource id; 0 is never allocated
pub type ResourceId = u32;

/// Caller-chosen id a buffer collection is registered under
pub type BufferId = u32;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    CreateImage {
        id: ResourceId,
        width: u32,
        height: u32,
        buffer_id: BufferId,
        buffer_collection_index: u32,
    },
    ReleaseResource {
        id: ResourceId,
    },
}

pub trait CompositorSession {
    fn register_buffer_collection(&mut self, buffer_id: BufferId, token: Handle);
    fn deregister_buffer_collection(&mut self, buffer_id: BufferId);
    fn alloc_resource_id(&mut self) -> ResourceId;
    fn enqueue(&mut self, command: Command);
    /// The compositor will not read the frame until `fence` is signalled
    fn enqueue_acquire_fence(&mut self, fence: Event);
    /// The compositor signals `fence` once it is done reading the frame
    fn enqueue_release_fence(&mut self, fence: Event);
}

pub type SessionRef = Rc<RefCell<dyn CompositorSession>>;

#[derive(Debug)]
pub enum SessionOp {
    RegisterBufferCollection { buffer_id: BufferId, token: Handle },
    DeregisterBufferCollection { buffer_id: BufferId },
    Enqueue(Command),
    AcquireFence(Event),
    ReleaseFence(Event),
}

#[derive(Debug)]
pub struct Session {
    next_resource_id: ResourceId,
    registered: HashSet<BufferId>,
    pending: Vec<SessionOp>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            next_resource_id: 1,
            registered: HashSet::new(),
            pending: Vec::new(),
        }
    }
}

impl Session {
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn is_registered(&self, buffer_id: BufferId) -> bool {
        self.registered.contains(&buffer_id)
    }

    pub fn pending(&self) -> &[SessionOp] {
        &self.pending
    }

    /// Hand everything queued since the last present to the transport
    pub fn present(&mut self) -> Vec<SessionOp> {
        std::mem::take(&mut self.pending)
    }
}

impl CompositorSession for Session {
    fn register_buffer_collection(&mut self, buffer_id: BufferId, token: Handle) {
        if !self.registered.insert(buffer_id) {
            warn!("Buffer collection {} registered twice", buffer_id);
        }
        self.pending
            .push(SessionOp::RegisterBufferCollection { buffer_id, token });
    }

    fn deregister_buffer_collection(&mut self, buffer_id: BufferId) {
        if !self.registered.remove(&buffer_id) {
            warn!("Deregistering unknown buffer collection {}", buffer_id);
        }
        self.pending
            .push(SessionOp::DeregisterBufferCollection { buffer_id });
    }

    fn alloc_resource_id(&mut self) -> ResourceId {
        let id = self.next_resource_id;
        self.next_resource_id += 1;
        id
    }

    fn enqueue(&mut self, command: Command) {
        self.pending.push(SessionOp::Enqueue(command));
    }

    fn enqueue_acquire_fence(&mut self, fence: Event) {
        self.pending.push(SessionOp::AcquireFence(fence));
    }

    fn enqueue_release_fence(&mut self, fence: Event) {
        self.pending.push(SessionOp::ReleaseFence(fence));
    }
}
