use super::{sys, AsHandleRef, Handle, HandleBased, HandleRef};
use bitflags::bitflags;

bitflags! {
    /// Object signal bits
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Signals: u32 {
        const NONE = 0;
        const EVENT_SIGNALED = 1 << 3;
        const USER_0 = 1 << 24;
        const USER_1 = 1 << 25;
        const USER_2 = 1 << 26;
        const USER_3 = 1 << 27;
    }
}

/// An event object: a set of signal bits that stay set until cleared
#[derive(Debug)]
#[repr(transparent)]
pub struct Event(Handle);

impl Event {
    pub fn create() -> super::Result<Event> {
        sys::event_create(0).map(Event)
    }

    /// Clear then set signal bits on the event
    pub fn signal(&self, clear: Signals, set: Signals) -> super::Result<()> {
        sys::object_signal(self.0.raw_handle(), clear.bits(), set.bits())
    }

    /// Wait until any of `signals` is asserted or `deadline` passes
    pub fn wait_one(&self, signals: Signals, deadline: i64) -> super::Result<Signals> {
        sys::object_wait_one(self.0.raw_handle(), signals.bits(), deadline)
            .map(Signals::from_bits_truncate)
    }
}

impl AsHandleRef for Event {
    fn as_handle_ref(&self) -> HandleRef<'_> {
        self.0.as_handle_ref()
    }
}

impl From<Handle> for Event {
    fn from(handle: Handle) -> Self {
        Event(handle)
    }
}

impl From<Event> for Handle {
    fn from(event: Event) -> Self {
        event.0
    }
}

impl HandleBased for Event {}
