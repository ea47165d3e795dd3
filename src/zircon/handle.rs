use super::{sys, RawHandle, Rights, Status, HANDLE_INVALID};

/// A borrowed handle, valid for `'a`
#[derive(Clone, Copy, Debug)]
#[repr(transparent)]
pub struct HandleRef<'a> {
    raw: RawHandle,
    _phantom: std::marker::PhantomData<&'a Handle>,
}

impl<'a> HandleRef<'a> {
    pub fn raw_handle(&self) -> RawHandle {
        self.raw
    }

    /// Duplicate the referenced handle into a new owned handle
    pub fn duplicate(&self, rights: Rights) -> super::Result<Handle> {
        if self.raw == HANDLE_INVALID {
            return Err(Status::ERR_BAD_HANDLE);
        }
        sys::handle_duplicate(self.raw, rights.bits())
    }
}

pub trait AsHandleRef {
    fn as_handle_ref(&self) -> HandleRef<'_>;

    fn raw_handle(&self) -> RawHandle {
        self.as_handle_ref().raw_handle()
    }

    fn is_invalid(&self) -> bool {
        self.raw_handle() == HANDLE_INVALID
    }
}

/// Typed wrappers around a [`Handle`]
pub trait HandleBased: AsHandleRef + From<Handle> + Into<Handle> {
    /// Duplicate into a new object of the same type
    fn duplicate_handle(&self, rights: Rights) -> super::Result<Self> {
        self.as_handle_ref().duplicate(rights).map(Self::from)
    }

    /// Give up ownership of the raw value without closing it
    fn into_raw(self) -> RawHandle {
        let handle: Handle = self.into();
        handle.into_raw()
    }
}

/// An owned kernel handle, closed on drop
///
/// Not `Clone`: copies are made with [`Handle::duplicate`] so the rights are explicit.
#[derive(Debug)]
#[repr(transparent)]
pub struct Handle(RawHandle);

impl Handle {
    /// # Safety
    /// `raw` must be a live handle that nothing else will close.
    pub unsafe fn from_raw(raw: RawHandle) -> Self {
        Handle(raw)
    }

    pub const fn invalid() -> Self {
        Handle(HANDLE_INVALID)
    }

    pub fn raw_handle(&self) -> RawHandle {
        self.0
    }

    pub fn is_invalid(&self) -> bool {
        self.0 == HANDLE_INVALID
    }

    /// Release the raw value without closing it
    pub fn into_raw(self) -> RawHandle {
        let raw = self.0;
        std::mem::forget(self);
        raw
    }

    pub fn duplicate(&self, rights: Rights) -> super::Result<Handle> {
        self.as_handle_ref().duplicate(rights)
    }
}

impl AsHandleRef for Handle {
    fn as_handle_ref(&self) -> HandleRef<'_> {
        HandleRef {
            raw: self.0,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl HandleBased for Handle {}

impl Default for Handle {
    fn default() -> Self {
        Handle::invalid()
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if !self.is_invalid() {
            sys::handle_close(self.0);
        }
    }
}
