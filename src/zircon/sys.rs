//! Syscall layer
//!
//! On Fuchsia these are the `libzircon` entry points. Everywhere else an in-process object
//! table stands in for the kernel: handles are process-wide, duplicates share one signal
//! word, and an object lives until its last handle is closed. Host waits never block; a
//! wait that is not already satisfied reports `ERR_TIMED_OUT`.

use super::{Handle, RawHandle, Result};

#[cfg(target_os = "fuchsia")]
mod ffi {
    use super::RawHandle;

    #[link(name = "zircon")]
    extern "C" {
        pub fn zx_handle_close(handle: RawHandle) -> i32;
        pub fn zx_handle_duplicate(handle: RawHandle, rights: u32, out: *mut RawHandle) -> i32;
        pub fn zx_event_create(options: u32, out: *mut RawHandle) -> i32;
        pub fn zx_object_signal(handle: RawHandle, clear_mask: u32, set_mask: u32) -> i32;
        pub fn zx_object_wait_one(
            handle: RawHandle,
            signals: u32,
            deadline: i64,
            observed: *mut u32,
        ) -> i32;
    }
}

#[cfg(target_os = "fuchsia")]
pub(crate) fn handle_close(handle: RawHandle) {
    unsafe {
        ffi::zx_handle_close(handle);
    }
}

#[cfg(target_os = "fuchsia")]
pub(crate) fn handle_duplicate(handle: RawHandle, rights: u32) -> Result<Handle> {
    let mut out = super::HANDLE_INVALID;
    super::Status::ok(unsafe { ffi::zx_handle_duplicate(handle, rights, &mut out) })?;
    Ok(unsafe { Handle::from_raw(out) })
}

#[cfg(target_os = "fuchsia")]
pub(crate) fn event_create(options: u32) -> Result<Handle> {
    let mut out = super::HANDLE_INVALID;
    super::Status::ok(unsafe { ffi::zx_event_create(options, &mut out) })?;
    Ok(unsafe { Handle::from_raw(out) })
}

#[cfg(target_os = "fuchsia")]
pub(crate) fn object_signal(handle: RawHandle, clear: u32, set: u32) -> Result<()> {
    super::Status::ok(unsafe { ffi::zx_object_signal(handle, clear, set) })
}

#[cfg(target_os = "fuchsia")]
pub(crate) fn object_wait_one(handle: RawHandle, signals: u32, deadline: i64) -> Result<u32> {
    let mut observed = 0;
    super::Status::ok(unsafe {
        ffi::zx_object_wait_one(handle, signals, deadline, &mut observed)
    })?;
    Ok(observed)
}

#[cfg(not(target_os = "fuchsia"))]
pub(crate) use host::*;

#[cfg(not(target_os = "fuchsia"))]
mod host {
    use super::{Handle, RawHandle, Result};
    use crate::zircon::{Rights, Status};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

    const EVENT_SIGNAL_MASK: u32 = (1 << 3) | (0xff << 24);

    struct HandleEntry {
        object: Arc<Mutex<u32>>,
        rights: Rights,
    }

    fn table() -> MutexGuard<'static, HashMap<RawHandle, HandleEntry>> {
        static TABLE: OnceLock<Mutex<HashMap<RawHandle, HandleEntry>>> = OnceLock::new();
        TABLE
            .get_or_init(|| Mutex::new(HashMap::new()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(object: Arc<Mutex<u32>>, rights: Rights) -> Handle {
        static NEXT_HANDLE: AtomicU32 = AtomicU32::new(1);
        let raw = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
        table().insert(raw, HandleEntry { object, rights });
        unsafe { Handle::from_raw(raw) }
    }

    fn object(handle: RawHandle, required: Rights) -> Result<Arc<Mutex<u32>>> {
        let table = table();
        let entry = table.get(&handle).ok_or(Status::ERR_BAD_HANDLE)?;
        if !entry.rights.contains(required) {
            return Err(Status::ERR_ACCESS_DENIED);
        }
        Ok(entry.object.clone())
    }

    pub(crate) fn handle_close(handle: RawHandle) {
        table().remove(&handle);
    }

    pub(crate) fn handle_duplicate(handle: RawHandle, rights: u32) -> Result<Handle> {
        injected(Syscall::HandleDuplicate)?;
        let (object, current) = {
            let table = table();
            let entry = table.get(&handle).ok_or(Status::ERR_BAD_HANDLE)?;
            (entry.object.clone(), entry.rights)
        };
        if !current.contains(Rights::DUPLICATE) {
            return Err(Status::ERR_ACCESS_DENIED);
        }
        let requested = Rights::from_bits_truncate(rights);
        let rights = if requested.contains(Rights::SAME_RIGHTS) {
            current
        } else if current.contains(requested) {
            requested
        } else {
            return Err(Status::ERR_INVALID_ARGS);
        };
        Ok(insert(object, rights))
    }

    pub(crate) fn event_create(options: u32) -> Result<Handle> {
        injected(Syscall::EventCreate)?;
        if options != 0 {
            return Err(Status::ERR_INVALID_ARGS);
        }
        Ok(insert(Arc::new(Mutex::new(0)), Rights::EVENT_DEFAULT))
    }

    pub(crate) fn object_signal(handle: RawHandle, clear: u32, set: u32) -> Result<()> {
        injected(Syscall::ObjectSignal)?;
        if (clear | set) & !EVENT_SIGNAL_MASK != 0 {
            return Err(Status::ERR_INVALID_ARGS);
        }
        let object = object(handle, Rights::SIGNAL)?;
        let mut signals = object.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *signals = (*signals & !clear) | set;
        Ok(())
    }

    pub(crate) fn object_wait_one(handle: RawHandle, signals: u32, _deadline: i64) -> Result<u32> {
        let object = object(handle, Rights::WAIT)?;
        let observed = *object.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if observed & signals != 0 {
            Ok(observed)
        } else {
            Err(Status::ERR_TIMED_OUT)
        }
    }

    /// Host syscalls that can be made to fail from tests
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub(crate) enum Syscall {
        HandleDuplicate,
        EventCreate,
        ObjectSignal,
    }

    #[cfg(test)]
    thread_local! {
        static FAILURES: std::cell::RefCell<Vec<(Syscall, u32, Status)>> =
            std::cell::RefCell::new(Vec::new());
    }

    /// Make the `skip + 1`-th next call of `call` on this thread fail with `status`
    #[cfg(test)]
    pub(crate) fn fail_nth(call: Syscall, skip: u32, status: Status) {
        FAILURES.with(|failures| failures.borrow_mut().push((call, skip, status)));
    }

    #[cfg(test)]
    pub(crate) fn fail_next(call: Syscall, status: Status) {
        fail_nth(call, 0, status)
    }

    #[cfg(test)]
    pub(crate) fn clear_failures() {
        FAILURES.with(|failures| failures.borrow_mut().clear());
    }

    #[cfg(test)]
    fn injected(call: Syscall) -> Result<()> {
        FAILURES.with(|failures| {
            let mut failures = failures.borrow_mut();
            let position = failures.iter().position(|(c, _, _)| *c == call);
            match position {
                Some(index) if failures[index].1 == 0 => Err(failures.remove(index).2),
                Some(index) => {
                    failures[index].1 -= 1;
                    Ok(())
                }
                None => Ok(()),
            }
        })
    }

    #[cfg(not(test))]
    #[inline]
    fn injected(_call: Syscall) -> Result<()> {
        Ok(())
    }

}
