//! Zircon kernel objects used by the surface protocol
//!
//! Only the small slice of the kernel the surface needs is covered: owned handles,
//! handle rights, and event objects with signal/clear/wait. On Fuchsia every call goes
//! straight to `libzircon`. On other targets [`sys`] emulates the same object table
//! in-process, so the frame protocol can run (and be tested) on a development host.

mod event;
mod handle;
mod rights;
pub(crate) mod sys;

pub use event::{Event, Signals};
pub use handle::{AsHandleRef, Handle, HandleBased, HandleRef};
pub use rights::Rights;

/// Raw kernel handle value
pub type RawHandle = u32;

/// The invalid handle value
pub const HANDLE_INVALID: RawHandle = 0;

/// Deadline that is always in the past, turning a wait into a poll
pub const TIME_INFINITE_PAST: i64 = i64::MIN;

/// Zircon status code
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Status(i32);

impl Status {
    pub const OK: Status = Status(0);
    pub const ERR_INTERNAL: Status = Status(-1);
    pub const ERR_NOT_SUPPORTED: Status = Status(-2);
    pub const ERR_NO_RESOURCES: Status = Status(-3);
    pub const ERR_NO_MEMORY: Status = Status(-4);
    pub const ERR_INVALID_ARGS: Status = Status(-10);
    pub const ERR_BAD_HANDLE: Status = Status(-11);
    pub const ERR_WRONG_TYPE: Status = Status(-12);
    pub const ERR_BAD_STATE: Status = Status(-20);
    pub const ERR_TIMED_OUT: Status = Status(-21);
    pub const ERR_CANCELED: Status = Status(-23);
    pub const ERR_PEER_CLOSED: Status = Status(-24);
    pub const ERR_ACCESS_DENIED: Status = Status(-30);

    pub const fn from_raw(raw: i32) -> Self {
        Status(raw)
    }

    pub const fn into_raw(self) -> i32 {
        self.0
    }

    /// Turn a raw syscall return value into a `Result`
    pub fn ok(raw: i32) -> Result<()> {
        if raw == Self::OK.0 {
            Ok(())
        } else {
            Err(Status(raw))
        }
    }

    fn name(&self) -> Option<&'static str> {
        Some(match *self {
            Self::OK => "ZX_OK",
            Self::ERR_INTERNAL => "ZX_ERR_INTERNAL",
            Self::ERR_NOT_SUPPORTED => "ZX_ERR_NOT_SUPPORTED",
            Self::ERR_NO_RESOURCES => "ZX_ERR_NO_RESOURCES",
            Self::ERR_NO_MEMORY => "ZX_ERR_NO_MEMORY",
            Self::ERR_INVALID_ARGS => "ZX_ERR_INVALID_ARGS",
            Self::ERR_BAD_HANDLE => "ZX_ERR_BAD_HANDLE",
            Self::ERR_WRONG_TYPE => "ZX_ERR_WRONG_TYPE",
            Self::ERR_BAD_STATE => "ZX_ERR_BAD_STATE",
            Self::ERR_TIMED_OUT => "ZX_ERR_TIMED_OUT",
            Self::ERR_CANCELED => "ZX_ERR_CANCELED",
            Self::ERR_PEER_CLOSED => "ZX_ERR_PEER_CLOSED",
            Self::ERR_ACCESS_DENIED => "ZX_ERR_ACCESS_DENIED",
            _ => return None,
        })
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "zx_status_t({})", self.0),
        }
    }
}

impl std::error::Error for Status {}

pub type Result<T> = std::result::Result<T, Status>;
