//! Single-threaded async wait dispatcher
//!
//! A [`Wait`] registers a one-shot interest in a kernel object's signals. The dispatcher
//! delivers each registration at most once, from [`Dispatcher::run_until_idle`], and drops it
//! before calling the handler, so a handler that wants another notification must begin the
//! wait again. Cancellation is synchronous: once [`Wait::cancel`] returns the handler will
//! never run.

use crate::zircon::{sys, RawHandle, Signals, Status, HANDLE_INVALID, TIME_INFINITE_PAST};
use slotmap::SlotMap;
use std::cell::RefCell;
use std::rc::Rc;

slotmap::new_key_type! {
    pub struct WaitKey;
}

pub type WaitHandler = Box<dyn FnOnce(Status, Signals)>;

struct PendingWait {
    object: RawHandle,
    trigger: Signals,
    handler: WaitHandler,
}

#[derive(Default)]
pub struct Dispatcher {
    waits: RefCell<SlotMap<WaitKey, PendingWait>>,
    #[cfg(test)]
    cancel_observer: RefCell<Option<Box<dyn Fn(RawHandle)>>>,
}

impl Dispatcher {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn begin_wait(&self, object: RawHandle, trigger: Signals, handler: WaitHandler) -> WaitKey {
        self.waits.borrow_mut().insert(PendingWait {
            object,
            trigger,
            handler,
        })
    }

    /// Returns false if the wait already fired or was never registered
    pub fn cancel(&self, key: WaitKey) -> bool {
        let removed = self.waits.borrow_mut().remove(key);
        match removed {
            Some(wait) => {
                self.notify_cancel(wait.object);
                true
            }
            None => false,
        }
    }

    /// Called with the waited object each time a pending wait is cancelled
    #[cfg(test)]
    pub(crate) fn observe_cancel(&self, observer: impl Fn(RawHandle) + 'static) {
        *self.cancel_observer.borrow_mut() = Some(Box::new(observer));
    }

    #[cfg(test)]
    fn notify_cancel(&self, object: RawHandle) {
        if let Some(observer) = &*self.cancel_observer.borrow() {
            observer(object);
        }
    }

    #[cfg(not(test))]
    fn notify_cancel(&self, _object: RawHandle) {}

    pub fn is_pending(&self, key: WaitKey) -> bool {
        self.waits.borrow().contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.waits.borrow().len()
    }

    /// Deliver every wait whose object is ready, repeating until nothing fires.
    /// Returns the number of handlers run.
    pub fn run_until_idle(&self) -> usize {
        let mut delivered = 0;
        loop {
            let ready: Vec<(WaitKey, Status, Signals)> = self
                .waits
                .borrow()
                .iter()
                .filter_map(|(key, wait)| {
                    match sys::object_wait_one(wait.object, wait.trigger.bits(), TIME_INFINITE_PAST)
                    {
                        Ok(observed) => {
                            Some((key, Status::OK, Signals::from_bits_truncate(observed)))
                        }
                        Err(Status::ERR_TIMED_OUT) => None,
                        Err(status) => Some((key, status, Signals::NONE)),
                    }
                })
                .collect();

            if ready.is_empty() {
                return delivered;
            }

            for (key, status, observed) in ready {
                // An earlier handler in this batch may have cancelled it.
                let wait = self.waits.borrow_mut().remove(key);
                if let Some(wait) = wait {
                    (wait.handler)(status, observed);
                    delivered += 1;
                }
            }
        }
    }
}

/// A reusable one-shot wait on a single object
pub struct Wait {
    dispatcher: Rc<Dispatcher>,
    object: RawHandle,
    trigger: Signals,
    key: Option<WaitKey>,
}

impl Wait {
    pub fn new(dispatcher: Rc<Dispatcher>, trigger: Signals) -> Self {
        Self {
            dispatcher,
            object: HANDLE_INVALID,
            trigger,
            key: None,
        }
    }

    pub fn object(&self) -> RawHandle {
        self.object
    }

    pub fn set_object(&mut self, object: RawHandle) {
        self.object = object;
    }

    pub fn is_pending(&self) -> bool {
        self.key
            .map_or(false, |key| self.dispatcher.is_pending(key))
    }

    pub fn begin(&mut self, handler: WaitHandler) -> crate::zircon::Result<()> {
        if self.object == HANDLE_INVALID {
            return Err(Status::ERR_BAD_HANDLE);
        }
        if self.is_pending() {
            return Err(Status::ERR_BAD_STATE);
        }
        self.key = Some(
            self.dispatcher
                .begin_wait(self.object, self.trigger, handler),
        );
        Ok(())
    }

    pub fn cancel(&mut self) -> bool {
        match self.key.take() {
            Some(key) => self.dispatcher.cancel(key),
            None => false,
        }
    }
}

impl Drop for Wait {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zircon::{AsHandleRef, Event};
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, impl Fn() -> WaitHandler) {
        let count = Rc::new(Cell::new(0));
        let handler_count = count.clone();
        (count, move || -> WaitHandler {
            let count = handler_count.clone();
            Box::new(move |status: Status, _: Signals| {
                assert_eq!(status, Status::OK);
                count.set(count.get() + 1);
            })
        })
    }

    #[test]
    fn wait_fires_once_per_registration() {
        let dispatcher = Dispatcher::new();
        let event = Event::create().unwrap();
        let (count, handler) = counter();

        let mut wait = Wait::new(dispatcher.clone(), Signals::EVENT_SIGNALED);
        wait.set_object(event.raw_handle());
        wait.begin(handler()).unwrap();

        assert_eq!(dispatcher.run_until_idle(), 0);
        event.signal(Signals::NONE, Signals::EVENT_SIGNALED).unwrap();
        assert_eq!(dispatcher.run_until_idle(), 1);
        assert_eq!(dispatcher.run_until_idle(), 0);
        assert_eq!(count.get(), 1);
        assert!(!wait.is_pending());

        wait.begin(handler()).unwrap();
        assert_eq!(dispatcher.run_until_idle(), 1);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn cancelled_wait_never_fires() {
        let dispatcher = Dispatcher::new();
        let event = Event::create().unwrap();
        let (count, handler) = counter();

        let mut wait = Wait::new(dispatcher.clone(), Signals::EVENT_SIGNALED);
        wait.set_object(event.raw_handle());
        wait.begin(handler()).unwrap();
        assert!(wait.cancel());

        event.signal(Signals::NONE, Signals::EVENT_SIGNALED).unwrap();
        assert_eq!(dispatcher.run_until_idle(), 0);
        assert_eq!(count.get(), 0);
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[test]
    fn double_begin_is_rejected() {
        let dispatcher = Dispatcher::new();
        let event = Event::create().unwrap();
        let (_count, handler) = counter();

        let mut wait = Wait::new(dispatcher.clone(), Signals::EVENT_SIGNALED);
        assert_eq!(wait.begin(handler()), Err(Status::ERR_BAD_HANDLE));

        wait.set_object(event.raw_handle());
        wait.begin(handler()).unwrap();
        assert_eq!(wait.begin(handler()), Err(Status::ERR_BAD_STATE));
        assert_eq!(dispatcher.pending_count(), 1);
    }

    #[test]
    fn closed_object_reports_error_status() {
        let dispatcher = Dispatcher::new();
        let event = Event::create().unwrap();
        let seen = Rc::new(Cell::new(Status::OK));

        let seen_by_handler = seen.clone();
        dispatcher.begin_wait(
            event.raw_handle(),
            Signals::EVENT_SIGNALED,
            Box::new(move |status: Status, observed: Signals| {
                assert_eq!(observed, Signals::NONE);
                seen_by_handler.set(status);
            }),
        );
        drop(event);

        assert_eq!(dispatcher.run_until_idle(), 1);
        assert_eq!(seen.get(), Status::ERR_BAD_HANDLE);
    }

    #[test]
    fn handler_may_cancel_a_ready_sibling() {
        let dispatcher = Dispatcher::new();
        let event = Event::create().unwrap();
        event.signal(Signals::NONE, Signals::EVENT_SIGNALED).unwrap();

        let second: Rc<Cell<Option<WaitKey>>> = Rc::new(Cell::new(None));
        let fired = Rc::new(Cell::new(0));

        let (d, s, f) = (dispatcher.clone(), second.clone(), fired.clone());
        dispatcher.begin_wait(
            event.raw_handle(),
            Signals::EVENT_SIGNALED,
            Box::new(move |_: Status, _: Signals| {
                f.set(f.get() + 1);
                if let Some(key) = s.get() {
                    d.cancel(key);
                }
            }),
        );
        let f = fired.clone();
        second.set(Some(dispatcher.begin_wait(
            event.raw_handle(),
            Signals::EVENT_SIGNALED,
            Box::new(move |_: Status, _: Signals| f.set(f.get() + 1)),
        )));

        assert_eq!(dispatcher.run_until_idle(), 1);
        assert_eq!(fired.get(), 1);
    }
}
