//! Observer primitives used across the crate.
//!
//! Every public object exposes `on_*` registration methods backed by a [`Bag`]
//! (repeatable events) or a [`BagOnce`] (terminal events such as `close`).
//! Registration returns a [`HandlerId`] that removes the handler when dropped.

use log::error;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

/// Handler ID keeps an event handler in place, once dropped the handler is removed automatically.
///
/// [`HandlerId::detach()`] can be used if it is not desirable for the handler to be removed
/// automatically.
#[must_use = "Handler will be unregistered immediately if not used"]
pub struct HandlerId {
    callback: Option<Box<dyn FnOnce() + Send>>,
}

impl HandlerId {
    /// Consumes `HandlerId` and prevents the handler from being removed automatically.
    pub fn detach(mut self) {
        // Remove callback such that it is not called in drop implementation
        self.callback.take();
    }
}

impl Drop for HandlerId {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback();
        }
    }
}

struct Inner<F: ?Sized + Send + Sync> {
    handlers: HashMap<usize, Arc<F>>,
    next_index: usize,
}

/// A set of repeatable event handlers. Handlers are invoked in registration order; the set is
/// snapshotted before invocation so handlers may add or remove handlers re-entrantly without
/// affecting the in-flight call.
pub(crate) struct Bag<F: ?Sized + Send + Sync + 'static> {
    inner: Arc<Mutex<Inner<F>>>,
}

impl<F: ?Sized + Send + Sync> Clone for Bag<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ?Sized + Send + Sync> Default for Bag<F> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                handlers: HashMap::new(),
                next_index: 0,
            })),
        }
    }
}

impl<F: ?Sized + Send + Sync + 'static> Bag<F> {
    pub(crate) fn add(&self, callback: Arc<F>) -> HandlerId {
        let index;

        {
            let mut inner = self.inner.lock();

            index = inner.next_index;
            inner.next_index += 1;

            inner.handlers.insert(index, callback);
        }

        let weak_inner = Arc::downgrade(&self.inner);
        HandlerId {
            callback: Some(Box::new(move || {
                if let Some(inner) = weak_inner.upgrade() {
                    // Drop the removed handler outside of the lock, it may own other handler ids
                    let removed = inner.lock().handlers.remove(&index);
                    drop(removed);
                }
            })),
        }
    }

    fn snapshot(&self) -> Vec<Arc<F>> {
        let inner = self.inner.lock();
        let mut handlers: Vec<_> = inner.handlers.iter().collect();
        handlers.sort_by_key(|(index, _)| **index);
        handlers
            .into_iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect()
    }

    /// Call applicator with each handler; a failing handler propagates to the caller.
    pub(crate) fn call<A>(&self, applicator: A)
    where
        A: Fn(&F),
    {
        for callback in self.snapshot() {
            applicator(&callback);
        }
    }

    /// Call applicator with each handler; a panicking handler is logged and the remaining
    /// handlers still run.
    pub(crate) fn safe_call<A>(&self, applicator: A)
    where
        A: Fn(&F),
    {
        for callback in self.snapshot() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| applicator(&callback))) {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("event handler panicked: {}", reason);
            }
        }
    }
}

impl<F: Fn() + ?Sized + Send + Sync + 'static> Bag<F> {
    /// Call each handler without arguments.
    pub(crate) fn call_simple(&self) {
        self.call(|callback| callback());
    }
}

struct InnerOnce<F: ?Sized + Send> {
    handlers: HashMap<usize, Box<F>>,
    next_index: usize,
}

/// A set of one-shot event handlers, consumed by the first call.
pub(crate) struct BagOnce<F: ?Sized + Send + 'static> {
    inner: Arc<Mutex<InnerOnce<F>>>,
}

impl<F: ?Sized + Send> Clone for BagOnce<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ?Sized + Send> Default for BagOnce<F> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(InnerOnce {
                handlers: HashMap::new(),
                next_index: 0,
            })),
        }
    }
}

impl<F: ?Sized + Send + 'static> BagOnce<F> {
    pub(crate) fn add(&self, callback: Box<F>) -> HandlerId {
        let index;

        {
            let mut inner = self.inner.lock();

            index = inner.next_index;
            inner.next_index += 1;

            inner.handlers.insert(index, callback);
        }

        let weak_inner = Arc::downgrade(&self.inner);
        HandlerId {
            callback: Some(Box::new(move || {
                if let Some(inner) = weak_inner.upgrade() {
                    let removed = inner.lock().handlers.remove(&index);
                    drop(removed);
                }
            })),
        }
    }

    /// Call applicator with each handler, consuming them all.
    pub(crate) fn call<A>(&self, mut applicator: A)
    where
        A: FnMut(Box<F>),
    {
        let handlers = {
            let mut inner = self.inner.lock();
            let mut handlers: Vec<_> = mem::take(&mut inner.handlers).into_iter().collect();
            handlers.sort_by_key(|(index, _)| *index);
            handlers
        };
        for (_, callback) in handlers {
            applicator(callback);
        }
    }
}

impl<F: FnOnce() + ?Sized + Send + 'static> BagOnce<F> {
    /// Call each handler without arguments, consuming them all.
    pub(crate) fn call_simple(&self) {
        self.call(|callback| callback());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn bag_keeps_handlers() {
        let bag = Bag::<dyn Fn() + Send + Sync>::default();
        let calls = Arc::new(AtomicUsize::new(0));

        {
            let calls = Arc::clone(&calls);
            bag.add(Arc::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
            }))
            .detach();
        }
        {
            // Dropped immediately, must never fire
            let calls = Arc::clone(&calls);
            drop(bag.add(Arc::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
            })));
        }

        bag.call_simple();
        bag.call_simple();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn bag_once_consumes_handlers() {
        let bag = BagOnce::<dyn FnOnce() + Send>::default();
        let calls = Arc::new(AtomicUsize::new(0));

        {
            let calls = Arc::clone(&calls);
            bag.add(Box::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
            }))
            .detach();
        }

        bag.call_simple();
        bag.call_simple();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn safe_call_survives_panicking_handler() {
        let bag = Bag::<dyn Fn() + Send + Sync>::default();
        let calls = Arc::new(AtomicUsize::new(0));

        bag.add(Arc::new(|| panic!("boom"))).detach();
        {
            let calls = Arc::clone(&calls);
            bag.add(Arc::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
            }))
            .detach();
        }

        bag.safe_call(|callback| callback());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reentrant_add_does_not_affect_in_flight_call() {
        let bag = Bag::<dyn Fn() + Send + Sync>::default();
        let calls = Arc::new(AtomicUsize::new(0));

        {
            let bag_clone = bag.clone();
            let calls = Arc::clone(&calls);
            bag.add(Arc::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                let calls = Arc::clone(&calls);
                bag_clone
                    .add(Arc::new(move || {
                        calls.fetch_add(1, Ordering::SeqCst);
                    }))
                    .detach();
            }))
            .detach();
        }

        bag.call_simple();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        bag.call_simple();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
