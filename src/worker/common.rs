use hash_hasher::HashedMap;
use nohash_hasher::IntMap;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// The entity a worker notification is addressed to: an object id or the worker process PID.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize)]
#[serde(untagged)]
pub enum SubscriptionTarget {
    Uuid(Uuid),
    Number(u64),
}

impl From<u32> for SubscriptionTarget {
    fn from(number: u32) -> Self {
        Self::Number(u64::from(number))
    }
}

struct EventHandlersList<V: ?Sized> {
    index: usize,
    callbacks: IntMap<usize, Arc<dyn Fn(&V) + Send + Sync>>,
}

impl<V: ?Sized> Default for EventHandlersList<V> {
    fn default() -> Self {
        Self {
            index: 0,
            callbacks: IntMap::default(),
        }
    }
}

/// Per-target notification listeners of a channel.
pub(super) struct EventHandlers<V: ?Sized> {
    handlers: Arc<Mutex<HashedMap<SubscriptionTarget, EventHandlersList<V>>>>,
}

impl<V: ?Sized> Clone for EventHandlers<V> {
    fn clone(&self) -> Self {
        Self {
            handlers: Arc::clone(&self.handlers),
        }
    }
}

impl<V: ?Sized + 'static> EventHandlers<V> {
    pub(super) fn new() -> Self {
        Self {
            handlers: Arc::<Mutex<HashedMap<SubscriptionTarget, EventHandlersList<V>>>>::default(),
        }
    }

    pub(super) fn add(
        &self,
        target_id: SubscriptionTarget,
        callback: Box<dyn Fn(&V) + Send + Sync>,
    ) -> SubscriptionHandler {
        let index;
        {
            let mut event_handlers = self.handlers.lock();
            let list = event_handlers.entry(target_id).or_default();
            index = list.index;
            list.index += 1;
            list.callbacks.insert(index, Arc::from(callback));
        }

        SubscriptionHandler::new({
            let event_handlers_weak = Arc::downgrade(&self.handlers);

            Box::new(move || {
                if let Some(event_handlers) = event_handlers_weak.upgrade() {
                    // The removed handler is dropped after the lock is released. It may own
                    // other subscription handlers, and dropping those re-enters this code.
                    let removed_handler;
                    {
                        let mut handlers = event_handlers.lock();
                        let is_empty = {
                            let list = handlers.get_mut(&target_id).unwrap();
                            removed_handler = list.callbacks.remove(&index);
                            list.callbacks.is_empty()
                        };
                        if is_empty {
                            handlers.remove(&target_id);
                        }
                    }
                    drop(removed_handler);
                }
            })
        })
    }

    pub(super) fn call_callbacks_with_value(&self, target_id: &SubscriptionTarget, value: &V) {
        // Snapshot the callbacks so a handler may drop its own (or another) subscription
        // without deadlocking on the handlers lock.
        let callbacks: Vec<Arc<dyn Fn(&V) + Send + Sync>> = {
            let handlers = self.handlers.lock();
            match handlers.get(target_id) {
                Some(list) => list.callbacks.values().map(Arc::clone).collect(),
                None => return,
            }
        };

        for callback in callbacks {
            callback(value);
        }
    }

    pub(super) fn has_listeners(&self, target_id: &SubscriptionTarget) -> bool {
        self.handlers.lock().contains_key(target_id)
    }
}

/// Subscription handler, will remove the corresponding subscription when dropped.
pub(crate) struct SubscriptionHandler {
    remove_callback: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl SubscriptionHandler {
    fn new(remove_callback: Box<dyn FnOnce() + Send + Sync>) -> Self {
        Self {
            remove_callback: Some(remove_callback),
        }
    }
}

impl Drop for SubscriptionHandler {
    fn drop(&mut self) {
        let remove_callback = self.remove_callback.take().unwrap();
        remove_callback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn dispatch_is_scoped_by_target() {
        let event_handlers = EventHandlers::<u32>::new();
        let target_a = SubscriptionTarget::Uuid(Uuid::new_v4());
        let target_b = SubscriptionTarget::Number(12345);
        let calls_a = Arc::new(AtomicUsize::new(0));

        let _handler = event_handlers.add(target_a, {
            let calls_a = Arc::clone(&calls_a);
            Box::new(move |value| {
                assert_eq!(*value, 42);
                calls_a.fetch_add(1, Ordering::SeqCst);
            })
        });

        event_handlers.call_callbacks_with_value(&target_a, &42);
        event_handlers.call_callbacks_with_value(&target_b, &7);

        assert_eq!(calls_a.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_subscription_removes_listener() {
        let event_handlers = EventHandlers::<u32>::new();
        let target = SubscriptionTarget::Number(1);
        let calls = Arc::new(AtomicUsize::new(0));

        let handler = event_handlers.add(target, {
            let calls = Arc::clone(&calls);
            Box::new(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        });

        event_handlers.call_callbacks_with_value(&target, &0);
        drop(handler);
        event_handlers.call_callbacks_with_value(&target, &0);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!event_handlers.has_listeners(&target));
    }
}
