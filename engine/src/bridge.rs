//! Subscription-based dispatch from the session to the presentational layer.
//!
//! A [`Bridge`] fans items out to every registered handler, synchronously and in
//! registration order. [`Bridge::subscribe`] returns a [`Subscription`]; dropping it
//! (or calling [`Subscription::unsubscribe`]) removes the handler.
//!
//! Handlers run while the bridge is locked: a handler must not subscribe to or
//! unsubscribe from the bridge that is calling it.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Handler<T> = Box<dyn FnMut(&T) + Send>;

struct Slots<T> {
    next_id: u64,
    handlers: Vec<(u64, Handler<T>)>,
}

pub struct Bridge<T> {
    slots: Arc<Mutex<Slots<T>>>,
}

impl<T: 'static> Bridge<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots<T>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(&T) + Send + 'static,
    {
        let id = {
            let mut slots = self.lock();
            let id = slots.next_id;
            slots.next_id = slots.next_id.wrapping_add(1);
            slots.handlers.push((id, Box::new(handler)));
            id
        };

        let weak: Weak<Mutex<Slots<T>>> = Arc::downgrade(&self.slots);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(slots) = weak.upgrade() {
                    let mut slots = slots.lock().unwrap_or_else(PoisonError::into_inner);
                    slots.handlers.retain(|(handler_id, _)| *handler_id != id);
                }
            })),
        }
    }

    /// Deliver `item` to every handler. Returns how many handlers saw it.
    pub fn emit(&self, item: &T) -> usize {
        let mut slots = self.lock();
        for (_, handler) in &mut slots.handlers {
            handler(item);
        }
        slots.handlers.len()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().handlers.len()
    }
}

impl<T: 'static> Default for Bridge<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Bridge<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self
            .slots
            .lock()
            .map_or(0, |slots| slots.handlers.len());
        f.debug_struct("Bridge").field("subscribers", &count).finish()
    }
}

/// Handle for one registered handler. The handler is removed on drop.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }

    /// Keep the handler registered for as long as the bridge lives.
    pub fn detach(mut self) {
        self.remove = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Bridge;
    use std::sync::{Arc, Mutex};

    #[test]
    fn emits_to_all_subscribers_in_order() {
        let bridge: Bridge<u32> = Bridge::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let first_log = Arc::clone(&log);
        let _first = bridge.subscribe(move |n| first_log.lock().unwrap().push(("first", *n)));
        let second_log = Arc::clone(&log);
        let _second = bridge.subscribe(move |n| second_log.lock().unwrap().push(("second", *n)));

        assert_eq!(bridge.emit(&7), 2);
        assert_eq!(*log.lock().unwrap(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn unsubscribe_and_drop_remove_handler() {
        let bridge: Bridge<&'static str> = Bridge::new();
        let count = Arc::new(Mutex::new(0));

        let counter = Arc::clone(&count);
        let subscription = bridge.subscribe(move |_| *counter.lock().unwrap() += 1);
        bridge.emit(&"a");
        subscription.unsubscribe();
        assert_eq!(bridge.emit(&"b"), 0);

        let counter = Arc::clone(&count);
        {
            let _scoped = bridge.subscribe(move |_| *counter.lock().unwrap() += 1);
            bridge.emit(&"c");
        }
        assert_eq!(bridge.subscriber_count(), 0);
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn detached_subscription_stays_registered() {
        let bridge: Bridge<()> = Bridge::new();
        bridge.subscribe(|()| {}).detach();
        assert_eq!(bridge.subscriber_count(), 1);
    }

    #[test]
    fn subscription_outliving_bridge_is_harmless() {
        let bridge: Bridge<()> = Bridge::new();
        let subscription = bridge.subscribe(|()| {});
        drop(bridge);
        subscription.unsubscribe();
    }
}
