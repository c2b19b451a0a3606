// Listener sets - Typed callback registries with unregister handles
//
// One ListenerSet per event category (ticks, errors, state changes).
// Emits work on a snapshot of the registered listeners and hold no lock
// while calling them: concurrent emits from different threads all reach
// every listener, and a listener may subscribe, unsubscribe or emit from
// inside its own callback. Callbacks are therefore `Fn + Sync`.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;

struct Listener<T: ?Sized> {
    id: u64,
    /// Cleared on unsubscribe so in-flight emits skip the callback
    active: AtomicBool,
    callback: Callback<T>,
}

struct Slots<T: ?Sized> {
    next_id: u64,
    listeners: Vec<Arc<Listener<T>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Set of listeners for one event type
pub struct ListenerSet<T: ?Sized> {
    slots: Arc<Mutex<Slots<T>>>,
}

impl<T: ?Sized + 'static> ListenerSet<T> {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    /// Register a callback. The returned handle unregisters it.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let listener = {
            let mut slots = lock(&self.slots);
            let listener = Arc::new(Listener {
                id: slots.next_id,
                active: AtomicBool::new(true),
                callback: Box::new(callback),
            });
            slots.next_id += 1;
            slots.listeners.push(Arc::clone(&listener));
            listener
        };

        let weak = Arc::downgrade(&self.slots);
        Subscription::new(move || {
            listener.active.store(false, Ordering::Release);
            if let Some(slots) = weak.upgrade() {
                lock(&slots)
                    .listeners
                    .retain(|other| !Arc::ptr_eq(other, &listener));
            }
        })
    }

    /// Deliver `value` to every listener, in registration order.
    ///
    /// A panicking listener is isolated: the panic is caught and logged and
    /// the remaining listeners still run. Returns the number of listeners
    /// that completed normally.
    pub fn emit(&self, value: &T) -> usize {
        let snapshot: Vec<Arc<Listener<T>>> = lock(&self.slots).listeners.clone();

        let mut delivered = 0;
        for listener in &snapshot {
            if !listener.active.load(Ordering::Acquire) {
                continue;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| (listener.callback)(value))) {
                Ok(()) => delivered += 1,
                Err(_) => log::warn!(
                    "listener {} panicked; continuing with the others",
                    listener.id
                ),
            }
        }
        delivered
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        lock(&self.slots).listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: ?Sized + 'static> Default for ListenerSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Clone for ListenerSet<T> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<T: ?Sized> fmt::Debug for ListenerSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("listeners", &lock(&self.slots).listeners.len())
            .finish()
    }
}

/// Handle returned by every `on_*` registration.
///
/// Dropping the handle keeps the listener registered; ownership of
/// unregistration stays with the caller via `unsubscribe`.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub(crate) fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Unregister the listener
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_reaches_all_listeners() {
        let set: ListenerSet<u32> = ListenerSet::new();
        let total = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let total = Arc::clone(&total);
            let _ = set.subscribe(move |value| {
                total.fetch_add(*value as usize, Ordering::SeqCst);
            });
        }

        assert_eq!(set.emit(&2), 3);
        assert_eq!(total.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_unsubscribe_removes_listener() {
        let set: ListenerSet<u32> = ListenerSet::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let subscription = set.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        set.emit(&1);
        subscription.unsubscribe();
        set.emit(&1);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(set.is_empty());
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let set: ListenerSet<u32> = ListenerSet::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let _ = set.subscribe(|_| panic!("listener failure"));
        let calls_clone = Arc::clone(&calls);
        let _ = set.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(set.emit(&7), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The panicking listener stays registered and the set still works
        assert_eq!(set.len(), 2);
        set.emit(&7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_subscribe_during_emit() {
        let set: ListenerSet<u32> = ListenerSet::new();
        let inner_set = set.clone();
        let late_calls = Arc::new(AtomicUsize::new(0));
        let late_calls_clone = Arc::clone(&late_calls);

        let _ = set.subscribe(move |_| {
            let late_calls = Arc::clone(&late_calls_clone);
            let _ = inner_set.subscribe(move |_| {
                late_calls.fetch_add(1, Ordering::SeqCst);
            });
        });

        set.emit(&0);
        assert_eq!(set.len(), 2);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);

        set.emit(&0);
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_self_during_emit() {
        let set: ListenerSet<u32> = ListenerSet::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let slot_clone = Arc::clone(&slot);

        let subscription = set.subscribe(move |_| {
            if let Some(own) = slot_clone.lock().unwrap().take() {
                own.unsubscribe();
            }
        });
        *slot.lock().unwrap() = Some(subscription);

        set.emit(&0);
        assert!(set.is_empty());
    }

    #[test]
    fn test_concurrent_emits_reach_every_listener() {
        use std::thread;
        use std::time::Duration;

        let set: ListenerSet<u32> = ListenerSet::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let _ = set.subscribe(move |_| {
            thread::sleep(Duration::from_millis(50));
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        let other = set.clone();
        let first = thread::spawn(move || other.emit(&1));
        thread::sleep(Duration::from_millis(10));
        let second = set.emit(&2);

        assert_eq!(first.join().unwrap(), 1);
        assert_eq!(second, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribed_listener_skipped_by_running_emit() {
        let set: ListenerSet<u32> = ListenerSet::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let later_calls = Arc::new(AtomicUsize::new(0));

        let slot_clone = Arc::clone(&slot);
        let _ = set.subscribe(move |_| {
            if let Some(later) = slot_clone.lock().unwrap().take() {
                later.unsubscribe();
            }
        });
        let later_calls_clone = Arc::clone(&later_calls);
        let later = set.subscribe(move |_| {
            later_calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        *slot.lock().unwrap() = Some(later);

        assert_eq!(set.emit(&0), 1);
        assert_eq!(later_calls.load(Ordering::SeqCst), 0);
        assert_eq!(set.len(), 1);
    }
}
