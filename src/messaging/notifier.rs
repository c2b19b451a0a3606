// Notifier - Last-value cache paired with a listener set
//
// Observers that arrive late read `latest()`; observers that stay around
// subscribe and receive every published value.

use super::listeners::{ListenerSet, Subscription};
use std::sync::{Arc, Mutex, PoisonError};

pub struct Notifier<T> {
    latest: Arc<Mutex<T>>,
    listeners: ListenerSet<T>,
}

impl<T: Clone + Send + 'static> Notifier<T> {
    pub fn new(initial: T) -> Self {
        Self {
            latest: Arc::new(Mutex::new(initial)),
            listeners: ListenerSet::new(),
        }
    }

    /// Copy of the most recently published value
    pub fn latest(&self) -> T {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Store `value` as the latest and deliver it to every listener
    pub fn publish(&self, value: T) {
        {
            let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
            *latest = value.clone();
        }
        self.listeners.emit(&value);
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.listeners.subscribe(callback)
    }
}

impl<T> Clone for Notifier<T> {
    fn clone(&self) -> Self {
        Self {
            latest: Arc::clone(&self.latest),
            listeners: self.listeners.clone(),
        }
    }
}
