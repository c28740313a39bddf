//! One-shot, multi-subscriber completion notification
//!
//! A [`CompletionObservable`] fires at most once. Every subscriber registered
//! before the firing is notified exactly once, in subscription order; the
//! subscriber list is cleared right after. Subscribers registered later are
//! inert: there is no replay of a past event.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

type Subscriber<T> = Box<dyn FnOnce(&T) + Send>;

struct Inner<T> {
    fired: bool,
    subscribers: Vec<Subscriber<T>>,
}

/// One-shot notification with any number of subscribers
pub struct CompletionObservable<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> CompletionObservable<T> {
    /// Create an observable that has not fired yet
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                fired: false,
                subscribers: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a closure to run when the observable fires
    ///
    /// After the observable has fired the closure is dropped without running.
    pub fn subscribe<F>(&self, f: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        let mut inner = self.lock();
        if !inner.fired {
            inner.subscribers.push(Box::new(f));
        }
    }

    /// Fire the observable
    ///
    /// Runs every subscriber once, in subscription order, on the calling
    /// thread, then clears the list. Returns false if it had already fired.
    pub fn notify_all(&self, value: &T) -> bool {
        let subscribers = {
            let mut inner = self.lock();
            if inner.fired {
                return false;
            }
            inner.fired = true;
            std::mem::take(&mut inner.subscribers)
        };

        // Run outside the lock so subscribers may touch the observable
        for subscriber in subscribers {
            subscriber(value);
        }
        self.clear();
        true
    }

    /// Drop all pending subscribers without running them
    pub fn clear(&self) {
        self.lock().subscribers.clear();
    }

    /// Whether the observable has fired
    pub fn has_fired(&self) -> bool {
        self.lock().fired
    }

    /// Number of subscribers waiting for the firing
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

impl<T: Clone + Send + 'static> CompletionObservable<T> {
    /// Subscribe through a oneshot channel
    ///
    /// If the observable has already fired the sender is dropped immediately,
    /// so the receiver resolves to an error instead of waiting forever.
    pub fn subscribe_channel(&self) -> oneshot::Receiver<T> {
        let (tx, rx) = oneshot::channel();
        self.subscribe(move |value: &T| {
            let _ = tx.send(value.clone());
        });
        rx
    }
}

impl<T> Default for CompletionObservable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for CompletionObservable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("CompletionObservable")
            .field("fired", &inner.fired)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}
