//! Generic reactive service container.
//!
//! A `Service` holds one Options value (caller-settable input) and one State
//! value (service-derived output) and notifies subscribed observers whenever
//! either is replaced. It is the in-memory backbone every Glossa service is
//! built on; it performs no I/O and never fails.

use std::sync::{Arc, Mutex};

/// A value the reactive container can hold.
///
/// Options and State types are immutable by convention: they are replaced
/// wholesale via copy-with-overrides (`with_*` builder methods on the
/// concrete types), never mutated in place.
pub trait Entity: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Entity for T {}

/// Receives change notifications from a [`Service`].
///
/// Both callbacks default to no-ops so an observer can register interest in
/// only Options or only State.
pub trait Observer<O: Entity, S: Entity>: Send + Sync {
    /// Called with the new Options value after every options update.
    fn on_options(&self, _options: &O) {}

    /// Called with the new State value after every state update.
    fn on_state(&self, _state: &S) {}
}

struct Inner<O, S> {
    options: O,
    state: S,
    /// Delivery order is subscription order.
    observers: Vec<Arc<dyn Observer<O, S>>>,
}

/// Container for one Options and one State value with ordered observers.
///
/// All updates are synchronous: the new value is installed and every observer
/// notified before the update call returns. Notifications are not
/// deduplicated or debounced; every update triggers one full pass even when
/// the new value equals the old one.
///
/// # Concurrency
///
/// One logical caller drives a service instance at a time; the internal mutex
/// preserves memory safety on multi-threaded runtimes but callers must
/// serialize updates per instance to keep notification order meaningful.
/// Observer callbacks run after the lock is released, so an observer may
/// freely read back [`Service::options`] / [`Service::state`].
pub struct Service<O: Entity, S: Entity> {
    inner: Mutex<Inner<O, S>>,
}

impl<O: Entity, S: Entity> Service<O, S> {
    /// Creates a container with the given initial Options and State.
    pub fn new(options: O, state: S) -> Self {
        Self {
            inner: Mutex::new(Inner {
                options,
                state,
                observers: Vec::new(),
            }),
        }
    }

    /// Returns a snapshot of the current Options.
    pub fn options(&self) -> O {
        self.inner.lock().expect("service lock poisoned").options.clone()
    }

    /// Returns a snapshot of the current State.
    pub fn state(&self) -> S {
        self.inner.lock().expect("service lock poisoned").state.clone()
    }

    /// Replaces Options with the value computed from the current one.
    ///
    /// The closure receives a clone of the current Options and returns the
    /// replacement; the read-modify-write runs under the container lock, so
    /// no concurrent update can interleave between read and write. Every
    /// subscribed observer's options callback runs afterwards, in
    /// subscription order.
    pub fn update_options<F>(&self, f: F) -> O
    where
        F: FnOnce(O) -> O,
    {
        let (next, observers) = {
            let mut inner = self.inner.lock().expect("service lock poisoned");
            let next = f(inner.options.clone());
            inner.options = next.clone();
            (next, inner.observers.clone())
        };
        for observer in &observers {
            observer.on_options(&next);
        }
        next
    }

    /// Replaces State with the value computed from the current one.
    ///
    /// Same contract as [`Service::update_options`], for the State side.
    pub fn update_state<F>(&self, f: F) -> S
    where
        F: FnOnce(S) -> S,
    {
        let (next, observers) = {
            let mut inner = self.inner.lock().expect("service lock poisoned");
            let next = f(inner.state.clone());
            inner.state = next.clone();
            (next, inner.observers.clone())
        };
        for observer in &observers {
            observer.on_state(&next);
        }
        next
    }

    /// Adds an observer, delivering the current Options and State to it
    /// first so a late subscriber never misses the current snapshot.
    pub fn subscribe(&self, observer: Arc<dyn Observer<O, S>>) {
        let (options, state) = {
            let mut inner = self.inner.lock().expect("service lock poisoned");
            let snapshot = (inner.options.clone(), inner.state.clone());
            inner.observers.push(observer.clone());
            snapshot
        };
        observer.on_options(&options);
        observer.on_state(&state);
    }

    /// Removes an observer by pointer identity; no-op if it was never
    /// subscribed.
    pub fn unsubscribe(&self, observer: &Arc<dyn Observer<O, S>>) {
        let mut inner = self.inner.lock().expect("service lock poisoned");
        inner
            .observers
            .retain(|existing| !Arc::ptr_eq(existing, observer));
    }

    /// Number of currently subscribed observers.
    pub fn observer_count(&self) -> usize {
        self.inner.lock().expect("service lock poisoned").observers.len()
    }
}
