//! Multicast source that replays its latest value to new subscribers.

use std::sync::{Arc, Mutex, Weak};

use crate::cancellable::{lock, Cancellable};
use crate::sink::Sink;

use super::publish::{deliver, Subscribers};
use super::{Source, SourceId};

struct BehaviorInner<T> {
    id: SourceId,
    latest: Mutex<Option<T>>,
    subscribers: Subscribers<T>,
}

/// Holds the latest value and replays exactly that value on subscribe.
///
/// Without an initial value, a subscriber added before the first emission
/// receives nothing until something is emitted.
pub struct BehaviorSource<T> {
    inner: Arc<BehaviorInner<T>>,
}

impl<T> Clone for BehaviorSource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> BehaviorSource<T>
where
    T: Clone + Send + 'static,
{
    /// Creates a source holding `initial`.
    pub fn new(initial: T) -> Self {
        Self::from_option(Some(initial))
    }

    /// Creates a source with no value yet.
    pub fn empty() -> Self {
        Self::from_option(None)
    }

    fn from_option(latest: Option<T>) -> Self {
        Self {
            inner: Arc::new(BehaviorInner {
                id: SourceId::next(),
                latest: Mutex::new(latest),
                subscribers: Subscribers::new(),
            }),
        }
    }

    /// Stores `value` as the latest value and emits it.
    pub fn accept(&self, value: T) {
        let sinks = {
            let mut latest = lock(&self.inner.latest);
            *latest = Some(value.clone());
            self.inner.subscribers.snapshot()
        };
        deliver(self.inner.id, sinks, value);
    }

    /// Replaces the latest value with `f(latest)` and emits the result.
    ///
    /// The read-modify-write happens under one lock, so concurrent updates
    /// never fold against a stale value. Returns `(old, new)`, or `None` if
    /// there was no value to update.
    pub fn update<F>(&self, f: F) -> Option<(T, T)>
    where
        F: FnOnce(&T) -> T,
    {
        let (old, new, sinks) = {
            let mut latest = lock(&self.inner.latest);
            let old = latest.as_ref()?.clone();
            let new = f(&old);
            *latest = Some(new.clone());
            (old, new, self.inner.subscribers.snapshot())
        };
        deliver(self.inner.id, sinks, new.clone());
        Some((old, new))
    }

    /// Latest value, if any.
    pub fn value(&self) -> Option<T> {
        lock(&self.inner.latest).clone()
    }

    /// Sink side: accepted values become the latest value and are emitted.
    pub fn sink(&self) -> Sink<T> {
        let this = self.clone();
        Sink::new(move |value| this.accept(value)).labelled(format!("{}", self.inner.id))
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    pub fn shared(&self) -> super::SharedSource<T> {
        Arc::new(self.clone())
    }
}

impl<T> Source<T> for BehaviorSource<T>
where
    T: Clone + Send + 'static,
{
    fn subscribe(&self, sink: Sink<T>) -> Cancellable {
        let (key, replay) = {
            let latest = lock(&self.inner.latest);
            let key = self.inner.subscribers.insert(sink.clone());
            (key, latest.clone())
        };
        if let Some(value) = replay {
            deliver(self.inner.id, vec![sink], value);
        }
        let weak: Weak<BehaviorInner<T>> = Arc::downgrade(&self.inner);
        Cancellable::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.subscribers.remove(key);
            }
        })
    }

    fn source_id(&self) -> SourceId {
        self.inner.id
    }
}
