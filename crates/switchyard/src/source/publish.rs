//! Multicast, replay-free fan-out point.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::cancellable::{lock, Cancellable};
use crate::sink::Sink;

use super::{Source, SourceId};

pub(crate) struct Subscribers<T> {
    next_key: AtomicU64,
    sinks: Mutex<Vec<(u64, Sink<T>)>>,
}

impl<T> Subscribers<T> {
    pub(crate) fn new() -> Self {
        Self {
            next_key: AtomicU64::new(0),
            sinks: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn insert(&self, sink: Sink<T>) -> u64 {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        lock(&self.sinks).push((key, sink));
        key
    }

    pub(crate) fn remove(&self, key: u64) {
        lock(&self.sinks).retain(|(k, _)| *k != key);
    }

    pub(crate) fn snapshot(&self) -> Vec<Sink<T>> {
        lock(&self.sinks).iter().map(|(_, s)| s.clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.sinks).len()
    }
}

/// Hands `value` to each sink in `sinks`, in order.
///
/// A panicking sink is logged and skipped; the remaining sinks still receive.
pub(crate) fn deliver<T: Clone>(id: SourceId, sinks: Vec<Sink<T>>, value: T) {
    let last = sinks.len().saturating_sub(1);
    let mut value = Some(value);
    for (i, sink) in sinks.into_iter().enumerate() {
        let v = if i == last {
            match value.take() {
                Some(v) => v,
                None => return,
            }
        } else {
            match value.as_ref() {
                Some(v) => v.clone(),
                None => return,
            }
        };
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| sink.accept(v))) {
            tracing::error!(source = %id, sink = %sink, ?panic, "sink panicked during delivery");
        }
    }
}

struct PublishInner<T> {
    id: SourceId,
    subscribers: Subscribers<T>,
}

/// Multicast source without replay.
///
/// Values are delivered to the subscribers registered at the moment of
/// emission. A subscriber added or removed while an emission is in flight does
/// not change who receives that emission.
pub struct PublishSource<T> {
    inner: Arc<PublishInner<T>>,
}

impl<T> Clone for PublishSource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> PublishSource<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PublishInner {
                id: SourceId::next(),
                subscribers: Subscribers::new(),
            }),
        }
    }

    /// Emits `value` to all current subscribers.
    pub fn accept(&self, value: T) {
        let sinks = self.inner.subscribers.snapshot();
        tracing::trace!(source = %self.inner.id, subscribers = sinks.len(), "publish");
        deliver(self.inner.id, sinks, value);
    }

    /// Sink side of this source: values accepted by the sink are emitted.
    pub fn sink(&self) -> Sink<T> {
        let this = self.clone();
        Sink::new(move |value| this.accept(value)).labelled(format!("{}", self.inner.id))
    }

    /// Number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Type-erased handle to the source side.
    pub fn shared(&self) -> super::SharedSource<T> {
        Arc::new(self.clone())
    }
}

impl<T> Default for PublishSource<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Source<T> for PublishSource<T>
where
    T: Clone + Send + 'static,
{
    fn subscribe(&self, sink: Sink<T>) -> Cancellable {
        let key = self.inner.subscribers.insert(sink);
        let weak: Weak<PublishInner<T>> = Arc::downgrade(&self.inner);
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
