//! # Value producers.
//!
//! A [`Source`] hands values to every [`Sink`] subscribed to it. Each source
//! carries a [`SourceId`] allocated once, when the source is created; the
//! binder keys its fan-out cache by that id, so two connections naming the
//! same source share one upstream subscription while two structurally equal
//! but distinct sources never do.
//!
//! ## Provided sources
//! | Source               | Replay        | Completes                  |
//! |----------------------|---------------|----------------------------|
//! | [`PublishSource`]    | none          | never                      |
//! | [`BehaviorSource`]   | latest value  | never                      |
//! | [`just`] / [`of`]    | n/a           | inside `subscribe`         |
//! | [`from_stream`]      | n/a           | when the stream ends       |
//! | [`create`]           | user-defined  | user-defined               |

mod behavior;
mod ops;
mod publish;
mod stream;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::cancellable::Cancellable;
use crate::sink::Sink;

pub use behavior::BehaviorSource;
pub use ops::SourceExt;
pub use publish::PublishSource;
pub use stream::{from_future, from_stream};

/// Opaque identity of a source instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

impl SourceId {
    /// Allocates a fresh, process-unique id.
    pub fn next() -> Self {
        SourceId(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// Producer of values to subscribed sinks.
pub trait Source<T>: Send + Sync + 'static {
    /// Registers `sink`; values flow until the returned handle is cancelled
    /// (or the source finishes on its own).
    fn subscribe(&self, sink: Sink<T>) -> Cancellable;

    /// Identity used for de-duplication. Must be stable for the lifetime of the source.
    fn source_id(&self) -> SourceId;
}

/// Shared, type-erased source.
pub type SharedSource<T> = Arc<dyn Source<T>>;

impl<T: 'static> Source<T> for Arc<dyn Source<T>> {
    fn subscribe(&self, sink: Sink<T>) -> Cancellable {
        (**self).subscribe(sink)
    }

    fn source_id(&self) -> SourceId {
        (**self).source_id()
    }
}

/// Conversion into a [`SharedSource`], used wherever an origin is expected.
///
/// Identity survives the conversion: the returned source reports the same
/// [`SourceId`] as `self`.
pub trait IntoSource<T> {
    fn into_source(self) -> SharedSource<T>;
}

impl<T, S> IntoSource<T> for S
where
    S: Source<T>,
{
    fn into_source(self) -> SharedSource<T> {
        Arc::new(self)
    }
}

type SubscribeFn<T> = dyn Fn(Sink<T>) -> Cancellable + Send + Sync;

/// Source built from a subscribe closure. See [`create`].
pub struct FnSource<T> {
    id: SourceId,
    on_subscribe: Arc<SubscribeFn<T>>,
}

impl<T: 'static> Source<T> for FnSource<T> {
    fn subscribe(&self, sink: Sink<T>) -> Cancellable {
        (self.on_subscribe)(sink)
    }

    fn source_id(&self) -> SourceId {
        self.id
    }
}

/// Builds a source whose subscription behavior is `on_subscribe`.
///
/// The closure runs once per subscriber and returns the handle that tears
/// that subscriber down.
pub fn create<T, F>(on_subscribe: F) -> SharedSource<T>
where
    T: 'static,
    F: Fn(Sink<T>) -> Cancellable + Send + Sync + 'static,
{
    Arc::new(FnSource {
        id: SourceId::next(),
        on_subscribe: Arc::new(on_subscribe),
    })
}

/// Emits `value` to each subscriber, then finishes.
pub fn just<T>(value: T) -> SharedSource<T>
where
    T: Clone + Send + Sync + 'static,
{
    of([value])
}

/// Emits every value of `values`, in order, to each subscriber, then finishes.
pub fn of<T, I>(values: I) -> SharedSource<T>
where
    T: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = T>,
{
    let values: Arc<[T]> = values.into_iter().collect();
    create(move |sink| {
        for value in values.iter() {
            sink.accept(value.clone());
        }
        Cancellable::finished()
    })
}

/// Finishes immediately without emitting.
pub fn empty<T: 'static>() -> SharedSource<T> {
    create(|_sink| Cancellable::finished())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn collector<T: Send + 'static>() -> (Sink<T>, Arc<Mutex<Vec<T>>>) {
        let values = Arc::new(Mutex::new(Vec::new()));
        let v = values.clone();
        (Sink::new(move |x| v.lock().unwrap().push(x)), values)
    }

    #[test]
    fn of_emits_values_in_order_and_finishes() {
        let (sink, values) = collector();
        let handle = of([1, 2, 3]).subscribe(sink);
        assert_eq!(*values.lock().unwrap(), vec![1, 2, 3]);
        assert!(handle.is_cancelled());
    }

    #[test]
    fn finite_sources_replay_per_subscriber() {
        let source = just("x");
        let (a, av) = collector();
        let (b, bv) = collector();
        let _ = source.subscribe(a);
        let _ = source.subscribe(b);
        assert_eq!(*av.lock().unwrap(), vec!["x"]);
        assert_eq!(*bv.lock().unwrap(), vec!["x"]);
    }

    #[test]
    fn empty_emits_nothing() {
        let (sink, values) = collector::<i32>();
        let handle = empty().subscribe(sink);
        assert!(values.lock().unwrap().is_empty());
        assert!(handle.is_cancelled());
    }

    #[test]
    fn ids_are_unique_per_instance() {
        let a = just(1);
        let b = just(1);
        assert_ne!(a.source_id(), b.source_id());
        assert_eq!(a.source_id(), a.clone().source_id());
    }
}
