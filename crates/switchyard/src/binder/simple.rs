//! Unconditional binder: connections are live from `bind` until `cancel`.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;

use crate::cancellable::{Cancellable, CompositeCancellable};
use crate::connection::Connection;
use crate::sink::Sink;
use crate::source::{BehaviorSource, PublishSource, SharedSource, Source, SourceExt, SourceId};

use super::Binding;

type CachedSource = Arc<dyn Any + Send + Sync>;

/// Per-origin state shared by every connection naming that origin.
#[derive(Clone)]
struct Origin {
    fan_out: CachedSource,
    /// Cancelled once the origin finishes or its subscription is torn down.
    /// Holds the completion guards of middleware-observed connections.
    completion: CompositeCancellable,
}

/// Wiring engine shared by both binder variants.
///
/// ```text
/// origin ──(one subscription)──► internal PublishSource ──┬─► route ─► delay ─► [hop] ─► sink A
///                                                          └─► route ─► delay ─► [hop] ─► sink B
/// ```
pub(crate) struct SimpleBinder {
    cancellables: CompositeCancellable,
    /// One internal fan-out per origin, keyed by the origin's identity.
    ///
    /// Downstream subscriptions hang off the internal source, so values already
    /// in flight when the binder is cancelled still reach every sink that was
    /// registered at emission time.
    internal_sources: DashMap<SourceId, Origin>,
    /// Holds `false` while the init block runs.
    initialized: BehaviorSource<bool>,
    /// Origin completions seen during the init block, released after the flush.
    deferred_completions: CompositeCancellable,
}

impl SimpleBinder {
    /// Creates a binder whose init block is still running.
    pub(crate) fn initializing() -> Self {
        Self::with_gate(false)
    }

    /// Creates a binder with no init block to wait for.
    pub(crate) fn ready() -> Self {
        Self::with_gate(true)
    }

    fn with_gate(initialized: bool) -> Self {
        Self {
            cancellables: CompositeCancellable::new(),
            internal_sources: DashMap::new(),
            initialized: BehaviorSource::new(initialized),
            deferred_completions: CompositeCancellable::new(),
        }
    }

    /// Releases everything buffered during the init block.
    pub(crate) fn finish_init(&self) {
        if self.initialized.value() != Some(true) {
            self.initialized.accept(true);
        }
        self.deferred_completions.cancel();
    }

    pub(crate) fn connect<Out, In>(&self, binding: &Binding<Out, In>)
    where
        Out: Clone + Send + 'static,
        In: Clone + Send + 'static,
    {
        if self.is_cancelled() {
            tracing::debug!(connection = %binding.connection, "binder cancelled; connection ignored");
            return;
        }
        let Some(from) = binding.connection.from() else {
            return;
        };

        let (internal, completion, created) = self.internal_source_for::<Out>(from.source_id());
        let mut source: SharedSource<In> = binding.connection.route(internal.shared());

        if self.initialized.value() != Some(true) {
            source = source.delay_until(self.initialized.clone());
        }
        if let Some(scheduler) = binding.connection.scheduler() {
            source = source.observe_on(Arc::clone(scheduler));
        }

        let handle = match &binding.middleware {
            Some(middleware) => {
                let connection = binding.connection.clone();
                middleware.on_bind(&connection);
                let to = connection.to().clone();
                let observed = {
                    let middleware = Arc::clone(middleware);
                    let connection = connection.clone();
                    Sink::new(move |value: In| {
                        middleware.on_element(&connection, &value);
                        to.accept(value);
                    })
                };
                let subscription = source.subscribe(observed);
                // One guard per connection: origin completion and teardown
                // race for it, and whichever comes first fires on_complete.
                let completed = {
                    let middleware = Arc::clone(middleware);
                    Cancellable::new(move || middleware.on_complete(&connection))
                };
                completion.add(after_pending_delivery(&binding.connection, completed.clone()));
                Cancellable::new(move || {
                    subscription.cancel();
                    completed.cancel();
                })
            }
            None => source.subscribe(binding.connection.to().clone()),
        };
        self.cancellables.add(handle);
        tracing::debug!(connection = %binding.connection, shared_origin = !created, "connection bound");

        // The origin is subscribed last so a replaying origin reaches the
        // connection that caused the subscription.
        if created {
            let upstream = from.subscribe(internal.sink());
            let initialized = self.initialized.clone();
            let deferred = self.deferred_completions.clone();
            upstream.on_cancelled(move || {
                if initialized.value() == Some(true) {
                    completion.cancel();
                } else {
                    deferred.add(completion.to_cancellable());
                }
            });
            self.cancellables.add(upstream);
        }
    }

    fn internal_source_for<T>(&self, id: SourceId) -> (PublishSource<T>, CompositeCancellable, bool)
    where
        T: Clone + Send + 'static,
    {
        let mut created = false;
        let origin = self
            .internal_sources
            .entry(id)
            .or_insert_with(|| {
                created = true;
                Origin {
                    fan_out: Arc::new(PublishSource::<T>::new()) as CachedSource,
                    completion: CompositeCancellable::new(),
                }
            })
            .value()
            .clone();

        match origin.fan_out.downcast_ref::<PublishSource<T>>() {
            Some(internal) => (internal.clone(), origin.completion, created),
            None => {
                // Unreachable while ids are unique per source instance.
                tracing::error!(origin = %id, "internal source type mismatch; using an unshared fan-out");
                (PublishSource::new(), CompositeCancellable::new(), true)
            }
        }
    }

    pub(crate) fn cancel(&self) {
        self.cancellables.cancel();
        self.internal_sources.clear();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellables.is_cancelled()
    }

    /// Number of distinct origins currently subscribed.
    #[cfg(test)]
    pub(crate) fn origin_count(&self) -> usize {
        self.internal_sources.len()
    }
}

/// Wraps a completion guard so it fires after values already queued on the
/// connection's scheduler.
fn after_pending_delivery<Out: 'static, In: 'static>(
    connection: &Connection<Out, In>,
    completed: Cancellable,
) -> Cancellable {
    match connection.scheduler() {
        Some(scheduler) => {
            let scheduler = Arc::clone(scheduler);
            Cancellable::new(move || scheduler.schedule(Box::new(move || completed.cancel())))
        }
        None => completed,
    }
}
