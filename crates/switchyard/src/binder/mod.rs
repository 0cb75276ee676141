//! # Binder: connection lifecycle manager.
//!
//! A [`Binder`] turns [`Connection`] descriptors into live subscriptions and
//! tears them down again. Two flavors share one handle type:
//!
//! ```text
//! Binder::new()                     live from bind() until cancel()
//! Binder::with_lifecycle(events)    live only between BEGIN and the next END
//!
//!                ┌────────── lifecycle binder ──────────┐
//!  BEGIN ───────►│ bindings: [b0, b1, b2]  (persisted)  │
//!                │        │ replay in order             │
//!                │        ▼                             │
//!                │  fresh SimpleBinder per activation   │
//!  END   ───────►│  cancel inner, keep bindings         │
//!                └──────────────────────────────────────┘
//! ```
//!
//! ## Initialization
//! Values emitted while an init closure runs are buffered per connection and
//! flushed, in order, when the closure returns. Connections declared later in
//! the same closure still see earlier emissions. Each binder owns its own
//! gate: a binder built inside another binder's init closure opens its gate
//! when its own closure returns.
//!
//! ## Sharing
//! Connections naming the same origin share one upstream subscription (keyed
//! by [`SourceId`](crate::SourceId)) and see values in the same order.

mod lifecycle;
mod simple;

use std::fmt;
use std::sync::Arc;

use crate::connection::Connection;
use crate::error::BinderError;
use crate::lifecycle::LifecycleEvent;
use crate::middleware::Middleware;
use crate::scheduler::Scheduler;
use crate::source::IntoSource;

use lifecycle::LifecycleBinder;
use simple::SimpleBinder;

/// A connection plus its optional middleware, as remembered by a binder.
pub(crate) struct Binding<Out, In> {
    connection: Connection<Out, In>,
    middleware: Option<Arc<dyn Middleware<Out, In>>>,
}

/// Type-erased [`Binding`] so a lifecycle binder can replay mixed types.
pub(crate) trait ErasedBinding: Send + Sync {
    fn connect_to(&self, binder: &SimpleBinder);
}

impl<Out, In> ErasedBinding for Binding<Out, In>
where
    Out: Clone + Send + 'static,
    In: Clone + Send + 'static,
{
    fn connect_to(&self, binder: &SimpleBinder) {
        binder.connect(self);
    }
}

#[derive(Clone)]
enum BinderKind {
    Simple(Arc<SimpleBinder>),
    Lifecycle(Arc<LifecycleBinder>),
}

/// Cheap-clone handle to a binder.
///
/// Clones refer to the same binder, so a sink may hold one and cancel the
/// binder that feeds it.
#[derive(Clone)]
pub struct Binder {
    kind: BinderKind,
}

impl Binder {
    /// Unconditional binder with no init block.
    pub fn new() -> Self {
        Self {
            kind: BinderKind::Simple(Arc::new(SimpleBinder::ready())),
        }
    }

    /// Unconditional binder whose setup runs inside `init`.
    ///
    /// Values emitted inside `init` are delivered when it returns. If `init`
    /// fails, the binder is cancelled and the error returned.
    pub fn with_init<F>(init: F) -> Result<Self, BinderError>
    where
        F: FnOnce(&Binder) -> Result<(), BinderError>,
    {
        let inner = Arc::new(SimpleBinder::initializing());
        let binder = Self {
            kind: BinderKind::Simple(Arc::clone(&inner)),
        };
        Self::run_init(binder, init, || inner.finish_init())
    }

    /// Binder active only while `lifecycle` is between BEGIN and END.
    pub fn with_lifecycle(lifecycle: impl IntoSource<LifecycleEvent>) -> Self {
        let gate = LifecycleBinder::new(lifecycle.into_source());
        gate.finish_init();
        Self {
            kind: BinderKind::Lifecycle(gate),
        }
    }

    /// Lifecycle binder whose setup runs inside `init`.
    pub fn with_lifecycle_init<F>(
        lifecycle: impl IntoSource<LifecycleEvent>,
        init: F,
    ) -> Result<Self, BinderError>
    where
        F: FnOnce(&Binder) -> Result<(), BinderError>,
    {
        let gate = LifecycleBinder::new(lifecycle.into_source());
        let binder = Self {
            kind: BinderKind::Lifecycle(Arc::clone(&gate)),
        };
        Self::run_init(binder, init, || gate.finish_init())
    }

    fn run_init<F, D>(binder: Binder, init: F, done: D) -> Result<Self, BinderError>
    where
        F: FnOnce(&Binder) -> Result<(), BinderError>,
        D: FnOnce(),
    {
        match init(&binder) {
            Ok(()) => {
                done();
                Ok(binder)
            }
            Err(err) => {
                tracing::debug!(error = %err, "binder init failed; cancelling");
                binder.cancel();
                Err(err)
            }
        }
    }

    /// Activates `connection`.
    ///
    /// Binding after `cancel()` is accepted and ignored.
    ///
    /// Connections sharing an origin share one upstream subscription, made
    /// when the first of them is bound. A replaying origin (such as a
    /// [`BehaviorSource`](crate::BehaviorSource) or a feature's state)
    /// therefore replays its current value to that first connection only;
    /// later connections see new values. This holds inside the init block too.
    ///
    /// # Errors
    /// [`BinderError::MissingOrigin`] if the connection has no origin.
    pub fn bind<Out, In>(&self, connection: Connection<Out, In>) -> Result<(), BinderError>
    where
        Out: Clone + Send + 'static,
        In: Clone + Send + 'static,
    {
        self.bind_binding(connection, None)
    }

    /// Activates `connection` with `middleware` observing it.
    pub fn bind_with_middleware<Out, In>(
        &self,
        connection: Connection<Out, In>,
        middleware: Arc<dyn Middleware<Out, In>>,
    ) -> Result<(), BinderError>
    where
        Out: Clone + Send + 'static,
        In: Clone + Send + 'static,
    {
        self.bind_binding(connection, Some(middleware))
    }

    fn bind_binding<Out, In>(
        &self,
        connection: Connection<Out, In>,
        middleware: Option<Arc<dyn Middleware<Out, In>>>,
    ) -> Result<(), BinderError>
    where
        Out: Clone + Send + 'static,
        In: Clone + Send + 'static,
    {
        if connection.from().is_none() {
            return Err(BinderError::MissingOrigin {
                connection: connection.to_string(),
            });
        }
        let binding = Binding {
            connection,
            middleware,
        };
        match &self.kind {
            BinderKind::Simple(binder) => binder.connect(&binding),
            BinderKind::Lifecycle(binder) => binder.connect(Arc::new(binding)),
        }
        Ok(())
    }

    /// Runs `f` with a scope whose binds deliver on `scheduler`.
    ///
    /// ```
    /// use std::sync::Arc;
    /// use switchyard::{Binder, Connection, ImmediateScheduler, PublishSource, Sink};
    ///
    /// let binder = Binder::new();
    /// let clicks = PublishSource::<u32>::new();
    /// binder.observe_on(Arc::new(ImmediateScheduler), |scope| {
    ///     scope.bind(Connection::new(clicks.clone(), Sink::new(|_: u32| {})))
    /// })?;
    /// # Ok::<(), switchyard::BinderError>(())
    /// ```
    pub fn observe_on<R, F>(&self, scheduler: Arc<dyn Scheduler>, f: F) -> R
    where
        F: FnOnce(&ObserveOnScope<'_>) -> R,
    {
        let scope = ObserveOnScope {
            binder: self,
            scheduler,
        };
        f(&scope)
    }

    /// Tears down every subscription this binder created. Permanent.
    pub fn cancel(&self) {
        match &self.kind {
            BinderKind::Simple(binder) => binder.cancel(),
            BinderKind::Lifecycle(binder) => binder.cancel(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match &self.kind {
            BinderKind::Simple(binder) => binder.is_cancelled(),
            BinderKind::Lifecycle(binder) => binder.is_cancelled(),
        }
    }
}

impl Default for Binder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Binder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            BinderKind::Simple(_) => "simple",
            BinderKind::Lifecycle(_) => "lifecycle",
        };
        f.debug_struct("Binder")
            .field("kind", &kind)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Bind scope handed out by [`Binder::observe_on`].
pub struct ObserveOnScope<'a> {
    binder: &'a Binder,
    scheduler: Arc<dyn Scheduler>,
}

impl ObserveOnScope<'_> {
    pub fn bind<Out, In>(&self, connection: Connection<Out, In>) -> Result<(), BinderError>
    where
        Out: Clone + Send + 'static,
        In: Clone + Send + 'static,
    {
        self.binder
            .bind(connection.observe_on(Arc::clone(&self.scheduler)))
    }

    pub fn bind_with_middleware<Out, In>(
        &self,
        connection: Connection<Out, In>,
        middleware: Arc<dyn Middleware<Out, In>>,
    ) -> Result<(), BinderError>
    where
        Out: Clone + Send + 'static,
        In: Clone + Send + 'static,
    {
        self.binder.bind_with_middleware(
            connection.observe_on(Arc::clone(&self.scheduler)),
            middleware,
        )
    }

    /// The binder this scope binds into.
    pub fn binder(&self) -> &Binder {
        self.binder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connector;
    use crate::lifecycle::ManualLifecycle;
    use crate::sink::Sink;
    use crate::source::{BehaviorSource, PublishSource};
    use std::sync::Mutex;

    fn collector<T: Send + 'static>() -> (Sink<T>, Arc<Mutex<Vec<T>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        (Sink::new(move |v| s.lock().unwrap().push(v)), seen)
    }

    #[test]
    fn delivers_until_cancelled() {
        let binder = Binder::new();
        let source = PublishSource::<i32>::new();
        let (sink, seen) = collector();
        binder.bind(Connection::new(source.clone(), sink)).unwrap();

        source.accept(1);
        binder.cancel();
        source.accept(2);

        assert_eq!(*seen.lock().unwrap(), vec![1]);
        assert!(binder.is_cancelled());
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn shared_origin_is_subscribed_once() {
        let binder = Binder::new();
        let source = PublishSource::<i32>::new();
        let (a, seen_a) = collector();
        let (b, seen_b) = collector();
        binder.bind(Connection::new(source.clone(), a)).unwrap();
        binder
            .bind(Connection::with_connector(
                source.clone(),
                b,
                Connector::map(|v: i32| v * 10),
            ))
            .unwrap();

        source.accept(1);
        source.accept(2);

        assert_eq!(source.subscriber_count(), 1);
        assert_eq!(*seen_a.lock().unwrap(), vec![1, 2]);
        assert_eq!(*seen_b.lock().unwrap(), vec![10, 20]);
    }

    #[test]
    fn missing_origin_is_rejected() {
        let binder = Binder::new();
        let err = binder
            .bind(Connection::to_sink(Sink::new(|_: i32| {})))
            .unwrap_err();
        assert_eq!(err.as_label(), "binder_missing_origin");
    }

    #[test]
    fn behavior_origin_replays_into_first_connection() {
        let binder = Binder::new();
        let state = BehaviorSource::new(7);
        let (sink, seen) = collector();
        binder.bind(Connection::new(state.clone(), sink)).unwrap();
        state.accept(8);
        assert_eq!(*seen.lock().unwrap(), vec![7, 8]);
    }

    #[test]
    fn init_block_buffers_until_it_returns() {
        let a = PublishSource::<i32>::new();
        let b = PublishSource::<i32>::new();
        let (c, seen) = collector();

        let binder = Binder::with_init(|binder| {
            binder.bind(Connection::new(a.clone(), b.clone()))?;
            a.accept(0);
            binder.bind(Connection::new(b.clone(), c.clone()))
        })
        .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0]);
        a.accept(1);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
        binder.cancel();
    }

    #[test]
    fn failed_init_cancels_binder() {
        let source = PublishSource::<i32>::new();
        let result = Binder::with_init(|binder| {
            binder.bind(Connection::new(source.clone(), Sink::new(|_: i32| {})))?;
            binder.bind(Connection::to_sink(Sink::new(|_: i32| {})))
        });
        assert!(result.is_err());
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn lifecycle_gates_delivery() {
        let lifecycle = ManualLifecycle::new();
        let binder = Binder::with_lifecycle(lifecycle.clone());
        let source = PublishSource::<i32>::new();
        let (sink, seen) = collector();
        binder.bind(Connection::new(source.clone(), sink)).unwrap();

        source.accept(0);
        lifecycle.begin();
        source.accept(1);
        lifecycle.end();
        source.accept(2);
        lifecycle.begin();
        source.accept(3);

        assert_eq!(*seen.lock().unwrap(), vec![1, 3]);
    }

    #[test]
    fn observe_on_scope_routes_through_scheduler() {
        struct Counting(Arc<Mutex<usize>>);
        impl Scheduler for Counting {
            fn schedule(&self, work: crate::scheduler::Work) {
                *self.0.lock().unwrap() += 1;
                work();
            }
            fn name(&self) -> &'static str {
                "counting"
            }
        }

        let runs = Arc::new(Mutex::new(0));
        let binder = Binder::new();
        let source = PublishSource::<i32>::new();
        let (sink, seen) = collector();
        binder
            .observe_on(Arc::new(Counting(Arc::clone(&runs))), |scope| {
                scope.bind(Connection::new(source.clone(), sink))
            })
            .unwrap();

        source.accept(5);
        assert_eq!(*seen.lock().unwrap(), vec![5]);
        assert_eq!(*runs.lock().unwrap(), 1);
    }
}
