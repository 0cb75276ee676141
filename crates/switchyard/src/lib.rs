//! # Switchyard
//!
//! Reactive wiring with lifecycle-scoped activation, plus a small state
//! machine engine that plugs into it.
//!
//! ## Core Concepts
//!
//! - [`Source`] / [`Sink`] = producers and consumers of values
//! - [`Connection`] = a declared route from one source to one sink
//! - [`Binder`] = turns connections into subscriptions, and tears them down
//! - [`Feature`] = wish → action → effect → state (+ news)
//!
//! The key principle: **wiring is declared, not performed**. Connections are
//! plain values; the binder decides when they are live.
//!
//! ## Architecture
//!
//! ```text
//! Host code
//!     │
//!     ▼ accept()
//! PublishSource ──────────────────────────────┐
//!                                             │
//! Binder                                      ▼
//!     ├─► internal fan-out (one per origin) ──┬─► connector ─► init delay ─► [scheduler] ─► middleware ─► Sink
//!     │                                       └─► connector ─► init delay ─► [scheduler] ─► middleware ─► Sink
//!     │
//!     └─► Lifecycle BEGIN/END ─► (re)wire / unwire
//!
//! Feature
//!     wish ─► Actor ─► Source<Effect> ─► Reducer ─► state (BehaviorSource) ─► Binder ─► UI sinks
//!                                           └─────► NewsPublisher ─► news (PublishSource)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Identity, not equality** - Sharing and de-duplication key on
//!    [`SourceId`] and [`ConnectionId`], never on contents
//! 2. **One upstream subscription per origin** - However many connections
//!    name it, within one binder
//! 3. **Init is buffered** - Values emitted inside an init closure arrive when
//!    the closure returns, in order
//! 4. **Inactive is silent** - Values emitted while a lifecycle is inactive
//!    are dropped, never queued
//! 5. **Cancel is final** - Idempotent, never fails, no delivery afterwards
//!
//! ## Guarantees
//!
//! - **Snapshot delivery**: an emission reaches the sinks registered when it
//!   started, even if one of them cancels the binder midway
//! - **Panic isolation**: a panicking sink is logged and skipped
//! - **No replay of news**: late news subscribers see only later news
//!
//! ## Example
//!
//! ```
//! use switchyard::{Binder, Connection, Connector, PublishSource, Sink};
//! use std::sync::{Arc, Mutex};
//!
//! let clicks = PublishSource::<u32>::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let s = seen.clone();
//!
//! let binder = Binder::with_init(|binder| {
//!     binder.bind(Connection::with_connector(
//!         clicks.clone(),
//!         Sink::new(move |label: String| s.lock().unwrap().push(label)),
//!         Connector::filter_map(|n: u32| (n > 0).then(|| format!("click #{n}"))),
//!     ).named("clicks"))
//! })?;
//!
//! clicks.accept(0);
//! clicks.accept(1);
//! binder.cancel();
//! clicks.accept(2);
//!
//! assert_eq!(*seen.lock().unwrap(), vec!["click #1".to_string()]);
//! # Ok::<(), switchyard::BinderError>(())
//! ```
//!
//! ## What Switchyard Is Not
//!
//! Switchyard is **not**:
//! - A UI toolkit
//! - A persistence layer
//! - A general purpose async runtime
//!
//! Platform lifecycle adapters live with the host; anything that emits
//! [`LifecycleEvent`]s can gate a binder.

// Core modules
mod binder;
mod cancellable;
mod connection;
mod error;
mod lifecycle;
mod middleware;
mod scheduler;
mod sink;

// Sources and their operators
pub mod source;

// State machine engine
pub mod feature;

// Re-export cancellation types
pub use cancellable::{Cancel, Cancellable, CompositeCancellable};

// Re-export value plumbing
pub use sink::{IntoSink, Sink};
pub use source::{
    BehaviorSource, IntoSource, PublishSource, SharedSource, Source, SourceExt, SourceId,
};

// Re-export wiring types
pub use binder::{Binder, ObserveOnScope};
pub use connection::{Connection, ConnectionId, Connector};
pub use lifecycle::{Lifecycle, LifecycleEvent, ManualLifecycle};

// Re-export middleware types
pub use middleware::{Middleware, StandaloneMiddleware, TracingMiddleware};

// Re-export schedulers
pub use scheduler::{ImmediateScheduler, Scheduler, TokioScheduler, Work};

// Re-export feature types
pub use feature::{Feature, FeatureBuilder};

// Re-export error types
pub use error::{BinderError, FeatureError, MiddlewareError};
