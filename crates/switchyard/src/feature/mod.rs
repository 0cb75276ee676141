//! # Feature: a state machine fed by wishes.
//!
//! ```text
//!                  ┌──────────────────── Feature ─────────────────────┐
//! wish ──► wish_to_action ──► Actor(state snapshot, action)           │
//!                  │                    │ Source<Effect>              │
//!                  │                    ▼                             │
//!                  │   Reducer(state, effect) ──► state ──────────────┼──► state subscribers (replay latest)
//!                  │                    │                             │
//!                  │                    ├──► NewsPublisher ──► news ──┼──► news subscribers (no replay)
//!                  │                    └──► PostProcessor ──► action ┘
//!                  └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//! - Each effect is reduced on its own and the new state is published before
//!   the next effect is reduced. This holds across threads: effects arriving
//!   concurrently from async streams are applied one at a time.
//! - Effects of one action are applied in the order the actor's stream emits
//!   them. Effects of different actions are applied as they arrive.
//! - An actor error reaches the caller of [`Feature::accept`] and leaves the
//!   state untouched; later wishes are processed normally.
//! - After [`Feature::cancel`], running effect streams are torn down and no
//!   further state or news is emitted. Accepting a wish is then a no-op.
//!
//! ## Example
//! ```
//! use switchyard::feature::FeatureBuilder;
//! use switchyard::source::{just, of, SharedSource};
//!
//! let feature = FeatureBuilder::new(
//!     String::new(),
//!     |_: &String, n: &u32| -> anyhow::Result<SharedSource<u32>> {
//!         Ok(if n % 2 == 0 { just(*n) } else { of([*n, n + 1]) })
//!     },
//!     |state: &String, effect: &u32| format!("{state}{effect}"),
//! )
//! .wish_to_action(|wish: &'static str| wish.parse::<u32>().unwrap_or_default())
//! .build();
//!
//! feature.accept("0")?;
//! feature.accept("1")?;
//! assert_eq!(feature.state(), "012");
//! # Ok::<(), switchyard::FeatureError>(())
//! ```

mod builder;
mod element;
mod engine;

use std::convert::Infallible;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::cancellable::{lock, Cancellable, CompositeCancellable};
use crate::error::FeatureError;
use crate::sink::{IntoSink, Sink};
use crate::source::{just, BehaviorSource, PublishSource, SharedSource, Source, SourceId};

pub use builder::FeatureBuilder;
pub use element::{Actor, Bootstrapper, NewsPublisher, PostProcessor, Reducer};

type Intake<Wish> = dyn Fn(Wish) -> Result<(), FeatureError> + Send + Sync;

/// Cheap-clone handle to a running feature.
///
/// Subscribing to the feature itself (it is a [`Source`] of its state)
/// delivers the current state right away, then every change.
pub struct Feature<Wish, State, News = Infallible> {
    name: Arc<str>,
    current: Arc<Mutex<State>>,
    state: BehaviorSource<State>,
    news: PublishSource<News>,
    in_flight: CompositeCancellable,
    intake: Arc<Intake<Wish>>,
}

impl<Wish, State, News> Clone for Feature<Wish, State, News> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            current: Arc::clone(&self.current),
            state: self.state.clone(),
            news: self.news.clone(),
            in_flight: self.in_flight.clone(),
            intake: Arc::clone(&self.intake),
        }
    }
}

impl<Wish, State> Feature<Wish, State, Infallible>
where
    Wish: Clone + Send + Sync + 'static,
    State: Clone + Send + Sync + 'static,
{
    /// Feature without an actor: every wish is reduced directly.
    pub fn reducer_only(initial_state: State, reducer: impl Reducer<State, Wish>) -> Self {
        let actor = |_: &State, wish: &Wish| -> anyhow::Result<SharedSource<Wish>> {
            Ok(just(wish.clone()))
        };
        FeatureBuilder::new(initial_state, actor, reducer).build()
    }
}

impl<Wish, State, News> Feature<Wish, State, News>
where
    Wish: 'static,
    State: Clone + Send + Sync + 'static,
    News: Clone + Send + 'static,
{
    /// Processes `wish`.
    ///
    /// # Errors
    /// [`FeatureError::Actor`] if the actor rejects the resulting action. The
    /// state is left as it was.
    pub fn accept(&self, wish: Wish) -> Result<(), FeatureError> {
        (self.intake)(wish)
    }

    /// Current state.
    pub fn state(&self) -> State {
        lock(&self.current).clone()
    }

    /// Stream of news. Late subscribers only see news published after they
    /// subscribed.
    pub fn news(&self) -> SharedSource<News> {
        self.news.shared()
    }

    /// Stream of states, replaying the current one.
    pub fn states(&self) -> SharedSource<State> {
        self.state.shared()
    }

    /// Sink feeding wishes in. Rejected wishes are logged, not returned.
    pub fn wish_sink(&self) -> Sink<Wish> {
        let intake = Arc::clone(&self.intake);
        let name = Arc::clone(&self.name);
        Sink::new(move |wish| {
            if let Err(err) = intake(wish) {
                tracing::warn!(feature = %name, error = %err, label = err.as_label(), "wish rejected");
            }
        })
        .labelled(format!("{}.input", self.name))
    }

    /// Tears down running effect streams and stops all further emissions.
    pub fn cancel(&self) {
        if !self.in_flight.is_cancelled() {
            tracing::debug!(feature = %self.name, in_flight = self.in_flight.len(), "feature cancelled");
        }
        self.in_flight.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.in_flight.is_cancelled()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<Wish, State, News> Source<State> for Feature<Wish, State, News>
where
    Wish: 'static,
    State: Clone + Send + Sync + 'static,
    News: 'static,
{
    fn subscribe(&self, sink: Sink<State>) -> Cancellable {
        self.state.subscribe(sink)
    }

    fn source_id(&self) -> SourceId {
        self.state.source_id()
    }
}

impl<Wish, State, News> IntoSink<Wish> for Feature<Wish, State, News>
where
    Wish: 'static,
    State: Clone + Send + Sync + 'static,
    News: Clone + Send + 'static,
{
    fn into_sink(self) -> Sink<Wish> {
        self.wish_sink()
    }
}

impl<Wish, State, News> fmt::Debug for Feature<Wish, State, News> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feature")
            .field("name", &self.name)
            .field("cancelled", &self.in_flight.is_cancelled())
            .finish_non_exhaustive()
    }
}
