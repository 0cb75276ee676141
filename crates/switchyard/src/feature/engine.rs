//! The wish → action → effect → state → news loop.
//!
//! Effects are applied through a per-feature backlog. Whoever enqueues into an
//! idle backlog drains it; everyone else only enqueues. Reduce, state publish,
//! news publish and post-processing for one effect therefore finish before the
//! next effect starts, even when effects arrive on several threads, and a
//! post-processor re-entering the loop never blocks on itself.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

use crate::cancellable::{lock, CompositeCancellable};
use crate::error::FeatureError;
use crate::sink::Sink;
use crate::source::{BehaviorSource, PublishSource, SharedSource, Source};

use super::element::{Actor, NewsPublisher, PostProcessor, Reducer};

struct Backlog<Action, Effect> {
    pending: VecDeque<(Arc<Action>, Effect)>,
    draining: bool,
}

/// Releases the backlog if a reducer or subscriber panics mid-drain.
struct DrainGuard<'a, Action, Effect>(&'a Mutex<Backlog<Action, Effect>>);

impl<Action, Effect> Drop for DrainGuard<'_, Action, Effect> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            lock(self.0).draining = false;
        }
    }
}

pub(crate) struct Engine<Action, Effect, State, News> {
    pub(crate) name: Arc<str>,
    /// Latest reduced state. Written only by the draining thread.
    pub(crate) current: Arc<Mutex<State>>,
    pub(crate) state: BehaviorSource<State>,
    pub(crate) news: PublishSource<News>,
    /// Subscriptions to effect streams still running, plus the bootstrapper's.
    pub(crate) in_flight: CompositeCancellable,
    backlog: Mutex<Backlog<Action, Effect>>,
    actor: Arc<dyn Actor<State, Action, Effect>>,
    reducer: Arc<dyn Reducer<State, Effect>>,
    news_publisher: Option<Arc<dyn NewsPublisher<Action, Effect, State, News>>>,
    post_processor: Option<Arc<dyn PostProcessor<Action, Effect, State>>>,
}

impl<Action, Effect, State, News> Engine<Action, Effect, State, News>
where
    Action: Send + Sync + 'static,
    Effect: Send + 'static,
    State: Clone + Send + Sync + 'static,
    News: Clone + Send + 'static,
{
    pub(crate) fn new(
        name: Arc<str>,
        initial_state: State,
        actor: Arc<dyn Actor<State, Action, Effect>>,
        reducer: Arc<dyn Reducer<State, Effect>>,
        news_publisher: Option<Arc<dyn NewsPublisher<Action, Effect, State, News>>>,
        post_processor: Option<Arc<dyn PostProcessor<Action, Effect, State>>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            current: Arc::new(Mutex::new(initial_state.clone())),
            state: BehaviorSource::new(initial_state),
            news: PublishSource::new(),
            in_flight: CompositeCancellable::new(),
            backlog: Mutex::new(Backlog {
                pending: VecDeque::new(),
                draining: false,
            }),
            actor,
            reducer,
            news_publisher,
            post_processor,
        })
    }

    /// Runs the actor against the current state and subscribes to its effects.
    ///
    /// The state snapshot is taken here, not when effects arrive.
    pub(crate) fn execute(self: &Arc<Self>, action: Action) -> Result<(), FeatureError> {
        if self.in_flight.is_cancelled() {
            tracing::debug!(feature = %self.name, "feature cancelled; action dropped");
            return Ok(());
        }
        let snapshot = lock(&self.current).clone();

        let effects = self
            .actor
            .act(&snapshot, &action)
            .map_err(FeatureError::Actor)?;

        let engine: Weak<Self> = Arc::downgrade(self);
        let action = Arc::new(action);
        let handle = effects.subscribe(Sink::new(move |effect| {
            if let Some(engine) = engine.upgrade() {
                engine.enqueue(Arc::clone(&action), effect);
            }
        }));
        self.in_flight.add(handle);
        Ok(())
    }

    fn enqueue(self: &Arc<Self>, action: Arc<Action>, effect: Effect) {
        {
            let mut backlog = lock(&self.backlog);
            backlog.pending.push_back((action, effect));
            if backlog.draining {
                return;
            }
            backlog.draining = true;
        }

        let _guard = DrainGuard(&self.backlog);
        loop {
            let (action, effect) = {
                let mut backlog = lock(&self.backlog);
                match backlog.pending.pop_front() {
                    Some(next) => next,
                    None => {
                        backlog.draining = false;
                        return;
                    }
                }
            };
            self.apply(&action, effect);
        }
    }

    fn apply(self: &Arc<Self>, action: &Action, effect: Effect) {
        if self.in_flight.is_cancelled() {
            tracing::trace!(feature = %self.name, "feature cancelled; effect discarded");
            return;
        }
        let old = lock(&self.current).clone();
        let new = self.reducer.reduce(&old, &effect);
        *lock(&self.current) = new.clone();
        self.state.accept(new.clone());
        tracing::trace!(feature = %self.name, "state reduced");

        if let Some(publisher) = &self.news_publisher {
            if let Some(news) = publisher.publish(&old, action, &effect, &new) {
                self.news.accept(news);
            }
        }

        if let Some(post_processor) = &self.post_processor {
            if let Some(next) = post_processor.process(action, &effect, &new) {
                if let Err(err) = self.execute(next) {
                    tracing::warn!(
                        feature = %self.name,
                        error = %err,
                        label = err.as_label(),
                        "post-processed action rejected"
                    );
                }
            }
        }
    }

    /// Subscribes the bootstrapper's actions into the loop.
    pub(crate) fn bootstrap(self: &Arc<Self>, actions: SharedSource<Action>) {
        let engine: Weak<Self> = Arc::downgrade(self);
        let handle = actions.subscribe(Sink::new(move |action| {
            let Some(engine) = engine.upgrade() else {
                return;
            };
            if let Err(err) = engine.execute(action) {
                tracing::warn!(
                    feature = %engine.name,
                    error = %err,
                    label = err.as_label(),
                    "bootstrap action rejected"
                );
            }
        }));
        self.in_flight.add(handle);
    }
}
