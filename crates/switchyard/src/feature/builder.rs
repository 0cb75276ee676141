use std::convert::Infallible;
use std::sync::Arc;

use super::element::{Actor, Bootstrapper, NewsPublisher, PostProcessor, Reducer};
use super::engine::Engine;
use super::Feature;

type WishToAction<Wish, Action> = dyn Fn(Wish) -> Action + Send + Sync;

/// Assembles a [`Feature`].
///
/// ```
/// use switchyard::feature::FeatureBuilder;
/// use switchyard::source::just;
///
/// let counter = FeatureBuilder::new(
///     0u32,
///     |_: &u32, step: &u32| anyhow::Ok(just(*step)),
///     |count: &u32, step: &u32| count + step,
/// )
/// .name("counter")
/// .build();
///
/// counter.accept(2)?;
/// counter.accept(3)?;
/// assert_eq!(counter.state(), 5);
/// # Ok::<(), switchyard::FeatureError>(())
/// ```
///
/// `wish_to_action` and `news_publisher` change the builder's type, so the
/// wish and news types follow whatever was configured last.
pub struct FeatureBuilder<Wish, Action, Effect, State, News = Infallible> {
    initial_state: State,
    wish_to_action: Arc<WishToAction<Wish, Action>>,
    actor: Arc<dyn Actor<State, Action, Effect>>,
    reducer: Arc<dyn Reducer<State, Effect>>,
    bootstrapper: Option<Arc<dyn Bootstrapper<Action>>>,
    news_publisher: Option<Arc<dyn NewsPublisher<Action, Effect, State, News>>>,
    post_processor: Option<Arc<dyn PostProcessor<Action, Effect, State>>>,
    name: Option<String>,
}

impl<Action, Effect, State> FeatureBuilder<Action, Action, Effect, State, Infallible>
where
    Action: Send + Sync + 'static,
    Effect: Send + 'static,
    State: Clone + Send + Sync + 'static,
{
    /// Starts a builder whose wishes are its actions and which publishes no news.
    pub fn new(
        initial_state: State,
        actor: impl Actor<State, Action, Effect>,
        reducer: impl Reducer<State, Effect>,
    ) -> Self {
        Self {
            initial_state,
            wish_to_action: Arc::new(|wish: Action| wish),
            actor: Arc::new(actor),
            reducer: Arc::new(reducer),
            bootstrapper: None,
            news_publisher: None,
            post_processor: None,
            name: None,
        }
    }
}

impl<Wish, Action, Effect, State, News> FeatureBuilder<Wish, Action, Effect, State, News>
where
    Wish: 'static,
    Action: Send + Sync + 'static,
    Effect: Send + 'static,
    State: Clone + Send + Sync + 'static,
    News: Clone + Send + 'static,
{
    /// Converts incoming wishes before they reach the actor.
    pub fn wish_to_action<W, F>(self, f: F) -> FeatureBuilder<W, Action, Effect, State, News>
    where
        F: Fn(W) -> Action + Send + Sync + 'static,
    {
        FeatureBuilder {
            initial_state: self.initial_state,
            wish_to_action: Arc::new(f),
            actor: self.actor,
            reducer: self.reducer,
            bootstrapper: self.bootstrapper,
            news_publisher: self.news_publisher,
            post_processor: self.post_processor,
            name: self.name,
        }
    }

    pub fn bootstrapper(mut self, bootstrapper: impl Bootstrapper<Action>) -> Self {
        self.bootstrapper = Some(Arc::new(bootstrapper));
        self
    }

    /// Publishes news derived from each transition.
    pub fn news_publisher<N>(
        self,
        publisher: impl NewsPublisher<Action, Effect, State, N>,
    ) -> FeatureBuilder<Wish, Action, Effect, State, N> {
        FeatureBuilder {
            initial_state: self.initial_state,
            wish_to_action: self.wish_to_action,
            actor: self.actor,
            reducer: self.reducer,
            bootstrapper: self.bootstrapper,
            news_publisher: Some(Arc::new(publisher)),
            post_processor: self.post_processor,
            name: self.name,
        }
    }

    pub fn post_processor(mut self, post_processor: impl PostProcessor<Action, Effect, State>) -> Self {
        self.post_processor = Some(Arc::new(post_processor));
        self
    }

    /// Name used in logs and as the wish sink's label.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builds the feature and runs the bootstrapper, if any.
    ///
    /// Synchronous bootstrap actions are fully processed before this returns.
    pub fn build(self) -> Feature<Wish, State, News> {
        let name: Arc<str> = self
            .name
            .unwrap_or_else(|| std::any::type_name::<State>().to_owned())
            .into();
        let engine = Engine::new(
            Arc::clone(&name),
            self.initial_state,
            self.actor,
            self.reducer,
            self.news_publisher,
            self.post_processor,
        );

        if let Some(bootstrapper) = &self.bootstrapper {
            engine.bootstrap(bootstrapper.bootstrap());
        }
        tracing::debug!(feature = %name, bootstrapped = self.bootstrapper.is_some(), "feature built");

        let wish_to_action = self.wish_to_action;
        let intake = {
            let engine = Arc::clone(&engine);
            Arc::new(move |wish: Wish| engine.execute(wish_to_action(wish)))
        };

        Feature {
            name,
            current: Arc::clone(&engine.current),
            state: engine.state.clone(),
            news: engine.news.clone(),
            in_flight: engine.in_flight.clone(),
            intake,
        }
    }
}
