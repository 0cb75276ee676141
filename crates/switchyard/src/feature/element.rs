//! Building blocks a feature is assembled from.
//!
//! Every trait has a blanket impl for the matching closure shape, so simple
//! features never need a named type:
//!
//! ```
//! use switchyard::feature::{Actor, Reducer};
//! use switchyard::source::just;
//!
//! let actor = |_: &String, action: &u8| anyhow::Ok(just(*action));
//! let reducer = |state: &String, effect: &u8| format!("{state}{effect}");
//! # fn assert_actor<A: Actor<String, u8, u8>>(_: &A) {}
//! # fn assert_reducer<R: Reducer<String, u8>>(_: &R) {}
//! # assert_actor(&actor);
//! # assert_reducer(&reducer);
//! ```

use crate::source::SharedSource;

/// Turns an action into a stream of effects.
///
/// The stream may be empty, synchronous, asynchronous or endless. Returning
/// `Err` rejects the action: nothing is reduced and the error reaches the
/// caller of `accept`.
pub trait Actor<State, Action, Effect>: Send + Sync + 'static {
    fn act(&self, state: &State, action: &Action) -> anyhow::Result<SharedSource<Effect>>;
}

impl<F, State, Action, Effect> Actor<State, Action, Effect> for F
where
    F: Fn(&State, &Action) -> anyhow::Result<SharedSource<Effect>> + Send + Sync + 'static,
{
    fn act(&self, state: &State, action: &Action) -> anyhow::Result<SharedSource<Effect>> {
        self(state, action)
    }
}

/// Folds one effect into the next state. Must be pure.
pub trait Reducer<State, Effect>: Send + Sync + 'static {
    fn reduce(&self, state: &State, effect: &Effect) -> State;
}

impl<F, State, Effect> Reducer<State, Effect> for F
where
    F: Fn(&State, &Effect) -> State + Send + Sync + 'static,
{
    fn reduce(&self, state: &State, effect: &Effect) -> State {
        self(state, effect)
    }
}

/// Seeds actions once, when the feature is built.
pub trait Bootstrapper<Action>: Send + Sync + 'static {
    fn bootstrap(&self) -> SharedSource<Action>;
}

impl<F, Action> Bootstrapper<Action> for F
where
    F: Fn() -> SharedSource<Action> + Send + Sync + 'static,
{
    fn bootstrap(&self) -> SharedSource<Action> {
        self()
    }
}

/// Derives a one-shot notification from a completed transition.
pub trait NewsPublisher<Action, Effect, State, News>: Send + Sync + 'static {
    fn publish(&self, old: &State, action: &Action, effect: &Effect, new: &State) -> Option<News>;
}

impl<F, Action, Effect, State, News> NewsPublisher<Action, Effect, State, News> for F
where
    F: Fn(&State, &Action, &Effect, &State) -> Option<News> + Send + Sync + 'static,
{
    fn publish(&self, old: &State, action: &Action, effect: &Effect, new: &State) -> Option<News> {
        self(old, action, effect, new)
    }
}

/// Optionally feeds a follow-up action back in after a transition.
pub trait PostProcessor<Action, Effect, State>: Send + Sync + 'static {
    fn process(&self, action: &Action, effect: &Effect, state: &State) -> Option<Action>;
}

impl<F, Action, Effect, State> PostProcessor<Action, Effect, State> for F
where
    F: Fn(&Action, &Effect, &State) -> Option<Action> + Send + Sync + 'static,
{
    fn process(&self, action: &Action, effect: &Effect, state: &State) -> Option<Action> {
        self(action, effect, state)
    }
}
