//! BEGIN/END signal gating a lifecycle binder.
//!
//! Any [`Source`] of [`LifecycleEvent`] can drive a binder; hosts typically
//! adapt their own UI or scope callbacks into one. [`ManualLifecycle`] is the
//! in-process implementation: it remembers the latest event and replays it,
//! so a binder created after `begin()` starts active.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cancellable::Cancellable;
use crate::sink::Sink;
use crate::source::{BehaviorSource, SharedSource, Source, SourceId};

/// Lifecycle event tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleEvent {
    Begin,
    End,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::Begin => f.write_str("BEGIN"),
            LifecycleEvent::End => f.write_str("END"),
        }
    }
}

/// Shared lifecycle signal.
pub type Lifecycle = SharedSource<LifecycleEvent>;

/// Lifecycle driven by explicit `begin()` / `end()` calls.
///
/// No event has been emitted initially, which means inactive.
#[derive(Clone)]
pub struct ManualLifecycle {
    events: BehaviorSource<LifecycleEvent>,
}

impl ManualLifecycle {
    pub fn new() -> Self {
        Self {
            events: BehaviorSource::empty(),
        }
    }

    pub fn begin(&self) {
        self.events.accept(LifecycleEvent::Begin);
    }

    pub fn end(&self) {
        self.events.accept(LifecycleEvent::End);
    }

    /// Latest event, `None` before the first one.
    pub fn current(&self) -> Option<LifecycleEvent> {
        self.events.value()
    }
}

impl Default for ManualLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Source<LifecycleEvent> for ManualLifecycle {
    fn subscribe(&self, sink: Sink<LifecycleEvent>) -> Cancellable {
        self.events.subscribe(sink)
    }

    fn source_id(&self) -> SourceId {
        self.events.source_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn replays_latest_event_to_new_subscribers() {
        let lifecycle = ManualLifecycle::new();
        assert_eq!(lifecycle.current(), None);
        lifecycle.begin();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let _h = lifecycle.subscribe(Sink::new(move |e| s.lock().unwrap().push(e)));
        lifecycle.end();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![LifecycleEvent::Begin, LifecycleEvent::End]
        );
    }
}
