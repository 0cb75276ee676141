//! Lifecycle-gated binder.

use std::sync::{Arc, Mutex};

use crate::cancellable::{lock, CompositeCancellable};
use crate::lifecycle::{Lifecycle, LifecycleEvent};
use crate::sink::Sink;
use crate::source::Source;

use super::simple::SimpleBinder;
use super::ErasedBinding;

struct Gate {
    active: bool,
    initialized: bool,
    cancelled: bool,
    /// Every binding in declaration order; replayed on each BEGIN.
    bindings: Vec<Arc<dyn ErasedBinding>>,
    /// Wiring of the current (or last) activation.
    inner: Arc<SimpleBinder>,
}

/// Keeps its bindings across activations and rebuilds the wiring on every
/// BEGIN. Values emitted while inactive are dropped, not queued.
pub(crate) struct LifecycleBinder {
    gate: Mutex<Gate>,
    lifecycle_subscription: CompositeCancellable,
}

impl LifecycleBinder {
    /// Subscribes to `lifecycle` right away. A lifecycle that replays BEGIN
    /// activates the binder before this returns.
    ///
    /// The lifecycle keeps the binder alive until `cancel()`.
    pub(crate) fn new(lifecycle: Lifecycle) -> Arc<Self> {
        let binder = Arc::new(Self {
            gate: Mutex::new(Gate {
                active: false,
                initialized: false,
                cancelled: false,
                bindings: Vec::new(),
                inner: Arc::new(SimpleBinder::initializing()),
            }),
            lifecycle_subscription: CompositeCancellable::new(),
        });

        let target = Arc::clone(&binder);
        let subscription = lifecycle.subscribe(Sink::new(move |event| target.on_event(event)));
        binder.lifecycle_subscription.add(subscription);
        binder
    }

    pub(crate) fn connect(&self, binding: Arc<dyn ErasedBinding>) {
        let live = {
            let mut gate = lock(&self.gate);
            if gate.cancelled {
                return;
            }
            gate.bindings.push(Arc::clone(&binding));
            gate.active.then(|| Arc::clone(&gate.inner))
        };
        if let Some(inner) = live {
            binding.connect_to(&inner);
        }
    }

    /// Marks the init block as done and releases what it buffered.
    pub(crate) fn finish_init(&self) {
        let inner = {
            let mut gate = lock(&self.gate);
            gate.initialized = true;
            Arc::clone(&gate.inner)
        };
        inner.finish_init();
    }

    fn on_event(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Begin => self.activate(),
            LifecycleEvent::End => self.deactivate(),
        }
    }

    fn activate(&self) {
        let (inner, bindings) = {
            let mut gate = lock(&self.gate);
            if gate.active || gate.cancelled {
                return;
            }
            gate.active = true;
            gate.inner = Arc::new(if gate.initialized {
                SimpleBinder::ready()
            } else {
                SimpleBinder::initializing()
            });
            (Arc::clone(&gate.inner), gate.bindings.clone())
        };
        tracing::debug!(bindings = bindings.len(), "lifecycle BEGIN; wiring");
        for binding in bindings {
            binding.connect_to(&inner);
        }
    }

    fn deactivate(&self) {
        let inner = {
            let mut gate = lock(&self.gate);
            if !gate.active {
                return;
            }
            gate.active = false;
            Arc::clone(&gate.inner)
        };
        tracing::debug!("lifecycle END; unwiring");
        inner.cancel();
    }

    pub(crate) fn cancel(&self) {
        let inner = {
            let mut gate = lock(&self.gate);
            if gate.cancelled {
                return;
            }
            gate.cancelled = true;
            gate.active = false;
            gate.bindings.clear();
            Arc::clone(&gate.inner)
        };
        self.lifecycle_subscription.cancel();
        inner.cancel();
        tracing::debug!("lifecycle binder cancelled");
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        lock(&self.gate).cancelled
    }
}
