//! Operators over shared sources.
//!
//! Each operator returns a new source with its own [`SourceId`](super::SourceId);
//! subscribing to it subscribes to the upstream once per downstream subscriber.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::cancellable::{lock, Cancellable, CompositeCancellable};
use crate::scheduler::Scheduler;
use crate::sink::Sink;

use super::{create, BehaviorSource, SharedSource, Source};

/// Combinators available on every [`SharedSource`].
pub trait SourceExt<T> {
    /// Maps every value through `f`.
    fn map<U, F>(&self, f: F) -> SharedSource<U>
    where
        U: 'static,
        F: Fn(T) -> U + Send + Sync + 'static;

    /// Maps every value through `f`, dropping `None` results.
    fn filter_map<U, F>(&self, f: F) -> SharedSource<U>
    where
        U: 'static,
        F: Fn(T) -> Option<U> + Send + Sync + 'static;

    /// Expands every value into zero or more values, emitted in order.
    fn flat_map<U, I, F>(&self, f: F) -> SharedSource<U>
    where
        U: 'static,
        I: IntoIterator<Item = U>,
        F: Fn(T) -> I + Send + Sync + 'static;

    /// Moves delivery of every value onto `scheduler`.
    ///
    /// Work still queued on the scheduler when the subscription is cancelled
    /// is skipped.
    fn observe_on(&self, scheduler: Arc<dyn Scheduler>) -> SharedSource<T>
    where
        T: Send;

    /// Buffers values until `gate` holds `true`, then flushes them in
    /// emission order and passes later values straight through.
    fn delay_until(&self, gate: BehaviorSource<bool>) -> SharedSource<T>
    where
        T: Send;
}

impl<T: 'static> SourceExt<T> for SharedSource<T> {
    fn map<U, F>(&self, f: F) -> SharedSource<U>
    where
        U: 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.filter_map(move |v| Some(f(v)))
    }

    fn filter_map<U, F>(&self, f: F) -> SharedSource<U>
    where
        U: 'static,
        F: Fn(T) -> Option<U> + Send + Sync + 'static,
    {
        let upstream = Arc::clone(self);
        let f = Arc::new(f);
        create(move |sink: Sink<U>| {
            let f = Arc::clone(&f);
            upstream.subscribe(Sink::new(move |value| {
                if let Some(mapped) = f(value) {
                    sink.accept(mapped);
                }
            }))
        })
    }

    fn flat_map<U, I, F>(&self, f: F) -> SharedSource<U>
    where
        U: 'static,
        I: IntoIterator<Item = U>,
        F: Fn(T) -> I + Send + Sync + 'static,
    {
        let upstream = Arc::clone(self);
        let f = Arc::new(f);
        create(move |sink: Sink<U>| {
            let f = Arc::clone(&f);
            upstream.subscribe(Sink::new(move |value| {
                for item in f(value) {
                    sink.accept(item);
                }
            }))
        })
    }

    fn observe_on(&self, scheduler: Arc<dyn Scheduler>) -> SharedSource<T>
    where
        T: Send,
    {
        let upstream = Arc::clone(self);
        create(move |sink: Sink<T>| {
            let stopped = Arc::new(AtomicBool::new(false));
            let scheduler = Arc::clone(&scheduler);
            let gate = stopped.clone();
            let upstream_handle = upstream.subscribe(Sink::new(move |value| {
                let sink = sink.clone();
                let stopped = gate.clone();
                scheduler.schedule(Box::new(move || {
                    if !stopped.load(Ordering::Acquire) {
                        sink.accept(value);
                    }
                }));
            }));
            Cancellable::new(move || {
                stopped.store(true, Ordering::Release);
                upstream_handle.cancel();
            })
        })
    }

    fn delay_until(&self, gate: BehaviorSource<bool>) -> SharedSource<T>
    where
        T: Send,
    {
        let upstream = Arc::clone(self);
        create(move |sink: Sink<T>| {
            let buffer = Arc::new(Mutex::new(Delay::Closed(VecDeque::new())));
            let handles = CompositeCancellable::new();

            let incoming = {
                let buffer = buffer.clone();
                let sink = sink.clone();
                Sink::new(move |value| {
                    let mut state = lock(&buffer);
                    if let Delay::Closed(queue) | Delay::Flushing(queue) = &mut *state {
                        queue.push_back(value);
                        return;
                    }
                    drop(state);
                    sink.accept(value);
                })
            };
            handles.add(upstream.subscribe(incoming));

            let opener = Sink::new(move |ready: bool| {
                if ready {
                    flush(&buffer, &sink);
                }
            });
            handles.add(gate.subscribe(opener));

            handles.to_cancellable()
        })
    }
}

enum Delay<T> {
    Closed(VecDeque<T>),
    Flushing(VecDeque<T>),
    Open,
}

/// Drains the buffer one value at a time so values emitted re-entrantly while
/// flushing queue up behind the buffered ones instead of overtaking them.
fn flush<T>(buffer: &Mutex<Delay<T>>, sink: &Sink<T>) {
    {
        let mut state = lock(buffer);
        match std::mem::replace(&mut *state, Delay::Open) {
            Delay::Closed(queue) => *state = Delay::Flushing(queue),
            other => {
                *state = other;
                return;
            }
        }
    }
    loop {
        let next = {
            let mut state = lock(buffer);
            let popped = match &mut *state {
                Delay::Flushing(queue) => queue.pop_front(),
                _ => return,
            };
            if popped.is_none() {
                *state = Delay::Open;
            }
            popped
        };
        match next {
            Some(value) => sink.accept(value),
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ImmediateScheduler;
    use crate::source::{PublishSource, Source};

    fn collector<T: Send + 'static>() -> (Sink<T>, Arc<Mutex<Vec<T>>>) {
        let values = Arc::new(Mutex::new(Vec::new()));
        let v = values.clone();
        (Sink::new(move |x| v.lock().unwrap().push(x)), values)
    }

    #[test]
    fn filter_map_drops_none() {
        let source = PublishSource::new();
        let (sink, values) = collector();
        let _h = source
            .shared()
            .filter_map(|v: i32| (v % 2 == 1).then_some(v * 10))
            .subscribe(sink);

        for v in 0..4 {
            source.accept(v);
        }
        assert_eq!(*values.lock().unwrap(), vec![10, 30]);
    }

    #[test]
    fn flat_map_expands_in_order() {
        let source = PublishSource::new();
        let (sink, values) = collector();
        let _h = source.shared().flat_map(|v: i32| vec![v, v + 1]).subscribe(sink);
        source.accept(1);
        assert_eq!(*values.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn delay_until_buffers_then_passes_through() {
        let source = PublishSource::new();
        let gate = BehaviorSource::new(false);
        let (sink, values) = collector();
        let _h = source.shared().delay_until(gate.clone()).subscribe(sink);

        source.accept(1);
        source.accept(2);
        assert!(values.lock().unwrap().is_empty());

        gate.accept(true);
        assert_eq!(*values.lock().unwrap(), vec![1, 2]);

        source.accept(3);
        assert_eq!(*values.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn delay_until_open_gate_is_pass_through() {
        let source = PublishSource::new();
        let gate = BehaviorSource::new(true);
        let (sink, values) = collector();
        let _h = source.shared().delay_until(gate).subscribe(sink);
        source.accept(1);
        assert_eq!(*values.lock().unwrap(), vec![1]);
    }

    #[test]
    fn observe_on_immediate_delivers_inline() {
        let source = PublishSource::new();
        let (sink, values) = collector();
        let _h = source
            .shared()
            .observe_on(Arc::new(ImmediateScheduler))
            .subscribe(sink);
        source.accept("a");
        assert_eq!(*values.lock().unwrap(), vec!["a"]);
    }
}
