//! # Disposable handles for subscriptions and running work.
//!
//! Every `subscribe` in switchyard returns a [`Cancellable`]. The caller owns it
//! and is expected to either keep it or cancel it; dropping a handle does
//! **not** tear anything down.
//!
//! ## Rules
//! - `cancel()` runs the teardown action **at most once**, no matter how many
//!   times or from how many threads it is called.
//! - `is_cancelled()` is monotonic: once `true`, it never goes back.
//! - [`CompositeCancellable::add`] on an already cancelled composite cancels
//!   the child immediately instead of storing it.
//! - A panicking child teardown never stops the composite from attempting the
//!   remaining children.
//!
//! ```text
//! CompositeCancellable
//!   ├── Cancellable (origin subscription #1)
//!   ├── Cancellable (origin subscription #2)
//!   └── Cancellable (in-flight effect stream)
//!
//! cancel() ──► take children ──► cancel each (panic-isolated) ──► mark cancelled
//! ```

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use smallvec::SmallVec;

/// Anything that can be torn down.
pub trait Cancel: Send + Sync + 'static {
    /// Tears the resource down. Must be idempotent and must not fail.
    fn cancel(&self);

    /// Returns `true` once [`Cancel::cancel`] has run (or the resource finished on its own).
    fn is_cancelled(&self) -> bool;
}

type Teardown = Box<dyn FnOnce() + Send>;

struct ActionCancel {
    cancelled: AtomicBool,
    action: Mutex<Option<Teardown>>,
}

impl Cancel for ActionCancel {
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        let action = match self.action.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(action) = action {
            action();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

struct Handle {
    resource: Arc<dyn Cancel>,
    listeners: Mutex<Vec<Teardown>>,
}

/// Cheap-clone handle to a single teardown.
///
/// Clones refer to the same underlying resource: cancelling any clone cancels
/// all of them.
#[derive(Clone)]
#[must_use = "dropping a Cancellable does not cancel it; store it or call cancel()"]
pub struct Cancellable {
    inner: Arc<Handle>,
}

impl Cancellable {
    /// Creates a handle that runs `action` on first cancel.
    pub fn new<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::from_cancel(ActionCancel {
            cancelled: AtomicBool::new(false),
            action: Mutex::new(Some(Box::new(action))),
        })
    }

    /// A handle with nothing to tear down.
    pub fn empty() -> Self {
        Self::new(|| {})
    }

    /// A handle that is already cancelled.
    ///
    /// Returned by sources that finish synchronously inside `subscribe`.
    pub fn finished() -> Self {
        let handle = Self::empty();
        handle.cancel();
        handle
    }

    /// Wraps any [`Cancel`] implementation.
    pub fn from_cancel<C: Cancel>(resource: C) -> Self {
        Self {
            inner: Arc::new(Handle {
                resource: Arc::new(resource),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Runs the teardown action if it has not run yet, then notifies
    /// listeners registered with [`Cancellable::on_cancelled`].
    pub fn cancel(&self) {
        self.inner.resource.cancel();
        let listeners = std::mem::take(&mut *lock(&self.inner.listeners));
        for listener in listeners {
            listener();
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.resource.is_cancelled()
    }

    /// Runs `listener` once this handle, or any clone of it, is cancelled.
    /// Runs it right away if that already happened.
    ///
    /// Sources that finish on their own cancel their handle, so this doubles
    /// as a completion signal. A resource cancelled behind the handle's back
    /// (e.g. a composite cancelled directly) does not notify.
    pub fn on_cancelled<F>(&self, listener: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut listeners = lock(&self.inner.listeners);
            if !self.inner.resource.is_cancelled() {
                listeners.push(Box::new(listener));
                return;
            }
        }
        listener();
    }

    /// Identity comparison: `true` if both handles refer to the same resource.
    pub fn same_as(&self, other: &Cancellable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Cancel for Cancellable {
    fn cancel(&self) {
        Cancellable::cancel(self);
    }

    fn is_cancelled(&self) -> bool {
        Cancellable::is_cancelled(self)
    }
}

impl fmt::Debug for Cancellable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancellable")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

struct CompositeInner {
    cancelled: AtomicBool,
    children: Mutex<SmallVec<[Cancellable; 4]>>,
}

/// Aggregate of child handles, cancelled together exactly once.
#[derive(Clone)]
pub struct CompositeCancellable {
    inner: Arc<CompositeInner>,
}

impl CompositeCancellable {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CompositeInner {
                cancelled: AtomicBool::new(false),
                children: Mutex::new(SmallVec::new()),
            }),
        }
    }

    /// Creates a composite that already owns `children`.
    pub fn with_children<I>(children: I) -> Self
    where
        I: IntoIterator<Item = Cancellable>,
    {
        let composite = Self::new();
        for child in children {
            composite.add(child);
        }
        composite
    }

    /// Adopts `child`.
    ///
    /// If the composite is already cancelled, `child` is cancelled right away.
    /// Children that have already finished are not stored; finished children
    /// held from earlier adds are pruned on the way.
    pub fn add(&self, child: Cancellable) {
        if self.is_cancelled() {
            child.cancel();
            return;
        }
        if child.is_cancelled() {
            return;
        }

        let mut children = lock(&self.inner.children);
        // Re-check under the lock: a concurrent cancel() may have drained already.
        if self.inner.cancelled.load(Ordering::Acquire) {
            drop(children);
            child.cancel();
            return;
        }
        children.retain(|c| !c.is_cancelled());
        children.push(child);
    }

    /// Detaches `child` without cancelling it. Returns `true` if it was held.
    pub fn remove(&self, child: &Cancellable) -> bool {
        let mut children = lock(&self.inner.children);
        let before = children.len();
        children.retain(|c| !c.same_as(child));
        children.len() != before
    }

    /// Number of live children currently held.
    pub fn len(&self) -> usize {
        lock(&self.inner.children)
            .iter()
            .filter(|c| !c.is_cancelled())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancels every current child, clears the set, then marks the composite
    /// cancelled.
    pub fn cancel(&self) {
        let children = {
            let mut guard = lock(&self.inner.children);
            self.inner.cancelled.store(true, Ordering::Release);
            std::mem::take(&mut *guard)
        };
        cancel_all(children);
    }

    /// Cancels and drops every current child but keeps the composite usable.
    pub fn clear(&self) {
        let children = std::mem::take(&mut *lock(&self.inner.children));
        cancel_all(children);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Type-erases this composite into a plain [`Cancellable`], e.g. to nest it
    /// inside another composite.
    pub fn to_cancellable(&self) -> Cancellable {
        Cancellable::from_cancel(self.clone())
    }
}

impl Default for CompositeCancellable {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancel for CompositeCancellable {
    fn cancel(&self) {
        CompositeCancellable::cancel(self);
    }

    fn is_cancelled(&self) -> bool {
        CompositeCancellable::is_cancelled(self)
    }
}

impl fmt::Debug for CompositeCancellable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeCancellable")
            .field("cancelled", &self.is_cancelled())
            .field("children", &self.len())
            .finish()
    }
}

fn cancel_all(children: SmallVec<[Cancellable; 4]>) {
    for child in children {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| child.cancel())) {
            tracing::error!(?panic, "child teardown panicked; continuing with remaining children");
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting() -> (Cancellable, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (
            Cancellable::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
            count,
        )
    }

    #[test]
    fn is_not_cancelled_by_default() {
        let (handle, _) = counting();
        assert!(!handle.is_cancelled());
    }

    #[test]
    fn action_runs_exactly_once() {
        let (handle, count) = counting();
        handle.cancel();
        handle.clone().cancel();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(handle.is_cancelled());
    }

    #[test]
    fn composite_cancels_children() {
        let (child, count) = counting();
        let composite = CompositeCancellable::with_children([child.clone()]);
        composite.cancel();
        assert!(child.is_cancelled());
        assert!(composite.is_cancelled());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn composite_does_not_cancel_removed_children() {
        let (child, _) = counting();
        let composite = CompositeCancellable::with_children([child.clone()]);
        assert!(composite.remove(&child));
        composite.cancel();
        assert!(!child.is_cancelled());
    }

    #[test]
    fn add_after_cancel_cancels_immediately() {
        let composite = CompositeCancellable::new();
        composite.cancel();
        let (child, count) = counting();
        composite.add(child.clone());
        assert!(child.is_cancelled());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(composite.is_empty());
    }

    #[test]
    fn panicking_child_does_not_abort_siblings() {
        let composite = CompositeCancellable::new();
        composite.add(Cancellable::new(|| panic!("teardown failed")));
        let (sibling, count) = counting();
        composite.add(sibling);
        composite.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn finished_children_are_not_retained() {
        let composite = CompositeCancellable::new();
        composite.add(Cancellable::finished());
        let (live, _) = counting();
        composite.add(live.clone());
        live.cancel();
        let (other, _) = counting();
        composite.add(other);
        assert_eq!(composite.len(), 1);
    }

    #[test]
    fn on_cancelled_fires_once_for_any_clone() {
        let (handle, _) = counting();
        let (listener, notified) = counting();
        handle.on_cancelled(move || listener.cancel());

        handle.clone().cancel();
        handle.cancel();

        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn on_cancelled_runs_immediately_when_already_finished() {
        let (listener, notified) = counting();
        Cancellable::finished().on_cancelled(move || listener.cancel());
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_keeps_composite_usable() {
        let composite = CompositeCancellable::new();
        let (first, _) = counting();
        composite.add(first.clone());
        composite.clear();
        assert!(first.is_cancelled());
        assert!(!composite.is_cancelled());

        let (second, _) = counting();
        composite.add(second.clone());
        assert!(!second.is_cancelled());
    }
}
