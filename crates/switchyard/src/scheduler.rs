//! # Delivery executors.
//!
//! A [`Scheduler`] decides where and when a unit of delivery work runs. The
//! binder applies one per connection (see `Binder::observe_on`); it only moves
//! *delivery*, never the production of values, so fan-out de-duplication and
//! init buffering happen before the hop.
//!
//! ```text
//! origin ─► internal fan-out ─► connector ─► init delay ─► [scheduler hop] ─► middleware ─► sink
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One unit of delivery work.
pub type Work = Box<dyn FnOnce() + Send>;

/// Runs delivery work according to its own rules.
pub trait Scheduler: Send + Sync + 'static {
    fn schedule(&self, work: Work);

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Runs work inline, on the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn schedule(&self, work: Work) {
        work();
    }

    fn name(&self) -> &'static str {
        "immediate"
    }
}

/// Runs work on a dedicated tokio task, one job at a time, in submission order.
///
/// ```text
/// schedule(work) ──► [unbounded queue] ──► worker task ──► work()
/// ```
///
/// A panicking job is caught and logged; the worker keeps draining. Dropping
/// the scheduler closes the queue; the worker finishes the jobs already queued
/// and exits.
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<Work>,
    worker: JoinHandle<()>,
}

impl TokioScheduler {
    /// Spawns the worker on `runtime`.
    pub fn new(runtime: &tokio::runtime::Handle) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Work>();
        let worker = runtime.spawn(async move {
            while let Some(work) = rx.recv().await {
                if let Err(panic) = catch_unwind(AssertUnwindSafe(work)) {
                    tracing::error!(?panic, "scheduled delivery panicked");
                }
            }
        });
        Self { tx, worker }
    }

    /// Closes the queue and waits for the worker to drain it.
    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.worker.await;
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, work: Work) {
        if self.tx.send(work).is_err() {
            tracing::warn!("tokio scheduler worker is gone; delivery dropped");
        }
    }

    fn name(&self) -> &'static str {
        "tokio"
    }
}
