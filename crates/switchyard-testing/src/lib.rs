//! # Switchyard Testing
//!
//! Helpers for testing code built on switchyard.
//!
//! - [`TestSink`] collects every value it receives, with assertion helpers
//! - [`RecordingMiddleware`] records bind/element/complete events with
//!   timestamps and can dump them as JSON
//! - [`TestScheduler`] queues delivery work until [`TestScheduler::run_pending`]
//! - [`wait_until`] polls a condition from async tests
//!
//! ## Example
//!
//! ```
//! use switchyard::{Binder, Connection, PublishSource};
//! use switchyard_testing::TestSink;
//!
//! let source = PublishSource::<i32>::new();
//! let sink = TestSink::new();
//! let binder = Binder::new();
//! binder.bind(Connection::new(source.clone(), sink.sink())).unwrap();
//!
//! source.accept(1);
//! sink.assert_values(&[1]);
//! ```

use std::collections::VecDeque;
use std::fmt::{self, Debug};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use switchyard::{Connection, ConnectionId, IntoSink, Middleware, Scheduler, Sink, Work};
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// TestSink
// ============================================================================

/// Sink that remembers every value, in arrival order.
///
/// Clones share the same buffer.
pub struct TestSink<T> {
    values: Arc<Mutex<Vec<T>>>,
    label: Option<String>,
}

impl<T> Clone for TestSink<T> {
    fn clone(&self) -> Self {
        Self {
            values: Arc::clone(&self.values),
            label: self.label.clone(),
        }
    }
}

impl<T> Default for TestSink<T> {
    fn default() -> Self {
        Self {
            values: Arc::new(Mutex::new(Vec::new())),
            label: None,
        }
    }
}

impl<T: Send + 'static> TestSink<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink shown as `label` in connection diagnostics.
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    /// A [`Sink`] feeding this buffer.
    pub fn sink(&self) -> Sink<T> {
        let values = Arc::clone(&self.values);
        let sink = Sink::new(move |value| lock(&values).push(value));
        match &self.label {
            Some(label) => sink.labelled(label.as_str()),
            None => sink,
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.values).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.values).clear();
    }
}

impl<T: Clone + Send + 'static> TestSink<T> {
    /// Snapshot of everything received so far.
    pub fn values(&self) -> Vec<T> {
        lock(&self.values).clone()
    }

    pub fn last(&self) -> Option<T> {
        lock(&self.values).last().cloned()
    }
}

impl<T: Clone + Debug + PartialEq + Send + 'static> TestSink<T> {
    /// Panics unless exactly `expected` was received, in that order.
    #[track_caller]
    pub fn assert_values(&self, expected: &[T]) {
        let actual = self.values();
        assert_eq!(actual.as_slice(), expected, "unexpected values in test sink");
    }

    #[track_caller]
    pub fn assert_no_values(&self) {
        let actual = self.values();
        assert!(actual.is_empty(), "expected no values, got {actual:?}");
    }
}

impl<T: Send + 'static> IntoSink<T> for TestSink<T> {
    fn into_sink(self) -> Sink<T> {
        self.sink()
    }
}

impl<T> fmt::Debug for TestSink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSink")
            .field("label", &self.label)
            .field("len", &lock(&self.values).len())
            .finish()
    }
}

// ============================================================================
// RecordingMiddleware
// ============================================================================

/// What a [`RecordingMiddleware`] saw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordedKind {
    Bind,
    /// `value` is the element's `Debug` rendering.
    Element { value: String },
    Complete,
}

/// One middleware callback.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedEvent {
    pub id: Uuid,
    pub connection_id: ConnectionId,
    pub connection: Option<String>,
    #[serde(flatten)]
    pub kind: RecordedKind,
    pub recorded_at: DateTime<Utc>,
}

/// Middleware that records every callback it receives.
#[derive(Default)]
pub struct RecordingMiddleware {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingMiddleware {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        lock(&self.events).clone()
    }

    /// Compact view for assertions: `"bind"`, `"element <value>"`, `"complete"`.
    pub fn summary(&self) -> Vec<String> {
        lock(&self.events)
            .iter()
            .map(|event| match &event.kind {
                RecordedKind::Bind => "bind".to_owned(),
                RecordedKind::Element { value } => format!("element {value}"),
                RecordedKind::Complete => "complete".to_owned(),
            })
            .collect()
    }

    pub fn count(&self, matches: impl Fn(&RecordedKind) -> bool) -> usize {
        lock(&self.events)
            .iter()
            .filter(|event| matches(&event.kind))
            .count()
    }

    /// All recorded events as a pretty-printed JSON array.
    pub fn to_json(&self) -> anyhow::Result<String> {
        let events = self.events();
        Ok(serde_json::to_string_pretty(&events)?)
    }

    fn record<Out: 'static, In: 'static>(&self, connection: &Connection<Out, In>, kind: RecordedKind) {
        lock(&self.events).push(RecordedEvent {
            id: Uuid::new_v4(),
            connection_id: connection.id(),
            connection: connection.name().map(str::to_owned),
            kind,
            recorded_at: Utc::now(),
        });
    }
}

impl<Out, In> Middleware<Out, In> for RecordingMiddleware
where
    Out: 'static,
    In: Debug + 'static,
{
    fn on_bind(&self, connection: &Connection<Out, In>) {
        self.record(connection, RecordedKind::Bind);
    }

    fn on_element(&self, connection: &Connection<Out, In>, element: &In) {
        self.record(
            connection,
            RecordedKind::Element {
                value: format!("{element:?}"),
            },
        );
    }

    fn on_complete(&self, connection: &Connection<Out, In>) {
        self.record(connection, RecordedKind::Complete);
    }
}

// ============================================================================
// TestScheduler
// ============================================================================

/// Scheduler that holds work until the test releases it.
#[derive(Default)]
pub struct TestScheduler {
    queue: Mutex<VecDeque<Work>>,
}

impl TestScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pending(&self) -> usize {
        lock(&self.queue).len()
    }

    /// Runs queued work, including work queued while running, until the
    /// queue is empty. Returns how many jobs ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = lock(&self.queue).pop_front();
            match next {
                Some(work) => {
                    work();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl Scheduler for TestScheduler {
    fn schedule(&self, work: Work) {
        lock(&self.queue).push_back(work);
    }

    fn name(&self) -> &'static str {
        "test"
    }
}

// ============================================================================
// Async helpers
// ============================================================================

/// Polls `condition` every millisecond until it holds or `timeout` elapses.
/// Returns whether it held.
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let waiting = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    };
    tokio::time::timeout(timeout, waiting).await.is_ok()
}
