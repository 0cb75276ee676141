//! Single-argument callback consuming values.

use std::fmt;
use std::sync::Arc;

/// Cheap-clone consumer of values.
///
/// A sink must not panic for normal values; a panicking sink is caught and
/// logged by the publishing source, and other sinks keep receiving.
pub struct Sink<T> {
    f: Arc<dyn Fn(T) + Send + Sync>,
    label: Option<Arc<str>>,
}

impl<T> Sink<T> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            f: Arc::new(f),
            label: None,
        }
    }

    /// Attaches a diagnostic label shown by `Display`.
    pub fn labelled(mut self, label: impl Into<Arc<str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[inline]
    pub fn accept(&self, value: T) {
        (self.f)(value)
    }

    /// Returns a sink that applies `f` before handing values to `self`.
    pub fn contramap<U, F>(&self, f: F) -> Sink<U>
    where
        T: 'static,
        F: Fn(U) -> T + Send + Sync + 'static,
    {
        let inner = self.clone();
        Sink::new(move |value| inner.accept(f(value)))
    }
}

impl<T> Clone for Sink<T> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
            label: self.label.clone(),
        }
    }
}

impl<T> fmt::Display for Sink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => f.write_str(label),
            None => f.write_str("sink"),
        }
    }
}

impl<T> fmt::Debug for Sink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink").field("label", &self.label).finish()
    }
}

/// Conversion into a [`Sink`], used wherever a destination is expected.
pub trait IntoSink<T> {
    fn into_sink(self) -> Sink<T>;
}

impl<T> IntoSink<T> for Sink<T> {
    fn into_sink(self) -> Sink<T> {
        self
    }
}

impl<T> IntoSink<T> for crate::source::PublishSource<T>
where
    T: Clone + Send + 'static,
{
    fn into_sink(self) -> Sink<T> {
        self.sink()
    }
}

impl<T> IntoSink<T> for crate::source::BehaviorSource<T>
where
    T: Clone + Send + 'static,
{
    fn into_sink(self) -> Sink<T> {
        self.sink()
    }
}
