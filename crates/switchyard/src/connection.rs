//! # Connection descriptors.
//!
//! A [`Connection`] names an origin, a destination, an optional transform and
//! an optional diagnostic name. It is immutable once built and is identified
//! by its [`ConnectionId`], not by its contents: two connections built from
//! the same parts are two different connections.
//!
//! ```text
//! <name> (source#3 --> sink using filter_map)
//!           │            │         │
//!         from          to     connector
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scheduler::Scheduler;
use crate::sink::{IntoSink, Sink};
use crate::source::{IntoSource, SharedSource, Source, SourceExt};

const ANONYMOUS: &str = "anonymous";

/// Identity of a connection. Clones of a connection share it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        ConnectionId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type ConnectFn<Out, In> = dyn Fn(SharedSource<Out>) -> SharedSource<In> + Send + Sync;

/// Transform from a source of `Out` to a source of `In`.
pub struct Connector<Out, In> {
    name: Arc<str>,
    f: Arc<ConnectFn<Out, In>>,
}

impl<Out, In> Clone for Connector<Out, In> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            f: Arc::clone(&self.f),
        }
    }
}

impl<Out: 'static, In: 'static> Connector<Out, In> {
    /// Wraps an arbitrary source-to-source transform.
    pub fn new<F>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(SharedSource<Out>) -> SharedSource<In> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    /// One-to-one value mapping.
    pub fn map<F>(f: F) -> Self
    where
        F: Fn(Out) -> In + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::new("map", move |source: SharedSource<Out>| {
            let f = Arc::clone(&f);
            source.map(move |v| f(v))
        })
    }

    /// Mapping to an optional value; `None` results are dropped, never delivered.
    pub fn filter_map<F>(f: F) -> Self
    where
        F: Fn(Out) -> Option<In> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::new("filter_map", move |source: SharedSource<Out>| {
            let f = Arc::clone(&f);
            source.filter_map(move |v| f(v))
        })
    }

    /// Mapping to any number of values, delivered in order.
    pub fn flat_map<I, F>(f: F) -> Self
    where
        I: IntoIterator<Item = In>,
        F: Fn(Out) -> I + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::new("flat_map", move |source: SharedSource<Out>| {
            let f = Arc::clone(&f);
            source.flat_map(move |v| f(v))
        })
    }

    pub fn apply(&self, source: SharedSource<Out>) -> SharedSource<In> {
        (self.f)(source)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<Out, In> fmt::Debug for Connector<Out, In> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector").field("name", &self.name).finish()
    }
}

/// Immutable wiring record: origin, destination, transform, name.
pub struct Connection<Out, In> {
    id: ConnectionId,
    from: Option<SharedSource<Out>>,
    to: Sink<In>,
    connector: Option<Connector<Out, In>>,
    route: Arc<ConnectFn<Out, In>>,
    name: Option<Arc<str>>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl<Out, In> Clone for Connection<Out, In> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            from: self.from.clone(),
            to: self.to.clone(),
            connector: self.connector.clone(),
            route: Arc::clone(&self.route),
            name: self.name.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T: 'static> Connection<T, T> {
    /// Pass-through connection from `from` to `to`.
    pub fn new(from: impl IntoSource<T>, to: impl IntoSink<T>) -> Self {
        Self::build(Some(from.into_source()), to.into_sink(), None, Arc::new(|s: SharedSource<T>| s))
    }

    /// Connection without an origin. Only meaningful for standalone middleware;
    /// binding it is a misuse error.
    pub fn to_sink(to: impl IntoSink<T>) -> Self {
        Self::build(None, to.into_sink(), None, Arc::new(|s: SharedSource<T>| s))
    }
}

impl<Out: 'static, In: 'static> Connection<Out, In> {
    /// Connection whose values pass through `connector` on the way.
    pub fn with_connector(
        from: impl IntoSource<Out>,
        to: impl IntoSink<In>,
        connector: Connector<Out, In>,
    ) -> Self {
        let route = Arc::clone(&connector.f);
        Self::build(Some(from.into_source()), to.into_sink(), Some(connector), route)
    }

    /// Connection mapping each value to an optional value; `None` is dropped.
    pub fn filter_map<F>(from: impl IntoSource<Out>, to: impl IntoSink<In>, f: F) -> Self
    where
        F: Fn(Out) -> Option<In> + Send + Sync + 'static,
    {
        Self::with_connector(from, to, Connector::filter_map(f))
    }

    fn build(
        from: Option<SharedSource<Out>>,
        to: Sink<In>,
        connector: Option<Connector<Out, In>>,
        route: Arc<ConnectFn<Out, In>>,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            from,
            to,
            connector,
            route,
            name: None,
            scheduler: None,
        }
    }

    /// Sets the diagnostic name. Naming never affects routing.
    pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Delivers this connection's values on `scheduler`.
    pub fn observe_on(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn from(&self) -> Option<&SharedSource<Out>> {
        self.from.as_ref()
    }

    pub fn to(&self) -> &Sink<In> {
        &self.to
    }

    pub fn connector(&self) -> Option<&Connector<Out, In>> {
        self.connector.as_ref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.name.is_none()
    }

    pub fn scheduler(&self) -> Option<&Arc<dyn Scheduler>> {
        self.scheduler.as_ref()
    }

    /// Applies the connector, or passes `source` through unchanged.
    pub(crate) fn route(&self, source: SharedSource<Out>) -> SharedSource<In> {
        (self.route)(source)
    }

    /// `true` if `other` is this very connection (or a clone of it).
    pub fn same_as(&self, other: &Connection<Out, In>) -> bool {
        self.id == other.id
    }
}

impl<Out: 'static, In: 'static> fmt::Display for Connection<Out, In> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> (", self.name.as_deref().unwrap_or(ANONYMOUS))?;
        match &self.from {
            Some(from) => write!(f, "{}", from.source_id())?,
            None => f.write_str("?")?,
        }
        write!(f, " --> {}", self.to)?;
        if let Some(connector) = &self.connector {
            write!(f, " using {}", connector.name)?;
        }
        f.write_str(")")
    }
}

impl<Out: 'static, In: 'static> fmt::Debug for Connection<Out, In> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("from", &self.from.as_ref().map(|s| s.source_id()))
            .field("connector", &self.connector)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::PublishSource;

    #[test]
    fn structurally_equal_connections_are_distinct() {
        let source = PublishSource::<i32>::new();
        let sink = Sink::new(|_: i32| {});
        let a = Connection::new(source.clone(), sink.clone());
        let b = Connection::new(source, sink);
        assert!(!a.same_as(&b));
        assert!(a.same_as(&a.clone()));
    }

    #[test]
    fn display_uses_name_or_anonymous() {
        let source = PublishSource::<i32>::new();
        let id = crate::source::Source::source_id(&source);
        let sink = Sink::new(|_: String| {}).labelled("ui");
        let conn = Connection::filter_map(source, sink, |v: i32| Some(v.to_string()));
        assert_eq!(conn.to_string(), format!("<anonymous> ({id} --> ui using filter_map)"));
        assert!(conn.is_anonymous());

        let named = conn.named("render");
        assert_eq!(named.name(), Some("render"));
        assert!(named.to_string().starts_with("<render>"));
    }

    #[test]
    fn sink_only_connection_has_no_origin() {
        let conn = Connection::to_sink(Sink::new(|_: u8| {}));
        assert!(conn.from().is_none());
        assert!(conn.to_string().contains("(? -->"));
    }
}
