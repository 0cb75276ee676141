//! # Diagnostic interposition on connections.
//!
//! A [`Middleware`] observes one connection without touching its values:
//!
//! ```text
//! upstream ──► on_element(conn, &v) ──► sink.accept(v)
//!   bind   ──► on_bind(conn)            (once per activation)
//!   origin finishes or teardown
//!          ──► on_complete(conn)        (once per activation, whichever first)
//! ```
//!
//! Middleware never vetoes or rewrites a value. Use it for logging, recording
//! or metrics, not business logic.
//!
//! [`StandaloneMiddleware`] instruments a plain sink outside any binder; it is
//! tied to the one connection it creates and rejects any other.

use std::fmt::Debug;
use std::sync::Arc;

use crate::cancellable::Cancellable;
use crate::connection::Connection;
use crate::error::MiddlewareError;
use crate::sink::{IntoSink, Sink};

/// Observer of a single connection's lifecycle and values.
pub trait Middleware<Out, In>: Send + Sync + 'static {
    /// Called once when the connection becomes active.
    fn on_bind(&self, _connection: &Connection<Out, In>) {}

    /// Called for every value right before it reaches the destination sink.
    fn on_element(&self, _connection: &Connection<Out, In>, _element: &In) {}

    /// Called once when the connection's origin finishes or the connection
    /// is torn down, whichever happens first. Values buffered during init or
    /// queued on a scheduler are observed before this.
    fn on_complete(&self, _connection: &Connection<Out, In>) {}
}

/// Middleware attached directly to a sink, outside the wiring graph.
///
/// Fires `on_bind` at construction and `on_complete` on the first `cancel()`.
pub struct StandaloneMiddleware<T> {
    wrapped: Arc<dyn Middleware<T, T>>,
    connection: Connection<T, T>,
    completion: Cancellable,
}

impl<T> StandaloneMiddleware<T>
where
    T: Send + 'static,
{
    /// Instruments `sink` with `wrapped`.
    ///
    /// The private connection is named `"<name>.<postfix>"`, where an absent
    /// name is empty and an absent postfix is `input`.
    pub fn new(
        wrapped: Arc<dyn Middleware<T, T>>,
        sink: impl IntoSink<T>,
        name: Option<&str>,
        postfix: Option<&str>,
    ) -> Self {
        let connection = Connection::to_sink(sink).named(format!(
            "{}.{}",
            name.unwrap_or(""),
            postfix.unwrap_or("input")
        ));
        wrapped.on_bind(&connection);

        let completion = {
            let wrapped = Arc::clone(&wrapped);
            let connection = connection.clone();
            Cancellable::new(move || wrapped.on_complete(&connection))
        };

        Self {
            wrapped,
            connection,
            completion,
        }
    }

    /// The connection this middleware was created for.
    pub fn connection(&self) -> &Connection<T, T> {
        &self.connection
    }

    pub fn on_bind(&self, connection: &Connection<T, T>) -> Result<(), MiddlewareError> {
        self.assert_same(connection)?;
        self.wrapped.on_bind(connection);
        Ok(())
    }

    pub fn on_element(&self, connection: &Connection<T, T>, element: &T) -> Result<(), MiddlewareError> {
        self.assert_same(connection)?;
        self.wrapped.on_element(connection, element);
        Ok(())
    }

    pub fn on_complete(&self, connection: &Connection<T, T>) -> Result<(), MiddlewareError> {
        self.assert_same(connection)?;
        self.completion.cancel();
        Ok(())
    }

    /// Records `value` and forwards it to the wrapped sink.
    pub fn accept(&self, value: T) {
        self.wrapped.on_element(&self.connection, &value);
        self.connection.to().accept(value);
    }

    /// Fires `on_complete` (once).
    pub fn cancel(&self) {
        self.completion.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.completion.is_cancelled()
    }

    fn assert_same(&self, connection: &Connection<T, T>) -> Result<(), MiddlewareError> {
        if connection.same_as(&self.connection) {
            Ok(())
        } else {
            Err(MiddlewareError::ForeignConnection {
                expected: self.connection.id(),
                actual: connection.id(),
            })
        }
    }
}

impl<T> IntoSink<T> for StandaloneMiddleware<T>
where
    T: Send + 'static,
{
    fn into_sink(self) -> Sink<T> {
        let label = self.connection.name().unwrap_or("standalone").to_owned();
        Sink::new(move |value| self.accept(value)).labelled(label)
    }
}

/// Logs bind, element and completion events through `tracing`.
#[derive(Clone, Copy, Debug)]
pub struct TracingMiddleware {
    level: tracing::Level,
}

impl TracingMiddleware {
    pub fn new(level: tracing::Level) -> Self {
        Self { level }
    }
}

impl Default for TracingMiddleware {
    fn default() -> Self {
        Self::new(tracing::Level::DEBUG)
    }
}

macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {{
        let level = $level;
        if level == tracing::Level::ERROR {
            tracing::error!($($arg)+)
        } else if level == tracing::Level::WARN {
            tracing::warn!($($arg)+)
        } else if level == tracing::Level::INFO {
            tracing::info!($($arg)+)
        } else if level == tracing::Level::DEBUG {
            tracing::debug!($($arg)+)
        } else {
            tracing::trace!($($arg)+)
        }
    }};
}

impl<Out, In> Middleware<Out, In> for TracingMiddleware
where
    Out: 'static,
    In: Debug + 'static,
{
    fn on_bind(&self, connection: &Connection<Out, In>) {
        log_at!(self.level, connection = %connection, "binding");
    }

    fn on_element(&self, connection: &Connection<Out, In>, element: &In) {
        log_at!(self.level, connection = %connection, ?element, "element");
    }

    fn on_complete(&self, connection: &Connection<Out, In>) {
        log_at!(self.level, connection = %connection, "completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Counting {
        events: Mutex<Vec<String>>,
    }

    impl Middleware<i32, i32> for Counting {
        fn on_bind(&self, _c: &Connection<i32, i32>) {
            self.events.lock().unwrap().push("bind".into());
        }
        fn on_element(&self, _c: &Connection<i32, i32>, element: &i32) {
            self.events.lock().unwrap().push(format!("element {element}"));
        }
        fn on_complete(&self, _c: &Connection<i32, i32>) {
            self.events.lock().unwrap().push("complete".into());
        }
    }

    #[test]
    fn standalone_binds_on_creation_and_completes_once() {
        let counting = Arc::new(Counting::default());
        let received = Arc::new(Mutex::new(Vec::new()));
        let r = received.clone();
        let standalone = StandaloneMiddleware::new(
            counting.clone(),
            Sink::new(move |v| r.lock().unwrap().push(v)),
            Some("feature"),
            None,
        );
        assert_eq!(standalone.connection().name(), Some("feature.input"));

        standalone.accept(1);
        standalone.cancel();
        standalone.cancel();

        assert_eq!(*received.lock().unwrap(), vec![1]);
        assert_eq!(
            *counting.events.lock().unwrap(),
            vec!["bind", "element 1", "complete"]
        );
    }

    #[test]
    fn standalone_rejects_foreign_connection() {
        let standalone = StandaloneMiddleware::new(
            Arc::new(Counting::default()),
            Sink::new(|_: i32| {}),
            None,
            Some("output"),
        );
        let foreign = Connection::to_sink(Sink::new(|_: i32| {}));

        let err = standalone.on_bind(&foreign).unwrap_err();
        assert_eq!(err.as_label(), "middleware_foreign_connection");
        assert!(standalone.on_element(&foreign, &1).is_err());
        assert!(standalone
            .on_bind(&standalone.connection().clone())
            .is_ok());
    }
}
