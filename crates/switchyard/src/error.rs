//! Error types used by the binder, middleware and feature engine.
//!
//! - [`BinderError`]: misuse of the binder API (programming errors).
//! - [`MiddlewareError`]: misuse of a standalone middleware.
//! - [`FeatureError`]: an actor failed while handling a specific wish.
//!
//! Cancellation never produces an error.
//! Each type provides `as_label()` for logs/metrics.

use thiserror::Error;

use crate::connection::ConnectionId;

/// # Errors produced by the binder.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BinderError {
    /// The connection has no origin source, so there is nothing to bind from.
    #[error("connection {connection} has no origin source")]
    MissingOrigin {
        /// Display form of the offending connection.
        connection: String,
    },
}

impl BinderError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use switchyard::BinderError;
    ///
    /// let err = BinderError::MissingOrigin { connection: "<anonymous>".into() };
    /// assert_eq!(err.as_label(), "binder_missing_origin");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BinderError::MissingOrigin { .. } => "binder_missing_origin",
        }
    }
}

/// # Errors produced by middleware.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MiddlewareError {
    /// A standalone middleware was invoked with a connection other than the
    /// one it was created for.
    #[error("standalone middleware bound to {expected} was invoked with {actual}")]
    ForeignConnection {
        expected: ConnectionId,
        actual: ConnectionId,
    },
}

impl MiddlewareError {
    pub fn as_label(&self) -> &'static str {
        match self {
            MiddlewareError::ForeignConnection { .. } => "middleware_foreign_connection",
        }
    }
}

/// # Errors produced while processing a wish.
///
/// The feature stays usable after any of these: its state is left as it was
/// before the failing wish.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum FeatureError {
    /// The actor rejected the action.
    #[error("actor failed: {0}")]
    Actor(anyhow::Error),
}

impl FeatureError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            FeatureError::Actor(_) => "feature_actor_failed",
        }
    }

    /// Borrows the underlying actor error.
    pub fn actor_error(&self) -> &anyhow::Error {
        match self {
            FeatureError::Actor(err) => err,
        }
    }
}
