//! Error types for the reactive core.

use std::any::Any;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReactiveError>;

/// Errors produced by the reactive runtime and observable containers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReactiveError {
    /// A write was attempted through a read-only handle.
    #[error("cannot mutate key `{key}`: target is read-only")]
    Readonly { key: String },

    /// A write was attempted on a computed value created without a setter.
    #[error("computed value is read-only: no setter was provided")]
    ReadonlyComputed,

    /// The container kind does not support the requested operation.
    #[error("`{operation}` is not supported by a {kind} container")]
    KindMismatch {
        operation: &'static str,
        kind: &'static str,
    },

    /// The key cannot address a slot of this container kind.
    #[error("invalid key for a {kind} container: {key}")]
    InvalidKey { kind: &'static str, key: String },

    /// A computed getter read its own value while evaluating.
    #[error("computed {subscriber} depends on its own value")]
    CyclicComputed { subscriber: String },

    /// The subscriber's graph node no longer exists.
    #[error("subscriber {subscriber} has been disposed")]
    Disposed { subscriber: String },

    #[error("cannot run an inactive effect scope")]
    ScopeInactive,

    /// The recursive-update guard tripped during a flush.
    #[error(
        "maximum recursive updates exceeded in {subscriber} (limit {limit}); \
         it probably writes state that it also reads"
    )]
    RecursionLimit { subscriber: String, limit: u32 },

    /// A user function (effect body, computed getter, scheduler) panicked.
    #[error("{subscriber} panicked: {message}")]
    Panicked { subscriber: String, message: String },

    /// One or more subscribers failed while a flush kept going.
    #[error("{} subscriber(s) failed during flush", failures.len())]
    Flush { failures: Vec<ReactiveError> },
}

impl ReactiveError {
    /// Build a [`ReactiveError::Panicked`] from a caught panic payload.
    pub(crate) fn panicked(subscriber: impl Into<String>, payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked {
            subscriber: subscriber.into(),
            message,
        }
    }

    pub(crate) fn kind_mismatch(operation: &'static str, kind: &'static str) -> Self {
        Self::KindMismatch { operation, kind }
    }

    /// Whether this error aborted a whole batch rather than a single subscriber.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RecursionLimit { .. })
    }
}
