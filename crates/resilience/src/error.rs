//! Error types shared by the resilience layer.
//!
//! Transport failures arrive already classified: the remote adapter decides
//! whether a failure was a timeout, a dropped connection, or an HTTP-class
//! status, so retry decisions never depend on message text.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Closed set of failure classes a transport can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Connection,
    ServerError,
    ClientError,
    Other,
}

/// Failure reported by a remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportError {
    /// The request did not complete before its deadline.
    #[error("request timed out: {message}")]
    Timeout { message: String },
    /// The connection could not be established or was dropped.
    #[error("connection failed: {message}")]
    Connection { message: String },
    /// The remote answered with a 5xx status.
    #[error("server error: HTTP {status}: {message}")]
    Server { status: u16, message: String },
    /// The remote answered with a 4xx status.
    #[error("client error: HTTP {status}: {message}")]
    Client { status: u16, message: String },
    /// Anything the transport could not classify.
    #[error("{message}")]
    Other { message: String },
}

impl TransportError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Classify an HTTP status into the matching variant.
    ///
    /// Statuses outside 4xx/5xx are not failures a transport should report,
    /// so they land in [`TransportError::Other`].
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400..=499 => Self::Client { status, message },
            500..=599 => Self::Server { status, message },
            _ => Self::Other {
                message: format!("unexpected HTTP {status}: {message}"),
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Server { .. } => ErrorKind::ServerError,
            Self::Client { .. } => ErrorKind::ClientError,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// HTTP status, when the remote answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } | Self::Client { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Outcome of a call guarded by a [`CircuitBreaker`](crate::CircuitBreaker).
///
/// The two rejection variants mean the wrapped operation never ran.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BreakerError<E> {
    /// The circuit is open and the cool-down has not elapsed.
    #[error("circuit '{breaker}' is open; retry in {retry_after:?}")]
    CircuitOpen {
        breaker: String,
        retry_after: Duration,
    },
    /// The circuit is half-open and every trial slot is taken.
    #[error("circuit '{breaker}' is half-open and all {max_attempts} trial calls are in use")]
    MaxHalfOpenAttempts { breaker: String, max_attempts: u32 },
    /// The wrapped operation ran and failed.
    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// True when the breaker short-circuited the call.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Inner(_))
    }

    pub fn inner(&self) -> Option<&E> {
        match self {
            Self::Inner(err) => Some(err),
            _ => None,
        }
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(err) => Some(err),
            _ => None,
        }
    }

    pub fn map_inner<F, O>(self, f: O) -> BreakerError<F>
    where
        O: FnOnce(E) -> F,
    {
        match self {
            Self::CircuitOpen {
                breaker,
                retry_after,
            } => BreakerError::CircuitOpen {
                breaker,
                retry_after,
            },
            Self::MaxHalfOpenAttempts {
                breaker,
                max_attempts,
            } => BreakerError::MaxHalfOpenAttempts {
                breaker,
                max_attempts,
            },
            Self::Inner(err) => BreakerError::Inner(f(err)),
        }
    }
}

/// Error returned by a resilient remote call.
pub type CallError = BreakerError<TransportError>;

/// Rejected configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}

impl ConfigError {
    pub(crate) fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}
