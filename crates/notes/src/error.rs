use resilience::{BreakerError, CallError, TransportError};
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by repositories and use cases.
///
/// Display strings are user-facing: the front end prints them as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotesError {
    #[error("{field} {reason}")]
    Validation { field: &'static str, reason: String },

    /// Another call to the same use case is still running.
    #[error("{operation} is already in progress")]
    Busy { operation: &'static str },

    #[error("not signed in")]
    NotSignedIn,

    #[error("session is no longer valid; sign in again")]
    Unauthorized,

    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("{service} is unavailable; try again in {}s", .retry_after.as_secs().max(1))]
    CircuitOpen {
        service: String,
        retry_after: Duration,
    },

    #[error("{service} is recovering; try again shortly")]
    ServiceRecovering { service: String },

    #[error(transparent)]
    Transport(TransportError),
}

impl NotesError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// The remote no longer recognizes the caller or the record.
    pub fn is_gone(&self) -> bool {
        matches!(
            self,
            Self::NotSignedIn | Self::Unauthorized | Self::NotFound { .. }
        )
    }
}

impl From<TransportError> for NotesError {
    fn from(err: TransportError) -> Self {
        match err.status() {
            Some(401) | Some(403) => Self::Unauthorized,
            Some(404) => Self::NotFound {
                message: transport_message(err),
            },
            Some(409) => Self::Conflict {
                message: transport_message(err),
            },
            _ => Self::Transport(err),
        }
    }
}

impl From<CallError> for NotesError {
    fn from(err: CallError) -> Self {
        match err {
            BreakerError::CircuitOpen {
                breaker,
                retry_after,
            } => Self::CircuitOpen {
                service: breaker,
                retry_after,
            },
            BreakerError::MaxHalfOpenAttempts { breaker, .. } => {
                Self::ServiceRecovering { service: breaker }
            }
            BreakerError::Inner(err) => err.into(),
        }
    }
}

fn transport_message(err: TransportError) -> String {
    match err {
        TransportError::Timeout { message }
        | TransportError::Connection { message }
        | TransportError::Server { message, .. }
        | TransportError::Client { message, .. }
        | TransportError::Other { message } => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_domain_errors() {
        let unauthorized: NotesError = TransportError::from_status(403, "forbidden").into();
        assert_eq!(unauthorized, NotesError::Unauthorized);

        let missing: NotesError =
            CallError::Inner(TransportError::from_status(404, "note 1 not found")).into();
        assert_eq!(missing.to_string(), "not found: note 1 not found");
        assert!(missing.is_gone());

        let server: NotesError = TransportError::from_status(500, "oops").into();
        assert!(matches!(server, NotesError::Transport(_)));
    }

    #[test]
    fn rejections_map_to_availability_errors() {
        let open: NotesError = CallError::CircuitOpen {
            breaker: "notes".into(),
            retry_after: Duration::from_millis(2500),
        }
        .into();
        assert_eq!(open.to_string(), "notes is unavailable; try again in 2s");

        let recovering: NotesError = CallError::MaxHalfOpenAttempts {
            breaker: "tasks".into(),
            max_attempts: 3,
        }
        .into();
        assert_eq!(
            recovering,
            NotesError::ServiceRecovering {
                service: "tasks".into()
            }
        );
    }
}
