//! Holds the signed-in session for the lifetime of a client.

use std::sync::{PoisonError, RwLock};

use crate::error::NotesError;
use crate::model::{Session, User};

#[derive(Debug, Default)]
pub struct SessionStore {
    current: RwLock<Option<Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, session: Session) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
    }

    /// Remove and return the stored session.
    pub fn clear(&self) -> Option<Session> {
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn get(&self) -> Option<Session> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn user(&self) -> Option<User> {
        self.get().map(|session| session.user)
    }

    /// Bearer token for authenticated calls.
    pub fn token(&self) -> Result<String, NotesError> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|session| session.token.clone())
            .ok_or(NotesError::NotSignedIn)
    }

    pub fn is_signed_in(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn token_requires_a_session() {
        let store = SessionStore::new();
        assert!(matches!(store.token(), Err(NotesError::NotSignedIn)));

        store.set(Session {
            user: User {
                id: Uuid::new_v4(),
                email: "ada@example.com".into(),
                display_name: "Ada".into(),
                created_at: Utc::now(),
            },
            token: "abc".into(),
        });
        assert_eq!(store.token().unwrap(), "abc");

        assert!(store.clear().is_some());
        assert!(!store.is_signed_in());
    }
}
