//! Repositories: session-aware façades over the data sources.
//!
//! They attach the bearer token, translate call errors into [`NotesError`],
//! and relay their data source's event bus unchanged.

use resilience::{DomainEvent, EventBus};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::datasource::{NoteDataSource, TaskDataSource, UserDataSource};
use crate::error::NotesError;
use crate::model::{
    Credentials, NewNote, NewTask, Note, NoteUpdate, Registration, Task, TaskUpdate, User,
};
use crate::session::SessionStore;

pub struct UserRepository {
    source: UserDataSource,
    session: Arc<SessionStore>,
}

impl UserRepository {
    pub fn new(source: UserDataSource, session: Arc<SessionStore>) -> Self {
        Self { source, session }
    }

    pub fn events(&self) -> &EventBus<DomainEvent> {
        self.source.events()
    }

    pub fn source(&self) -> &UserDataSource {
        &self.source
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub async fn register(&self, registration: &Registration) -> Result<User, NotesError> {
        let user = self.source.register(registration).await?;
        info!(user_id = %user.id, "user_registered");
        Ok(user)
    }

    /// Log in and keep the session for later calls.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<User, NotesError> {
        let session = self.source.login(credentials).await?;
        let user = session.user.clone();
        self.session.set(session);
        info!(user_id = %user.id, "user_signed_in");
        Ok(user)
    }

    /// End the session remotely. The local session is dropped first, so the
    /// client is signed out even when the remote call fails.
    pub async fn sign_out(&self) -> Result<(), NotesError> {
        let session = self.session.clear().ok_or(NotesError::NotSignedIn)?;
        info!(user_id = %session.user.id, "user_signed_out");
        self.source.logout(&session.token).await?;
        Ok(())
    }

    pub async fn current_user(&self) -> Result<User, NotesError> {
        let token = self.session.token()?;
        match self.source.current_user(&token).await.map_err(NotesError::from) {
            Err(NotesError::Unauthorized) => {
                debug!("stale_session_cleared");
                self.session.clear();
                Err(NotesError::Unauthorized)
            }
            other => other,
        }
    }
}

pub struct NoteRepository {
    source: NoteDataSource,
    session: Arc<SessionStore>,
}

impl NoteRepository {
    pub fn new(source: NoteDataSource, session: Arc<SessionStore>) -> Self {
        Self { source, session }
    }

    pub fn events(&self) -> &EventBus<DomainEvent> {
        self.source.events()
    }

    pub fn source(&self) -> &NoteDataSource {
        &self.source
    }

    pub async fn create(&self, note: &NewNote) -> Result<Note, NotesError> {
        let token = self.session.token()?;
        Ok(self.source.create(&token, note).await?)
    }

    pub async fn list(&self) -> Result<Vec<Note>, NotesError> {
        let token = self.session.token()?;
        Ok(self.source.list(&token).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Note, NotesError> {
        let token = self.session.token()?;
        Ok(self.source.get(&token, id).await?)
    }

    pub async fn update(&self, id: Uuid, update: &NoteUpdate) -> Result<Note, NotesError> {
        let token = self.session.token()?;
        Ok(self.source.update(&token, id, update).await?)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), NotesError> {
        let token = self.session.token()?;
        Ok(self.source.delete(&token, id).await?)
    }
}

pub struct TaskRepository {
    source: TaskDataSource,
    session: Arc<SessionStore>,
}

impl TaskRepository {
    pub fn new(source: TaskDataSource, session: Arc<SessionStore>) -> Self {
        Self { source, session }
    }

    pub fn events(&self) -> &EventBus<DomainEvent> {
        self.source.events()
    }

    pub fn source(&self) -> &TaskDataSource {
        &self.source
    }

    pub async fn create(&self, task: &NewTask) -> Result<Task, NotesError> {
        let token = self.session.token()?;
        Ok(self.source.create(&token, task).await?)
    }

    pub async fn list(&self) -> Result<Vec<Task>, NotesError> {
        let token = self.session.token()?;
        Ok(self.source.list(&token).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Task, NotesError> {
        let token = self.session.token()?;
        Ok(self.source.get(&token, id).await?)
    }

    pub async fn update(&self, id: Uuid, update: &TaskUpdate) -> Result<Task, NotesError> {
        let token = self.session.token()?;
        Ok(self.source.update(&token, id, update).await?)
    }

    pub async fn complete(&self, id: Uuid) -> Result<Task, NotesError> {
        self.update(id, &TaskUpdate::completed()).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), NotesError> {
        let token = self.session.token()?;
        Ok(self.source.delete(&token, id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;
    use resilience::{CircuitBreakerConfig, ManualClock, ResilientCall, RetryConfig};

    struct Fixture {
        backend: Arc<InMemoryBackend>,
        users: UserRepository,
        notes: NoteRepository,
    }

    fn fixture() -> Fixture {
        let clock: Arc<dyn resilience::Clock> = Arc::new(ManualClock::new());
        let call = |name: &str| {
            ResilientCall::builder(name)
                .retry(RetryConfig::default())
                .circuit_breaker(CircuitBreakerConfig::default())
                .clock(Arc::clone(&clock))
                .build()
        };
        let backend = Arc::new(InMemoryBackend::new());
        let session = Arc::new(SessionStore::new());
        Fixture {
            users: UserRepository::new(
                UserDataSource::new(backend.clone(), call("users")),
                Arc::clone(&session),
            ),
            notes: NoteRepository::new(
                NoteDataSource::new(backend.clone(), call("notes")),
                session,
            ),
            backend,
        }
    }

    #[tokio::test]
    async fn note_calls_require_sign_in() {
        let fx = fixture();
        let err = fx.notes.list().await.unwrap_err();
        assert_eq!(err, NotesError::NotSignedIn);
        assert_eq!(fx.backend.calls("notes.list"), 0);
    }

    #[tokio::test]
    async fn sign_out_clears_local_session_even_when_remote_rejects() {
        let fx = fixture();
        let reg = Registration::new("ada@example.com", "Ada", "pw-123456");
        fx.users.register(&reg).await.unwrap();
        fx.users.sign_in(&reg.credentials()).await.unwrap();

        fx.backend
            .inject_failures(1, resilience::TransportError::from_status(401, "expired"));
        let err = fx.users.sign_out().await.unwrap_err();

        assert_eq!(err, NotesError::Unauthorized);
        assert!(!fx.users.session().is_signed_in());
    }

    #[tokio::test]
    async fn missing_note_maps_to_not_found() {
        let fx = fixture();
        let reg = Registration::new("ada@example.com", "Ada", "pw-123456");
        fx.users.register(&reg).await.unwrap();
        fx.users.sign_in(&reg.credentials()).await.unwrap();

        let err = fx.notes.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, NotesError::NotFound { .. }));
    }
}
