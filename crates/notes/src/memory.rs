//! In-process implementation of the remote APIs.
//!
//! Behaves like the real service for status codes (401 on an unknown token,
//! 404 on a missing or foreign record, 409 on a duplicate email) and lets
//! callers inject transport failures to exercise retry and breaker paths.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use resilience::TransportError;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tracing::trace;
use uuid::Uuid;

use crate::api::{ApiResult, NoteApi, TaskApi, UserApi};
use crate::model::{
    Credentials, NewNote, NewTask, Note, NoteUpdate, Registration, Session, Task, TaskUpdate,
    User,
};

#[derive(Debug)]
struct Account {
    user: User,
    password: String,
}

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    accounts: DashMap<String, Account>,
    sessions: DashMap<String, User>,
    notes: DashMap<Uuid, Note>,
    tasks: DashMap<Uuid, Task>,
    faults: Mutex<VecDeque<TransportError>>,
    calls: DashMap<&'static str, u32>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls, to any method, fail with `error`.
    pub fn inject_failures(&self, count: usize, error: TransportError) {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        faults.extend(std::iter::repeat(error).take(count));
    }

    pub fn clear_failures(&self) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// How many times `method` (e.g. `"notes.create"`) was invoked, failed
    /// calls included.
    pub fn calls(&self, method: &str) -> u32 {
        self.calls.get(method).map_or(0, |count| *count)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.iter().map(|entry| *entry.value()).sum()
    }

    fn enter(&self, method: &'static str) -> ApiResult<()> {
        *self.calls.entry(method).or_insert(0) += 1;
        let fault = self
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match fault {
            Some(error) => {
                trace!(method, error = %error, "injected_failure");
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn authorize(&self, token: &str) -> ApiResult<User> {
        self.sessions
            .get(token)
            .map(|user| user.clone())
            .ok_or_else(|| TransportError::from_status(401, "invalid or expired token"))
    }

    fn owned_note(&self, owner: Uuid, id: Uuid) -> ApiResult<Note> {
        self.notes
            .get(&id)
            .filter(|note| note.owner == owner)
            .map(|note| note.clone())
            .ok_or_else(|| TransportError::from_status(404, format!("note {id} not found")))
    }

    fn owned_task(&self, owner: Uuid, id: Uuid) -> ApiResult<Task> {
        self.tasks
            .get(&id)
            .filter(|task| task.owner == owner)
            .map(|task| task.clone())
            .ok_or_else(|| TransportError::from_status(404, format!("task {id} not found")))
    }
}

fn require_title(title: &str) -> ApiResult<()> {
    if title.trim().is_empty() {
        return Err(TransportError::from_status(400, "title must not be blank"));
    }
    Ok(())
}

#[async_trait]
impl UserApi for InMemoryBackend {
    async fn register(&self, registration: &Registration) -> ApiResult<User> {
        self.enter("users.register")?;
        let email = registration.email.to_lowercase();
        match self.accounts.entry(email.clone()) {
            Entry::Occupied(_) => Err(TransportError::from_status(
                409,
                format!("{email} is already registered"),
            )),
            Entry::Vacant(slot) => {
                let user = User {
                    id: Uuid::new_v4(),
                    email,
                    display_name: registration.display_name.clone(),
                    created_at: Utc::now(),
                };
                slot.insert(Account {
                    user: user.clone(),
                    password: registration.password.clone(),
                });
                Ok(user)
            }
        }
    }

    async fn login(&self, credentials: &Credentials) -> ApiResult<Session> {
        self.enter("users.login")?;
        let user = self
            .accounts
            .get(&credentials.email.to_lowercase())
            .filter(|account| account.password == credentials.password)
            .map(|account| account.user.clone())
            .ok_or_else(|| TransportError::from_status(401, "invalid email or password"))?;

        let token = Uuid::new_v4().simple().to_string();
        self.sessions.insert(token.clone(), user.clone());
        Ok(Session { user, token })
    }

    async fn logout(&self, token: &str) -> ApiResult<()> {
        self.enter("users.logout")?;
        self.sessions
            .remove(token)
            .map(|_| ())
            .ok_or_else(|| TransportError::from_status(401, "session already ended"))
    }

    async fn current_user(&self, token: &str) -> ApiResult<User> {
        self.enter("users.current")?;
        self.authorize(token)
    }
}

#[async_trait]
impl NoteApi for InMemoryBackend {
    async fn create_note(&self, token: &str, note: &NewNote) -> ApiResult<Note> {
        self.enter("notes.create")?;
        let owner = self.authorize(token)?;
        require_title(&note.title)?;

        let now = Utc::now();
        let created = Note {
            id: Uuid::new_v4(),
            owner: owner.id,
            title: note.title.clone(),
            body: note.body.clone(),
            created_at: now,
            updated_at: now,
        };
        self.notes.insert(created.id, created.clone());
        Ok(created)
    }

    async fn list_notes(&self, token: &str) -> ApiResult<Vec<Note>> {
        self.enter("notes.list")?;
        let owner = self.authorize(token)?;
        let mut notes: Vec<Note> = self
            .notes
            .iter()
            .filter(|note| note.owner == owner.id)
            .map(|note| note.clone())
            .collect();
        notes.sort_by_key(|note| note.created_at);
        Ok(notes)
    }

    async fn get_note(&self, token: &str, id: Uuid) -> ApiResult<Note> {
        self.enter("notes.get")?;
        let owner = self.authorize(token)?;
        self.owned_note(owner.id, id)
    }

    async fn update_note(&self, token: &str, id: Uuid, update: &NoteUpdate) -> ApiResult<Note> {
        self.enter("notes.update")?;
        let owner = self.authorize(token)?;
        if let Some(title) = &update.title {
            require_title(title)?;
        }

        let mut note = self.owned_note(owner.id, id)?;
        update.apply(&mut note);
        note.updated_at = Utc::now();
        self.notes.insert(id, note.clone());
        Ok(note)
    }

    async fn delete_note(&self, token: &str, id: Uuid) -> ApiResult<()> {
        self.enter("notes.delete")?;
        let owner = self.authorize(token)?;
        self.owned_note(owner.id, id)?;
        self.notes.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl TaskApi for InMemoryBackend {
    async fn create_task(&self, token: &str, task: &NewTask) -> ApiResult<Task> {
        self.enter("tasks.create")?;
        let owner = self.authorize(token)?;
        require_title(&task.title)?;

        let now = Utc::now();
        let created = Task {
            id: Uuid::new_v4(),
            owner: owner.id,
            title: task.title.clone(),
            completed: false,
            due: task.due,
            created_at: now,
            updated_at: now,
        };
        self.tasks.insert(created.id, created.clone());
        Ok(created)
    }

    async fn list_tasks(&self, token: &str) -> ApiResult<Vec<Task>> {
        self.enter("tasks.list")?;
        let owner = self.authorize(token)?;
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|task| task.owner == owner.id)
            .map(|task| task.clone())
            .collect();
        tasks.sort_by_key(|task| task.created_at);
        Ok(tasks)
    }

    async fn get_task(&self, token: &str, id: Uuid) -> ApiResult<Task> {
        self.enter("tasks.get")?;
        let owner = self.authorize(token)?;
        self.owned_task(owner.id, id)
    }

    async fn update_task(&self, token: &str, id: Uuid, update: &TaskUpdate) -> ApiResult<Task> {
        self.enter("tasks.update")?;
        let owner = self.authorize(token)?;
        if let Some(title) = &update.title {
            require_title(title)?;
        }

        let mut task = self.owned_task(owner.id, id)?;
        update.apply(&mut task);
        task.updated_at = Utc::now();
        self.tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn delete_task(&self, token: &str, id: Uuid) -> ApiResult<()> {
        self.enter("tasks.delete")?;
        let owner = self.authorize(token)?;
        self.owned_task(owner.id, id)?;
        self.tasks.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resilience::ErrorKind;

    async fn signed_in(backend: &InMemoryBackend) -> Session {
        backend
            .register(&Registration::new("ada@example.com", "Ada", "pw-123456"))
            .await
            .unwrap();
        backend
            .login(&Credentials::new("ada@example.com", "pw-123456"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let backend = InMemoryBackend::new();
        signed_in(&backend).await;

        let err = backend
            .register(&Registration::new("ADA@example.com", "Ada", "other"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(409));
    }

    #[tokio::test]
    async fn unknown_token_is_unauthorized() {
        let backend = InMemoryBackend::new();
        let err = backend.list_notes("nope").await.unwrap_err();
        assert_eq!(err.status(), Some(401));
    }

    #[tokio::test]
    async fn notes_are_scoped_to_their_owner() {
        let backend = InMemoryBackend::new();
        let ada = signed_in(&backend).await;
        let note = backend
            .create_note(&ada.token, &NewNote::new("groceries", "milk"))
            .await
            .unwrap();

        backend
            .register(&Registration::new("bob@example.com", "Bob", "pw-654321"))
            .await
            .unwrap();
        let bob = backend
            .login(&Credentials::new("bob@example.com", "pw-654321"))
            .await
            .unwrap();

        let err = backend.get_note(&bob.token, note.id).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert!(backend.list_notes(&bob.token).await.unwrap().is_empty());
        assert_eq!(backend.list_notes(&ada.token).await.unwrap(), vec![note]);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let backend = InMemoryBackend::new();
        let ada = signed_in(&backend).await;
        backend.inject_failures(2, TransportError::timeout("slow"));

        for _ in 0..2 {
            let err = backend.list_tasks(&ada.token).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Timeout);
        }
        assert!(backend.list_tasks(&ada.token).await.is_ok());
        assert_eq!(backend.calls("tasks.list"), 3);
    }

    #[tokio::test]
    async fn task_update_and_delete() {
        let backend = InMemoryBackend::new();
        let ada = signed_in(&backend).await;
        let task = backend
            .create_task(&ada.token, &NewTask::new("file taxes"))
            .await
            .unwrap();

        let done = backend
            .update_task(&ada.token, task.id, &TaskUpdate::completed())
            .await
            .unwrap();
        assert!(done.completed);

        backend.delete_task(&ada.token, task.id).await.unwrap();
        let err = backend.delete_task(&ada.token, task.id).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }
}
