//! Remote service interfaces.
//!
//! Implementations own the wire format and classify every failure into a
//! [`TransportError`] before returning it.

use async_trait::async_trait;
use resilience::TransportError;
use uuid::Uuid;

use crate::model::{
    Credentials, NewNote, NewTask, Note, NoteUpdate, Registration, Session, Task, TaskUpdate,
    User,
};

pub type ApiResult<T> = Result<T, TransportError>;

#[async_trait]
pub trait UserApi: Send + Sync {
    async fn register(&self, registration: &Registration) -> ApiResult<User>;
    async fn login(&self, credentials: &Credentials) -> ApiResult<Session>;
    async fn logout(&self, token: &str) -> ApiResult<()>;
    async fn current_user(&self, token: &str) -> ApiResult<User>;
}

#[async_trait]
pub trait NoteApi: Send + Sync {
    async fn create_note(&self, token: &str, note: &NewNote) -> ApiResult<Note>;
    async fn list_notes(&self, token: &str) -> ApiResult<Vec<Note>>;
    async fn get_note(&self, token: &str, id: Uuid) -> ApiResult<Note>;
    async fn update_note(&self, token: &str, id: Uuid, update: &NoteUpdate) -> ApiResult<Note>;
    async fn delete_note(&self, token: &str, id: Uuid) -> ApiResult<()>;
}

#[async_trait]
pub trait TaskApi: Send + Sync {
    async fn create_task(&self, token: &str, task: &NewTask) -> ApiResult<Task>;
    async fn list_tasks(&self, token: &str) -> ApiResult<Vec<Task>>;
    async fn get_task(&self, token: &str, id: Uuid) -> ApiResult<Task>;
    async fn update_task(&self, token: &str, id: Uuid, update: &TaskUpdate) -> ApiResult<Task>;
    async fn delete_task(&self, token: &str, id: Uuid) -> ApiResult<()>;
}
