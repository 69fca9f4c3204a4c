//! Remote data sources: one [`ResilientCall`] per entity around its API.
//!
//! Each source owns its own circuit breaker, so a failing notes endpoint
//! does not stop sign-in or task calls.

use resilience::{CallError, DomainEvent, EventBus, ResilientCall};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{NoteApi, TaskApi, UserApi};
use crate::model::{
    Credentials, NewNote, NewTask, Note, NoteUpdate, Registration, Session, Task, TaskUpdate,
    User,
};

pub struct UserDataSource {
    api: Arc<dyn UserApi>,
    call: ResilientCall,
}

impl UserDataSource {
    pub fn new(api: Arc<dyn UserApi>, call: ResilientCall) -> Self {
        Self { api, call }
    }

    pub fn events(&self) -> &EventBus<DomainEvent> {
        self.call.events()
    }

    pub fn resilience(&self) -> &ResilientCall {
        &self.call
    }

    pub async fn register(&self, registration: &Registration) -> Result<User, CallError> {
        self.call
            .run("users.register", || self.api.register(registration))
            .await
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<Session, CallError> {
        self.call
            .run("users.login", || self.api.login(credentials))
            .await
    }

    pub async fn logout(&self, token: &str) -> Result<(), CallError> {
        self.call
            .run("users.logout", || self.api.logout(token))
            .await
    }

    pub async fn current_user(&self, token: &str) -> Result<User, CallError> {
        self.call
            .run("users.current", || self.api.current_user(token))
            .await
    }
}

pub struct NoteDataSource {
    api: Arc<dyn NoteApi>,
    call: ResilientCall,
}

impl NoteDataSource {
    pub fn new(api: Arc<dyn NoteApi>, call: ResilientCall) -> Self {
        Self { api, call }
    }

    pub fn events(&self) -> &EventBus<DomainEvent> {
        self.call.events()
    }

    pub fn resilience(&self) -> &ResilientCall {
        &self.call
    }

    pub async fn create(&self, token: &str, note: &NewNote) -> Result<Note, CallError> {
        self.call
            .run("notes.create", || self.api.create_note(token, note))
            .await
    }

    pub async fn list(&self, token: &str) -> Result<Vec<Note>, CallError> {
        self.call
            .run("notes.list", || self.api.list_notes(token))
            .await
    }

    pub async fn get(&self, token: &str, id: Uuid) -> Result<Note, CallError> {
        self.call
            .run("notes.get", || self.api.get_note(token, id))
            .await
    }

    pub async fn update(
        &self,
        token: &str,
        id: Uuid,
        update: &NoteUpdate,
    ) -> Result<Note, CallError> {
        self.call
            .run("notes.update", || self.api.update_note(token, id, update))
            .await
    }

    pub async fn delete(&self, token: &str, id: Uuid) -> Result<(), CallError> {
        self.call
            .run("notes.delete", || self.api.delete_note(token, id))
            .await
    }
}

pub struct TaskDataSource {
    api: Arc<dyn TaskApi>,
    call: ResilientCall,
}

impl TaskDataSource {
    pub fn new(api: Arc<dyn TaskApi>, call: ResilientCall) -> Self {
        Self { api, call }
    }

    pub fn events(&self) -> &EventBus<DomainEvent> {
        self.call.events()
    }

    pub fn resilience(&self) -> &ResilientCall {
        &self.call
    }

    pub async fn create(&self, token: &str, task: &NewTask) -> Result<Task, CallError> {
        self.call
            .run("tasks.create", || self.api.create_task(token, task))
            .await
    }

    pub async fn list(&self, token: &str) -> Result<Vec<Task>, CallError> {
        self.call
            .run("tasks.list", || self.api.list_tasks(token))
            .await
    }

    pub async fn get(&self, token: &str, id: Uuid) -> Result<Task, CallError> {
        self.call
            .run("tasks.get", || self.api.get_task(token, id))
            .await
    }

    pub async fn update(
        &self,
        token: &str,
        id: Uuid,
        update: &TaskUpdate,
    ) -> Result<Task, CallError> {
        self.call
            .run("tasks.update", || self.api.update_task(token, id, update))
            .await
    }

    pub async fn delete(&self, token: &str, id: Uuid) -> Result<(), CallError> {
        self.call
            .run("tasks.delete", || self.api.delete_task(token, id))
            .await
    }
}
