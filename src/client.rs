//! Wires configuration, remote APIs, data sources and use cases together.

use std::sync::Arc;

use notes::{
    CompleteTask, CreateNote, CreateTask, DeleteNote, DeleteTask, GetCurrentUser, ListNotes,
    ListTasks, NoteApi, NoteDataSource, NoteRepository, RegisterUser, SessionStore, SignIn,
    SignOut, TaskApi, TaskDataSource, TaskRepository, UpdateNote, UpdateTask, UseCase, UserApi,
    UserDataSource, UserRepository,
};
use resilience::{
    CircuitSnapshot, Clock, DomainEvent, EventBus, Listener, ResilientCall, Subscription,
    TokioClock,
};
use tracing::debug;

use crate::config::AppConfig;

/// Every use case of the client, sharing one session.
pub struct NotesClient {
    session: Arc<SessionStore>,
    users: Arc<UserRepository>,
    notes: Arc<NoteRepository>,
    tasks: Arc<TaskRepository>,

    register_user: RegisterUser,
    sign_in: SignIn,
    sign_out: SignOut,
    get_current_user: GetCurrentUser,

    create_note: CreateNote,
    list_notes: ListNotes,
    update_note: UpdateNote,
    delete_note: DeleteNote,

    create_task: CreateTask,
    list_tasks: ListTasks,
    update_task: UpdateTask,
    complete_task: CompleteTask,
    delete_task: DeleteTask,
}

impl NotesClient {
    pub fn new<B>(config: &AppConfig, backend: Arc<B>) -> Self
    where
        B: UserApi + NoteApi + TaskApi + 'static,
    {
        Self::with_clock(config, backend, Arc::new(TokioClock::new()))
    }

    /// Build with an explicit time source for backoff and breaker timers.
    pub fn with_clock<B>(config: &AppConfig, backend: Arc<B>, clock: Arc<dyn Clock>) -> Self
    where
        B: UserApi + NoteApi + TaskApi + 'static,
    {
        let capacity = config.events.buffer_size;
        let resilient = |name: &str| {
            ResilientCall::builder(name)
                .retry(config.retry)
                .circuit_breaker(config.circuit_breaker)
                .clock(Arc::clone(&clock))
                .event_capacity(capacity)
                .build()
        };

        let session = Arc::new(SessionStore::new());
        let users = Arc::new(UserRepository::new(
            UserDataSource::new(backend.clone(), resilient("users")),
            Arc::clone(&session),
        ));
        let notes = Arc::new(NoteRepository::new(
            NoteDataSource::new(backend.clone(), resilient("notes")),
            Arc::clone(&session),
        ));
        let tasks = Arc::new(TaskRepository::new(
            TaskDataSource::new(backend, resilient("tasks")),
            Arc::clone(&session),
        ));
        debug!(
            max_attempts = config.retry.max_attempts,
            failure_threshold = config.circuit_breaker.failure_threshold,
            buffer_size = capacity,
            "notes_client_built"
        );

        Self {
            register_user: RegisterUser::new(users.clone(), capacity),
            sign_in: SignIn::new(users.clone(), capacity),
            sign_out: SignOut::new(users.clone(), capacity),
            get_current_user: GetCurrentUser::new(users.clone(), capacity),
            create_note: CreateNote::new(notes.clone(), capacity),
            list_notes: ListNotes::new(notes.clone(), capacity),
            update_note: UpdateNote::new(notes.clone(), capacity),
            delete_note: DeleteNote::new(notes.clone(), capacity),
            create_task: CreateTask::new(tasks.clone(), capacity),
            list_tasks: ListTasks::new(tasks.clone(), capacity),
            update_task: UpdateTask::new(tasks.clone(), capacity),
            complete_task: CompleteTask::new(tasks.clone(), capacity),
            delete_task: DeleteTask::new(tasks.clone(), capacity),
            session,
            users,
            notes,
            tasks,
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn register_user(&self) -> &RegisterUser {
        &self.register_user
    }

    pub fn sign_in(&self) -> &SignIn {
        &self.sign_in
    }

    pub fn sign_out(&self) -> &SignOut {
        &self.sign_out
    }

    pub fn get_current_user(&self) -> &GetCurrentUser {
        &self.get_current_user
    }

    pub fn create_note(&self) -> &CreateNote {
        &self.create_note
    }

    pub fn list_notes(&self) -> &ListNotes {
        &self.list_notes
    }

    pub fn update_note(&self) -> &UpdateNote {
        &self.update_note
    }

    pub fn delete_note(&self) -> &DeleteNote {
        &self.delete_note
    }

    pub fn create_task(&self) -> &CreateTask {
        &self.create_task
    }

    pub fn list_tasks(&self) -> &ListTasks {
        &self.list_tasks
    }

    pub fn update_task(&self) -> &UpdateTask {
        &self.update_task
    }

    pub fn complete_task(&self) -> &CompleteTask {
        &self.complete_task
    }

    pub fn delete_task(&self) -> &DeleteTask {
        &self.delete_task
    }

    /// Event buses of every use case, in declaration order.
    pub fn use_case_events(&self) -> [&EventBus<DomainEvent>; 13] {
        [
            self.register_user.events(),
            self.sign_in.events(),
            self.sign_out.events(),
            self.get_current_user.events(),
            self.create_note.events(),
            self.list_notes.events(),
            self.update_note.events(),
            self.delete_note.events(),
            self.create_task.events(),
            self.list_tasks.events(),
            self.update_task.events(),
            self.complete_task.events(),
            self.delete_task.events(),
        ]
    }

    /// Event buses of the users, notes and tasks repositories, which carry
    /// the retry detail the use case buses leave out.
    pub fn repository_events(&self) -> [(&'static str, &EventBus<DomainEvent>); 3] {
        [
            ("users", self.users.events()),
            ("notes", self.notes.events()),
            ("tasks", self.tasks.events()),
        ]
    }

    /// Breaker state per remote service.
    pub fn breakers(&self) -> [(&str, CircuitSnapshot); 3] {
        [
            breaker_status(self.users.source().resilience()),
            breaker_status(self.notes.source().resilience()),
            breaker_status(self.tasks.source().resilience()),
        ]
    }

    /// Call `callback(operation, message)` for every use case failure until
    /// the returned listeners are dropped. Outside a tokio runtime the
    /// listeners are inert.
    pub fn on_failure<F>(&self, callback: F) -> Vec<Listener>
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        self.use_case_events()
            .into_iter()
            .map(|bus| {
                let callback = Arc::clone(&callback);
                bus.listen(move |event| {
                    if let DomainEvent::OperationFailure { operation, message } = event {
                        (*callback)(&operation, &message);
                    }
                })
            })
            .collect()
    }
}

fn breaker_status(call: &ResilientCall) -> (&str, CircuitSnapshot) {
    (call.breaker().name(), call.breaker().snapshot())
}

/// Pull-style presenter: collects the failure messages of every use case
/// so a front end can print them between commands.
pub struct FailurePresenter {
    subscriptions: Vec<Subscription<DomainEvent>>,
}

impl FailurePresenter {
    pub fn attach(client: &NotesClient) -> Self {
        Self {
            subscriptions: client
                .use_case_events()
                .into_iter()
                .map(EventBus::subscribe)
                .collect(),
        }
    }

    /// Failure messages published since the last call.
    pub fn take_messages(&mut self) -> Vec<String> {
        self.subscriptions
            .iter_mut()
            .flat_map(Subscription::drain)
            .filter_map(|event| match event {
                DomainEvent::OperationFailure { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }
}
