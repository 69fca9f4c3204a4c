//! Notes and tasks domain.
//!
//! Layers, outermost first:
//!
//! ```text
//!   use cases      validate, single-flight, curated lifecycle events
//!       │
//!   repositories   session token, error mapping, event relay
//!       │
//!   data sources   one ResilientCall (retry + circuit breaker) per entity
//!       │
//!   remote APIs    UserApi / NoteApi / TaskApi (InMemoryBackend in-process)
//! ```

pub mod api;
pub mod datasource;
pub mod error;
pub mod memory;
pub mod model;
pub mod repository;
pub mod session;
pub mod usecase;
pub mod validate;

pub use api::{ApiResult, NoteApi, TaskApi, UserApi};
pub use datasource::{NoteDataSource, TaskDataSource, UserDataSource};
pub use error::NotesError;
pub use memory::InMemoryBackend;
pub use model::{
    Credentials, NewNote, NewTask, Note, NoteUpdate, Registration, Session, Task, TaskUpdate,
    User,
};
pub use repository::{NoteRepository, TaskRepository, UserRepository};
pub use session::SessionStore;
pub use usecase::{
    BusyPolicy, CompleteTask, CreateNote, CreateTask, DeleteNote, DeleteTask, Execution,
    ExecutionGuard, GetCurrentUser, Interactor, ListNotes, ListTasks, RegisterUser, SignIn,
    SignOut, UpdateNote, UpdateTask, UseCase,
};
