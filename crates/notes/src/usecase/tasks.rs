use std::sync::Arc;
use uuid::Uuid;

use super::{BusyPolicy, Execution, Interactor, UseCase};
use crate::error::NotesError;
use crate::model::{NewTask, Task, TaskUpdate};
use crate::repository::TaskRepository;
use crate::validate;

pub struct CreateTask {
    repository: Arc<TaskRepository>,
    interactor: Interactor,
}

impl CreateTask {
    pub fn new(repository: Arc<TaskRepository>, event_capacity: usize) -> Self {
        Self {
            repository,
            interactor: Interactor::for_use_case::<Self>(event_capacity),
        }
    }

    pub async fn execute(&self, task: NewTask) -> Result<Task, NotesError> {
        self.interactor
            .run_for_value(|| async move {
                validate::new_task(&task)?;
                self.repository.create(&task).await
            })
            .await
    }
}

impl UseCase for CreateTask {
    const OPERATION: &'static str = "create_task";
    const BUSY_POLICY: BusyPolicy = BusyPolicy::Reject;

    fn interactor(&self) -> &Interactor {
        &self.interactor
    }
}

pub struct ListTasks {
    repository: Arc<TaskRepository>,
    interactor: Interactor,
}

impl ListTasks {
    pub fn new(repository: Arc<TaskRepository>, event_capacity: usize) -> Self {
        Self {
            repository,
            interactor: Interactor::for_use_case::<Self>(event_capacity),
        }
    }

    pub async fn execute(&self) -> Result<Execution<Vec<Task>>, NotesError> {
        self.interactor.run(|| self.repository.list()).await
    }
}

impl UseCase for ListTasks {
    const OPERATION: &'static str = "list_tasks";
    const BUSY_POLICY: BusyPolicy = BusyPolicy::Ignore;

    fn interactor(&self) -> &Interactor {
        &self.interactor
    }
}

pub struct UpdateTask {
    repository: Arc<TaskRepository>,
    interactor: Interactor,
}

impl UpdateTask {
    pub fn new(repository: Arc<TaskRepository>, event_capacity: usize) -> Self {
        Self {
            repository,
            interactor: Interactor::for_use_case::<Self>(event_capacity),
        }
    }

    pub async fn execute(&self, id: Uuid, update: TaskUpdate) -> Result<Task, NotesError> {
        self.interactor
            .run_for_value(|| async move {
                validate::task_update(&update)?;
                self.repository.update(id, &update).await
            })
            .await
    }
}

impl UseCase for UpdateTask {
    const OPERATION: &'static str = "update_task";
    const BUSY_POLICY: BusyPolicy = BusyPolicy::Reject;

    fn interactor(&self) -> &Interactor {
        &self.interactor
    }
}

/// Marks a task done. Completing twice is harmless, so overlapping calls
/// are ignored.
pub struct CompleteTask {
    repository: Arc<TaskRepository>,
    interactor: Interactor,
}

impl CompleteTask {
    pub fn new(repository: Arc<TaskRepository>, event_capacity: usize) -> Self {
        Self {
            repository,
            interactor: Interactor::for_use_case::<Self>(event_capacity),
        }
    }

    pub async fn execute(&self, id: Uuid) -> Result<Execution<Task>, NotesError> {
        self.interactor.run(|| self.repository.complete(id)).await
    }
}

impl UseCase for CompleteTask {
    const OPERATION: &'static str = "complete_task";
    const BUSY_POLICY: BusyPolicy = BusyPolicy::Ignore;

    fn interactor(&self) -> &Interactor {
        &self.interactor
    }
}

pub struct DeleteTask {
    repository: Arc<TaskRepository>,
    interactor: Interactor,
}

impl DeleteTask {
    pub fn new(repository: Arc<TaskRepository>, event_capacity: usize) -> Self {
        Self {
            repository,
            interactor: Interactor::for_use_case::<Self>(event_capacity),
        }
    }

    pub async fn execute(&self, id: Uuid) -> Result<Execution<()>, NotesError> {
        self.interactor.run(|| self.repository.delete(id)).await
    }
}

impl UseCase for DeleteTask {
    const OPERATION: &'static str = "delete_task";
    const BUSY_POLICY: BusyPolicy = BusyPolicy::Ignore;

    fn interactor(&self) -> &Interactor {
        &self.interactor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::{TaskDataSource, UserDataSource};
    use crate::memory::InMemoryBackend;
    use crate::model::Registration;
    use crate::repository::UserRepository;
    use crate::session::SessionStore;
    use chrono::{TimeZone, Utc};
    use resilience::{ManualClock, ResilientCall, TransportError, DEFAULT_CAPACITY};

    async fn signed_in_repository(backend: &Arc<InMemoryBackend>) -> Arc<TaskRepository> {
        let clock = Arc::new(ManualClock::new());
        let session = Arc::new(SessionStore::new());
        let users = UserRepository::new(
            UserDataSource::new(
                backend.clone(),
                ResilientCall::builder("users").clock(clock.clone()).build(),
            ),
            session.clone(),
        );
        let reg = Registration::new("ada@example.com", "Ada", "pw-123456");
        users.register(&reg).await.unwrap();
        users.sign_in(&reg.credentials()).await.unwrap();

        Arc::new(TaskRepository::new(
            TaskDataSource::new(
                backend.clone(),
                ResilientCall::builder("tasks").clock(clock).build(),
            ),
            session,
        ))
    }

    #[tokio::test]
    async fn task_lifecycle() {
        let backend = Arc::new(InMemoryBackend::new());
        let repo = signed_in_repository(&backend).await;
        let due = Utc.with_ymd_and_hms(2030, 4, 15, 12, 0, 0).unwrap();

        let task = CreateTask::new(repo.clone(), DEFAULT_CAPACITY)
            .execute(NewTask::new("file taxes").due(due))
            .await
            .unwrap();
        assert_eq!(task.due, Some(due));
        assert!(!task.completed);

        let renamed = UpdateTask::new(repo.clone(), DEFAULT_CAPACITY)
            .execute(
                task.id,
                TaskUpdate {
                    title: Some("file taxes (federal)".into()),
                    ..TaskUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.title, "file taxes (federal)");

        let done = CompleteTask::new(repo.clone(), DEFAULT_CAPACITY)
            .execute(task.id)
            .await
            .unwrap()
            .done()
            .unwrap();
        assert!(done.completed);

        let list = ListTasks::new(repo.clone(), DEFAULT_CAPACITY);
        assert_eq!(list.execute().await.unwrap().done().unwrap(), vec![done]);

        DeleteTask::new(repo.clone(), DEFAULT_CAPACITY)
            .execute(task.id)
            .await
            .unwrap();
        assert!(list.execute().await.unwrap().done().unwrap().is_empty());
    }

    #[tokio::test]
    async fn completing_a_missing_task_fails() {
        let backend = Arc::new(InMemoryBackend::new());
        let repo = signed_in_repository(&backend).await;

        let err = CompleteTask::new(repo, DEFAULT_CAPACITY)
            .execute(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, NotesError::NotFound { .. }));
    }

    #[tokio::test]
    async fn transient_failures_stay_off_the_use_case_bus() {
        let backend = Arc::new(InMemoryBackend::new());
        let repo = signed_in_repository(&backend).await;
        let create = CreateTask::new(repo.clone(), DEFAULT_CAPACITY);
        let mut use_case_events = create.events().subscribe();
        let mut repository_events = repo.events().subscribe();

        backend.inject_failures(1, TransportError::timeout("slow"));
        create.execute(NewTask::new("call mom")).await.unwrap();

        let names = |events: Vec<resilience::DomainEvent>| -> Vec<&'static str> {
            events.iter().map(resilience::DomainEvent::name).collect()
        };
        assert_eq!(
            names(use_case_events.drain()),
            vec!["operation_in_progress", "operation_success"]
        );
        assert_eq!(
            names(repository_events.drain()),
            vec![
                "operation_in_progress",
                "retry_attempt",
                "retry_success",
                "operation_success",
            ]
        );
    }
}
