use std::sync::Arc;

use super::{BusyPolicy, Execution, Interactor, UseCase};
use crate::error::NotesError;
use crate::model::{Credentials, Registration, User};
use crate::repository::UserRepository;
use crate::validate;

pub struct RegisterUser {
    repository: Arc<UserRepository>,
    interactor: Interactor,
}

impl RegisterUser {
    pub fn new(repository: Arc<UserRepository>, event_capacity: usize) -> Self {
        Self {
            repository,
            interactor: Interactor::for_use_case::<Self>(event_capacity),
        }
    }

    pub async fn execute(&self, registration: Registration) -> Result<User, NotesError> {
        self.interactor
            .run_for_value(|| async move {
                validate::registration(&registration)?;
                self.repository.register(&registration).await
            })
            .await
    }
}

impl UseCase for RegisterUser {
    const OPERATION: &'static str = "register_user";
    const BUSY_POLICY: BusyPolicy = BusyPolicy::Reject;

    fn interactor(&self) -> &Interactor {
        &self.interactor
    }
}

pub struct SignIn {
    repository: Arc<UserRepository>,
    interactor: Interactor,
}

impl SignIn {
    pub fn new(repository: Arc<UserRepository>, event_capacity: usize) -> Self {
        Self {
            repository,
            interactor: Interactor::for_use_case::<Self>(event_capacity),
        }
    }

    pub async fn execute(&self, credentials: Credentials) -> Result<User, NotesError> {
        self.interactor
            .run_for_value(|| async move {
                validate::credentials(&credentials)?;
                self.repository.sign_in(&credentials).await
            })
            .await
    }
}

impl UseCase for SignIn {
    const OPERATION: &'static str = "sign_in";
    const BUSY_POLICY: BusyPolicy = BusyPolicy::Reject;

    fn interactor(&self) -> &Interactor {
        &self.interactor
    }
}

/// Ends the session. Already being signed out counts as success.
pub struct SignOut {
    repository: Arc<UserRepository>,
    interactor: Interactor,
}

impl SignOut {
    pub fn new(repository: Arc<UserRepository>, event_capacity: usize) -> Self {
        Self {
            repository,
            interactor: Interactor::for_use_case::<Self>(event_capacity),
        }
    }

    pub async fn execute(&self) -> Result<Execution<()>, NotesError> {
        self.interactor
            .run(|| async {
                match self.repository.sign_out().await {
                    Err(err) if err.is_gone() => Ok(()),
                    other => other,
                }
            })
            .await
    }
}

impl UseCase for SignOut {
    const OPERATION: &'static str = "sign_out";
    const BUSY_POLICY: BusyPolicy = BusyPolicy::Ignore;

    fn interactor(&self) -> &Interactor {
        &self.interactor
    }
}

/// Looks up the signed-in user. `None` when nobody is signed in or the
/// remote no longer recognizes the session.
pub struct GetCurrentUser {
    repository: Arc<UserRepository>,
    interactor: Interactor,
}

impl GetCurrentUser {
    pub fn new(repository: Arc<UserRepository>, event_capacity: usize) -> Self {
        Self {
            repository,
            interactor: Interactor::for_use_case::<Self>(event_capacity),
        }
    }

    pub async fn execute(&self) -> Result<Execution<Option<User>>, NotesError> {
        self.interactor
            .run(|| async {
                match self.repository.current_user().await {
                    Ok(user) => Ok(Some(user)),
                    Err(err) if err.is_gone() => Ok(None),
                    Err(err) => Err(err),
                }
            })
            .await
    }
}

impl UseCase for GetCurrentUser {
    const OPERATION: &'static str = "get_current_user";
    const BUSY_POLICY: BusyPolicy = BusyPolicy::Ignore;

    fn interactor(&self) -> &Interactor {
        &self.interactor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::UserDataSource;
    use crate::memory::InMemoryBackend;
    use crate::session::SessionStore;
    use resilience::{ManualClock, ResilientCall, TransportError, DEFAULT_CAPACITY};

    fn repository(backend: &Arc<InMemoryBackend>) -> Arc<UserRepository> {
        let call = ResilientCall::builder("users")
            .clock(Arc::new(ManualClock::new()))
            .build();
        Arc::new(UserRepository::new(
            UserDataSource::new(backend.clone(), call),
            Arc::new(SessionStore::new()),
        ))
    }

    #[tokio::test]
    async fn invalid_registration_never_reaches_the_backend() {
        let backend = Arc::new(InMemoryBackend::new());
        let register = RegisterUser::new(repository(&backend), DEFAULT_CAPACITY);

        let err = register
            .execute(Registration::new("ada@example.com", "Ada", "short"))
            .await
            .unwrap_err();

        assert!(matches!(err, NotesError::Validation { field: "password", .. }));
        assert_eq!(backend.total_calls(), 0);
        assert!(!register.is_executing());
    }

    #[tokio::test]
    async fn sign_in_then_current_user() {
        let backend = Arc::new(InMemoryBackend::new());
        let repo = repository(&backend);
        let register = RegisterUser::new(repo.clone(), DEFAULT_CAPACITY);
        let sign_in = SignIn::new(repo.clone(), DEFAULT_CAPACITY);
        let current = GetCurrentUser::new(repo.clone(), DEFAULT_CAPACITY);

        let reg = Registration::new("ada@example.com", "Ada", "pw-123456");
        let registered = register.execute(reg.clone()).await.unwrap();
        let signed_in = sign_in.execute(reg.credentials()).await.unwrap();
        assert_eq!(registered, signed_in);

        let user = current.execute().await.unwrap().done().flatten();
        assert_eq!(user, Some(signed_in));
    }

    #[tokio::test]
    async fn signed_out_states_are_success_shaped() {
        let backend = Arc::new(InMemoryBackend::new());
        let repo = repository(&backend);
        let sign_out = SignOut::new(repo.clone(), DEFAULT_CAPACITY);
        let current = GetCurrentUser::new(repo.clone(), DEFAULT_CAPACITY);
        let mut events = sign_out.events().subscribe();

        assert_eq!(sign_out.execute().await.unwrap(), Execution::Done(()));
        assert_eq!(current.execute().await.unwrap(), Execution::Done(None));
        assert_eq!(
            events.drain().last().map(resilience::DomainEvent::name),
            Some("operation_success")
        );
    }

    #[tokio::test]
    async fn expired_session_reads_as_signed_out() {
        let backend = Arc::new(InMemoryBackend::new());
        let repo = repository(&backend);
        SignIn::new(repo.clone(), DEFAULT_CAPACITY)
            .execute(Credentials::new("ghost@example.com", "whatever"))
            .await
            .unwrap_err();

        let reg = Registration::new("ada@example.com", "Ada", "pw-123456");
        RegisterUser::new(repo.clone(), DEFAULT_CAPACITY)
            .execute(reg.clone())
            .await
            .unwrap();
        SignIn::new(repo.clone(), DEFAULT_CAPACITY)
            .execute(reg.credentials())
            .await
            .unwrap();

        backend.inject_failures(1, TransportError::from_status(401, "expired"));
        let current = GetCurrentUser::new(repo.clone(), DEFAULT_CAPACITY);
        assert_eq!(current.execute().await.unwrap(), Execution::Done(None));
        assert!(!repo.session().is_signed_in());
    }

    #[tokio::test]
    async fn server_errors_are_not_masked_by_sign_out() {
        let backend = Arc::new(InMemoryBackend::new());
        let repo = repository(&backend);
        let reg = Registration::new("ada@example.com", "Ada", "pw-123456");
        RegisterUser::new(repo.clone(), DEFAULT_CAPACITY)
            .execute(reg.clone())
            .await
            .unwrap();
        SignIn::new(repo.clone(), DEFAULT_CAPACITY)
            .execute(reg.credentials())
            .await
            .unwrap();

        backend.inject_failures(1, TransportError::from_status(400, "malformed"));
        let err = SignOut::new(repo.clone(), DEFAULT_CAPACITY)
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, NotesError::Transport(_)));
        assert!(!repo.session().is_signed_in());
    }
}
