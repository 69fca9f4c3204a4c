use std::sync::Arc;
use std::time::Duration;

use notekeeper::notes::{
    Execution, InMemoryBackend, NewNote, NewTask, NoteUpdate, NotesError, Registration, UseCase,
};
use notekeeper::resilience::{
    CircuitBreakerConfig, CircuitState, DomainEvent, ManualClock, RetryConfig, TransportError,
};
use notekeeper::{AppConfig, NotesClient};

fn client_with(config: AppConfig) -> (NotesClient, Arc<InMemoryBackend>, ManualClock) {
    let backend = Arc::new(InMemoryBackend::new());
    let clock = ManualClock::new();
    let client = NotesClient::with_clock(&config, backend.clone(), Arc::new(clock.clone()));
    (client, backend, clock)
}

async fn signed_in(client: &NotesClient) {
    let registration = Registration::new("ada@example.com", "Ada Lovelace", "analytical-engine");
    client
        .register_user()
        .execute(registration.clone())
        .await
        .unwrap();
    client
        .sign_in()
        .execute(registration.credentials())
        .await
        .unwrap();
}

#[tokio::test]
async fn notes_and_tasks_lifecycle() {
    let (client, backend, _clock) = client_with(AppConfig::default());
    signed_in(&client).await;
    assert!(client.session().is_signed_in());

    let note = client
        .create_note()
        .execute(NewNote::new("groceries", "milk"))
        .await
        .unwrap();
    let updated = client
        .update_note()
        .execute(
            note.id,
            NoteUpdate {
                body: Some("milk, eggs".into()),
                ..NoteUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.title, "groceries");
    assert_eq!(updated.body, "milk, eggs");

    let task = client
        .create_task()
        .execute(NewTask::new("renew passport"))
        .await
        .unwrap();
    let done = client.complete_task().execute(task.id).await.unwrap();
    assert!(done.done().is_some_and(|task| task.completed));

    client.delete_note().execute(note.id).await.unwrap();
    let notes = client.list_notes().execute().await.unwrap();
    assert!(matches!(notes, Execution::Done(notes) if notes.is_empty()));

    client.sign_out().execute().await.unwrap();
    assert!(!client.session().is_signed_in());
    let current = client.get_current_user().execute().await.unwrap();
    assert_eq!(current, Execution::Done(None));

    assert_eq!(backend.calls("notes.create"), 1);
    assert_eq!(backend.calls("users.logout"), 1);
}

#[tokio::test]
async fn transient_outage_is_absorbed_and_only_visible_below_the_use_case() {
    let (client, backend, clock) = client_with(AppConfig::default());
    signed_in(&client).await;

    let mut use_case_events = client.create_task().events().subscribe();
    let [_, _, (_, task_events)] = client.repository_events();
    let mut repository_events = task_events.subscribe();

    backend.inject_failures(2, TransportError::timeout("upstream slow"));
    let task = client
        .create_task()
        .execute(NewTask::new("water plants"))
        .await
        .unwrap();
    assert_eq!(task.title, "water plants");
    assert_eq!(backend.calls("tasks.create"), 3);
    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );

    let names: Vec<_> = use_case_events.drain().iter().map(DomainEvent::name).collect();
    assert_eq!(names, vec!["operation_in_progress", "operation_success"]);

    let names: Vec<_> = repository_events
        .drain()
        .iter()
        .map(DomainEvent::name)
        .collect();
    assert_eq!(
        names,
        vec![
            "operation_in_progress",
            "retry_attempt",
            "retry_attempt",
            "retry_success",
            "operation_success",
        ]
    );
}

#[tokio::test]
async fn persistent_outage_opens_only_the_affected_breaker() {
    let mut config = AppConfig::default();
    config.retry = RetryConfig::default().with_max_attempts(1);
    config.circuit_breaker = CircuitBreakerConfig::default()
        .with_failure_threshold(2)
        .with_reset_timeout(Duration::from_millis(500))
        .with_half_open_max_attempts(1);
    let (client, backend, clock) = client_with(config);
    signed_in(&client).await;

    backend.inject_failures(2, TransportError::from_status(503, "maintenance"));
    for _ in 0..2 {
        let err = client
            .create_note()
            .execute(NewNote::new("draft", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, NotesError::Transport(_)));
    }

    let err = client
        .create_note()
        .execute(NewNote::new("draft", ""))
        .await
        .unwrap_err();
    assert!(matches!(
        &err,
        NotesError::CircuitOpen { service, .. } if service == "notes"
    ));
    assert_eq!(err.to_string(), "notes is unavailable; try again in 1s");
    assert_eq!(backend.calls("notes.create"), 2);

    let states: Vec<_> = client
        .breakers()
        .iter()
        .map(|(name, snapshot)| (name.to_string(), snapshot.state))
        .collect();
    assert_eq!(
        states,
        vec![
            ("users".to_string(), CircuitState::Closed),
            ("notes".to_string(), CircuitState::Open),
            ("tasks".to_string(), CircuitState::Closed),
        ]
    );

    clock.advance(Duration::from_millis(500));
    let note = client
        .create_note()
        .execute(NewNote::new("draft", ""))
        .await
        .unwrap();
    assert_eq!(note.title, "draft");
    assert_eq!(client.breakers()[1].1.state, CircuitState::Closed);
}

#[tokio::test]
async fn failure_listeners_receive_operation_and_message() {
    let (client, _backend, _clock) = client_with(AppConfig::default());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _listeners = client.on_failure(move |operation, message| {
        let _ = tx.send((operation.to_string(), message.to_string()));
    });

    let err = client
        .create_note()
        .execute(NewNote::new("groceries", ""))
        .await
        .unwrap_err();
    assert_eq!(err, NotesError::NotSignedIn);

    let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        received,
        ("create_note".to_string(), "not signed in".to_string())
    );
}

#[tokio::test]
async fn expired_session_is_dropped_by_get_current_user() {
    let (client, backend, _clock) = client_with(AppConfig::default());
    signed_in(&client).await;

    backend.inject_failures(1, TransportError::from_status(401, "token expired"));
    let current = client.get_current_user().execute().await.unwrap();
    assert_eq!(current, Execution::Done(None));
    assert!(!client.session().is_signed_in());
    assert_eq!(backend.calls("users.current"), 1);
}
