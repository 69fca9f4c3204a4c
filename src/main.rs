//! Scripted notekeeper session against the in-process backend.
//!
//! Exercises the whole stack once: sign-up, sign-in, note and task CRUD, a
//! transient outage absorbed by retries, and sign-out. Failures are printed
//! the way a front end would show them.

use std::sync::Arc;

use notekeeper::notes::{
    Execution, InMemoryBackend, NewNote, NewTask, NoteUpdate, Registration,
};
use notekeeper::resilience::TransportError;
use notekeeper::{init_logging, AppConfig, FailurePresenter, NotesClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging)?;
    tracing::info!(name = ?config.name, "notekeeper_starting");

    let backend = Arc::new(InMemoryBackend::new());
    let client = NotesClient::new(&config, backend.clone());
    let mut presenter = FailurePresenter::attach(&client);

    let registration = Registration::new("ada@example.com", "Ada Lovelace", "analytical-engine");
    let user = client.register_user().execute(registration.clone()).await?;
    println!("registered {} <{}>", user.display_name, user.email);

    client.sign_in().execute(registration.credentials()).await?;
    println!("signed in");

    // Rejected locally; the presenter prints the reason.
    let _ = client.create_note().execute(NewNote::new("  ", "")).await;
    report(&mut presenter);

    let groceries = client
        .create_note()
        .execute(NewNote::new("groceries", "milk, eggs"))
        .await?;
    client
        .update_note()
        .execute(
            groceries.id,
            NoteUpdate {
                body: Some("milk, eggs, coffee".into()),
                ..NoteUpdate::default()
            },
        )
        .await?;
    client
        .create_note()
        .execute(NewNote::new("ideas", "a notes app that retries"))
        .await?;

    if let Execution::Done(notes) = client.list_notes().execute().await? {
        println!("{} notes:", notes.len());
        for note in notes {
            println!("  - {}: {}", note.title, note.body);
        }
    }

    // One dropped connection; the retry policy absorbs it.
    backend.inject_failures(1, TransportError::connection("connection reset by peer"));
    let task = client
        .create_task()
        .execute(NewTask::new("renew passport"))
        .await?;
    client.complete_task().execute(task.id).await?;

    if let Execution::Done(tasks) = client.list_tasks().execute().await? {
        println!("{} tasks:", tasks.len());
        for task in tasks {
            let mark = if task.completed { "x" } else { " " };
            println!("  [{mark}] {}", task.title);
        }
    }

    client.delete_note().execute(groceries.id).await?;
    client.sign_out().execute().await?;
    let current = client.get_current_user().execute().await?;
    println!(
        "signed out; current user: {}",
        current
            .done()
            .flatten()
            .map_or_else(|| "none".to_string(), |user| user.email)
    );
    report(&mut presenter);

    for (service, snapshot) in client.breakers() {
        tracing::info!(service, state = %snapshot.state, "breaker_status");
    }
    Ok(())
}

fn report(presenter: &mut FailurePresenter) {
    for message in presenter.take_messages() {
        eprintln!("error: {message}");
    }
}
