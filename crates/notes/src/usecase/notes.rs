use std::sync::Arc;
use uuid::Uuid;

use super::{BusyPolicy, Execution, Interactor, UseCase};
use crate::error::NotesError;
use crate::model::{NewNote, Note, NoteUpdate};
use crate::repository::NoteRepository;
use crate::validate;

pub struct CreateNote {
    repository: Arc<NoteRepository>,
    interactor: Interactor,
}

impl CreateNote {
    pub fn new(repository: Arc<NoteRepository>, event_capacity: usize) -> Self {
        Self {
            repository,
            interactor: Interactor::for_use_case::<Self>(event_capacity),
        }
    }

    pub async fn execute(&self, note: NewNote) -> Result<Note, NotesError> {
        self.interactor
            .run_for_value(|| async move {
                validate::new_note(&note)?;
                self.repository.create(&note).await
            })
            .await
    }
}

impl UseCase for CreateNote {
    const OPERATION: &'static str = "create_note";
    const BUSY_POLICY: BusyPolicy = BusyPolicy::Reject;

    fn interactor(&self) -> &Interactor {
        &self.interactor
    }
}

pub struct ListNotes {
    repository: Arc<NoteRepository>,
    interactor: Interactor,
}

impl ListNotes {
    pub fn new(repository: Arc<NoteRepository>, event_capacity: usize) -> Self {
        Self {
            repository,
            interactor: Interactor::for_use_case::<Self>(event_capacity),
        }
    }

    pub async fn execute(&self) -> Result<Execution<Vec<Note>>, NotesError> {
        self.interactor.run(|| self.repository.list()).await
    }
}

impl UseCase for ListNotes {
    const OPERATION: &'static str = "list_notes";
    const BUSY_POLICY: BusyPolicy = BusyPolicy::Ignore;

    fn interactor(&self) -> &Interactor {
        &self.interactor
    }
}

pub struct UpdateNote {
    repository: Arc<NoteRepository>,
    interactor: Interactor,
}

impl UpdateNote {
    pub fn new(repository: Arc<NoteRepository>, event_capacity: usize) -> Self {
        Self {
            repository,
            interactor: Interactor::for_use_case::<Self>(event_capacity),
        }
    }

    pub async fn execute(&self, id: Uuid, update: NoteUpdate) -> Result<Note, NotesError> {
        self.interactor
            .run_for_value(|| async move {
                validate::note_update(&update)?;
                self.repository.update(id, &update).await
            })
            .await
    }
}

impl UseCase for UpdateNote {
    const OPERATION: &'static str = "update_note";
    const BUSY_POLICY: BusyPolicy = BusyPolicy::Reject;

    fn interactor(&self) -> &Interactor {
        &self.interactor
    }
}

pub struct DeleteNote {
    repository: Arc<NoteRepository>,
    interactor: Interactor,
}

impl DeleteNote {
    pub fn new(repository: Arc<NoteRepository>, event_capacity: usize) -> Self {
        Self {
            repository,
            interactor: Interactor::for_use_case::<Self>(event_capacity),
        }
    }

    pub async fn execute(&self, id: Uuid) -> Result<Execution<()>, NotesError> {
        self.interactor.run(|| self.repository.delete(id)).await
    }
}

impl UseCase for DeleteNote {
    const OPERATION: &'static str = "delete_note";
    const BUSY_POLICY: BusyPolicy = BusyPolicy::Ignore;

    fn interactor(&self) -> &Interactor {
        &self.interactor
    }
}
