//! Input checks run by use cases before anything reaches the network.

use crate::error::NotesError;
use crate::model::{Credentials, NewNote, NewTask, NoteUpdate, Registration, TaskUpdate};

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_BODY_CHARS: usize = 20_000;
pub const MAX_DISPLAY_NAME_CHARS: usize = 64;
pub const MIN_PASSWORD_CHARS: usize = 8;

pub fn registration(input: &Registration) -> Result<(), NotesError> {
    email(&input.email)?;
    let name = input.display_name.trim();
    if name.is_empty() {
        return Err(NotesError::validation("display name", "must not be blank"));
    }
    if name.chars().count() > MAX_DISPLAY_NAME_CHARS {
        return Err(NotesError::validation(
            "display name",
            format!("must be at most {MAX_DISPLAY_NAME_CHARS} characters"),
        ));
    }
    if input.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(NotesError::validation(
            "password",
            format!("must be at least {MIN_PASSWORD_CHARS} characters"),
        ));
    }
    Ok(())
}

pub fn credentials(input: &Credentials) -> Result<(), NotesError> {
    email(&input.email)?;
    if input.password.is_empty() {
        return Err(NotesError::validation("password", "must not be empty"));
    }
    Ok(())
}

pub fn new_note(input: &NewNote) -> Result<(), NotesError> {
    title(&input.title)?;
    body(&input.body)
}

pub fn note_update(input: &NoteUpdate) -> Result<(), NotesError> {
    if input.is_empty() {
        return Err(NotesError::validation("update", "must change at least one field"));
    }
    if let Some(t) = &input.title {
        title(t)?;
    }
    if let Some(b) = &input.body {
        body(b)?;
    }
    Ok(())
}

pub fn new_task(input: &NewTask) -> Result<(), NotesError> {
    title(&input.title)
}

pub fn task_update(input: &TaskUpdate) -> Result<(), NotesError> {
    if input.is_empty() {
        return Err(NotesError::validation("update", "must change at least one field"));
    }
    if let Some(t) = &input.title {
        title(t)?;
    }
    Ok(())
}

fn email(value: &str) -> Result<(), NotesError> {
    let value = value.trim();
    let valid = value.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty()
            && domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
    });
    if !valid {
        return Err(NotesError::validation("email", "is not a valid address"));
    }
    Ok(())
}

fn title(value: &str) -> Result<(), NotesError> {
    if value.trim().is_empty() {
        return Err(NotesError::validation("title", "must not be blank"));
    }
    if value.chars().count() > MAX_TITLE_CHARS {
        return Err(NotesError::validation(
            "title",
            format!("must be at most {MAX_TITLE_CHARS} characters"),
        ));
    }
    Ok(())
}

fn body(value: &str) -> Result<(), NotesError> {
    if value.chars().count() > MAX_BODY_CHARS {
        return Err(NotesError::validation(
            "body",
            format!("must be at most {MAX_BODY_CHARS} characters"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_rules() {
        assert!(registration(&Registration::new("ada@example.com", "Ada", "long-enough")).is_ok());

        let err = registration(&Registration::new("ada.example.com", "Ada", "long-enough"))
            .unwrap_err();
        assert_eq!(err.to_string(), "email is not a valid address");

        let err = registration(&Registration::new("ada@example.com", "  ", "long-enough"))
            .unwrap_err();
        assert_eq!(err.to_string(), "display name must not be blank");

        let err = registration(&Registration::new("ada@example.com", "Ada", "short")).unwrap_err();
        assert_eq!(err.to_string(), "password must be at least 8 characters");
    }

    #[test]
    fn note_rules() {
        assert!(new_note(&NewNote::new("title", "")).is_ok());
        assert!(new_note(&NewNote::new("", "body")).is_err());
        assert!(new_note(&NewNote::new("x".repeat(MAX_TITLE_CHARS + 1), "")).is_err());
        assert!(note_update(&NoteUpdate::default()).is_err());
        assert!(note_update(&NoteUpdate {
            body: Some("new body".into()),
            ..NoteUpdate::default()
        })
        .is_ok());
    }

    #[test]
    fn task_rules() {
        assert!(new_task(&NewTask::new("pay rent")).is_ok());
        assert!(new_task(&NewTask::new(" ")).is_err());
        assert!(task_update(&TaskUpdate::completed()).is_ok());
        assert!(task_update(&TaskUpdate::default()).is_err());
    }
}
