//! Backing stores for notes.
//!
//! The engine talks to persistence through [`NoteRepository`]. Two reference
//! implementations ship with it: an in-process one for tests and embedding,
//! and a JSON file used by the command-line host.

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileRepository;
pub use memory::{MemoryRepository, Operation};

use crate::models::{Note, NoteDraft, NoteId, NotePatch, NoteScope};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Note not found: {0}")]
    NotFound(NoteId),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid notes file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// CRUD access to persisted notes
pub trait NoteRepository {
    /// Every note in the scope, ordered by position
    fn load_notes(&mut self, scope: &NoteScope) -> Result<Vec<Note>, RepositoryError>;

    /// Persist a new note; the backend assigns its id and timestamps
    fn save_note(&mut self, draft: NoteDraft) -> Result<Note, RepositoryError>;

    fn update_note(&mut self, id: &NoteId, patch: &NotePatch) -> Result<(), RepositoryError>;

    fn delete_note(&mut self, id: &NoteId) -> Result<(), RepositoryError>;
}
