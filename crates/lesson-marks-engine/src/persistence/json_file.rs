use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use super::{NoteRepository, RepositoryError};
use crate::models::{Note, NoteDraft, NoteId, NotePatch, NoteScope};

/// Every note for every scope, kept as one pretty-printed JSON array.
///
/// The file is re-read on each call so edits made by another process between
/// calls are picked up; the last write wins.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_rows(&self) -> Result<Vec<Note>, RepositoryError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let json = fs::read_to_string(&self.path)?;
        if json.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&json)?)
    }

    fn write_rows(&self, rows: &[Note]) -> Result<(), RepositoryError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(rows)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

impl NoteRepository for JsonFileRepository {
    fn load_notes(&mut self, scope: &NoteScope) -> Result<Vec<Note>, RepositoryError> {
        let mut notes: Vec<Note> = self
            .read_rows()?
            .into_iter()
            .filter(|note| note.user_id == scope.user_id && note.lesson_id == scope.lesson_id)
            .collect();
        notes.sort_by_key(|note| note.position);
        Ok(notes)
    }

    fn save_note(&mut self, draft: NoteDraft) -> Result<Note, RepositoryError> {
        let mut rows = self.read_rows()?;
        let note = Note::from_draft(NoteId::generate(), draft, Utc::now());
        rows.push(note.clone());
        self.write_rows(&rows)?;
        log::debug!("Saved note {} to {}", note.id, self.path.display());
        Ok(note)
    }

    fn update_note(&mut self, id: &NoteId, patch: &NotePatch) -> Result<(), RepositoryError> {
        let mut rows = self.read_rows()?;
        let note = rows
            .iter_mut()
            .find(|note| &note.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.clone()))?;
        patch.apply_to(note, Utc::now());
        self.write_rows(&rows)
    }

    fn delete_note(&mut self, id: &NoteId) -> Result<(), RepositoryError> {
        let mut rows = self.read_rows()?;
        let before = rows.len();
        rows.retain(|note| &note.id != id);
        if rows.len() == before {
            return Err(RepositoryError::NotFound(id.clone()));
        }
        self.write_rows(&rows)
    }
}
