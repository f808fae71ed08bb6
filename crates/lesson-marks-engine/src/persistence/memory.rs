use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use chrono::Utc;

use super::{NoteRepository, RepositoryError};
use crate::models::{Note, NoteDraft, NoteId, NotePatch, NoteScope};

/// Repository calls that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Load,
    Save,
    Update,
    Delete,
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: Vec<Note>,
    failing: HashSet<Operation>,
}

/// In-process repository. Clones share the same rows, so a test can keep a
/// handle to inspect or break the backend after handing it to a store.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notes(notes: Vec<Note>) -> Self {
        let repository = Self::new();
        repository.state.borrow_mut().rows = notes;
        repository
    }

    /// Make every subsequent call of `operation` fail until reset
    pub fn set_failing(&self, operation: Operation, failing: bool) {
        let mut state = self.state.borrow_mut();
        if failing {
            state.failing.insert(operation);
        } else {
            state.failing.remove(&operation);
        }
    }

    /// Snapshot of every stored row
    pub fn rows(&self) -> Vec<Note> {
        self.state.borrow().rows.clone()
    }

    pub fn get(&self, id: &NoteId) -> Option<Note> {
        self.state.borrow().rows.iter().find(|note| &note.id == id).cloned()
    }

    fn check(&self, operation: Operation) -> Result<(), RepositoryError> {
        if self.state.borrow().failing.contains(&operation) {
            return Err(RepositoryError::Unavailable(format!(
                "{operation:?} rejected by memory backend"
            )));
        }
        Ok(())
    }
}

impl NoteRepository for MemoryRepository {
    fn load_notes(&mut self, scope: &NoteScope) -> Result<Vec<Note>, RepositoryError> {
        self.check(Operation::Load)?;
        let mut notes: Vec<Note> = self
            .state
            .borrow()
            .rows
            .iter()
            .filter(|note| note.user_id == scope.user_id && note.lesson_id == scope.lesson_id)
            .cloned()
            .collect();
        notes.sort_by_key(|note| note.position);
        Ok(notes)
    }

    fn save_note(&mut self, draft: NoteDraft) -> Result<Note, RepositoryError> {
        self.check(Operation::Save)?;
        let note = Note::from_draft(NoteId::generate(), draft, Utc::now());
        self.state.borrow_mut().rows.push(note.clone());
        Ok(note)
    }

    fn update_note(&mut self, id: &NoteId, patch: &NotePatch) -> Result<(), RepositoryError> {
        self.check(Operation::Update)?;
        let mut state = self.state.borrow_mut();
        let note = state
            .rows
            .iter_mut()
            .find(|note| &note.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.clone()))?;
        patch.apply_to(note, Utc::now());
        Ok(())
    }

    fn delete_note(&mut self, id: &NoteId) -> Result<(), RepositoryError> {
        self.check(Operation::Delete)?;
        let mut state = self.state.borrow_mut();
        let before = state.rows.len();
        state.rows.retain(|note| &note.id != id);
        if state.rows.len() == before {
            return Err(RepositoryError::NotFound(id.clone()));
        }
        Ok(())
    }
}
