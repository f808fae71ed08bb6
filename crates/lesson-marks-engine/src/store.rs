use std::collections::BTreeSet;

use chrono::Utc;

use crate::events::{EventBus, LessonEvent, Notice};
use crate::models::{Anchor, HighlightColor, Note, NoteDraft, NoteId, NotePatch, NoteScope};
use crate::persistence::{NoteRepository, RepositoryError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No lesson loaded")]
    NotLoaded,
    #[error("Note not found: {0}")]
    NotFound(NoteId),
    #[error("Note {0} has no highlight")]
    NoHighlight(NoteId),
    #[error("Failed to persist changes: {source}")]
    Persistence {
        /// The note whose backing write failed, if it had an id yet
        id: Option<NoteId>,
        #[source]
        source: RepositoryError,
    },
}

/// In-memory list of notes for one (user, lesson) scope, kept in step with a
/// [`NoteRepository`].
///
/// Updates and deletes apply locally and notify before the backing call. A
/// failed backing call is not rolled back: the note's id is remembered in
/// [`NoteStore::pending_reconciliation`] and the next [`NoteStore::load`]
/// replaces the list with what the backend holds.
#[derive(Debug)]
pub struct NoteStore<R> {
    repository: R,
    events: EventBus,
    scope: Option<NoteScope>,
    notes: Vec<Note>,
    pending: BTreeSet<NoteId>,
}

impl<R: NoteRepository> NoteStore<R> {
    pub fn new(repository: R, events: EventBus) -> Self {
        Self {
            repository,
            events,
            scope: None,
            notes: Vec::new(),
            pending: BTreeSet::new(),
        }
    }

    /// Fetch every note for the scope, replacing whatever was held before
    pub fn load(&mut self, scope: NoteScope) -> Result<&[Note], StoreError> {
        let notes = self
            .repository
            .load_notes(&scope)
            .map_err(|source| self.persistence_failure(None, "load notes", source))?;
        log::info!(
            "Loaded {} notes for {}/{}",
            notes.len(),
            scope.user_id,
            scope.lesson_id
        );
        self.scope = Some(scope);
        self.notes = notes;
        self.notes.sort_by_key(|note| note.position);
        self.pending.clear();
        self.notify_changed();
        Ok(&self.notes)
    }

    pub fn scope(&self) -> Option<&NoteScope> {
        self.scope.as_ref()
    }

    /// Notes in display order
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn get(&self, id: &NoteId) -> Option<&Note> {
        self.notes.iter().find(|note| &note.id == id)
    }

    /// 1-based index of the note in display order
    pub fn display_ordinal(&self, id: &NoteId) -> Option<usize> {
        self.notes
            .iter()
            .position(|note| &note.id == id)
            .map(|index| index + 1)
    }

    /// Position for the next note: one past the highest in use
    pub fn next_position(&self) -> u32 {
        self.notes
            .iter()
            .map(|note| note.position.saturating_add(1))
            .max()
            .unwrap_or(0)
    }

    /// Ids whose last backing write failed since the previous load
    pub fn pending_reconciliation(&self) -> &BTreeSet<NoteId> {
        &self.pending
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Persist a new note and add it to the list.
    ///
    /// Unlike the other mutations this waits for the backend, which assigns
    /// the note's id.
    pub fn create(&mut self, draft: NoteDraft) -> Result<Note, StoreError> {
        let note = self
            .repository
            .save_note(draft)
            .map_err(|source| self.persistence_failure(None, "save note", source))?;
        let index = self
            .notes
            .partition_point(|existing| existing.position <= note.position);
        self.notes.insert(index, note.clone());
        self.notify_changed();
        Ok(note)
    }

    /// Create a note anchored to a highlight in the loaded scope
    pub fn create_highlight(
        &mut self,
        anchor: Anchor,
        content: impl Into<String>,
    ) -> Result<Note, StoreError> {
        let scope = self.scope.clone().ok_or(StoreError::NotLoaded)?;
        let draft = NoteDraft::highlight(scope, self.next_position(), anchor, content);
        self.create(draft)
    }

    /// Create a note with no highlight in the loaded scope
    pub fn create_plain(&mut self, content: impl Into<String>) -> Result<Note, StoreError> {
        let scope = self.scope.clone().ok_or(StoreError::NotLoaded)?;
        let draft = NoteDraft::plain(scope, self.next_position(), content);
        self.create(draft)
    }

    pub fn update(&mut self, id: &NoteId, patch: NotePatch) -> Result<(), StoreError> {
        let note = self
            .notes
            .iter_mut()
            .find(|note| &note.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        patch.apply_to(note, Utc::now());
        if patch.position.is_some() {
            self.notes.sort_by_key(|note| note.position);
        }
        self.notify_changed();

        self.repository
            .update_note(id, &patch)
            .map_err(|source| self.persistence_failure(Some(id), "update note", source))
    }

    /// Remove a note, returning it as it was held locally
    pub fn delete(&mut self, id: &NoteId) -> Result<Note, StoreError> {
        let index = self
            .notes
            .iter()
            .position(|note| &note.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let note = self.notes.remove(index);
        self.notify_changed();

        self.repository
            .delete_note(id)
            .map_err(|source| self.persistence_failure(Some(id), "delete note", source))?;
        Ok(note)
    }

    pub fn set_content(&mut self, id: &NoteId, content: impl Into<String>) -> Result<(), StoreError> {
        self.update(id, NotePatch::content(content))
    }

    /// Change the color of the note's primary highlight
    pub fn set_color(&mut self, id: &NoteId, color: HighlightColor) -> Result<(), StoreError> {
        let note = self.get(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let mut anchor = note
            .primary_anchor()
            .cloned()
            .ok_or_else(|| StoreError::NoHighlight(id.clone()))?;
        anchor.color = color;
        self.update(id, NotePatch::primary_anchor(anchor))
    }

    /// Detach the primary highlight, keeping the note and its content
    pub fn clear_highlight(&mut self, id: &NoteId) -> Result<(), StoreError> {
        let note = self.get(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if !note.has_highlight() {
            return Err(StoreError::NoHighlight(id.clone()));
        }
        self.update(id, NotePatch::clear_highlight())
    }

    fn notify_changed(&self) {
        self.events
            .publish(LessonEvent::NotesChanged(self.notes.clone()));
    }

    fn persistence_failure(
        &mut self,
        id: Option<&NoteId>,
        action: &str,
        source: RepositoryError,
    ) -> StoreError {
        log::error!("Failed to {action}: {source}");
        if let Some(id) = id {
            self.pending.insert(id.clone());
        }
        self.events
            .notify(Notice::error(format!("Failed to {action}. Changes may not be saved.")));
        StoreError::Persistence {
            id: id.cloned(),
            source,
        }
    }
}
