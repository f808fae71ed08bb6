use std::time::Instant;

use crate::anchoring::{self, TextSpan};
use crate::document::Document;
use crate::dom::NodeId;
use crate::events::{EventBus, LessonEvent, SubscriptionId};
use crate::highlight::{self, HighlightError};
use crate::merge::{self, MergeError, MergeOutcome};
use crate::models::{Anchor, AnchorSlot, HighlightColor, Note, NoteId, NoteScope};
use crate::persistence::NoteRepository;
use crate::restore::{RestorationScheduler, RestoreSettings, TickOutcome};
use crate::store::{NoteStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error(transparent)]
    Highlight(#[from] HighlightError),
    #[error("Selection is empty")]
    EmptySelection,
    #[error("Selection cannot be anchored in this lesson")]
    Unanchorable,
}

/// A note started outside the lesson view, such as from a context menu
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalDraft {
    /// Selected text
    pub text: String,
    /// Live span of the selection, when it is still known
    pub span: Option<TextSpan>,
}

/// Everything one reader needs while a lesson is open: the rendered document,
/// the note list, restoration timing and the event bus the host listens on.
#[derive(Debug)]
pub struct LessonSession<R> {
    scope: NoteScope,
    document: Document,
    store: NoteStore<R>,
    scheduler: RestorationScheduler,
    events: EventBus,
}

impl<R: NoteRepository> LessonSession<R> {
    /// Create a session without touching the backend yet, so the host can
    /// subscribe before the first notification.
    pub fn new(repository: R, scope: NoteScope, document: Document, settings: RestoreSettings) -> Self {
        let events = EventBus::new();
        Self {
            scope,
            document,
            store: NoteStore::new(repository, events.clone()),
            scheduler: RestorationScheduler::new(settings),
            events,
        }
    }

    /// Load the notes and schedule the restoration pass
    pub fn open(&mut self, now: Instant) -> Result<(), SessionError> {
        self.store.load(self.scope.clone())?;
        self.document.reset();
        self.scheduler.mount(now);
        Ok(())
    }

    /// Swap in a fresh render of the lesson; highlights are restored again
    /// after the settle delay.
    pub fn rerender(&mut self, document: Document, now: Instant) {
        self.document = document;
        self.scheduler.mount(now);
    }

    pub fn close(&mut self) {
        self.scheduler.unmount();
    }

    /// Advance timers; call from the host's event loop
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        let outcome = self
            .scheduler
            .tick(now, &mut self.document, self.store.notes());
        if let Some(report) = &outcome.pass {
            self.events.publish(LessonEvent::Restored(report.clone()));
        }
        if let Some((note_id, marker)) = &outcome.focused {
            self.events.publish(LessonEvent::HighlightFocused {
                note_id: note_id.clone(),
                marker: *marker,
            });
        }
        outcome
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Call `listener` with the full list whenever it changes
    pub fn on_notes_change(&self, listener: impl Fn(&[Note]) + 'static) -> SubscriptionId {
        self.events.subscribe(move |event| {
            if let LessonEvent::NotesChanged(notes) = event {
                listener(notes);
            }
        })
    }

    pub fn scope(&self) -> &NoteScope {
        &self.scope
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn notes(&self) -> &[Note] {
        self.store.notes()
    }

    pub fn note(&self, id: &NoteId) -> Option<&Note> {
        self.store.get(id)
    }

    pub fn store(&self) -> &NoteStore<R> {
        &self.store
    }

    /// Highlight a live selection and attach a new note to it
    pub fn create_highlight(
        &mut self,
        span: &TextSpan,
        color: HighlightColor,
        content: impl Into<String>,
    ) -> Result<Note, SessionError> {
        let text = span
            .text(self.document.live())
            .ok_or(SessionError::Unanchorable)?;
        if text.trim().is_empty() {
            return Err(SessionError::EmptySelection);
        }
        let shape = self
            .document
            .encode_selection(span)
            .ok_or(SessionError::Unanchorable)?;

        let note = self
            .store
            .create_highlight(Anchor::new(shape, color, text), content)?;

        let mut live_span = *span;
        highlight::apply(
            self.document.live_mut(),
            &mut live_span,
            &note.id,
            color,
            AnchorSlot::Primary,
        )?;
        Ok(note)
    }

    pub fn create_plain_note(&mut self, content: impl Into<String>) -> Result<Note, SessionError> {
        Ok(self.store.create_plain(content)?)
    }

    /// Turn a draft started elsewhere into a note: a highlight when its span
    /// is known, otherwise a plain note seeded with the selected text.
    pub fn accept_external_draft(
        &mut self,
        draft: ExternalDraft,
        color: HighlightColor,
    ) -> Result<Note, SessionError> {
        match draft.span {
            Some(span) => self.create_highlight(&span, color, ""),
            None => self.create_plain_note(draft.text),
        }
    }

    pub fn edit_content(&mut self, id: &NoteId, content: impl Into<String>) -> Result<(), SessionError> {
        Ok(self.store.set_content(id, content)?)
    }

    /// Recolor the primary highlight and its live marker
    pub fn change_color(&mut self, id: &NoteId, color: HighlightColor) -> Result<(), SessionError> {
        let result = self.store.set_color(id, color);
        if applied_locally(&result) {
            highlight::recolor(self.document.live_mut(), id, color);
        }
        Ok(result?)
    }

    /// Drop the primary highlight; the note, its content and merged-in
    /// highlights stay.
    pub fn remove_highlight(&mut self, id: &NoteId) -> Result<(), SessionError> {
        let result = self.store.clear_highlight(id);
        if applied_locally(&result) {
            highlight::remove_slot(self.document.live_mut(), id, AnchorSlot::Primary);
        }
        Ok(result?)
    }

    /// Delete a note and every marker it owns
    pub fn delete_note(&mut self, id: &NoteId) -> Result<Note, SessionError> {
        let result = self.store.delete(id);
        if !matches!(result, Err(StoreError::NotFound(_))) {
            highlight::remove(self.document.live_mut(), id);
        }
        Ok(result?)
    }

    pub fn merge(&mut self, source: &NoteId, target: &NoteId) -> Result<MergeOutcome, SessionError> {
        Ok(merge::merge_notes(
            &mut self.store,
            self.document.live_mut(),
            source,
            target,
        )?)
    }

    /// Scroll to and flash the note's highlight on the next ticks
    pub fn focus(&mut self, id: NoteId, now: Instant) {
        self.scheduler.request_focus(id, now);
    }

    /// The note whose marker encloses a clicked node
    pub fn note_at(&self, node: NodeId) -> Option<&Note> {
        let id = highlight::note_id_at(self.document.live(), node)?;
        self.store.get(&id)
    }

    /// First live span with the given text
    pub fn locate(&self, text: &str) -> Option<TextSpan> {
        let tree = self.document.live();
        anchoring::locate(tree, tree.root(), text)
    }
}

/// Whether a store mutation changed the local list, successfully persisted
/// or not
fn applied_locally<T>(result: &Result<T, StoreError>) -> bool {
    !matches!(
        result,
        Err(StoreError::NotFound(_) | StoreError::NoHighlight(_) | StoreError::NotLoaded)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{MemoryRepository, Operation};
    use crate::tests::sample_scope;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    const LESSON: &str = "# Vectors\n\nA vector has *magnitude* and direction.\n\nScalars only have magnitude.";

    fn session() -> (LessonSession<MemoryRepository>, MemoryRepository, Instant) {
        let repository = MemoryRepository::new();
        let mut session = LessonSession::new(
            repository.clone(),
            sample_scope(),
            Document::from_markdown(LESSON),
            RestoreSettings::default(),
        );
        let now = Instant::now();
        session.open(now).unwrap();
        (session, repository, now)
    }

    #[test]
    fn test_create_highlight_persists_and_marks() {
        let (mut session, repository, _) = session();
        let span = session.locate("magnitude and direction").unwrap();

        let note = session
            .create_highlight(&span, HighlightColor::Blue, "both parts")
            .unwrap();

        let stored = repository.get(&note.id).unwrap();
        assert_eq!(
            stored.primary_anchor().unwrap().source_text,
            "magnitude and direction"
        );
        assert_eq!(highlight::markers_for(session.document().live(), &note.id).len(), 1);
        let inside = session.locate("direction").unwrap();
        assert_eq!(session.note_at(inside.start.node).map(|n| &n.id), Some(&note.id));
    }

    #[test]
    fn test_whitespace_selection_is_rejected() {
        let (mut session, repository, _) = session();
        let tree = session.document().live();
        let leaf = tree.text_leaves(tree.root())[1];
        let span = TextSpan::within(leaf, 1, 2);

        let result = session.create_highlight(&span, HighlightColor::Yellow, "");

        assert!(matches!(result, Err(SessionError::EmptySelection)));
        assert!(repository.rows().is_empty());
    }

    #[test]
    fn test_notes_change_listener_sees_every_mutation() {
        let (mut session, _, _) = session();
        let sizes = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&sizes);
        session.on_notes_change(move |notes| sink.borrow_mut().push(notes.len()));

        let note = session.create_plain_note("first").unwrap();
        session.edit_content(&note.id, "edited").unwrap();
        session.delete_note(&note.id).unwrap();

        assert_eq!(*sizes.borrow(), vec![1, 1, 0]);
    }

    #[test]
    fn test_external_draft_without_span_becomes_plain_note() {
        let (mut session, _, _) = session();

        let note = session
            .accept_external_draft(
                ExternalDraft {
                    text: "Scalars".to_string(),
                    span: None,
                },
                HighlightColor::Yellow,
            )
            .unwrap();

        assert!(!note.has_highlight());
        assert_eq!(note.content, "Scalars");
    }

    #[test]
    fn test_change_color_updates_marker_even_when_save_fails() {
        let (mut session, repository, _) = session();
        let span = session.locate("direction").unwrap();
        let note = session.create_highlight(&span, HighlightColor::Yellow, "").unwrap();
        repository.set_failing(Operation::Update, true);

        let result = session.change_color(&note.id, HighlightColor::Green);

        assert!(matches!(result, Err(SessionError::Store(StoreError::Persistence { .. }))));
        let marker = highlight::markers_for(session.document().live(), &note.id)[0];
        assert_eq!(
            session.document().live().attr(marker, "class"),
            Some("highlight-green")
        );
    }

    #[test]
    fn test_reopen_restores_highlights_after_settle_delay() {
        let (mut session, repository, now) = session();
        let span = session.locate("Scalars").unwrap();
        let note = session.create_highlight(&span, HighlightColor::Pink, "").unwrap();
        session.close();

        let mut reopened = LessonSession::new(
            repository,
            sample_scope(),
            Document::from_markdown(LESSON),
            RestoreSettings::default(),
        );
        let restored = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&restored);
        reopened.events().subscribe(move |event| {
            if let LessonEvent::Restored(report) = event {
                *sink.borrow_mut() = Some(report.applied);
            }
        });
        reopened.open(now).unwrap();
        assert_eq!(reopened.next_deadline(), Some(now + Duration::from_millis(500)));

        reopened.tick(now + Duration::from_millis(500));

        assert_eq!(*restored.borrow(), Some(1));
        assert_eq!(highlight::markers_for(reopened.document().live(), &note.id).len(), 1);
    }

    #[test]
    fn test_focus_publishes_focused_marker() {
        let (mut session, _, now) = session();
        let span = session.locate("Scalars").unwrap();
        let note = session.create_highlight(&span, HighlightColor::Pink, "").unwrap();
        let focused = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&focused);
        session.events().subscribe(move |event| {
            if let LessonEvent::HighlightFocused { note_id, .. } = event {
                sink.borrow_mut().push(note_id.clone());
            }
        });

        session.focus(note.id.clone(), now);
        session.tick(now);

        assert_eq!(*focused.borrow(), vec![note.id]);
    }

    #[test]
    fn test_focus_survives_rerender() {
        let (mut session, _, now) = session();
        let span = session.locate("Scalars").unwrap();
        let note = session.create_highlight(&span, HighlightColor::Pink, "").unwrap();

        session.focus(note.id.clone(), now);
        session.rerender(Document::from_markdown(LESSON), now + Duration::from_millis(10));
        let outcome = session.tick(now + Duration::from_millis(120));

        let (note_id, marker) = outcome.focused.unwrap();
        assert_eq!(note_id, note.id);
        assert_eq!(session.document().live().text_content(marker), "Scalars");
    }
}
