use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::HighlightColor;
use crate::anchoring::{AnchorShape, StructuralPath};

/// Identifier assigned to a note by the persistence layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id, for backends that assign their own
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NoteId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// The (user, lesson) pair a set of notes belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteScope {
    pub user_id: String,
    pub lesson_id: String,
}

impl NoteScope {
    pub fn new(user_id: impl Into<String>, lesson_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            lesson_id: lesson_id.into(),
        }
    }
}

/// Persisted description of a highlighted span
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Anchor {
    pub start_path: StructuralPath,
    pub start_offset: usize,
    pub end_path: StructuralPath,
    pub end_offset: usize,
    #[serde(default)]
    pub color: HighlightColor,
    /// Text originally covered; a resilience snapshot, not the source of truth
    #[serde(default)]
    pub source_text: String,
}

impl Anchor {
    pub fn new(shape: AnchorShape, color: HighlightColor, source_text: impl Into<String>) -> Self {
        Self {
            start_path: shape.start_path,
            start_offset: shape.start_offset,
            end_path: shape.end_path,
            end_offset: shape.end_offset,
            color,
            source_text: source_text.into(),
        }
    }

    pub fn shape(&self) -> AnchorShape {
        AnchorShape {
            start_path: self.start_path.clone(),
            start_offset: self.start_offset,
            end_path: self.end_path.clone(),
            end_offset: self.end_offset,
        }
    }
}

/// Which of a note's anchors a marker represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnchorSlot {
    Primary,
    /// Index into `extra_highlights`
    Extra(usize),
}

impl fmt::Display for AnchorSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnchorSlot::Primary => f.write_str("primary"),
            AnchorSlot::Extra(index) => write!(f, "extra-{index}"),
        }
    }
}

impl std::str::FromStr for AnchorSlot {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(AnchorSlot::Primary),
            _ => s
                .strip_prefix("extra-")
                .and_then(|index| index.parse().ok())
                .map(AnchorSlot::Extra)
                .ok_or(()),
        }
    }
}

/// A reader's note, optionally anchored to one or more spans of the lesson.
///
/// `has_highlight` is derived from the primary anchor, so the two can never
/// disagree. Secondary anchors only arrive through merges and survive the
/// removal of the primary highlight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "NoteRow", into = "NoteRow")]
pub struct Note {
    pub id: NoteId,
    pub user_id: String,
    pub lesson_id: String,
    pub title: Option<String>,
    pub content: String,
    pub position: u32,
    primary_anchor: Option<Anchor>,
    pub extra_highlights: Vec<Anchor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Materialize a draft once the backend has assigned an id
    pub fn from_draft(id: NoteId, draft: NoteDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: draft.scope.user_id,
            lesson_id: draft.scope.lesson_id,
            title: draft.title,
            content: draft.content,
            position: draft.position,
            primary_anchor: draft.primary_anchor,
            extra_highlights: draft.extra_highlights,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_highlight(&self) -> bool {
        self.primary_anchor.is_some()
    }

    pub fn primary_anchor(&self) -> Option<&Anchor> {
        self.primary_anchor.as_ref()
    }

    pub fn primary_anchor_mut(&mut self) -> Option<&mut Anchor> {
        self.primary_anchor.as_mut()
    }

    pub fn set_primary_anchor(&mut self, anchor: Option<Anchor>) {
        self.primary_anchor = anchor;
    }

    pub fn scope(&self) -> NoteScope {
        NoteScope::new(self.user_id.clone(), self.lesson_id.clone())
    }

    /// Every anchor the note owns: primary first, then merged-in extras
    pub fn anchors(&self) -> impl Iterator<Item = (AnchorSlot, &Anchor)> {
        self.primary_anchor
            .iter()
            .map(|anchor| (AnchorSlot::Primary, anchor))
            .chain(
                self.extra_highlights
                    .iter()
                    .enumerate()
                    .map(|(index, anchor)| (AnchorSlot::Extra(index), anchor)),
            )
    }

    pub fn anchor(&self, slot: AnchorSlot) -> Option<&Anchor> {
        match slot {
            AnchorSlot::Primary => self.primary_anchor.as_ref(),
            AnchorSlot::Extra(index) => self.extra_highlights.get(index),
        }
    }
}

/// Row shape exchanged with the backing store
#[derive(Debug, Clone, Serialize, Deserialize)]
struct NoteRow {
    id: NoteId,
    user_id: String,
    lesson_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: String,
    position: u32,
    has_highlight: bool,
    #[serde(default)]
    primary_anchor: Option<Anchor>,
    #[serde(default)]
    extra_highlights: Vec<Anchor>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<NoteRow> for Note {
    fn from(row: NoteRow) -> Self {
        let primary_anchor = match (row.has_highlight, row.primary_anchor) {
            (true, Some(anchor)) => Some(anchor),
            (true, None) => {
                log::warn!("Note {} claims a highlight but has no anchor", row.id);
                None
            }
            (false, _) => None,
        };
        Self {
            id: row.id,
            user_id: row.user_id,
            lesson_id: row.lesson_id,
            title: row.title,
            content: row.content,
            position: row.position,
            primary_anchor,
            extra_highlights: row.extra_highlights,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<Note> for NoteRow {
    fn from(note: Note) -> Self {
        Self {
            id: note.id,
            user_id: note.user_id,
            lesson_id: note.lesson_id,
            title: note.title,
            content: note.content,
            position: note.position,
            has_highlight: note.primary_anchor.is_some(),
            primary_anchor: note.primary_anchor,
            extra_highlights: note.extra_highlights,
            created_at: note.created_at,
            updated_at: note.updated_at,
        }
    }
}

/// A note that has not been persisted yet (no id, no timestamps)
#[derive(Debug, Clone, PartialEq)]
pub struct NoteDraft {
    pub scope: NoteScope,
    pub title: Option<String>,
    pub content: String,
    pub position: u32,
    pub primary_anchor: Option<Anchor>,
    pub extra_highlights: Vec<Anchor>,
}

impl NoteDraft {
    /// A note anchored to a freshly selected span
    pub fn highlight(scope: NoteScope, position: u32, anchor: Anchor, content: impl Into<String>) -> Self {
        Self {
            scope,
            title: Some("Highlight".to_string()),
            content: content.into(),
            position,
            primary_anchor: Some(anchor),
            extra_highlights: Vec::new(),
        }
    }

    /// A note with no highlight
    pub fn plain(scope: NoteScope, position: u32, content: impl Into<String>) -> Self {
        Self {
            scope,
            title: Some("Note".to_string()),
            content: content.into(),
            position,
            primary_anchor: None,
            extra_highlights: Vec::new(),
        }
    }
}

/// Partial update; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotePatch {
    pub title: Option<Option<String>>,
    pub content: Option<String>,
    pub position: Option<u32>,
    pub primary_anchor: Option<Option<Anchor>>,
    pub extra_highlights: Option<Vec<Anchor>>,
}

impl NotePatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn primary_anchor(anchor: Anchor) -> Self {
        Self {
            primary_anchor: Some(Some(anchor)),
            ..Self::default()
        }
    }

    pub fn clear_highlight() -> Self {
        Self {
            primary_anchor: Some(None),
            ..Self::default()
        }
    }

    pub fn with_extra_highlights(mut self, anchors: Vec<Anchor>) -> Self {
        self.extra_highlights = Some(anchors);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(&self, note: &mut Note, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            note.title = title.clone();
        }
        if let Some(content) = &self.content {
            note.content = content.clone();
        }
        if let Some(position) = self.position {
            note.position = position;
        }
        if let Some(anchor) = &self.primary_anchor {
            note.primary_anchor = anchor.clone();
        }
        if let Some(extra) = &self.extra_highlights {
            note.extra_highlights = extra.clone();
        }
        note.updated_at = now;
    }
}
