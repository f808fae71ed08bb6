use crate::dom::DocTree;
use crate::highlight;
use crate::models::{AnchorSlot, Note, NoteId, NotePatch};
use crate::persistence::NoteRepository;
use crate::store::{NoteStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("Cannot merge a note into itself")]
    SameNote,
    #[error("Note not found: {0}")]
    NotFound(NoteId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// The target as held after the merge
    pub target: Note,
    /// Live markers moved from the source to the target
    pub retagged: usize,
}

/// Text placed between the target's content and the merged-in source
pub fn merge_separator(source_ordinal: usize) -> String {
    format!("\n\n--- Note {source_ordinal} ---\n\n")
}

/// Fold `source_id` into `target_id`.
///
/// The target gains the source's anchors after its own extras (primary
/// first, when there is one) and the source's content after a separator
/// naming the source's display ordinal. The target is written before the
/// source is deleted; if that write fails the source is left alone. Markers
/// in `tree` are re-tagged to the target.
pub fn merge_notes<R: NoteRepository>(
    store: &mut NoteStore<R>,
    tree: &mut DocTree,
    source_id: &NoteId,
    target_id: &NoteId,
) -> Result<MergeOutcome, MergeError> {
    if source_id == target_id {
        return Err(MergeError::SameNote);
    }
    let source = store
        .get(source_id)
        .cloned()
        .ok_or_else(|| MergeError::NotFound(source_id.clone()))?;
    let target = store
        .get(target_id)
        .cloned()
        .ok_or_else(|| MergeError::NotFound(target_id.clone()))?;
    let ordinal = store
        .display_ordinal(source_id)
        .ok_or_else(|| MergeError::NotFound(source_id.clone()))?;

    let base = target.extra_highlights.len();
    let shift = usize::from(source.has_highlight());
    let mut extra_highlights = target.extra_highlights.clone();
    extra_highlights.extend(source.anchors().map(|(_, anchor)| anchor.clone()));

    let patch = NotePatch {
        content: Some(format!(
            "{}{}{}",
            target.content,
            merge_separator(ordinal),
            source.content
        )),
        extra_highlights: Some(extra_highlights),
        ..NotePatch::default()
    };
    store.update(target_id, patch)?;

    let retagged = highlight::retag(tree, source_id, target_id, |slot| match slot {
        AnchorSlot::Primary => AnchorSlot::Extra(base),
        AnchorSlot::Extra(index) => AnchorSlot::Extra(base + shift + index),
    });
    log::info!("Merged note {source_id} into {target_id} ({retagged} markers moved)");

    store.delete(source_id)?;

    let target = store
        .get(target_id)
        .cloned()
        .ok_or_else(|| MergeError::NotFound(target_id.clone()))?;
    Ok(MergeOutcome { target, retagged })
}
