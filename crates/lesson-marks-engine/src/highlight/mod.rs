//! Live highlight markers.
//!
//! A marker is a `mark` element wrapping the highlighted content. It carries
//! the owning note's id in `data-note-id`, which anchor of the note it stands
//! for in `data-anchor-slot`, and a color-derived class and inline style.

mod wrap;

use std::ops::Range;

use thiserror::Error;

use crate::anchoring::{Boundary, TextSpan};
use crate::dom::{DocTree, NodeId};
use crate::models::{AnchorSlot, HighlightColor, NoteId};

pub const MARKER_TAG: &str = "mark";
pub const NOTE_ID_ATTR: &str = "data-note-id";
pub const SLOT_ATTR: &str = "data-anchor-slot";

/// Classes added to a marker while it is flashed
pub const FLASH_CLASSES: [&str; 2] = ["ring-2", "ring-indigo-500"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HighlightError {
    #[error("Span does not resolve against the current document")]
    InvalidSpan,
    #[error("Span covers no text")]
    EmptySpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A new marker was inserted
    Applied(NodeId),
    /// The span already sits inside a marker for the same note
    AlreadyApplied(NodeId),
}

impl ApplyOutcome {
    pub fn marker(&self) -> NodeId {
        match self {
            ApplyOutcome::Applied(marker) | ApplyOutcome::AlreadyApplied(marker) => *marker,
        }
    }
}

/// Wrap `span` in a marker for `note_id`. Idempotent.
///
/// When a marker tagged with the same note already encloses the span nothing
/// changes. On success `span` is re-pointed at the marker's contents, so
/// applying it again hits the guard.
pub fn apply(
    tree: &mut DocTree,
    span: &mut TextSpan,
    note_id: &NoteId,
    color: HighlightColor,
    slot: AnchorSlot,
) -> Result<ApplyOutcome, HighlightError> {
    let range = span.text_range(tree).ok_or(HighlightError::InvalidSpan)?;
    let container = span
        .common_ancestor(tree)
        .ok_or(HighlightError::InvalidSpan)?;

    if let Some(existing) = enclosing_marker(tree, container, note_id)
        .or_else(|| covering_marker(tree, &range, note_id))
    {
        log::debug!("Span already highlighted for note {note_id}");
        return Ok(ApplyOutcome::AlreadyApplied(existing));
    }
    if range.is_empty() {
        return Err(HighlightError::EmptySpan);
    }

    let marker = wrap::wrap_span(tree, span, MARKER_TAG).ok_or(HighlightError::EmptySpan)?;
    tree.set_attr(marker, NOTE_ID_ATTR, note_id.as_str());
    tree.set_attr(marker, SLOT_ATTR, slot.to_string());
    paint(tree, marker, color);

    *span = TextSpan::new(
        Boundary::new(marker, 0),
        Boundary::new(marker, tree.children(marker).len()),
    );
    Ok(ApplyOutcome::Applied(marker))
}

/// Unwrap every marker tagged with `note_id`, leaving its content in place.
/// Returns how many markers were removed.
pub fn remove(tree: &mut DocTree, note_id: &NoteId) -> usize {
    unwrap_markers(tree, markers_for(tree, note_id))
}

/// Unwrap only the markers standing for one anchor of the note
pub fn remove_slot(tree: &mut DocTree, note_id: &NoteId, slot: AnchorSlot) -> usize {
    let slot = slot.to_string();
    let markers = markers_for(tree, note_id)
        .into_iter()
        .filter(|&marker| tree.attr(marker, SLOT_ATTR) == Some(slot.as_str()))
        .collect();
    unwrap_markers(tree, markers)
}

/// Live markers tagged with `note_id`, in document order
pub fn markers_for(tree: &DocTree, note_id: &NoteId) -> Vec<NodeId> {
    tree.find_elements(tree.root(), |tag, node| {
        tag == MARKER_TAG && tree.attr(node, NOTE_ID_ATTR) == Some(note_id.as_str())
    })
}

/// Note id of the nearest marker enclosing `node`, for click-through
pub fn note_id_at(tree: &DocTree, node: NodeId) -> Option<NoteId> {
    tree.ancestors(node)
        .filter(|&ancestor| tree.tag(ancestor) == Some(MARKER_TAG))
        .find_map(|marker| tree.attr(marker, NOTE_ID_ATTR))
        .map(NoteId::from)
}

/// Re-tag every marker of `from` as belonging to `to`.
///
/// `slot_for` maps each marker's old slot to its slot under the new owner.
pub fn retag<F>(tree: &mut DocTree, from: &NoteId, to: &NoteId, mut slot_for: F) -> usize
where
    F: FnMut(AnchorSlot) -> AnchorSlot,
{
    let markers = markers_for(tree, from);
    for &marker in &markers {
        tree.set_attr(marker, NOTE_ID_ATTR, to.as_str());
        if let Some(old) = tree
            .attr(marker, SLOT_ATTR)
            .and_then(|slot| slot.parse::<AnchorSlot>().ok())
        {
            tree.set_attr(marker, SLOT_ATTR, slot_for(old).to_string());
        }
    }
    markers.len()
}

/// Repaint the note's primary marker(s)
pub fn recolor(tree: &mut DocTree, note_id: &NoteId, color: HighlightColor) -> usize {
    let primary = AnchorSlot::Primary.to_string();
    let markers: Vec<NodeId> = markers_for(tree, note_id)
        .into_iter()
        .filter(|&marker| tree.attr(marker, SLOT_ATTR) == Some(primary.as_str()))
        .collect();
    for &marker in &markers {
        let flashed = is_flashed(tree, marker);
        paint(tree, marker, color);
        if flashed {
            add_flash(tree, marker);
        }
    }
    markers.len()
}

/// Add the flash ring to the note's markers and return the first one, the
/// one to scroll to
pub fn flash(tree: &mut DocTree, note_id: &NoteId) -> Option<NodeId> {
    let markers = markers_for(tree, note_id);
    for &marker in &markers {
        add_flash(tree, marker);
    }
    markers.first().copied()
}

/// Drop the flash ring from every marker of the note
pub fn unflash(tree: &mut DocTree, note_id: &NoteId) {
    for marker in markers_for(tree, note_id) {
        let classes = tree.attr(marker, "class").unwrap_or_default();
        let kept: Vec<&str> = classes
            .split_whitespace()
            .filter(|class| !FLASH_CLASSES.contains(class))
            .collect();
        let kept = kept.join(" ");
        tree.set_attr(marker, "class", kept);
    }
}

fn is_flashed(tree: &DocTree, marker: NodeId) -> bool {
    tree.attr(marker, "class")
        .is_some_and(|classes| classes.split_whitespace().any(|class| class == FLASH_CLASSES[0]))
}

fn add_flash(tree: &mut DocTree, marker: NodeId) {
    if is_flashed(tree, marker) {
        return;
    }
    let classes = tree.attr(marker, "class").unwrap_or_default();
    let flashed = format!("{classes} {}", FLASH_CLASSES.join(" "));
    tree.set_attr(marker, "class", flashed.trim());
}

fn paint(tree: &mut DocTree, marker: NodeId, color: HighlightColor) {
    tree.set_attr(marker, "class", color.css_class());
    tree.set_attr(marker, "style", color.marker_style());
}

fn enclosing_marker(tree: &DocTree, node: NodeId, note_id: &NoteId) -> Option<NodeId> {
    tree.ancestors(node).find(|&ancestor| {
        tree.tag(ancestor) == Some(MARKER_TAG)
            && tree.attr(ancestor, NOTE_ID_ATTR) == Some(note_id.as_str())
    })
}

/// First marker of the note when every text leaf touched by `range` lies
/// inside one. Wrapping a later span can split a marker in two, so the
/// note's highlight may already be present without one marker enclosing it.
fn covering_marker(tree: &DocTree, range: &Range<usize>, note_id: &NoteId) -> Option<NodeId> {
    if range.is_empty() {
        return None;
    }
    let mut first = None;
    let mut leaf_start = 0;
    for leaf in tree.text_leaves(tree.root()) {
        let len = tree.text(leaf).map_or(0, |text| text.chars().count());
        let leaf_end = leaf_start + len;
        if leaf_start >= range.end {
            break;
        }
        if len > 0 && leaf_end > range.start {
            let marker = enclosing_marker(tree, leaf, note_id)?;
            first.get_or_insert(marker);
        }
        leaf_start = leaf_end;
    }
    first
}

fn unwrap_markers(tree: &mut DocTree, markers: Vec<NodeId>) -> usize {
    // Innermost first, so nested markers unwrap into a still-attached parent
    let mut removed = 0;
    for marker in markers.into_iter().rev() {
        let Some(parent) = tree.parent(marker) else {
            continue;
        };
        tree.unwrap(marker);
        tree.merge_adjacent_text(parent);
        removed += 1;
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchoring::{decode, encode};
    use crate::dom::{render_markdown, to_html};
    use crate::tests::find_span;
    use pretty_assertions::assert_eq;

    fn note(id: &str) -> NoteId {
        NoteId::new(id)
    }

    #[test]
    fn test_apply_writes_marker_attributes() {
        let mut tree = render_markdown("hello world");
        let mut span = find_span(&tree, "hello world");

        let outcome = apply(
            &mut tree,
            &mut span,
            &note("n1"),
            HighlightColor::Green,
            AnchorSlot::Primary,
        )
        .unwrap();

        insta::assert_snapshot!(
            to_html(&tree),
            @r#"<p><mark data-note-id="n1" data-anchor-slot="primary" class="highlight-green" style="background-color: #86efac; padding: 2px 4px; border-radius: 4px; cursor: pointer;">hello world</mark></p>"#
        );
        assert!(matches!(outcome, ApplyOutcome::Applied(_)));
        assert_eq!(span.text(&tree).as_deref(), Some("hello world"));
    }

    #[test]
    fn test_apply_twice_yields_one_marker() {
        let mut tree = render_markdown("some important term here");
        let mut span = find_span(&tree, "important term");
        let id = note("n1");

        let first = apply(&mut tree, &mut span, &id, HighlightColor::Yellow, AnchorSlot::Primary);
        let second = apply(&mut tree, &mut span, &id, HighlightColor::Yellow, AnchorSlot::Primary);

        assert!(matches!(first, Ok(ApplyOutcome::Applied(_))));
        assert_eq!(second.map(|o| o.marker()), first.map(|o| o.marker()));
        assert_eq!(markers_for(&tree, &id).len(), 1);
    }

    #[test]
    fn test_apply_within_existing_marker_of_same_note_is_noop() {
        let mut tree = render_markdown("some important term here");
        let id = note("n1");
        let mut outer = find_span(&tree, "important term");
        apply(&mut tree, &mut outer, &id, HighlightColor::Yellow, AnchorSlot::Primary).unwrap();

        let mut inner = find_span(&tree, "term");
        let outcome = apply(&mut tree, &mut inner, &id, HighlightColor::Blue, AnchorSlot::Extra(0));

        assert!(matches!(outcome, Ok(ApplyOutcome::AlreadyApplied(_))));
        assert_eq!(markers_for(&tree, &id).len(), 1);
    }

    #[test]
    fn test_other_notes_may_nest() {
        let mut tree = render_markdown("some important term here");
        let mut outer = find_span(&tree, "important term");
        apply(&mut tree, &mut outer, &note("a"), HighlightColor::Yellow, AnchorSlot::Primary)
            .unwrap();

        let mut inner = find_span(&tree, "term");
        let outcome = apply(&mut tree, &mut inner, &note("b"), HighlightColor::Pink, AnchorSlot::Primary);

        assert!(matches!(outcome, Ok(ApplyOutcome::Applied(_))));
        assert_eq!(note_id_at(&tree, inner.start.node), Some(note("b")));
    }

    #[test]
    fn test_split_marker_still_counts_as_applied() {
        let mut tree = render_markdown("one two three four five");
        let (wide, narrow) = (note("wide"), note("narrow"));
        let mut wide_span = find_span(&tree, "two three four");
        apply(&mut tree, &mut wide_span, &wide, HighlightColor::Yellow, AnchorSlot::Primary)
            .unwrap();
        let mut narrow_span = find_span(&tree, "four five");
        apply(&mut tree, &mut narrow_span, &narrow, HighlightColor::Blue, AnchorSlot::Primary)
            .unwrap();
        assert_eq!(markers_for(&tree, &wide).len(), 2);

        let mut again = find_span(&tree, "two three four");
        let outcome = apply(&mut tree, &mut again, &wide, HighlightColor::Yellow, AnchorSlot::Primary);

        assert!(matches!(outcome, Ok(ApplyOutcome::AlreadyApplied(_))));
        assert_eq!(markers_for(&tree, &wide).len(), 2);
    }

    #[test]
    fn test_apply_then_remove_restores_structure() {
        let source = "Read the *very important* term twice.";
        let mut tree = render_markdown(source);
        let original_html = to_html(&tree);
        let before = find_span(&tree, "important term");
        let shape = encode(&tree, &before).unwrap();
        let id = note("n1");

        let mut span = before;
        apply(&mut tree, &mut span, &id, HighlightColor::Blue, AnchorSlot::Primary).unwrap();
        assert_eq!(remove(&mut tree, &id), 1);

        assert_eq!(tree.text_content(tree.root()), "Read the very important term twice.");
        assert!(markers_for(&tree, &id).is_empty());
        assert_eq!(
            decode(&tree, &shape).and_then(|span| span.text(&tree)).as_deref(),
            Some("important term")
        );
        // The split emphasis stays split; only the marker goes.
        assert_ne!(to_html(&tree), original_html);
    }

    #[test]
    fn test_apply_then_remove_within_one_leaf_is_lossless() {
        let mut tree = render_markdown("hello brave new world");
        let original_html = to_html(&tree);
        let id = note("n1");
        let mut span = find_span(&tree, "brave new");

        apply(&mut tree, &mut span, &id, HighlightColor::Yellow, AnchorSlot::Primary).unwrap();
        remove(&mut tree, &id);

        assert_eq!(to_html(&tree), original_html);
    }

    #[test]
    fn test_rejects_invalid_and_empty_spans() {
        let mut tree = render_markdown("hello");
        let leaf = tree.text_leaves(tree.root())[0];
        let id = note("n1");

        let mut out_of_range = TextSpan::within(leaf, 0, 99);
        let mut reversed = TextSpan::within(leaf, 4, 1);
        let mut empty = TextSpan::within(leaf, 2, 2);

        for (span, expected) in [
            (&mut out_of_range, HighlightError::InvalidSpan),
            (&mut reversed, HighlightError::InvalidSpan),
            (&mut empty, HighlightError::EmptySpan),
        ] {
            let result = apply(&mut tree, span, &id, HighlightColor::Yellow, AnchorSlot::Primary);
            assert_eq!(result, Err(expected));
        }
        assert_eq!(tree.text(leaf), Some("hello"));
    }

    #[test]
    fn test_remove_slot_keeps_other_anchors() {
        let mut tree = render_markdown("alpha beta gamma");
        let id = note("n1");
        let mut primary = find_span(&tree, "alpha");
        apply(&mut tree, &mut primary, &id, HighlightColor::Yellow, AnchorSlot::Primary).unwrap();
        let mut extra = find_span(&tree, "gamma");
        apply(&mut tree, &mut extra, &id, HighlightColor::Pink, AnchorSlot::Extra(0)).unwrap();

        assert_eq!(remove_slot(&mut tree, &id, AnchorSlot::Primary), 1);

        let left = markers_for(&tree, &id);
        assert_eq!(left.len(), 1);
        assert_eq!(tree.attr(left[0], SLOT_ATTR), Some("extra-0"));
        assert_eq!(tree.text_content(left[0]), "gamma");
    }

    #[test]
    fn test_retag_moves_markers_and_remaps_slots() {
        let mut tree = render_markdown("alpha beta gamma");
        let (source, target) = (note("a"), note("b"));
        let mut span = find_span(&tree, "beta");
        apply(&mut tree, &mut span, &source, HighlightColor::Green, AnchorSlot::Primary).unwrap();

        let count = retag(&mut tree, &source, &target, |slot| match slot {
            AnchorSlot::Primary => AnchorSlot::Extra(2),
            AnchorSlot::Extra(i) => AnchorSlot::Extra(3 + i),
        });

        assert_eq!(count, 1);
        assert!(markers_for(&tree, &source).is_empty());
        let marker = markers_for(&tree, &target)[0];
        assert_eq!(tree.attr(marker, SLOT_ATTR), Some("extra-2"));
        assert_eq!(tree.attr(marker, "class"), Some("highlight-green"));
    }

    #[test]
    fn test_recolor_touches_primary_marker_only() {
        let mut tree = render_markdown("alpha beta gamma");
        let id = note("n1");
        let mut primary = find_span(&tree, "alpha");
        apply(&mut tree, &mut primary, &id, HighlightColor::Yellow, AnchorSlot::Primary).unwrap();
        let mut extra = find_span(&tree, "gamma");
        apply(&mut tree, &mut extra, &id, HighlightColor::Yellow, AnchorSlot::Extra(0)).unwrap();

        assert_eq!(recolor(&mut tree, &id, HighlightColor::Blue), 1);

        let classes: Vec<_> = markers_for(&tree, &id)
            .into_iter()
            .map(|marker| tree.attr(marker, "class").unwrap().to_string())
            .collect();
        assert_eq!(classes, vec!["highlight-blue", "highlight-yellow"]);
    }

    #[test]
    fn test_flash_and_unflash() {
        let mut tree = render_markdown("alpha beta");
        let id = note("n1");
        let mut span = find_span(&tree, "beta");
        apply(&mut tree, &mut span, &id, HighlightColor::Pink, AnchorSlot::Primary).unwrap();

        let marker = flash(&mut tree, &id).unwrap();
        flash(&mut tree, &id);
        assert_eq!(
            tree.attr(marker, "class"),
            Some("highlight-pink ring-2 ring-indigo-500")
        );

        unflash(&mut tree, &id);
        assert_eq!(tree.attr(marker, "class"), Some("highlight-pink"));
        assert_eq!(flash(&mut tree, &note("missing")), None);
    }

    #[test]
    fn test_note_id_at_finds_enclosing_marker() {
        let mut tree = render_markdown("alpha *beta* gamma");
        let id = note("n1");
        let mut span = find_span(&tree, "beta gamma");
        apply(&mut tree, &mut span, &id, HighlightColor::Yellow, AnchorSlot::Primary).unwrap();

        let inside = find_span(&tree, "beta").start.node;
        let outside = find_span(&tree, "alpha").start.node;

        assert_eq!(note_id_at(&tree, inside), Some(id));
        assert_eq!(note_id_at(&tree, outside), None);
    }
}
