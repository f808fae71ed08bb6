//! Shared helpers for unit tests.

use crate::anchoring::{self, TextSpan};
use crate::document::Document;
use crate::dom::DocTree;
use crate::models::{Anchor, HighlightColor, NoteScope};

/// First span whose text equals `needle`; panics when absent
pub fn find_span(tree: &DocTree, needle: &str) -> TextSpan {
    anchoring::locate(tree, tree.root(), needle)
        .unwrap_or_else(|| panic!("{needle:?} not found in {:?}", tree.text_content(tree.root())))
}

pub fn sample_scope() -> NoteScope {
    NoteScope::new("user-1", "lesson-1")
}

/// Anchor over the start of the first paragraph
pub fn sample_anchor(text: &str, color: HighlightColor) -> Anchor {
    let path: anchoring::StructuralPath = "/p[1]/text()[1]".parse().unwrap();
    Anchor {
        start_path: path.clone(),
        start_offset: 0,
        end_path: path,
        end_offset: text.chars().count(),
        color,
        source_text: text.to_string(),
    }
}

/// Anchor for the first occurrence of `needle` in the document
pub fn anchor_for(document: &Document, needle: &str, color: HighlightColor) -> Anchor {
    let span = find_span(document.live(), needle);
    let shape = document.encode_selection(&span).unwrap();
    Anchor::new(shape, color, needle)
}
