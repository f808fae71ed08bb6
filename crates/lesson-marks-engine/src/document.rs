use std::ops::Range;

use crate::anchoring::{self, AnchorShape, TextSpan};
use crate::dom::{self, DocTree};

/// A rendered lesson: the tree as the renderer produced it, plus the live
/// copy that highlights are applied to.
///
/// Anchors are always encoded and decoded against the baseline, so an anchor
/// never depends on which other highlights happened to be on screen when it
/// was created. Wrapping content in markers never changes the text, which
/// lets character positions carry a span from one tree to the other.
#[derive(Debug, Clone)]
pub struct Document {
    baseline: DocTree,
    live: DocTree,
}

impl Document {
    pub fn new(tree: DocTree) -> Self {
        Self {
            baseline: tree.clone(),
            live: tree,
        }
    }

    pub fn from_markdown(markdown: &str) -> Self {
        Self::new(dom::render_markdown(markdown))
    }

    pub fn baseline(&self) -> &DocTree {
        &self.baseline
    }

    pub fn live(&self) -> &DocTree {
        &self.live
    }

    pub fn live_mut(&mut self) -> &mut DocTree {
        &mut self.live
    }

    /// Encode a selection made on the live tree
    pub fn encode_selection(&self, span: &TextSpan) -> Option<AnchorShape> {
        let range = span.text_range(&self.live)?;
        let baseline_span = TextSpan::from_text_range(&self.baseline, self.baseline.root(), range)?;
        anchoring::encode(&self.baseline, &baseline_span)
    }

    /// Live span covering the given character range of the lesson text
    pub fn live_span(&self, range: Range<usize>) -> Option<TextSpan> {
        TextSpan::from_text_range(&self.live, self.live.root(), range)
    }

    /// Drop every marker by starting again from the baseline
    pub fn reset(&mut self) {
        self.live = self.baseline.clone();
    }

    pub fn to_html(&self) -> String {
        dom::to_html(&self.live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlight;
    use crate::models::{AnchorSlot, HighlightColor, NoteId};
    use crate::tests::find_span;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_selection_encodes_against_baseline() {
        let mut document = Document::from_markdown("one two three four");
        let mut first = find_span(document.live(), "two");
        highlight::apply(
            document.live_mut(),
            &mut first,
            &NoteId::new("a"),
            HighlightColor::Yellow,
            AnchorSlot::Primary,
        )
        .unwrap();

        let selection = find_span(document.live(), "four");
        let shape = document.encode_selection(&selection).unwrap();

        assert_eq!(shape.start_path.to_string(), "/p[1]/text()[1]");
        assert_eq!((shape.start_offset, shape.end_offset), (14, 18));
    }

    #[test]
    fn test_reset_drops_markers() {
        let mut document = Document::from_markdown("one two");
        let html = document.to_html();
        let mut span = find_span(document.live(), "two");
        highlight::apply(
            document.live_mut(),
            &mut span,
            &NoteId::new("a"),
            HighlightColor::Yellow,
            AnchorSlot::Primary,
        )
        .unwrap();

        document.reset();

        assert_eq!(document.to_html(), html);
    }
}
