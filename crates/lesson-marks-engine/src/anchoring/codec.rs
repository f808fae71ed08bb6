use serde::{Deserialize, Serialize};

use super::StructuralPath;
use crate::dom::{DocTree, NodeId};

/// A point inside the tree: character offset for text leaves, child offset
/// for elements (DOM range semantics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Boundary {
    pub node: NodeId,
    pub offset: usize,
}

impl Boundary {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }

    /// Character position of this point within the whole document's text
    pub fn text_position(&self, tree: &DocTree) -> Option<usize> {
        tree.text_position(self.node, self.offset)
    }
}

/// A resolved span over the live tree, only meaningful for the tree it was
/// resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextSpan {
    pub start: Boundary,
    pub end: Boundary,
}

impl TextSpan {
    pub fn new(start: Boundary, end: Boundary) -> Self {
        Self { start, end }
    }

    /// Span covering `from..to` characters of a single text leaf
    pub fn within(node: NodeId, from: usize, to: usize) -> Self {
        Self::new(Boundary::new(node, from), Boundary::new(node, to))
    }

    /// Start and end character positions, if both boundaries are valid and
    /// in document order.
    pub fn text_range(&self, tree: &DocTree) -> Option<std::ops::Range<usize>> {
        let start = self.start.text_position(tree)?;
        let end = self.end.text_position(tree)?;
        (start <= end).then_some(start..end)
    }

    pub fn is_valid(&self, tree: &DocTree) -> bool {
        self.text_range(tree).is_some()
    }

    /// Text covered by the span, or `None` for an invalid span
    pub fn text(&self, tree: &DocTree) -> Option<String> {
        let range = self.text_range(tree)?;
        Some(
            tree.text_content(tree.root())
                .chars()
                .skip(range.start)
                .take(range.len())
                .collect(),
        )
    }

    pub fn common_ancestor(&self, tree: &DocTree) -> Option<NodeId> {
        tree.common_ancestor(self.start.node, self.end.node)
    }

    /// Span over characters `range` of `root`'s text content, with both
    /// boundaries placed inside text leaves.
    ///
    /// The start lands at the beginning of the leaf that follows a leaf
    /// boundary and the end at the close of the leaf before it, so a range
    /// matching an existing wrapper's text resolves to leaves inside it.
    /// `None` for an empty or out-of-bounds range.
    pub fn from_text_range(
        tree: &DocTree,
        root: NodeId,
        range: std::ops::Range<usize>,
    ) -> Option<Self> {
        if range.is_empty() {
            return None;
        }
        let mut start = None;
        let mut chars_seen = 0;
        for leaf in tree.text_leaves(root) {
            let len = tree.text(leaf).map_or(0, |text| text.chars().count());
            let leaf_end = chars_seen + len;
            if start.is_none() && chars_seen <= range.start && range.start < leaf_end {
                start = Some(Boundary::new(leaf, range.start - chars_seen));
            }
            if let Some(start) = start
                && chars_seen < range.end
                && range.end <= leaf_end
            {
                return Some(Self::new(start, Boundary::new(leaf, range.end - chars_seen)));
            }
            chars_seen = leaf_end;
        }
        None
    }
}

/// Portable form of a span: two structural paths and their offsets
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnchorShape {
    pub start_path: StructuralPath,
    pub start_offset: usize,
    pub end_path: StructuralPath,
    pub end_offset: usize,
}

/// Encode a live span. `None` when either boundary node is detached.
pub fn encode(tree: &DocTree, span: &TextSpan) -> Option<AnchorShape> {
    Some(AnchorShape {
        start_path: StructuralPath::of_node(tree, span.start.node)?,
        start_offset: span.start.offset,
        end_path: StructuralPath::of_node(tree, span.end.node)?,
        end_offset: span.end.offset,
    })
}

/// Resolve an anchor against the current tree.
///
/// Returns `None` (an unresolved anchor) when a path segment no longer
/// matches, an offset no longer fits its node, or the boundaries come out of
/// order. Never panics on a changed tree.
pub fn decode(tree: &DocTree, shape: &AnchorShape) -> Option<TextSpan> {
    let start = shape.start_path.resolve(tree)?;
    let end = shape.end_path.resolve(tree)?;
    let span = TextSpan::new(
        Boundary::new(start, shape.start_offset),
        Boundary::new(end, shape.end_offset),
    );
    span.is_valid(tree).then_some(span)
}
