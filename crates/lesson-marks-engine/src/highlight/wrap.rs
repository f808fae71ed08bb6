use crate::anchoring::{Boundary, TextSpan};
use crate::dom::{DocTree, NodeId};

/// A position between two children: inside `parent`, just before `before`
/// (or at the end when `before` is `None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cut {
    parent: NodeId,
    before: Option<NodeId>,
}

/// Move everything covered by `span` into a fresh `tag` element and return it.
///
/// Text leaves are split at the span's offsets and partially covered
/// elements are split up to the common ancestor, so the wrapper ends up as a
/// direct child of that ancestor. No empty halves are produced. The caller
/// has already checked that the span is valid and covers some text.
pub(super) fn wrap_span(tree: &mut DocTree, span: &TextSpan, tag: &str) -> Option<NodeId> {
    // End first: splitting it leaves the head (and the start offset) in place.
    let end = cut_at(tree, span.end)?;
    let start = cut_at(tree, span.start)?;

    let container = tree.common_ancestor(start.parent, end.parent)?;
    let end = lift(tree, end, container)?;
    let start = lift(tree, start, container)?;

    let position = |cut: Cut| match cut.before {
        Some(node) => tree.index_in_parent(node),
        None => Some(tree.children(container).len()),
    };
    let (from, to) = (position(start)?, position(end)?);
    if from >= to {
        return None;
    }

    let moved: Vec<NodeId> = tree.children(container)[from..to].to_vec();
    let wrapper = tree.create_element(tag);
    tree.insert_child(container, from, wrapper);
    for node in moved {
        tree.append_child(wrapper, node);
    }
    Some(wrapper)
}

fn cut_at(tree: &mut DocTree, boundary: Boundary) -> Option<Cut> {
    let node = boundary.node;
    if !tree.is_text(node) {
        return Some(Cut {
            parent: node,
            before: tree.children(node).get(boundary.offset).copied(),
        });
    }

    let parent = tree.parent(node)?;
    let before = if boundary.offset == 0 {
        Some(node)
    } else if boundary.offset >= tree.boundary_len(node) {
        tree.next_sibling(node)
    } else {
        Some(tree.split_text(node, boundary.offset))
    };
    Some(Cut { parent, before })
}

/// Raise a cut until its parent is `container`, splitting elements that the
/// cut passes through mid-way.
fn lift(tree: &mut DocTree, mut cut: Cut, container: NodeId) -> Option<Cut> {
    while cut.parent != container {
        let element = cut.parent;
        let grandparent = tree.parent(element)?;
        cut = match cut.before {
            None => Cut {
                parent: grandparent,
                before: tree.next_sibling(element),
            },
            Some(first) if tree.children(element).first() == Some(&first) => Cut {
                parent: grandparent,
                before: Some(element),
            },
            Some(at) => Cut {
                parent: grandparent,
                before: Some(tree.split_element(element, at)),
            },
        };
    }
    Some(cut)
}
