use super::TextSpan;
use crate::dom::{DocTree, NodeId};

/// Find the first span under `search_root` whose text equals `source_text`.
///
/// Scans the concatenated text of every leaf in document order. When the text
/// occurs more than once the first occurrence wins, wherever the original
/// highlight was; callers cannot tell the difference. Returns `None` for an
/// empty needle or when the text is absent.
pub fn locate(tree: &DocTree, search_root: NodeId, source_text: &str) -> Option<TextSpan> {
    if source_text.is_empty() {
        return None;
    }

    let haystack = tree.text_content(search_root);
    let byte_index = haystack.find(source_text)?;
    let start = haystack[..byte_index].chars().count();
    let end = start + source_text.chars().count();

    TextSpan::from_text_range(tree, search_root, start..end)
}
