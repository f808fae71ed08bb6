use super::{DocTree, NodeData, NodeId};

const VOID_ELEMENTS: &[&str] = &["br", "hr", "img"];

/// Serialize the tree (without the root wrapper) as HTML
pub fn to_html(tree: &DocTree) -> String {
    let mut out = String::new();
    for &child in tree.children(tree.root()) {
        write_node(tree, child, &mut out);
    }
    out
}

fn write_node(tree: &DocTree, id: NodeId, out: &mut String) {
    match tree.data(id) {
        NodeData::Root => {
            for &child in tree.children(id) {
                write_node(tree, child, out);
            }
        }
        NodeData::Text(text) => out.push_str(&html_escape::encode_text(text)),
        NodeData::Element { tag, attrs } => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in attrs {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&html_escape::encode_double_quoted_attribute(value));
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&tag.as_str()) {
                return;
            }
            for &child in tree.children(id) {
                write_node(tree, child, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}
