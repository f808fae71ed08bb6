use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Parser, Tag, TagEnd};

use super::{DocTree, NodeId};

/// Build a document tree from lesson Markdown.
///
/// Produces the element structure a browser would mount for the rendered
/// HTML (`p`, `h2`, `ul > li`, `pre > code`, `em`, ...). Adjacent text events
/// are coalesced into a single leaf, so structural paths computed against
/// this tree match what a DOM walk over the same content would see. Raw HTML
/// is dropped.
pub fn render_markdown(content: &str) -> DocTree {
    let mut tree = DocTree::new();
    let mut stack: Vec<NodeId> = vec![tree.root()];

    for event in Parser::new(content) {
        let parent = *stack.last().unwrap_or(&tree.root());
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                let pre = tree.append_element(parent, "pre");
                let code = tree.append_element(pre, "code");
                if let CodeBlockKind::Fenced(lang) = kind
                    && !lang.is_empty()
                {
                    tree.set_attr(code, "class", format!("language-{lang}"));
                }
                stack.push(pre);
                stack.push(code);
            }
            Event::End(TagEnd::CodeBlock) => {
                stack.truncate(stack.len().saturating_sub(2).max(1));
            }
            Event::Start(tag) => {
                let element = open_element(&mut tree, parent, &tag);
                stack.push(element);
            }
            Event::End(_) => {
                if stack.len() > 1 {
                    stack.pop();
                }
            }
            Event::Text(text) => {
                if tree.tag(parent) == Some("img") {
                    let alt = format!("{}{}", tree.attr(parent, "alt").unwrap_or(""), text);
                    tree.set_attr(parent, "alt", alt);
                } else {
                    tree.extend_text(parent, &text);
                }
            }
            Event::Code(code) => {
                let element = tree.append_element(parent, "code");
                tree.append_text(element, code.to_string());
            }
            Event::SoftBreak => {
                tree.extend_text(parent, "\n");
            }
            Event::HardBreak => {
                tree.append_element(parent, "br");
            }
            Event::Rule => {
                tree.append_element(parent, "hr");
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                log::debug!("Dropping raw HTML from lesson content: {}", html.trim());
            }
            _ => {}
        }
    }

    tree
}

fn open_element(tree: &mut DocTree, parent: NodeId, tag: &Tag<'_>) -> NodeId {
    match tag {
        Tag::Paragraph => tree.append_element(parent, "p"),
        Tag::Heading { level, .. } => tree.append_element(parent, heading_tag(*level)),
        Tag::BlockQuote(_) => tree.append_element(parent, "blockquote"),
        Tag::List(Some(start)) => {
            let list = tree.append_element(parent, "ol");
            if *start != 1 {
                tree.set_attr(list, "start", start.to_string());
            }
            list
        }
        Tag::List(None) => tree.append_element(parent, "ul"),
        Tag::Item => tree.append_element(parent, "li"),
        Tag::Emphasis => tree.append_element(parent, "em"),
        Tag::Strong => tree.append_element(parent, "strong"),
        Tag::Strikethrough => tree.append_element(parent, "del"),
        Tag::Link { dest_url, .. } => {
            let link = tree.append_element(parent, "a");
            tree.set_attr(link, "href", dest_url.to_string());
            link
        }
        Tag::Image { dest_url, .. } => {
            let image = tree.append_element(parent, "img");
            tree.set_attr(image, "src", dest_url.to_string());
            image
        }
        _ => tree.append_element(parent, "div"),
    }
}

fn heading_tag(level: HeadingLevel) -> &'static str {
    match level {
        HeadingLevel::H1 => "h1",
        HeadingLevel::H2 => "h2",
        HeadingLevel::H3 => "h3",
        HeadingLevel::H4 => "h4",
        HeadingLevel::H5 => "h5",
        HeadingLevel::H6 => "h6",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tags(tree: &DocTree, parent: NodeId) -> Vec<String> {
        tree.children(parent)
            .iter()
            .map(|&child| tree.tag(child).unwrap_or("#text").to_string())
            .collect()
    }

    #[test]
    fn test_paragraph_becomes_single_text_leaf() {
        let tree = render_markdown("hello world foo");

        let root = tree.root();
        assert_eq!(tags(&tree, root), vec!["p"]);
        let p = tree.children(root)[0];
        assert_eq!(tree.children(p).len(), 1);
        assert_eq!(tree.text_content(p), "hello world foo");
    }

    #[test]
    fn test_inline_formatting_nests_elements() {
        let tree = render_markdown("one *two* **three** `four`");

        let p = tree.children(tree.root())[0];
        assert_eq!(
            tags(&tree, p),
            vec!["#text", "em", "#text", "strong", "#text", "code"]
        );
        assert_eq!(tree.text_content(p), "one two three four");
    }

    #[test]
    fn test_blocks_map_to_html_elements() {
        let tree = render_markdown("## Title\n\n- a\n- b\n\n> quoted\n\n```rust\nfn x() {}\n```\n");

        let root = tree.root();
        assert_eq!(tags(&tree, root), vec!["h2", "ul", "blockquote", "pre"]);
        let list = tree.children(root)[1];
        assert_eq!(tags(&tree, list), vec!["li", "li"]);
        let pre = tree.children(root)[3];
        let code = tree.children(pre)[0];
        assert_eq!(tree.attr(code, "class"), Some("language-rust"));
        assert_eq!(tree.text_content(code), "fn x() {}\n");
    }

    #[test]
    fn test_soft_breaks_stay_in_one_leaf() {
        let tree = render_markdown("first line\nsecond line");

        let p = tree.children(tree.root())[0];
        assert_eq!(tree.children(p).len(), 1);
        assert_eq!(tree.text_content(p), "first line\nsecond line");
    }

    #[test]
    fn test_image_alt_text_is_an_attribute() {
        let tree = render_markdown("![a diagram](diagram.png)");

        let p = tree.children(tree.root())[0];
        let img = tree.children(p)[0];
        assert_eq!(tree.attr(img, "src"), Some("diagram.png"));
        assert_eq!(tree.attr(img, "alt"), Some("a diagram"));
        assert_eq!(tree.text_content(p), "");
    }
}
