//! Mutable document tree standing in for the rendered lesson.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Ids are stable for
//! the lifetime of one [`DocTree`] (detached nodes are never reused), but a
//! re-render builds a fresh tree, so ids must never be persisted. Persistent
//! addressing goes through [`crate::anchoring::StructuralPath`].

pub mod html;
pub mod markdown;

pub use html::to_html;
pub use markdown::render_markdown;

/// Handle to a node inside one [`DocTree`]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Payload of a tree node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    /// The document root, addressed as `/`
    Root,
    /// An element with a lowercase tag name and ordered attributes
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    /// A text-bearing leaf
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed node tree with DOM-like mutation primitives
#[derive(Debug, Clone)]
pub struct DocTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for DocTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DocTree {
    /// Create a tree containing only the root node
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Root,
                parent: None,
                children: Vec::new(),
            }],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Whether `id` was issued by this tree
    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0].data
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Tag name for element nodes
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].data {
            NodeData::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    /// Text for text leaves
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].data {
            NodeData::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].data, NodeData::Text(_))
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[id.0].data {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }

    /// Set an attribute, replacing any existing value. No-op on non-elements.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        if let NodeData::Element { attrs, .. } = &mut self.nodes[id.0].data {
            let value = value.into();
            match attrs.iter_mut().find(|(key, _)| key == name) {
                Some((_, existing)) => *existing = value,
                None => attrs.push((name.to_string(), value)),
            }
        }
    }

    /// Create a detached element
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push_node(NodeData::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        })
    }

    /// Create a detached text leaf
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push_node(NodeData::Text(text.into()))
    }

    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let id = self.create_element(tag);
        self.append_child(parent, id);
        id
    }

    pub fn append_text(&mut self, parent: NodeId, text: impl Into<String>) -> NodeId {
        let id = self.create_text(text);
        self.append_child(parent, id);
        id
    }

    /// Append text to `parent`, extending its last child when that is already
    /// a text leaf (the way a browser coalesces adjacent character data).
    pub fn extend_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        if let Some(&last) = self.children(parent).last()
            && let NodeData::Text(existing) = &mut self.nodes[last.0].data
        {
            existing.push_str(text);
            return last;
        }
        self.append_text(parent, text)
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let index = self.nodes[parent.0].children.len();
        self.insert_child(parent, index, child);
    }

    /// Insert `child` at `index` among `parent`'s children, detaching it from
    /// any previous parent first.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.detach(child);
        let children = &mut self.nodes[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.nodes[child.0].parent = Some(parent);
    }

    /// Remove a node from its parent. The node and its subtree stay in the
    /// arena and can be re-inserted.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&child| child != id);
        }
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&child| child == id)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        self.children(parent).get(index + 1).copied()
    }

    /// Whether the node is reachable from the root
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.contains(id) && self.ancestors(id).last() == Some(self.root)
    }

    /// The node itself followed by each ancestor up to the root
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), move |&node| self.parent(node))
    }

    /// Deepest node that is an ancestor of (or equal to) both `a` and `b`
    pub fn common_ancestor(&self, a: NodeId, b: NodeId) -> Option<NodeId> {
        let a_chain: Vec<NodeId> = self.ancestors(a).collect();
        self.ancestors(b).find(|node| a_chain.contains(node))
    }

    /// Pre-order listing of `id` and everything below it
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev());
        }
        out
    }

    /// Text leaves under `id` in document order
    pub fn text_leaves(&self, id: NodeId) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&node| self.is_text(node))
            .collect()
    }

    /// Concatenated text of every leaf under `id`
    pub fn text_content(&self, id: NodeId) -> String {
        self.text_leaves(id)
            .into_iter()
            .filter_map(|leaf| self.text(leaf))
            .collect()
    }

    /// Largest valid boundary offset: characters for text, children otherwise
    pub fn boundary_len(&self, id: NodeId) -> usize {
        match &self.nodes[id.0].data {
            NodeData::Text(text) => text.chars().count(),
            _ => self.nodes[id.0].children.len(),
        }
    }

    /// Character position of a boundary point within the root's text content.
    ///
    /// Returns `None` when the node is not attached or the offset is out of
    /// range for the node.
    pub fn text_position(&self, node: NodeId, offset: usize) -> Option<usize> {
        if !self.is_attached(node) || offset > self.boundary_len(node) {
            return None;
        }

        let mut chars_before = 0;
        for current in self.descendants(self.root) {
            if current == node {
                return Some(if self.is_text(node) {
                    chars_before + offset
                } else {
                    chars_before
                        + self.children(node)[..offset]
                            .iter()
                            .map(|&child| self.text_content(child).chars().count())
                            .sum::<usize>()
                });
            }
            if let Some(text) = self.text(current) {
                chars_before += text.chars().count();
            }
        }
        None
    }

    /// Split a text leaf at a character offset. The original node keeps the
    /// leading part; the returned node holds the rest and is inserted right
    /// after it.
    pub fn split_text(&mut self, id: NodeId, char_offset: usize) -> NodeId {
        let tail = match &mut self.nodes[id.0].data {
            NodeData::Text(text) => {
                let byte_index = text
                    .char_indices()
                    .nth(char_offset)
                    .map(|(index, _)| index)
                    .unwrap_or(text.len());
                text.split_off(byte_index)
            }
            _ => String::new(),
        };
        let new_node = self.create_text(tail);
        if let (Some(parent), Some(index)) = (self.parent(id), self.index_in_parent(id)) {
            self.insert_child(parent, index + 1, new_node);
        }
        new_node
    }

    /// Split an element so that `at` and every later child move into a
    /// shallow clone inserted right after the original.
    pub fn split_element(&mut self, id: NodeId, at: NodeId) -> NodeId {
        let data = self.nodes[id.0].data.clone();
        let clone = self.push_node(data);
        let start = self.children(id).iter().position(|&child| child == at);
        if let Some(start) = start {
            let moved: Vec<NodeId> = self.children(id)[start..].to_vec();
            for child in moved {
                self.append_child(clone, child);
            }
        }
        if let (Some(parent), Some(index)) = (self.parent(id), self.index_in_parent(id)) {
            self.insert_child(parent, index + 1, clone);
        }
        clone
    }

    /// Replace an element with its own children, in place
    pub fn unwrap(&mut self, id: NodeId) {
        let (Some(parent), Some(index)) = (self.parent(id), self.index_in_parent(id)) else {
            return;
        };
        let children: Vec<NodeId> = self.children(id).to_vec();
        self.detach(id);
        for (offset, child) in children.into_iter().enumerate() {
            self.insert_child(parent, index + offset, child);
        }
    }

    /// Merge runs of adjacent text leaves under `parent` and drop empty ones
    pub fn merge_adjacent_text(&mut self, parent: NodeId) {
        let children: Vec<NodeId> = self.children(parent).to_vec();
        let mut previous_text: Option<NodeId> = None;
        for child in children {
            let Some(text) = self.text(child).map(str::to_owned) else {
                previous_text = None;
                continue;
            };
            match previous_text {
                _ if text.is_empty() => self.detach(child),
                Some(previous) => {
                    if let NodeData::Text(existing) = &mut self.nodes[previous.0].data {
                        existing.push_str(&text);
                    }
                    self.detach(child);
                }
                None => previous_text = Some(child),
            }
        }
    }

    /// Elements below `id` (inclusive) matching a predicate, in document order
    pub fn find_elements<F>(&self, id: NodeId, mut predicate: F) -> Vec<NodeId>
    where
        F: FnMut(&str, NodeId) -> bool,
    {
        self.descendants(id)
            .into_iter()
            .filter(|&node| match self.tag(node) {
                Some(tag) => predicate(tag, node),
                None => false,
            })
            .collect()
    }

    fn push_node(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }
}
