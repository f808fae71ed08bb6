use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dom::{DocTree, NodeData, NodeId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathParseError {
    #[error("Structural path must start with '/': {0:?}")]
    NotAbsolute(String),
    #[error("Malformed path segment {segment:?} in {path:?}")]
    BadSegment { path: String, segment: String },
    #[error("Ordinals are 1-based, found [0] in {0:?}")]
    ZeroOrdinal(String),
}

/// One level of a structural path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    /// The nth child element with this tag name (1-based)
    Element { tag: String, ordinal: usize },
    /// The nth text leaf among its siblings (1-based)
    Text { ordinal: usize },
}

impl PathStep {
    fn matches(&self, tree: &DocTree, node: NodeId) -> bool {
        match (self, tree.data(node)) {
            (PathStep::Element { tag, .. }, NodeData::Element { tag: node_tag, .. }) => {
                tag.eq_ignore_ascii_case(node_tag)
            }
            (PathStep::Text { .. }, NodeData::Text(_)) => true,
            _ => false,
        }
    }

    fn ordinal(&self) -> usize {
        match self {
            PathStep::Element { ordinal, .. } | PathStep::Text { ordinal } => *ordinal,
        }
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::Element { tag, ordinal } => write!(f, "{tag}[{ordinal}]"),
            PathStep::Text { ordinal } => write!(f, "text()[{ordinal}]"),
        }
    }
}

/// Top-down address of a node: tag name + ordinal among same-tag siblings for
/// elements, ordinal among text siblings for text leaves.
///
/// Textual form is `/p[2]/em[1]/text()[1]`; the root is `/`. Serializes as
/// that string. A stored string that does not parse deserializes to a path
/// that never resolves and still serializes back verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct StructuralPath {
    steps: Vec<PathStep>,
    unparsed: Option<String>,
}

impl StructuralPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_steps(steps: Vec<PathStep>) -> Self {
        Self {
            steps,
            unparsed: None,
        }
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    pub fn is_root(&self) -> bool {
        self.steps.is_empty() && self.unparsed.is_none()
    }

    /// Raw text of a stored path that could not be parsed
    pub fn unparsed(&self) -> Option<&str> {
        self.unparsed.as_deref()
    }

    /// Compute the path of a node. `None` for nodes not attached to the root.
    pub fn of_node(tree: &DocTree, node: NodeId) -> Option<Self> {
        if !tree.is_attached(node) {
            return None;
        }

        let mut steps = Vec::new();
        let mut current = node;
        while let Some(parent) = tree.parent(current) {
            let step = match tree.data(current) {
                NodeData::Text(_) => PathStep::Text { ordinal: 0 },
                NodeData::Element { tag, .. } => PathStep::Element {
                    tag: tag.clone(),
                    ordinal: 0,
                },
                NodeData::Root => return None,
            };
            let ordinal = tree
                .children(parent)
                .iter()
                .take_while(|&&sibling| sibling != current)
                .filter(|&&sibling| step.matches(tree, sibling))
                .count()
                + 1;
            steps.push(match step {
                PathStep::Text { .. } => PathStep::Text { ordinal },
                PathStep::Element { tag, .. } => PathStep::Element { tag, ordinal },
            });
            current = parent;
        }
        steps.reverse();
        Some(Self::from_steps(steps))
    }

    /// Walk the path from the root. `None` as soon as a step has no match.
    pub fn resolve(&self, tree: &DocTree) -> Option<NodeId> {
        if self.unparsed.is_some() {
            return None;
        }
        let mut current = tree.root();
        for step in &self.steps {
            current = tree
                .children(current)
                .iter()
                .copied()
                .filter(|&child| step.matches(tree, child))
                .nth(step.ordinal().checked_sub(1)?)?;
        }
        Some(current)
    }
}

impl fmt::Display for StructuralPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(raw) = &self.unparsed {
            return f.write_str(raw);
        }
        if self.steps.is_empty() {
            return f.write_str("/");
        }
        for step in &self.steps {
            write!(f, "/{step}")?;
        }
        Ok(())
    }
}

fn segment_regex() -> &'static Regex {
    static SEGMENT_REGEX: OnceLock<Regex> = OnceLock::new();
    SEGMENT_REGEX.get_or_init(|| {
        Regex::new(r"^(text\(\)|[A-Za-z][A-Za-z0-9-]*)\[(\d+)\]$").expect("Invalid segment regex")
    })
}

impl FromStr for StructuralPath {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.starts_with('/') {
            return Err(PathParseError::NotAbsolute(s.to_string()));
        }

        let mut steps = Vec::new();
        // Empty segments are skipped so `//html[1]/...` written by browser
        // code still parses.
        for segment in s.split('/').filter(|segment| !segment.is_empty()) {
            let captures =
                segment_regex()
                    .captures(segment)
                    .ok_or_else(|| PathParseError::BadSegment {
                        path: s.to_string(),
                        segment: segment.to_string(),
                    })?;
            let ordinal: usize =
                captures[2]
                    .parse()
                    .map_err(|_| PathParseError::BadSegment {
                        path: s.to_string(),
                        segment: segment.to_string(),
                    })?;
            if ordinal == 0 {
                return Err(PathParseError::ZeroOrdinal(s.to_string()));
            }
            steps.push(match &captures[1] {
                "text()" => PathStep::Text { ordinal },
                tag => PathStep::Element {
                    tag: tag.to_ascii_lowercase(),
                    ordinal,
                },
            });
        }
        Ok(Self::from_steps(steps))
    }
}

impl From<String> for StructuralPath {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|error: PathParseError| {
            log::warn!("Keeping unparseable anchor path as unresolved: {error}");
            Self {
                steps: Vec::new(),
                unparsed: Some(value),
            }
        })
    }
}

impl From<StructuralPath> for String {
    fn from(path: StructuralPath) -> Self {
        path.to_string()
    }
}
