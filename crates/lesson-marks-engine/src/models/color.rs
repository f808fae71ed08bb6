use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown highlight color: {0} (expected yellow, green, blue or pink)")]
pub struct UnknownColor(pub String);

/// Highlight palette offered to readers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightColor {
    #[default]
    Yellow,
    Green,
    Blue,
    Pink,
}

impl HighlightColor {
    pub const ALL: [HighlightColor; 4] = [Self::Yellow, Self::Green, Self::Blue, Self::Pink];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yellow => "yellow",
            Self::Green => "green",
            Self::Blue => "blue",
            Self::Pink => "pink",
        }
    }

    /// Background color used for the marker
    pub fn hex(&self) -> &'static str {
        match self {
            Self::Yellow => "#fef08a",
            Self::Green => "#86efac",
            Self::Blue => "#93c5fd",
            Self::Pink => "#f9a8d4",
        }
    }

    /// CSS class carried by markers of this color
    pub fn css_class(&self) -> String {
        format!("highlight-{}", self.as_str())
    }

    /// Inline style carried by markers of this color
    pub fn marker_style(&self) -> String {
        format!(
            "background-color: {}; padding: 2px 4px; border-radius: 4px; cursor: pointer;",
            self.hex()
        )
    }
}

impl fmt::Display for HighlightColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HighlightColor {
    type Err = UnknownColor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|color| color.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownColor(s.to_string()))
    }
}
