//! Portable addressing of text spans.
//!
//! - **`path`**: structural paths (`/p[2]/em[1]/text()[1]`) from the root to a node
//! - **`codec`**: live spans to [`AnchorShape`]s and back
//! - **`fallback`**: first-occurrence text search used when a shape no longer resolves

pub mod codec;
pub mod fallback;
pub mod path;

pub use codec::{AnchorShape, Boundary, TextSpan, decode, encode};
pub use fallback::locate;
pub use path::{PathParseError, PathStep, StructuralPath};
