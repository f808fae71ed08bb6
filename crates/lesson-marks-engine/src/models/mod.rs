pub mod color;
pub mod note;

pub use color::{HighlightColor, UnknownColor};
pub use note::{Anchor, AnchorSlot, Note, NoteDraft, NoteId, NotePatch, NoteScope};
