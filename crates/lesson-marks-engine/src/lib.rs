pub mod anchoring;
pub mod document;
pub mod dom;
pub mod events;
pub mod highlight;
pub mod merge;
pub mod models;
pub mod persistence;
pub mod restore;
pub mod session;
pub mod store;

#[cfg(test)]
pub mod tests;

// Re-export key types for easier usage
pub use anchoring::{AnchorShape, Boundary, StructuralPath, TextSpan};
pub use document::Document;
pub use dom::{DocTree, NodeId};
pub use events::{EventBus, LessonEvent, Notice, NoticeLevel};
pub use merge::{MergeError, MergeOutcome};
pub use models::*;
pub use persistence::{JsonFileRepository, MemoryRepository, NoteRepository, RepositoryError};
pub use restore::{RestorationScheduler, RestoreReport, RestoreSettings, TickOutcome};
pub use session::{ExternalDraft, LessonSession, SessionError};
pub use store::{NoteStore, StoreError};
