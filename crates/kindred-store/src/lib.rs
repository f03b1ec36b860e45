pub mod cache;
pub mod db;
pub mod error;
pub mod fs;
pub mod sqlite;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use fs::FilesystemStore;
pub use sqlite::SqliteStore;
pub use store::Store;
pub use types::{
    Assets, Bot, BotTask, ClearCounts, DerivedNote, DimensionAudit, MoodState, NewNote,
    NewTranscript, NoteType, RelationshipDimensions, ScoredHit, SptInfo, State, StoredMessage,
    TaskCategory, Transcript, User,
};
