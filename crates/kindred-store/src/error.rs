use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("filesystem store error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("bot not found: {0}")]
    BotNotFound(String),

    #[error("user not found: {bot_id}/{external_id}")]
    UserNotFound { bot_id: String, external_id: String },
}

impl From<StoreError> for kindred_core::KindredError {
    fn from(e: StoreError) -> Self {
        kindred_core::KindredError::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
