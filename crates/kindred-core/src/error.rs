use thiserror::Error;

/// Crate-boundary error type.
///
/// Per the pipeline's error handling design, `handle_turn` itself never
/// surfaces one of these as a turn failure — every node-local error collapses
/// to a documented fallback instead (see `kindred-engine`). `KindredError` is
/// reserved for errors raised before a turn begins: bad config, a store that
/// can't even open its fallback file, etc.
#[derive(Debug, Error)]
pub enum KindredError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("LLM invoker error: {0}")]
    Llm(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl KindredError {
    /// Short stable code used in structured log fields.
    pub fn code(&self) -> &'static str {
        match self {
            KindredError::Config(_) => "CONFIG_ERROR",
            KindredError::Store(_) => "STORE_ERROR",
            KindredError::Llm(_) => "LLM_ERROR",
            KindredError::Serialization(_) => "SERIALIZATION_ERROR",
            KindredError::Io(_) => "IO_ERROR",
            KindredError::Timeout { .. } => "TIMEOUT",
            KindredError::Validation { .. } => "VALIDATION_ERROR",
            KindredError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, KindredError>;
