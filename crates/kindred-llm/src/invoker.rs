use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single message in a chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One LLM call: a node (C6/C7/C9/C13/C14) renders its own system prompt and
/// message list, then hands it to an `Invoker`. No tool-use, no streaming —
/// every call site here wants one finished completion.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, system: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            system: system.into(),
            messages,
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub stop_reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum InvokerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("invoker unavailable: {0}")]
    Unavailable(String),
}

/// Common interface for everything that can turn a `ChatRequest` into a
/// `ChatResponse`: a concrete provider, the failover `InvokerRouter`, or a
/// test double.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Invoker name for logging and error messages.
    fn name(&self) -> &str;

    async fn invoke(&self, req: &ChatRequest) -> Result<ChatResponse, InvokerError>;
}
