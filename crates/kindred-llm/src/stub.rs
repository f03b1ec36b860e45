use async_trait::async_trait;

use crate::invoker::{ChatRequest, ChatResponse, Invoker, InvokerError};

/// Closure-backed fake `Invoker` for tests elsewhere in the workspace
/// (reasoner, LATS search, behavior processor) that need a deterministic
/// stand-in instead of a real network call.
pub struct StubInvoker<F>
where
    F: Fn(&ChatRequest) -> Result<ChatResponse, InvokerError> + Send + Sync,
{
    name: String,
    respond: F,
}

impl<F> StubInvoker<F>
where
    F: Fn(&ChatRequest) -> Result<ChatResponse, InvokerError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, respond: F) -> Self {
        Self {
            name: name.into(),
            respond,
        }
    }
}

#[async_trait]
impl<F> Invoker for StubInvoker<F>
where
    F: Fn(&ChatRequest) -> Result<ChatResponse, InvokerError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, req: &ChatRequest) -> Result<ChatResponse, InvokerError> {
        (self.respond)(req)
    }
}

/// A stub that always returns the same fixed text, useful when a test only
/// cares that *something* downstream of the invoker works.
pub fn fixed_response(text: impl Into<String>) -> StubInvoker<impl Fn(&ChatRequest) -> Result<ChatResponse, InvokerError> + Send + Sync> {
    let text = text.into();
    StubInvoker::new("stub-fixed", move |req| {
        Ok(ChatResponse {
            content: text.clone(),
            model: req.model.clone(),
            tokens_in: 0,
            tokens_out: 0,
            stop_reason: "stop".to_string(),
        })
    })
}
