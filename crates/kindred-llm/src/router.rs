use async_trait::async_trait;
use tracing::{info, warn};

use crate::invoker::{ChatRequest, ChatResponse, Invoker, InvokerError};

/// One entry in an `InvokerRouter`'s priority list.
pub struct InvokerSlot {
    pub invoker: Box<dyn Invoker>,
    pub max_retries: u32,
}

impl InvokerSlot {
    pub fn new(invoker: Box<dyn Invoker>, max_retries: u32) -> Self {
        Self { invoker, max_retries }
    }
}

/// Routes a `ChatRequest` across multiple invokers with automatic failover.
///
/// Invokers are tried in priority order (index 0 first). If one returns an
/// error after its configured `max_retries`, the router moves to the next.
pub struct InvokerRouter {
    slots: Vec<InvokerSlot>,
}

impl InvokerRouter {
    pub fn new(slots: Vec<InvokerSlot>) -> Self {
        assert!(!slots.is_empty(), "InvokerRouter requires at least one slot");
        Self { slots }
    }
}

#[async_trait]
impl Invoker for InvokerRouter {
    fn name(&self) -> &str {
        "router"
    }

    async fn invoke(&self, req: &ChatRequest) -> Result<ChatResponse, InvokerError> {
        let mut last_err: Option<InvokerError> = None;

        for slot in &self.slots {
            let invoker_name = slot.invoker.name();

            for attempt in 0..=slot.max_retries {
                match slot.invoker.invoke(req).await {
                    Ok(resp) => {
                        if attempt > 0 {
                            info!(invoker = %invoker_name, attempt, "request succeeded after retry");
                        }
                        return Ok(resp);
                    }
                    Err(e) => {
                        warn!(invoker = %invoker_name, attempt, err = %e, "invoker failed");

                        if matches!(e, InvokerError::RateLimited { .. }) {
                            last_err = Some(e);
                            break;
                        }

                        last_err = Some(e);

                        if attempt < slot.max_retries {
                            tokio::time::sleep(tokio::time::Duration::from_millis(
                                200 * (attempt as u64 + 1),
                            ))
                            .await;
                        }
                    }
                }
            }

            info!(invoker = %invoker_name, "invoker exhausted, trying next");
        }

        Err(last_err.unwrap_or_else(|| InvokerError::Unavailable("all invokers failed".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::{Message, Role};
    use async_trait::async_trait;

    struct AlwaysFail;

    #[async_trait]
    impl Invoker for AlwaysFail {
        fn name(&self) -> &str {
            "always-fail"
        }
        async fn invoke(&self, _req: &ChatRequest) -> Result<ChatResponse, InvokerError> {
            Err(InvokerError::Unavailable("intentional failure".to_string()))
        }
    }

    struct AlwaysOk;

    #[async_trait]
    impl Invoker for AlwaysOk {
        fn name(&self) -> &str {
            "always-ok"
        }
        async fn invoke(&self, req: &ChatRequest) -> Result<ChatResponse, InvokerError> {
            Ok(ChatResponse {
                content: "ok".to_string(),
                model: req.model.clone(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "stop".to_string(),
            })
        }
    }

    fn dummy_request() -> ChatRequest {
        ChatRequest::new(
            "test-model",
            "You are a test.",
            vec![Message { role: Role::User, content: "hello".to_string() }],
        )
    }

    #[tokio::test]
    async fn router_falls_back_to_second_invoker() {
        let router = InvokerRouter::new(vec![
            InvokerSlot::new(Box::new(AlwaysFail), 0),
            InvokerSlot::new(Box::new(AlwaysOk), 0),
        ]);

        let result = router.invoke(&dummy_request()).await;
        assert!(result.is_ok());
        assert_eq!(result.unwrap().content, "ok");
    }

    #[tokio::test]
    async fn router_errors_when_all_fail() {
        let router = InvokerRouter::new(vec![
            InvokerSlot::new(Box::new(AlwaysFail), 0),
            InvokerSlot::new(Box::new(AlwaysFail), 0),
        ]);

        let result = router.invoke(&dummy_request()).await;
        assert!(result.is_err());
    }
}
