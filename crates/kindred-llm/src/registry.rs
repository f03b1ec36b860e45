use crate::anthropic::AnthropicInvoker;
use crate::invoker::Invoker;
use crate::openai::OpenAiInvoker;

/// One entry in the known-invoker table: how to build it from an API key.
pub struct KnownInvoker {
    pub id: &'static str,
    pub default_model: &'static str,
    pub build: fn(api_key: String) -> Box<dyn Invoker>,
}

pub const KNOWN_INVOKERS: &[KnownInvoker] = &[
    KnownInvoker {
        id: "anthropic",
        default_model: "claude-sonnet-4-5",
        build: |key| Box::new(AnthropicInvoker::new(key, None)),
    },
    KnownInvoker {
        id: "openai",
        default_model: "gpt-4o-mini",
        build: |key| Box::new(OpenAiInvoker::new(key, None)),
    },
];

pub fn find(id: &str) -> Option<&'static KnownInvoker> {
    KNOWN_INVOKERS.iter().find(|k| k.id == id)
}
