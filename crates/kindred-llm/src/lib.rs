pub mod anthropic;
pub mod invoker;
pub mod openai;
pub mod registry;
pub mod router;
pub mod stub;

pub use anthropic::AnthropicInvoker;
pub use invoker::{ChatRequest, ChatResponse, Invoker, InvokerError, Message, Role};
pub use openai::OpenAiInvoker;
pub use registry::{find, KnownInvoker, KNOWN_INVOKERS};
pub use router::{InvokerRouter, InvokerSlot};
pub use stub::{fixed_response, StubInvoker};
