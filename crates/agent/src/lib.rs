//! Agent orchestration for Saralytics.
//!
//! A question flows through two tiers:
//! 1. **Routing** (`manager`) - a single-shot classification picks the sales,
//!    inventory or finance specialist.
//! 2. **Answering** (`specialist`) - the specialist grounds a prompt in a sample
//!    of its data, asks the model whether a tool is needed, optionally runs the
//!    tool (`tools`), then streams the answer through `stream`.
//!
//! # Key Types
//!
//! - `AgentRuntime` - request entry points (see `runtime` module)
//! - `CompletionService` / `StreamingCompletionService` - model capabilities,
//!   implemented over HTTP by `GeminiClient` and `OllamaClient`
//! - `ToolRegistry` - deterministic tools, fail-closed
//!
//! # Safety Principle
//!
//! Figures come from tools and the data store, never from the model. A
//! tool-call payload is intercepted before streaming starts and is never shown
//! to the caller.

pub mod gemini;
pub mod llm;
pub mod manager;
pub mod ollama;
pub mod runtime;
pub mod specialist;
pub mod stream;
pub mod tools;

#[cfg(test)]
mod testing;

pub use gemini::GeminiClient;
pub use llm::{CompletionOptions, CompletionService, FragmentStream, LlmError, StreamingCompletionService};
pub use manager::{ManagerAgent, RoutingDecision, RoutingError};
pub use ollama::OllamaClient;
pub use runtime::{AgentRuntime, ChatReply, ChatRequestError, ReplyOutcome};
pub use specialist::{SpecialistAgent, SpecialistPhase};
pub use stream::{FragmentReceiver, StreamFragment, StreamTransport};
pub use tools::{ProfitAnalysisTool, Tool, ToolRegistry};
