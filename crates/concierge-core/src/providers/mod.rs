//! LLM provider abstraction layer
//!
//! Supports OpenAI (and OpenAI-compatible endpoints such as Azure and Ollama)
//! and Anthropic. Providers implement the [`LlmProvider`] trait and can be
//! chained via [`FailoverProvider`].

pub mod anthropic;
pub mod failover;
pub mod openai;
pub mod tool_loop;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use failover::FailoverProvider;
pub use openai::{OpenAiEndpoint, OpenAiProvider};
pub use tool_loop::run_tool_loop;
pub use types::{
    ChatBlock, ChatMessage, ChatMessageContent, ChatResponse, ChatResponseBlock, ChatRole,
    ChatUsage, LlmProvider, OutputSchema, StopReason, ToolDefinition,
};
