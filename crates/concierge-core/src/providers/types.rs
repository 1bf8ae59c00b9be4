//! Provider-agnostic types for LLM calls

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::history::{Message, Role};

/// Provider-agnostic chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: ChatMessageContent,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: ChatMessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: ChatMessageContent::Text(text.into()),
        }
    }

    /// Convert conversation history into prior chat turns
    pub fn from_history(history: &[Message]) -> Vec<ChatMessage> {
        history.iter().map(ChatMessage::from).collect()
    }
}

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        let role = match msg.role() {
            Role::User => ChatRole::User,
            Role::Assistant => ChatRole::Assistant,
        };
        Self {
            role,
            content: ChatMessageContent::Text(msg.content().to_string()),
        }
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

/// Content of a chat message, either plain text or structured blocks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatMessageContent {
    Text(String),
    Blocks(Vec<ChatBlock>),
}

/// A single block within a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChatBlock {
    Text { text: String },
    ToolCall { id: String, name: String, input: Value },
    ToolResult { tool_call_id: String, content: String },
}

impl From<ChatResponseBlock> for ChatBlock {
    fn from(block: ChatResponseBlock) -> Self {
        match block {
            ChatResponseBlock::Text { text } => ChatBlock::Text { text },
            ChatResponseBlock::ToolCall { id, name, input } => ChatBlock::ToolCall { id, name, input },
        }
    }
}

/// Tool definition advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Constraint on the shape of the model's final output
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    pub name: String,
    pub description: String,
    pub schema: Value,
}

/// Provider-agnostic response from an LLM
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub blocks: Vec<ChatResponseBlock>,
    pub stop_reason: StopReason,
    pub usage: ChatUsage,
}

impl ChatResponse {
    /// All text blocks joined with newlines
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ChatResponseBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Input of the first call to the named tool
    pub fn tool_input(&self, tool_name: &str) -> Option<&Value> {
        self.blocks.iter().find_map(|b| match b {
            ChatResponseBlock::ToolCall { name, input, .. } if name == tool_name => Some(input),
            _ => None,
        })
    }
}

/// A block in the response
#[derive(Debug, Clone)]
pub enum ChatResponseBlock {
    Text { text: String },
    ToolCall { id: String, name: String, input: Value },
}

/// Why the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    Unknown,
}

/// Token usage from a single API call
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Trait that all LLM providers implement
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g. "openai", "anthropic")
    fn provider_name(&self) -> &str;

    /// Model identifier (e.g. "gpt-4o", "claude-sonnet-4-5")
    fn model(&self) -> &str;

    /// Send a chat request.
    ///
    /// When `output` is set the provider must use its structured-output
    /// mechanism so the final answer conforms to the schema. Callers still
    /// validate the result.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
        output: Option<&OutputSchema>,
    ) -> Result<ChatResponse>;
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

impl StopReason {
    /// Whether the model wants to call tools
    pub fn is_tool_use(&self) -> bool {
        matches!(self, Self::ToolUse)
    }

    /// Whether the model finished its turn
    pub fn is_end_turn(&self) -> bool {
        matches!(self, Self::EndTurn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_role_display() {
        assert_eq!(ChatRole::User.to_string(), "user");
        assert_eq!(ChatRole::Assistant.to_string(), "assistant");
        assert_eq!(ChatRole::System.to_string(), "system");
    }

    #[test]
    fn test_stop_reason_predicates() {
        assert!(StopReason::ToolUse.is_tool_use());
        assert!(!StopReason::EndTurn.is_tool_use());
        assert!(StopReason::EndTurn.is_end_turn());
        assert!(!StopReason::ToolUse.is_end_turn());
    }

    #[test]
    fn test_from_history() {
        let history = vec![Message::user("hi"), Message::assistant("hello")];
        let msgs = ChatMessage::from_history(&history);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, ChatRole::User);
        assert_eq!(msgs[1].role, ChatRole::Assistant);
        if let ChatMessageContent::Text(t) = &msgs[1].content {
            assert_eq!(t, "hello");
        } else {
            panic!("expected text content");
        }
    }

    #[test]
    fn test_response_text_joins_blocks() {
        let resp = ChatResponse {
            blocks: vec![
                ChatResponseBlock::Text { text: "one".to_string() },
                ChatResponseBlock::ToolCall {
                    id: "t1".to_string(),
                    name: "route".to_string(),
                    input: serde_json::json!({"a": 1}),
                },
                ChatResponseBlock::Text { text: "two".to_string() },
            ],
            stop_reason: StopReason::EndTurn,
            usage: ChatUsage::default(),
        };
        assert_eq!(resp.text(), "one\ntwo");
        assert_eq!(resp.tool_input("route"), Some(&serde_json::json!({"a": 1})));
        assert!(resp.tool_input("other").is_none());
    }

    #[test]
    fn test_chat_usage_default() {
        let usage = ChatUsage::default();
        assert_eq!(usage.input_tokens, 0);
        assert_eq!(usage.output_tokens, 0);
    }
}
