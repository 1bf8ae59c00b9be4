//! Anthropic Messages API provider
//!
//! Structured output is obtained by advertising the output schema as a tool
//! and forcing the model to call it.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::types::{
    ChatBlock, ChatMessage, ChatMessageContent, ChatResponse, ChatResponseBlock, ChatRole,
    ChatUsage, LlmProvider, OutputSchema, StopReason, ToolDefinition,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String, base_url: String, max_tokens: u32) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            base_url,
            model,
            max_tokens,
        }
    }

    fn request<'a>(
        &'a self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &'a str,
        output: Option<&OutputSchema>,
    ) -> MessagesRequest<'a> {
        let mut tools = tools.to_vec();
        let tool_choice = output.map(|o| {
            tools.push(ToolDefinition {
                name: o.name.clone(),
                description: o.description.clone(),
                input_schema: o.schema.clone(),
            });
            ToolChoice::Tool { name: o.name.clone() }
        });

        MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            // System turns travel in the top-level `system` field
            messages: messages
                .iter()
                .filter(|m| m.role != ChatRole::System)
                .map(WireMessage::from)
                .collect(),
            tools,
            tool_choice,
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
        output: Option<&OutputSchema>,
    ) -> Result<ChatResponse> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let request = self.request(messages, tools, system, output);
        debug!(
            "Anthropic request: model={}, messages={}, tools={}, structured={}",
            self.model,
            request.messages.len(),
            request.tools.len(),
            request.tool_choice.is_some()
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Anthropic API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Anthropic API returned {}: {}", status, body));
        }

        let body: MessagesResponse = response
            .json()
            .await
            .context("Failed to parse Anthropic API response")?;
        debug!(
            "Anthropic response: blocks={}, stop_reason={:?}",
            body.content.len(),
            body.stop_reason
        );
        Ok(body.into())
    }
}

// ── Wire types ──

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ToolChoice {
    Tool { name: String },
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: WireContent,
}

impl From<&ChatMessage> for WireMessage {
    fn from(m: &ChatMessage) -> Self {
        let role = match m.role {
            ChatRole::Assistant => "assistant",
            ChatRole::User | ChatRole::System => "user",
        };
        let content = match &m.content {
            ChatMessageContent::Text(t) => WireContent::Text(t.clone()),
            ChatMessageContent::Blocks(blocks) => {
                WireContent::Blocks(blocks.iter().map(WireBlock::from).collect())
            }
        };
        Self { role, content }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Blocks(Vec<WireBlock>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    /// Extended thinking and any block type added later
    #[serde(other)]
    Other,
}

impl From<&ChatBlock> for WireBlock {
    fn from(b: &ChatBlock) -> Self {
        match b {
            ChatBlock::Text { text } => Self::Text { text: text.clone() },
            ChatBlock::ToolCall { id, name, input } => Self::ToolUse {
                id: id.clone(),
                name: name.clone(),
                input: input.clone(),
            },
            ChatBlock::ToolResult {
                tool_call_id,
                content,
            } => Self::ToolResult {
                tool_use_id: tool_call_id.clone(),
                content: content.clone(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<WireBlock>,
    stop_reason: Option<String>,
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl From<MessagesResponse> for ChatResponse {
    fn from(resp: MessagesResponse) -> Self {
        let blocks = resp
            .content
            .into_iter()
            .filter_map(|b| match b {
                WireBlock::Text { text } => Some(ChatResponseBlock::Text { text }),
                WireBlock::ToolUse { id, name, input } => {
                    Some(ChatResponseBlock::ToolCall { id, name, input })
                }
                WireBlock::ToolResult { .. } | WireBlock::Other => None,
            })
            .collect();

        let stop_reason = match resp.stop_reason.as_deref() {
            Some("tool_use") => StopReason::ToolUse,
            Some("end_turn") | Some("stop_sequence") => StopReason::EndTurn,
            Some("max_tokens") => StopReason::MaxTokens,
            _ => StopReason::Unknown,
        };

        ChatResponse {
            blocks,
            stop_reason,
            usage: ChatUsage {
                input_tokens: resp.usage.input_tokens,
                output_tokens: resp.usage.output_tokens,
            },
        }
    }
}
